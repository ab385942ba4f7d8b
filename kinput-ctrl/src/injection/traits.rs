//! The operating-system surface the injector drives.

use crate::error::{InjectionError, ProcessError};
use crate::memory::{MemoryAllocator, MemoryReader, MemoryWriter};
use crate::process::{ModuleEntry, ModuleLookup};

/// Result type for injection operations.
pub type InjectionResult<T> = Result<T, InjectionError>;

/// A process the injector can load libraries into and run code in.
///
/// On Windows this is implemented by `ProcessHandle`.
pub trait RemoteProcess: MemoryReader + MemoryWriter + MemoryAllocator + ModuleLookup {
    /// Process identifier of the target.
    fn pid(&self) -> u32;

    /// Run `start(parameter)` on a new thread in the target, wait for it to
    /// finish, and return its exit code.
    ///
    /// # Safety
    /// `start` must be the address of a function in the target that takes a
    /// single pointer-sized argument, and `parameter` must be valid for it.
    unsafe fn run_thread(&self, start: usize, parameter: usize) -> InjectionResult<u32>;

    /// Snapshot of the modules currently loaded in the target.
    fn loaded_modules(&self) -> Result<Vec<ModuleEntry>, ProcessError>;

    /// Address of `module!function` taken from the calling process.
    ///
    /// Only meaningful for system libraries, which map at the same base in
    /// every process of a boot session.
    fn fallback_export(&self, _module: &str, _function: &str) -> Option<usize> {
        None
    }
}
