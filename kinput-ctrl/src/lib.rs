// Core library: remote export resolution and library injection

pub mod error;
pub mod injection;
pub mod memory;
pub mod pe;
pub mod process;
pub mod resolver;

#[cfg(test)]
mod testing;

pub use error::{InjectionError, MemoryError, ProcessError, ResolveError};
pub use injection::{Injector, RemoteModule, RemoteProcess, DEFAULT_PAYLOAD_LIBRARY};
pub use process::{ModuleEntry, ModuleLookup};
pub use resolver::{RemoteSymbolResolver, DEFAULT_MAX_FORWARD_DEPTH};

#[cfg(windows)]
pub use process::{ModuleEnumerator, ProcessEnumerator, ProcessHandle, ProcessInfo};
#[cfg(windows)]
pub use resolver::{find_exported_function_address, find_module_base_address};
