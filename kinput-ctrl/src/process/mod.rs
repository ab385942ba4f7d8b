// Process and module access

mod modules;

#[cfg(windows)]
mod enumerator;
#[cfg(windows)]
mod handle;
#[cfg(windows)]
mod thread;

pub use modules::{find_module, module_file_name, ModuleEntry, ModuleLookup};

#[cfg(windows)]
pub use enumerator::{ProcessEnumerator, ProcessInfo};
#[cfg(windows)]
pub use handle::{ProcessHandle, INJECTION_ACCESS, QUERY_ACCESS};
#[cfg(windows)]
pub use modules::ModuleEnumerator;
#[cfg(windows)]
pub use thread::{run_remote_thread, RemoteThread};

/// RAII guard for automatic snapshot handle cleanup
#[cfg(windows)]
pub(crate) struct SnapshotGuard(pub(crate) windows::Win32::Foundation::HANDLE);

#[cfg(windows)]
impl Drop for SnapshotGuard {
    fn drop(&mut self) {
        unsafe {
            if !self.0.is_invalid() {
                let _ = windows::Win32::Foundation::CloseHandle(self.0);
            }
        }
    }
}
