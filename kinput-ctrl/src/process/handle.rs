// Process handle management

use std::fmt;

use crate::error::ProcessError;
use windows::Win32::Foundation::{CloseHandle, BOOL, HANDLE};
use windows::Win32::System::Threading::{
    IsWow64Process, OpenProcess, PROCESS_ACCESS_RIGHTS, PROCESS_CREATE_THREAD, PROCESS_QUERY_INFORMATION,
    PROCESS_VM_OPERATION, PROCESS_VM_READ, PROCESS_VM_WRITE,
};

/// Rights needed to load libraries into a process and call their exports.
pub const INJECTION_ACCESS: PROCESS_ACCESS_RIGHTS = PROCESS_ACCESS_RIGHTS(
    PROCESS_CREATE_THREAD.0
        | PROCESS_QUERY_INFORMATION.0
        | PROCESS_VM_OPERATION.0
        | PROCESS_VM_WRITE.0
        | PROCESS_VM_READ.0,
);

/// Rights needed to walk a process's modules and export tables.
pub const QUERY_ACCESS: PROCESS_ACCESS_RIGHTS =
    PROCESS_ACCESS_RIGHTS(PROCESS_QUERY_INFORMATION.0 | PROCESS_VM_READ.0);

/// A handle to an open process
///
/// The handle is closed exactly once, when this value is dropped. Every
/// memory and thread operation against the process goes through it.
pub struct ProcessHandle {
    handle: HANDLE,
    pid: u32,
}

// Process handles can be safely moved between threads
unsafe impl Send for ProcessHandle {}

impl ProcessHandle {
    /// Opens a process with the specified access rights
    ///
    /// # Example
    /// ```no_run
    /// # use kinput_ctrl::process::{ProcessHandle, INJECTION_ACCESS};
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let handle = ProcessHandle::open(1234, INJECTION_ACCESS)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn open(pid: u32, rights: PROCESS_ACCESS_RIGHTS) -> Result<Self, ProcessError> {
        let handle = unsafe { OpenProcess(rights, false, pid) };

        match handle {
            Ok(h) if !h.is_invalid() => {
                log::debug!("Opened process {} with rights 0x{:X}", pid, rights.0);
                Ok(Self { handle: h, pid })
            }
            _ => Err(ProcessError::OpenProcessFailed(
                std::io::Error::last_os_error(),
            )),
        }
    }

    /// Returns the process ID associated with this handle
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Returns the raw Windows handle
    ///
    /// The caller must not use this handle after the ProcessHandle is dropped.
    pub fn as_handle(&self) -> HANDLE {
        self.handle
    }

    /// Whether the target runs with 64-bit pointers.
    ///
    /// Export walking reads headers at this build's pointer width, so a
    /// target of the other width cannot be served.
    pub fn is_64bit(&self) -> Result<bool, ProcessError> {
        let mut is_wow64 = BOOL::from(false);

        unsafe { IsWow64Process(self.handle, &mut is_wow64) }
            .map_err(|_| ProcessError::QueryFailed(self.pid, std::io::Error::last_os_error()))?;

        // A WoW64 process is 32-bit; on 32-bit Windows everything is
        Ok(cfg!(target_pointer_width = "64") && !is_wow64.as_bool())
    }

    /// Whether the target's pointer width matches this build.
    pub fn matches_architecture(&self) -> Result<bool, ProcessError> {
        Ok(self.is_64bit()? == cfg!(target_pointer_width = "64"))
    }
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("pid", &self.pid)
            .field("handle", &self.handle.0)
            .finish()
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if !self.handle.is_invalid() {
            unsafe {
                let _ = CloseHandle(self.handle);
            }
            log::debug!("Closed handle to process {}", self.pid);
        }
    }
}
