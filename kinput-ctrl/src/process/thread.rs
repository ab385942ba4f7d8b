//! Remote thread creation and synchronization.

use windows::Win32::Foundation::{CloseHandle, HANDLE, WAIT_OBJECT_0};
use windows::Win32::System::Threading::{
    CreateRemoteThread, GetExitCodeThread, WaitForSingleObject, INFINITE,
};

use crate::error::InjectionError;
use crate::process::ProcessHandle;

type ThreadStartRoutine = unsafe extern "system" fn(*mut std::ffi::c_void) -> u32;

/// RAII wrapper for a thread created in another process.
pub struct RemoteThread {
    handle: HANDLE,
}

impl RemoteThread {
    /// Start a thread in `process` at `start`, passing `parameter` as its
    /// only argument.
    ///
    /// # Safety
    /// `start` must be the address of a function in the target process that
    /// takes a single pointer-sized argument.
    pub unsafe fn spawn(
        process: &ProcessHandle,
        start: usize,
        parameter: usize,
    ) -> Result<Self, InjectionError> {
        let routine = std::mem::transmute::<usize, ThreadStartRoutine>(start);

        let handle = CreateRemoteThread(
            process.as_handle(),
            None,
            0,
            Some(routine),
            Some(parameter as *const std::ffi::c_void),
            0,
            None,
        )
        .map_err(|_| InjectionError::CreateThreadFailed(std::io::Error::last_os_error()))?;

        log::debug!(
            "Remote thread {:?} started at 0x{:X} with argument 0x{:X}",
            handle,
            start,
            parameter
        );

        Ok(Self { handle })
    }

    /// Block until the thread terminates and return its exit code.
    ///
    /// There is no timeout: a hung target blocks the caller.
    pub fn join(&self) -> Result<u32, InjectionError> {
        let wait_result = unsafe { WaitForSingleObject(self.handle, INFINITE) };
        if wait_result != WAIT_OBJECT_0 {
            return Err(InjectionError::WaitFailed(std::io::Error::last_os_error()));
        }

        let mut exit_code = 0;
        unsafe { GetExitCodeThread(self.handle, &mut exit_code) }
            .map_err(|_| InjectionError::ExitCodeFailed(std::io::Error::last_os_error()))?;

        log::debug!("Remote thread exited with 0x{:X}", exit_code);
        Ok(exit_code)
    }
}

impl Drop for RemoteThread {
    fn drop(&mut self) {
        unsafe {
            if !self.handle.is_invalid() {
                let _ = CloseHandle(self.handle);
            }
        }
    }
}

/// Run `start(parameter)` on a new thread in `process` and wait for its exit code.
///
/// # Safety
/// See [`RemoteThread::spawn`].
pub unsafe fn run_remote_thread(
    process: &ProcessHandle,
    start: usize,
    parameter: usize,
) -> Result<u32, InjectionError> {
    RemoteThread::spawn(process, start, parameter)?.join()
}
