//! `RemoteProcess` for real Windows processes.

use std::ffi::CString;

use windows::core::PCSTR;
use windows::Win32::System::LibraryLoader::{GetModuleHandleA, GetProcAddress};

use super::traits::{InjectionResult, RemoteProcess};
use crate::error::ProcessError;
use crate::process::{run_remote_thread, ModuleEntry, ModuleEnumerator, ProcessHandle};

impl RemoteProcess for ProcessHandle {
    fn pid(&self) -> u32 {
        ProcessHandle::pid(self)
    }

    unsafe fn run_thread(&self, start: usize, parameter: usize) -> InjectionResult<u32> {
        run_remote_thread(self, start, parameter)
    }

    fn loaded_modules(&self) -> Result<Vec<ModuleEntry>, ProcessError> {
        ModuleEnumerator::enumerate(ProcessHandle::pid(self))
    }

    fn fallback_export(&self, module: &str, function: &str) -> Option<usize> {
        let module = CString::new(module).ok()?;
        let function = CString::new(function).ok()?;

        unsafe {
            let local = GetModuleHandleA(PCSTR::from_raw(module.as_ptr() as *const u8)).ok()?;
            GetProcAddress(local, PCSTR::from_raw(function.as_ptr() as *const u8))
                .map(|routine| routine as usize)
        }
    }
}
