//! Loaded-module lookup in a remote process.

use crate::error::ProcessError;

/// A module loaded in a remote process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleEntry {
    /// Module file name (e.g., "kernel32.dll")
    pub name: String,
    /// Full path of the module on disk
    pub path: String,
    /// Base address in the remote process
    pub base: usize,
    /// Size of the mapped image
    pub size: u32,
}

/// Finds modules loaded in a remote process.
pub trait ModuleLookup {
    /// Base address of the first loaded module whose name matches
    /// `module_name`, ignoring ASCII case.
    fn find_module_base(&self, module_name: &str) -> Result<Option<usize>, ProcessError>;
}

/// Find the first module named `name`, ignoring ASCII case.
pub fn find_module<'a>(modules: &'a [ModuleEntry], name: &str) -> Option<&'a ModuleEntry> {
    modules.iter().find(|m| m.name.eq_ignore_ascii_case(name))
}

/// File name component of a library path, accepting either separator.
pub fn module_file_name(path: &str) -> &str {
    path.rsplit(&['\\', '/'][..]).next().unwrap_or(path)
}

#[cfg(windows)]
pub use win32::ModuleEnumerator;

#[cfg(windows)]
mod win32 {
    use windows::Win32::System::Diagnostics::ToolHelp::{
        CreateToolhelp32Snapshot, Module32FirstW, Module32NextW, MODULEENTRY32W,
        TH32CS_SNAPMODULE, TH32CS_SNAPMODULE32,
    };

    use super::{find_module, ModuleEntry, ModuleLookup};
    use crate::error::ProcessError;
    use crate::process::{ProcessHandle, SnapshotGuard};

    fn wide_to_string(wide: &[u16]) -> String {
        let len = wide.iter().position(|&c| c == 0).unwrap_or(wide.len());
        String::from_utf16_lossy(&wide[..len])
    }

    /// Enumerates the modules loaded in a process
    pub struct ModuleEnumerator;

    impl ModuleEnumerator {
        /// Take a module snapshot of `pid`.
        pub fn enumerate(pid: u32) -> Result<Vec<ModuleEntry>, ProcessError> {
            let snapshot =
                unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPMODULE | TH32CS_SNAPMODULE32, pid) }
                    .map_err(|_| {
                        ProcessError::ModuleSnapshotFailed(pid, std::io::Error::last_os_error())
                    })?;

            let _guard = SnapshotGuard(snapshot);

            let mut entry = MODULEENTRY32W {
                dwSize: std::mem::size_of::<MODULEENTRY32W>() as u32,
                ..Default::default()
            };

            unsafe { Module32FirstW(snapshot, &mut entry) }.map_err(|_| {
                ProcessError::ModuleEnumerationFailed(pid, std::io::Error::last_os_error())
            })?;

            let mut modules = Vec::new();

            loop {
                modules.push(ModuleEntry {
                    name: wide_to_string(&entry.szModule),
                    path: wide_to_string(&entry.szExePath),
                    base: entry.modBaseAddr as usize,
                    size: entry.modBaseSize,
                });

                entry.dwSize = std::mem::size_of::<MODULEENTRY32W>() as u32;
                if unsafe { Module32NextW(snapshot, &mut entry) }.is_err() {
                    break;
                }
            }

            log::debug!("Found {} modules in PID {}", modules.len(), pid);
            Ok(modules)
        }

        /// Find a module of `pid` by name, ignoring ASCII case.
        pub fn find_by_name(pid: u32, name: &str) -> Result<Option<ModuleEntry>, ProcessError> {
            let modules = Self::enumerate(pid)?;
            Ok(find_module(&modules, name).cloned())
        }
    }

    impl ModuleLookup for ProcessHandle {
        fn find_module_base(&self, module_name: &str) -> Result<Option<usize>, ProcessError> {
            Ok(ModuleEnumerator::find_by_name(self.pid(), module_name)?.map(|m| m.base))
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_enumerate_own_modules() {
            let modules = ModuleEnumerator::enumerate(std::process::id())
                .expect("Should enumerate own modules");

            assert!(find_module(&modules, "KERNEL32.DLL").is_some());
            assert!(find_module(&modules, "ntdll.dll").is_some());
        }

        #[test]
        fn test_find_missing_module() {
            let found = ModuleEnumerator::find_by_name(std::process::id(), "not-loaded.dll")
                .expect("Enumeration should succeed");
            assert!(found.is_none());
        }
    }
}
