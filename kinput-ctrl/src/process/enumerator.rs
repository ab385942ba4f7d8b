// Process enumeration, used to turn a process name into a PID

use std::fmt;

use crate::error::ProcessError;
use crate::process::SnapshotGuard;
use windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, Process32FirstW, Process32NextW, PROCESSENTRY32W, TH32CS_SNAPPROCESS,
};

/// Information about a process
#[derive(Debug, Clone)]
pub struct ProcessInfo {
    /// Process ID
    pub pid: u32,
    /// Process name (e.g., "notepad.exe")
    pub name: String,
    /// Parent process ID
    pub parent_pid: u32,
    /// Number of threads
    pub thread_count: u32,
}

impl ProcessInfo {
    fn from_entry(entry: &PROCESSENTRY32W) -> Self {
        let len = entry
            .szExeFile
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(entry.szExeFile.len());

        Self {
            pid: entry.th32ProcessID,
            name: String::from_utf16_lossy(&entry.szExeFile[..len]),
            parent_pid: entry.th32ParentProcessID,
            thread_count: entry.cntThreads,
        }
    }
}

impl fmt::Display for ProcessInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Process {{ pid: {}, name: \"{}\", threads: {} }}",
            self.pid, self.name, self.thread_count
        )
    }
}

/// Enumerates running processes on the system
pub struct ProcessEnumerator;

impl ProcessEnumerator {
    /// Enumerates all running processes on the system
    pub fn enumerate() -> Result<Vec<ProcessInfo>, ProcessError> {
        let snapshot = unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0) }.map_err(|e| {
            ProcessError::SnapshotFailed(std::io::Error::from_raw_os_error(e.code().0))
        })?;

        let _guard = SnapshotGuard(snapshot);

        let mut entry = PROCESSENTRY32W {
            dwSize: std::mem::size_of::<PROCESSENTRY32W>() as u32,
            ..Default::default()
        };

        unsafe { Process32FirstW(snapshot, &mut entry) }
            .map_err(|_| ProcessError::EnumerationFailed(std::io::Error::last_os_error()))?;

        let mut processes = vec![ProcessInfo::from_entry(&entry)];

        loop {
            entry.dwSize = std::mem::size_of::<PROCESSENTRY32W>() as u32;
            if unsafe { Process32NextW(snapshot, &mut entry) }.is_err() {
                break;
            }
            processes.push(ProcessInfo::from_entry(&entry));
        }

        Ok(processes)
    }

    /// Finds a process by its process ID (PID)
    pub fn find_by_pid(pid: u32) -> Result<ProcessInfo, ProcessError> {
        Self::enumerate()?
            .into_iter()
            .find(|p| p.pid == pid)
            .ok_or(ProcessError::ProcessNotFound(pid))
    }

    /// Finds all processes matching the given name (case-insensitive substring match)
    pub fn find_by_name(name: &str) -> Result<Vec<ProcessInfo>, ProcessError> {
        let name_lower = name.to_lowercase();

        Ok(Self::enumerate()?
            .into_iter()
            .filter(|p| p.name.to_lowercase().contains(&name_lower))
            .collect())
    }
}
