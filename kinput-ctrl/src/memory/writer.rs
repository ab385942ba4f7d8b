//! Writing data to remote process memory.

/// Encode `text` as a NUL-terminated UTF-16 string, in bytes.
///
/// This is the layout `LoadLibraryW` expects for its path argument.
pub fn encode_wide(text: &str) -> Vec<u8> {
    text.encode_utf16()
        .chain(std::iter::once(0))
        .flat_map(u16::to_le_bytes)
        .collect()
}

#[cfg(windows)]
mod win32 {
    use windows::Win32::System::Diagnostics::Debug::WriteProcessMemory;

    use crate::error::MemoryError;
    use crate::memory::MemoryWriter;
    use crate::process::ProcessHandle;

    impl MemoryWriter for ProcessHandle {
        fn write_memory(&self, address: usize, data: &[u8]) -> Result<(), MemoryError> {
            let mut bytes_written = 0;

            unsafe {
                WriteProcessMemory(
                    self.as_handle(),
                    address as *const std::ffi::c_void,
                    data.as_ptr() as *const std::ffi::c_void,
                    data.len(),
                    Some(&mut bytes_written),
                )
                .map_err(|_| MemoryError::WriteFailed {
                    address,
                    size: data.len(),
                    source: std::io::Error::last_os_error(),
                })?;
            }

            if bytes_written != data.len() {
                log::warn!(
                    "Partial write: {} of {} bytes written",
                    bytes_written,
                    data.len()
                );
                return Err(MemoryError::WriteFailed {
                    address,
                    size: data.len(),
                    source: std::io::Error::other("Incomplete write operation"),
                });
            }

            log::debug!(
                "Wrote {} bytes to 0x{:X} in remote process",
                bytes_written,
                address
            );

            Ok(())
        }
    }
}
