//! Reading data from remote process memory.

use zerocopy::{FromBytes, IntoBytes};

use super::MemoryReader;
use crate::error::MemoryError;

/// Read a fixed-size structure from a remote process.
pub fn read_struct<T, R>(reader: &R, address: usize) -> Result<T, MemoryError>
where
    T: FromBytes + IntoBytes,
    R: MemoryReader + ?Sized,
{
    let mut value = T::new_zeroed();
    reader.read_memory(address, value.as_mut_bytes())?;
    Ok(value)
}

/// Read `count` consecutive values in a single remote read.
pub fn read_array<T, R>(reader: &R, address: usize, count: usize) -> Result<Vec<T>, MemoryError>
where
    T: FromBytes + IntoBytes + Copy,
    R: MemoryReader + ?Sized,
{
    let mut values = vec![T::new_zeroed(); count];
    if count > 0 {
        reader.read_memory(address, values.as_mut_slice().as_mut_bytes())?;
    }
    Ok(values)
}

#[cfg(windows)]
mod win32 {
    use windows::Win32::System::Diagnostics::Debug::ReadProcessMemory;

    use super::MemoryReader;
    use crate::error::MemoryError;
    use crate::process::ProcessHandle;

    impl MemoryReader for ProcessHandle {
        fn read_memory(&self, address: usize, buffer: &mut [u8]) -> Result<(), MemoryError> {
            let mut bytes_read = 0;

            unsafe {
                ReadProcessMemory(
                    self.as_handle(),
                    address as *const std::ffi::c_void,
                    buffer.as_mut_ptr() as *mut std::ffi::c_void,
                    buffer.len(),
                    Some(&mut bytes_read),
                )
                .map_err(|_| MemoryError::ReadFailed {
                    address,
                    size: buffer.len(),
                    source: std::io::Error::last_os_error(),
                })?;
            }

            if bytes_read != buffer.len() {
                return Err(MemoryError::ReadFailed {
                    address,
                    size: buffer.len(),
                    source: std::io::Error::other("Incomplete read operation"),
                });
            }

            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pe::ImageDataDirectory;
    use crate::testing::FakeProcess;

    #[test]
    fn test_read_struct() {
        let process = FakeProcess::new(1);
        process.map(0x1000, vec![0x00, 0x20, 0x00, 0x00, 0x80, 0x00, 0x00, 0x00]);

        let dir: ImageDataDirectory = read_struct(&process, 0x1000).unwrap();
        assert_eq!(dir.virtual_address, 0x2000);
        assert_eq!(dir.size, 0x80);
    }

    #[test]
    fn test_read_array() {
        let process = FakeProcess::new(1);
        process.map(0x1000, vec![1, 0, 2, 0, 3, 0]);

        let values: Vec<u16> = read_array(&process, 0x1000, 3).unwrap();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[test]
    fn test_read_array_empty_skips_read() {
        let process = FakeProcess::new(1);

        let values: Vec<u32> = read_array(&process, 0xDEAD_0000, 0).unwrap();
        assert!(values.is_empty());
        assert_eq!(process.read_count(), 0);
    }

    #[test]
    fn test_read_unmapped_fails() {
        let process = FakeProcess::new(1);
        process.map(0x1000, vec![0; 4]);

        // Straddles the end of the mapped region
        let result: Result<u64, _> = read_struct(&process, 0x1000);
        assert!(matches!(result, Err(MemoryError::ReadFailed { .. })));
    }
}
