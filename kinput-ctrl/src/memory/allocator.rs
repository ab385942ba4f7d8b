//! Remote memory allocation with RAII cleanup.

use super::{MemoryAllocator, MemoryWriter};
use crate::error::MemoryError;

/// RAII wrapper for remotely allocated memory.
///
/// Automatically frees memory when dropped, on success and failure paths alike.
pub struct RemoteMemory<'a, A: MemoryAllocator + ?Sized> {
    allocator: &'a A,
    address: usize,
    size: usize,
}

impl<'a, A: MemoryAllocator + ?Sized> RemoteMemory<'a, A> {
    /// Allocate `size` bytes of read/write memory in the target process.
    ///
    /// # Errors
    /// Returns `MemoryError::AllocationFailed` on failure.
    pub fn allocate(allocator: &'a A, size: usize) -> Result<Self, MemoryError> {
        let address = allocator.allocate(size)?;

        log::debug!(
            "Allocated {} bytes at 0x{:X} in remote process",
            size,
            address
        );

        Ok(Self {
            allocator,
            address,
            size,
        })
    }

    /// Allocate memory sized to `data` and copy `data` into it.
    ///
    /// If the write fails the allocation is released before returning.
    pub fn with_data(allocator: &'a A, data: &[u8]) -> Result<Self, MemoryError>
    where
        A: MemoryWriter,
    {
        let memory = Self::allocate(allocator, data.len())?;
        allocator.write_memory(memory.address, data)?;
        Ok(memory)
    }

    /// Get the address of the allocated memory.
    pub fn address(&self) -> usize {
        self.address
    }

    /// Get the size of the allocation.
    pub fn size(&self) -> usize {
        self.size
    }
}

impl<A: MemoryAllocator + ?Sized> Drop for RemoteMemory<'_, A> {
    fn drop(&mut self) {
        match self.allocator.free(self.address) {
            Ok(()) => log::debug!("Freed remote memory at 0x{:X}", self.address),
            Err(e) => log::warn!(
                "Failed to free remote memory at 0x{:X}: {}",
                self.address,
                e
            ),
        }
    }
}

#[cfg(windows)]
mod win32 {
    use windows::Win32::System::Memory::{
        VirtualAllocEx, VirtualFreeEx, MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_READWRITE,
    };

    use super::MemoryAllocator;
    use crate::error::MemoryError;
    use crate::process::ProcessHandle;

    impl MemoryAllocator for ProcessHandle {
        fn allocate(&self, size: usize) -> Result<usize, MemoryError> {
            let address = unsafe {
                VirtualAllocEx(
                    self.as_handle(),
                    None,
                    size,
                    MEM_COMMIT | MEM_RESERVE,
                    PAGE_READWRITE,
                )
            };

            if address.is_null() {
                return Err(MemoryError::AllocationFailed(
                    size,
                    std::io::Error::last_os_error(),
                ));
            }

            Ok(address as usize)
        }

        fn free(&self, address: usize) -> Result<(), MemoryError> {
            unsafe {
                VirtualFreeEx(
                    self.as_handle(),
                    address as *mut std::ffi::c_void,
                    0,
                    MEM_RELEASE,
                )
            }
            .map_err(|_| MemoryError::FreeFailed(address, std::io::Error::last_os_error()))
        }
    }
}
