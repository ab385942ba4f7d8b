//! Remote memory management operations.
//!
//! The traits here are the seam between the PE walker / injector and the
//! operating system. `ProcessHandle` implements them on Windows.

pub mod allocator;
pub mod reader;
pub mod writer;

use crate::error::MemoryError;

pub use allocator::RemoteMemory;
pub use reader::{read_array, read_struct};
pub use writer::encode_wide;

/// Read access to another process's address space.
pub trait MemoryReader {
    /// Read exactly `buffer.len()` bytes starting at `address`.
    ///
    /// A partial read is an error.
    fn read_memory(&self, address: usize, buffer: &mut [u8]) -> Result<(), MemoryError>;
}

/// Write access to another process's address space.
pub trait MemoryWriter {
    /// Write all of `data` starting at `address`.
    ///
    /// A partial write is an error.
    fn write_memory(&self, address: usize, data: &[u8]) -> Result<(), MemoryError>;
}

/// Allocation of read/write memory in another process.
pub trait MemoryAllocator {
    /// Commit `size` bytes of read/write memory and return its address.
    fn allocate(&self, size: usize) -> Result<usize, MemoryError>;

    /// Release an allocation previously returned by [`MemoryAllocator::allocate`].
    fn free(&self, address: usize) -> Result<(), MemoryError>;
}
