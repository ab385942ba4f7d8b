//! Header access for a module mapped in another process.

use super::headers::*;
use crate::error::{MemoryError, ResolveError};
use crate::memory::{read_array, read_struct, MemoryReader};

const PAGE_SIZE: usize = 0x1000;

/// Headers of a module image read from a remote process.
///
/// Only the fixed-size header structures are copied; the image itself stays
/// in the target.
#[derive(Debug, Clone, Copy)]
pub struct RemoteImage {
    /// Base address of the module in the remote process
    pub base: usize,
    /// DOS header
    pub dos_header: ImageDosHeader,
    /// NT headers (native pointer width)
    pub nt_headers: ImageNtHeaders,
}

impl RemoteImage {
    /// Read and validate the DOS and NT headers of the module at `base`.
    pub fn read<R: MemoryReader + ?Sized>(reader: &R, base: usize) -> Result<Self, ResolveError> {
        let dos_header: ImageDosHeader = read_struct(reader, base)?;

        log::trace!(
            "DOS header at 0x{:X}: magic=0x{:04X}, e_lfanew=0x{:08X}",
            base,
            dos_header.e_magic,
            dos_header.e_lfanew
        );

        dos_header.validate()?;

        let nt_headers: ImageNtHeaders = read_struct(reader, nt_headers_address(base, &dos_header)?)?;
        nt_headers.validate()?;

        Ok(Self {
            base,
            dos_header,
            nt_headers,
        })
    }

    /// Translate an RVA into an absolute address in the remote process.
    pub fn address_of(&self, rva: u32) -> Result<usize, MemoryError> {
        rva_to_address(self.base, rva)
    }

    /// Read the export directory of this module.
    pub fn export_directory<R: MemoryReader + ?Sized>(
        &self,
        reader: &R,
    ) -> Result<ImageExportDirectory, ResolveError> {
        read_export_directory(reader, self.base, &self.dos_header, &self.nt_headers)
    }
}

/// Translate an RVA relative to `base` into an absolute address.
pub fn rva_to_address(base: usize, rva: u32) -> Result<usize, MemoryError> {
    base.checked_add(rva as usize)
        .ok_or(MemoryError::AddressOverflow(base))
}

fn nt_headers_address(base: usize, dos_header: &ImageDosHeader) -> Result<usize, MemoryError> {
    let offset =
        usize::try_from(dos_header.e_lfanew).map_err(|_| MemoryError::AddressOverflow(base))?;
    base.checked_add(offset)
        .ok_or(MemoryError::AddressOverflow(base))
}

/// Read the export directory of the module at `base`.
///
/// A section named `.edata` takes precedence when present; otherwise the
/// directory is read at the RVA of the first data directory entry.
pub fn read_export_directory<R: MemoryReader + ?Sized>(
    reader: &R,
    base: usize,
    dos_header: &ImageDosHeader,
    nt_headers: &ImageNtHeaders,
) -> Result<ImageExportDirectory, ResolveError> {
    match read_section_headers(reader, base, dos_header, nt_headers) {
        Ok(sections) => {
            for section in sections.iter().filter(|s| s.is_named(EXPORT_SECTION_NAME)) {
                let address = rva_to_address(base, section.virtual_address)?;
                match read_struct::<ImageExportDirectory, _>(reader, address) {
                    Ok(directory) => {
                        log::debug!("Export directory read from {} section", section.name());
                        return Ok(directory);
                    }
                    Err(e) => log::debug!("Unreadable {} section: {}", section.name(), e),
                }
            }
        }
        Err(e) => log::debug!("Section table at 0x{:X} unreadable: {}", base, e),
    }

    let rva = nt_headers
        .data_directory(IMAGE_DIRECTORY_ENTRY_EXPORT)
        .map(|dir| dir.virtual_address)
        .unwrap_or(0);
    if rva == 0 {
        return Err(ResolveError::ExportDirectoryMissing);
    }

    Ok(read_struct(reader, rva_to_address(base, rva)?)?)
}

/// Read the section table that follows the NT headers.
pub fn read_section_headers<R: MemoryReader + ?Sized>(
    reader: &R,
    base: usize,
    dos_header: &ImageDosHeader,
    nt_headers: &ImageNtHeaders,
) -> Result<Vec<ImageSectionHeader>, MemoryError> {
    let address = nt_headers_address(base, dos_header)?
        .checked_add(nt_headers.section_table_offset())
        .ok_or(MemoryError::AddressOverflow(base))?;

    read_array(
        reader,
        address,
        nt_headers.file_header.number_of_sections as usize,
    )
}

/// Read a NUL-terminated ASCII string of at most `max_len` bytes.
///
/// The string is read in page-bounded chunks so a short name near the end of
/// a mapping does not fault. Longer strings fail with `NameTooLong` instead
/// of being truncated.
pub fn read_ascii_string<R: MemoryReader + ?Sized>(
    reader: &R,
    address: usize,
    max_len: usize,
) -> Result<String, ResolveError> {
    let mut bytes = Vec::new();
    let mut cursor = address;

    loop {
        let remaining = max_len + 1 - bytes.len();
        let chunk_len = (PAGE_SIZE - cursor % PAGE_SIZE).min(remaining);

        let mut chunk = vec![0u8; chunk_len];
        reader.read_memory(cursor, &mut chunk)?;

        if let Some(nul) = chunk.iter().position(|&b| b == 0) {
            bytes.extend_from_slice(&chunk[..nul]);
            return Ok(String::from_utf8_lossy(&bytes).into_owned());
        }

        bytes.extend_from_slice(&chunk);
        if bytes.len() > max_len {
            return Err(ResolveError::NameTooLong(address, max_len));
        }

        cursor = cursor
            .checked_add(chunk_len)
            .ok_or(MemoryError::AddressOverflow(cursor))?;
    }
}
