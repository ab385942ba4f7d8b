//! PE image header structures and constants.
//!
//! These layouts are read straight out of another process's memory, so every
//! structure is `#[repr(C)]` and decoded with `zerocopy` rather than cast.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::error::ResolveError;

pub const IMAGE_DOS_SIGNATURE: u16 = u16::from_le_bytes(*b"MZ");
pub const IMAGE_NT_SIGNATURE: u32 = u32::from_le_bytes(*b"PE\0\0");

pub const IMAGE_NT_OPTIONAL_HDR32_MAGIC: u16 = 0x10b;
pub const IMAGE_NT_OPTIONAL_HDR64_MAGIC: u16 = 0x20b;

/// Optional header magic matching the pointer width of this build.
#[cfg(target_pointer_width = "64")]
pub const IMAGE_NT_OPTIONAL_HDR_MAGIC: u16 = IMAGE_NT_OPTIONAL_HDR64_MAGIC;
#[cfg(target_pointer_width = "32")]
pub const IMAGE_NT_OPTIONAL_HDR_MAGIC: u16 = IMAGE_NT_OPTIONAL_HDR32_MAGIC;

pub const IMAGE_FILE_MACHINE_I386: u16 = 0x014c;
pub const IMAGE_FILE_MACHINE_AMD64: u16 = 0x8664;

/// Index of the export table in the optional header's data directories.
pub const IMAGE_DIRECTORY_ENTRY_EXPORT: usize = 0;
pub const IMAGE_NUMBEROF_DIRECTORY_ENTRIES: usize = 16;

/// Name of the legacy section that may hold the export directory.
pub const EXPORT_SECTION_NAME: &str = ".edata";

/// MS-DOS stub header at offset 0 of every image.
///
/// Only the magic and the offset of the NT headers matter here; the real-mode
/// fields in between are kept as an opaque block.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct ImageDosHeader {
    pub e_magic: u16,
    pub e_stub: [u16; 29],
    pub e_lfanew: i32,
}

impl ImageDosHeader {
    /// Check for the `MZ` magic.
    pub fn validate(&self) -> Result<(), ResolveError> {
        if self.e_magic != IMAGE_DOS_SIGNATURE {
            return Err(ResolveError::InvalidDosHeader(self.e_magic));
        }
        Ok(())
    }
}

/// COFF file header, directly after the `PE\0\0` signature
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct ImageFileHeader {
    pub machine: u16,
    pub number_of_sections: u16,
    pub time_date_stamp: u32,
    pub pointer_to_symbol_table: u32,
    pub number_of_symbols: u32,
    pub size_of_optional_header: u16,
    pub characteristics: u16,
}

/// Location of one optional-header table, as an RVA and a byte count
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct ImageDataDirectory {
    pub virtual_address: u32,
    pub size: u32,
}

/// PE32+ optional header
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct ImageOptionalHeader64 {
    pub magic: u16,
    pub major_linker_version: u8,
    pub minor_linker_version: u8,
    pub size_of_code: u32,
    pub size_of_initialized_data: u32,
    pub size_of_uninitialized_data: u32,
    pub address_of_entry_point: u32,
    pub base_of_code: u32,
    pub image_base: u64,
    pub section_alignment: u32,
    pub file_alignment: u32,
    pub major_operating_system_version: u16,
    pub minor_operating_system_version: u16,
    pub major_image_version: u16,
    pub minor_image_version: u16,
    pub major_subsystem_version: u16,
    pub minor_subsystem_version: u16,
    pub win32_version_value: u32,
    pub size_of_image: u32,
    pub size_of_headers: u32,
    pub check_sum: u32,
    pub subsystem: u16,
    pub dll_characteristics: u16,
    pub size_of_stack_reserve: u64,
    pub size_of_stack_commit: u64,
    pub size_of_heap_reserve: u64,
    pub size_of_heap_commit: u64,
    pub loader_flags: u32,
    pub number_of_rva_and_sizes: u32,
    pub data_directory: [ImageDataDirectory; IMAGE_NUMBEROF_DIRECTORY_ENTRIES],
}

/// PE32 optional header
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct ImageOptionalHeader32 {
    pub magic: u16,
    pub major_linker_version: u8,
    pub minor_linker_version: u8,
    pub size_of_code: u32,
    pub size_of_initialized_data: u32,
    pub size_of_uninitialized_data: u32,
    pub address_of_entry_point: u32,
    pub base_of_code: u32,
    pub base_of_data: u32,
    pub image_base: u32,
    pub section_alignment: u32,
    pub file_alignment: u32,
    pub major_operating_system_version: u16,
    pub minor_operating_system_version: u16,
    pub major_image_version: u16,
    pub minor_image_version: u16,
    pub major_subsystem_version: u16,
    pub minor_subsystem_version: u16,
    pub win32_version_value: u32,
    pub size_of_image: u32,
    pub size_of_headers: u32,
    pub check_sum: u32,
    pub subsystem: u16,
    pub dll_characteristics: u16,
    pub size_of_stack_reserve: u32,
    pub size_of_stack_commit: u32,
    pub size_of_heap_reserve: u32,
    pub size_of_heap_commit: u32,
    pub loader_flags: u32,
    pub number_of_rva_and_sizes: u32,
    pub data_directory: [ImageDataDirectory; IMAGE_NUMBEROF_DIRECTORY_ENTRIES],
}

/// NT headers (64-bit)
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct ImageNtHeaders64 {
    pub signature: u32,
    pub file_header: ImageFileHeader,
    pub optional_header: ImageOptionalHeader64,
}

/// NT headers (32-bit)
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct ImageNtHeaders32 {
    pub signature: u32,
    pub file_header: ImageFileHeader,
    pub optional_header: ImageOptionalHeader32,
}

/// NT headers matching the pointer width of this build.
#[cfg(target_pointer_width = "64")]
pub type ImageNtHeaders = ImageNtHeaders64;
#[cfg(target_pointer_width = "32")]
pub type ImageNtHeaders = ImageNtHeaders32;

macro_rules! impl_nt_headers {
    ($ty:ty, $magic:expr) => {
        impl $ty {
            /// Validate the PE signature and the optional header magic.
            pub fn validate(&self) -> Result<(), ResolveError> {
                if self.signature != IMAGE_NT_SIGNATURE {
                    return Err(ResolveError::InvalidPeSignature(self.signature));
                }
                if self.optional_header.magic != $magic {
                    return Err(ResolveError::ArchitectureMismatch(self.optional_header.magic));
                }
                Ok(())
            }

            /// Get a data directory entry, if the header declares it.
            pub fn data_directory(&self, index: usize) -> Option<ImageDataDirectory> {
                if index >= self.optional_header.number_of_rva_and_sizes as usize {
                    return None;
                }
                self.optional_header.data_directory.get(index).copied()
            }

            /// Offset of the section table from the start of the NT headers.
            pub fn section_table_offset(&self) -> usize {
                std::mem::size_of::<u32>()
                    + std::mem::size_of::<ImageFileHeader>()
                    + self.file_header.size_of_optional_header as usize
            }
        }
    };
}

impl_nt_headers!(ImageNtHeaders64, IMAGE_NT_OPTIONAL_HDR64_MAGIC);
impl_nt_headers!(ImageNtHeaders32, IMAGE_NT_OPTIONAL_HDR32_MAGIC);

/// One entry of the section table
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct ImageSectionHeader {
    pub name: [u8; 8],
    pub virtual_size: u32,
    pub virtual_address: u32,
    pub size_of_raw_data: u32,
    pub pointer_to_raw_data: u32,
    pub pointer_to_relocations: u32,
    pub pointer_to_linenumbers: u32,
    pub number_of_relocations: u16,
    pub number_of_linenumbers: u16,
    pub characteristics: u32,
}

impl ImageSectionHeader {
    /// Section name without NUL padding. Eight-byte names are not terminated.
    fn name_bytes(&self) -> &[u8] {
        let end = self.name.iter().position(|&c| c == 0).unwrap_or(self.name.len());
        &self.name[..end]
    }

    pub fn name(&self) -> String {
        String::from_utf8_lossy(self.name_bytes()).into_owned()
    }

    /// Compare the section name, ignoring ASCII case.
    pub fn is_named(&self, name: &str) -> bool {
        self.name_bytes().eq_ignore_ascii_case(name.as_bytes())
    }
}

/// `IMAGE_EXPORT_DIRECTORY`; every address field is an RVA
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct ImageExportDirectory {
    pub characteristics: u32,
    pub time_date_stamp: u32,
    pub major_version: u16,
    pub minor_version: u16,
    /// Module's own name
    pub name: u32,
    /// Ordinal of the first function table entry
    pub base: u32,
    pub number_of_functions: u32,
    pub number_of_names: u32,
    pub address_of_functions: u32,
    pub address_of_names: u32,
    /// Table of u16 function indices, parallel to the name table
    pub address_of_name_ordinals: u32,
}
