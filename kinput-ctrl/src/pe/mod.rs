//! PE header and export table access for images mapped in another process.

mod exports;
mod headers;
mod image;

pub use exports::{
    ExportTarget, Forwarder, RemoteExportTable, MAX_EXPORT_ENTRIES, MAX_EXPORT_NAME_LEN,
};
pub use headers::*;
pub use image::{read_ascii_string, read_export_directory, read_section_headers, rva_to_address, RemoteImage};
