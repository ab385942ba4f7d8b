//! Export table walking in a remote process.

use std::ops::Range;

use super::headers::*;
use super::image::{read_ascii_string, rva_to_address, RemoteImage};
use crate::error::ResolveError;
use crate::memory::{read_array, MemoryReader};

/// Longest export or forwarder name that will be read from a target.
pub const MAX_EXPORT_NAME_LEN: usize = 4096;

/// Upper bound on declared table sizes; ordinals are 16-bit.
pub const MAX_EXPORT_ENTRIES: u32 = 0x10000;

/// A forwarded export: "Module.Function" naming the real implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Forwarder {
    /// Module name, with ".dll" appended (e.g., "NTDLL.dll")
    pub module: String,
    /// Function name, or "#N" for a forward by ordinal
    pub function: String,
}

impl Forwarder {
    /// Parse a forwarder string, splitting on the first '.'.
    pub fn parse(forward: &str) -> Result<Self, ResolveError> {
        match forward.split_once('.') {
            Some((module, function)) if !module.is_empty() && !function.is_empty() => Ok(Self {
                module: format!("{}.dll", module),
                function: function.to_string(),
            }),
            _ => Err(ResolveError::MalformedForwarder(forward.to_string())),
        }
    }

    /// Ordinal for a forward by ordinal ("Module.#42").
    pub fn ordinal(&self) -> Option<u16> {
        self.function.strip_prefix('#')?.parse().ok()
    }
}

/// Where an export lookup ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportTarget {
    /// Absolute address of the function in the remote process
    Address(usize),
    /// The export lives in another module
    Forwarded(Forwarder),
}

/// Export tables of one module, read from a remote process.
///
/// The three tables are fetched with one bulk read each and dropped with
/// this value.
#[derive(Debug)]
pub struct RemoteExportTable {
    base: usize,
    directory: ImageExportDirectory,
    span: Range<usize>,
    functions: Vec<u32>,
    names: Vec<u32>,
    ordinals: Vec<u16>,
}

impl RemoteExportTable {
    /// Read the export directory and its tables for `image`.
    pub fn read<R: MemoryReader + ?Sized>(
        reader: &R,
        image: &RemoteImage,
    ) -> Result<Self, ResolveError> {
        let directory = image.export_directory(reader)?;

        log::debug!(
            "Export directory at 0x{:X}: functions={}, names={}, base={}",
            image.base,
            directory.number_of_functions,
            directory.number_of_names,
            directory.base
        );

        for count in [directory.number_of_functions, directory.number_of_names] {
            if count > MAX_EXPORT_ENTRIES {
                return Err(ResolveError::ExportTableTooLarge(count));
            }
        }

        let functions = read_array(
            reader,
            image.address_of(directory.address_of_functions)?,
            directory.number_of_functions as usize,
        )?;
        let names = read_array(
            reader,
            image.address_of(directory.address_of_names)?,
            directory.number_of_names as usize,
        )?;
        let ordinals = read_array(
            reader,
            image.address_of(directory.address_of_name_ordinals)?,
            directory.number_of_names as usize,
        )?;

        // Forwarders point back inside the export data directory
        let span = match image.nt_headers.data_directory(IMAGE_DIRECTORY_ENTRY_EXPORT) {
            Some(dir) => {
                let start = image.address_of(dir.virtual_address)?;
                start..start.saturating_add(dir.size as usize)
            }
            None => image.base..image.base,
        };

        Ok(Self {
            base: image.base,
            directory,
            span,
            functions,
            names,
            ordinals,
        })
    }

    /// Whether `address` lies inside the export directory, i.e. names a forwarder.
    pub fn is_forwarder(&self, address: usize) -> bool {
        self.span.contains(&address)
    }

    /// Look up an export by name, ignoring ASCII case.
    ///
    /// Names are scanned in table order. A match whose function slot lies in
    /// the export directory is reported as a forwarder. When the name's
    /// ordinal differs from its position, the ordinal-indexed slot wins.
    pub fn find_by_name<R: MemoryReader + ?Sized>(
        &self,
        reader: &R,
        module: &str,
        function: &str,
    ) -> Result<ExportTarget, ResolveError> {
        for (index, &name_rva) in self.names.iter().enumerate() {
            let name = match read_ascii_string(
                reader,
                rva_to_address(self.base, name_rva)?,
                MAX_EXPORT_NAME_LEN,
            ) {
                Ok(name) => name,
                Err(e) => {
                    log::trace!("Skipping export name {}: {}", index, e);
                    continue;
                }
            };

            if !name.eq_ignore_ascii_case(function) {
                continue;
            }

            let scanned = match self.functions.get(index) {
                Some(&rva) => Some(rva_to_address(self.base, rva)?),
                None => None,
            };

            if let Some(address) = scanned.filter(|&a| self.is_forwarder(a)) {
                match read_ascii_string(reader, address, MAX_EXPORT_NAME_LEN) {
                    Ok(forward) => {
                        log::debug!("{}!{} forwarded to {}", module, name, forward);
                        return Ok(ExportTarget::Forwarded(Forwarder::parse(&forward)?));
                    }
                    Err(e) => {
                        log::debug!("Unreadable forwarder for {}!{}: {}", module, name, e);
                        continue;
                    }
                }
            }

            let ordinal = self.ordinals[index];
            if ordinal as usize != index {
                let remapped = ordinal as usize;
                let (Some(&function_rva), Some(&name_rva)) =
                    (self.functions.get(remapped), self.names.get(remapped))
                else {
                    return Err(ResolveError::OrdinalOutOfRange(ordinal as u32));
                };

                // The remapped name must at least be readable
                read_ascii_string(reader, rva_to_address(self.base, name_rva)?, MAX_EXPORT_NAME_LEN)?;

                log::debug!("{}!{} remapped to slot {}", module, name, remapped);
                return Ok(ExportTarget::Address(rva_to_address(self.base, function_rva)?));
            }

            return scanned
                .map(ExportTarget::Address)
                .ok_or(ResolveError::OrdinalOutOfRange(index as u32));
        }

        Err(ResolveError::ExportNotFound {
            module: module.to_string(),
            function: function.to_string(),
        })
    }

    /// Look up an export by its biased ordinal.
    pub fn find_by_ordinal<R: MemoryReader + ?Sized>(
        &self,
        reader: &R,
        ordinal: u16,
    ) -> Result<ExportTarget, ResolveError> {
        let rva = (ordinal as u32)
            .checked_sub(self.directory.base)
            .and_then(|index| self.functions.get(index as usize))
            .copied()
            .filter(|&rva| rva != 0)
            .ok_or(ResolveError::OrdinalOutOfRange(ordinal as u32))?;

        let address = rva_to_address(self.base, rva)?;
        if self.is_forwarder(address) {
            let forward = read_ascii_string(reader, address, MAX_EXPORT_NAME_LEN)?;
            return Ok(ExportTarget::Forwarded(Forwarder::parse(&forward)?));
        }

        Ok(ExportTarget::Address(address))
    }
}
