//! Export address resolution in a remote process.
//!
//! The resolver never asks the operating system for symbols. It finds the
//! module in the target's loaded-module list, then reads the PE headers and
//! export tables out of the target's memory and walks them itself, following
//! forwarders into other modules.

use crate::error::ResolveError;
use crate::memory::MemoryReader;
use crate::pe::{ExportTarget, Forwarder, RemoteExportTable, RemoteImage};
use crate::process::ModuleLookup;

/// Forwarder hops followed before a lookup is abandoned.
pub const DEFAULT_MAX_FORWARD_DEPTH: usize = 8;

/// Resolves exported function addresses inside one target process.
pub struct RemoteSymbolResolver<'a, T: MemoryReader + ModuleLookup + ?Sized> {
    target: &'a T,
    max_forward_depth: usize,
}

impl<'a, T: MemoryReader + ModuleLookup + ?Sized> RemoteSymbolResolver<'a, T> {
    pub fn new(target: &'a T) -> Self {
        Self {
            target,
            max_forward_depth: DEFAULT_MAX_FORWARD_DEPTH,
        }
    }

    pub fn with_max_forward_depth(mut self, depth: usize) -> Self {
        self.max_forward_depth = depth;
        self
    }

    /// Absolute address of `module!function` in the target, or `None`.
    ///
    /// Every failure collapses to `None`; the reason is logged at debug level.
    pub fn resolve(&self, module: &str, function: &str) -> Option<usize> {
        match self.try_resolve(module, function) {
            Ok(address) => Some(address),
            Err(e) => {
                log::debug!("Could not resolve {}!{}: {}", module, function, e);
                None
            }
        }
    }

    /// Absolute address of `module!function` in the target.
    ///
    /// Names match ASCII case-insensitively. A function written as `#N` is
    /// looked up by ordinal. Forwarders are followed until a real address is
    /// found, a `(module, function)` pair repeats, or the hop limit is hit.
    pub fn try_resolve(&self, module: &str, function: &str) -> Result<usize, ResolveError> {
        let mut current = Forwarder {
            module: module.to_string(),
            function: function.to_string(),
        };
        let mut visited: Vec<Forwarder> = Vec::new();

        loop {
            if visited.iter().any(|seen| {
                seen.module.eq_ignore_ascii_case(&current.module)
                    && seen.function.eq_ignore_ascii_case(&current.function)
            }) {
                return Err(ResolveError::ForwarderCycle {
                    module: current.module,
                    function: current.function,
                });
            }

            if visited.len() > self.max_forward_depth {
                return Err(ResolveError::ForwarderDepthExceeded(self.max_forward_depth));
            }

            match self.lookup(&current)? {
                ExportTarget::Address(address) => {
                    log::debug!(
                        "Resolved {}!{} to 0x{:X} ({} forwarder hops)",
                        module,
                        function,
                        address,
                        visited.len()
                    );
                    return Ok(address);
                }
                ExportTarget::Forwarded(next) => {
                    visited.push(std::mem::replace(&mut current, next));
                }
            }
        }
    }

    /// Base address of the first loaded module named `module`, or `None`.
    pub fn find_module_base_address(&self, module: &str) -> Option<usize> {
        match self.target.find_module_base(module) {
            Ok(base) => base,
            Err(e) => {
                log::debug!("Module lookup for '{}' failed: {}", module, e);
                None
            }
        }
    }

    fn lookup(&self, export: &Forwarder) -> Result<ExportTarget, ResolveError> {
        let base = self
            .target
            .find_module_base(&export.module)?
            .ok_or_else(|| ResolveError::ModuleNotFound(export.module.clone()))?;

        let image = RemoteImage::read(self.target, base)?;
        let exports = RemoteExportTable::read(self.target, &image)?;

        match export.ordinal() {
            Some(ordinal) => exports.find_by_ordinal(self.target, ordinal),
            None => exports.find_by_name(self.target, &export.module, &export.function),
        }
    }
}

/// Address of `module!function` inside process `pid`, or `None`.
#[cfg(windows)]
pub fn find_exported_function_address(pid: u32, module: &str, function: &str) -> Option<usize> {
    use crate::process::{ProcessHandle, QUERY_ACCESS};

    let process = match ProcessHandle::open(pid, QUERY_ACCESS) {
        Ok(process) => process,
        Err(e) => {
            log::debug!("Cannot open process {} for resolution: {}", pid, e);
            return None;
        }
    };

    RemoteSymbolResolver::new(&process).resolve(module, function)
}

/// Base address of the first module named `module` in process `pid`, or `None`.
#[cfg(windows)]
pub fn find_module_base_address(pid: u32, module: &str) -> Option<usize> {
    match crate::process::ModuleEnumerator::find_by_name(pid, module) {
        Ok(entry) => entry.map(|m| m.base),
        Err(e) => {
            log::debug!("Module lookup for '{}' in {} failed: {}", module, pid, e);
            None
        }
    }
}
