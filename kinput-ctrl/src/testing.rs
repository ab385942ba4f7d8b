//! In-memory target process and synthetic PE images for unit tests.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use zerocopy::IntoBytes;

use crate::error::{InjectionError, MemoryError, ProcessError};
use crate::injection::{InjectionResult, RemoteProcess};
use crate::memory::{MemoryAllocator, MemoryReader, MemoryWriter};
use crate::pe::*;
use crate::process::{find_module, ModuleEntry, ModuleLookup};

const PAGE: usize = 0x1000;
const ALLOCATION_BASE: usize = 0x6000_0000;

type Routine = Rc<dyn Fn(&FakeProcess, usize) -> u32>;

/// A process that lives entirely in this one.
///
/// Memory is a set of mapped regions, modules are a list of entries, and
/// "code" is a table of closures keyed by address that `run_thread` invokes.
pub struct FakeProcess {
    pid: u32,
    regions: RefCell<BTreeMap<usize, Vec<u8>>>,
    modules: RefCell<Vec<ModuleEntry>>,
    routines: RefCell<HashMap<usize, Routine>>,
    fallbacks: RefCell<HashMap<(String, String), usize>>,
    threads: RefCell<Vec<(usize, usize)>>,
    next_allocation: Cell<usize>,
    allocations: RefCell<Vec<usize>>,
    freed: RefCell<Vec<usize>>,
    reads: Cell<usize>,
    fail_writes: Cell<bool>,
    fail_allocations: Cell<bool>,
    fail_threads: Cell<bool>,
}

impl FakeProcess {
    pub fn new(pid: u32) -> Self {
        Self {
            pid,
            regions: RefCell::new(BTreeMap::new()),
            modules: RefCell::new(Vec::new()),
            routines: RefCell::new(HashMap::new()),
            fallbacks: RefCell::new(HashMap::new()),
            threads: RefCell::new(Vec::new()),
            next_allocation: Cell::new(ALLOCATION_BASE),
            allocations: RefCell::new(Vec::new()),
            freed: RefCell::new(Vec::new()),
            reads: Cell::new(0),
            fail_writes: Cell::new(false),
            fail_allocations: Cell::new(false),
            fail_threads: Cell::new(false),
        }
    }

    /// Map `bytes` at `address`.
    pub fn map(&self, address: usize, bytes: Vec<u8>) {
        self.regions.borrow_mut().insert(address, bytes);
    }

    /// Map an image and list it as a loaded module.
    pub fn load_image(&self, name: &str, base: usize, image: Vec<u8>) {
        let size = image.len() as u32;
        self.map(base, image);
        self.modules.borrow_mut().push(ModuleEntry {
            name: name.to_string(),
            path: format!("C:\\Windows\\System32\\{}", name),
            base,
            size,
        });
    }

    /// Drop the module at `base`. Returns whether one was loaded there.
    pub fn unload_module(&self, base: usize) -> bool {
        let mut modules = self.modules.borrow_mut();
        let before = modules.len();
        modules.retain(|m| m.base != base);
        self.regions.borrow_mut().remove(&base);
        modules.len() != before
    }

    /// Install code at `address`.
    pub fn add_routine(&self, address: usize, routine: impl Fn(&FakeProcess, usize) -> u32 + 'static) {
        self.routines.borrow_mut().insert(address, Rc::new(routine));
    }

    pub fn set_fallback_export(&self, module: &str, function: &str, address: usize) {
        self.fallbacks
            .borrow_mut()
            .insert((module.to_ascii_lowercase(), function.to_string()), address);
    }

    pub fn read_bytes(&self, address: usize, len: usize) -> Vec<u8> {
        let mut buffer = vec![0u8; len];
        self.read_memory(address, &mut buffer).unwrap();
        buffer
    }

    /// Read a NUL-terminated UTF-16LE string.
    pub fn read_wide_string(&self, address: usize) -> String {
        let mut units = Vec::new();
        let mut cursor = address;
        loop {
            let bytes = self.read_bytes(cursor, 2);
            let unit = u16::from_le_bytes([bytes[0], bytes[1]]);
            if unit == 0 {
                return String::from_utf16_lossy(&units);
            }
            units.push(unit);
            cursor += 2;
        }
    }

    /// `(start, parameter)` of every thread run so far.
    pub fn threads(&self) -> Vec<(usize, usize)> {
        self.threads.borrow().clone()
    }

    pub fn live_allocations(&self) -> usize {
        self.allocations.borrow().len()
    }

    pub fn freed(&self) -> Vec<usize> {
        self.freed.borrow().clone()
    }

    pub fn read_count(&self) -> usize {
        self.reads.get()
    }

    pub fn fail_writes(&self) {
        self.fail_writes.set(true);
    }

    pub fn fail_allocations(&self) {
        self.fail_allocations.set(true);
    }

    pub fn fail_threads(&self) {
        self.fail_threads.set(true);
    }

    /// Region containing `[address, address + len)`, as (start, offset).
    fn locate(&self, address: usize, len: usize) -> Option<(usize, usize)> {
        let regions = self.regions.borrow();
        let (&start, bytes) = regions.range(..=address).next_back()?;
        let offset = address - start;
        (offset.checked_add(len)? <= bytes.len()).then_some((start, offset))
    }
}

impl MemoryReader for FakeProcess {
    fn read_memory(&self, address: usize, buffer: &mut [u8]) -> Result<(), MemoryError> {
        self.reads.set(self.reads.get() + 1);

        let (start, offset) =
            self.locate(address, buffer.len())
                .ok_or_else(|| MemoryError::ReadFailed {
                    address,
                    size: buffer.len(),
                    source: std::io::Error::other("unmapped"),
                })?;

        let regions = self.regions.borrow();
        buffer.copy_from_slice(&regions[&start][offset..offset + buffer.len()]);
        Ok(())
    }
}

impl MemoryWriter for FakeProcess {
    fn write_memory(&self, address: usize, data: &[u8]) -> Result<(), MemoryError> {
        let failure = |reason: &str| MemoryError::WriteFailed {
            address,
            size: data.len(),
            source: std::io::Error::other(reason.to_string()),
        };

        if self.fail_writes.get() {
            return Err(failure("write refused"));
        }

        let (start, offset) = self.locate(address, data.len()).ok_or_else(|| failure("unmapped"))?;
        let mut regions = self.regions.borrow_mut();
        let region = regions.get_mut(&start).ok_or_else(|| failure("unmapped"))?;
        region[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }
}

impl MemoryAllocator for FakeProcess {
    fn allocate(&self, size: usize) -> Result<usize, MemoryError> {
        if self.fail_allocations.get() {
            return Err(MemoryError::AllocationFailed(
                size,
                std::io::Error::other("allocation refused"),
            ));
        }

        let address = self.next_allocation.get();
        let pages = size.div_ceil(PAGE).max(1);
        self.next_allocation.set(address + pages * PAGE);

        self.map(address, vec![0; size]);
        self.allocations.borrow_mut().push(address);
        Ok(address)
    }

    fn free(&self, address: usize) -> Result<(), MemoryError> {
        let mut allocations = self.allocations.borrow_mut();
        let Some(index) = allocations.iter().position(|&a| a == address) else {
            return Err(MemoryError::FreeFailed(
                address,
                std::io::Error::other("not allocated"),
            ));
        };

        allocations.remove(index);
        self.regions.borrow_mut().remove(&address);
        self.freed.borrow_mut().push(address);
        Ok(())
    }
}

impl ModuleLookup for FakeProcess {
    fn find_module_base(&self, module_name: &str) -> Result<Option<usize>, ProcessError> {
        Ok(find_module(&self.modules.borrow(), module_name).map(|m| m.base))
    }
}

impl RemoteProcess for FakeProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    unsafe fn run_thread(&self, start: usize, parameter: usize) -> InjectionResult<u32> {
        if self.fail_threads.get() {
            return Err(InjectionError::CreateThreadFailed(std::io::Error::other(
                "thread creation refused",
            )));
        }

        self.threads.borrow_mut().push((start, parameter));

        let routine = self.routines.borrow().get(&start).cloned().ok_or_else(|| {
            InjectionError::CreateThreadFailed(std::io::Error::other(format!(
                "no code at 0x{:X}",
                start
            )))
        })?;

        Ok(routine(self, parameter))
    }

    fn loaded_modules(&self) -> Result<Vec<ModuleEntry>, ProcessError> {
        Ok(self.modules.borrow().clone())
    }

    fn fallback_export(&self, module: &str, function: &str) -> Option<usize> {
        self.fallbacks
            .borrow()
            .get(&(module.to_ascii_lowercase(), function.to_string()))
            .copied()
    }
}

/// RVA of the first export's code in images from [`ImageBuilder`].
pub const CODE_RVA: u32 = 0x4000;
/// Distance between consecutive exports' code.
pub const CODE_STRIDE: u32 = 0x10;

const NT_HEADERS_OFFSET: usize = 0x80;
const EXPORT_RVA: u32 = 0x1000;

/// Forwarder strings placed here are inside the export span but never mapped.
pub const UNMAPPED_FORWARD_RVA: u32 = 0x3000;

/// Address of export `index`'s code in an image built at `base`.
pub fn code_address(base: usize, index: usize) -> usize {
    base + CODE_RVA as usize + index * CODE_STRIDE as usize
}

enum ExportKind {
    Code,
    Forward(String),
    UnmappedForward,
}

/// Builds a minimal mapped PE image with an export table.
///
/// Layout: DOS header at 0, NT headers at 0x80, one section header, and the
/// export directory with its tables and strings at RVA 0x1000. Export `i`
/// points at `CODE_RVA + i * CODE_STRIDE` unless it is a forwarder. The
/// ordinal base is 1.
pub struct ImageBuilder {
    exports: Vec<(String, ExportKind)>,
    remaps: Vec<(usize, u16)>,
    dos_magic: u16,
    nt_signature: u32,
    edata_only: bool,
    with_exports: bool,
    declared_names: Option<u32>,
}

impl ImageBuilder {
    pub fn new() -> Self {
        Self {
            exports: Vec::new(),
            remaps: Vec::new(),
            dos_magic: IMAGE_DOS_SIGNATURE,
            nt_signature: IMAGE_NT_SIGNATURE,
            edata_only: false,
            with_exports: true,
            declared_names: None,
        }
    }

    pub fn export(mut self, name: &str) -> Self {
        self.exports.push((name.to_string(), ExportKind::Code));
        self
    }

    /// Export `name` as a forwarder to `target` ("Module.Function").
    pub fn forward(mut self, name: &str, target: &str) -> Self {
        self.exports
            .push((name.to_string(), ExportKind::Forward(target.to_string())));
        self
    }

    /// Export `name` as a forwarder whose string cannot be read.
    pub fn unreadable_forward(mut self, name: &str) -> Self {
        self.exports.push((name.to_string(), ExportKind::UnmappedForward));
        self
    }

    /// Give the name at `index` the ordinal slot `ordinal`.
    pub fn remap(mut self, index: usize, ordinal: u16) -> Self {
        self.remaps.push((index, ordinal));
        self
    }

    pub fn dos_magic(mut self, magic: u16) -> Self {
        self.dos_magic = magic;
        self
    }

    pub fn nt_signature(mut self, signature: u32) -> Self {
        self.nt_signature = signature;
        self
    }

    /// Locate the export directory through an `.edata` section only.
    pub fn edata_only(mut self) -> Self {
        self.edata_only = true;
        self
    }

    pub fn without_exports(mut self) -> Self {
        self.with_exports = false;
        self
    }

    /// Override the name count written into the export directory.
    pub fn declared_names(mut self, count: u32) -> Self {
        self.declared_names = Some(count);
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut image = vec![0u8; PAGE];

        let export_size = if self.with_exports {
            self.write_exports(&mut image)
        } else {
            0
        };

        let dos_header = ImageDosHeader {
            e_magic: self.dos_magic,
            e_lfanew: NT_HEADERS_OFFSET as i32,
            ..Default::default()
        };
        put(&mut image, 0, dos_header.as_bytes());

        let mut nt_headers = ImageNtHeaders::default();
        nt_headers.signature = self.nt_signature;
        nt_headers.file_header.machine = if cfg!(target_pointer_width = "64") {
            IMAGE_FILE_MACHINE_AMD64
        } else {
            IMAGE_FILE_MACHINE_I386
        };
        nt_headers.file_header.number_of_sections = 1;
        nt_headers.file_header.size_of_optional_header =
            std::mem::size_of_val(&nt_headers.optional_header) as u16;
        nt_headers.optional_header.magic = IMAGE_NT_OPTIONAL_HDR_MAGIC;
        nt_headers.optional_header.number_of_rva_and_sizes = IMAGE_NUMBEROF_DIRECTORY_ENTRIES as u32;
        if self.with_exports && !self.edata_only {
            nt_headers.optional_header.data_directory[IMAGE_DIRECTORY_ENTRY_EXPORT] = ImageDataDirectory {
                virtual_address: EXPORT_RVA,
                size: export_size,
            };
        }

        let mut section = ImageSectionHeader::default();
        if self.with_exports && self.edata_only {
            section.name[..6].copy_from_slice(b".edata");
            section.virtual_address = EXPORT_RVA;
            section.virtual_size = export_size;
        } else {
            section.name[..5].copy_from_slice(b".text");
            section.virtual_address = CODE_RVA;
            section.virtual_size = PAGE as u32;
        }

        let section_offset = NT_HEADERS_OFFSET + nt_headers.section_table_offset();
        image.resize(image.len().div_ceil(PAGE) * PAGE, 0);
        nt_headers.optional_header.size_of_image = image.len() as u32;

        put(&mut image, NT_HEADERS_OFFSET, nt_headers.as_bytes());
        put(&mut image, section_offset, section.as_bytes());
        image
    }

    /// Write the export directory, tables and strings; returns their size.
    fn write_exports(&self, image: &mut Vec<u8>) -> u32 {
        let count = self.exports.len();
        let directory_size = std::mem::size_of::<ImageExportDirectory>();

        let functions_rva = EXPORT_RVA as usize + directory_size;
        let names_rva = functions_rva + 4 * count;
        let ordinals_rva = names_rva + 4 * count;
        let mut cursor = ordinals_rva + 2 * count;

        let mut names = Vec::with_capacity(count);
        for (name, _) in &self.exports {
            names.push(cursor as u32);
            put(image, cursor, name.as_bytes());
            cursor += name.len() + 1;
        }

        let mut functions = Vec::with_capacity(count);
        for (index, (_, kind)) in self.exports.iter().enumerate() {
            match kind {
                ExportKind::Code => functions.push(CODE_RVA + index as u32 * CODE_STRIDE),
                ExportKind::Forward(target) => {
                    functions.push(cursor as u32);
                    put(image, cursor, target.as_bytes());
                    cursor += target.len() + 1;
                }
                ExportKind::UnmappedForward => functions.push(UNMAPPED_FORWARD_RVA),
            }
        }

        let mut ordinals: Vec<u16> = (0..count as u16).collect();
        for &(index, ordinal) in &self.remaps {
            ordinals[index] = ordinal;
        }

        put(image, functions_rva, functions.as_bytes());
        put(image, names_rva, names.as_bytes());
        put(image, ordinals_rva, ordinals.as_bytes());

        let directory = ImageExportDirectory {
            base: 1,
            number_of_functions: count as u32,
            number_of_names: self.declared_names.unwrap_or(count as u32),
            address_of_functions: functions_rva as u32,
            address_of_names: names_rva as u32,
            address_of_name_ordinals: ordinals_rva as u32,
            ..Default::default()
        };
        put(image, EXPORT_RVA as usize, directory.as_bytes());

        // Keep the terminator of the last string inside the image
        put(image, cursor, &[0]);

        let mut end = cursor + 1;
        if self.exports.iter().any(|(_, kind)| matches!(kind, ExportKind::UnmappedForward)) {
            end = end.max(UNMAPPED_FORWARD_RVA as usize + CODE_STRIDE as usize);
        }
        (end - EXPORT_RVA as usize) as u32
    }
}

/// Copy `bytes` to `offset`, growing the image as needed.
fn put(image: &mut Vec<u8>, offset: usize, bytes: &[u8]) {
    let end = offset + bytes.len();
    if image.len() < end {
        image.resize(end, 0);
    }
    image[offset..end].copy_from_slice(bytes);
}
