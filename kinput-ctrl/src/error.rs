// Error types for resolution and injection operations

use thiserror::Error;

/// Errors related to process and module enumeration
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Failed to create process snapshot: {0}")]
    SnapshotFailed(#[source] std::io::Error),

    #[error("Failed to enumerate processes: {0}")]
    EnumerationFailed(#[source] std::io::Error),

    #[error("Process not found: {0}")]
    ProcessNotFound(u32),

    #[error("Failed to open process handle: {0}")]
    OpenProcessFailed(#[source] std::io::Error),

    #[error("Failed to query process {0}: {1}")]
    QueryFailed(u32, #[source] std::io::Error),

    #[error("Failed to create module snapshot for process {0}: {1}")]
    ModuleSnapshotFailed(u32, #[source] std::io::Error),

    #[error("Failed to enumerate modules of process {0}: {1}")]
    ModuleEnumerationFailed(u32, #[source] std::io::Error),
}

/// Errors raised by reads, writes and allocations in a remote process
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Failed to read {size} bytes at 0x{address:X}: {source}")]
    ReadFailed {
        address: usize,
        size: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {size} bytes at 0x{address:X}: {source}")]
    WriteFailed {
        address: usize,
        size: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to allocate {0} bytes in target process: {1}")]
    AllocationFailed(usize, #[source] std::io::Error),

    #[error("Failed to free remote memory at 0x{0:X}: {1}")]
    FreeFailed(usize, #[source] std::io::Error),

    #[error("Address arithmetic overflowed at 0x{0:X}")]
    AddressOverflow(usize),
}

/// Errors raised while walking a module's export table in a remote process
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Module '{0}' is not loaded in the target process")]
    ModuleNotFound(String),

    #[error("Invalid DOS header: expected 'MZ', found {0:04X}")]
    InvalidDosHeader(u16),

    #[error("Invalid PE signature: expected 'PE\\0\\0', found {0:08X}")]
    InvalidPeSignature(u32),

    #[error("Optional header magic {0:04X} does not match the native pointer width")]
    ArchitectureMismatch(u16),

    #[error("Module has no readable export directory")]
    ExportDirectoryMissing,

    #[error("Export table declares {0} entries")]
    ExportTableTooLarge(u32),

    #[error("Export '{function}' not found in '{module}'")]
    ExportNotFound { module: String, function: String },

    #[error("Ordinal {0} is outside the export tables")]
    OrdinalOutOfRange(u32),

    #[error("Malformed forwarder string: '{0}'")]
    MalformedForwarder(String),

    #[error("Forwarder chain loops back to {module}!{function}")]
    ForwarderCycle { module: String, function: String },

    #[error("Forwarder chain longer than {0} hops")]
    ForwarderDepthExceeded(usize),

    #[error("Name at 0x{0:X} exceeds {1} bytes")]
    NameTooLong(usize, usize),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Memory(#[from] MemoryError),
}

/// Errors related to library injection and export calls
#[derive(Debug, Error)]
pub enum InjectionError {
    #[error("Injector is not attached to a process")]
    NotAttached,

    #[error("Library '{0}' has not been loaded by this injector")]
    SessionNotLoaded(String),

    #[error("Remote module handle is null")]
    NullModule,

    #[error("Export calls need a non-empty payload")]
    EmptyPayload,

    #[error("Routine {module}!{function} could not be located in the target")]
    RoutineNotFound { module: String, function: String },

    #[error("Failed to create remote thread: {0}")]
    CreateThreadFailed(#[source] std::io::Error),

    #[error("Failed waiting for remote thread: {0}")]
    WaitFailed(#[source] std::io::Error),

    #[error("Failed to read remote thread exit code: {0}")]
    ExitCodeFailed(#[source] std::io::Error),

    #[error("Library loader returned NULL for '{0}'")]
    LoadFailed(String),

    #[error("FreeLibrary returned FALSE for '{0}'")]
    FreeFailed(String),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),
}
