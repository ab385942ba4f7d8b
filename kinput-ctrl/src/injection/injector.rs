//! Library loading and export calls in a target process.
//!
//! The injector owns the target and a registry of the libraries it loaded.
//! Every operation blocks until the remote thread it starts has exited.
//!
//! Each operation comes in two forms: `try_*` returns the full error, and the
//! plain form logs the error and collapses it to `None`/`false`.

use super::registry::{ModuleRegistry, RemoteModule};
use super::traits::{InjectionResult, RemoteProcess};
use crate::error::InjectionError;
use crate::memory::{encode_wide, RemoteMemory};
use crate::process::module_file_name;
use crate::resolver::{RemoteSymbolResolver, DEFAULT_MAX_FORWARD_DEPTH};

/// Companion library whose exports `call_export` invokes.
pub const DEFAULT_PAYLOAD_LIBRARY: &str = "KInput.dll";

const LOADER_MODULE: &str = "kernel32.dll";
const LOAD_LIBRARY: &str = "LoadLibraryW";
const FREE_LIBRARY: &str = "FreeLibrary";

enum Attachment<P> {
    /// The target could not be opened
    Unattached,
    Attached(P),
    /// The target was released; terminal
    Detached,
}

/// Loads libraries into one process and calls their exports.
///
/// Operations must be serialized by the caller; mutating operations take
/// `&mut self`.
pub struct Injector<P: RemoteProcess> {
    pid: u32,
    attachment: Attachment<P>,
    registry: ModuleRegistry,
    payload_library: String,
    max_forward_depth: usize,
}

#[cfg(windows)]
impl Injector<crate::process::ProcessHandle> {
    /// Open process `pid` for injection.
    ///
    /// Never fails: if the process cannot be opened the injector is left
    /// unattached and every operation reports failure. Check
    /// [`Injector::is_attached`].
    pub fn attach(pid: u32) -> Self {
        use crate::process::{ProcessHandle, INJECTION_ACCESS};

        match ProcessHandle::open(pid, INJECTION_ACCESS) {
            Ok(process) => Self::with_process(process),
            Err(e) => {
                log::error!("Failed to attach to process {}: {}", pid, e);
                Self::unattached(pid)
            }
        }
    }
}

impl<P: RemoteProcess> Injector<P> {
    /// Injector attached to an already opened process.
    pub fn with_process(process: P) -> Self {
        let pid = process.pid();
        log::debug!("Attached to process {}", pid);

        Self {
            pid,
            attachment: Attachment::Attached(process),
            registry: ModuleRegistry::new(),
            payload_library: DEFAULT_PAYLOAD_LIBRARY.to_string(),
            max_forward_depth: DEFAULT_MAX_FORWARD_DEPTH,
        }
    }

    /// Injector for a process that could not be opened.
    pub fn unattached(pid: u32) -> Self {
        Self {
            pid,
            attachment: Attachment::Unattached,
            registry: ModuleRegistry::new(),
            payload_library: DEFAULT_PAYLOAD_LIBRARY.to_string(),
            max_forward_depth: DEFAULT_MAX_FORWARD_DEPTH,
        }
    }

    /// Use `name` as the companion library for export calls.
    pub fn with_payload_library(mut self, name: impl Into<String>) -> Self {
        self.payload_library = name.into();
        self
    }

    pub fn with_max_forward_depth(mut self, depth: usize) -> Self {
        self.max_forward_depth = depth;
        self
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn is_attached(&self) -> bool {
        matches!(self.attachment, Attachment::Attached(_))
    }

    pub fn payload_library(&self) -> &str {
        &self.payload_library
    }

    /// Libraries loaded by this injector and not yet freed.
    pub fn loaded_modules(&self) -> impl Iterator<Item = (&str, RemoteModule)> {
        self.registry.iter()
    }

    /// Remote handle of a library loaded by this injector.
    pub fn remote_module(&self, path: &str) -> Option<RemoteModule> {
        self.registry.get(path)
    }

    /// Load the library at `path` into the target.
    ///
    /// A path this injector already loaded returns the recorded handle
    /// without touching the target.
    pub fn load_library(&mut self, path: &str) -> Option<RemoteModule> {
        match self.try_load_library(path) {
            Ok(module) => Some(module),
            Err(e) => {
                log::error!("Failed to load '{}' into process {}: {}", path, self.pid, e);
                None
            }
        }
    }

    pub fn try_load_library(&mut self, path: &str) -> InjectionResult<RemoteModule> {
        let module = {
            let process = self.process()?;

            if let Some(module) = self.registry.get(path) {
                log::debug!("'{}' already loaded at {}", path, module);
                return Ok(module);
            }

            let loader = self.system_routine(process, LOAD_LIBRARY)?;
            log::debug!("{}!{} at 0x{:X}", LOADER_MODULE, LOAD_LIBRARY, loader);

            let remote_path = RemoteMemory::with_data(process, &encode_wide(path))?;
            log::debug!(
                "Wrote {} byte path to 0x{:X}",
                remote_path.size(),
                remote_path.address()
            );

            let exit_code = unsafe { process.run_thread(loader, remote_path.address())? };
            if exit_code == 0 {
                return Err(InjectionError::LoadFailed(path.to_string()));
            }

            recover_module_base(process, path, exit_code)
        };

        self.registry.insert(path, module);
        log::info!("Loaded '{}' at {} in process {}", path, module, self.pid);
        Ok(module)
    }

    /// Call `function` in the payload library on behalf of the session
    /// library loaded from `session_library`.
    ///
    /// Returns the remote function's status. The session library must have
    /// been loaded by this injector.
    pub fn call_export(&self, session_library: &str, function: &str, data: &[u8]) -> bool {
        self.report_call(function, self.try_call_export(session_library, function, data))
    }

    pub fn try_call_export(
        &self,
        session_library: &str,
        function: &str,
        data: &[u8],
    ) -> InjectionResult<bool> {
        self.process()?;

        let session = self
            .registry
            .get(session_library)
            .ok_or_else(|| InjectionError::SessionNotLoaded(session_library.to_string()))?;

        self.try_call_export_in(session, function, data)
    }

    /// Call `function` in the payload library on behalf of `session`.
    pub fn call_export_in(&self, session: RemoteModule, function: &str, data: &[u8]) -> bool {
        self.report_call(function, self.try_call_export_in(session, function, data))
    }

    /// Run `function(data)` in the target and return whether it reported
    /// success.
    ///
    /// `data` is copied into scratch memory in the target and the function
    /// receives its address. The scratch memory is released before returning.
    /// Empty data fails without running anything in the target.
    pub fn try_call_export_in(
        &self,
        session: RemoteModule,
        function: &str,
        data: &[u8],
    ) -> InjectionResult<bool> {
        let process = self.process()?;

        if session.is_null() {
            return Err(InjectionError::NullModule);
        }
        if data.is_empty() {
            return Err(InjectionError::EmptyPayload);
        }

        let routine = RemoteSymbolResolver::new(process)
            .with_max_forward_depth(self.max_forward_depth)
            .try_resolve(&self.payload_library, function)
            .map_err(|e| {
                log::debug!("{}!{}: {}", self.payload_library, function, e);
                InjectionError::RoutineNotFound {
                    module: self.payload_library.clone(),
                    function: function.to_string(),
                }
            })?;

        log::debug!(
            "Calling {}!{} at 0x{:X} for session {} with {} bytes",
            self.payload_library,
            function,
            routine,
            session,
            data.len()
        );

        let payload = RemoteMemory::with_data(process, data)?;
        let exit_code = unsafe { process.run_thread(routine, payload.address())? };

        Ok(exit_code != 0)
    }

    /// Unload a library this injector loaded.
    ///
    /// A path that was never loaded (or already freed) succeeds without
    /// touching the target.
    pub fn free_library(&mut self, path: &str) -> bool {
        match self.try_free_library(path) {
            Ok(()) => true,
            Err(e) => {
                log::error!("Failed to free '{}' in process {}: {}", path, self.pid, e);
                false
            }
        }
    }

    pub fn try_free_library(&mut self, path: &str) -> InjectionResult<()> {
        let module = {
            let process = self.process()?;

            let Some(module) = self.registry.get(path) else {
                log::debug!("'{}' is not loaded; nothing to free", path);
                return Ok(());
            };

            let free = self.system_routine(process, FREE_LIBRARY)?;
            let exit_code = unsafe { process.run_thread(free, module.base())? };
            if exit_code == 0 {
                return Err(InjectionError::FreeFailed(path.to_string()));
            }

            module
        };

        self.registry.remove(path);
        log::info!("Freed '{}' ({}) in process {}", path, module, self.pid);
        Ok(())
    }

    /// Release the target. Idempotent; the injector is unusable afterwards.
    pub fn detach(&mut self) {
        if let Attachment::Attached(_) =
            std::mem::replace(&mut self.attachment, Attachment::Detached)
        {
            log::debug!(
                "Detached from process {}, forgetting {} loaded libraries",
                self.pid,
                self.registry.len()
            );
        }
        self.registry.clear();
    }

    fn process(&self) -> InjectionResult<&P> {
        match &self.attachment {
            Attachment::Attached(process) => Ok(process),
            _ => Err(InjectionError::NotAttached),
        }
    }

    fn report_call(&self, function: &str, result: InjectionResult<bool>) -> bool {
        match result {
            Ok(true) => true,
            Ok(false) => {
                log::debug!("{}!{} reported failure", self.payload_library, function);
                false
            }
            Err(e) => {
                log::error!("Call to {}!{} failed: {}", self.payload_library, function, e);
                false
            }
        }
    }

    /// Address of a loader routine inside the target.
    fn system_routine(&self, process: &P, function: &str) -> InjectionResult<usize> {
        let resolved = RemoteSymbolResolver::new(process)
            .with_max_forward_depth(self.max_forward_depth)
            .try_resolve(LOADER_MODULE, function);

        match resolved {
            Ok(address) => Ok(address),
            Err(e) => {
                log::debug!(
                    "Remote lookup of {}!{} failed ({}); using local address",
                    LOADER_MODULE,
                    function,
                    e
                );
                process
                    .fallback_export(LOADER_MODULE, function)
                    .ok_or_else(|| InjectionError::RoutineNotFound {
                        module: LOADER_MODULE.to_string(),
                        function: function.to_string(),
                    })
            }
        }
    }
}

/// Full base of the module the loader just returned.
///
/// A thread exit code is 32 bits wide, so on 64-bit targets the handle comes
/// back truncated. The loaded module with the same file name and the same
/// low 32 bits is taken as the real one.
fn recover_module_base<P: RemoteProcess + ?Sized>(
    process: &P,
    path: &str,
    exit_code: u32,
) -> RemoteModule {
    let name = module_file_name(path);

    match process.loaded_modules() {
        Ok(modules) => modules
            .iter()
            .find(|m| m.name.eq_ignore_ascii_case(name) && m.base as u32 == exit_code)
            .map(|m| RemoteModule::new(m.base))
            .unwrap_or(RemoteModule::new(exit_code as usize)),
        Err(e) => {
            log::warn!("Module snapshot failed, using raw loader result: {}", e);
            RemoteModule::new(exit_code as usize)
        }
    }
}
