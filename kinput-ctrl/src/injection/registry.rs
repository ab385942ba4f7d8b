//! Libraries loaded by one injector.

use std::collections::HashMap;
use std::fmt;

/// Base address of a library loaded in a remote process.
///
/// Opaque to the caller: it is only meaningful inside the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RemoteModule(usize);

impl RemoteModule {
    pub fn new(base: usize) -> Self {
        Self(base)
    }

    pub fn base(self) -> usize {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for RemoteModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:X}", self.0)
    }
}

/// Library path to remote module mapping.
///
/// A path present here was loaded by this injector and not yet freed. A
/// missing path says nothing about whether the target has the library from
/// some other source. Paths are compared exactly.
#[derive(Debug, Default)]
pub(crate) struct ModuleRegistry {
    modules: HashMap<String, RemoteModule>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<RemoteModule> {
        self.modules.get(path).copied()
    }

    /// Record `module` under `path`, returning any previous entry.
    pub fn insert(&mut self, path: &str, module: RemoteModule) -> Option<RemoteModule> {
        self.modules.insert(path.to_string(), module)
    }

    pub fn remove(&mut self, path: &str) -> Option<RemoteModule> {
        self.modules.remove(path)
    }

    pub fn clear(&mut self) {
        self.modules.clear();
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, RemoteModule)> {
        self.modules.iter().map(|(path, module)| (path.as_str(), *module))
    }
}
