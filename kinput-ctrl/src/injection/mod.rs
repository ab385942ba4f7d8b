//! Loading libraries into a target process and calling their exports.

mod injector;
mod registry;
mod traits;
#[cfg(windows)]
mod win32;

pub use injector::{Injector, DEFAULT_PAYLOAD_LIBRARY};
pub use registry::RemoteModule;
pub use traits::{InjectionResult, RemoteProcess};
