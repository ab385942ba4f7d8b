//! Persisted CLI settings.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use kinput_ctrl::{DEFAULT_MAX_FORWARD_DEPTH, DEFAULT_PAYLOAD_LIBRARY};

const MAX_RECENT_DLLS: usize = 10;

/// CLI configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Companion library whose exports `call` and `inject --call` invoke
    pub payload_library: String,

    /// Forwarder hops followed when resolving an export
    pub max_forward_depth: usize,

    /// Recently injected libraries, most recent first (max 10)
    pub recent_dlls: Vec<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            payload_library: DEFAULT_PAYLOAD_LIBRARY.to_string(),
            max_forward_depth: DEFAULT_MAX_FORWARD_DEPTH,
            recent_dlls: Vec::new(),
        }
    }
}

impl Config {
    /// Default config file path.
    ///
    /// Returns: %APPDATA%\KInputCtrl\config.json
    pub fn default_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push("KInputCtrl");
        path.push("config.json");
        path
    }

    /// Load configuration from `path`, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::debug!("Loaded config from: {}", path.display());
                    config
                }
                Err(e) => {
                    log::warn!("Failed to parse config {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                log::debug!("No config file at {}, using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Save configuration to `path` as pretty JSON.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;

        log::debug!("Saved config to: {}", path.display());
        Ok(())
    }

    /// Add a DLL to the recent list.
    pub fn add_recent_dll(&mut self, dll_path: PathBuf) {
        self.recent_dlls.retain(|p| p != &dll_path);
        self.recent_dlls.insert(0, dll_path);
        self.recent_dlls.truncate(MAX_RECENT_DLLS);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();

        let config = Config::load(&dir.path().join("config.json"));

        assert_eq!(config, Config::default());
        assert_eq!(config.payload_library, "KInput.dll");
        assert_eq!(config.max_forward_depth, 8);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::default();
        config.payload_library = "Other.dll".to_string();
        config.add_recent_dll(PathBuf::from("C:\\a.dll"));
        config.save(&path).unwrap();

        assert_eq!(Config::load(&path), config);
    }

    #[test]
    fn test_unparsable_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        assert_eq!(Config::load(&path), Config::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "max_forward_depth": 3 }"#).unwrap();

        let config = Config::load(&path);

        assert_eq!(config.max_forward_depth, 3);
        assert_eq!(config.payload_library, "KInput.dll");
    }

    #[test]
    fn test_recent_dlls_deduplicated_and_capped() {
        let mut config = Config::default();
        for i in 0..12 {
            config.add_recent_dll(PathBuf::from(format!("{}.dll", i)));
        }
        config.add_recent_dll(PathBuf::from("5.dll"));

        assert_eq!(config.recent_dlls.len(), 10);
        assert_eq!(config.recent_dlls[0], PathBuf::from("5.dll"));
        assert_eq!(
            config.recent_dlls.iter().filter(|p| **p == PathBuf::from("5.dll")).count(),
            1
        );
    }
}
