//! Persistence of the last successful configuration.
//!
//! The store writes a flat JSON document (see `Configuration`'s serde layout); exported
//! copies may also be YAML, chosen by file extension. Missing fields load as defaults.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Configuration;
use crate::error::StoreError;

/// File name of the auto-saved state inside the home directory.
pub const STATE_FILE_NAME: &str = ".mlr_desktop_state.json";

pub trait StateStore: Send + Sync {
    fn save(&self, config: &Configuration) -> Result<(), StoreError>;

    /// `StoreError::NotFound` when nothing was saved yet.
    fn load(&self) -> Result<Configuration, StoreError>;
}

/// Default location: `~/.mlr_desktop_state.json`, or the working directory when no home exists.
pub fn default_state_path() -> PathBuf {
    match dirs::home_dir() {
        Some(home) => home.join(STATE_FILE_NAME),
        None => PathBuf::from(STATE_FILE_NAME),
    }
}

#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl StateStore for FileStateStore {
    fn save(&self, config: &Configuration) -> Result<(), StoreError> {
        write_config_file(&self.path, config)?;
        tracing::debug!(path = %self.path.display(), "state saved");
        Ok(())
    }

    fn load(&self) -> Result<Configuration, StoreError> {
        let config = read_config_file(&self.path)?;
        tracing::debug!(path = %self.path.display(), verbs = config.verbs.len(), "state loaded");
        Ok(config)
    }
}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"))
}

/// Writes `config` to `path` (YAML for `.yaml`/`.yml`, JSON otherwise) via a temp file + rename.
pub fn write_config_file(path: &Path, config: &Configuration) -> Result<(), StoreError> {
    let body = if is_yaml(path) {
        serde_yaml::to_string(config).map_err(|source| StoreError::Yaml {
            path: path.to_path_buf(),
            source,
        })?
    } else {
        serde_json::to_string_pretty(config).map_err(|source| StoreError::Json {
            path: path.to_path_buf(),
            source,
        })?
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| StoreError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, body).map_err(|source| StoreError::Io {
        path: tmp.clone(),
        source,
    })?;
    fs::rename(&tmp, path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads a configuration file written by `write_config_file` (or by hand).
pub fn read_config_file(path: &Path) -> Result<Configuration, StoreError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(StoreError::NotFound(path.to_path_buf()));
        }
        Err(source) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let config: Configuration = if is_yaml(path) {
        serde_yaml::from_str(&raw).map_err(|source| StoreError::Yaml {
            path: path.to_path_buf(),
            source,
        })?
    } else {
        serde_json::from_str(&raw).map_err(|source| StoreError::Json {
            path: path.to_path_buf(),
            source,
        })?
    };
    Ok(config.normalized())
}

/// In-memory store for orchestrator tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    pub saved: std::sync::Mutex<Vec<Configuration>>,
}

#[cfg(test)]
impl MemoryStateStore {
    pub fn saves(&self) -> Vec<Configuration> {
        self.saved.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl StateStore for MemoryStateStore {
    fn save(&self, config: &Configuration) -> Result<(), StoreError> {
        self.saved.lock().unwrap().push(config.clone());
        Ok(())
    }

    fn load(&self) -> Result<Configuration, StoreError> {
        self.saved
            .lock()
            .unwrap()
            .last()
            .cloned()
            .ok_or_else(|| StoreError::NotFound(PathBuf::from("<memory>")))
    }
}
