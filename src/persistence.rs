//! Persistence: save and load registry state to a file.
//! Enables recovery after restart: every exchange's order history and reference price is restored.

use crate::error::ExchangeError;
use crate::matching::ExchangeState;
use crate::types::Address;
use std::path::Path;

/// One exchange as persisted: its token, its own address and its state.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ExchangeSnapshot {
    pub token: Address,
    pub exchange: Address,
    pub state: ExchangeState,
}

/// Full persisted state of a registry.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PersistedState {
    pub registry: Address,
    pub owner: Address,
    /// Informational; logic is not persisted and must be installed before restore.
    pub implementation_version: Option<String>,
    pub exchanges: Vec<ExchangeSnapshot>,
}

/// File-based persistence: one JSON file. Save after state changes; load on startup.
#[derive(Clone, Debug)]
pub struct FilePersistence {
    path: std::path::PathBuf,
}

impl FilePersistence {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Save state to file. Overwrites existing file.
    pub fn save(&self, state: &PersistedState) -> Result<(), ExchangeError> {
        let json = serde_json::to_string_pretty(state).map_err(|e| ExchangeError::Persistence(e.to_string()))?;
        std::fs::write(&self.path, json).map_err(|e| ExchangeError::Persistence(e.to_string()))
    }

    /// Load state from file. Returns None if the file does not exist.
    pub fn load(&self) -> Result<Option<PersistedState>, ExchangeError> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ExchangeError::Persistence(e.to_string())),
        };
        let state: PersistedState =
            serde_json::from_str(&data).map_err(|e| ExchangeError::Persistence(e.to_string()))?;
        Ok(Some(state))
    }
}
