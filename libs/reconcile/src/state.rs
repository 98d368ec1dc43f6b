//! Persisted deployment state.
//!
//! One record per process name, stored as YAML. The file is loaded once at
//! the start of a run and rewritten in full on every flush. Records are never
//! removed automatically: a process dropped from `processes.yaml` keeps its
//! entry so that re-adding it reuses the same process ID.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Errors from state store operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to read state from {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write state to {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse state from {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to serialize state: {0}")]
    Serialize(#[source] serde_yaml::Error),
}

/// Last known deployment of a single process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    /// Process ID assigned by the network at spawn time.
    #[serde(rename = "processId")]
    pub process_id: String,

    /// Fingerprint of the last successfully pushed main source.
    ///
    /// `None` between a successful spawn and the first successful push.
    #[serde(
        rename = "hash",
        alias = "contentHash",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub content_hash: Option<String>,
}

impl DeploymentRecord {
    /// A freshly spawned process with no code pushed yet.
    pub fn spawned(process_id: impl Into<String>) -> Self {
        Self {
            process_id: process_id.into(),
            content_hash: None,
        }
    }
}

/// Mapping from process name to its deployment record.
///
/// Backed by a `BTreeMap` so serialization order is stable and unchanged
/// state produces byte-identical files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeploymentState(BTreeMap<String, DeploymentRecord>);

impl DeploymentState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&DeploymentRecord> {
        self.0.get(name)
    }

    /// Recorded process ID for `name`, if it was ever spawned.
    pub fn process_id(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(|r| r.process_id.as_str())
    }

    /// Recorded content hash for `name`, if code was ever pushed.
    pub fn content_hash(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(|r| r.content_hash.as_deref())
    }

    pub fn insert(&mut self, name: impl Into<String>, record: DeploymentRecord) {
        self.0.insert(name.into(), record);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &DeploymentRecord)> {
        self.0.iter()
    }
}

/// Load deployment state from `path`.
///
/// A missing file yields empty state; any other failure is an error.
pub fn load(path: &Path) -> Result<DeploymentState, StateError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "No state file, starting empty");
            return Ok(DeploymentState::new());
        }
        Err(source) => {
            return Err(StateError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    if !crate::desired::has_yaml_content(&contents) {
        return Ok(DeploymentState::new());
    }

    let state: Option<DeploymentState> =
        serde_yaml::from_str(&contents).map_err(|source| StateError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(state.unwrap_or_default())
}

/// Serialize `state` and overwrite `path`.
///
/// The content goes to a sibling temporary file first and is renamed into
/// place, so readers never observe a half-written file.
pub fn save(path: &Path, state: &DeploymentState) -> Result<(), StateError> {
    let contents = serde_yaml::to_string(state).map_err(StateError::Serialize)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "state.yaml".to_string());
    let tmp_path = path.with_file_name(format!(".{file_name}.tmp"));

    let write_err = |source| StateError::Write {
        path: path.to_path_buf(),
        source,
    };
    fs::write(&tmp_path, contents).map_err(write_err)?;
    fs::rename(&tmp_path, path).map_err(write_err)?;

    debug!(path = %path.display(), records = state.len(), "State saved");
    Ok(())
}

/// Deployment state bound to its backing file.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    state: DeploymentState,
}

impl StateStore {
    /// Load the store from `path` (empty if the file does not exist).
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StateError> {
        let path = path.into();
        let state = load(&path)?;
        Ok(Self { path, state })
    }

    /// Wrap already-loaded state.
    pub fn with_state(path: impl Into<PathBuf>, state: DeploymentState) -> Self {
        Self {
            path: path.into(),
            state,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> &DeploymentState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut DeploymentState {
        &mut self.state
    }

    /// Write the in-memory state back to the file.
    pub fn flush(&self) -> Result<(), StateError> {
        save(&self.path, &self.state)
    }

    pub fn into_state(self) -> DeploymentState {
        self.state
    }
}
