//! Desired-state loading.
//!
//! `processes.yaml` is an ordered YAML sequence of [`ProcessSpec`] entries.
//! A missing file means there is nothing to deploy.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::error::ReconcileError;
use crate::gateway::Tag;

/// Errors from reading the desired-state file.
#[derive(Debug, Error)]
pub enum DesiredStateError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid process list in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// A single desired process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessSpec {
    /// Unique key within the desired list.
    pub name: String,

    /// Main source file; its fingerprint gates code pushes.
    pub file: PathBuf,

    /// Script evaluated ahead of the main source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prerun: Option<PathBuf>,

    /// Runtime module the process is spawned from.
    pub module: String,

    /// Scheduler unit assigned at spawn time.
    pub scheduler: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,

    /// Prepend a name -> process ID table of every process in the run.
    #[serde(default)]
    pub directory: bool,

    /// Prepend a snippet that unloads non-preloaded modules.
    #[serde(default, alias = "reset_modules")]
    pub reset_modules: bool,
}

impl ProcessSpec {
    /// Minimal spec used by tests and templates.
    pub fn new(
        name: impl Into<String>,
        file: impl Into<PathBuf>,
        module: impl Into<String>,
        scheduler: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            file: file.into(),
            prerun: None,
            module: module.into(),
            scheduler: scheduler.into(),
            tags: Vec::new(),
            directory: false,
            reset_modules: false,
        }
    }
}

/// Parse a process list from YAML text. An empty document is an empty list.
pub fn parse_desired(contents: &str, path: &Path) -> Result<Vec<ProcessSpec>, DesiredStateError> {
    if !has_yaml_content(contents) {
        return Ok(Vec::new());
    }

    let specs: Option<Vec<ProcessSpec>> =
        serde_yaml::from_str(contents).map_err(|source| DesiredStateError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(specs.unwrap_or_default())
}

/// True when the text holds anything besides blank lines and comments.
pub(crate) fn has_yaml_content(contents: &str) -> bool {
    contents.lines().any(|line| {
        let line = line.trim();
        !line.is_empty() && !line.starts_with('#') && line != "---"
    })
}

/// Load the desired process list from `path`.
pub fn load_desired(path: &Path) -> Result<Vec<ProcessSpec>, DesiredStateError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!(
                path = %path.display(),
                "Desired-state file not found. No processes will be deployed or updated."
            );
            return Ok(Vec::new());
        }
        Err(source) => {
            return Err(DesiredStateError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    parse_desired(&contents, path)
}

/// Check structural invariants of the desired list.
pub fn validate_specs(specs: &[ProcessSpec]) -> Result<(), ReconcileError> {
    let mut seen = HashSet::new();

    for spec in specs {
        if spec.name.trim().is_empty() {
            return Err(ReconcileError::configuration("process name cannot be empty"));
        }
        if !seen.insert(spec.name.as_str()) {
            return Err(ReconcileError::configuration(format!(
                "duplicate process name '{}'",
                spec.name
            )));
        }
        if spec.file.as_os_str().is_empty() {
            return Err(ReconcileError::configuration(format!(
                "process '{}' has no source file",
                spec.name
            )));
        }
    }

    Ok(())
}
