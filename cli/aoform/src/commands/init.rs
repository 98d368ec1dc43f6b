//! Init command: scaffold a desired-state file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use crate::output::{print_success, print_warning};

use super::apply::DEFAULT_DESIRED_FILE;

/// Commented example written by `aoform init`.
pub const TEMPLATE: &str = "\
# Processes managed by aoform.
#
# Each entry is spawned once; its process ID is recorded in state.yaml and
# reused on later runs. Code is pushed again only when `file` changes.
#
# - name: process1
#   file: path/to/process1.lua
#   module: module_tx_id
#   scheduler: scheduler_address
#   # Evaluated before `file` on every push. Changes here alone do not
#   # trigger a push.
#   prerun: path/to/prerun.lua
#   # Prepend a Directory table mapping every process name to its ID.
#   directory: false
#   # Unload non-builtin modules before evaluating.
#   resetModules: false
#   tags:
#     - name: Tag1
#       value: Value1
#     - name: Tag2
#       value: Value2
";

/// Initialize a new processes.yaml file.
#[derive(Debug, Args)]
pub struct InitCommand {
    /// File to create. Defaults to ./processes.yaml.
    #[arg(short = 'f', long = "file", value_name = "PATH")]
    pub file: Option<PathBuf>,
}

impl InitCommand {
    pub fn run(self) -> Result<()> {
        let path = self
            .file
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DESIRED_FILE));

        if write_template(&path)? {
            print_success(&format!("{} file created successfully.", path.display()));
        } else {
            print_warning(&format!("{} file already exists.", path.display()));
        }
        Ok(())
    }
}

/// Write the template unless the file exists. Returns whether it was written.
pub fn write_template(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    std::fs::write(path, TEMPLATE)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(true)
}
