//! Code bundle assembly.
//!
//! The payload pushed to a process is built from up to four pieces, joined
//! with newlines in this fixed order:
//!
//! 1. Directory table (name -> process ID of every process in the run)
//! 2. Module reset snippet
//! 3. Prerun script
//! 4. Main source
//!
//! The scaffolding text is a template: the engine assembles it but does not
//! interpret it.

use std::collections::BTreeMap;
use std::path::Path;

use crate::desired::ProcessSpec;
use crate::error::ReconcileError;
use crate::fingerprint::{read_fingerprinted, ContentHash};

/// Run-scoped mapping from process name to process ID.
pub type Directory = BTreeMap<String, String>;

/// Modules kept loaded by the reset snippet.
///
/// Lua standard libraries plus the modules the process runtime preloads.
pub const DEFAULT_PRESERVED_MODULES: &[&str] = &[
    "_G",
    "package",
    "coroutine",
    "table",
    "io",
    "os",
    "string",
    "math",
    "utf8",
    "debug",
    "json",
    "ao",
    "base64",
    "bint",
    "crypto",
    "pretty",
    "utils",
    "handlers",
    "handlers-utils",
    "dump",
    "stringify",
    "chance",
    "boot",
    "default",
    "eval",
    "process",
    ".process",
    ".handlers",
    ".handlers-utils",
    ".utils",
    ".dump",
    ".pretty",
    ".chance",
    ".boot",
    ".default",
    ".eval",
    ".stringify",
    ".base64",
    ".crypto",
    ".bint",
];

/// Name of the global table emitted by the directory snippet.
pub const DIRECTORY_GLOBAL: &str = "Directory";

/// Scaffolding configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaffoldTemplate {
    /// Module names the reset snippet leaves in `package.loaded`.
    pub preserved_modules: Vec<String>,
}

impl Default for ScaffoldTemplate {
    fn default() -> Self {
        Self {
            preserved_modules: DEFAULT_PRESERVED_MODULES
                .iter()
                .map(|m| m.to_string())
                .collect(),
        }
    }
}

impl ScaffoldTemplate {
    /// Lua table literal mapping every name in the directory to its ID.
    pub fn directory_code(&self, directory: &Directory) -> String {
        let mut out = format!("{DIRECTORY_GLOBAL} = {{\n");
        for (name, process_id) in directory {
            out.push_str(&format!(
                "  [{}] = {},\n",
                lua_string(name),
                lua_string(process_id)
            ));
        }
        out.push('}');
        out
    }

    /// Snippet that unloads every module outside the preserved list.
    pub fn reset_modules_code(&self) -> String {
        let preserved: Vec<String> = self
            .preserved_modules
            .iter()
            .map(|m| format!("[{}] = true", lua_string(m)))
            .collect();

        format!(
            "do\n  local preserved = {{ {} }}\n  for name in pairs(package.loaded) do\n    if not preserved[name] then\n      package.loaded[name] = nil\n    end\n  end\nend",
            preserved.join(", ")
        )
    }

    /// Join the bundle pieces in their fixed order.
    pub fn assemble(
        &self,
        spec: &ProcessSpec,
        directory: &Directory,
        prerun: Option<&str>,
        main: &str,
    ) -> String {
        let mut parts: Vec<String> = Vec::with_capacity(4);
        if spec.directory {
            parts.push(self.directory_code(directory));
        }
        if spec.reset_modules {
            parts.push(self.reset_modules_code());
        }
        if let Some(prerun) = prerun {
            parts.push(prerun.to_string());
        }
        parts.push(main.to_string());
        parts.join("\n")
    }

    /// Assemble the bundle for `spec` from its preloaded sources.
    pub fn build(&self, spec: &ProcessSpec, directory: &Directory, sources: &Sources) -> String {
        self.assemble(spec, directory, sources.prerun.as_deref(), &sources.main)
    }
}

/// Source text of one process, read once per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sources {
    pub main: String,
    pub prerun: Option<String>,
    /// Fingerprint of exactly the `main` text above.
    pub hash: ContentHash,
}

impl Sources {
    /// Read and fingerprint the main source, then read the prerun script.
    pub fn load(spec: &ProcessSpec) -> Result<Self, ReconcileError> {
        let (bytes, hash) = read_fingerprinted(&spec.file)?;
        let main = String::from_utf8(bytes).map_err(|_| {
            ReconcileError::configuration(format!(
                "process '{}': {} is not valid UTF-8",
                spec.name,
                spec.file.display()
            ))
        })?;
        let prerun = spec
            .prerun
            .as_deref()
            .map(|path| read_source(&spec.name, path))
            .transpose()?;

        Ok(Self { main, prerun, hash })
    }
}

fn read_source(name: &str, path: &Path) -> Result<String, ReconcileError> {
    std::fs::read_to_string(path).map_err(|e| {
        ReconcileError::configuration(format!(
            "process '{name}': failed to read {}: {e}",
            path.display()
        ))
    })
}

/// Quote a string as a Lua literal.
fn lua_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\{:03}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
