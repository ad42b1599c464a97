//! On-disk settings schema.
//!
//! The settings file is the user-editable source of every
//! [`ConfigSnapshot`].  It is TOML:
//!
//! ```toml
//! [allowed_origins]
//! "https://ide.example.com" = true
//! "https://old.example.com" = false
//!
//! [backend]
//! mode = "tcp"
//! address = "localhost:4711"
//! ```
//!
//! or, to launch the adapter as a child process:
//!
//! ```toml
//! [backend]
//! mode = "spawn"
//! program = "node"
//! args = ["extension/out/src/gdb.js"]
//! ```
//!
//! # Serde default values
//!
//! Both sections are optional.  A missing `[allowed_origins]` table means no
//! origin is allowed; a missing `[backend]` table selects the TCP backend at
//! `localhost:4711`.

use std::collections::{BTreeMap, HashMap};
use std::path::{Component, Path, PathBuf};

use dap_core::domain::snapshot::DEFAULT_BACKEND_ADDRESS;
use dap_core::{BackendMode, ConfigSnapshot};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Origin written, disabled, into a freshly created settings file.
pub const EXAMPLE_ORIGIN: &str = "https://debugger.example.com";

/// Reasons a settings source could not be turned into a snapshot.
#[derive(Debug, Error)]
pub enum ConfigParseError {
    /// The settings file could not be read.
    #[error("I/O error reading settings at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse settings TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The TOML parsed but a value is unusable.
    #[error("invalid settings: {0}")]
    Invalid(String),
}

// ── Schema types ──────────────────────────────────────────────────────────────

/// Top-level settings file contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Origin → enabled.  `BTreeMap` keeps the saved file in a stable order.
    #[serde(default)]
    pub allowed_origins: BTreeMap<String, bool>,

    #[serde(default)]
    pub backend: BackendSettings,
}

/// Which debug adapter to connect sessions to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum BackendSettings {
    /// Dial a debug adapter running in server mode.
    Tcp {
        #[serde(default = "default_address")]
        address: String,
    },
    /// Launch the adapter and talk over its stdin/stdout.
    Spawn {
        program: PathBuf,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<String>,
    },
}

fn default_address() -> String {
    DEFAULT_BACKEND_ADDRESS.to_string()
}

impl Default for BackendSettings {
    fn default() -> Self {
        BackendSettings::Tcp {
            address: default_address(),
        }
    }
}

impl Settings {
    /// Settings written on first run: one disabled example origin and the
    /// default backend.
    pub fn first_run() -> Self {
        Self {
            allowed_origins: BTreeMap::from([(EXAMPLE_ORIGIN.to_string(), false)]),
            backend: BackendSettings::default(),
        }
    }

    /// Parses settings from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigParseError::Parse`] if the TOML is malformed or does
    /// not match the schema.
    pub fn from_toml(text: &str) -> Result<Self, ConfigParseError> {
        Ok(toml::from_str(text)?)
    }

    /// Validates the settings and builds an immutable snapshot.
    ///
    /// Spawned adapters run in `home`.  A relative `program` that names a
    /// path (`bin/adapter`, `./adapter`) is resolved against `home`; a bare
    /// command name (`node`) is left for the `PATH` lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigParseError::Invalid`] for an empty origin, a TCP
    /// address without a valid port, or an empty spawn program.
    pub fn to_snapshot(&self, home: &Path) -> Result<ConfigSnapshot, ConfigParseError> {
        if self.allowed_origins.keys().any(|origin| origin.trim().is_empty()) {
            return Err(ConfigParseError::Invalid(
                "allowed_origins contains an empty origin".to_string(),
            ));
        }
        let origins: HashMap<String, bool> = self
            .allowed_origins
            .iter()
            .map(|(origin, enabled)| (origin.clone(), *enabled))
            .collect();

        let backend = match &self.backend {
            BackendSettings::Tcp { address } => {
                validate_address(address)?;
                BackendMode::Tcp {
                    address: address.clone(),
                }
            }
            BackendSettings::Spawn { program, args } => {
                if program.as_os_str().is_empty() {
                    return Err(ConfigParseError::Invalid(
                        "backend.program must not be empty".to_string(),
                    ));
                }
                BackendMode::Spawn {
                    program: resolve_program(program, home),
                    args: args.clone(),
                    working_dir: Some(home.to_path_buf()),
                }
            }
        };

        Ok(ConfigSnapshot::new(origins, backend))
    }
}

/// Renders the `[allowed_origins]` entry that would enable `origin`.
///
/// Used in the body of a 403 response so the user can copy it into the
/// settings file.
pub fn enable_origin_snippet(origin: &str) -> String {
    #[derive(Serialize)]
    struct Snippet<'a> {
        allowed_origins: BTreeMap<&'a str, bool>,
    }

    let snippet = Snippet {
        allowed_origins: BTreeMap::from([(origin, true)]),
    };
    toml::to_string(&snippet)
        .unwrap_or_else(|_| format!("[allowed_origins]\n{origin:?} = true\n"))
}

fn validate_address(address: &str) -> Result<(), ConfigParseError> {
    let invalid = || {
        ConfigParseError::Invalid(format!(
            "backend.address {address:?} must be of the form host:port"
        ))
    };
    let (host, port) = address.rsplit_once(':').ok_or_else(invalid)?;
    if host.is_empty() || port.parse::<u16>().is_err() {
        return Err(invalid());
    }
    Ok(())
}

fn resolve_program(program: &Path, home: &Path) -> PathBuf {
    let names_a_path = program.components().count() > 1
        || matches!(program.components().next(), Some(Component::CurDir | Component::ParentDir));
    if program.is_relative() && names_a_path {
        home.join(program)
    } else {
        program.to_path_buf()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
