//! Immutable configuration snapshot.
//!
//! A [`ConfigSnapshot`] is built once and never mutated.  Reloading the
//! settings produces a brand-new snapshot that replaces the old one as a
//! whole, so a reader holding a snapshot always sees one consistent
//! configuration.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

/// Default TCP address of a debug adapter running in server mode.
pub const DEFAULT_BACKEND_ADDRESS: &str = "localhost:4711";

/// How a session reaches its debug adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendMode {
    /// Dial an adapter that is already listening on `address` (`host:port`).
    Tcp { address: String },

    /// Launch `program` with `args` and speak DAP over its stdin/stdout.
    Spawn {
        program: PathBuf,
        args: Vec<String>,
        /// Working directory of the child; inherits the bridge's when `None`.
        working_dir: Option<PathBuf>,
    },
}

impl Default for BackendMode {
    fn default() -> Self {
        BackendMode::Tcp {
            address: DEFAULT_BACKEND_ADDRESS.to_string(),
        }
    }
}

impl fmt::Display for BackendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendMode::Tcp { address } => write!(f, "tcp://{address}"),
            BackendMode::Spawn { program, args, .. } => {
                write!(f, "spawn:{}", program.display())?;
                for arg in args {
                    write!(f, " {arg}")?;
                }
                Ok(())
            }
        }
    }
}

/// Point-in-time copy of the origin allow-list and backend selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigSnapshot {
    allowed_origins: HashMap<String, bool>,
    backend: BackendMode,
}

impl ConfigSnapshot {
    /// Builds a snapshot from its parts.
    pub fn new(allowed_origins: HashMap<String, bool>, backend: BackendMode) -> Self {
        Self {
            allowed_origins,
            backend,
        }
    }

    /// A snapshot that denies every origin and uses the default backend.
    pub fn deny_all() -> Self {
        Self::default()
    }

    /// Returns the allow-list entry for `origin`, if one exists.
    pub fn origin_entry(&self, origin: &str) -> Option<bool> {
        self.allowed_origins.get(origin).copied()
    }

    /// The complete allow-list, including disabled entries.
    pub fn allowed_origins(&self) -> &HashMap<String, bool> {
        &self.allowed_origins
    }

    /// Number of origins currently enabled.
    pub fn enabled_origin_count(&self) -> usize {
        self.allowed_origins.values().filter(|enabled| **enabled).count()
    }

    /// Backend that sessions admitted under this snapshot connect to.
    pub fn backend(&self) -> &BackendMode {
        &self.backend
    }
}
