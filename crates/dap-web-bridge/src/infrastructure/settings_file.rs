//! Settings file storage.
//!
//! The settings file lives at `<home>/settings.toml`, where `<home>` defaults
//! to `~/.dap-web-bridge` and can be overridden with `--home`.
//!
//! On first start the file is created with one disabled example origin, so a
//! fresh install allows nothing until the user edits it.  The file is then
//! read once at startup and again by the watcher after every change.

use std::path::{Path, PathBuf};

use dap_core::ConfigSnapshot;
use thiserror::Error;
use tracing::info;

use crate::application::SnapshotSource;
use crate::domain::config::SETTINGS_FILE_NAME;
use crate::domain::settings::{ConfigParseError, Settings};

/// Name of the home directory created under the user's home.
pub const HOME_DIR_NAME: &str = ".dap-web-bridge";

const FIRST_RUN_HEADER: &str = "\
# dap-web-bridge settings.
#
# Browser pages may open a debug session only if their origin is listed
# below with the value `true`.  Changes take effect for new sessions as soon
# as the file is saved.
#
# [backend] selects the debug adapter:
#   mode = \"tcp\"    address = \"host:port\"   (adapter running in server mode)
#   mode = \"spawn\"  program = \"node\"  args = [\"adapter.js\"]

";

/// Error type for settings file storage operations.
#[derive(Debug, Error)]
pub enum SettingsFileError {
    /// Neither `HOME` nor `USERPROFILE` is set.
    #[error("could not determine the user's home directory")]
    NoHomeDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing settings at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The settings could not be serialized to TOML.
    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Returns `~/.dap-web-bridge` for the current user.
///
/// # Errors
///
/// Returns [`SettingsFileError::NoHomeDir`] when no home directory variable
/// is set.
pub fn default_home_dir() -> Result<PathBuf, SettingsFileError> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .filter(|home| !home.is_empty())
        .map(|home| PathBuf::from(home).join(HOME_DIR_NAME))
        .ok_or(SettingsFileError::NoHomeDir)
}

/// The settings file of one bridge home directory.
#[derive(Debug, Clone)]
pub struct SettingsFile {
    home: PathBuf,
    path: PathBuf,
}

impl SettingsFile {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        let path = home.join(SETTINGS_FILE_NAME);
        Self { home, path }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates the home directory and a first-run settings file if the file
    /// does not exist yet.  Returns `true` if the file was created.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsFileError::Io`] if the directory or file cannot be
    /// created.
    pub fn ensure_exists(&self) -> Result<bool, SettingsFileError> {
        if self.path.exists() {
            return Ok(false);
        }
        let body = toml::to_string_pretty(&Settings::first_run())?;
        self.write_atomically(&format!("{FIRST_RUN_HEADER}{body}"))?;
        info!(path = %self.path.display(), "created settings file");
        Ok(true)
    }

    /// Reads and parses the settings file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigParseError::Io`] if the file cannot be read and
    /// [`ConfigParseError::Parse`] if it is not valid settings TOML.
    pub fn load(&self) -> Result<Settings, ConfigParseError> {
        let text = std::fs::read_to_string(&self.path).map_err(|source| ConfigParseError::Io {
            path: self.path.clone(),
            source,
        })?;
        Settings::from_toml(&text)
    }

    /// Writes `settings` to the file, replacing it in one rename so the
    /// watcher never sees a half-written file.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsFileError::Io`] for file-system failures or
    /// [`SettingsFileError::Serialize`] if serialization fails.
    pub fn save(&self, settings: &Settings) -> Result<(), SettingsFileError> {
        let content = toml::to_string_pretty(settings)?;
        self.write_atomically(&content)
    }

    fn write_atomically(&self, content: &str) -> Result<(), SettingsFileError> {
        std::fs::create_dir_all(&self.home).map_err(|source| SettingsFileError::Io {
            path: self.home.clone(),
            source,
        })?;

        let tmp = self.path.with_extension("toml.tmp");
        std::fs::write(&tmp, content).map_err(|source| SettingsFileError::Io {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|source| SettingsFileError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

impl SnapshotSource for SettingsFile {
    fn read_snapshot(&self) -> Result<ConfigSnapshot, ConfigParseError> {
        self.load()?.to_snapshot(&self.home)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
