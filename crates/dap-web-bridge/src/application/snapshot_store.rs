//! Configuration snapshot store.
//!
//! [`SnapshotStore`] holds the current [`ConfigSnapshot`] behind an
//! [`ArcSwap`].  Readers call [`SnapshotStore::current`] and get an
//! `Arc<ConfigSnapshot>` without taking a lock; the single writer,
//! [`SnapshotStore::reload`], builds a complete new snapshot first and then
//! swaps the pointer.  A reader therefore sees either the old snapshot or
//! the new one, never a mixture.
//!
//! # Why not `RwLock<HashMap<..>>`? (for beginners)
//!
//! With a lock, a reload that holds the write lock stalls every handshake
//! that wants to read the allow-list.  With `ArcSwap` the handshake just
//! clones an `Arc`, and a session keeps using the snapshot it was admitted
//! with even if a reload happens a millisecond later.

use std::sync::Arc;

use arc_swap::ArcSwap;
use dap_core::ConfigSnapshot;
use tracing::info;

use crate::domain::settings::ConfigParseError;

/// Something that can produce a fresh snapshot (normally the settings file).
pub trait SnapshotSource: Send + Sync {
    /// Reads and validates the source.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigParseError`] when the source is unreadable or invalid.
    fn read_snapshot(&self) -> Result<ConfigSnapshot, ConfigParseError>;
}

impl<F> SnapshotSource for F
where
    F: Fn() -> Result<ConfigSnapshot, ConfigParseError> + Send + Sync,
{
    fn read_snapshot(&self) -> Result<ConfigSnapshot, ConfigParseError> {
        self()
    }
}

/// Shared-read, single-writer holder of the current snapshot.
#[derive(Debug)]
pub struct SnapshotStore {
    current: ArcSwap<ConfigSnapshot>,
}

impl SnapshotStore {
    /// Creates a store with `initial` installed.
    pub fn new(initial: ConfigSnapshot) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
        }
    }

    /// Returns the latest installed snapshot.  Never blocks.
    pub fn current(&self) -> Arc<ConfigSnapshot> {
        self.current.load_full()
    }

    /// Reads a new snapshot from `source` and installs it.
    ///
    /// On error the previously installed snapshot stays current.
    ///
    /// # Errors
    ///
    /// Propagates the [`ConfigParseError`] from `source`.
    pub fn reload(
        &self,
        source: &dyn SnapshotSource,
    ) -> Result<Arc<ConfigSnapshot>, ConfigParseError> {
        let snapshot = Arc::new(source.read_snapshot()?);
        self.current.store(Arc::clone(&snapshot));
        info!(
            origins = snapshot.allowed_origins().len(),
            enabled = snapshot.enabled_origin_count(),
            backend = %snapshot.backend(),
            "configuration snapshot installed"
        );
        Ok(snapshot)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
