//! Hot reload of the settings file.
//!
//! The watcher observes the settings file's *directory* rather than the file
//! itself: editors commonly save by writing a temporary file and renaming it
//! over the original, which replaces the inode a file watch would be bound
//! to.  Events for other files in the directory are ignored.
//!
//! Events are debounced (one reload per burst of writes) and forwarded over a
//! channel to a Tokio task that calls [`SnapshotStore::reload`].  A failed
//! reload leaves the previous snapshot in place.

use std::sync::Arc;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, DebouncedEvent, Debouncer};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::application::SnapshotStore;
use crate::infrastructure::settings_file::SettingsFile;

/// Quiet period after the last file event before a reload is triggered.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(250);

/// A running settings watch.  Dropping it stops watching.
pub struct SettingsWatcher {
    _debouncer: Debouncer<RecommendedWatcher>,
    task: JoinHandle<()>,
}

impl Drop for SettingsWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Starts watching `file` and reloading `store` whenever it changes.
///
/// # Errors
///
/// Returns the `notify` error if the platform watcher cannot be created or
/// the settings directory cannot be watched.
pub fn watch_settings(
    file: Arc<SettingsFile>,
    store: Arc<SnapshotStore>,
    debounce: Duration,
) -> Result<SettingsWatcher, notify::Error> {
    let (tx, mut rx) = mpsc::channel::<()>(8);
    let file_name = file.path().file_name().map(|name| name.to_os_string());

    let mut debouncer = new_debouncer(
        debounce,
        move |result: Result<Vec<DebouncedEvent>, notify::Error>| match result {
            Ok(events) => {
                let touched = events
                    .iter()
                    .any(|event| event.path.file_name() == file_name.as_deref());
                if touched {
                    trace!("settings file event");
                    // A full channel already has a reload queued.
                    let _ = tx.try_send(());
                }
            }
            Err(e) => error!("settings watcher error: {e}"),
        },
    )?;
    debouncer
        .watcher()
        .watch(file.home(), RecursiveMode::NonRecursive)?;
    info!(path = %file.path().display(), "watching settings file");

    let task = tokio::spawn(async move {
        while rx.recv().await.is_some() {
            if !file.path().exists() {
                info!(path = %file.path().display(), "settings file removed; keeping current settings");
                continue;
            }
            match store.reload(&*file) {
                Ok(_) => debug!("settings reloaded after file change"),
                Err(e) => warn!(
                    path = %file.path().display(),
                    "settings not reloaded, keeping previous settings: {e}"
                ),
            }
        }
    });

    Ok(SettingsWatcher {
        _debouncer: debouncer,
        task,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
