//! Namespace watcher
//!
//! Wakes a process when another process touches the namespace database, so
//! remote changes are delivered without waiting for the next tick. Wake-ups
//! are hints: the driver drains notifications on every tick regardless.

use anyhow::{Context as _, Result};
use notify::{EventKind, RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{
    new_debouncer, DebounceEventResult, DebouncedEvent, Debouncer, RecommendedCache,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::broadcast;

use crate::storage::db::DB_FILE;

/// Database file activity seen on disk
#[derive(Debug, Clone)]
pub struct StoreWake {
    /// Path of the touched file (database, WAL or shared-memory file)
    pub path: PathBuf,

    pub kind: WakeKind,

    pub timestamp: std::time::SystemTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeKind {
    Created,
    Modified,
    Removed,
}

pub struct StoreWatcher {
    debouncer: Option<Debouncer<RecommendedWatcher, RecommendedCache>>,
}

impl StoreWatcher {
    /// Create a watcher; wake-ups arrive on the returned receiver
    pub fn new(debounce: Duration) -> Result<(Self, broadcast::Receiver<StoreWake>)> {
        let (wake_tx, wake_rx) = broadcast::channel(256);

        let debouncer = new_debouncer(debounce, None, move |result: DebounceEventResult| {
            match result {
                Ok(events) => {
                    for event in events {
                        if let Some(wake) = Self::debounced_event_to_wake(event) {
                            let _ = wake_tx.send(wake);
                        }
                    }
                }
                Err(errors) => {
                    for err in errors {
                        tracing::warn!("namespace watcher error: {err}");
                    }
                }
            }
        })?;

        Ok((
            Self {
                debouncer: Some(debouncer),
            },
            wake_rx,
        ))
    }

    /// Watch a namespace directory (not recursive)
    pub fn watch(&mut self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(debouncer) = &mut self.debouncer {
            debouncer
                .watch(path.as_ref(), RecursiveMode::NonRecursive)
                .with_context(|| format!("Failed to watch: {}", path.as_ref().display()))?;

            tracing::debug!(namespace = %path.as_ref().display(), "namespace watcher started");
        }
        Ok(())
    }

    pub fn stop(&mut self) {
        self.debouncer = None;
        tracing::debug!("namespace watcher stopped");
    }

    fn debounced_event_to_wake(debounced_event: DebouncedEvent) -> Option<StoreWake> {
        let event = &debounced_event.event;
        let kind = match event.kind {
            EventKind::Create(_) => WakeKind::Created,
            EventKind::Modify(_) => WakeKind::Modified,
            EventKind::Remove(_) => WakeKind::Removed,
            _ => return None,
        };

        let path = event.paths.iter().find(|p| is_store_file(p))?.clone();

        Some(StoreWake {
            path,
            kind,
            timestamp: std::time::SystemTime::now(),
        })
    }
}

/// `store.db`, `store.db-wal`, `store.db-shm`
fn is_store_file(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().starts_with(DB_FILE))
        .unwrap_or(false)
}
