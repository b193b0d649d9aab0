//! Window registry
//!
//! [`WindowManager`] owns one process's view of the shared window list: its
//! own identity, the last registry snapshot it has seen, and the callbacks the
//! rendering side registers. All shared state lives in a [`SharedStore`];
//! every write is a full read-modify-write with last-write-wins semantics, so
//! concurrent joins or leaves from different processes can lose updates.

pub mod diff;
pub mod entry;

use anyhow::{bail, Context as _, Result};

use crate::geometry::GeometrySource;
use crate::storage::{self, SharedStore, StoreEvent, COUNT_KEY, WINDOWS_KEY};

pub use diff::did_windows_change;
pub use entry::{WindowEntry, WindowId, WindowShape};

pub type Callback = Box<dyn FnMut()>;

/// Per-process lifecycle: `Unjoined -> Joined -> Terminated`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Unjoined,
    Joined,
    Terminated,
}

pub struct WindowManager<S, G> {
    store: S,
    geometry: G,
    state: Lifecycle,
    /// Last registry snapshot observed, used for change detection
    windows: Vec<WindowEntry>,
    this_window: Option<WindowEntry>,
    on_shape_change: Option<Callback>,
    on_windows_change: Option<Callback>,
}

impl<S: SharedStore, G: GeometrySource> WindowManager<S, G> {
    pub fn new(store: S, geometry: G) -> Self {
        Self {
            store,
            geometry,
            state: Lifecycle::Unjoined,
            windows: Vec::new(),
            this_window: None,
            on_shape_change: None,
            on_windows_change: None,
        }
    }

    /// Called whenever `update` sees this window's own geometry change
    pub fn set_shape_change_callback(&mut self, callback: impl FnMut() + 'static) {
        self.on_shape_change = Some(Box::new(callback));
    }

    /// Called whenever a remote write changes which windows are present.
    /// Re-read [`windows`](Self::windows) from inside the callback's owner.
    pub fn set_windows_change_callback(&mut self, callback: impl FnMut() + 'static) {
        self.on_windows_change = Some(Box::new(callback));
    }

    /// Register this window in the shared registry.
    ///
    /// Reads the registry and counter, takes the next id, appends an entry and
    /// writes both keys back. Meant to be called once; a second call adds a
    /// second entry. A terminated manager cannot join again.
    pub fn join(&mut self, metadata: serde_json::Value) -> Result<(WindowId, WindowEntry)> {
        match self.state {
            Lifecycle::Unjoined => {}
            Lifecycle::Joined => {
                tracing::warn!("join called more than once; adding another entry");
            }
            Lifecycle::Terminated => bail!("window already left the registry"),
        }

        let mut windows = storage::load_windows(&self.store)?;
        let count = storage::load_count(&self.store)?;
        let id = count
            .checked_add(1)
            .with_context(|| format!("Malformed shared key `{COUNT_KEY}`: {count} has no successor"))?;

        let entry = WindowEntry::new(id, self.geometry.shape(), metadata);
        windows.push(entry.clone());

        self.store
            .set(COUNT_KEY, &id.to_string())
            .context("Failed to persist window counter")?;
        self.windows = windows;
        self.this_window = Some(entry.clone());
        self.persist()?;

        self.state = Lifecycle::Joined;
        tracing::info!(id, windows = self.windows.len(), "window joined");

        Ok((id, entry))
    }

    /// Another process wrote the registry key.
    ///
    /// The snapshot is always replaced; the membership callback fires only
    /// when [`did_windows_change`] reports a difference. Returns whether it
    /// fired.
    pub fn on_remote_change(&mut self, new_value: Option<&str>) -> Result<bool> {
        if self.state != Lifecycle::Joined {
            return Ok(false);
        }

        let windows = storage::decode_windows(new_value)?;
        let changed = did_windows_change(&self.windows, &windows);
        self.windows = windows;

        tracing::debug!(changed, windows = self.windows.len(), "remote registry update");

        if changed {
            if let Some(callback) = self.on_windows_change.as_mut() {
                callback();
            }
        }

        Ok(changed)
    }

    /// Dispatch one store notification. Only the registry key matters; a
    /// cleared namespace reads as an absent registry.
    pub fn handle_event(&mut self, event: &StoreEvent) -> Result<bool> {
        match event.key.as_deref() {
            Some(WINDOWS_KEY) => self.on_remote_change(event.new_value.as_deref()),
            None => self.on_remote_change(None),
            Some(_) => Ok(false),
        }
    }

    /// Deliver every pending store notification. Returns how many were
    /// handled.
    pub fn sync_remote(&mut self) -> Result<usize> {
        if self.state != Lifecycle::Joined {
            return Ok(0);
        }

        let events = self.store.pending_events()?;
        for event in &events {
            self.handle_event(event)?;
        }

        Ok(events.len())
    }

    /// Poll geometry and publish it if it moved or resized.
    ///
    /// Unchanged geometry writes nothing and fires nothing. Returns whether the
    /// shape changed.
    pub fn update(&mut self) -> Result<bool> {
        if self.state != Lifecycle::Joined {
            return Ok(false);
        }
        let Some(this_window) = self.this_window.as_mut() else {
            return Ok(false);
        };

        let shape = self.geometry.shape();
        if shape == this_window.shape {
            return Ok(false);
        }

        this_window.shape = shape;
        let id = this_window.id;

        match self.windows.iter_mut().find(|w| w.id == id) {
            Some(entry) => entry.shape = shape,
            None => tracing::warn!(id, "own entry missing from registry; shape not mirrored"),
        }

        if let Some(callback) = self.on_shape_change.as_mut() {
            callback();
        }

        self.persist()?;
        Ok(true)
    }

    /// Remove this window's entry before the process goes away.
    pub fn on_before_terminate(&mut self) -> Result<()> {
        if self.state != Lifecycle::Joined {
            return Ok(());
        }
        self.state = Lifecycle::Terminated;

        let Some(id) = self.this_window_id() else {
            return Ok(());
        };

        match self.window_index(id) {
            Some(index) => {
                self.windows.remove(index);
                self.persist()?;
                tracing::info!(id, windows = self.windows.len(), "window left");
            }
            None => {
                tracing::warn!(id, "own entry already gone from registry; nothing to remove");
            }
        }

        Ok(())
    }

    /// Last registry snapshot this process has seen, in shared order
    pub fn windows(&self) -> &[WindowEntry] {
        &self.windows
    }

    pub fn this_window(&self) -> Option<&WindowEntry> {
        self.this_window.as_ref()
    }

    pub fn this_window_id(&self) -> Option<WindowId> {
        self.this_window.as_ref().map(|w| w.id)
    }

    /// Position of a window in the last-known registry
    pub fn window_index(&self, id: WindowId) -> Option<usize> {
        self.windows.iter().position(|w| w.id == id)
    }

    pub fn state(&self) -> Lifecycle {
        self.state
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn persist(&self) -> Result<()> {
        let raw = serde_json::to_string(&self.windows)?;
        self.store
            .set(WINDOWS_KEY, &raw)
            .context("Failed to persist window registry")?;
        tracing::debug!(windows = self.windows.len(), "registry persisted");
        Ok(())
    }
}
