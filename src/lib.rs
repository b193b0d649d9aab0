//! # winsync - Cross-Process Window Registry
//!
//! Independently running windows (separate processes, no direct channel
//! between them) share one key-value namespace. `winsync` turns that namespace
//! into a shared, ordered list of "who else is open and where".
//!
//! ## Features
//!
//! - **Stable ids**: every window takes the next value of a shared counter at join
//! - **Ordered registry**: index position is stable apart from removals, so the
//!   i-th window can be paired with the i-th visual object
//! - **Change callbacks**: one for this window's own geometry, one for membership
//! - **Writer-excluded notifications**: a process never hears its own writes
//! - **Pluggable stores**: in-process namespace for tests and embedding, SQLite
//!   namespace for real multi-process use
//!
//! Consistency is best-effort. Every write is a full overwrite, so concurrent
//! writers can lose each other's changes, and a crashed window leaves its entry
//! behind until the namespace is cleared.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use winsync::{SqliteStore, WindowManager, WindowShape};
//!
//! fn main() -> anyhow::Result<()> {
//!     let store = SqliteStore::open(std::path::Path::new(".winsync"), 1024)?;
//!     let mut manager = WindowManager::new(store, || WindowShape::new(0, 0, 800, 600));
//!
//!     manager.set_windows_change_callback(|| println!("membership changed"));
//!     let (id, _) = manager.join(serde_json::json!({"foo": "bar"}))?;
//!     println!("joined as window {id}");
//!
//!     // from the render loop
//!     manager.update()?;
//!     manager.sync_remote()?;
//!
//!     manager.on_before_terminate()?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod geometry;
pub mod registry;
pub mod storage;
pub mod sync;
pub mod watcher;

// Re-export main types for library consumers
pub use config::Config;
pub use geometry::{FileGeometry, GeometrySource, SharedGeometry};
pub use registry::{Lifecycle, WindowEntry, WindowId, WindowManager, WindowShape};
pub use storage::{MemoryNamespace, MemoryStore, SharedStore, SqliteStore, StoreEvent};
pub use watcher::{StoreWake, StoreWatcher};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
