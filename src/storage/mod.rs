pub mod db;
pub mod memory;
pub mod sqlite;

use anyhow::{Context as _, Result};
use colored::*;
use std::path::Path;

use crate::config::Config;
use crate::registry::{WindowEntry, WindowId};

pub use db::Database;
pub use memory::{MemoryNamespace, MemoryStore};
pub use sqlite::SqliteStore;

/// Shared id counter, a decimal integer
pub const COUNT_KEY: &str = "count";
/// Shared registry, a JSON array of window entries
pub const WINDOWS_KEY: &str = "windows";

pub const DEFAULT_NAMESPACE: &str = ".winsync";

/// Change notification delivered to every handle except the writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEvent {
    /// `None` when the whole namespace was cleared
    pub key: Option<String>,
    /// `None` when the key no longer exists
    pub new_value: Option<String>,
}

impl StoreEvent {
    pub fn set(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            new_value: Some(value.into()),
        }
    }

    pub fn cleared() -> Self {
        Self {
            key: None,
            new_value: None,
        }
    }

    pub fn is_clear(&self) -> bool {
        self.key.is_none()
    }
}

/// Key-value namespace shared by every participating process.
///
/// Writes are unconditional overwrites; there is no compare-and-swap. Each
/// handle is one participant: it never receives notifications for its own
/// writes.
pub trait SharedStore {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;

    /// Remove every key in the namespace
    fn clear(&self) -> Result<()>;

    /// Drain notifications produced by other handles since the last call,
    /// in commit order.
    fn pending_events(&self) -> Result<Vec<StoreEvent>>;
}

/// Read the shared counter; absent means zero.
pub fn load_count<S: SharedStore + ?Sized>(store: &S) -> Result<WindowId> {
    match store.get(COUNT_KEY)? {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Malformed shared key `{COUNT_KEY}`: {raw:?}")),
        None => Ok(0),
    }
}

/// Read the shared registry; absent means empty.
pub fn load_windows<S: SharedStore + ?Sized>(store: &S) -> Result<Vec<WindowEntry>> {
    decode_windows(store.get(WINDOWS_KEY)?.as_deref())
}

pub fn decode_windows(raw: Option<&str>) -> Result<Vec<WindowEntry>> {
    match raw {
        // a literal `null` is as good as absent
        Some(raw) => Ok(serde_json::from_str::<Option<Vec<WindowEntry>>>(raw)
            .with_context(|| format!("Malformed shared key `{WINDOWS_KEY}`"))?
            .unwrap_or_default()),
        None => Ok(Vec::new()),
    }
}

pub async fn init(path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path).await?;

    let db = Database::new(path)?;
    db.initialize()?;

    let config_path = path.join(crate::config::CONFIG_FILE);
    if !config_path.exists() {
        Config::for_namespace(path).save(path)?;
    }

    Ok(())
}

pub async fn show_windows(path: &Path) -> Result<()> {
    let config = Config::load(path)?;
    let store = SqliteStore::open(path, config.change_retention)?;
    let count = load_count(&store)?;
    let windows = load_windows(&store)?;

    println!(
        "{} {}",
        "Window Registry".cyan().bold(),
        format!("({})", config.namespace_id).bright_black()
    );
    println!("{}", "═".repeat(80).bright_black());
    println!("{} counter: {}", "→".bright_blue(), count.to_string().bright_yellow());

    if windows.is_empty() {
        println!("{}", "  no windows joined".bright_black());
    }

    for (index, window) in windows.iter().enumerate() {
        print_window(index, window);
    }

    Ok(())
}

pub fn print_window(index: usize, window: &WindowEntry) {
    let shape = &window.shape;
    println!(
        "{} {} {} {}",
        format!("[{}]", index).bright_black(),
        format!("#{}", window.id).bold().green(),
        format!("{}x{} @ ({}, {})", shape.width, shape.height, shape.x, shape.y).bright_white(),
        window.metadata.to_string().bright_black()
    );
}

pub async fn clear(path: &Path) -> Result<()> {
    let config = Config::load(path)?;
    let store = SqliteStore::open(path, config.change_retention)?;
    store.clear()?;
    tracing::info!(namespace = %config.namespace_id, "namespace cleared");
    Ok(())
}
