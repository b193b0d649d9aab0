//! Namespace configuration (`<namespace>/config.json`)

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::Duration;

pub const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Crate version that wrote the file
    pub version: String,

    /// Stable label for the namespace, used in logs. Derived from the
    /// directory when the file leaves it out.
    pub namespace_id: String,

    /// Driver tick: how often geometry is polled
    pub tick_ms: u64,

    /// Debounce window for file system wake-ups
    pub debounce_ms: u64,

    /// Change log rows kept in the namespace database
    pub change_retention: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: crate::VERSION.to_string(),
            namespace_id: String::new(),
            tick_ms: 100,
            debounce_ms: 50,
            change_retention: 1024,
        }
    }
}

impl Config {
    /// Defaults for a namespace rooted at `dir`
    pub fn for_namespace(dir: &Path) -> Self {
        Self {
            namespace_id: namespace_id(dir),
            ..Default::default()
        }
    }

    /// Load `config.json` from a namespace directory, defaults if absent
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::for_namespace(dir));
        }

        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mut config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid config: {}", path.display()))?;
        if config.namespace_id.is_empty() {
            config.namespace_id = namespace_id(dir);
        }
        Ok(config)
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        let path = dir.join(CONFIG_FILE);
        std::fs::write(&path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

fn namespace_id(dir: &Path) -> String {
    let canonical = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string_lossy().as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("ns-{}", &digest[..16])
}
