use serde::{Deserialize, Serialize};

/// Identity of a window inside the shared registry.
pub type WindowId = u64;

/// Screen-space rectangle occupied by a window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowShape {
    pub x: i32,
    pub y: i32,
    #[serde(rename = "w")]
    pub width: i32,
    #[serde(rename = "h")]
    pub height: i32,
}

impl WindowShape {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Center point, used by consumers that place one object per window
    pub fn center(&self) -> (f64, f64) {
        (
            self.x as f64 + self.width as f64 * 0.5,
            self.y as f64 + self.height as f64 * 0.5,
        )
    }
}

/// One window's public record in the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowEntry {
    pub id: WindowId,
    pub shape: WindowShape,
    /// Caller-supplied data attached at join time, never rewritten afterwards
    #[serde(default, alias = "metaData")]
    pub metadata: serde_json::Value,
}

impl WindowEntry {
    pub fn new(id: WindowId, shape: WindowShape, metadata: serde_json::Value) -> Self {
        Self {
            id,
            shape,
            metadata,
        }
    }
}
