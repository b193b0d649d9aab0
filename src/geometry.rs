//! Geometry sources
//!
//! The registry never asks the operating environment where a window is; it
//! asks a [`GeometrySource`]. Hosts with a real windowing system implement
//! the trait (or pass a closure); the stock sources here cover tests, embedders
//! that push geometry from their own loop, and the CLI.

use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;

use crate::registry::WindowShape;

/// Current visible screen region of this process's window.
pub trait GeometrySource {
    fn shape(&self) -> WindowShape;
}

impl<F> GeometrySource for F
where
    F: Fn() -> WindowShape,
{
    fn shape(&self) -> WindowShape {
        self()
    }
}

/// Geometry pushed in by the caller. Clones share the same shape.
#[derive(Debug, Clone, Default)]
pub struct SharedGeometry {
    inner: Arc<Mutex<WindowShape>>,
}

impl SharedGeometry {
    pub fn new(shape: WindowShape) -> Self {
        Self {
            inner: Arc::new(Mutex::new(shape)),
        }
    }

    pub fn set(&self, shape: WindowShape) {
        *self.inner.lock() = shape;
    }
}

impl GeometrySource for SharedGeometry {
    fn shape(&self) -> WindowShape {
        *self.inner.lock()
    }
}

/// Reads `{x, y, w, h}` from a JSON file on every query.
///
/// Editing the file moves the window as far as the registry is concerned.
/// Unreadable or half-written files keep the last good shape.
#[derive(Debug)]
pub struct FileGeometry {
    path: PathBuf,
    last: Mutex<WindowShape>,
}

impl FileGeometry {
    pub fn new(path: impl Into<PathBuf>, fallback: WindowShape) -> Self {
        Self {
            path: path.into(),
            last: Mutex::new(fallback),
        }
    }

    /// Shape returned by the most recent query, without touching the file
    pub fn last_shape(&self) -> WindowShape {
        *self.last.lock()
    }

    fn read(&self) -> anyhow::Result<WindowShape> {
        let raw = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

impl GeometrySource for FileGeometry {
    fn shape(&self) -> WindowShape {
        let mut last = self.last.lock();
        match self.read() {
            Ok(shape) => *last = shape,
            Err(err) => {
                tracing::trace!(path = %self.path.display(), "keeping last shape: {err}");
            }
        }
        *last
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_closure_source() {
        let source = || WindowShape::new(1, 2, 3, 4);
        assert_eq!(source.shape(), WindowShape::new(1, 2, 3, 4));
    }

    #[test]
    fn test_shared_geometry_clones_see_updates() {
        let geometry = SharedGeometry::new(WindowShape::new(0, 0, 100, 100));
        let handle = geometry.clone();

        handle.set(WindowShape::new(50, 0, 100, 100));
        assert_eq!(geometry.shape().x, 50);
    }

    #[test]
    fn test_file_geometry_falls_back_then_follows_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("shape.json");
        let fallback = WindowShape::new(0, 0, 800, 600);
        let geometry = FileGeometry::new(&path, fallback);

        assert_eq!(geometry.shape(), fallback);

        std::fs::write(&path, r#"{"x":10,"y":20,"w":300,"h":200}"#).unwrap();
        assert_eq!(geometry.shape(), WindowShape::new(10, 20, 300, 200));

        // a torn write keeps the last good value
        std::fs::write(&path, r#"{"x":10,"#).unwrap();
        assert_eq!(geometry.shape(), WindowShape::new(10, 20, 300, 200));
    }

    #[test]
    fn test_last_shape_is_what_the_last_query_returned() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("shape.json");
        std::fs::write(&path, r#"{"x":1,"y":1,"w":10,"h":10}"#).unwrap();
        let geometry = FileGeometry::new(&path, WindowShape::default());

        let polled = geometry.shape();

        // the file moves on, the cached shape does not
        std::fs::write(&path, r#"{"x":99,"y":1,"w":10,"h":10}"#).unwrap();
        assert_eq!(geometry.last_shape(), polled);
        assert_eq!(geometry.last_shape(), WindowShape::new(1, 1, 10, 10));
    }
}
