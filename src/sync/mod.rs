//! Driver loop
//!
//! Keeps one joined window in step with the namespace. Each tick first
//! delivers pending remote notifications and then polls geometry; watcher
//! wake-ups deliver notifications between ticks. The window is removed when
//! the shutdown future resolves.

use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::MissedTickBehavior;

use crate::config::Config;
use crate::geometry::GeometrySource;
use crate::registry::WindowManager;
use crate::storage::SharedStore;
use crate::watcher::StoreWake;

#[derive(Debug, Clone, Copy)]
pub struct SyncOptions {
    /// Geometry polling interval
    pub tick: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(100),
        }
    }
}

impl From<&Config> for SyncOptions {
    fn from(config: &Config) -> Self {
        Self { tick: config.tick() }
    }
}

/// Run until `shutdown` resolves, then leave the registry.
///
/// The window must already be joined. `wake` may be `None` when no watcher is
/// running; the tick alone still delivers remote changes.
pub async fn run<S, G, F>(
    manager: &mut WindowManager<S, G>,
    wake: Option<broadcast::Receiver<StoreWake>>,
    options: SyncOptions,
    shutdown: F,
) -> Result<()>
where
    S: SharedStore,
    G: GeometrySource,
    F: Future<Output = ()>,
{
    let outcome = drive(manager, wake, options, shutdown).await;
    let leave = manager.on_before_terminate();

    if let Err(err) = &outcome {
        tracing::error!("driver stopped: {err:#}");
    }
    outcome.and(leave)
}

async fn drive<S, G, F>(
    manager: &mut WindowManager<S, G>,
    mut wake: Option<broadcast::Receiver<StoreWake>>,
    options: SyncOptions,
    shutdown: F,
) -> Result<()>
where
    S: SharedStore,
    G: GeometrySource,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    let mut ticker = tokio::time::interval(options.tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::debug!("shutdown requested");
                return Ok(());
            }
            _ = ticker.tick() => {
                // apply queued remote writes before publishing our own
                manager.sync_remote()?;
                manager.update()?;
            }
            received = next_wake(&mut wake) => match received {
                Ok(_) => {
                    manager.sync_remote()?;
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "wake-ups coalesced");
                    manager.sync_remote()?;
                }
                Err(RecvError::Closed) => {
                    tracing::warn!("namespace watcher closed; relying on tick");
                    wake = None;
                }
            }
        }
    }
}

async fn next_wake(wake: &mut Option<broadcast::Receiver<StoreWake>>) -> Result<StoreWake, RecvError> {
    match wake {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::SharedGeometry;
    use crate::registry::WindowShape;
    use crate::storage::{self, MemoryNamespace, StoreEvent, WINDOWS_KEY};
    use crate::watcher::WakeKind;
    use std::cell::Cell;
    use std::rc::Rc;
    use tokio::sync::oneshot;
    use tokio::time::sleep;

    fn wake() -> StoreWake {
        StoreWake {
            path: "store.db-wal".into(),
            kind: WakeKind::Modified,
            timestamp: std::time::SystemTime::now(),
        }
    }

    #[tokio::test]
    async fn test_tick_publishes_geometry_and_leaves_on_shutdown() {
        let namespace = MemoryNamespace::new();
        let observer = namespace.open();
        let geometry = SharedGeometry::new(WindowShape::new(0, 0, 100, 100));
        let mut manager = WindowManager::new(namespace.open(), geometry.clone());
        manager.join(serde_json::Value::Null).unwrap();
        observer.pending_events().unwrap();

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let options = SyncOptions {
            tick: Duration::from_millis(5),
        };

        let (result, _) = tokio::join!(
            run(&mut manager, None, options, async {
                let _ = stop_rx.await;
            }),
            async {
                sleep(Duration::from_millis(30)).await;
                geometry.set(WindowShape::new(42, 0, 100, 100));
                sleep(Duration::from_millis(50)).await;
                let _ = stop_tx.send(());
            }
        );
        result.unwrap();

        let registry_writes: Vec<_> = observer
            .pending_events()
            .unwrap()
            .into_iter()
            .filter(|e| e.key.as_deref() == Some(WINDOWS_KEY))
            .collect();

        assert_eq!(registry_writes.len(), 2);
        let moved = storage::decode_windows(registry_writes[0].new_value.as_deref()).unwrap();
        assert_eq!(moved[0].shape.x, 42);
        assert_eq!(registry_writes[1], StoreEvent::set(WINDOWS_KEY, "[]"));
    }

    #[tokio::test]
    async fn test_tick_sees_remote_join_before_publishing_move() {
        let namespace = MemoryNamespace::new();
        let geometry = SharedGeometry::new(WindowShape::new(0, 0, 100, 100));
        let mut manager = WindowManager::new(namespace.open(), geometry.clone());
        manager.join(serde_json::Value::Null).unwrap();

        let mut other = WindowManager::new(namespace.open(), || WindowShape::default());
        other.join(serde_json::Value::Null).unwrap();
        let observer = namespace.open();

        // the move and the remote join are both pending at the first tick
        geometry.set(WindowShape::new(42, 0, 100, 100));

        let result = run(
            &mut manager,
            None,
            SyncOptions {
                tick: Duration::from_secs(3600),
            },
            sleep(Duration::from_millis(20)),
        )
        .await;
        result.unwrap();

        let registry_writes: Vec<_> = observer
            .pending_events()
            .unwrap()
            .into_iter()
            .filter(|e| e.key.as_deref() == Some(WINDOWS_KEY))
            .collect();
        assert_eq!(registry_writes.len(), 2);

        let moved = storage::decode_windows(registry_writes[0].new_value.as_deref()).unwrap();
        let ids: Vec<_> = moved.iter().map(|w| w.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(moved[0].shape.x, 42);

        let remaining = storage::load_windows(&observer).unwrap();
        assert_eq!(remaining.iter().map(|w| w.id).collect::<Vec<_>>(), vec![2]);
    }

    #[tokio::test]
    async fn test_wake_delivers_remote_join() {
        let namespace = MemoryNamespace::new();
        let mut manager = WindowManager::new(
            namespace.open(),
            SharedGeometry::new(WindowShape::new(0, 0, 10, 10)),
        );
        let hits = Rc::new(Cell::new(0));
        let counter = hits.clone();
        manager.set_windows_change_callback(move || counter.set(counter.get() + 1));
        manager.join(serde_json::Value::Null).unwrap();

        let (wake_tx, wake_rx) = broadcast::channel(8);
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        // long tick: only the immediate first tick fires
        let options = SyncOptions {
            tick: Duration::from_secs(3600),
        };

        let (result, seen) = tokio::join!(
            run(&mut manager, Some(wake_rx), options, async {
                let _ = stop_rx.await;
            }),
            async {
                sleep(Duration::from_millis(20)).await;
                let mut other = WindowManager::new(namespace.open(), || WindowShape::default());
                other.join(serde_json::Value::Null).unwrap();
                let _ = wake_tx.send(wake());
                sleep(Duration::from_millis(50)).await;
                let seen = hits.get();
                let _ = stop_tx.send(());
                seen
            }
        );
        result.unwrap();

        assert_eq!(seen, 1);
    }

    #[tokio::test]
    async fn test_closed_watcher_falls_back_to_tick() {
        let namespace = MemoryNamespace::new();
        let mut manager = WindowManager::new(namespace.open(), || WindowShape::default());
        manager.join(serde_json::Value::Null).unwrap();

        let (wake_tx, wake_rx) = broadcast::channel::<StoreWake>(8);
        drop(wake_tx);

        let result = run(
            &mut manager,
            Some(wake_rx),
            SyncOptions {
                tick: Duration::from_millis(5),
            },
            sleep(Duration::from_millis(30)),
        )
        .await;

        assert!(result.is_ok());
        assert!(storage::load_windows(manager.store()).unwrap().is_empty());
    }
}
