use anyhow::Result;
use crossbeam::channel::{unbounded, Receiver, Sender};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::{SharedStore, StoreEvent};

#[derive(Default)]
struct Inner {
    values: HashMap<String, String>,
    subscribers: Vec<(u64, Sender<StoreEvent>)>,
}

/// In-process shared namespace.
///
/// Each [`MemoryStore`] opened from it behaves like a separate process: it
/// sees every value, and receives notifications for every write except its
/// own.
#[derive(Clone, Default)]
pub struct MemoryNamespace {
    inner: Arc<RwLock<Inner>>,
    next_handle: Arc<AtomicU64>,
}

impl MemoryNamespace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self) -> MemoryStore {
        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = unbounded();
        self.inner.write().subscribers.push((handle, tx));

        MemoryStore {
            namespace: self.clone(),
            handle,
            events: rx,
        }
    }

    /// Copy of every key currently stored
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.inner.read().values.clone()
    }

    fn publish(&self, inner: &mut Inner, origin: u64, event: StoreEvent) {
        // dropped handles fall out of the subscriber list here
        inner.subscribers.retain(|(handle, tx)| {
            if *handle == origin {
                return true;
            }
            tx.send(event.clone()).is_ok()
        });
    }
}

pub struct MemoryStore {
    namespace: MemoryNamespace,
    handle: u64,
    events: Receiver<StoreEvent>,
}

impl SharedStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.namespace.inner.read().values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut inner = self.namespace.inner.write();
        inner.values.insert(key.to_string(), value.to_string());
        self.namespace
            .publish(&mut inner, self.handle, StoreEvent::set(key, value));
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut inner = self.namespace.inner.write();
        inner.values.remove(key);
        self.namespace.publish(
            &mut inner,
            self.handle,
            StoreEvent {
                key: Some(key.to_string()),
                new_value: None,
            },
        );
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut inner = self.namespace.inner.write();
        inner.values.clear();
        self.namespace
            .publish(&mut inner, self.handle, StoreEvent::cleared());
        Ok(())
    }

    fn pending_events(&self) -> Result<Vec<StoreEvent>> {
        Ok(self.events.try_iter().collect())
    }
}
