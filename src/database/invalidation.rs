//! Table invalidation tracking for live queries.
//!
//! Observers register interest in one or more tables. After a write commits,
//! the store calls [`InvalidationTracker::notify`] with the table it touched
//! and every observer of that table is invoked synchronously.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Something that re-runs work when a table changes.
pub trait TableObserver: Send + Sync {
    /// Tables this observer watches.
    fn tables(&self) -> &[&'static str];

    /// Called after a committed write to one of [`TableObserver::tables`].
    fn on_invalidated(&self, table: &str);
}

/// Handle returned by [`InvalidationTracker::add_observer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Registry of table observers.
#[derive(Default)]
pub struct InvalidationTracker {
    next_id: AtomicU64,
    observers: RwLock<HashMap<ObserverId, Arc<dyn TableObserver>>>,
}

impl InvalidationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_observer(&self, observer: Arc<dyn TableObserver>) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers.write().insert(id, observer);
        tracing::debug!("Registered table observer {:?}", id);
        id
    }

    /// Removes an observer. Returns false if it was already gone.
    pub fn remove_observer(&self, id: ObserverId) -> bool {
        let removed = self.observers.write().remove(&id).is_some();
        if removed {
            tracing::debug!("Removed table observer {:?}", id);
        }
        removed
    }

    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }

    /// Invokes every observer watching `table`.
    ///
    /// The registry lock is released before observers run, so an observer
    /// may add or remove observers from its callback.
    pub fn notify(&self, table: &str) {
        let interested: Vec<Arc<dyn TableObserver>> = self
            .observers
            .read()
            .values()
            .filter(|o| o.tables().contains(&table))
            .cloned()
            .collect();

        tracing::debug!(
            "Table {} invalidated, notifying {} observer(s)",
            table,
            interested.len()
        );

        for observer in interested {
            observer.on_invalidated(table);
        }
    }
}
