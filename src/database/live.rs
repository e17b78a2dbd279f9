//! Live listing of voice notes.
//!
//! [`NoteStore::list_all`] returns a [`LiveNotes`] subscription. Its observer
//! is registered on the `voice_notes` table; after every committed write that
//! changes rows it re-runs the listing and publishes the result on a
//! `tokio::sync::watch` channel.

use std::sync::{Arc, Weak};
use tokio::sync::watch;

use crate::database::invalidation::{ObserverId, TableObserver};
use crate::database::schema::VOICE_NOTES_TABLE;
use crate::database::voice_note::{query_all, run_blocking, VoiceNote};
use crate::database::{DatabaseError, NoteStore, StoreShared};

/// Result delivered to live subscribers; errors are shared between clones.
pub type NotesSnapshot = Result<Vec<VoiceNote>, Arc<DatabaseError>>;

const WATCHED_TABLES: &[&str] = &[VOICE_NOTES_TABLE];

struct NotesObserver {
    store: Weak<StoreShared>,
    sender: watch::Sender<NotesSnapshot>,
}

impl NotesObserver {
    fn refresh(&self, shared: &StoreShared) {
        let snapshot = shared.with_reader(query_all).map_err(Arc::new);
        if let Err(e) = &snapshot {
            tracing::error!("Failed to refresh live voice note listing: {}", e);
        }
        let _previous = self.sender.send_replace(snapshot);
    }
}

impl TableObserver for NotesObserver {
    fn tables(&self) -> &[&'static str] {
        WATCHED_TABLES
    }

    fn on_invalidated(&self, _table: &str) {
        if let Some(shared) = self.store.upgrade() {
            self.refresh(&shared);
        }
    }
}

/// A live, newest-first listing of every voice note.
///
/// Dropping it unregisters the underlying observer.
pub struct LiveNotes {
    receiver: watch::Receiver<NotesSnapshot>,
    store: Weak<StoreShared>,
    observer_id: ObserverId,
}

impl LiveNotes {
    /// The most recently delivered listing.
    pub fn current(&self) -> NotesSnapshot {
        self.receiver.borrow().clone()
    }

    /// Waits for the next delivery and returns it.
    ///
    /// Fails with [`DatabaseError::Closed`] once the store is gone, or with
    /// the error the refresh query hit.
    pub async fn changed(&mut self) -> NotesSnapshot {
        self.receiver
            .changed()
            .await
            .map_err(|_| Arc::new(DatabaseError::Closed))?;

        self.receiver.borrow_and_update().clone()
    }

    /// Whether a delivery has arrived that [`LiveNotes::changed`] has not yet returned.
    pub fn has_changed(&self) -> bool {
        self.receiver.has_changed().unwrap_or(false)
    }
}

impl Drop for LiveNotes {
    fn drop(&mut self) {
        if let Some(shared) = self.store.upgrade() {
            shared.tracker.remove_observer(self.observer_id);
        }
    }
}

impl std::fmt::Debug for LiveNotes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveNotes")
            .field("observer_id", &self.observer_id)
            .finish_non_exhaustive()
    }
}

impl NoteStore {
    /// Subscribes to every note ordered by createdAt descending.
    ///
    /// The subscription starts with the current listing and receives a fresh
    /// one after each committed insert, update or delete.
    pub fn list_all(&self) -> LiveNotes {
        let (receiver, observer_id) = self.with_writes_paused(|| {
            let initial = self.shared.with_reader(query_all).map_err(Arc::new);
            let (sender, receiver) = watch::channel(initial);
            let observer = Arc::new(NotesObserver {
                store: Arc::downgrade(&self.shared),
                sender,
            });
            (receiver, self.shared.tracker.add_observer(observer))
        });

        LiveNotes {
            receiver,
            store: Arc::downgrade(&self.shared),
            observer_id,
        }
    }

    /// [`NoteStore::list_all`] on tokio's blocking pool, so waiting behind a
    /// long write does not hold up a runtime worker.
    pub async fn list_all_async(&self) -> Result<LiveNotes, DatabaseError> {
        let store = self.clone();
        run_blocking(move || Ok(store.list_all())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_dropping_subscription_unregisters_observer() {
        let dir = TempDir::new().unwrap();
        let store = NoteStore::open_at(dir.path().join("notes.db")).unwrap();

        let first = store.list_all();
        let second = store.list_all();
        assert_eq!(store.shared.tracker.observer_count(), 2);

        drop(first);
        assert_eq!(store.shared.tracker.observer_count(), 1);

        // Writes keep notifying the remaining subscriber
        store
            .insert(&VoiceNote::new("After drop", "/audio/a.m4a", 10, 10))
            .unwrap();
        assert!(second.has_changed());
        assert_eq!(second.current().unwrap().len(), 1);

        drop(second);
        assert_eq!(store.shared.tracker.observer_count(), 0);
        store.delete_by_id(1).unwrap();
    }
}
