//! Database module for the voice note store.
//!
//! Provides SQLite connection management, migrations and the [`NoteStore`]
//! handle. The database is stored at `~/.voicenotes/voice_notes.db` unless the
//! [`StoreConfig`] names another file.
//!
//! A store owns one writer connection, serialised behind a mutex, and a small
//! pool of reader connections. Every write runs in a transaction and, once
//! committed, notifies the observers registered on the `voice_notes` table.

pub mod invalidation;
pub mod key_points;
pub mod live;
pub mod migrations;
pub mod schema;
pub mod voice_note;

use parking_lot::Mutex;
use rusqlite::{Connection, ErrorCode, Transaction};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::config::StoreConfig;
use crate::database::invalidation::InvalidationTracker;
use crate::database::migrations::run_migrations;
use crate::database::schema::VOICE_NOTES_TABLE;

/// Process-wide store, created on first access and cleared at teardown.
static SHARED_STORE: Mutex<Option<NoteStore>> = parking_lot::const_mutex(None);

/// Database error types.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Failed to create database directory: {0}")]
    DirectoryCreation(#[from] std::io::Error),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Integrity error: {0}")]
    Integrity(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[source] rusqlite::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Database task failed: {0}")]
    Task(String),

    #[error("Store has been closed")]
    Closed,
}

impl DatabaseError {
    /// Whether the failure is transient (busy, locked, I/O) and worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            DatabaseError::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                ErrorCode::DatabaseBusy
                    | ErrorCode::DatabaseLocked
                    | ErrorCode::SystemIoFailure
                    | ErrorCode::DiskFull
            ),
            _ => false,
        }
    }
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(e, msg) if e.code == ErrorCode::ConstraintViolation => {
                DatabaseError::ConstraintViolation(msg.unwrap_or_else(|| e.to_string()))
            }
            rusqlite::Error::InvalidColumnType(index, name, ty) => DatabaseError::Integrity(
                format!("column {} (#{}) holds unexpected {} value", name, index, ty),
            ),
            rusqlite::Error::FromSqlConversionFailure(index, ty, e) => DatabaseError::Integrity(
                format!("column #{} ({}) could not be converted: {}", index, ty, e),
            ),
            rusqlite::Error::IntegralValueOutOfRange(index, value) => DatabaseError::Integrity(
                format!("column #{} value {} out of range", index, value),
            ),
            other => DatabaseError::Sqlite(other),
        }
    }
}

/// State shared by every clone of a [`NoteStore`].
pub(crate) struct StoreShared {
    path: PathBuf,
    config: StoreConfig,
    writer: Mutex<Connection>,
    readers: Mutex<Vec<Connection>>,
    pub(crate) tracker: InvalidationTracker,
}

impl StoreShared {
    /// Runs `f` on a pooled reader connection.
    pub(crate) fn with_reader<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, DatabaseError>,
    ) -> Result<T, DatabaseError> {
        let conn = match self.readers.lock().pop() {
            Some(conn) => conn,
            None => open_connection(&self.path, &self.config)?,
        };

        let result = f(&conn);

        let mut readers = self.readers.lock();
        if readers.len() < self.config.max_idle_readers {
            readers.push(conn);
        }

        result
    }
}

/// Handle to the voice note database.
///
/// Cloning is cheap; all clones share the same connections and observers.
#[derive(Clone)]
pub struct NoteStore {
    pub(crate) shared: Arc<StoreShared>,
}

impl std::fmt::Debug for NoteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoteStore")
            .field("path", &self.shared.path)
            .finish_non_exhaustive()
    }
}

impl NoteStore {
    /// Opens (creating if needed) the database described by `config` and
    /// brings its schema up to date.
    pub fn open(config: &StoreConfig) -> Result<Self, DatabaseError> {
        let path = config.resolved_database_path();
        ensure_database_directory(&path)?;

        tracing::info!("Opening voice note database at {:?}", path);

        let mut writer = open_connection(&path, config)?;
        run_migrations(&mut writer)?;

        tracing::info!("Voice note database ready");

        Ok(Self {
            shared: Arc::new(StoreShared {
                path,
                config: config.clone(),
                writer: Mutex::new(writer),
                readers: Mutex::new(Vec::new()),
                tracker: InvalidationTracker::new(),
            }),
        })
    }

    /// Opens a store at `path` with default settings.
    pub fn open_at(path: impl AsRef<Path>) -> Result<Self, DatabaseError> {
        Self::open(&StoreConfig::with_database_path(path.as_ref()))
    }

    /// Path of the underlying database file.
    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    /// Runs `f` inside a write transaction.
    ///
    /// `f` returns its result and the number of rows it changed. The
    /// transaction is rolled back if `f` fails. After a commit that changed
    /// at least one row, observers of `voice_notes` are notified before the
    /// writer lock is released, so they see writes in commit order.
    pub(crate) fn write<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> Result<(T, usize), DatabaseError>,
    ) -> Result<T, DatabaseError> {
        let mut conn = self.shared.writer.lock();
        let tx = conn.transaction()?;
        let (value, changed) = f(&tx)?;
        tx.commit()?;

        if changed > 0 {
            self.shared.tracker.notify(VOICE_NOTES_TABLE);
        }

        Ok(value)
    }

    /// Runs `f` while holding the writer lock, without a transaction.
    ///
    /// Used to register live queries so no commit slips between registration
    /// and the first snapshot.
    pub(crate) fn with_writes_paused<T>(&self, f: impl FnOnce() -> T) -> T {
        let _guard = self.shared.writer.lock();
        f()
    }
}

/// Ensures the parent directory of the database file exists.
fn ensure_database_directory(path: &Path) -> Result<(), DatabaseError> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            std::fs::create_dir_all(dir)?;
            tracing::info!("Created database directory at {:?}", dir);
        }
    }
    Ok(())
}

/// Opens a connection to the database with the configured busy timeout and
/// journal mode.
fn open_connection(path: &Path, config: &StoreConfig) -> Result<Connection, DatabaseError> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;

    let mode: String = conn.pragma_update_and_check(
        None,
        "journal_mode",
        config.journal_mode.as_pragma(),
        |row| row.get(0),
    )?;
    tracing::debug!("Connection opened with journal mode {}", mode);

    Ok(conn)
}

// =============================================================================
// Process-wide store
// =============================================================================

/// Returns the process-wide store, opening it from `config` on first access.
///
/// Concurrent first calls are serialised so exactly one store is created;
/// later calls ignore `config` and return the existing handle.
pub fn shared_store(config: &StoreConfig) -> Result<NoteStore, DatabaseError> {
    let mut slot = SHARED_STORE.lock();

    if let Some(store) = slot.as_ref() {
        return Ok(store.clone());
    }

    let store = NoteStore::open(config)?;
    *slot = Some(store.clone());
    Ok(store)
}

/// Returns the process-wide store if it is open.
pub fn current_shared_store() -> Result<NoteStore, DatabaseError> {
    SHARED_STORE.lock().clone().ok_or(DatabaseError::Closed)
}

/// Tears down the process-wide store.
///
/// Connections close once the last outstanding clone is dropped. Returns
/// false if no store was open.
pub fn close_shared_store() -> bool {
    let closed = SHARED_STORE.lock().take().is_some();
    if closed {
        tracing::info!("Shared voice note store closed");
    }
    closed
}

// =============================================================================
// Re-exports
// =============================================================================

pub use live::LiveNotes;
pub use voice_note::VoiceNote;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn constraint_error() -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT_NOTNULL),
            Some("NOT NULL constraint failed: voice_notes.title".to_string()),
        )
    }

    #[test]
    fn test_constraint_failures_are_classified() {
        let err: DatabaseError = constraint_error().into();
        assert!(matches!(err, DatabaseError::ConstraintViolation(ref m) if m.contains("title")));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_busy_is_transient() {
        let err: DatabaseError = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        )
        .into();
        assert!(err.is_transient());
    }

    #[test]
    fn test_open_creates_missing_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("notes.db");

        let store = NoteStore::open_at(&path).unwrap();
        assert!(path.exists());
        assert_eq!(store.path(), path.as_path());
    }

    #[test]
    fn test_reopen_existing_database() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.db");

        drop(NoteStore::open_at(&path).unwrap());
        NoteStore::open_at(&path).unwrap();
    }

    fn reader_journal_mode(store: &NoteStore) -> String {
        store
            .shared
            .with_reader(|conn| {
                let mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
                Ok(mode)
            })
            .unwrap()
            .to_lowercase()
    }

    #[test]
    fn test_reader_connections_use_configured_journal_mode() {
        let dir = TempDir::new().unwrap();

        let wal = NoteStore::open_at(dir.path().join("wal.db")).unwrap();
        assert_eq!(reader_journal_mode(&wal), "wal");

        let config = StoreConfig {
            journal_mode: crate::config::JournalMode::Delete,
            ..StoreConfig::with_database_path(dir.path().join("delete.db"))
        };
        let delete = NoteStore::open(&config).unwrap();
        assert_eq!(reader_journal_mode(&delete), "delete");
    }
}
