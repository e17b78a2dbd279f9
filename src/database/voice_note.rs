//! Voice note CRUD operations.
//!
//! Provides the [`VoiceNote`] record and the create, read, update and delete
//! operations on [`NoteStore`]. Each operation has a blocking form and an
//! `_async` form that runs it on tokio's blocking pool.

use chrono::{DateTime, SubsecRound, Utc};
use rusqlite::{params, Connection, Row, Transaction};
use serde::{Deserialize, Serialize};

use crate::database::{key_points, DatabaseError, NoteStore};

/// A voice note record stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceNote {
    /// Store-assigned identifier; ignored on insert.
    pub id: i64,
    pub title: String,
    /// Audio file owned by the capture layer; the store never touches it.
    pub file_path: String,
    /// Recording length in milliseconds.
    pub duration: i64,
    /// Audio file size in bytes.
    pub file_size: i64,
    /// Creation time, millisecond precision.
    pub created_at: DateTime<Utc>,
    pub transcript: Option<String>,
    pub summary: Option<String>,
    pub key_points: Vec<String>,
    /// True while transcription/summarisation is still running.
    pub is_processing: bool,
}

impl VoiceNote {
    /// Creates an unsaved note stamped with the current time.
    pub fn new(
        title: impl Into<String>,
        file_path: impl Into<String>,
        duration: i64,
        file_size: i64,
    ) -> Self {
        Self {
            id: 0,
            title: title.into(),
            file_path: file_path.into(),
            duration,
            file_size,
            created_at: now_millis(),
            transcript: None,
            summary: None,
            key_points: Vec::new(),
            is_processing: false,
        }
    }
}

/// The current time truncated to what the createdAt column can hold.
pub fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Converts a timestamp to its stored epoch-millisecond form.
///
/// Sub-millisecond precision would be lost on the way back, so it is refused.
fn created_at_to_millis(created_at: &DateTime<Utc>) -> Result<i64, DatabaseError> {
    if created_at.timestamp_subsec_nanos() % 1_000_000 != 0 {
        return Err(DatabaseError::ConstraintViolation(format!(
            "createdAt {} has sub-millisecond precision",
            created_at
        )));
    }
    Ok(created_at.timestamp_millis())
}

fn created_at_from_millis(millis: i64) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        DatabaseError::Integrity(format!("createdAt {} is not a representable time", millis))
    })
}

/// Column list for all SELECT queries.
const SELECT_COLUMNS: &str = r#"
    id, title, filePath, duration, fileSize, createdAt,
    transcript, summary, keyPoints, isProcessing
"#;

/// Map a database row to a VoiceNote.
///
/// A NULL or mistyped value in a NOT NULL column surfaces as
/// [`DatabaseError::Integrity`]; nothing is defaulted.
fn row_to_voice_note(row: &Row) -> Result<VoiceNote, DatabaseError> {
    let created_at: i64 = row.get(5)?;
    let raw_key_points: String = row.get(8)?;
    let is_processing: i64 = row.get(9)?;

    Ok(VoiceNote {
        id: row.get(0)?,
        title: row.get(1)?,
        file_path: row.get(2)?,
        duration: row.get(3)?,
        file_size: row.get(4)?,
        created_at: created_at_from_millis(created_at)?,
        transcript: row.get(6)?,
        summary: row.get(7)?,
        key_points: key_points::decode(&raw_key_points)?,
        is_processing: is_processing != 0,
    })
}

fn insert_row(tx: &Transaction<'_>, note: &VoiceNote) -> Result<i64, DatabaseError> {
    tx.execute(
        r#"
        INSERT INTO voice_notes (
            title, filePath, duration, fileSize, createdAt,
            transcript, summary, keyPoints, isProcessing
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
        params![
            note.title,
            note.file_path,
            note.duration,
            note.file_size,
            created_at_to_millis(&note.created_at)?,
            note.transcript,
            note.summary,
            key_points::encode(&note.key_points)?,
            note.is_processing as i32,
        ],
    )?;

    Ok(tx.last_insert_rowid())
}

/// Reads every note, newest first; equal timestamps fall back to newest id.
pub(crate) fn query_all(conn: &Connection) -> Result<Vec<VoiceNote>, DatabaseError> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {} FROM voice_notes ORDER BY createdAt DESC, id DESC",
        SELECT_COLUMNS
    ))?;

    let mut rows = stmt.query([])?;
    let mut notes = Vec::new();
    while let Some(row) = rows.next()? {
        notes.push(row_to_voice_note(row)?);
    }

    Ok(notes)
}

// =============================================================================
// Database Functions
// =============================================================================

impl NoteStore {
    /// Inserts a note and returns its newly assigned id.
    pub fn insert(&self, note: &VoiceNote) -> Result<i64, DatabaseError> {
        let id = self.write(|tx| Ok((insert_row(tx, note)?, 1)))?;
        tracing::debug!("Inserted voice note: {}", id);
        Ok(id)
    }

    /// Inserts several notes in one transaction.
    ///
    /// If any note is rejected, none are stored.
    pub fn insert_all(&self, notes: &[VoiceNote]) -> Result<Vec<i64>, DatabaseError> {
        let ids = self.write(|tx| {
            let ids = notes
                .iter()
                .map(|note| insert_row(tx, note))
                .collect::<Result<Vec<_>, _>>()?;
            let changed = ids.len();
            Ok((ids, changed))
        })?;

        tracing::debug!("Inserted {} voice notes", ids.len());
        Ok(ids)
    }

    /// Replaces every column of the note with the same id.
    ///
    /// Returns false when no such note exists; that is not an error.
    pub fn update(&self, note: &VoiceNote) -> Result<bool, DatabaseError> {
        let rows_affected = self.write(|tx| {
            let rows = tx.execute(
                r#"
                UPDATE voice_notes
                SET title = ?2, filePath = ?3, duration = ?4, fileSize = ?5,
                    createdAt = ?6, transcript = ?7, summary = ?8,
                    keyPoints = ?9, isProcessing = ?10
                WHERE id = ?1
                "#,
                params![
                    note.id,
                    note.title,
                    note.file_path,
                    note.duration,
                    note.file_size,
                    created_at_to_millis(&note.created_at)?,
                    note.transcript,
                    note.summary,
                    key_points::encode(&note.key_points)?,
                    note.is_processing as i32,
                ],
            )?;
            Ok((rows, rows))
        })?;

        if rows_affected == 0 {
            tracing::warn!("No voice note found with id: {}", note.id);
            Ok(false)
        } else {
            tracing::debug!("Updated voice note: {}", note.id);
            Ok(true)
        }
    }

    /// Deletes the stored row matching `note.id`.
    pub fn delete(&self, note: &VoiceNote) -> Result<bool, DatabaseError> {
        self.delete_by_id(note.id)
    }

    /// Deletes a note by its id. Deleting a missing id is a no-op.
    pub fn delete_by_id(&self, id: i64) -> Result<bool, DatabaseError> {
        let rows_affected = self.write(|tx| {
            let rows = tx.execute("DELETE FROM voice_notes WHERE id = ?1", params![id])?;
            Ok((rows, rows))
        })?;

        if rows_affected > 0 {
            tracing::debug!("Deleted voice note: {}", id);
            Ok(true)
        } else {
            tracing::warn!("No voice note found with id: {}", id);
            Ok(false)
        }
    }

    /// Retrieves a note by its id.
    pub fn get_by_id(&self, id: i64) -> Result<Option<VoiceNote>, DatabaseError> {
        self.shared.with_reader(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {} FROM voice_notes WHERE id = ?1",
                SELECT_COLUMNS
            ))?;
            let mut rows = stmt.query(params![id])?;

            let note = match rows.next()? {
                Some(row) => Some(row_to_voice_note(row)?),
                None => None,
            };
            Ok(note)
        })
    }

    /// Counts stored notes.
    pub fn count(&self) -> Result<usize, DatabaseError> {
        self.shared.with_reader(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM voice_notes", [], |row| row.get(0))?;
            Ok(count as usize)
        })
    }

    /// One-off snapshot of every note, newest first.
    pub fn fetch_all(&self) -> Result<Vec<VoiceNote>, DatabaseError> {
        self.shared.with_reader(query_all)
    }

    // =========================================================================
    // Async wrappers
    // =========================================================================

    pub async fn insert_async(&self, note: VoiceNote) -> Result<i64, DatabaseError> {
        let store = self.clone();
        run_blocking(move || store.insert(&note)).await
    }

    pub async fn insert_all_async(
        &self,
        notes: Vec<VoiceNote>,
    ) -> Result<Vec<i64>, DatabaseError> {
        let store = self.clone();
        run_blocking(move || store.insert_all(&notes)).await
    }

    pub async fn update_async(&self, note: VoiceNote) -> Result<bool, DatabaseError> {
        let store = self.clone();
        run_blocking(move || store.update(&note)).await
    }

    pub async fn delete_async(&self, note: VoiceNote) -> Result<bool, DatabaseError> {
        self.delete_by_id_async(note.id).await
    }

    pub async fn delete_by_id_async(&self, id: i64) -> Result<bool, DatabaseError> {
        let store = self.clone();
        run_blocking(move || store.delete_by_id(id)).await
    }

    pub async fn get_by_id_async(&self, id: i64) -> Result<Option<VoiceNote>, DatabaseError> {
        let store = self.clone();
        run_blocking(move || store.get_by_id(id)).await
    }

    pub async fn count_async(&self) -> Result<usize, DatabaseError> {
        let store = self.clone();
        run_blocking(move || store.count()).await
    }
}

/// Runs a blocking store call on tokio's blocking pool.
///
/// Dropping the returned future abandons the result; the call itself still
/// runs to completion.
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T, DatabaseError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, DatabaseError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| DatabaseError::Task(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_voice_note_new_defaults() {
        let note = VoiceNote::new("Test", "/test/path", 1000, 100);
        assert_eq!(note.id, 0);
        assert!(note.transcript.is_none());
        assert!(note.summary.is_none());
        assert!(note.key_points.is_empty());
        assert!(!note.is_processing);
        assert_eq!(note.created_at.timestamp_subsec_nanos() % 1_000_000, 0);
    }

    #[test]
    fn test_created_at_millis_round_trip() {
        let t = Utc.timestamp_millis_opt(1_736_937_000_123).unwrap();
        let millis = created_at_to_millis(&t).unwrap();
        assert_eq!(millis, 1_736_937_000_123);
        assert_eq!(created_at_from_millis(millis).unwrap(), t);
    }

    #[test]
    fn test_sub_millisecond_created_at_is_refused() {
        let t = Utc.timestamp_opt(1_736_937_000, 123_456_789).unwrap();
        assert!(matches!(
            created_at_to_millis(&t),
            Err(DatabaseError::ConstraintViolation(_))
        ));
    }

    #[test]
    fn test_unrepresentable_millis_is_integrity_error() {
        assert!(matches!(
            created_at_from_millis(i64::MAX),
            Err(DatabaseError::Integrity(_))
        ));
    }

    #[test]
    fn test_serialises_camel_case() {
        let note = VoiceNote::new("Meeting", "/audio/1.m4a", 120, 48000);
        let json = serde_json::to_value(&note).unwrap();
        assert_eq!(json["filePath"], "/audio/1.m4a");
        assert_eq!(json["isProcessing"], false);
        assert!(json["keyPoints"].as_array().unwrap().is_empty());
    }
}
