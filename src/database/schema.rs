//! Database schema definitions for the voice note store.
//!
//! Contains SQL statements for creating the tables and the column layout the
//! `voice_notes` table is validated against on open.

/// Name of the single record table.
pub const VOICE_NOTES_TABLE: &str = "voice_notes";

/// SQL statement to create the migrations tracking table.
pub const CREATE_MIGRATIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

/// SQL statement to create the voice_notes table.
pub const CREATE_VOICE_NOTES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS voice_notes (
    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    title TEXT NOT NULL,
    filePath TEXT NOT NULL,
    duration INTEGER NOT NULL CHECK (duration >= 0),
    fileSize INTEGER NOT NULL CHECK (fileSize >= 0),
    createdAt INTEGER NOT NULL,
    transcript TEXT,
    summary TEXT,
    keyPoints TEXT NOT NULL,
    isProcessing INTEGER NOT NULL CHECK (isProcessing IN (0, 1))
);
"#;

/// SQL statement to create an index on createdAt for the reverse-chronological listing.
pub const CREATE_VOICE_NOTES_CREATED_AT_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_voice_notes_created_at ON voice_notes(createdAt);
"#;

/// One column as reported by `PRAGMA table_info`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub declared_type: String,
    pub not_null: bool,
    pub primary_key: bool,
}

/// Expected layout of `voice_notes`: (name, declared type, not null, primary key).
pub const VOICE_NOTES_COLUMNS: &[(&str, &str, bool, bool)] = &[
    ("id", "INTEGER", true, true),
    ("title", "TEXT", true, false),
    ("filePath", "TEXT", true, false),
    ("duration", "INTEGER", true, false),
    ("fileSize", "INTEGER", true, false),
    ("createdAt", "INTEGER", true, false),
    ("transcript", "TEXT", false, false),
    ("summary", "TEXT", false, false),
    ("keyPoints", "TEXT", true, false),
    ("isProcessing", "INTEGER", true, false),
];
