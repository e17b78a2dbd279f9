//! Database migration system for the voice note store.
//!
//! Migrations are versioned and tracked in the `migrations` table.
//! Each migration is run exactly once, in order. After migrating, the
//! `voice_notes` table is checked against the expected column layout so a
//! database written by an incompatible build is refused instead of misread.

use rusqlite::Connection;

use crate::database::schema::{
    ColumnInfo, CREATE_MIGRATIONS_TABLE, CREATE_VOICE_NOTES_CREATED_AT_INDEX,
    CREATE_VOICE_NOTES_TABLE, VOICE_NOTES_COLUMNS, VOICE_NOTES_TABLE,
};
use crate::database::DatabaseError;

/// A database migration with a version number, name, and SQL statements.
struct Migration {
    version: i32,
    name: &'static str,
    statements: &'static [&'static str],
}

/// All migrations to be applied, in order.
const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "create_voice_notes_table",
    statements: &[
        CREATE_VOICE_NOTES_TABLE,
        CREATE_VOICE_NOTES_CREATED_AT_INDEX,
    ],
}];

/// Highest schema version this build understands.
pub const SCHEMA_VERSION: i32 = 1;

/// Returns the current schema version from the database.
pub fn get_current_version(conn: &Connection) -> Result<i32, DatabaseError> {
    let version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM migrations",
        [],
        |row| row.get(0),
    )?;

    Ok(version)
}

/// Records a migration as applied.
fn record_migration(conn: &Connection, version: i32, name: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO migrations (version, name) VALUES (?1, ?2)",
        (version, name),
    )?;
    Ok(())
}

/// Runs all pending migrations, then validates the resulting schema.
///
/// Each migration runs in its own transaction; if a statement fails, that
/// migration is rolled back and no version is recorded for it.
pub fn run_migrations(conn: &mut Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(CREATE_MIGRATIONS_TABLE)?;

    let current_version = get_current_version(conn)?;
    tracing::info!("Current database schema version: {}", current_version);

    if current_version > SCHEMA_VERSION {
        return Err(DatabaseError::SchemaMismatch(format!(
            "database schema version {} is newer than supported version {}",
            current_version, SCHEMA_VERSION
        )));
    }

    // A table left by something else must match before anything builds on it
    if table_exists(conn, VOICE_NOTES_TABLE)? {
        validate_schema(conn)?;
    }

    let pending: Vec<&Migration> = MIGRATIONS
        .iter()
        .filter(|m| m.version > current_version)
        .collect();

    if pending.is_empty() {
        tracing::info!("Database schema is up to date");
    } else {
        tracing::info!("{} pending migration(s) to apply", pending.len());
    }

    for migration in pending {
        tracing::info!(
            "Applying migration {} (v{})",
            migration.name,
            migration.version
        );

        let tx = conn.transaction()?;

        for statement in migration.statements {
            tx.execute_batch(statement).map_err(|e| {
                DatabaseError::Migration(format!("Migration {} failed: {}", migration.name, e))
            })?;
        }

        record_migration(&tx, migration.version, migration.name)?;
        tx.commit()?;

        tracing::info!("Migration {} applied successfully", migration.name);
    }

    validate_schema(conn)
}

/// Whether a table with the given name exists.
fn table_exists(conn: &Connection, table: &str) -> Result<bool, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Reads the column layout of a table via `PRAGMA table_info`.
pub fn table_columns(conn: &Connection, table: &str) -> Result<Vec<ColumnInfo>, DatabaseError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let columns = stmt
        .query_map([], |row| {
            Ok(ColumnInfo {
                name: row.get("name")?,
                declared_type: row.get("type")?,
                not_null: row.get::<_, i32>("notnull")? != 0,
                primary_key: row.get::<_, i32>("pk")? != 0,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(columns)
}

/// Checks that `voice_notes` has exactly the expected columns.
pub fn validate_schema(conn: &Connection) -> Result<(), DatabaseError> {
    let found = table_columns(conn, VOICE_NOTES_TABLE)?;

    if found.len() != VOICE_NOTES_COLUMNS.len() {
        return Err(DatabaseError::SchemaMismatch(format!(
            "{} has {} columns, expected {}",
            VOICE_NOTES_TABLE,
            found.len(),
            VOICE_NOTES_COLUMNS.len()
        )));
    }

    for (column, &(name, declared_type, not_null, primary_key)) in
        found.iter().zip(VOICE_NOTES_COLUMNS)
    {
        let matches = column.name == name
            && column.declared_type.eq_ignore_ascii_case(declared_type)
            && column.not_null == not_null
            && column.primary_key == primary_key;

        if !matches {
            return Err(DatabaseError::SchemaMismatch(format!(
                "column {:?} does not match expected {} {} (not null: {}, pk: {})",
                column, name, declared_type, not_null, primary_key
            )));
        }
    }

    tracing::debug!("Schema of {} validated", VOICE_NOTES_TABLE);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_migrations_are_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();

        run_migrations(&mut conn).unwrap();
        run_migrations(&mut conn).unwrap();

        let table_exists: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='voice_notes'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(table_exists, 1);
    }

    #[test]
    fn test_migration_version_tracking() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();

        assert_eq!(get_current_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_newer_schema_version_is_refused() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();
        conn.execute(
            "INSERT INTO migrations (version, name) VALUES (2, 'from_the_future')",
            [],
        )
        .unwrap();

        let result = run_migrations(&mut conn);
        assert!(matches!(result, Err(DatabaseError::SchemaMismatch(_))));
    }

    #[test]
    fn test_foreign_table_layout_is_refused() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE voice_notes (
                id INTEGER PRIMARY KEY,
                title TEXT,
                filePath TEXT NOT NULL
            );
            "#,
        )
        .unwrap();

        let result = run_migrations(&mut conn);
        assert!(matches!(result, Err(DatabaseError::SchemaMismatch(_))));
    }

    #[test]
    fn test_voice_notes_table_schema() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();

        let columns = table_columns(&conn, VOICE_NOTES_TABLE).unwrap();
        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "id",
                "title",
                "filePath",
                "duration",
                "fileSize",
                "createdAt",
                "transcript",
                "summary",
                "keyPoints",
                "isProcessing"
            ]
        );

        // CHECK constraints reject negative sizes
        let result = conn.execute(
            r#"
            INSERT INTO voice_notes (title, filePath, duration, fileSize, createdAt, keyPoints, isProcessing)
            VALUES ('t', '/a.m4a', -1, 0, 0, '[]', 0)
            "#,
            [],
        );
        assert!(result.is_err());
    }
}
