use rusqlite::Connection;

use crate::errors::DocGraphError;

pub fn ensure_schema(conn: &Connection) -> Result<(), DocGraphError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS doc_types (
            name TEXT PRIMARY KEY,
            kind TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS doc_records (
            id         INTEGER PRIMARY KEY,
            type_name  TEXT NOT NULL,
            kind       TEXT NOT NULL,
            version    INTEGER NOT NULL,
            from_id    INTEGER,
            to_id      INTEGER,
            properties TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS doc_meta (
            key   TEXT PRIMARY KEY,
            value INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_records_type ON doc_records(type_name);
        CREATE INDEX IF NOT EXISTS idx_records_from ON doc_records(from_id);
        CREATE INDEX IF NOT EXISTS idx_records_to ON doc_records(to_id);
        "#,
    )
    .map_err(|e| DocGraphError::storage(format!("schema: {e}")))?;
    Ok(())
}
