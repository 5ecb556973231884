use rusqlite::Connection;

use crate::error::Result;

/// Initialise the result store schema in `conn`. Safe to call on every startup.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS analysis_results (
            id             TEXT    NOT NULL PRIMARY KEY,  -- task id
            connection_id  TEXT    NOT NULL,
            table_name     TEXT    NOT NULL,
            status         TEXT    NOT NULL,
            rules          TEXT    NOT NULL,   -- JSON array of rule names
            results        TEXT    NOT NULL,   -- JSON object: rule -> {value|error}
            error          TEXT,
            started_at     TEXT,               -- ISO-8601 or NULL
            completed_at   TEXT,               -- ISO-8601 or NULL
            duration_ms    INTEGER,
            created_at     TEXT    NOT NULL
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_results_connection
            ON analysis_results (connection_id, created_at DESC);
        ",
    )?;
    Ok(())
}
