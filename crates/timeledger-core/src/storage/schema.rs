//! Table layout of the record store

use rusqlite::Connection;

use crate::Result;

const PRAGMAS: &str = "PRAGMA foreign_keys = ON;";

// Segment owners carry no foreign key: rows left behind by a failed
// cascade or by outside tools are what orphan cleanup removes.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL DEFAULT '',
    description TEXT NOT NULL DEFAULT '',
    completed INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS time_segments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id INTEGER,
    start_time INTEGER NOT NULL,
    end_time INTEGER NOT NULL,
    description TEXT NOT NULL DEFAULT ''
);
CREATE INDEX IF NOT EXISTS idx_time_segments_owner ON time_segments (owner_id);
CREATE TABLE IF NOT EXISTS custom_fields (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL DEFAULT ''
);
CREATE TABLE IF NOT EXISTS task_custom_fields (
    task_id INTEGER NOT NULL REFERENCES tasks (id) ON DELETE CASCADE,
    field_id INTEGER NOT NULL REFERENCES custom_fields (id) ON DELETE CASCADE,
    value TEXT NOT NULL,
    PRIMARY KEY (task_id, field_id)
);
CREATE TABLE IF NOT EXISTS filters (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kind TEXT NOT NULL,
    date_type TEXT,
    date_value INTEGER,
    field_id INTEGER REFERENCES custom_fields (id) ON DELETE CASCADE,
    field_value TEXT,
    completed INTEGER
);
CREATE TABLE IF NOT EXISTS configuration (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
";

/// Enable foreign keys and create any missing tables.
pub(crate) fn initialize(conn: &Connection) -> Result<()> {
    conn.execute_batch(PRAGMAS)?;
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_is_repeatable() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        initialize(&conn).unwrap();

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN \
                 ('tasks', 'time_segments', 'custom_fields', 'task_custom_fields', 'filters', 'configuration')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 6);
    }
}
