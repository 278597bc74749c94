//! Embedded schema migrations for the SQLite backend.
//!
//! Versioning rides on SQLite's `user_version` pragma; each entry in
//! [`MIGRATIONS`] is applied at most once, in order.

use anyhow::Result;
use rusqlite::Connection;

const SCHEMA_V1: &str = "
CREATE TABLE IF NOT EXISTS reports (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    description TEXT NOT NULL CHECK (length(description) > 0),
    status TEXT NOT NULL DEFAULT 'Pending',
    created_at TEXT NOT NULL,
    user_id TEXT NOT NULL,
    latitude REAL,
    longitude REAL,
    image_url TEXT
);

CREATE INDEX IF NOT EXISTS idx_reports_created_at ON reports (created_at DESC);
CREATE INDEX IF NOT EXISTS idx_reports_status ON reports (status);

CREATE TABLE IF NOT EXISTS user_points (
    user_id TEXT PRIMARY KEY,
    current_points INTEGER NOT NULL DEFAULT 0 CHECK (current_points >= 0),
    lifetime_points INTEGER NOT NULL DEFAULT 0 CHECK (lifetime_points >= 0),
    last_updated TEXT NOT NULL
);
";

const MIGRATIONS: &[&str] = &[SCHEMA_V1];

#[derive(Debug, Default)]
pub struct Migrator;

impl Migrator {
    pub fn new() -> Self {
        Self
    }

    pub fn run(&self, conn: &Connection) -> Result<()> {
        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

        for (index, sql) in MIGRATIONS.iter().enumerate().skip(version as usize) {
            conn.execute_batch(sql)?;
            conn.pragma_update(None, "user_version", (index + 1) as i64)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        let migrator = Migrator::new();
        migrator.run(&conn).unwrap();
        migrator.run(&conn).unwrap();

        let version: i64 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, MIGRATIONS.len() as i64);

        // Both tables exist after migration.
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master
                 WHERE type = 'table' AND name IN ('reports', 'user_points')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 2);
    }
}
