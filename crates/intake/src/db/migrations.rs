//! Schema migrations.
//!
//! Applied versions are recorded in `_migrations`; each migration runs once,
//! in order, inside its own transaction.

use rusqlite::Connection;

use super::error::DatabaseError;

struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create_jobs_table",
        sql: include_str!("sql/001_create_jobs.sql"),
    },
    Migration {
        version: 2,
        description: "single_running_job_index",
        sql: include_str!("sql/002_single_running_job.sql"),
    },
];

/// Applies every migration newer than the recorded schema version.
pub fn run_all(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current_version: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current_version) {
        log::info!(
            "Running migration v{}: {}",
            migration.version,
            migration.description
        );

        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(migration.sql)
            .map_err(|e| DatabaseError::Migration {
                version: migration.version,
                reason: e.to_string(),
            })?;
        tx.execute(
            "INSERT INTO _migrations (version, description) VALUES (?1, ?2)",
            rusqlite::params![migration.version, migration.description],
        )?;
        tx.commit()?;
    }

    Ok(())
}

/// Highest applied migration version, or 0 on a fresh database.
pub fn current_version(conn: &Connection) -> Result<u32, DatabaseError> {
    Ok(conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?)
}
