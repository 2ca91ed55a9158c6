//! Raw row access for the `jobs` table.
//!
//! Functions take a `&Connection` so the ledger can compose several of them
//! inside one transaction (`Transaction` derefs to `Connection`).

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::DatabaseError;

const COLUMNS: &str = "id, created_at, updated_at, filename, content_digest, status, error";

/// A raw job row from the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRow {
    pub id: i64,
    pub created_at: String,
    pub updated_at: String,
    pub filename: String,
    pub content_digest: String,
    pub status: String,
    pub error: Option<String>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            filename: row.get("filename")?,
            content_digest: row.get("content_digest")?,
            status: row.get("status")?,
            error: row.get("error")?,
        })
    }
}

/// Inserts a queued row unless `(filename, content_digest)` already exists.
///
/// Returns the new id, or `None` when the pair was already present.
pub fn insert_if_absent(
    conn: &Connection,
    filename: &str,
    content_digest: &str,
    now: &str,
) -> Result<Option<i64>, DatabaseError> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO jobs (created_at, updated_at, filename, content_digest, status)
         VALUES (?1, ?1, ?2, ?3, 'queued')",
        params![now, filename, content_digest],
    )?;

    if inserted == 0 {
        return Ok(None);
    }
    Ok(Some(conn.last_insert_rowid()))
}

pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<JobRow>, DatabaseError> {
    let sql = format!("SELECT {} FROM jobs WHERE id = ?1", COLUMNS);
    Ok(conn
        .query_row(&sql, params![id], JobRow::from_row)
        .optional()?)
}

pub fn find_by_identity(
    conn: &Connection,
    filename: &str,
    content_digest: &str,
) -> Result<Option<JobRow>, DatabaseError> {
    let sql = format!(
        "SELECT {} FROM jobs WHERE filename = ?1 AND content_digest = ?2",
        COLUMNS
    );
    Ok(conn
        .query_row(&sql, params![filename, content_digest], JobRow::from_row)
        .optional()?)
}

/// Oldest row (lowest id) with the given status.
pub fn oldest_with_status(conn: &Connection, status: &str) -> Result<Option<JobRow>, DatabaseError> {
    let sql = format!(
        "SELECT {} FROM jobs WHERE status = ?1 ORDER BY id ASC LIMIT 1",
        COLUMNS
    );
    Ok(conn
        .query_row(&sql, params![status], JobRow::from_row)
        .optional()?)
}

/// All rows with the given status in id order.
pub fn list_by_status(conn: &Connection, status: &str) -> Result<Vec<JobRow>, DatabaseError> {
    let sql = format!(
        "SELECT {} FROM jobs WHERE status = ?1 ORDER BY id ASC",
        COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![status], JobRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Row counts grouped by status.
pub fn count_by_status(conn: &Connection) -> Result<Vec<(String, u64)>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM jobs GROUP BY status")?;
    let counts = stmt
        .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, u64>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(counts)
}

/// Compare-and-set status update.
///
/// Only touches the row while it still has status `from`; returns the number
/// of rows changed (0 or 1).
pub fn update_status(
    conn: &Connection,
    id: i64,
    from: &str,
    to: &str,
    error: Option<&str>,
    updated_at: &str,
) -> Result<usize, DatabaseError> {
    let changed = conn.execute(
        "UPDATE jobs SET status = ?3, error = ?4, updated_at = ?5
         WHERE id = ?1 AND status = ?2",
        params![id, from, to, error, updated_at],
    )?;
    Ok(changed)
}
