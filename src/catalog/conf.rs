//! Conf log
//!
//! Append-only key/value/timestamp rows; a read returns the newest value.

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;

use super::now_millis;

/// One row of the conf log
#[derive(Debug, Clone, PartialEq)]
pub struct ConfEntry {
    pub variable: String,
    pub value: String,
    /// Unix millis
    pub timestamp: i64,
}

pub(super) fn insert(conn: &Connection, name: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO conf (variable, value, timestamp) VALUES (?1, ?2, ?3)",
        params![name, value, now_millis()],
    )?;
    Ok(())
}

/// Ties on the millisecond timestamp fall back to insertion order
pub(super) fn latest(conn: &Connection, name: &str) -> Result<Option<String>> {
    let value = conn
        .query_row(
            "SELECT value FROM conf WHERE variable = ?1
             ORDER BY timestamp DESC, rowid DESC LIMIT 1",
            params![name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value)
}

pub(super) fn entries(conn: &Connection) -> Result<Vec<ConfEntry>> {
    let mut stmt = conn.prepare(
        "SELECT variable, value, timestamp FROM conf ORDER BY variable, timestamp, rowid",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(ConfEntry {
            variable: row.get(0)?,
            value: row.get(1)?,
            timestamp: row.get(2)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}
