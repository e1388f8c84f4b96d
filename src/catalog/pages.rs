//! Pages table
//!
//! Row mapping and queries over `pages`.

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, Type, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, ToSql};

use crate::error::{PageStoreError, Result};
use crate::page::{Compression, PageMeta};
use crate::types::{ElementType, IndexType, IndexValue, RecordLayout};

use super::{conf, now_millis};

/// Conf key remembering the highest page id ever handed out
const LAST_PAGE_ID: &str = "lastpageid";

const COLUMNS: &str = "pageId, indexType, count, indexLow, indexHigh, recordType, \
                       recordLen, recordSize, compression, created, checksum, name, deleted";

/// A `pages` row, live or soft-deleted
#[derive(Debug, Clone, PartialEq)]
pub struct PageRow {
    /// Variable the page belongs to
    pub name: String,
    pub meta: PageMeta,
    /// Unix millis of the soft delete, `None` for live pages
    pub deleted_at: Option<i64>,
}

/// Aggregates over live pages
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogStats {
    pub variables: u64,
    pub pages: u64,
    pub records: u64,
    pub total_bytes: u64,
    pub average_bytes: f64,
}

// =============================================================================
// SQL Conversions
// =============================================================================

impl ToSql for IndexValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match *self {
            IndexValue::Int(v) => ToSqlOutput::from(v),
            IndexValue::Float(v) => ToSqlOutput::from(v),
        })
    }
}

impl FromSql for IndexType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: PageStoreError| FromSqlError::Other(Box::new(e)))
    }
}

impl FromSql for ElementType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: PageStoreError| FromSqlError::Other(Box::new(e)))
    }
}

/// Read an index bound, interpreting it by the page's index type
fn index_value(row: &Row<'_>, idx: usize, index_type: IndexType) -> rusqlite::Result<IndexValue> {
    match (row.get_ref(idx)?, index_type) {
        (ValueRef::Integer(v), IndexType::Int64) => Ok(IndexValue::Int(v)),
        (ValueRef::Integer(v), IndexType::Float64) => Ok(IndexValue::Float(v as f64)),
        (ValueRef::Real(v), IndexType::Float64) => Ok(IndexValue::Float(v)),
        (ValueRef::Real(v), IndexType::Int64) => Ok(IndexValue::Int(v as i64)),
        (other, _) => Err(rusqlite::Error::InvalidColumnType(
            idx,
            "index bound".to_string(),
            other.data_type(),
        )),
    }
}

fn conversion_error(idx: usize, ty: Type, e: PageStoreError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, ty, Box::new(e))
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<PageRow> {
    let index_type: IndexType = row.get(1)?;
    let record_layout = RecordLayout::from_record_len(row.get(6)?)
        .map_err(|e| conversion_error(6, Type::Integer, e))?;
    let compression: Option<String> = row.get(8)?;
    let compression = Compression::from_catalog(compression.as_deref())
        .map_err(|e| conversion_error(8, Type::Text, e))?;

    let meta = PageMeta {
        page_id: row.get::<_, i64>(0)? as u64,
        index_type,
        count: row.get::<_, i64>(2)? as u64,
        index_low: index_value(row, 3, index_type)?,
        index_high: index_value(row, 4, index_type)?,
        record_type: row.get(5)?,
        record_layout,
        record_size: row.get::<_, i64>(7)? as u64,
        compression,
        created_at: row.get(9)?,
        checksum: row.get(10)?,
    };
    Ok(PageRow {
        name: row.get(11)?,
        meta,
        deleted_at: row.get(12)?,
    })
}

// =============================================================================
// Mutations
// =============================================================================

pub(super) fn insert(conn: &Connection, variable: &str, meta: &PageMeta) -> Result<()> {
    conn.execute(
        "INSERT INTO pages (name, pageId, indexType, count, indexLow, indexHigh, recordType,
                            recordLen, recordSize, compression, created, checksum, deleted)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, NULL)",
        params![
            variable,
            meta.page_id as i64,
            meta.index_type.as_str(),
            meta.count as i64,
            meta.index_low,
            meta.index_high,
            meta.record_type.as_str(),
            meta.record_layout.to_record_len(),
            meta.record_size as i64,
            meta.compression.as_catalog(),
            meta.created_at,
            meta.checksum,
        ],
    )?;
    Ok(())
}

/// Soft-delete (`keep`) or remove a live page row
///
/// Fails when the page is not live, which means another writer already
/// retired it.
pub(super) fn retire(conn: &Connection, page_id: u64, keep: bool) -> Result<()> {
    let changed = if keep {
        conn.execute(
            "UPDATE pages SET deleted = ?1 WHERE pageId = ?2 AND deleted IS NULL",
            params![now_millis(), page_id as i64],
        )?
    } else {
        remember_last_id(conn, page_id)?;
        conn.execute(
            "DELETE FROM pages WHERE pageId = ?1 AND deleted IS NULL",
            params![page_id as i64],
        )?
    };
    if changed == 0 {
        return Err(PageStoreError::InvalidArgument(format!(
            "page {} is not live",
            page_id
        )));
    }
    Ok(())
}

/// Remove a soft-deleted page row
pub(super) fn purge(conn: &Connection, page_id: u64) -> Result<()> {
    remember_last_id(conn, page_id)?;
    let changed = conn.execute(
        "DELETE FROM pages WHERE pageId = ?1 AND deleted IS NOT NULL",
        params![page_id as i64],
    )?;
    if changed == 0 {
        return Err(PageStoreError::InvalidArgument(format!(
            "page {} is not a deleted page",
            page_id
        )));
    }
    Ok(())
}

/// Removing the highest id would let MAX(pageId) hand it out again
fn remember_last_id(conn: &Connection, page_id: u64) -> Result<()> {
    let max: Option<i64> = conn.query_row("SELECT MAX(pageId) FROM pages", [], |r| r.get(0))?;
    if max == Some(page_id as i64) {
        conf::insert(conn, LAST_PAGE_ID, &page_id.to_string())?;
    }
    Ok(())
}

pub(super) fn next_page_id(conn: &Connection) -> Result<u64> {
    let max: Option<i64> = conn.query_row("SELECT MAX(pageId) FROM pages", [], |r| r.get(0))?;
    let recorded = conf::latest(conn, LAST_PAGE_ID)?.and_then(|v| v.parse::<i64>().ok());
    Ok((max.max(recorded).unwrap_or(0) + 1) as u64)
}

// =============================================================================
// Queries
// =============================================================================

/// Live pages of a variable, optionally restricted to those meeting `[a, b]`
pub(super) fn find(
    conn: &Connection,
    variable: &str,
    range: Option<(IndexValue, IndexValue)>,
) -> Result<Vec<PageMeta>> {
    let rows = match range {
        Some((a, b)) => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM pages
                 WHERE name = ?1 AND indexHigh >= ?2 AND indexLow <= ?3 AND deleted IS NULL
                 ORDER BY indexLow",
                COLUMNS
            ))?;
            let rows = stmt.query_map(params![variable, a, b], read_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        }
        None => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM pages WHERE name = ?1 AND deleted IS NULL ORDER BY indexLow",
                COLUMNS
            ))?;
            let rows = stmt.query_map(params![variable], read_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        }
    };
    Ok(rows.into_iter().map(|r| r.meta).collect())
}

pub(super) fn by_id(conn: &Connection, page_id: u64) -> Result<Option<PageRow>> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM pages WHERE pageId = ?1", COLUMNS),
            params![page_id as i64],
            read_row,
        )
        .optional()?;
    Ok(row)
}

/// MIN(indexLow), MAX(indexHigh) over a variable's live pages
pub(super) fn limits(conn: &Connection, variable: &str) -> Result<Option<(IndexValue, IndexValue)>> {
    let limits = conn.query_row(
        "SELECT MIN(indexLow), MAX(indexHigh), MIN(indexType) FROM pages
         WHERE name = ?1 AND deleted IS NULL",
        params![variable],
        |row| {
            let index_type: Option<IndexType> = row.get(2)?;
            match index_type {
                Some(t) => Ok(Some((index_value(row, 0, t)?, index_value(row, 1, t)?))),
                None => Ok(None),
            }
        },
    )?;
    Ok(limits)
}

pub(super) fn search(conn: &Connection, pattern: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT name FROM pages WHERE name LIKE ?1 AND deleted IS NULL ORDER BY name",
    )?;
    let rows = stmt.query_map(params![pattern], |row| row.get(0))?;
    Ok(rows.collect::<rusqlite::Result<Vec<String>>>()?)
}

pub(super) fn deleted_before(conn: &Connection, timestamp: i64) -> Result<Vec<PageRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM pages WHERE deleted IS NOT NULL AND deleted < ?1 ORDER BY pageId",
        COLUMNS
    ))?;
    let rows = stmt.query_map(params![timestamp], read_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub(super) fn stats(conn: &Connection, variable: Option<&str>) -> Result<CatalogStats> {
    let filter = if variable.is_some() { " AND name = ?1" } else { "" };
    let sql = format!(
        "SELECT COUNT(DISTINCT name), COUNT(*), SUM(count), SUM(recordSize), AVG(recordSize)
         FROM pages WHERE deleted IS NULL{}",
        filter
    );
    let stats = conn.query_row(&sql, params_from_iter(variable), |row| {
        Ok(CatalogStats {
            variables: row.get::<_, i64>(0)? as u64,
            pages: row.get::<_, i64>(1)? as u64,
            records: row.get::<_, Option<i64>>(2)?.unwrap_or(0) as u64,
            total_bytes: row.get::<_, Option<i64>>(3)?.unwrap_or(0) as u64,
            average_bytes: row.get::<_, Option<f64>>(4)?.unwrap_or(0.0),
        })
    })?;
    Ok(stats)
}
