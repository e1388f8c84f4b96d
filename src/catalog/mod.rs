//! Catalog Module
//!
//! Relational metadata for the page store, kept in an embedded SQLite file.
//!
//! ## Responsibilities
//! - One `pages` row per page: range, types, size, checksum, deletion mark
//! - An append-only `conf` log of key/value settings (last write wins)
//! - Page lookup by variable and index range, ordered by `indexLow`
//! - Grouping multi-row mutations into one committed transaction
//!
//! ## Schema
//! ```text
//! pages(name, pageId, indexType, count, indexLow, indexHigh, recordType,
//!       recordLen, recordSize, compression, created, checksum, deleted)
//! conf(variable, value, timestamp)
//! ```
//!
//! `indexLow`/`indexHigh` are declared without a type so SQLite keeps integer
//! and real bounds exactly as written and compares them numerically.

mod conf;
mod pages;

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use rusqlite::{Connection, DatabaseName, OpenFlags, TransactionBehavior};
use tempfile::TempPath;

use crate::error::{PageStoreError, Result};
use crate::page::PageMeta;
use crate::types::IndexValue;

pub use conf::ConfEntry;
pub use pages::{CatalogStats, PageRow};

/// How long a writer waits on another process's lock before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS pages(
        name        TEXT,
        pageId      INTEGER,
        indexType   TEXT,
        count       INTEGER,
        indexLow,
        indexHigh,
        recordType  TEXT,
        recordLen   INTEGER,
        recordSize  INTEGER,
        compression TEXT,
        created     INTEGER,
        checksum    TEXT,
        deleted     INTEGER);
    CREATE INDEX IF NOT EXISTS page_index ON pages(pageId);
    CREATE INDEX IF NOT EXISTS page_range ON pages(name, indexLow);
    CREATE TABLE IF NOT EXISTS conf(
        variable  TEXT,
        value     TEXT,
        timestamp INTEGER);";

/// Current time in unix milliseconds
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Handle to the catalog database
///
/// ## Concurrency:
/// - `conn`: one connection per store, guarded by a Mutex
/// - Write transactions are IMMEDIATE, so writers in other processes queue on
///   SQLite's own lock
/// - Read-only catalogs work on a private snapshot and never touch the source
pub struct Catalog {
    conn: Mutex<Connection>,

    /// Catalog file this handle was opened from
    path: PathBuf,

    read_only: bool,

    /// Private copy backing a read-only catalog (removed on drop)
    _snapshot: Option<TempPath>,
}

impl Catalog {
    /// Open or create a catalog file for reading and writing
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        let catalog = Self {
            conn: Mutex::new(conn),
            path: path.to_path_buf(),
            read_only: false,
            _snapshot: None,
        };
        catalog.create_schema()?;

        tracing::debug!("Opened catalog {}", path.display());
        Ok(catalog)
    }

    /// Open a private snapshot of an existing catalog
    ///
    /// The snapshot is taken with SQLite's online backup, so it is consistent
    /// even while another process is writing the source file.
    pub fn open_read_only(path: &Path) -> Result<Self> {
        let source = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        source.busy_timeout(BUSY_TIMEOUT)?;

        let snapshot = tempfile::Builder::new()
            .prefix("pagestore-")
            .suffix(".db")
            .tempfile()?
            .into_temp_path();
        source.backup(DatabaseName::Main, &snapshot, None)?;
        drop(source);

        let conn = Connection::open_with_flags(&snapshot, OpenFlags::SQLITE_OPEN_READ_ONLY)?;

        tracing::debug!(
            "Opened read-only snapshot of {} at {}",
            path.display(),
            snapshot.display()
        );
        Ok(Self {
            conn: Mutex::new(conn),
            path: path.to_path_buf(),
            read_only: true,
            _snapshot: Some(snapshot),
        })
    }

    /// Create the `pages` and `conf` tables if they do not exist
    pub fn create_schema(&self) -> Result<()> {
        self.ensure_writable()?;
        self.conn.lock().execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Catalog file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Run `f` inside one IMMEDIATE transaction
    ///
    /// Commits if `f` returns `Ok`, rolls back otherwise. `f` must not call
    /// back into this `Catalog`; use the `CatalogTx` it is handed.
    pub fn transaction<T>(&self, f: impl FnOnce(&CatalogTx<'_>) -> Result<T>) -> Result<T> {
        self.ensure_writable()?;
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let ctx = CatalogTx { conn: &tx };
        let out = f(&ctx)?;
        tx.commit()?;
        Ok(out)
    }

    // =========================================================================
    // Conf Log
    // =========================================================================

    /// Append a value to the conf log
    pub fn set_var(&self, name: &str, value: &str) -> Result<()> {
        self.ensure_writable()?;
        conf::insert(&self.conn.lock(), name, value)
    }

    /// Most recent value recorded for `name`
    pub fn get_var(&self, name: &str) -> Result<Option<String>> {
        conf::latest(&self.conn.lock(), name)
    }

    /// Whole conf log ordered by variable, then time
    pub fn conf_entries(&self) -> Result<Vec<ConfEntry>> {
        conf::entries(&self.conn.lock())
    }

    // =========================================================================
    // Pages Table
    // =========================================================================

    /// Next unused page id (never reused, even after hard deletes)
    pub fn next_page_id(&self) -> Result<u64> {
        pages::next_page_id(&self.conn.lock())
    }

    /// Record a freshly built page
    pub fn insert_page_row(&self, variable: &str, meta: &PageMeta) -> Result<()> {
        self.transaction(|tx| tx.insert_page_row(variable, meta))
    }

    /// Retire a page row: mark it deleted (`keep`) or remove it
    pub fn soft_or_hard_delete_row(&self, page_id: u64, keep: bool) -> Result<()> {
        self.transaction(|tx| tx.soft_or_hard_delete_row(page_id, keep))
    }

    /// Live pages of `variable` intersecting `[a, b]`, ordered by `indexLow`
    pub fn find_pages(&self, variable: &str, a: IndexValue, b: IndexValue) -> Result<Vec<PageMeta>> {
        pages::find(&self.conn.lock(), variable, Some((a, b)))
    }

    /// All live pages of `variable`, ordered by `indexLow`
    pub fn pages_for(&self, variable: &str) -> Result<Vec<PageMeta>> {
        pages::find(&self.conn.lock(), variable, None)
    }

    /// Row of a page id, live or soft-deleted
    pub fn page(&self, page_id: u64) -> Result<Option<PageRow>> {
        pages::by_id(&self.conn.lock(), page_id)
    }

    /// Fill unset bounds with the variable's live min/max
    ///
    /// Returns `None` when a bound is unset and the variable has no pages.
    pub fn get_bounds(
        &self,
        variable: &str,
        a: Option<IndexValue>,
        b: Option<IndexValue>,
    ) -> Result<Option<(IndexValue, IndexValue)>> {
        if let (Some(a), Some(b)) = (a, b) {
            return Ok(Some((a, b)));
        }
        let limits = pages::limits(&self.conn.lock(), variable)?;
        Ok(limits.map(|(low, high)| (a.unwrap_or(low), b.unwrap_or(high))))
    }

    /// Distinct live variable names matching a LIKE pattern (`%` = any run)
    pub fn search_variables(&self, pattern: &str) -> Result<Vec<String>> {
        pages::search(&self.conn.lock(), pattern)
    }

    /// Soft-deleted rows whose deletion time is before `timestamp`
    pub fn deleted_before(&self, timestamp: i64) -> Result<Vec<PageRow>> {
        pages::deleted_before(&self.conn.lock(), timestamp)
    }

    /// Number of variables with at least one live page
    pub fn variable_count(&self) -> Result<u64> {
        Ok(self.stats(None)?.variables)
    }

    /// Aggregate statistics over live pages
    pub fn stats(&self, variable: Option<&str>) -> Result<CatalogStats> {
        pages::stats(&self.conn.lock(), variable)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn ensure_writable(&self) -> Result<()> {
        if self.read_only {
            return Err(PageStoreError::ReadOnly);
        }
        Ok(())
    }
}

/// Queries and mutations available inside `Catalog::transaction`
///
/// Reads made here see the state the transaction will commit against, so a
/// writer that plans from them cannot race another writer.
pub struct CatalogTx<'a> {
    conn: &'a Connection,
}

impl CatalogTx<'_> {
    pub fn next_page_id(&self) -> Result<u64> {
        pages::next_page_id(self.conn)
    }

    pub fn insert_page_row(&self, variable: &str, meta: &PageMeta) -> Result<()> {
        pages::insert(self.conn, variable, meta)
    }

    pub fn soft_or_hard_delete_row(&self, page_id: u64, keep: bool) -> Result<()> {
        pages::retire(self.conn, page_id, keep)
    }

    /// Remove a soft-deleted row for good
    pub fn purge_deleted_row(&self, page_id: u64) -> Result<()> {
        pages::purge(self.conn, page_id)
    }

    pub fn find_pages(&self, variable: &str, a: IndexValue, b: IndexValue) -> Result<Vec<PageMeta>> {
        pages::find(self.conn, variable, Some((a, b)))
    }

    pub fn pages_for(&self, variable: &str) -> Result<Vec<PageMeta>> {
        pages::find(self.conn, variable, None)
    }

    pub fn search_variables(&self, pattern: &str) -> Result<Vec<String>> {
        pages::search(self.conn, pattern)
    }

    pub fn deleted_before(&self, timestamp: i64) -> Result<Vec<PageRow>> {
        pages::deleted_before(self.conn, timestamp)
    }

    pub fn set_var(&self, name: &str, value: &str) -> Result<()> {
        conf::insert(self.conn, name, value)
    }
}
