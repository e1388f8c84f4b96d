//! Store Module
//!
//! The page store that coordinates the catalog and the page files.
//!
//! ## Responsibilities
//! - Resolve and persist the page directory and page size limit
//! - Serve range reads that span several pages
//! - Merge incoming data into existing pages (new data wins on equal keys)
//! - Keep each variable's pages disjoint and near the size limit
//! - Retire replaced pages, soft or hard, and prune old soft deletes
//!
//! ## Write Path
//! ```text
//! store(var, index, records)
//!     │
//!     ├── overlapping page ──► merge ──► new page, old page retired
//!     ├── overlapping page ──► merge ──► ...
//!     ├── remainder ─────────────────► new page
//!     │
//!     ├── rebalance(var)     (merge runs of small pages)
//!     └── prune              (retention elapsed)
//! ```
//!
//! A whole write (merges, tail page, rebalance) commits as one catalog
//! transaction, so readers see either version but never both.

mod info;
mod maintenance;
mod merge;
mod write;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::catalog::{Catalog, ConfEntry};
use crate::config::{Config, DEFAULT_MAX_PAGE_SIZE};
use crate::error::{PageStoreError, Result};
use crate::page::{Page, PageMeta};
use crate::types::{IndexArray, IndexValue, Records, Series};

pub use info::{human_readable, StoreInfo};

/// Conf key holding the page directory
pub const PAGE_DIR_VAR: &str = "pagedir";

/// Conf key holding the page size limit
pub const MAX_PAGE_SIZE_VAR: &str = "maxpagesize";

/// The page store
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader
///
/// - **Writes** (store/rebalance/split/prune/delete): serialized by `write_lock`
///   within a handle, and by SQLite's IMMEDIATE lock across handles and
///   processes. Each write plans from pages read inside its own transaction.
/// - **Reads** (get/count/info): no write lock; pages are immutable and a
///   page row only becomes visible once its files are complete. Reads share
///   the handle's catalog connection, so they wait while a write commits.
pub struct Store {
    /// Store configuration
    config: Config,

    /// Page metadata and conf log
    catalog: Catalog,

    /// Resolved root of the page tree
    page_dir: PathBuf,

    /// Resolved rebalance threshold (0 = never rebalance)
    max_page_size: u64,

    /// Serializes write operations
    write_lock: Mutex<()>,
}

impl Store {
    /// Open or create a store
    ///
    /// On startup:
    /// 1. Open the catalog (or a snapshot of it when read-only)
    /// 2. Resolve page_dir: config, then conf log, then `<catalog dir>/data`
    /// 3. Resolve max_page_size: config, then conf log, then 16 MiB
    /// 4. Record changed settings in the conf log
    pub fn open(config: Config) -> Result<Self> {
        // Step 1: Catalog
        let catalog = if config.read_only {
            Catalog::open_read_only(&config.catalog_path)?
        } else {
            if let Some(parent) = config.catalog_path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            Catalog::open(&config.catalog_path)?
        };

        // Step 2: Page directory
        let recorded_dir = catalog.get_var(PAGE_DIR_VAR)?;
        let page_dir = match (&config.page_dir, &recorded_dir) {
            (Some(dir), _) => dir.clone(),
            (None, Some(dir)) => PathBuf::from(dir),
            (None, None) => config.default_page_dir(),
        };
        let page_dir = absolute(&page_dir)?;

        // Step 3: Page size limit
        let recorded_size = match catalog.get_var(MAX_PAGE_SIZE_VAR)? {
            Some(value) => Some(value.trim().parse::<u64>().map_err(|_| {
                PageStoreError::Config(format!("invalid {} in catalog: {}", MAX_PAGE_SIZE_VAR, value))
            })?),
            None => None,
        };
        let max_page_size = config
            .max_page_size
            .or(recorded_size)
            .unwrap_or(DEFAULT_MAX_PAGE_SIZE);

        // Step 4: Persist
        if !config.read_only {
            fs::create_dir_all(&page_dir)?;
            let dir = page_dir.to_string_lossy();
            if recorded_dir.as_deref() != Some(dir.as_ref()) {
                catalog.set_var(PAGE_DIR_VAR, &dir)?;
            }
            if let Some(size) = config.max_page_size {
                if recorded_size != Some(size) {
                    catalog.set_var(MAX_PAGE_SIZE_VAR, &size.to_string())?;
                }
            }
        }

        tracing::info!(
            "Opened store {} (pages in {}, max page size {}, read_only={})",
            config.catalog_path.display(),
            page_dir.display(),
            max_page_size,
            config.read_only
        );

        Ok(Self {
            config,
            catalog,
            page_dir,
            max_page_size,
            write_lock: Mutex::new(()),
        })
    }

    /// Open with a catalog path (convenience method)
    ///
    /// Uses default config with the specified catalog file
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().catalog_path(path).build())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Index and records of `variable` within `[a, b]`
    ///
    /// Unset bounds default to the variable's min/max. An unknown variable,
    /// or a range that meets no page, yields an empty series. Pages are
    /// checksummed first when the store was opened with `check_on_read`.
    pub fn get(
        &self,
        variable: &str,
        a: Option<IndexValue>,
        b: Option<IndexValue>,
    ) -> Result<Series> {
        self.read_range(variable, a, b, self.config.check_on_read)
    }

    /// `get`, verifying the checksum of every page it reads
    ///
    /// A page that fails raises `CorruptPage`.
    pub fn get_checked(
        &self,
        variable: &str,
        a: Option<IndexValue>,
        b: Option<IndexValue>,
    ) -> Result<Series> {
        self.read_range(variable, a, b, true)
    }

    fn read_range(
        &self,
        variable: &str,
        a: Option<IndexValue>,
        b: Option<IndexValue>,
        check: bool,
    ) -> Result<Series> {
        let Some((a, b)) = self.catalog.get_bounds(variable, a, b)? else {
            return Ok(Series::empty());
        };
        let pages = self.catalog.find_pages(variable, a, b)?;
        if pages.is_empty() {
            return Ok(Series::empty());
        }

        let last = pages.len() - 1;
        let mut indexes = Vec::with_capacity(pages.len());
        let mut records = Vec::with_capacity(pages.len());
        for (i, meta) in pages.into_iter().enumerate() {
            let page = if check {
                Page::open_verified(&self.page_dir, meta)?
            } else {
                Page::open(&self.page_dir, meta)
            };
            // Only the edge pages can reach outside [a, b]
            let part = if i == 0 || i == last {
                page.get(a, b, 1)?
            } else {
                page.get_all()?
            };
            indexes.push(part.index);
            records.push(part.records);
        }

        Ok(Series {
            index: IndexArray::concat(&indexes)?,
            records: Records::concat(&records)?,
        })
    }

    /// `get` with both bounds set
    pub fn get_range(
        &self,
        variable: &str,
        a: impl Into<IndexValue>,
        b: impl Into<IndexValue>,
    ) -> Result<Series> {
        self.get(variable, Some(a.into()), Some(b.into()))
    }

    /// Index values only, without reading record files
    pub fn get_index(
        &self,
        variable: &str,
        a: Option<IndexValue>,
        b: Option<IndexValue>,
    ) -> Result<Option<IndexArray>> {
        let Some((a, b)) = self.catalog.get_bounds(variable, a, b)? else {
            return Ok(None);
        };
        let pages = self.catalog.find_pages(variable, a, b)?;
        if pages.is_empty() {
            return Ok(None);
        }

        let mut parts = Vec::with_capacity(pages.len());
        for meta in pages {
            parts.push(self.open_page(meta)?.get_index(a, b, 1)?);
        }
        Ok(Some(IndexArray::concat(&parts)?))
    }

    /// Number of records of `variable` within `[a, b]`
    pub fn count(&self, variable: &str, a: Option<IndexValue>, b: Option<IndexValue>) -> Result<u64> {
        let Some((a, b)) = self.catalog.get_bounds(variable, a, b)? else {
            return Ok(0);
        };
        let pages = self.catalog.find_pages(variable, a, b)?;
        let last = pages.len().saturating_sub(1);

        let mut total = 0;
        for (i, meta) in pages.into_iter().enumerate() {
            total += if i == 0 || i == last {
                self.open_page(meta)?.count_in(a, b)?
            } else {
                meta.count
            };
        }
        Ok(total)
    }

    /// `get` for every variable matching a LIKE pattern
    pub fn get_matching(
        &self,
        pattern: &str,
        a: Option<IndexValue>,
        b: Option<IndexValue>,
    ) -> Result<BTreeMap<String, Series>> {
        let names = self.search(pattern)?;
        self.get_many(names.iter().map(String::as_str), a, b)
    }

    /// `get` for a list of variables over one range
    pub fn get_many<'a>(
        &self,
        variables: impl IntoIterator<Item = &'a str>,
        a: Option<IndexValue>,
        b: Option<IndexValue>,
    ) -> Result<BTreeMap<String, Series>> {
        let mut out = BTreeMap::new();
        for variable in variables {
            out.insert(variable.to_string(), self.get(variable, a, b)?);
        }
        Ok(out)
    }

    // =========================================================================
    // Catalog Lookups
    // =========================================================================

    /// Live variable names matching a LIKE pattern, sorted
    pub fn search(&self, pattern: &str) -> Result<Vec<String>> {
        self.catalog.search_variables(pattern)
    }

    /// Live pages of a variable, ordered by index
    pub fn pages(&self, variable: &str) -> Result<Vec<PageMeta>> {
        self.catalog.pages_for(variable)
    }

    /// Page handle by id, live or soft-deleted
    pub fn page(&self, page_id: u64) -> Result<Option<Page>> {
        Ok(self
            .catalog
            .page(page_id)?
            .map(|row| Page::open(&self.page_dir, row.meta)))
    }

    /// Aggregate statistics for the store or one variable
    pub fn info(&self, variable: Option<&str>) -> Result<StoreInfo> {
        Ok(StoreInfo {
            variable: variable.map(str::to_string),
            stats: self.catalog.stats(variable)?,
        })
    }

    // =========================================================================
    // Conf Log
    // =========================================================================

    /// Latest value recorded for a setting
    pub fn get_var(&self, name: &str) -> Result<Option<String>> {
        self.catalog.get_var(name)
    }

    /// Record a setting
    pub fn set_var(&self, name: &str, value: &str) -> Result<()> {
        self.ensure_writable()?;
        self.catalog.set_var(name, value)
    }

    /// Full settings history
    pub fn conf_entries(&self) -> Result<Vec<ConfEntry>> {
        self.catalog.conf_entries()
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Get the resolved page directory
    pub fn page_dir(&self) -> &Path {
        &self.page_dir
    }

    /// Get the resolved page size limit
    pub fn max_page_size(&self) -> u64 {
        self.max_page_size
    }

    pub fn is_read_only(&self) -> bool {
        self.config.read_only
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the catalog handle
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn open_page(&self, meta: PageMeta) -> Result<Page> {
        if self.config.check_on_read {
            Page::open_verified(&self.page_dir, meta)
        } else {
            Ok(Page::open(&self.page_dir, meta))
        }
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.config.read_only {
            return Err(PageStoreError::ReadOnly);
        }
        Ok(())
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
