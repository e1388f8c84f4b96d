//! Configuration for the page store
//!
//! Centralized configuration with sensible defaults. Values left unset fall
//! back to whatever the catalog's conf log last recorded, so a store reopened
//! with a bare config keeps its page directory and page size limit.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::page::Compression;

/// Default maximum page size in bytes (16 MiB)
pub const DEFAULT_MAX_PAGE_SIZE: u64 = 1 << 24;

/// Page directory used when neither config nor catalog names one
pub const DEFAULT_PAGE_DIR: &str = "data";

/// Main configuration for a Store instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Path of the SQLite catalog file
    pub catalog_path: PathBuf,

    /// Root of the sharded page tree
    /// Internal structure:
    ///   {page_dir}/
    ///     ├── 7.idx, 7.rec           (page 7)
    ///     └── 01/0234/567.idx ...    (page 1234567)
    pub page_dir: Option<PathBuf>,

    /// Compression applied to record files of new pages
    pub compression: Compression,

    // -------------------------------------------------------------------------
    // Maintenance Configuration
    // -------------------------------------------------------------------------
    /// Rebalance threshold in record bytes (0 disables rebalancing)
    pub max_page_size: Option<u64>,

    /// Soft-delete retired pages instead of removing them immediately
    pub keep_deleted_pages: bool,

    /// Soft-deleted pages older than this are pruned at the end of each write
    pub deleted_page_retention: Option<Duration>,

    // -------------------------------------------------------------------------
    // Access Configuration
    // -------------------------------------------------------------------------
    /// Verify page checksums on every read
    pub check_on_read: bool,

    /// Work on a private snapshot of the catalog and refuse writes
    pub read_only: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            catalog_path: PathBuf::from("./pagestore.db"),
            page_dir: None,
            compression: Compression::None,
            max_page_size: None,
            keep_deleted_pages: false,
            deleted_page_retention: None,
            check_on_read: false,
            read_only: false,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Page directory used when nothing was configured or persisted
    pub fn default_page_dir(&self) -> PathBuf {
        let parent = self
            .catalog_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        parent.join(DEFAULT_PAGE_DIR)
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the catalog database file
    pub fn catalog_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.catalog_path = path.into();
        self
    }

    /// Set the page directory
    pub fn page_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.page_dir = Some(path.into());
        self
    }

    /// Set the record file compression for new pages
    pub fn compression(mut self, compression: Compression) -> Self {
        self.config.compression = compression;
        self
    }

    /// Set the rebalance threshold (in bytes)
    pub fn max_page_size(mut self, size: u64) -> Self {
        self.config.max_page_size = Some(size);
        self
    }

    /// Keep retired pages on disk with a deletion mark
    pub fn keep_deleted_pages(mut self, keep: bool) -> Self {
        self.config.keep_deleted_pages = keep;
        self
    }

    /// Set the grace period before soft-deleted pages are pruned
    pub fn deleted_page_retention(mut self, retention: Duration) -> Self {
        self.config.deleted_page_retention = Some(retention);
        self
    }

    /// Verify checksums on read
    pub fn check_on_read(mut self, check: bool) -> Self {
        self.config.check_on_read = check;
        self
    }

    /// Open the store read-only
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.config.read_only = read_only;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
