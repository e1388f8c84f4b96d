//! Page Module
//!
//! Immutable on-disk blocks holding one sorted run of a single variable.
//!
//! ## Responsibilities
//! - Write a page once from index + record arrays
//! - Read back all of it, or an inclusive index range of it
//! - Verify the CRC32 checksum on demand
//! - Delete the page files (the only mutation a page ever sees)
//!
//! ## File Layout
//! ```text
//! {page_dir}/01/0234/567.idx      index: i64 | f64 little-endian, `count` items
//! {page_dir}/01/0234/567.len      lengths: u64 LE per record (ragged only)
//! {page_dir}/01/0234/567.rec      records: LE elements, text as [len u32][utf8]
//! {page_dir}/01/0234/567.rec.gz   records, gzip compressed (instead of .rec)
//! ```
//!
//! The checksum covers the bytes of `.idx`, `.len`, `.rec[.gz]` in that order
//! and never any catalog metadata.

mod builder;
mod codec;
mod reader;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{PageStoreError, Result};
use crate::types::{ElementType, IndexType, IndexValue, RecordLayout};

pub use builder::PageBuilder;
pub use reader::Page;

// =============================================================================
// Shared Constants
// =============================================================================

/// Digits per directory level of the shard tree
pub const SHARD_WIDTH: usize = 3;

pub(crate) const INDEX_EXT: &str = ".idx";
pub(crate) const LENGTHS_EXT: &str = ".len";
pub(crate) const RECORD_EXT: &str = ".rec";
pub(crate) const GZIP_EXT: &str = ".gz";

// =============================================================================
// Compression
// =============================================================================

/// Compression applied to a page's record file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    None,
    Gzip,
}

impl Compression {
    /// Catalog spelling (`NULL` for no compression)
    pub fn as_catalog(&self) -> Option<&'static str> {
        match self {
            Compression::None => None,
            Compression::Gzip => Some("gzip"),
        }
    }

    pub fn from_catalog(value: Option<&str>) -> Result<Self> {
        match value {
            None | Some("") | Some("none") => Ok(Compression::None),
            Some("gzip") => Ok(Compression::Gzip),
            Some(other) => Err(PageStoreError::Config(format!(
                "unknown compression {:?}",
                other
            ))),
        }
    }
}

impl FromStr for Compression {
    type Err = PageStoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_catalog(Some(s))
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_catalog().unwrap_or("none"))
    }
}

// =============================================================================
// Page Metadata
// =============================================================================

/// Everything the catalog knows about one page
#[derive(Debug, Clone, PartialEq)]
pub struct PageMeta {
    /// Unique across the store, never reused
    pub page_id: u64,
    pub index_type: IndexType,
    /// Number of records
    pub count: u64,
    /// First index value
    pub index_low: IndexValue,
    /// Last index value
    pub index_high: IndexValue,
    pub record_type: ElementType,
    pub record_layout: RecordLayout,
    /// Uncompressed size of the record file in bytes
    pub record_size: u64,
    pub compression: Compression,
    /// Creation time, unix millis
    pub created_at: i64,
    /// CRC32 hex digest, absent for pages without record bytes
    pub checksum: Option<String>,
}

impl PageMeta {
    /// True if the page's index range intersects `[a, b]`
    pub fn overlaps(&self, a: IndexValue, b: IndexValue) -> bool {
        self.index_high >= a && self.index_low <= b
    }
}

// =============================================================================
// Paths
// =============================================================================

/// Relative shard path of a page id, without extension
///
/// Digits are grouped in threes from the right; every directory component
/// gets a leading `0` so it never collides with a page file stem:
/// `7 → 7`, `1234 → 01/234`, `1234567 → 01/0234/567`.
pub fn shard_path(page_id: u64) -> PathBuf {
    let digits = page_id.to_string();
    let mut chunks = Vec::new();
    let mut end = digits.len();
    while end > 0 {
        let start = end.saturating_sub(SHARD_WIDTH);
        chunks.push(&digits[start..end]);
        end = start;
    }
    chunks.reverse();

    let last = chunks.len() - 1;
    let mut path = PathBuf::new();
    for (i, chunk) in chunks.iter().enumerate() {
        if i < last {
            path.push(format!("0{}", chunk));
        } else {
            path.push(chunk);
        }
    }
    path
}

/// `base` with `suffix` appended to the file name
pub(crate) fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}
