//! Page Reader
//!
//! Decodes page files and answers range queries via binary search.

use std::fs;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;

use crate::error::{PageStoreError, Result};
use crate::types::{IndexArray, IndexValue, RecordLayout, RecordShape, Records, Series};

use super::codec::{decode_index, decode_lengths, decode_values};
use super::{shard_path, with_suffix, Compression, PageMeta};
use super::{GZIP_EXT, INDEX_EXT, LENGTHS_EXT, RECORD_EXT};

/// Handle to one immutable page on disk
///
/// Opening a page does no I/O; files are read on each query.
#[derive(Debug, Clone)]
pub struct Page {
    meta: PageMeta,
    /// Shard path without extension
    base: PathBuf,
}

impl Page {
    /// Bind catalog metadata to its files under `page_dir`
    pub fn open(page_dir: &Path, meta: PageMeta) -> Self {
        let base = page_dir.join(shard_path(meta.page_id));
        Self { meta, base }
    }

    /// Like `open`, but fail with `CorruptPage` unless the checksum matches
    pub fn open_verified(page_dir: &Path, meta: PageMeta) -> Result<Self> {
        let page = Self::open(page_dir, meta);
        if !page.check()? {
            return Err(PageStoreError::corrupt(
                page.meta.page_id,
                "checksum mismatch",
            ));
        }
        Ok(page)
    }

    pub fn meta(&self) -> &PageMeta {
        &self.meta
    }

    pub fn page_id(&self) -> u64 {
        self.meta.page_id
    }

    pub fn count(&self) -> u64 {
        self.meta.count
    }

    // =========================================================================
    // Paths
    // =========================================================================

    pub fn index_path(&self) -> PathBuf {
        with_suffix(&self.base, INDEX_EXT)
    }

    /// Record file path (`.rec.gz` for compressed pages)
    pub fn record_path(&self) -> PathBuf {
        let path = with_suffix(&self.base, RECORD_EXT);
        match self.meta.compression {
            Compression::None => path,
            Compression::Gzip => with_suffix(&path, GZIP_EXT),
        }
    }

    /// Lengths file path, only for ragged pages
    pub fn lengths_path(&self) -> Option<PathBuf> {
        self.meta
            .record_layout
            .is_ragged()
            .then(|| with_suffix(&self.base, LENGTHS_EXT))
    }

    /// All files of this page in checksum order
    pub fn files(&self) -> Vec<PathBuf> {
        let mut files = vec![self.index_path()];
        files.extend(self.lengths_path());
        files.push(self.record_path());
        files
    }

    // =========================================================================
    // Full Reads
    // =========================================================================

    /// Decode the whole index column
    pub fn get_index_all(&self) -> Result<IndexArray> {
        let bytes = read_file(&self.index_path())?;
        decode_index(
            self.meta.page_id,
            &bytes,
            self.meta.index_type,
            self.meta.count as usize,
        )
    }

    /// Decode all records, decompressing if needed
    pub fn get_records_all(&self) -> Result<Records> {
        let page_id = self.meta.page_id;
        let count = self.meta.count as usize;

        let raw = read_file(&self.record_path())?;
        let bytes = match self.meta.compression {
            Compression::None => raw,
            Compression::Gzip => {
                let mut out = Vec::with_capacity(self.meta.record_size as usize);
                GzDecoder::new(raw.as_slice())
                    .read_to_end(&mut out)
                    .map_err(|e| PageStoreError::corrupt(page_id, format!("gzip: {}", e)))?;
                out
            }
        };

        let (shape, elements) = match self.meta.record_layout {
            RecordLayout::Scalar => (RecordShape::Scalar, count),
            RecordLayout::FixedWidth { width } => {
                let elements = count.checked_mul(width).ok_or_else(|| {
                    PageStoreError::corrupt(page_id, format!("{} records of width {}", count, width))
                })?;
                (RecordShape::FixedWidth { width }, elements)
            }
            RecordLayout::Ragged => {
                let path = with_suffix(&self.base, LENGTHS_EXT);
                let lengths = decode_lengths(page_id, &read_file(&path)?, count)?;
                let elements = lengths
                    .iter()
                    .try_fold(0u64, |acc, &l| acc.checked_add(l))
                    .and_then(|total| usize::try_from(total).ok())
                    .ok_or_else(|| PageStoreError::corrupt(page_id, "record lengths overflow"))?;
                (RecordShape::Ragged { lengths }, elements)
            }
        };

        let values = decode_values(page_id, &bytes, self.meta.record_type, elements)?;
        Ok(Records::from_parts(shape, values))
    }

    /// Decode both columns
    pub fn get_all(&self) -> Result<Series> {
        Ok(Series {
            index: self.get_index_all()?,
            records: self.get_records_all()?,
        })
    }

    // =========================================================================
    // Range Reads
    // =========================================================================

    /// Records with index in `[a, b]`, taking every `step`-th one
    pub fn get(&self, a: IndexValue, b: IndexValue, step: usize) -> Result<Series> {
        check_step(step)?;
        let Series { index, records } = self.get_all()?;
        let start = index.search_left(a);
        let end = index.search_right(b).max(start);
        Ok(Series {
            index: index.slice(start, end, step),
            records: records.slice(start, end, step),
        })
    }

    /// Index values in `[a, b]`, without touching the record file
    pub fn get_index(&self, a: IndexValue, b: IndexValue, step: usize) -> Result<IndexArray> {
        check_step(step)?;
        let index = self.get_index_all()?;
        let start = index.search_left(a);
        let end = index.search_right(b).max(start);
        Ok(index.slice(start, end, step))
    }

    /// Number of records with index in `[a, b]`
    pub fn count_in(&self, a: IndexValue, b: IndexValue) -> Result<u64> {
        let index = self.get_index_all()?;
        let start = index.search_left(a);
        let end = index.search_right(b).max(start);
        Ok((end - start) as u64)
    }

    // =========================================================================
    // Integrity & Lifecycle
    // =========================================================================

    /// Recompute the checksum and compare with the stored one
    ///
    /// Pages without record bytes carry no checksum and always pass.
    pub fn check(&self) -> Result<bool> {
        let expected = match &self.meta.checksum {
            Some(sum) => sum,
            None => return Ok(true),
        };
        let mut hasher = crc32fast::Hasher::new();
        for path in self.files() {
            hasher.update(&read_file(&path)?);
        }
        let actual = format!("{:08x}", hasher.finalize());
        if &actual != expected {
            tracing::warn!(
                "Checksum failed for page {}: expected {}, got {}",
                self.meta.page_id,
                expected,
                actual
            );
            return Ok(false);
        }
        Ok(true)
    }

    /// Remove the page files
    ///
    /// A file that is already gone is reported as `MissingFile`.
    pub fn delete(&self) -> Result<()> {
        for path in self.files() {
            fs::remove_file(&path).map_err(|e| match e.kind() {
                ErrorKind::NotFound => PageStoreError::MissingFile(path.clone()),
                _ => PageStoreError::Io(e),
            })?;
        }
        tracing::debug!("Deleted files of page {}", self.meta.page_id);
        Ok(())
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => PageStoreError::MissingFile(path.to_path_buf()),
        _ => PageStoreError::Io(e),
    })
}

fn check_step(step: usize) -> Result<()> {
    if step == 0 {
        return Err(PageStoreError::InvalidArgument(
            "step must be at least 1".to_string(),
        ));
    }
    Ok(())
}
