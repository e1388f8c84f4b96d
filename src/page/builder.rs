//! Page Builder
//!
//! Writes the files of a new page and computes its checksum.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;

use crate::catalog::now_millis;
use crate::error::{PageStoreError, Result};
use crate::types::{IndexArray, RecordShape, Records};

use super::codec::{encode_index, encode_lengths, encode_values};
use super::{shard_path, with_suffix, Compression, Page, PageMeta};
use super::{GZIP_EXT, INDEX_EXT, LENGTHS_EXT, RECORD_EXT};

/// Builder for creating a page from in-memory arrays
///
/// Files are written in checksum order (index, lengths, records) and each is
/// synced before `finish()` returns, so a page that made it into the catalog
/// is fully on disk.
pub struct PageBuilder {
    /// Root of the page tree
    page_dir: PathBuf,
    /// Id of the page being written
    page_id: u64,
    /// Record file compression
    compression: Compression,
}

impl PageBuilder {
    /// Create a builder for page `page_id` under `page_dir`
    pub fn new(page_dir: &Path, page_id: u64) -> Self {
        Self {
            page_dir: page_dir.to_path_buf(),
            page_id,
            compression: Compression::None,
        }
    }

    /// Compress the record file
    pub fn compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Write the page files and return the new page
    pub fn finish(self, index: &IndexArray, records: &Records) -> Result<Page> {
        let count = index.len();
        if count == 0 {
            return Err(PageStoreError::EmptyInput);
        }
        if records.len() != count {
            return Err(PageStoreError::LengthMismatch {
                index: count,
                records: records.len(),
            });
        }
        // Non-empty, so first/last exist
        let (index_low, index_high) = match (index.first(), index.last()) {
            (Some(low), Some(high)) => (low, high),
            _ => return Err(PageStoreError::EmptyInput),
        };

        let base = self.page_dir.join(shard_path(self.page_id));
        if let Some(parent) = base.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut hasher = crc32fast::Hasher::new();

        // Index file
        let index_bytes = encode_index(index);
        write_synced(&with_suffix(&base, INDEX_EXT), &index_bytes)?;
        hasher.update(&index_bytes);

        // Lengths file (ragged only)
        if let RecordShape::Ragged { lengths } = records.shape() {
            let length_bytes = encode_lengths(lengths);
            write_synced(&with_suffix(&base, LENGTHS_EXT), &length_bytes)?;
            hasher.update(&length_bytes);
        }

        // Record file
        let record_bytes = encode_values(records.values());
        let record_size = record_bytes.len() as u64;
        let record_path = with_suffix(&base, RECORD_EXT);
        match self.compression {
            Compression::None => {
                write_synced(&record_path, &record_bytes)?;
                hasher.update(&record_bytes);
            }
            Compression::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
                encoder.write_all(&record_bytes)?;
                let compressed = encoder.finish()?;
                write_synced(&with_suffix(&record_path, GZIP_EXT), &compressed)?;
                hasher.update(&compressed);
            }
        }

        let checksum = if record_size > 0 {
            Some(format!("{:08x}", hasher.finalize()))
        } else {
            None
        };

        let meta = PageMeta {
            page_id: self.page_id,
            index_type: index.index_type(),
            count: count as u64,
            index_low,
            index_high,
            record_type: records.element_type(),
            record_layout: records.layout(),
            record_size,
            compression: self.compression,
            created_at: now_millis(),
            checksum,
        };

        tracing::debug!(
            "Built page {} ({} records, {} bytes)",
            meta.page_id,
            meta.count,
            meta.record_size
        );

        Ok(Page::open(&self.page_dir, meta))
    }
}

impl Page {
    /// Write a new page from arrays (`count == index.len()` must be > 0)
    pub fn build_from_arrays(
        index: &IndexArray,
        records: &Records,
        page_dir: &Path,
        page_id: u64,
        compression: Compression,
    ) -> Result<Page> {
        PageBuilder::new(page_dir, page_id)
            .compression(compression)
            .finish(index, records)
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(bytes)?;
    let file: File = writer
        .into_inner()
        .map_err(|e| PageStoreError::Io(e.into_error()))?;
    file.sync_all()?;
    Ok(())
}
