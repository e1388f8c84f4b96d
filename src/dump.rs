//! Dump Files
//!
//! Portable snapshots of named series, used to move data in and out of a
//! store.
//!
//! ## File Format
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ Header (14 bytes)                                        │
//! │   Magic: "PGSD" (4) | Version: u16 (2) | PayloadLen: u64 │
//! ├──────────────────────────────────────────────────────────┤
//! │ Payload (PayloadLen bytes)                               │
//! │   bincode BTreeMap<String, Series>                       │
//! ├──────────────────────────────────────────────────────────┤
//! │ Footer (4 bytes)                                         │
//! │   PayloadCRC: u32                                        │
//! └──────────────────────────────────────────────────────────┘
//! ```
//! All integers are little-endian.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use bytes::{Buf, BufMut};

use crate::error::{PageStoreError, Result};
use crate::types::Series;

/// Magic bytes identifying a dump file
const MAGIC: &[u8; 4] = b"PGSD";

/// Current dump format version
const VERSION: u16 = 1;

/// Magic (4) + Version (2) + PayloadLen (8)
const HEADER_SIZE: usize = 14;

/// PayloadCRC (4)
const FOOTER_SIZE: usize = 4;

/// Write named series to a dump file, replacing it if present
pub fn write_dump(path: &Path, entries: &BTreeMap<String, Series>) -> Result<()> {
    let payload = bincode::serialize(entries)?;
    let crc = crc32fast::hash(&payload);

    let mut header = Vec::with_capacity(HEADER_SIZE);
    header.put_slice(MAGIC);
    header.put_u16_le(VERSION);
    header.put_u64_le(payload.len() as u64);

    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(&header)?;
    writer.write_all(&payload)?;
    writer.write_all(&crc.to_le_bytes())?;
    writer.flush()?;
    writer.get_ref().sync_all()?;

    tracing::debug!(
        "Wrote dump {} ({} series, {} bytes)",
        path.display(),
        entries.len(),
        payload.len()
    );
    Ok(())
}

/// Read a dump file written by `write_dump`
///
/// Truncated, foreign or corrupted files are rejected as a whole.
pub fn read_dump(path: &Path) -> Result<BTreeMap<String, Series>> {
    let bytes = fs::read(path)?;
    if bytes.len() < HEADER_SIZE + FOOTER_SIZE {
        return Err(PageStoreError::Serialization(format!(
            "dump {} is truncated ({} bytes)",
            path.display(),
            bytes.len()
        )));
    }

    let mut header = &bytes[..HEADER_SIZE];
    if &header[..4] != MAGIC {
        return Err(PageStoreError::Serialization(format!(
            "invalid dump magic: expected PGSD, got {:?}",
            &header[..4]
        )));
    }
    header.advance(4);
    let version = header.get_u16_le();
    if version != VERSION {
        return Err(PageStoreError::Serialization(format!(
            "unsupported dump version {}",
            version
        )));
    }
    let payload_len = header.get_u64_le() as usize;

    if bytes.len() - HEADER_SIZE - FOOTER_SIZE != payload_len {
        return Err(PageStoreError::Serialization(format!(
            "dump payload is {} bytes, header says {}",
            bytes.len() - HEADER_SIZE - FOOTER_SIZE,
            payload_len
        )));
    }
    let payload = &bytes[HEADER_SIZE..HEADER_SIZE + payload_len];
    let mut footer = &bytes[HEADER_SIZE + payload_len..];
    let expected = footer.get_u32_le();
    if crc32fast::hash(payload) != expected {
        return Err(PageStoreError::Serialization(format!(
            "dump {} failed its checksum",
            path.display()
        )));
    }

    Ok(bincode::deserialize(payload)?)
}
