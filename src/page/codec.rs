//! Page file codec
//!
//! Raw little-endian encodings of index, length and record arrays. Decoders
//! insist on exactly the declared number of elements; anything else means the
//! file was truncated or overwritten and is reported as a corrupt page.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{PageStoreError, Result};
use crate::types::{Column, ElementType, IndexArray, IndexType};

// =============================================================================
// Index
// =============================================================================

pub(crate) fn encode_index(index: &IndexArray) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(index.len() * 8);
    match index {
        IndexArray::Int64(v) => v.iter().for_each(|&x| buf.put_i64_le(x)),
        IndexArray::Float64(v) => v.iter().for_each(|&x| buf.put_f64_le(x)),
    }
    buf.to_vec()
}

pub(crate) fn decode_index(
    page_id: u64,
    bytes: &[u8],
    index_type: IndexType,
    count: usize,
) -> Result<IndexArray> {
    expect_len(page_id, "index", bytes.len(), count, index_type.item_size())?;
    let mut cur = bytes;
    Ok(match index_type {
        IndexType::Int64 => IndexArray::Int64((0..count).map(|_| cur.get_i64_le()).collect()),
        IndexType::Float64 => {
            IndexArray::Float64((0..count).map(|_| cur.get_f64_le()).collect())
        }
    })
}

// =============================================================================
// Lengths
// =============================================================================

pub(crate) fn encode_lengths(lengths: &[u64]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(lengths.len() * 8);
    lengths.iter().for_each(|&l| buf.put_u64_le(l));
    buf.to_vec()
}

pub(crate) fn decode_lengths(page_id: u64, bytes: &[u8], count: usize) -> Result<Vec<u64>> {
    expect_len(page_id, "lengths", bytes.len(), count, 8)?;
    let mut cur = bytes;
    Ok((0..count).map(|_| cur.get_u64_le()).collect())
}

// =============================================================================
// Records
// =============================================================================

pub(crate) fn encode_values(values: &Column) -> Vec<u8> {
    let mut buf = BytesMut::new();
    match values {
        Column::Int32(v) => v.iter().for_each(|&x| buf.put_i32_le(x)),
        Column::Int64(v) => v.iter().for_each(|&x| buf.put_i64_le(x)),
        Column::Float32(v) => v.iter().for_each(|&x| buf.put_f32_le(x)),
        Column::Float64(v) => v.iter().for_each(|&x| buf.put_f64_le(x)),
        Column::UInt8(v) => buf.put_slice(v),
        Column::Text(v) => {
            for s in v {
                buf.put_u32_le(s.len() as u32);
                buf.put_slice(s.as_bytes());
            }
        }
    }
    buf.to_vec()
}

pub(crate) fn decode_values(
    page_id: u64,
    bytes: &[u8],
    element_type: ElementType,
    elements: usize,
) -> Result<Column> {
    if let Some(size) = element_type.item_size() {
        expect_len(page_id, "record", bytes.len(), elements, size)?;
    }
    let mut cur = bytes;
    let column = match element_type {
        ElementType::Int32 => Column::Int32((0..elements).map(|_| cur.get_i32_le()).collect()),
        ElementType::Int64 => Column::Int64((0..elements).map(|_| cur.get_i64_le()).collect()),
        ElementType::Float32 => {
            Column::Float32((0..elements).map(|_| cur.get_f32_le()).collect())
        }
        ElementType::Float64 => {
            Column::Float64((0..elements).map(|_| cur.get_f64_le()).collect())
        }
        ElementType::UInt8 => Column::UInt8(cur.to_vec()),
        ElementType::Text => Column::Text(decode_text(page_id, &mut cur, elements)?),
    };
    Ok(column)
}

fn decode_text(page_id: u64, cur: &mut &[u8], elements: usize) -> Result<Vec<String>> {
    // Every string carries at least its 4-byte length prefix
    if elements > cur.remaining() / 4 {
        return Err(PageStoreError::corrupt(
            page_id,
            format!("{} strings cannot fit in {} bytes", elements, cur.remaining()),
        ));
    }
    let mut out = Vec::with_capacity(elements);
    for i in 0..elements {
        if cur.remaining() < 4 {
            return Err(PageStoreError::corrupt(
                page_id,
                format!("record file ends after {} of {} strings", i, elements),
            ));
        }
        let len = cur.get_u32_le() as usize;
        if cur.remaining() < len {
            return Err(PageStoreError::corrupt(
                page_id,
                format!("string {} truncated ({} of {} bytes)", i, cur.remaining(), len),
            ));
        }
        let s = String::from_utf8(cur[..len].to_vec()).map_err(|e| {
            PageStoreError::corrupt(page_id, format!("string {} is not UTF-8: {}", i, e))
        })?;
        cur.advance(len);
        out.push(s);
    }
    if cur.has_remaining() {
        return Err(PageStoreError::corrupt(
            page_id,
            format!("{} trailing bytes after {} strings", cur.remaining(), elements),
        ));
    }
    Ok(out)
}

fn expect_len(page_id: u64, what: &str, actual: usize, count: usize, item_size: usize) -> Result<()> {
    let expected = count.checked_mul(item_size).ok_or_else(|| {
        PageStoreError::corrupt(page_id, format!("{} {} entries overflow", count, what))
    })?;
    if actual != expected {
        return Err(PageStoreError::corrupt(
            page_id,
            format!("{} file holds {} bytes, expected {}", what, actual, expected),
        ));
    }
    Ok(())
}
