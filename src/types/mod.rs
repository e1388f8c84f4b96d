//! Series Types
//!
//! Typed arrays exchanged between producers, the store and consumers.
//!
//! ## Responsibilities
//! - Index columns (`IndexArray`) with searchsorted-style lookups
//! - Record columns (`Records`) in scalar, fixed-width or ragged shape
//! - The `Series` pair handed to `Store::store_variable` and returned by reads

mod index;
mod records;

use serde::{Deserialize, Serialize};

use crate::error::{PageStoreError, Result};

pub use index::{IndexArray, IndexType, IndexValue};
pub use records::{Column, ElementType, RecordLayout, RecordShape, Records};

/// An index column and its matching records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub index: IndexArray,
    pub records: Records,
}

impl Series {
    /// Pair an index with records of the same length
    pub fn new(index: impl Into<IndexArray>, records: impl Into<Records>) -> Result<Self> {
        let index = index.into();
        let records = records.into();
        if index.len() != records.len() {
            return Err(PageStoreError::LengthMismatch {
                index: index.len(),
                records: records.len(),
            });
        }
        Ok(Self { index, records })
    }

    /// The result of a query that matched nothing
    pub fn empty() -> Self {
        Self {
            index: IndexArray::empty(IndexType::Int64),
            records: Records::empty(ElementType::Float64),
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}
