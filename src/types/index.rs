//! Index (time) column types
//!
//! The index of a series is a strictly ascending numeric array. Integer and
//! floating point indexes are both supported; bounds of either kind can be
//! used to query either kind of index.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{PageStoreError, Result};

/// Numeric type of an index column, persisted as `indexType` in the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexType {
    Int64,
    Float64,
}

impl IndexType {
    /// Catalog spelling of the type
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexType::Int64 => "i64",
            IndexType::Float64 => "f64",
        }
    }

    /// Bytes per element in the index file
    pub fn item_size(&self) -> usize {
        8
    }
}

impl FromStr for IndexType {
    type Err = PageStoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "i64" => Ok(IndexType::Int64),
            "f64" => Ok(IndexType::Float64),
            other => Err(PageStoreError::TypeMismatch(format!(
                "unknown index type {:?}",
                other
            ))),
        }
    }
}

impl fmt::Display for IndexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// IndexValue
// =============================================================================

/// A single index value (query bound, page low/high mark)
///
/// Ordering is numeric across both variants: two integers compare exactly,
/// anything involving a float compares as `f64` under IEEE total ordering.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum IndexValue {
    Int(i64),
    Float(f64),
}

impl IndexValue {
    pub fn as_f64(&self) -> f64 {
        match *self {
            IndexValue::Int(v) => v as f64,
            IndexValue::Float(v) => v,
        }
    }
}

impl Ord for IndexValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (IndexValue::Int(a), IndexValue::Int(b)) => a.cmp(b),
            _ => self.as_f64().total_cmp(&other.as_f64()),
        }
    }
}

impl PartialOrd for IndexValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for IndexValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for IndexValue {}

impl From<i64> for IndexValue {
    fn from(v: i64) -> Self {
        IndexValue::Int(v)
    }
}

impl From<i32> for IndexValue {
    fn from(v: i32) -> Self {
        IndexValue::Int(v as i64)
    }
}

impl From<f64> for IndexValue {
    fn from(v: f64) -> Self {
        IndexValue::Float(v)
    }
}

impl fmt::Display for IndexValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexValue::Int(v) => write!(f, "{}", v),
            IndexValue::Float(v) => write!(f, "{}", v),
        }
    }
}

impl FromStr for IndexValue {
    type Err = PageStoreError;

    /// Integers parse as `Int`, anything else numeric as `Float`
    fn from_str(s: &str) -> Result<Self> {
        if let Ok(v) = s.parse::<i64>() {
            return Ok(IndexValue::Int(v));
        }
        s.parse::<f64>()
            .map(IndexValue::Float)
            .map_err(|_| PageStoreError::InvalidArgument(format!("not a number: {:?}", s)))
    }
}

// =============================================================================
// IndexArray
// =============================================================================

/// A typed index column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IndexArray {
    Int64(Vec<i64>),
    Float64(Vec<f64>),
}

impl IndexArray {
    /// Create an empty array of the given type
    pub fn empty(index_type: IndexType) -> Self {
        match index_type {
            IndexType::Int64 => IndexArray::Int64(Vec::new()),
            IndexType::Float64 => IndexArray::Float64(Vec::new()),
        }
    }

    pub fn index_type(&self) -> IndexType {
        match self {
            IndexArray::Int64(_) => IndexType::Int64,
            IndexArray::Float64(_) => IndexType::Float64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            IndexArray::Int64(v) => v.len(),
            IndexArray::Float64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value at position `i`
    pub fn get(&self, i: usize) -> Option<IndexValue> {
        match self {
            IndexArray::Int64(v) => v.get(i).map(|&x| IndexValue::Int(x)),
            IndexArray::Float64(v) => v.get(i).map(|&x| IndexValue::Float(x)),
        }
    }

    pub fn first(&self) -> Option<IndexValue> {
        self.get(0)
    }

    pub fn last(&self) -> Option<IndexValue> {
        self.len().checked_sub(1).and_then(|i| self.get(i))
    }

    /// First position whose value is `>= bound` (searchsorted, side=left)
    pub fn search_left(&self, bound: IndexValue) -> usize {
        match self {
            IndexArray::Int64(v) => v.partition_point(|&x| IndexValue::Int(x) < bound),
            IndexArray::Float64(v) => v.partition_point(|&x| IndexValue::Float(x) < bound),
        }
    }

    /// First position whose value is `> bound` (searchsorted, side=right)
    pub fn search_right(&self, bound: IndexValue) -> usize {
        match self {
            IndexArray::Int64(v) => v.partition_point(|&x| IndexValue::Int(x) <= bound),
            IndexArray::Float64(v) => v.partition_point(|&x| IndexValue::Float(x) <= bound),
        }
    }

    /// Elements `start..end` taking every `step`-th one
    pub fn slice(&self, start: usize, end: usize, step: usize) -> IndexArray {
        let end = end.min(self.len());
        let start = start.min(end);
        let step = step.max(1);
        match self {
            IndexArray::Int64(v) => {
                IndexArray::Int64(v[start..end].iter().step_by(step).copied().collect())
            }
            IndexArray::Float64(v) => {
                IndexArray::Float64(v[start..end].iter().step_by(step).copied().collect())
            }
        }
    }

    /// Position of the first element not strictly greater than its predecessor
    pub fn first_unsorted(&self) -> Option<usize> {
        match self {
            IndexArray::Int64(v) => v.windows(2).position(|w| w[0] >= w[1]).map(|p| p + 1),
            IndexArray::Float64(v) => v
                .windows(2)
                .position(|w| w[0].total_cmp(&w[1]) != Ordering::Less)
                .map(|p| p + 1),
        }
    }

    /// True when every element is strictly greater than its predecessor
    pub fn is_strictly_ascending(&self) -> bool {
        self.first_unsorted().is_none()
    }

    /// Position of the first NaN (float indexes only)
    pub fn first_nan(&self) -> Option<usize> {
        match self {
            IndexArray::Int64(_) => None,
            IndexArray::Float64(v) => v.iter().position(|x| x.is_nan()),
        }
    }

    /// Append `other` (must have the same index type)
    pub fn extend(&mut self, other: &IndexArray) -> Result<()> {
        match (self, other) {
            (IndexArray::Int64(a), IndexArray::Int64(b)) => a.extend_from_slice(b),
            (IndexArray::Float64(a), IndexArray::Float64(b)) => a.extend_from_slice(b),
            (a, b) => {
                return Err(PageStoreError::TypeMismatch(format!(
                    "cannot join {} index with {} index",
                    a.index_type(),
                    b.index_type()
                )))
            }
        }
        Ok(())
    }

    /// Concatenate arrays in order
    pub fn concat(parts: &[IndexArray]) -> Result<IndexArray> {
        let mut iter = parts.iter();
        let mut out = match iter.next() {
            Some(first) => first.clone(),
            None => return Ok(IndexArray::Int64(Vec::new())),
        };
        for part in iter {
            out.extend(part)?;
        }
        Ok(out)
    }
}

impl From<Vec<i64>> for IndexArray {
    fn from(v: Vec<i64>) -> Self {
        IndexArray::Int64(v)
    }
}

impl From<Vec<f64>> for IndexArray {
    fn from(v: Vec<f64>) -> Self {
        IndexArray::Float64(v)
    }
}
