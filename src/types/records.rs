//! Record column types
//!
//! A `Records` value holds one record per index entry. Records are stored as
//! a single flat `Column` plus a `RecordShape` describing how the flat values
//! split into records:
//!
//! ```text
//! Scalar              values = [r0, r1, r2]
//! FixedWidth { 2 }    values = [r0a, r0b, r1a, r1b]
//! Ragged { [1, 3] }   values = [r0a, r1a, r1b, r1c]
//! ```
//!
//! The shape is canonical: records built from rows that all share a non-zero
//! length are `FixedWidth`, anything else non-scalar is `Ragged`.

use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{PageStoreError, Result};

/// Element type of a record column, persisted as `recordType` in the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementType {
    Int32,
    Int64,
    Float32,
    Float64,
    UInt8,
    Text,
}

impl ElementType {
    /// Catalog spelling of the type
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementType::Int32 => "i32",
            ElementType::Int64 => "i64",
            ElementType::Float32 => "f32",
            ElementType::Float64 => "f64",
            ElementType::UInt8 => "u8",
            ElementType::Text => "utf8",
        }
    }

    /// Fixed on-disk size of one element (`None` for length-prefixed text)
    pub fn item_size(&self) -> Option<usize> {
        match self {
            ElementType::Int32 | ElementType::Float32 => Some(4),
            ElementType::Int64 | ElementType::Float64 => Some(8),
            ElementType::UInt8 => Some(1),
            ElementType::Text => None,
        }
    }
}

impl FromStr for ElementType {
    type Err = PageStoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "i32" => Ok(ElementType::Int32),
            "i64" => Ok(ElementType::Int64),
            "f32" => Ok(ElementType::Float32),
            "f64" => Ok(ElementType::Float64),
            "u8" => Ok(ElementType::UInt8),
            "utf8" => Ok(ElementType::Text),
            other => Err(PageStoreError::TypeMismatch(format!(
                "unknown record type {:?}",
                other
            ))),
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Column
// =============================================================================

/// A flat, homogeneous vector of record elements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Column {
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    UInt8(Vec<u8>),
    Text(Vec<String>),
}

/// Apply `$body` to the inner vector and wrap the result in the same variant
macro_rules! map_column {
    ($col:expr, $v:ident => $body:expr) => {
        match $col {
            Column::Int32($v) => Column::Int32($body),
            Column::Int64($v) => Column::Int64($body),
            Column::Float32($v) => Column::Float32($body),
            Column::Float64($v) => Column::Float64($body),
            Column::UInt8($v) => Column::UInt8($body),
            Column::Text($v) => Column::Text($body),
        }
    };
}

impl Column {
    /// Create an empty column of the given type
    pub fn empty(element_type: ElementType) -> Self {
        match element_type {
            ElementType::Int32 => Column::Int32(Vec::new()),
            ElementType::Int64 => Column::Int64(Vec::new()),
            ElementType::Float32 => Column::Float32(Vec::new()),
            ElementType::Float64 => Column::Float64(Vec::new()),
            ElementType::UInt8 => Column::UInt8(Vec::new()),
            ElementType::Text => Column::Text(Vec::new()),
        }
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            Column::Int32(_) => ElementType::Int32,
            Column::Int64(_) => ElementType::Int64,
            Column::Float32(_) => ElementType::Float32,
            Column::Float64(_) => ElementType::Float64,
            Column::UInt8(_) => ElementType::UInt8,
            Column::Text(_) => ElementType::Text,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Column::Int32(v) => v.len(),
            Column::Int64(v) => v.len(),
            Column::Float32(v) => v.len(),
            Column::Float64(v) => v.len(),
            Column::UInt8(v) => v.len(),
            Column::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the elements in `range`
    pub fn slice(&self, range: Range<usize>) -> Column {
        map_column!(self, v => v[range].to_vec())
    }

    /// Append the elements of `other` in `range`
    pub fn extend_range(&mut self, other: &Column, range: Range<usize>) -> Result<()> {
        match (self, other) {
            (Column::Int32(a), Column::Int32(b)) => a.extend_from_slice(&b[range]),
            (Column::Int64(a), Column::Int64(b)) => a.extend_from_slice(&b[range]),
            (Column::Float32(a), Column::Float32(b)) => a.extend_from_slice(&b[range]),
            (Column::Float64(a), Column::Float64(b)) => a.extend_from_slice(&b[range]),
            (Column::UInt8(a), Column::UInt8(b)) => a.extend_from_slice(&b[range]),
            (Column::Text(a), Column::Text(b)) => a.extend_from_slice(&b[range]),
            (a, b) => {
                return Err(PageStoreError::TypeMismatch(format!(
                    "cannot join {} records with {} records",
                    a.element_type(),
                    b.element_type()
                )))
            }
        }
        Ok(())
    }
}

impl From<Vec<i32>> for Column {
    fn from(v: Vec<i32>) -> Self {
        Column::Int32(v)
    }
}

impl From<Vec<i64>> for Column {
    fn from(v: Vec<i64>) -> Self {
        Column::Int64(v)
    }
}

impl From<Vec<f32>> for Column {
    fn from(v: Vec<f32>) -> Self {
        Column::Float32(v)
    }
}

impl From<Vec<f64>> for Column {
    fn from(v: Vec<f64>) -> Self {
        Column::Float64(v)
    }
}

impl From<Vec<u8>> for Column {
    fn from(v: Vec<u8>) -> Self {
        Column::UInt8(v)
    }
}

impl From<Vec<String>> for Column {
    fn from(v: Vec<String>) -> Self {
        Column::Text(v)
    }
}

impl From<Vec<&str>> for Column {
    fn from(v: Vec<&str>) -> Self {
        Column::Text(v.into_iter().map(str::to_owned).collect())
    }
}

// =============================================================================
// Shapes
// =============================================================================

/// How the flat values of a `Records` split into records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordShape {
    /// One element per record
    Scalar,
    /// `width` elements per record
    FixedWidth { width: usize },
    /// Per-record element counts
    Ragged { lengths: Vec<u64> },
}

impl RecordShape {
    pub fn layout(&self) -> RecordLayout {
        match self {
            RecordShape::Scalar => RecordLayout::Scalar,
            RecordShape::FixedWidth { width } => RecordLayout::FixedWidth { width: *width },
            RecordShape::Ragged { .. } => RecordLayout::Ragged,
        }
    }
}

/// Record shape without the per-record lengths, persisted as `recordLen`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordLayout {
    Scalar,
    FixedWidth { width: usize },
    Ragged,
}

impl RecordLayout {
    /// `0` scalar, `width` fixed, `-1` ragged
    pub fn to_record_len(&self) -> i64 {
        match self {
            RecordLayout::Scalar => 0,
            RecordLayout::FixedWidth { width } => *width as i64,
            RecordLayout::Ragged => -1,
        }
    }

    pub fn from_record_len(record_len: i64) -> Result<Self> {
        match record_len {
            0 => Ok(RecordLayout::Scalar),
            -1 => Ok(RecordLayout::Ragged),
            w if w > 0 => Ok(RecordLayout::FixedWidth { width: w as usize }),
            other => Err(PageStoreError::TypeMismatch(format!(
                "invalid record length {}",
                other
            ))),
        }
    }

    pub fn is_ragged(&self) -> bool {
        matches!(self, RecordLayout::Ragged)
    }
}

// =============================================================================
// Records
// =============================================================================

/// One record per index entry, all of one element type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Records {
    shape: RecordShape,
    values: Column,
}

impl Records {
    /// One element per record
    pub fn scalar(values: impl Into<Column>) -> Self {
        Self {
            shape: RecordShape::Scalar,
            values: values.into(),
        }
    }

    /// `width` consecutive elements per record
    pub fn fixed_width(width: usize, values: impl Into<Column>) -> Result<Self> {
        let values = values.into();
        if width == 0 || values.len() % width != 0 {
            return Err(PageStoreError::InvalidArgument(format!(
                "{} values do not split into records of width {}",
                values.len(),
                width
            )));
        }
        Ok(Self {
            shape: RecordShape::FixedWidth { width },
            values,
        })
    }

    /// Records with explicit per-record element counts
    pub fn ragged(lengths: Vec<u64>, values: impl Into<Column>) -> Result<Self> {
        let values = values.into();
        let total = lengths.iter().try_fold(0u64, |acc, &l| acc.checked_add(l));
        if total != Some(values.len() as u64) {
            return Err(PageStoreError::InvalidArgument(format!(
                "lengths {:?} do not cover the {} values given",
                total,
                values.len()
            )));
        }
        Ok(Self::canonical(lengths, values))
    }

    /// Build records from one column per record, choosing the shape from the
    /// row lengths
    pub fn from_rows(rows: Vec<Column>) -> Result<Self> {
        let element_type = match rows.first() {
            Some(row) => row.element_type(),
            None => return Err(PageStoreError::EmptyInput),
        };
        let mut values = Column::empty(element_type);
        let mut lengths = Vec::with_capacity(rows.len());
        for row in &rows {
            lengths.push(row.len() as u64);
            values.extend_range(row, 0..row.len())?;
        }
        Ok(Self::canonical(lengths, values))
    }

    /// Empty scalar records of the given type
    pub fn empty(element_type: ElementType) -> Self {
        Self::scalar(Column::empty(element_type))
    }

    /// Reassemble records from decoded parts without re-inspecting the shape
    pub(crate) fn from_parts(shape: RecordShape, values: Column) -> Self {
        Self { shape, values }
    }

    pub fn len(&self) -> usize {
        match &self.shape {
            RecordShape::Scalar => self.values.len(),
            RecordShape::FixedWidth { width } => self.values.len() / width,
            RecordShape::Ragged { lengths } => lengths.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn element_type(&self) -> ElementType {
        self.values.element_type()
    }

    pub fn shape(&self) -> &RecordShape {
        &self.shape
    }

    pub fn layout(&self) -> RecordLayout {
        self.shape.layout()
    }

    /// The flat element column
    pub fn values(&self) -> &Column {
        &self.values
    }

    pub fn into_parts(self) -> (RecordShape, Column) {
        (self.shape, self.values)
    }

    /// Elements of record `row` (a one-element column for scalars)
    pub fn row(&self, row: usize) -> Option<Column> {
        if row >= self.len() {
            return None;
        }
        let offsets = self.ragged_offsets();
        Some(self.values.slice(self.row_range(&offsets, row)))
    }

    /// Every record in order (one-element columns for scalars)
    pub fn rows(&self) -> impl Iterator<Item = Column> + '_ {
        let offsets = self.ragged_offsets();
        (0..self.len()).map(move |row| self.values.slice(self.row_range(&offsets, row)))
    }

    /// Records `start..end` taking every `step`-th one
    pub fn slice(&self, start: usize, end: usize, step: usize) -> Records {
        let end = end.min(self.len());
        let start = start.min(end);
        let picks: Vec<(usize, usize)> = (start..end).step_by(step.max(1)).map(|r| (0, r)).collect();
        // A single source always has a consistent element type
        Self::gather(&[self], &picks).unwrap_or_else(|_| self.clone())
    }

    /// Concatenate records in order
    pub fn concat(parts: &[Records]) -> Result<Records> {
        if parts.is_empty() {
            return Err(PageStoreError::EmptyInput);
        }
        let refs: Vec<&Records> = parts.iter().collect();
        let picks: Vec<(usize, usize)> = parts
            .iter()
            .enumerate()
            .flat_map(|(p, part)| (0..part.len()).map(move |r| (p, r)))
            .collect();
        Self::gather(&refs, &picks)
    }

    /// Assemble new records from `(part, row)` picks over several sources
    pub(crate) fn gather(parts: &[&Records], picks: &[(usize, usize)]) -> Result<Records> {
        let first = match parts.first() {
            Some(first) => *first,
            None => return Err(PageStoreError::EmptyInput),
        };
        let element_type = first.element_type();
        if let Some(other) = parts.iter().find(|p| p.element_type() != element_type) {
            return Err(PageStoreError::TypeMismatch(format!(
                "cannot join {} records with {} records",
                element_type,
                other.element_type()
            )));
        }

        let all_scalar = parts.iter().all(|p| p.shape == RecordShape::Scalar);
        let offsets: Vec<Vec<usize>> = parts.iter().map(|p| p.ragged_offsets()).collect();

        let mut values = Column::empty(element_type);
        let mut lengths = Vec::with_capacity(picks.len());
        for &(p, r) in picks {
            let range = parts[p].row_range(&offsets[p], r);
            lengths.push(range.len() as u64);
            values.extend_range(&parts[p].values, range)?;
        }

        if all_scalar {
            return Ok(Self::scalar(values));
        }
        if lengths.is_empty() {
            let shape = match &first.shape {
                RecordShape::Ragged { .. } => RecordShape::Ragged { lengths },
                shape => shape.clone(),
            };
            return Ok(Self { shape, values });
        }
        Ok(Self::canonical(lengths, values))
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn canonical(lengths: Vec<u64>, values: Column) -> Self {
        let uniform = lengths
            .first()
            .filter(|&&w| w > 0 && lengths.iter().all(|&l| l == w))
            .copied();
        let shape = match uniform {
            Some(width) => RecordShape::FixedWidth {
                width: width as usize,
            },
            None => RecordShape::Ragged { lengths },
        };
        Self { shape, values }
    }

    /// Prefix sums of ragged lengths (empty for other shapes)
    fn ragged_offsets(&self) -> Vec<usize> {
        match &self.shape {
            RecordShape::Ragged { lengths } => {
                let mut offsets = Vec::with_capacity(lengths.len() + 1);
                let mut acc = 0usize;
                offsets.push(0);
                for &l in lengths {
                    acc += l as usize;
                    offsets.push(acc);
                }
                offsets
            }
            _ => Vec::new(),
        }
    }

    fn row_range(&self, offsets: &[usize], row: usize) -> Range<usize> {
        match &self.shape {
            RecordShape::Scalar => row..row + 1,
            RecordShape::FixedWidth { width } => row * width..(row + 1) * width,
            RecordShape::Ragged { .. } => offsets[row]..offsets[row + 1],
        }
    }
}

impl From<Column> for Records {
    fn from(values: Column) -> Self {
        Records::scalar(values)
    }
}
