//! Sorted merge of two runs
//!
//! Two-pointer upsert join on the index key. On equal keys the right-hand
//! (newer) run wins and the left-hand row is dropped.

use std::cmp::Ordering;

use crate::error::{PageStoreError, Result};
use crate::types::{IndexArray, Records, Series};

/// Merge `new` into `old`, both strictly ascending
///
/// Returns the merged series and the number of `old` rows that were replaced.
pub(crate) fn merge_sorted(old: &Series, new: &Series) -> Result<(Series, usize)> {
    let (index, picks, replaced) = match (&old.index, &new.index) {
        (IndexArray::Int64(a), IndexArray::Int64(b)) => {
            let (keys, picks, replaced) = merge_keys(a, b, i64::cmp);
            (IndexArray::Int64(keys), picks, replaced)
        }
        (IndexArray::Float64(a), IndexArray::Float64(b)) => {
            let (keys, picks, replaced) = merge_keys(a, b, f64::total_cmp);
            (IndexArray::Float64(keys), picks, replaced)
        }
        (a, b) => {
            return Err(PageStoreError::TypeMismatch(format!(
                "cannot merge {} index into {} index",
                b.index_type(),
                a.index_type()
            )))
        }
    };
    let records = Records::gather(&[&old.records, &new.records], &picks)?;
    Ok((Series { index, records }, replaced))
}

/// Returns merged keys, `(source, row)` picks (0 = left, 1 = right) and the
/// number of key collisions
fn merge_keys<T: Copy>(
    left: &[T],
    right: &[T],
    cmp: impl Fn(&T, &T) -> Ordering,
) -> (Vec<T>, Vec<(usize, usize)>, usize) {
    let mut keys = Vec::with_capacity(left.len() + right.len());
    let mut picks = Vec::with_capacity(left.len() + right.len());
    let mut replaced = 0;
    let (mut i, mut j) = (0, 0);

    while i < left.len() && j < right.len() {
        match cmp(&left[i], &right[j]) {
            Ordering::Less => {
                keys.push(left[i]);
                picks.push((0, i));
                i += 1;
            }
            Ordering::Greater => {
                keys.push(right[j]);
                picks.push((1, j));
                j += 1;
            }
            Ordering::Equal => {
                keys.push(right[j]);
                picks.push((1, j));
                replaced += 1;
                i += 1;
                j += 1;
            }
        }
    }
    for (k, &key) in left.iter().enumerate().skip(i) {
        keys.push(key);
        picks.push((0, k));
    }
    for (k, &key) in right.iter().enumerate().skip(j) {
        keys.push(key);
        picks.push((1, k));
    }

    (keys, picks, replaced)
}
