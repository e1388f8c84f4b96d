//! Write path: store, merge, replace, delete

use std::collections::BTreeMap;

use crate::catalog::CatalogTx;
use crate::error::{PageStoreError, Result};
use crate::page::{Page, PageMeta};
use crate::types::{IndexArray, Records, Series};

use super::merge::merge_sorted;
use super::Store;

/// Page files touched by one catalog transaction
#[derive(Debug, Default)]
pub(super) struct PageChanges {
    /// Built during the transaction; removed again if it rolls back
    created: Vec<PageMeta>,
    /// No longer referenced by any row once the transaction commits
    obsolete: Vec<PageMeta>,
}

impl PageChanges {
    pub(super) fn discard(&mut self, meta: PageMeta) {
        self.obsolete.push(meta);
    }
}

impl Store {
    /// Store one variable's data, merging into existing pages
    ///
    /// Steps:
    /// 1. Validate: lengths match, no NaN, index strictly ascending
    /// 2. Acquire write lock and open an IMMEDIATE catalog transaction
    /// 3. Check index and record types against the stored pages
    /// 4. Merge into each overlapping page (new values win on equal keys)
    /// 5. Write the remainder past the last page as a new page
    /// 6. Rebalance the variable and commit
    /// 7. Prune expired soft deletes
    ///
    /// Pages are read and replaced under one catalog lock, so concurrent
    /// writers on other handles or processes never merge into stale pages.
    /// Empty input is a no-op.
    pub fn store_variable(&self, variable: &str, index: &IndexArray, records: &Records) -> Result<()> {
        self.ensure_writable()?;

        // Step 1: Validate
        let count = index.len();
        if count != records.len() {
            return Err(PageStoreError::LengthMismatch {
                index: count,
                records: records.len(),
            });
        }
        let (Some(first), Some(last)) = (index.first(), index.last()) else {
            return Ok(());
        };
        if let Some(position) = index.first_nan() {
            return Err(PageStoreError::InvalidArgument(format!(
                "index value at position {} is NaN",
                position
            )));
        }
        if let Some(position) = index.first_unsorted() {
            return Err(PageStoreError::UnsortedInput { position });
        }

        // Step 2: Serialize writers
        let _write_guard = self.write_lock.lock();
        self.write_transaction(|tx, changes| {
            let live = tx.pages_for(variable)?;

            // Step 3: Types
            if let Some(stored) = live.first() {
                if stored.index_type != index.index_type() {
                    return Err(PageStoreError::TypeMismatch(format!(
                        "{} has a {} index, got {}",
                        variable,
                        stored.index_type,
                        index.index_type()
                    )));
                }
                if stored.record_type != records.element_type() {
                    return Err(PageStoreError::TypeMismatch(format!(
                        "{} has {} records, got {}",
                        variable,
                        stored.record_type,
                        records.element_type()
                    )));
                }
            }

            // Step 4: Merge into overlapping pages
            let mut start = 0;
            for meta in live.iter().filter(|m| m.overlaps(first, last)) {
                let Some(head) = index.get(start) else {
                    break;
                };
                if head > meta.index_high {
                    continue;
                }
                let cut = index.search_right(meta.index_high);
                let incoming = Series {
                    index: index.slice(start, cut, 1),
                    records: records.slice(start, cut, 1),
                };
                self.merge_page(tx, changes, variable, meta, &incoming)?;
                start = cut;
            }

            // Step 5: Tail page
            if start < count {
                let tail = Series {
                    index: index.slice(start, count, 1),
                    records: records.slice(start, count, 1),
                };
                self.write_pages(tx, changes, variable, &[], std::slice::from_ref(&tail))?;
            }

            // Step 6: Rebalance
            if self.max_page_size > 0 {
                self.rebalance_in(tx, changes, variable, self.max_page_size)?;
            }
            Ok(())
        })?;

        // Step 7: Retention
        self.prune_expired_locked()?;
        Ok(())
    }

    /// Store several variables, one after another
    pub fn store(&self, data: &BTreeMap<String, Series>) -> Result<()> {
        for (variable, series) in data {
            self.store_variable(variable, &series.index, &series.records)?;
        }
        Ok(())
    }

    /// Retire every live page of a variable
    ///
    /// Returns the number of pages retired.
    pub fn delete_variable(&self, variable: &str) -> Result<usize> {
        self.ensure_writable()?;
        let _write_guard = self.write_lock.lock();

        let retired = self.write_transaction(|tx, changes| {
            let pages = tx.pages_for(variable)?;
            self.write_pages(tx, changes, variable, &pages, &[])?;
            Ok(pages.len())
        })?;
        tracing::info!("Deleted variable {} ({} pages)", variable, retired);
        Ok(retired)
    }

    // =========================================================================
    // Internal (called with write lock held)
    // =========================================================================

    /// Run `f` inside one IMMEDIATE catalog transaction
    ///
    /// `f` must reach the catalog only through the `CatalogTx` it is handed.
    /// On rollback the page files it built are removed; on commit the files of
    /// the pages it discarded are removed.
    pub(super) fn write_transaction<T>(
        &self,
        f: impl FnOnce(&CatalogTx<'_>, &mut PageChanges) -> Result<T>,
    ) -> Result<T> {
        let mut changes = PageChanges::default();
        match self.catalog.transaction(|tx| f(tx, &mut changes)) {
            Ok(out) => {
                self.remove_files(&changes.obsolete);
                Ok(out)
            }
            Err(e) => {
                self.remove_files(&changes.created);
                Err(e)
            }
        }
    }

    /// Write `new` as fresh pages and retire `old`
    pub(super) fn write_pages(
        &self,
        tx: &CatalogTx<'_>,
        changes: &mut PageChanges,
        variable: &str,
        old: &[PageMeta],
        new: &[Series],
    ) -> Result<Vec<PageMeta>> {
        let keep = self.config.keep_deleted_pages;

        let mut created = Vec::with_capacity(new.len());
        for series in new {
            let page_id = tx.next_page_id()?;
            let page = Page::build_from_arrays(
                &series.index,
                &series.records,
                &self.page_dir,
                page_id,
                self.config.compression,
            )?;
            changes.created.push(page.meta().clone());
            tx.insert_page_row(variable, page.meta())?;
            created.push(page.meta().clone());
        }
        for meta in old {
            tx.soft_or_hard_delete_row(meta.page_id, keep)?;
            if !keep {
                changes.discard(meta.clone());
            }
        }
        Ok(created)
    }

    /// Merge incoming rows into one page and swap it for the result
    fn merge_page(
        &self,
        tx: &CatalogTx<'_>,
        changes: &mut PageChanges,
        variable: &str,
        meta: &PageMeta,
        incoming: &Series,
    ) -> Result<()> {
        let existing = self.open_page(meta.clone())?.get_all()?;
        let (merged, replaced) = merge_sorted(&existing, incoming)?;
        tracing::debug!(
            "Merging {} records into page {} of {} ({} replaced)",
            incoming.len(),
            meta.page_id,
            variable,
            replaced
        );
        self.write_pages(
            tx,
            changes,
            variable,
            std::slice::from_ref(meta),
            std::slice::from_ref(&merged),
        )?;
        Ok(())
    }

    fn remove_files(&self, pages: &[PageMeta]) {
        for meta in pages {
            if let Err(e) = Page::open(&self.page_dir, meta.clone()).delete() {
                tracing::warn!("Could not remove files of page {}: {}", meta.page_id, e);
            }
        }
    }
}
