//! Maintenance: rebalance, merge, split, prune, verify, destroy

use std::fs;
use std::time::Duration;

use crate::catalog::{now_millis, CatalogTx};
use crate::error::{PageStoreError, Result};
use crate::page::{Page, PageMeta};
use crate::types::{IndexArray, IndexValue, Records, Series};

use super::write::PageChanges;
use super::Store;

impl Store {
    // =========================================================================
    // Rebalance / Merge / Split
    // =========================================================================

    /// Rebalance every variable matching a LIKE pattern
    pub fn rebalance(&self, pattern: &str, max_page_size: u64) -> Result<()> {
        self.ensure_writable()?;
        let _write_guard = self.write_lock.lock();
        self.write_transaction(|tx, changes| {
            for variable in tx.search_variables(pattern)? {
                self.rebalance_in(tx, changes, &variable, max_page_size)?;
            }
            Ok(())
        })
    }

    /// Merge runs of small consecutive pages of one variable
    ///
    /// Walking pages in index order, a run starts at a page smaller than
    /// half of `max_page_size` and absorbs following pages until the run
    /// exceeds `max_page_size`. A trailing run is merged if it has two or
    /// more pages. `max_page_size == 0` does nothing.
    pub fn rebalance_variable(&self, variable: &str, max_page_size: u64) -> Result<()> {
        self.ensure_writable()?;
        let _write_guard = self.write_lock.lock();
        self.write_transaction(|tx, changes| {
            self.rebalance_in(tx, changes, variable, max_page_size)
        })
    }

    /// Merge the given live pages of a variable into one page
    ///
    /// The pages must be consecutive among the variable's live pages, so the
    /// result stays disjoint from its neighbours. Returns the new page.
    pub fn merge_pages(&self, variable: &str, page_ids: &[u64]) -> Result<Option<PageMeta>> {
        self.ensure_writable()?;
        let _write_guard = self.write_lock.lock();
        self.write_transaction(|tx, changes| {
            let live = tx.pages_for(variable)?;
            let pages = consecutive_pages(variable, &live, page_ids)?;
            self.merge_in(tx, changes, variable, &pages)
        })
    }

    /// Merge every live page of a variable meeting `[a, b]` into one page
    ///
    /// Unset bounds default to the variable's min/max.
    pub fn merge_range(
        &self,
        variable: &str,
        a: Option<IndexValue>,
        b: Option<IndexValue>,
    ) -> Result<Option<PageMeta>> {
        self.ensure_writable()?;
        let _write_guard = self.write_lock.lock();
        self.write_transaction(|tx, changes| {
            let live = tx.pages_for(variable)?;
            let (Some(low), Some(high)) = (live.first(), live.last()) else {
                return Ok(None);
            };
            let a = a.unwrap_or(low.index_low);
            let b = b.unwrap_or(high.index_high);
            let pages: Vec<PageMeta> = live.iter().filter(|m| m.overlaps(a, b)).cloned().collect();
            self.merge_in(tx, changes, variable, &pages)
        })
    }

    /// Split pages whose record bytes exceed `max_page_size`
    ///
    /// A page of `size` bytes and `count` records becomes
    /// `ceil(size / max_page_size)` chunks of `ceil(count / chunks)` records.
    /// Returns the number of pages that were split.
    pub fn split_pages(&self, variable: &str, max_page_size: u64) -> Result<usize> {
        self.ensure_writable()?;
        if max_page_size == 0 {
            return Err(PageStoreError::InvalidArgument(
                "max page size for split must be positive".to_string(),
            ));
        }
        let _write_guard = self.write_lock.lock();
        self.write_transaction(|tx, changes| {
            let mut split = 0;
            for meta in tx.pages_for(variable)? {
                if meta.record_size <= max_page_size {
                    continue;
                }
                let chunks = meta.record_size.div_ceil(max_page_size) as usize;
                let count = meta.count as usize;
                let step = count.div_ceil(chunks).max(1);
                if step >= count {
                    continue;
                }

                tracing::info!(
                    "Splitting page {} of {} into {} pages",
                    meta.page_id,
                    variable,
                    count.div_ceil(step)
                );
                let Series { index, records } = self.open_page(meta.clone())?.get_all()?;
                let parts: Vec<Series> = (0..count)
                    .step_by(step)
                    .map(|start| Series {
                        index: index.slice(start, start + step, 1),
                        records: records.slice(start, start + step, 1),
                    })
                    .collect();
                self.write_pages(tx, changes, variable, std::slice::from_ref(&meta), &parts)?;
                split += 1;
            }
            Ok(split)
        })
    }

    // =========================================================================
    // Deleted Pages
    // =========================================================================

    /// Remove soft-deleted pages, rows and files
    ///
    /// With `older_than`, only pages deleted at least that long ago are
    /// removed. Returns the number of pages pruned.
    pub fn prune_deleted_pages(&self, older_than: Option<Duration>) -> Result<usize> {
        self.ensure_writable()?;
        let _write_guard = self.write_lock.lock();
        self.prune_locked(older_than.unwrap_or(Duration::ZERO))
    }

    /// Check every page of a variable (or the whole store) against its
    /// checksum
    ///
    /// Returns the ids of pages that fail.
    pub fn verify(&self, variable: Option<&str>) -> Result<Vec<u64>> {
        let variables = match variable {
            Some(v) => vec![v.to_string()],
            None => self.catalog.search_variables("%")?,
        };

        let mut failed = Vec::new();
        for variable in &variables {
            for meta in self.catalog.pages_for(variable)? {
                let page = Page::open(&self.page_dir, meta);
                let ok = match page.check() {
                    Ok(ok) => ok,
                    Err(PageStoreError::MissingFile(path)) => {
                        tracing::warn!("Page {} is missing {}", page.page_id(), path.display());
                        false
                    }
                    Err(e) => return Err(e),
                };
                if !ok {
                    failed.push(page.page_id());
                }
            }
        }
        tracing::info!(
            "Verified {} variables, {} pages failed",
            variables.len(),
            failed.len()
        );
        Ok(failed)
    }

    /// Remove the whole store: page directory and catalog file
    pub fn delete(self) -> Result<()> {
        self.ensure_writable()?;
        let Store {
            config,
            catalog,
            page_dir,
            ..
        } = self;
        drop(catalog);

        if page_dir.exists() {
            fs::remove_dir_all(&page_dir)?;
        }
        if config.catalog_path.exists() {
            fs::remove_file(&config.catalog_path)?;
        }
        tracing::info!("Deleted store {}", config.catalog_path.display());
        Ok(())
    }

    // =========================================================================
    // Internal (called with write lock held)
    // =========================================================================

    pub(super) fn rebalance_in(
        &self,
        tx: &CatalogTx<'_>,
        changes: &mut PageChanges,
        variable: &str,
        max_page_size: u64,
    ) -> Result<()> {
        tracing::debug!("Rebalance {}", variable);

        let mut size = 0;
        let mut run: Vec<PageMeta> = Vec::new();
        for meta in tx.pages_for(variable)? {
            if size != 0 || meta.record_size.saturating_mul(2) < max_page_size {
                size += meta.record_size;
                run.push(meta);
                if size > max_page_size {
                    self.merge_in(tx, changes, variable, &run)?;
                    size = 0;
                    run.clear();
                }
            }
        }
        if run.len() > 1 {
            self.merge_in(tx, changes, variable, &run)?;
        }
        Ok(())
    }

    /// Concatenate consecutive pages into one (one page or none is a no-op)
    fn merge_in(
        &self,
        tx: &CatalogTx<'_>,
        changes: &mut PageChanges,
        variable: &str,
        pages: &[PageMeta],
    ) -> Result<Option<PageMeta>> {
        if pages.len() < 2 {
            return Ok(pages.first().cloned());
        }
        tracing::info!("Merging {} pages of {}", pages.len(), variable);

        let mut indexes = Vec::with_capacity(pages.len());
        let mut records = Vec::with_capacity(pages.len());
        for meta in pages {
            let part = self.open_page(meta.clone())?.get_all()?;
            indexes.push(part.index);
            records.push(part.records);
        }
        let merged = Series {
            index: IndexArray::concat(&indexes)?,
            records: Records::concat(&records)?,
        };

        let created = self.write_pages(tx, changes, variable, pages, std::slice::from_ref(&merged))?;
        Ok(created.into_iter().next())
    }

    /// Prune after a write when a retention period is configured
    pub(super) fn prune_expired_locked(&self) -> Result<()> {
        match self.config.deleted_page_retention {
            Some(retention) if self.config.keep_deleted_pages => {
                self.prune_locked(retention)?;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn prune_locked(&self, older_than: Duration) -> Result<usize> {
        let before = now_millis().saturating_sub(older_than.as_millis() as i64);
        let pruned = self.write_transaction(|tx, changes| {
            let rows = tx.deleted_before(before.saturating_add(1))?;
            for row in rows.iter() {
                tx.purge_deleted_row(row.meta.page_id)?;
                changes.discard(row.meta.clone());
            }
            Ok(rows.len())
        })?;

        if pruned > 0 {
            tracing::info!("Pruned {} deleted pages", pruned);
        }
        Ok(pruned)
    }
}

/// Pick `page_ids` out of `live`, requiring them to be neighbours
fn consecutive_pages(variable: &str, live: &[PageMeta], page_ids: &[u64]) -> Result<Vec<PageMeta>> {
    let mut positions = Vec::with_capacity(page_ids.len());
    for id in page_ids {
        let position = live.iter().position(|m| m.page_id == *id).ok_or_else(|| {
            PageStoreError::InvalidArgument(format!("page {} is not a live page of {}", id, variable))
        })?;
        positions.push(position);
    }
    positions.sort_unstable();
    positions.dedup();
    if positions.windows(2).any(|w| w[1] != w[0] + 1) {
        return Err(PageStoreError::InvalidArgument(format!(
            "pages of {} to merge are not consecutive",
            variable
        )));
    }
    Ok(positions.into_iter().map(|p| live[p].clone()).collect())
}
