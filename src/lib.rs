//! # pagestore
//!
//! A page-oriented time-series store with:
//! - Immutable, checksummed page files sharded by page id
//! - An embedded SQLite catalog of page ranges and settings
//! - Upsert merges where new data wins on equal index keys
//! - Size-based rebalancing, page splitting and soft deletes
//! - Read-only access through a consistent catalog snapshot
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Store                               │
//! │         (get / store / rebalance / split / prune)            │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │   Catalog   │          │    Pages    │
//!   │  (SQLite)   │          │ (idx / rec) │
//!   └─────────────┘          └─────────────┘
//! ```
//!
//! ## Example
//! ```no_run
//! use pagestore::{Config, Records, Store};
//!
//! let store = Store::open(Config::builder().catalog_path("/tmp/ts/catalog.db").build())?;
//! store.store_variable("temp", &vec![1i64, 2, 3].into(), &Records::scalar(vec![20.5f64, 21.0, 21.5]))?;
//! let series = store.get_range("temp", 2i64, 3i64)?;
//! assert_eq!(series.len(), 2);
//! # Ok::<(), pagestore::PageStoreError>(())
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod types;
pub mod page;
pub mod catalog;
pub mod store;
pub mod dump;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{PageStoreError, Result};
pub use config::Config;
pub use page::{shard_path, Compression, Page, PageBuilder, PageMeta};
pub use catalog::Catalog;
pub use store::{Store, StoreInfo};
pub use types::{
    Column, ElementType, IndexArray, IndexType, IndexValue, RecordLayout, RecordShape, Records,
    Series,
};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of pagestore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
