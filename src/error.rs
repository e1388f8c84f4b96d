//! Error types for the page store
//!
//! Provides a unified error type for all operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using PageStoreError
pub type Result<T> = std::result::Result<T, PageStoreError>;

/// Unified error type for page store operations
#[derive(Debug, Error)]
pub enum PageStoreError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Missing page file: {}", .0.display())]
    MissingFile(PathBuf),

    // -------------------------------------------------------------------------
    // Catalog Errors
    // -------------------------------------------------------------------------
    #[error("Catalog error: {0}")]
    Catalog(#[from] rusqlite::Error),

    #[error("Store is opened read-only")]
    ReadOnly,

    // -------------------------------------------------------------------------
    // Input Errors
    // -------------------------------------------------------------------------
    #[error("Empty input: a page needs at least one record")]
    EmptyInput,

    #[error("idx,rec length mismatch {index}!={records}")]
    LengthMismatch { index: usize, records: usize },

    #[error("Index not strictly ascending at position {position}")]
    UnsortedInput { position: usize },

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // -------------------------------------------------------------------------
    // Page Errors
    // -------------------------------------------------------------------------
    #[error("Corrupt page {page_id}: {reason}")]
    CorruptPage { page_id: u64, reason: String },

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PageStoreError {
    pub(crate) fn corrupt(page_id: u64, reason: impl Into<String>) -> Self {
        PageStoreError::CorruptPage {
            page_id,
            reason: reason.into(),
        }
    }
}

impl From<bincode::Error> for PageStoreError {
    fn from(e: bincode::Error) -> Self {
        PageStoreError::Serialization(e.to_string())
    }
}
