//! # Record Store
//!
//! The seam between the external sort and persistent storage. The sort
//! only ever talks to storage through the [`Store`] and [`Collection`]
//! traits: it creates and opens named collections of fixed-length records,
//! inserts into them, scans them front to back, and deletes or renames
//! them when a run is consumed or becomes the final output.
//!
//! [`DiskStore`] is the implementation shipped with the crate: a directory
//! in which every collection is one [`HeapFile`](crate::heapfile::HeapFile)
//! named after the collection.

mod disk;


pub use disk::{DiskCollection, DiskStore};

use std::io;

use crate::heapfile::HeapFileError;
use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// Error type
// ------------------------------------------------------------------------------------------------

/// Errors returned by [`Store`] and [`Collection`] operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Heap file level failure (I/O, checksum, format).
    #[error("heap file error: {0}")]
    HeapFile(#[from] HeapFileError),

    /// I/O failure outside of a heap file (directory operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The named collection does not exist.
    #[error("collection `{0}` not found")]
    NotFound(String),

    /// A collection with this name already exists.
    #[error("collection `{0}` already exists")]
    AlreadyExists(String),

    /// The name cannot be used as a collection name.
    #[error("invalid collection name `{0}`")]
    InvalidName(String),

    /// An existing collection was opened with a different record length.
    #[error("collection `{name}` holds {actual}-byte records, expected {expected}")]
    RecordLength {
        /// Collection name.
        name: String,
        /// Requested record length.
        expected: usize,
        /// Record length stored in the collection.
        actual: usize,
    },
}

// ------------------------------------------------------------------------------------------------
// Traits
// ------------------------------------------------------------------------------------------------

/// A full-scan cursor: every record of a collection, in storage order.
pub type RecordScan<'a> = Box<dyn Iterator<Item = Result<Vec<u8>, StorageError>> + 'a>;

/// An open handle on one named collection of fixed-length records.
pub trait Collection {
    /// Name the collection was opened under.
    fn name(&self) -> &str;

    /// Fixed length of every record in bytes.
    fn record_len(&self) -> usize;

    /// Number of records currently in the collection.
    fn record_count(&self) -> u64;

    /// Appends one record.
    fn insert(&mut self, record: &[u8]) -> Result<(), StorageError>;

    /// Opens a full scan. Records inserted through this handle before the
    /// call are visible to the scan.
    fn scan(&mut self) -> Result<RecordScan<'_>, StorageError>;

    /// Makes every inserted record durable.
    fn sync(&mut self) -> Result<(), StorageError>;
}

/// A namespace of collections.
///
/// All methods take `&self`; handles returned by `create_or_open` and
/// `open` are owned by the caller and released on drop.
pub trait Store {
    /// Handle type for one collection.
    type Collection: Collection;

    /// Page size of the underlying storage, in bytes.
    fn page_size(&self) -> usize;

    /// Number of `record_len`-byte records one page holds. Zero if a
    /// record does not fit in a page.
    fn records_per_page(&self, record_len: usize) -> usize {
        self.page_size().checked_div(record_len).unwrap_or(0)
    }

    /// Opens the named collection, creating it empty if it does not exist.
    ///
    /// Fails with [`StorageError::RecordLength`] if the collection exists
    /// with a different record length.
    fn create_or_open(&self, name: &str, record_len: usize)
    -> Result<Self::Collection, StorageError>;

    /// Opens an existing collection.
    fn open(&self, name: &str) -> Result<Self::Collection, StorageError>;

    /// Returns whether a collection with this name exists.
    fn exists(&self, name: &str) -> Result<bool, StorageError>;

    /// Deletes the named collection.
    fn delete(&self, name: &str) -> Result<(), StorageError>;

    /// Renames a collection. Never overwrites: fails with
    /// [`StorageError::AlreadyExists`] if `to` exists.
    fn rename(&self, from: &str, to: &str) -> Result<(), StorageError>;

    /// Names of all collections, sorted.
    fn list(&self) -> Result<Vec<String>, StorageError>;
}
