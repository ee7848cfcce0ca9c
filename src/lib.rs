//! # pagesort
//!
//! A two-phase **external merge sort** for page-based collections of
//! fixed-length records: the sort used inside a database storage engine
//! when a relation does not fit in the memory it is allowed to use.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pagesort::{AttrType, Collection, DiskStore, SortConfig, SortOrder, Store, external_sort};
//!
//! let store = DiskStore::open("/tmp/pagesort").unwrap();
//!
//! // An unsorted input: 4-byte textual integer key + 12-byte payload.
//! let mut input = store.create_or_open("people", 16).unwrap();
//! input.insert(b"  42alice       ").unwrap();
//! input.insert(b"   7bob         ").unwrap();
//! input.sync().unwrap();
//! drop(input);
//!
//! let config = SortConfig::new(
//!     "people",
//!     "people.by_age",
//!     vec![AttrType::Integer, AttrType::String],
//!     vec![4, 12],
//!     0,
//!     SortOrder::Ascending,
//!     8,
//! );
//! let summary = external_sort(&store, &config).unwrap();
//! assert_eq!(summary.records, 2);
//! ```
//!
//! ## Algorithm
//!
//! - **Pass zero** fills a staging area of `buffer_pages × page_size`
//!   bytes from the input, sorts each fill in memory and writes it out as
//!   a sorted *run*.
//! - **Pass one and beyond** merge groups of up to `buffer_pages − 1`
//!   runs into one, pass after pass, until a single run remains. That run
//!   is renamed to the output collection.
//!
//! Temporary runs are named `<output>.sort.temp.<pass>.<run>`; see
//! [`temp_run_name`] and [`remove_orphaned_runs`].
//!
//! ## Guarantees
//!
//! - The output holds exactly the input's multiset of records, ordered by
//!   the configured key and direction. Ties are not kept in input order.
//! - The output is either absent or complete: it is materialized by an
//!   atomic rename of the final run, and an existing output is never
//!   overwritten.
//! - Temporary runs are removed on success and, best-effort, on failure.

pub(crate) mod encoding;
pub mod heapfile;
pub mod store;
mod sort;

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

pub use heapfile::{HeapFile, HeapFileError, HeapScan, PAGE_SIZE};
pub use sort::{
    KeyComparator, RunId, SortSummary, external_sort, parse_int_key, parse_temp_run_name,
    remove_orphaned_runs, temp_run_name,
};
pub use store::{Collection, DiskCollection, DiskStore, RecordScan, StorageError, Store};

use sort::RecordLayout;

/// Smallest number of runs a merge opens at once.
///
/// A fan-in of one could never reduce the run count.
pub const MIN_FAN_IN: usize = 2;

// ------------------------------------------------------------------------------------------------
// Field types and sort order
// ------------------------------------------------------------------------------------------------

/// Type of a record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttrType {
    /// A base-10 integer written as text, padded with spaces or NUL bytes.
    Integer,

    /// Raw bytes, compared byte-wise.
    String,
}

impl FromStr for AttrType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "int" | "integer" => Ok(Self::Integer),
            "str" | "string" => Ok(Self::String),
            _ => Err(ConfigError::UnsupportedType(s.to_string())),
        }
    }
}

/// Direction of the sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortOrder {
    /// Smallest key first.
    #[default]
    Ascending,

    /// Largest key first.
    Descending,
}

impl FromStr for SortOrder {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(Self::Ascending),
            "desc" | "descending" => Ok(Self::Descending),
            _ => Err(ConfigError::UnsupportedOrder(s.to_string())),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Configuration
// ------------------------------------------------------------------------------------------------

/// Everything one sort needs to know. Immutable once the sort starts.
///
/// The configuration is validated by [`external_sort`] before any
/// collection is touched.
///
/// # Example
///
/// ```rust
/// use pagesort::{AttrType, SortConfig, SortOrder};
///
/// let config = SortConfig::new(
///     "orders",
///     "orders.sorted",
///     vec![AttrType::String, AttrType::Integer],
///     vec![16, 8],
///     1,
///     SortOrder::Descending,
///     4,
/// );
/// assert_eq!(config.record_len(), 24);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortConfig {
    /// Name of the unsorted input collection.
    pub input: String,

    /// Name of the sorted output collection. Must not exist yet.
    pub output: String,

    /// Type of every field, by position.
    pub field_types: Vec<AttrType>,

    /// Byte size of every field, by position. Their sum is the record
    /// length.
    pub field_sizes: Vec<usize>,

    /// Position of the field to sort on.
    pub key_index: usize,

    /// Sort direction.
    pub order: SortOrder,

    /// Memory budget in pages. Must be ≥ 1.
    ///
    /// Merges open up to `buffer_pages − 1` runs, but never fewer than
    /// [`MIN_FAN_IN`]: with a budget of 1 or 2 pages each merge holds two
    /// input runs plus its output, exceeding the budget.
    pub buffer_pages: usize,
}

impl SortConfig {
    /// Builds a configuration.
    pub fn new(
        input: impl Into<String>,
        output: impl Into<String>,
        field_types: Vec<AttrType>,
        field_sizes: Vec<usize>,
        key_index: usize,
        order: SortOrder,
        buffer_pages: usize,
    ) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            field_types,
            field_sizes,
            key_index,
            order,
            buffer_pages,
        }
    }

    /// Record length: the sum of all field sizes.
    pub fn record_len(&self) -> usize {
        self.field_sizes.iter().sum()
    }

    /// Validates all parameters against the store's page geometry and
    /// derives the record layout used by every pass.
    pub(crate) fn validate<S: Store>(&self, store: &S) -> Result<RecordLayout, ConfigError> {
        if self.input.is_empty() || self.output.is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if self.input == self.output {
            return Err(ConfigError::SameInputOutput(self.input.clone()));
        }
        if parse_temp_run_name(&self.output, &self.input).is_some() {
            return Err(ConfigError::InputIsTempRun {
                input: self.input.clone(),
                output: self.output.clone(),
            });
        }
        if self.field_types.is_empty() {
            return Err(ConfigError::NoFields);
        }
        if self.field_types.len() != self.field_sizes.len() {
            return Err(ConfigError::FieldCountMismatch {
                types: self.field_types.len(),
                sizes: self.field_sizes.len(),
            });
        }
        if let Some(index) = self.field_sizes.iter().position(|&size| size == 0) {
            return Err(ConfigError::ZeroSizedField { index });
        }
        if self.key_index >= self.field_types.len() {
            return Err(ConfigError::KeyIndexOutOfRange {
                index: self.key_index,
                field_count: self.field_types.len(),
            });
        }
        if self.buffer_pages == 0 {
            return Err(ConfigError::ZeroBufferPages);
        }

        let record_len = self.record_len();
        let page_size = store.page_size();
        let buffer_bytes = self.buffer_pages.saturating_mul(page_size);
        if buffer_bytes < record_len {
            return Err(ConfigError::BufferTooSmall {
                buffer_bytes,
                record_len,
            });
        }
        if store.records_per_page(record_len) == 0 {
            return Err(ConfigError::RecordExceedsPage {
                record_len,
                page_size,
            });
        }

        let key_offset: usize = self.field_sizes[..self.key_index].iter().sum();
        let comparator = KeyComparator::new(
            key_offset,
            self.field_sizes[self.key_index],
            self.field_types[self.key_index],
            self.order,
        );

        Ok(RecordLayout {
            record_len,
            comparator,
            batch_records: buffer_bytes / record_len,
            fan_in: self.buffer_pages.saturating_sub(1).max(MIN_FAN_IN),
        })
    }
}

// ------------------------------------------------------------------------------------------------
// Error types
// ------------------------------------------------------------------------------------------------

/// A configuration problem, detected before any run is written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Input or output name is empty.
    #[error("input and output names must not be empty")]
    EmptyName,

    /// Input and output name the same collection.
    #[error("input and output are both `{0}`")]
    SameInputOutput(String),

    /// The input is named like one of the output's temporary runs and
    /// would be removed as a stale run.
    #[error("input `{input}` is a temporary run name of output `{output}`")]
    InputIsTempRun {
        /// Input collection.
        input: String,
        /// Output collection.
        output: String,
    },

    /// No fields were described.
    #[error("record must have at least one field")]
    NoFields,

    /// `field_types` and `field_sizes` disagree on the field count.
    #[error("{types} field types but {sizes} field sizes")]
    FieldCountMismatch {
        /// Number of field types.
        types: usize,
        /// Number of field sizes.
        sizes: usize,
    },

    /// A field has size zero.
    #[error("field {index} has size 0")]
    ZeroSizedField {
        /// Position of the field.
        index: usize,
    },

    /// The sort key does not name a field.
    #[error("sort key index {index} out of range for {field_count} fields")]
    KeyIndexOutOfRange {
        /// Requested key index.
        index: usize,
        /// Number of fields.
        field_count: usize,
    },

    /// The memory budget is zero pages.
    #[error("buffer_pages must be >= 1")]
    ZeroBufferPages,

    /// The memory budget cannot hold a single record.
    #[error("buffer of {buffer_bytes} bytes cannot hold one {record_len}-byte record")]
    BufferTooSmall {
        /// Budget in bytes.
        buffer_bytes: usize,
        /// Record length in bytes.
        record_len: usize,
    },

    /// A single page of the store cannot hold one record.
    #[error("a {page_size}-byte page cannot hold one {record_len}-byte record")]
    RecordExceedsPage {
        /// Record length in bytes.
        record_len: usize,
        /// Store page size in bytes.
        page_size: usize,
    },

    /// A field type tag is not one of the supported types.
    #[error("unsupported field type `{0}`")]
    UnsupportedType(String),

    /// A sort order tag is not recognized.
    #[error("unsupported sort order `{0}`")]
    UnsupportedOrder(String),

    /// The input's record length differs from the sum of field sizes.
    #[error("collection `{collection}` holds {actual}-byte records, field sizes sum to {expected}")]
    RecordLengthMismatch {
        /// Input collection.
        collection: String,
        /// Sum of the configured field sizes.
        expected: usize,
        /// Record length stored in the collection.
        actual: usize,
    },
}

/// The storage operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageOp {
    /// Opening an existing collection.
    Open,
    /// Creating a collection.
    Create,
    /// Checking whether a collection exists.
    Exists,
    /// Scanning a collection.
    Scan,
    /// Inserting a record.
    Insert,
    /// Making a collection durable.
    Sync,
    /// Deleting a collection.
    Delete,
    /// Renaming a collection.
    Rename,
    /// Listing collections.
    List,
}

impl fmt::Display for StorageOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Open => "open",
            Self::Create => "create",
            Self::Exists => "exists",
            Self::Scan => "scan",
            Self::Insert => "insert",
            Self::Sync => "sync",
            Self::Delete => "delete",
            Self::Rename => "rename",
            Self::List => "list",
        };
        f.write_str(name)
    }
}

/// Errors returned by [`external_sort`].
#[derive(Debug, Error)]
pub enum SortError {
    /// Invalid configuration parameter.
    #[error("invalid config: {0}")]
    Config(#[from] ConfigError),

    /// The output collection already exists; it is left untouched.
    #[error("output collection `{0}` already exists")]
    OutputExists(String),

    /// A storage operation failed. The sort was aborted.
    #[error("{op} failed on `{collection}`: {source}")]
    Storage {
        /// Operation that failed.
        op: StorageOp,
        /// Collection the operation targeted.
        collection: String,
        /// Underlying storage error.
        #[source]
        source: StorageError,
    },

    /// An integer sort key is not a base-10 integer.
    #[error("record {position} of `{collection}` has non-integer key {key:?}")]
    InvalidKey {
        /// Input collection.
        collection: String,
        /// Zero-based position of the record in the input scan.
        position: u64,
        /// The key bytes, lossily decoded.
        key: String,
    },

    /// Internal invariant violation.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SortError {
    /// Wraps a storage error with the operation and collection it hit.
    pub(crate) fn storage(op: StorageOp, collection: &str, source: StorageError) -> Self {
        Self::Storage {
            op,
            collection: collection.to_string(),
            source,
        }
    }
}
