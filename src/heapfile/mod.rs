//! Heap File Module
//!
//! This module implements an **unordered**, **page-based**, **disk-backed** collection of
//! fixed-length records. It is the storage primitive underneath the external sort: unsorted
//! input, every temporary run, and the sorted output are all heap files.
//!
//! ## Design Overview
//!
//! A heap file stores records of one fixed length, packed into fixed-size pages in insertion
//! order. Records are opaque byte strings; the file never interprets them. Inserts append to
//! an in-memory **tail page** which is written out when it fills up (or on [`HeapFile::sync`]);
//! full scans memory-map the file and walk it page by page.
//!
//! Each page carries a CRC32 checksum over its contents, verified on every scan, so a torn or
//! corrupted page surfaces as an error rather than as garbage records.
//!
//! # On-disk layout
//!
//! ```text
//! [MAGIC "HEAP"][VERSION u32][RECORD_LEN u32][PAGE_SIZE u32][HEADER_CRC32 u32]
//! [SLOT_COUNT u16][RECORD_0][RECORD_1]...[ZERO PADDING][PAGE_CRC32 u32]   <- page 0
//! [SLOT_COUNT u16][RECORD_0][RECORD_1]...[ZERO PADDING][PAGE_CRC32 u32]   <- page 1
//! ...
//! ```
//!
//! - **Header** — [`HeapFileHeader`] followed by a CRC32 over its encoded bytes.
//! - **Page** — exactly `page_size` bytes. The page CRC covers every byte before it.
//!   Every page except the last holds [`HeapFile::records_per_page`] records.
//!
//! # Sub-modules
//!
//! - [`scan`] — [`HeapScan`], the full-scan cursor.
//!
//! # Concurrency model
//!
//! A [`HeapFile`] handle is owned by exactly one caller; mutation requires `&mut self`.
//! Nothing here is shared across threads.

// ------------------------------------------------------------------------------------------------
// Sub-modules
// ------------------------------------------------------------------------------------------------

pub mod scan;


pub use scan::HeapScan;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::{
    fs::{File, OpenOptions},
    io::{self, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use crate::encoding::{self, Decode, Encode, EncodingError};
use crc32fast::Hasher as Crc32;
use memmap2::Mmap;
use thiserror::Error;
use tracing::{error, info, trace};

// ------------------------------------------------------------------------------------------------
// Constants
// ------------------------------------------------------------------------------------------------

/// Default page size in bytes.
pub const PAGE_SIZE: usize = 1024;

const HEAP_HDR_MAGIC: [u8; 4] = *b"HEAP";
const HEAP_HDR_VERSION: u32 = 1;
const HEAP_HDR_SIZE: usize = 16;
const HEAP_HDR_CRC_SIZE: usize = 4;

/// Byte offset of page 0.
pub(crate) const HEAP_DATA_START: usize = HEAP_HDR_SIZE + HEAP_HDR_CRC_SIZE;

pub(crate) const PAGE_SLOT_COUNT_SIZE: usize = 2;
pub(crate) const PAGE_CRC_SIZE: usize = 4;

/// Bytes of every page not available for records.
pub const PAGE_OVERHEAD: usize = PAGE_SLOT_COUNT_SIZE + PAGE_CRC_SIZE;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by heap file operations.
#[derive(Debug, Error)]
pub enum HeapFileError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Header encoding / decoding error.
    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// A page failed checksum verification.
    #[error("Checksum mismatch in page {page}")]
    ChecksumMismatch {
        /// Zero-based index of the corrupted page.
        page: u64,
    },

    /// The file header (or the file's overall shape) is invalid.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// A page claims more records than it can hold.
    #[error("Corrupt page {page}: {reason}")]
    CorruptPage {
        /// Zero-based index of the page.
        page: u64,
        /// What was wrong.
        reason: String,
    },

    /// An inserted record does not have the file's record length.
    #[error("Record length mismatch (expected {expected} bytes, got {actual})")]
    RecordLength {
        /// The file's fixed record length.
        expected: usize,
        /// Length of the rejected record.
        actual: usize,
    },

    /// A record of this length cannot fit in a single page.
    #[error("Record of {record_len} bytes does not fit in a {page_size}-byte page")]
    RecordTooLarge {
        /// Requested record length.
        record_len: usize,
        /// Requested page size.
        page_size: usize,
    },
}

// ------------------------------------------------------------------------------------------------
// Header
// ------------------------------------------------------------------------------------------------

/// Heap file header, written at the start of every heap file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapFileHeader {
    /// Magic bytes identifying the format (`b"HEAP"`).
    pub magic: [u8; 4],

    /// Format version.
    pub version: u32,

    /// Fixed length of every record in bytes.
    pub record_len: u32,

    /// Size of every page in bytes.
    pub page_size: u32,
}

impl Encode for HeapFileHeader {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.magic.encode_to(buf)?;
        self.version.encode_to(buf)?;
        self.record_len.encode_to(buf)?;
        self.page_size.encode_to(buf)?;
        Ok(())
    }
}

impl Decode for HeapFileHeader {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut off = 0;
        let (magic, n) = <[u8; 4]>::decode_from(&buf[off..])?;
        off += n;
        let (version, n) = u32::decode_from(&buf[off..])?;
        off += n;
        let (record_len, n) = u32::decode_from(&buf[off..])?;
        off += n;
        let (page_size, n) = u32::decode_from(&buf[off..])?;
        off += n;
        Ok((
            Self {
                magic,
                version,
                record_len,
                page_size,
            },
            off,
        ))
    }
}

// ------------------------------------------------------------------------------------------------
// Page helpers
// ------------------------------------------------------------------------------------------------

/// CRC32 over every byte of `page` except the trailing checksum.
pub(crate) fn page_checksum(page: &[u8]) -> u32 {
    let mut hasher = Crc32::new();
    hasher.update(&page[..page.len() - PAGE_CRC_SIZE]);
    hasher.finalize()
}

/// Returns the checksum stored in the last four bytes of `page`.
pub(crate) fn stored_page_checksum(page: &[u8]) -> u32 {
    let mut bytes = [0u8; PAGE_CRC_SIZE];
    bytes.copy_from_slice(&page[page.len() - PAGE_CRC_SIZE..]);
    u32::from_le_bytes(bytes)
}

/// Reads the slot count of a page.
pub(crate) fn page_slot_count(page: &[u8]) -> usize {
    u16::from_le_bytes([page[0], page[1]]) as usize
}

/// Number of records of `record_len` bytes that fit into a page.
pub fn records_per_page(record_len: usize, page_size: usize) -> usize {
    if record_len == 0 || page_size <= PAGE_OVERHEAD {
        return 0;
    }
    ((page_size - PAGE_OVERHEAD) / record_len).min(u16::MAX as usize)
}

// ------------------------------------------------------------------------------------------------
// HeapFile
// ------------------------------------------------------------------------------------------------

/// A page-based, append-only collection of fixed-length records.
///
/// See the [module-level documentation](self) for the file format.
#[derive(Debug)]
pub struct HeapFile {
    /// Read/write handle on the file.
    file: File,

    /// Path of the file on disk.
    path: PathBuf,

    /// Fixed record length in bytes.
    record_len: usize,

    /// Page size in bytes.
    page_size: usize,

    /// Capacity of a page in records.
    records_per_page: usize,

    /// In-memory image of the last (possibly partial) page.
    tail: Vec<u8>,

    /// Page index the tail image belongs to.
    tail_page: u64,

    /// Records currently held in the tail page.
    tail_count: usize,

    /// Whether the tail page has records not yet written to the file.
    tail_dirty: bool,

    /// Total number of records in the file.
    record_count: u64,
}

impl HeapFile {
    /// Creates a new, empty heap file at `path`.
    ///
    /// Fails if the file already exists.
    pub fn create(
        path: impl AsRef<Path>,
        record_len: usize,
        page_size: usize,
    ) -> Result<Self, HeapFileError> {
        let path = path.as_ref();
        let per_page = records_per_page(record_len, page_size);
        if per_page == 0 || page_size > u32::MAX as usize {
            return Err(HeapFileError::RecordTooLarge {
                record_len,
                page_size,
            });
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        let header = HeapFileHeader {
            magic: HEAP_HDR_MAGIC,
            version: HEAP_HDR_VERSION,
            record_len: record_len as u32,
            page_size: page_size as u32,
        };
        let header_bytes = encoding::encode_to_vec(&header)?;
        let mut hasher = Crc32::new();
        hasher.update(&header_bytes);
        let checksum = hasher.finalize();

        file.write_all(&header_bytes)?;
        file.write_all(&checksum.to_le_bytes())?;
        file.sync_all()?;

        info!(path = %path.display(), record_len, page_size, "heap file created");

        Ok(Self {
            file,
            path: path.to_path_buf(),
            record_len,
            page_size,
            records_per_page: per_page,
            tail: vec![0u8; page_size],
            tail_page: 0,
            tail_count: 0,
            tail_dirty: false,
            record_count: 0,
        })
    }

    /// Opens an existing heap file, validating its header and last page.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, HeapFileError> {
        let path = path.as_ref();
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;

        let file_len = file.metadata()?.len() as usize;
        if file_len < HEAP_DATA_START {
            return Err(HeapFileError::InvalidHeader(format!(
                "file too short ({file_len} bytes)"
            )));
        }

        let mut header_bytes = [0u8; HEAP_HDR_SIZE];
        file.read_exact(&mut header_bytes)?;
        let mut checksum_bytes = [0u8; HEAP_HDR_CRC_SIZE];
        file.read_exact(&mut checksum_bytes)?;

        let mut hasher = Crc32::new();
        hasher.update(&header_bytes);
        if hasher.finalize() != u32::from_le_bytes(checksum_bytes) {
            return Err(HeapFileError::InvalidHeader(
                "header checksum mismatch".into(),
            ));
        }

        let (header, _) = encoding::decode_from_slice::<HeapFileHeader>(&header_bytes)?;
        if header.magic != HEAP_HDR_MAGIC {
            return Err(HeapFileError::InvalidHeader("bad magic".into()));
        }
        if header.version != HEAP_HDR_VERSION {
            return Err(HeapFileError::InvalidHeader(format!(
                "unsupported version {}",
                header.version
            )));
        }

        let record_len = header.record_len as usize;
        let page_size = header.page_size as usize;
        let per_page = records_per_page(record_len, page_size);
        if per_page == 0 {
            return Err(HeapFileError::InvalidHeader(format!(
                "record length {record_len} incompatible with page size {page_size}"
            )));
        }

        let data_len = file_len - HEAP_DATA_START;
        if data_len % page_size != 0 {
            return Err(HeapFileError::InvalidHeader(format!(
                "data region of {data_len} bytes is not a whole number of {page_size}-byte pages"
            )));
        }
        let page_count = (data_len / page_size) as u64;

        let mut heap = Self {
            file,
            path: path.to_path_buf(),
            record_len,
            page_size,
            records_per_page: per_page,
            tail: vec![0u8; page_size],
            tail_page: 0,
            tail_count: 0,
            tail_dirty: false,
            record_count: 0,
        };

        if page_count > 0 {
            let last = page_count - 1;
            let mut page = vec![0u8; page_size];
            heap.file.seek(SeekFrom::Start(heap.page_offset(last)))?;
            heap.file.read_exact(&mut page)?;

            if page_checksum(&page) != stored_page_checksum(&page) {
                return Err(HeapFileError::ChecksumMismatch { page: last });
            }
            let count = page_slot_count(&page);
            if count > per_page {
                return Err(HeapFileError::CorruptPage {
                    page: last,
                    reason: format!("slot count {count} exceeds capacity {per_page}"),
                });
            }

            heap.record_count = last * per_page as u64 + count as u64;
            if count < per_page {
                heap.tail = page;
                heap.tail_page = last;
                heap.tail_count = count;
            } else {
                heap.tail_page = page_count;
            }
        }

        info!(
            path = %path.display(),
            record_len,
            page_size,
            page_count,
            record_count = heap.record_count,
            "heap file opened"
        );

        Ok(heap)
    }

    /// Appends one record.
    ///
    /// The record lands in the in-memory tail page; the page is written to
    /// the file as soon as it is full. Call [`HeapFile::sync`] to persist a
    /// partial tail page.
    pub fn insert(&mut self, record: &[u8]) -> Result<(), HeapFileError> {
        if record.len() != self.record_len {
            return Err(HeapFileError::RecordLength {
                expected: self.record_len,
                actual: record.len(),
            });
        }

        let start = PAGE_SLOT_COUNT_SIZE + self.tail_count * self.record_len;
        self.tail[start..start + self.record_len].copy_from_slice(record);
        self.tail_count += 1;
        self.tail_dirty = true;
        self.record_count += 1;

        if self.tail_count == self.records_per_page {
            self.write_tail()?;
            self.tail_page += 1;
            self.tail_count = 0;
            self.tail.fill(0);
        }
        Ok(())
    }

    /// Writes any buffered tail page to the file without an fsync.
    pub fn flush(&mut self) -> Result<(), HeapFileError> {
        if self.tail_dirty {
            self.write_tail()?;
        }
        Ok(())
    }

    /// Writes any buffered tail page and fsyncs the file.
    pub fn sync(&mut self) -> Result<(), HeapFileError> {
        self.flush()?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Opens a full scan over every record, in insertion order.
    ///
    /// Buffered records are flushed first so the scan sees all of them.
    pub fn scan(&mut self) -> Result<HeapScan<'_>, HeapFileError> {
        self.flush()?;

        // SAFETY: the map is read-only and this handle is the file's only
        // writer. The returned scan keeps `self` mutably borrowed, so no
        // insert can rewrite a page while the map is alive.
        let mmap = unsafe { Mmap::map(&self.file)? };

        Ok(HeapScan::new(
            mmap,
            self.record_len,
            self.page_size,
            self.records_per_page,
        ))
    }

    /// Total number of records in the file, including buffered ones.
    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    /// Fixed record length in bytes.
    pub fn record_len(&self) -> usize {
        self.record_len
    }

    /// Page size in bytes.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of records per page.
    pub fn records_per_page(&self) -> usize {
        self.records_per_page
    }

    /// Path of the file on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn page_offset(&self, page: u64) -> u64 {
        HEAP_DATA_START as u64 + page * self.page_size as u64
    }

    /// Stamps slot count and checksum into the tail image and writes it.
    fn write_tail(&mut self) -> Result<(), HeapFileError> {
        let count = self.tail_count as u16;
        self.tail[..PAGE_SLOT_COUNT_SIZE].copy_from_slice(&count.to_le_bytes());
        let checksum = page_checksum(&self.tail);
        let crc_at = self.page_size - PAGE_CRC_SIZE;
        self.tail[crc_at..].copy_from_slice(&checksum.to_le_bytes());

        let offset = self.page_offset(self.tail_page);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&self.tail)?;
        self.tail_dirty = false;

        trace!(
            path = %self.path.display(),
            page = self.tail_page,
            slots = self.tail_count,
            "heap page written"
        );
        Ok(())
    }
}

impl Drop for HeapFile {
    fn drop(&mut self) {
        if self.tail_dirty {
            if let Err(e) = self.write_tail() {
                error!(path = %self.path.display(), %e, "failed to write tail page on drop");
            }
        }
    }
}
