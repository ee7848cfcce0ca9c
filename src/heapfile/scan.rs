//! Full-scan cursor over a heap file.
//!
//! [`HeapScan`] walks a memory-mapped heap file one page at a time.
//! Each page's checksum is verified when the cursor first enters it, so
//! at most one page is being validated at any moment and corruption is
//! reported at the page where it occurs.

use std::marker::PhantomData;

use memmap2::Mmap;
use tracing::error;

use super::{
    HEAP_DATA_START, HeapFile, HeapFileError, PAGE_SLOT_COUNT_SIZE, page_checksum,
    page_slot_count, stored_page_checksum,
};

/// Iterator over every record of a heap file, in insertion order.
///
/// Yields owned record copies. After the first error the scan is
/// finished and only returns `None`.
pub struct HeapScan<'a> {
    mmap: Mmap,
    record_len: usize,
    page_size: usize,
    records_per_page: usize,

    /// Number of whole pages visible in the map.
    page_count: u64,

    /// Next page to enter.
    next_page: u64,

    /// Byte offset of the page currently being read.
    page_start: usize,

    /// Slot count of the current page.
    slots: usize,

    /// Next slot to yield from the current page.
    slot: usize,

    failed: bool,

    /// Ties the scan to the mutable borrow of its [`HeapFile`].
    _marker: PhantomData<&'a mut HeapFile>,
}

impl HeapScan<'_> {
    pub(crate) fn new(
        mmap: Mmap,
        record_len: usize,
        page_size: usize,
        records_per_page: usize,
    ) -> Self {
        let data_len = mmap.len().saturating_sub(HEAP_DATA_START);
        let page_count = (data_len / page_size) as u64;
        Self {
            mmap,
            record_len,
            page_size,
            records_per_page,
            page_count,
            next_page: 0,
            page_start: HEAP_DATA_START,
            slots: 0,
            slot: 0,
            failed: false,
            _marker: PhantomData,
        }
    }

    /// Moves to the next page, verifying it. Returns `Ok(false)` when no
    /// pages remain.
    fn enter_next_page(&mut self) -> Result<bool, HeapFileError> {
        if self.next_page >= self.page_count {
            return Ok(false);
        }

        let page = self.next_page;
        let start = HEAP_DATA_START + page as usize * self.page_size;
        let bytes = &self.mmap[start..start + self.page_size];

        if page_checksum(bytes) != stored_page_checksum(bytes) {
            error!(page, "heap page checksum mismatch");
            return Err(HeapFileError::ChecksumMismatch { page });
        }

        let slots = page_slot_count(bytes);
        if slots > self.records_per_page {
            return Err(HeapFileError::CorruptPage {
                page,
                reason: format!(
                    "slot count {slots} exceeds capacity {}",
                    self.records_per_page
                ),
            });
        }

        self.page_start = start;
        self.slots = slots;
        self.slot = 0;
        self.next_page += 1;
        Ok(true)
    }
}

impl Iterator for HeapScan<'_> {
    type Item = Result<Vec<u8>, HeapFileError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        while self.slot >= self.slots {
            match self.enter_next_page() {
                Ok(true) => {}
                Ok(false) => return None,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }

        let start = self.page_start + PAGE_SLOT_COUNT_SIZE + self.slot * self.record_len;
        self.slot += 1;
        Some(Ok(self.mmap[start..start + self.record_len].to_vec()))
    }
}
