//! Typed, directional key comparison.
//!
//! A [`KeyComparator`] is a plain value: the key's byte window inside a
//! record, the key type, and the direction. Pass zero and the merge both
//! take it by reference, so every comparison in one sort sees the same
//! parameters and concurrent sorts never share state.

use std::cmp::Ordering;

use crate::{AttrType, SortOrder};

/// Orders records by one fixed-position key field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyComparator {
    offset: usize,
    len: usize,
    key_type: AttrType,
    order: SortOrder,
}

impl KeyComparator {
    /// Compares the `len` bytes at `offset` of each record as `key_type`,
    /// in `order`.
    pub fn new(offset: usize, len: usize, key_type: AttrType, order: SortOrder) -> Self {
        Self {
            offset,
            len,
            key_type,
            order,
        }
    }

    /// The key window of `record`.
    ///
    /// # Panics
    ///
    /// If `record` is shorter than `offset + len`. Records handed out by a
    /// store always have the validated record length.
    #[inline]
    pub fn key<'r>(&self, record: &'r [u8]) -> &'r [u8] {
        &record[self.offset..self.offset + self.len]
    }

    /// Whether `record`'s key can be compared by value.
    pub fn is_valid_key(&self, record: &[u8]) -> bool {
        match self.key_type {
            AttrType::Integer => parse_int_key(self.key(record)).is_some(),
            AttrType::String => true,
        }
    }

    /// Total order of two records under this comparator.
    ///
    /// Integer keys that fail to parse sort before all valid keys and
    /// among themselves byte-wise, so the order stays total.
    pub fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        let (ka, kb) = (self.key(a), self.key(b));
        let ord = match self.key_type {
            AttrType::Integer => match (parse_int_key(ka), parse_int_key(kb)) {
                (Some(x), Some(y)) => x.cmp(&y),
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (None, None) => ka.cmp(kb),
            },
            AttrType::String => ka.cmp(kb),
        };
        match self.order {
            SortOrder::Ascending => ord,
            SortOrder::Descending => ord.reverse(),
        }
    }
}

/// Parses a textual base-10 integer key.
///
/// Leading and trailing ASCII whitespace and NUL padding are ignored. An
/// optional `+` or `-` sign is accepted.
pub fn parse_int_key(bytes: &[u8]) -> Option<i64> {
    let text = std::str::from_utf8(bytes).ok()?;
    let text = text.trim_matches(|c: char| c == '\0' || c.is_ascii_whitespace());
    if text.is_empty() {
        return None;
    }
    text.parse().ok()
}
