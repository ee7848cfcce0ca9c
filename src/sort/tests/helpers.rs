use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::io;
use std::rc::Rc;

use tracing_subscriber::EnvFilter;

use crate::store::{Collection, RecordScan, StorageError, Store};
use crate::{AttrType, SortConfig, SortOrder};

/// Initialize tracing subscriber controlled by `RUST_LOG` env var.
/// Safe to call multiple times; only the first call takes effect.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ------------------------------------------------------------------------------------------------
// Records
// ------------------------------------------------------------------------------------------------

/// Width of the key field in test records.
pub const KEY_LEN: usize = 8;

/// Width of the payload field in test records.
pub const PAYLOAD_LEN: usize = 8;

/// Test record length.
pub const RECORD_LEN: usize = KEY_LEN + PAYLOAD_LEN;

fn pad(text: &str, width: usize) -> Vec<u8> {
    let mut bytes = text.as_bytes().to_vec();
    assert!(bytes.len() <= width, "`{text}` wider than {width}");
    bytes.resize(width, 0);
    bytes
}

/// `[key: right-aligned decimal, 8 bytes][payload: NUL padded, 8 bytes]`
pub fn int_record(key: i64, payload: &str) -> Vec<u8> {
    let mut record = format!("{key:>width$}", width = KEY_LEN).into_bytes();
    assert_eq!(record.len(), KEY_LEN);
    record.extend(pad(payload, PAYLOAD_LEN));
    record
}

/// `[key: NUL padded, 8 bytes][payload: NUL padded, 8 bytes]`
pub fn str_record(key: &str, payload: &str) -> Vec<u8> {
    let mut record = pad(key, KEY_LEN);
    record.extend(pad(payload, PAYLOAD_LEN));
    record
}

/// Decodes the integer key of an [`int_record`].
pub fn int_key(record: &[u8]) -> i64 {
    crate::parse_int_key(&record[..KEY_LEN]).expect("integer key")
}

/// Decodes the key of a [`str_record`].
pub fn str_key(record: &[u8]) -> String {
    String::from_utf8_lossy(&record[..KEY_LEN])
        .trim_end_matches('\0')
        .to_string()
}

/// Decodes the payload of either record kind.
pub fn payload(record: &[u8]) -> String {
    String::from_utf8_lossy(&record[KEY_LEN..])
        .trim_end_matches('\0')
        .to_string()
}

/// Two-field config over the test record layout, sorting on the key.
pub fn config(key_type: AttrType, order: SortOrder, buffer_pages: usize) -> SortConfig {
    SortConfig::new(
        "input",
        "output",
        vec![key_type, AttrType::String],
        vec![KEY_LEN, PAYLOAD_LEN],
        0,
        order,
        buffer_pages,
    )
}

// ------------------------------------------------------------------------------------------------
// MemStore: in-memory store with fault injection
// ------------------------------------------------------------------------------------------------

/// Faults a [`MemStore`] injects.
#[derive(Default)]
pub struct Faults {
    /// Successful inserts left before every insert fails.
    pub inserts_before_failure: Cell<Option<u64>>,

    /// Scans of collections whose name starts with the prefix fail after
    /// yielding the given number of records.
    pub scan_failure: RefCell<Option<(String, usize)>>,

    /// Every rename fails.
    pub fail_rename: Cell<bool>,

    /// Every delete fails.
    pub fail_delete: Cell<bool>,
}

fn injected() -> StorageError {
    StorageError::Io(io::Error::other("injected fault"))
}

struct MemData {
    record_len: usize,
    records: Vec<Vec<u8>>,
}

/// A [`Store`] keeping every collection in memory.
pub struct MemStore {
    page_size: usize,
    collections: RefCell<BTreeMap<String, Rc<RefCell<MemData>>>>,
    pub faults: Rc<Faults>,
}

impl MemStore {
    pub fn new(page_size: usize) -> Self {
        init_tracing();
        Self {
            page_size,
            collections: RefCell::new(BTreeMap::new()),
            faults: Rc::new(Faults::default()),
        }
    }

    /// Creates collection `name` holding `records`.
    pub fn put(&self, name: &str, records: &[Vec<u8>]) {
        let record_len = records.first().map_or(RECORD_LEN, Vec::len);
        let mut collection = self.create_or_open(name, record_len).unwrap();
        for record in records {
            collection.insert(record).unwrap();
        }
    }

    /// All records of collection `name`, in storage order.
    pub fn records(&self, name: &str) -> Vec<Vec<u8>> {
        self.collections.borrow()[name].borrow().records.clone()
    }

    /// Names of all collections.
    pub fn names(&self) -> Vec<String> {
        self.collections.borrow().keys().cloned().collect()
    }
}

impl Store for MemStore {
    type Collection = MemCollection;

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn create_or_open(&self, name: &str, record_len: usize) -> Result<MemCollection, StorageError> {
        let data = self
            .collections
            .borrow_mut()
            .entry(name.to_string())
            .or_insert_with(|| {
                Rc::new(RefCell::new(MemData {
                    record_len,
                    records: Vec::new(),
                }))
            })
            .clone();
        let actual = data.borrow().record_len;
        if actual != record_len {
            return Err(StorageError::RecordLength {
                name: name.to_string(),
                expected: record_len,
                actual,
            });
        }
        Ok(MemCollection {
            name: name.to_string(),
            data,
            faults: Rc::clone(&self.faults),
        })
    }

    fn open(&self, name: &str) -> Result<MemCollection, StorageError> {
        let data = self
            .collections
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(name.to_string()))?;
        Ok(MemCollection {
            name: name.to_string(),
            data,
            faults: Rc::clone(&self.faults),
        })
    }

    fn exists(&self, name: &str) -> Result<bool, StorageError> {
        Ok(self.collections.borrow().contains_key(name))
    }

    fn delete(&self, name: &str) -> Result<(), StorageError> {
        if self.faults.fail_delete.get() {
            return Err(injected());
        }
        self.collections
            .borrow_mut()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(name.to_string()))
    }

    fn rename(&self, from: &str, to: &str) -> Result<(), StorageError> {
        if self.faults.fail_rename.get() {
            return Err(injected());
        }
        let mut collections = self.collections.borrow_mut();
        if collections.contains_key(to) {
            return Err(StorageError::AlreadyExists(to.to_string()));
        }
        let data = collections
            .remove(from)
            .ok_or_else(|| StorageError::NotFound(from.to_string()))?;
        collections.insert(to.to_string(), data);
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.names())
    }
}

/// Handle on a [`MemStore`] collection.
pub struct MemCollection {
    name: String,
    data: Rc<RefCell<MemData>>,
    faults: Rc<Faults>,
}

impl Collection for MemCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn record_len(&self) -> usize {
        self.data.borrow().record_len
    }

    fn record_count(&self) -> u64 {
        self.data.borrow().records.len() as u64
    }

    fn insert(&mut self, record: &[u8]) -> Result<(), StorageError> {
        if let Some(left) = self.faults.inserts_before_failure.get() {
            if left == 0 {
                return Err(injected());
            }
            self.faults.inserts_before_failure.set(Some(left - 1));
        }
        self.data.borrow_mut().records.push(record.to_vec());
        Ok(())
    }

    fn scan(&mut self) -> Result<RecordScan<'_>, StorageError> {
        let records = self.data.borrow().records.clone();
        let fail_after = match &*self.faults.scan_failure.borrow() {
            Some((prefix, after)) if self.name.starts_with(prefix.as_str()) => Some(*after),
            _ => None,
        };
        match fail_after {
            None => Ok(Box::new(records.into_iter().map(Ok))),
            Some(after) => Ok(Box::new(
                records
                    .into_iter()
                    .take(after)
                    .map(Ok)
                    .chain(std::iter::once(Err(injected()))),
            )),
        }
    }

    fn sync(&mut self) -> Result<(), StorageError> {
        Ok(())
    }
}
