//! Directory-backed [`Store`]: one heap file per collection.

use std::{
    fs::{self, File},
    io,
    path::{Path, PathBuf},
};

use tracing::{debug, info};

use super::{Collection, RecordScan, StorageError, Store};
use crate::heapfile::{self, HeapFile, PAGE_SIZE};

// ------------------------------------------------------------------------------------------------
// DiskStore
// ------------------------------------------------------------------------------------------------

/// A [`Store`] whose collections are heap files inside one directory.
///
/// The collection name is the file name, so temporary runs show up in
/// the directory under their deterministic names.
#[derive(Debug, Clone)]
pub struct DiskStore {
    dir: PathBuf,
    page_size: usize,
}

impl DiskStore {
    /// Opens (creating if needed) a store rooted at `dir` using the
    /// default [`PAGE_SIZE`].
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        Self::with_page_size(dir, PAGE_SIZE)
    }

    /// Opens a store whose newly created collections use `page_size`-byte
    /// pages.
    pub fn with_page_size(dir: impl AsRef<Path>, page_size: usize) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        info!(dir = %dir.display(), page_size, "disk store opened");
        Ok(Self { dir, page_size })
    }

    /// Root directory of the store.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_of(&self, name: &str) -> Result<PathBuf, StorageError> {
        validate_name(name)?;
        Ok(self.dir.join(name))
    }

    fn sync_dir(&self) -> Result<(), StorageError> {
        File::open(&self.dir)?.sync_all()?;
        Ok(())
    }
}

/// Collection names map to plain file names inside the store directory.
fn validate_name(name: &str) -> Result<(), StorageError> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0'])
    {
        return Err(StorageError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Maps `NotFound` I/O errors to [`StorageError::NotFound`].
fn not_found_as(name: &str, e: io::Error) -> StorageError {
    if e.kind() == io::ErrorKind::NotFound {
        StorageError::NotFound(name.to_string())
    } else {
        StorageError::Io(e)
    }
}

impl Store for DiskStore {
    type Collection = DiskCollection;

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn records_per_page(&self, record_len: usize) -> usize {
        heapfile::records_per_page(record_len, self.page_size)
    }

    fn create_or_open(
        &self,
        name: &str,
        record_len: usize,
    ) -> Result<DiskCollection, StorageError> {
        let path = self.path_of(name)?;
        let heap = if path.exists() {
            let heap = HeapFile::open(&path)?;
            if heap.record_len() != record_len {
                return Err(StorageError::RecordLength {
                    name: name.to_string(),
                    expected: record_len,
                    actual: heap.record_len(),
                });
            }
            heap
        } else {
            HeapFile::create(&path, record_len, self.page_size)?
        };
        Ok(DiskCollection {
            name: name.to_string(),
            heap,
        })
    }

    fn open(&self, name: &str) -> Result<DiskCollection, StorageError> {
        let path = self.path_of(name)?;
        if !path.exists() {
            return Err(StorageError::NotFound(name.to_string()));
        }
        Ok(DiskCollection {
            name: name.to_string(),
            heap: HeapFile::open(&path)?,
        })
    }

    fn exists(&self, name: &str) -> Result<bool, StorageError> {
        Ok(self.path_of(name)?.is_file())
    }

    fn delete(&self, name: &str) -> Result<(), StorageError> {
        let path = self.path_of(name)?;
        fs::remove_file(&path).map_err(|e| not_found_as(name, e))?;
        debug!(name, "collection deleted");
        Ok(())
    }

    fn rename(&self, from: &str, to: &str) -> Result<(), StorageError> {
        let from_path = self.path_of(from)?;
        let to_path = self.path_of(to)?;
        if to_path.exists() {
            return Err(StorageError::AlreadyExists(to.to_string()));
        }
        fs::rename(&from_path, &to_path).map_err(|e| not_found_as(from, e))?;
        self.sync_dir()?;
        debug!(from, to, "collection renamed");
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>, StorageError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

// ------------------------------------------------------------------------------------------------
// DiskCollection
// ------------------------------------------------------------------------------------------------

/// An open heap file inside a [`DiskStore`].
#[derive(Debug)]
pub struct DiskCollection {
    name: String,
    heap: HeapFile,
}

impl Collection for DiskCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn record_len(&self) -> usize {
        self.heap.record_len()
    }

    fn record_count(&self) -> u64 {
        self.heap.record_count()
    }

    fn insert(&mut self, record: &[u8]) -> Result<(), StorageError> {
        Ok(self.heap.insert(record)?)
    }

    fn scan(&mut self) -> Result<RecordScan<'_>, StorageError> {
        let scan = self.heap.scan()?;
        Ok(Box::new(scan.map(|r| r.map_err(StorageError::from))))
    }

    fn sync(&mut self) -> Result<(), StorageError> {
        Ok(self.heap.sync()?)
    }
}
