//! Runs: naming, writing, and lifecycle.
//!
//! Every run lives in the store as an ordinary collection named
//! `<output>.sort.temp.<pass>.<run>`. Operators may rely on this scheme to
//! find and remove runs left behind by a crash.
//!
//! A [`TempRun`] owns one such collection by name. Dropping it deletes
//! the collection unless it was consumed ([`TempRun::discard`]), renamed
//! ([`TempRun::rename`]) or persisted as the output
//! ([`TempRun::persist_as`]). This is what cleans up every run on every
//! error path.

use std::fmt;

use tracing::{debug, warn};

use crate::store::{Collection, Store};
use crate::{SortError, StorageOp};

// ------------------------------------------------------------------------------------------------
// Naming
// ------------------------------------------------------------------------------------------------

/// Position of a run: the pass that produced it and its index within the
/// pass. Pass 0 is run generation; passes ≥ 1 are merge passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunId {
    /// Pass number.
    pub pass: usize,
    /// Run index within the pass, from 0.
    pub run: usize,
}

impl RunId {
    /// Creates a run id.
    pub fn new(pass: usize, run: usize) -> Self {
        Self { pass, run }
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.pass, self.run)
    }
}

const TEMP_INFIX: &str = ".sort.temp.";

/// Name of a temporary run of the sort writing `output`.
///
/// Run 7 of pass 3 for output `FOO` is `FOO.sort.temp.3.7`.
pub fn temp_run_name(output: &str, id: RunId) -> String {
    format!("{output}{TEMP_INFIX}{}.{}", id.pass, id.run)
}

/// Inverse of [`temp_run_name`]: returns the run id if `name` is a
/// temporary run of `output`.
pub fn parse_temp_run_name(output: &str, name: &str) -> Option<RunId> {
    let rest = name.strip_prefix(output)?.strip_prefix(TEMP_INFIX)?;
    let (pass, run) = rest.split_once('.')?;
    if !is_decimal(pass) || !is_decimal(run) {
        return None;
    }
    Some(RunId::new(pass.parse().ok()?, run.parse().ok()?))
}

fn is_decimal(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

// ------------------------------------------------------------------------------------------------
// TempRun
// ------------------------------------------------------------------------------------------------

/// Owner of one temporary run collection.
pub(crate) struct TempRun<'s, S: Store> {
    store: &'s S,
    id: RunId,
    name: String,
    pub(super) records: u64,
    armed: bool,
}

impl<S: Store> fmt::Debug for TempRun<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TempRun")
            .field("name", &self.name)
            .field("records", &self.records)
            .field("armed", &self.armed)
            .finish_non_exhaustive()
    }
}

impl<'s, S: Store> TempRun<'s, S> {
    /// Creates the collection for run `id` and takes ownership of it.
    ///
    /// A collection already carrying the name is a leftover from an
    /// interrupted sort and is deleted first.
    pub(crate) fn create(
        store: &'s S,
        output: &str,
        id: RunId,
        record_len: usize,
    ) -> Result<(Self, S::Collection), SortError> {
        let name = temp_run_name(output, id);
        remove_stale(store, &name)?;

        let collection = store
            .create_or_open(&name, record_len)
            .map_err(|e| SortError::storage(StorageOp::Create, &name, e))?;

        let run = Self {
            store,
            id,
            name,
            records: 0,
            armed: true,
        };
        Ok((run, collection))
    }

    pub(crate) fn id(&self) -> RunId {
        self.id
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Records written to the run.
    pub(crate) fn records(&self) -> u64 {
        self.records
    }

    /// Deletes a run whose records have been merged into another.
    pub(crate) fn discard(mut self) -> Result<(), SortError> {
        self.armed = false;
        self.store
            .delete(&self.name)
            .map_err(|e| SortError::storage(StorageOp::Delete, &self.name, e))
    }

    /// Moves the run to the name of run `id` without touching its records.
    pub(crate) fn rename(mut self, output: &str, id: RunId) -> Result<Self, SortError> {
        let name = temp_run_name(output, id);
        remove_stale(self.store, &name)?;
        self.store
            .rename(&self.name, &name)
            .map_err(|e| SortError::storage(StorageOp::Rename, &self.name, e))?;
        self.armed = false;

        debug!(from = %self.name, to = %name, records = self.records, "run renamed");

        Ok(Self {
            store: self.store,
            id,
            name,
            records: self.records,
            armed: true,
        })
    }

    /// Renames the run to the final output name.
    pub(crate) fn persist_as(mut self, output: &str) -> Result<(), SortError> {
        self.store.rename(&self.name, output).map_err(|e| match e {
            crate::store::StorageError::AlreadyExists(name) => SortError::OutputExists(name),
            e => SortError::storage(StorageOp::Rename, &self.name, e),
        })?;
        self.armed = false;
        debug!(from = %self.name, to = output, records = self.records, "final run persisted");
        Ok(())
    }
}

impl<S: Store> Drop for TempRun<'_, S> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match self.store.delete(&self.name) {
            Ok(()) => debug!(name = %self.name, "abandoned run removed"),
            Err(e) => warn!(name = %self.name, %e, "failed to remove abandoned run"),
        }
    }
}

/// Deletes a leftover collection occupying a run name.
fn remove_stale<S: Store>(store: &S, name: &str) -> Result<(), SortError> {
    let exists = store
        .exists(name)
        .map_err(|e| SortError::storage(StorageOp::Exists, name, e))?;
    if exists {
        warn!(name, "removing stale temporary run");
        store
            .delete(name)
            .map_err(|e| SortError::storage(StorageOp::Delete, name, e))?;
    }
    Ok(())
}

// ------------------------------------------------------------------------------------------------
// RunWriter
// ------------------------------------------------------------------------------------------------

/// Writes an already-ordered batch of records as a new run.
pub(crate) struct RunWriter<'s, S: Store> {
    store: &'s S,
    output: &'s str,
    record_len: usize,
}

impl<'s, S: Store> RunWriter<'s, S> {
    pub(crate) fn new(store: &'s S, output: &'s str, record_len: usize) -> Self {
        Self {
            store,
            output,
            record_len,
        }
    }

    /// Creates run `id` and inserts `records` in the given order.
    pub(crate) fn write<'r>(
        &self,
        id: RunId,
        records: impl IntoIterator<Item = &'r [u8]>,
    ) -> Result<TempRun<'s, S>, SortError> {
        let (mut run, mut collection) =
            TempRun::create(self.store, self.output, id, self.record_len)?;

        for record in records {
            collection
                .insert(record)
                .map_err(|e| SortError::storage(StorageOp::Insert, &run.name, e))?;
            run.records += 1;
        }
        collection
            .sync()
            .map_err(|e| SortError::storage(StorageOp::Sync, &run.name, e))?;

        debug!(run = %run.name, records = run.records, "run written");
        Ok(run)
    }
}
