//! K-way merge of sorted runs.
//!
//! [`MergeFrontier`] keeps exactly one pending record per run that still
//! has records, in a binary heap ordered by the key comparator. Equal
//! keys are broken by source index, lowest first, so a merge is fully
//! deterministic. Each pop emits the smallest pending record and refills
//! the frontier from the same source.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use tracing::{debug, trace};

use super::comparator::KeyComparator;
use super::run::{RunId, TempRun};
use super::RecordLayout;
use crate::store::{Collection, RecordScan, Store};
use crate::{SortError, StorageOp};

// ------------------------------------------------------------------------------------------------
// MergeFrontier
// ------------------------------------------------------------------------------------------------

struct FrontierEntry<'c> {
    record: Vec<u8>,
    source: usize,
    comparator: &'c KeyComparator,
}

impl Ord for FrontierEntry<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap: reverse so the smallest key, then lowest source, pops first.
        self.comparator
            .compare(&self.record, &other.record)
            .then_with(|| self.source.cmp(&other.source))
            .reverse()
    }
}

impl PartialOrd for FrontierEntry<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for FrontierEntry<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FrontierEntry<'_> {}

/// The next unread record of every open run.
pub(crate) struct MergeFrontier<'a, 'c> {
    cursors: Vec<RecordScan<'a>>,
    names: Vec<String>,
    heap: BinaryHeap<FrontierEntry<'c>>,
    comparator: &'c KeyComparator,
}

impl<'a, 'c> MergeFrontier<'a, 'c> {
    /// Primes the frontier with the first record of every cursor.
    /// `names[i]` labels errors from `cursors[i]`.
    pub(crate) fn new(
        cursors: Vec<RecordScan<'a>>,
        names: Vec<String>,
        comparator: &'c KeyComparator,
    ) -> Result<Self, SortError> {
        let mut frontier = Self {
            heap: BinaryHeap::with_capacity(cursors.len()),
            cursors,
            names,
            comparator,
        };
        for source in 0..frontier.cursors.len() {
            frontier.advance(source)?;
        }
        Ok(frontier)
    }

    /// Number of runs that still have a pending record.
    pub(crate) fn open_runs(&self) -> usize {
        self.heap.len()
    }

    /// Removes and returns the smallest pending record.
    pub(crate) fn pop(&mut self) -> Result<Option<Vec<u8>>, SortError> {
        let Some(entry) = self.heap.pop() else {
            return Ok(None);
        };
        self.advance(entry.source)?;
        Ok(Some(entry.record))
    }

    /// Reads the next record of `source` into the frontier.
    fn advance(&mut self, source: usize) -> Result<(), SortError> {
        match self.cursors[source].next() {
            Some(Ok(record)) => {
                self.heap.push(FrontierEntry {
                    record,
                    source,
                    comparator: self.comparator,
                });
                Ok(())
            }
            Some(Err(e)) => Err(SortError::storage(
                StorageOp::Scan,
                &self.names[source],
                e,
            )),
            None => {
                trace!(run = %self.names[source], "merge: run exhausted");
                Ok(())
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Merge of one group
// ------------------------------------------------------------------------------------------------

/// Merges `sources` into the new run `dest`, consuming them.
///
/// A single source is renamed rather than copied. On success every source
/// is deleted; on failure the partial destination is deleted and the
/// error returned.
pub(crate) fn merge_runs<'s, S: Store>(
    store: &'s S,
    output: &str,
    sources: Vec<TempRun<'s, S>>,
    dest: RunId,
    layout: &RecordLayout,
) -> Result<TempRun<'s, S>, SortError> {
    if sources.is_empty() || sources.len() > layout.fan_in {
        return Err(SortError::Internal(format!(
            "merge of {} runs with fan-in {}",
            sources.len(),
            layout.fan_in
        )));
    }

    if sources.len() == 1 {
        let mut sources = sources;
        return match sources.pop() {
            Some(run) => run.rename(output, dest),
            None => Err(SortError::Internal("empty merge group".into())),
        };
    }

    let expected: u64 = sources.iter().map(TempRun::records).sum();
    let source_ids: Vec<RunId> = sources.iter().map(TempRun::id).collect();

    let mut handles = Vec::with_capacity(sources.len());
    for run in &sources {
        let handle = store
            .open(run.name())
            .map_err(|e| SortError::storage(StorageOp::Open, run.name(), e))?;
        handles.push(handle);
    }

    let (mut merged, mut collection) = TempRun::create(store, output, dest, layout.record_len)?;

    {
        let mut names = Vec::with_capacity(handles.len());
        let mut cursors = Vec::with_capacity(handles.len());
        for handle in handles.iter_mut() {
            let name = handle.name().to_string();
            let cursor = handle
                .scan()
                .map_err(|e| SortError::storage(StorageOp::Scan, &name, e))?;
            names.push(name);
            cursors.push(cursor);
        }

        let mut frontier = MergeFrontier::new(cursors, names, &layout.comparator)?;
        trace!(run = %dest, open_runs = frontier.open_runs(), "merge: frontier primed");

        while let Some(record) = frontier.pop()? {
            collection
                .insert(&record)
                .map_err(|e| SortError::storage(StorageOp::Insert, merged.name(), e))?;
            merged.records += 1;
        }
    }

    collection
        .sync()
        .map_err(|e| SortError::storage(StorageOp::Sync, merged.name(), e))?;
    drop(collection);
    drop(handles);

    if merged.records() != expected {
        return Err(SortError::Internal(format!(
            "merge into {} wrote {} records, sources held {expected}",
            merged.name(),
            merged.records()
        )));
    }

    for run in sources {
        run.discard()?;
    }

    debug!(
        run = %merged.name(),
        ?source_ids,
        records = merged.records(),
        "merge: complete"
    );

    Ok(merged)
}
