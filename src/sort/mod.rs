//! # External Sort
//!
//! Two-phase external merge sort over [`Store`] collections.
//!
//! ## Pass zero (run generation)
//!
//! The input is scanned once into a staging area of
//! `buffer_pages × page_size` bytes. Whenever the staging area cannot
//! take another record (or the input ends) its records are sorted in
//! memory and written out as run `<output>.sort.temp.0.<n>`.
//!
//! ## Pass one and beyond (merging)
//!
//! The runs of the previous pass are split, in order, into groups of at
//! most `fan_in = max(buffer_pages − 1, 2)` runs. Each group is k-way
//! merged into run `<output>.sort.temp.<pass>.<group>`; a group of one is
//! simply renamed. Passes repeat until one run remains.
//!
//! ## Finalization
//!
//! The surviving run is renamed to the output name. An empty input still
//! produces one (empty) run, so the output always exists after success.
//!
//! ## Code organization
//!
//! - [`comparator`] — the typed, directional key order shared by every pass.
//! - [`run`] — run naming, the run writer, and the temporary-run guard.
//! - [`pass_zero`] — run generation.
//! - [`merge`] — the k-way merge of one group.
//! - [`scheduler`] — grouping runs into passes until one is left.

pub mod comparator;
pub mod run;

mod merge;
mod pass_zero;
mod scheduler;

#[cfg(test)]
mod tests;

pub use comparator::{KeyComparator, parse_int_key};
pub use run::{RunId, parse_temp_run_name, temp_run_name};

use tracing::{info, warn};

use crate::store::Store;
use crate::{SortConfig, SortError, StorageOp};
use run::RunWriter;

// ------------------------------------------------------------------------------------------------
// Derived layout
// ------------------------------------------------------------------------------------------------

/// Everything the passes derive from a validated [`SortConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RecordLayout {
    /// Fixed record length in bytes.
    pub(crate) record_len: usize,

    /// Key order used by both the in-memory sort and the merge.
    pub(crate) comparator: KeyComparator,

    /// Records per pass-zero batch (`buffer bytes / record_len`, ≥ 1).
    pub(crate) batch_records: usize,

    /// Maximum runs merged at once.
    pub(crate) fan_in: usize,
}

// ------------------------------------------------------------------------------------------------
// Summary
// ------------------------------------------------------------------------------------------------

/// What a completed sort did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortSummary {
    /// Records read from the input (and written to the output).
    pub records: u64,

    /// Runs written by pass zero.
    pub initial_runs: usize,

    /// Fan-in used by the merge passes.
    pub fan_in: usize,

    /// Number of merge passes (pass one and beyond).
    pub merge_passes: usize,

    /// Runs left after each merge pass; the last entry is always 1.
    pub runs_per_pass: Vec<usize>,
}

// ------------------------------------------------------------------------------------------------
// Public API
// ------------------------------------------------------------------------------------------------

/// Sorts `config.input` into a new collection `config.output`.
///
/// # Errors
///
/// - [`SortError::Config`] if the configuration is invalid or the input's
///   record length does not match the field sizes.
/// - [`SortError::OutputExists`] if the output collection already exists.
/// - [`SortError::InvalidKey`] if an integer key is not a base-10 integer.
/// - [`SortError::Storage`] for any storage failure, naming the operation
///   and the collection.
///
/// On error the output does not exist and temporary runs have been
/// removed as far as the store allowed.
pub fn external_sort<S: Store>(store: &S, config: &SortConfig) -> Result<SortSummary, SortError> {
    let layout = config.validate(store)?;

    info!(
        input = %config.input,
        output = %config.output,
        record_len = layout.record_len,
        batch_records = layout.batch_records,
        fan_in = layout.fan_in,
        order = ?config.order,
        "external sort: starting"
    );

    let output_exists = store
        .exists(&config.output)
        .map_err(|e| SortError::storage(StorageOp::Exists, &config.output, e))?;
    if output_exists {
        return Err(SortError::OutputExists(config.output.clone()));
    }

    let (mut runs, records) = pass_zero::generate(store, config, &layout)?;

    let mut summary = SortSummary {
        records,
        initial_runs: runs.len(),
        fan_in: layout.fan_in,
        ..SortSummary::default()
    };

    if runs.is_empty() {
        let writer = RunWriter::new(store, &config.output, layout.record_len);
        runs.push(writer.write(RunId::new(0, 0), std::iter::empty())?);
    }

    let final_run = scheduler::merge_until_one(store, &config.output, runs, &layout, &mut summary)?;
    final_run.persist_as(&config.output)?;

    info!(
        output = %config.output,
        records = summary.records,
        initial_runs = summary.initial_runs,
        merge_passes = summary.merge_passes,
        "external sort: complete"
    );

    Ok(summary)
}

/// Deletes every temporary run of `output` left behind by an interrupted
/// sort. Returns the number of collections removed.
pub fn remove_orphaned_runs<S: Store>(store: &S, output: &str) -> Result<usize, SortError> {
    let names = store
        .list()
        .map_err(|e| SortError::storage(StorageOp::List, output, e))?;

    let mut removed = 0;
    for name in names {
        if parse_temp_run_name(output, &name).is_none() {
            continue;
        }
        store
            .delete(&name)
            .map_err(|e| SortError::storage(StorageOp::Delete, &name, e))?;
        warn!(name = %name, "removed orphaned temporary run");
        removed += 1;
    }
    Ok(removed)
}
