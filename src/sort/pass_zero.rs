//! Pass zero: run generation.
//!
//! Scans the input once. Records are appended to a staging buffer of
//! `batch_records × record_len` bytes; each time the buffer is full (and
//! once more at the end of the input) its records are sorted in place by
//! the key comparator and written out as the next pass-zero run.
//!
//! Integer keys are validated as they are read, so every later comparison
//! sees well-formed keys.

use tracing::{debug, info, trace};

use super::comparator::KeyComparator;
use super::run::{RunId, RunWriter, TempRun};
use super::RecordLayout;
use crate::store::{Collection, Store};
use crate::{ConfigError, SortConfig, SortError, StorageOp};

/// Generates the sorted runs of pass zero.
///
/// Returns the runs in generation order and the number of input records.
/// An empty input yields no runs.
pub(crate) fn generate<'s, S: Store>(
    store: &'s S,
    config: &'s SortConfig,
    layout: &RecordLayout,
) -> Result<(Vec<TempRun<'s, S>>, u64), SortError> {
    let mut input = store
        .open(&config.input)
        .map_err(|e| SortError::storage(StorageOp::Open, &config.input, e))?;

    if input.record_len() != layout.record_len {
        return Err(ConfigError::RecordLengthMismatch {
            collection: config.input.clone(),
            expected: layout.record_len,
            actual: input.record_len(),
        }
        .into());
    }

    let input_records = input.record_count();
    let record_len = layout.record_len;
    let batch_bytes = layout.batch_records * record_len;
    let comparator = &layout.comparator;

    info!(
        input = %config.input,
        input_records,
        batch_records = layout.batch_records,
        "pass zero: generating runs"
    );

    let writer = RunWriter::new(store, &config.output, record_len);
    let expected_bytes = usize::try_from(input_records)
        .unwrap_or(usize::MAX)
        .saturating_mul(record_len);
    let mut staging: Vec<u8> = Vec::with_capacity(batch_bytes.min(expected_bytes));
    let mut runs: Vec<TempRun<'s, S>> = Vec::new();
    let mut position: u64 = 0;

    let scan = input
        .scan()
        .map_err(|e| SortError::storage(StorageOp::Scan, &config.input, e))?;

    for record in scan {
        let record = record.map_err(|e| SortError::storage(StorageOp::Scan, &config.input, e))?;

        if !comparator.is_valid_key(&record) {
            return Err(SortError::InvalidKey {
                collection: config.input.clone(),
                position,
                key: String::from_utf8_lossy(comparator.key(&record)).into_owned(),
            });
        }

        staging.extend_from_slice(&record);
        position += 1;

        if staging.len() == batch_bytes {
            let id = RunId::new(0, runs.len());
            runs.push(write_batch(&writer, comparator, &staging, record_len, id)?);
            staging.clear();
        }
    }

    if !staging.is_empty() {
        let id = RunId::new(0, runs.len());
        runs.push(write_batch(&writer, comparator, &staging, record_len, id)?);
    }

    debug!(
        input = %config.input,
        records = position,
        runs = runs.len(),
        "pass zero: complete"
    );

    Ok((runs, position))
}

/// Sorts the staged records and writes them as run `id`.
fn write_batch<'s, S: Store>(
    writer: &RunWriter<'s, S>,
    comparator: &KeyComparator,
    staging: &[u8],
    record_len: usize,
    id: RunId,
) -> Result<TempRun<'s, S>, SortError> {
    let mut batch: Vec<&[u8]> = staging.chunks_exact(record_len).collect();
    batch.sort_unstable_by(|a, b| comparator.compare(a, b));

    trace!(run = %id, records = batch.len(), "pass zero: batch sorted");

    writer.write(id, batch)
}
