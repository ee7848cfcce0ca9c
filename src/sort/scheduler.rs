//! Pass one and beyond.
//!
//! Each pass splits the previous pass's runs, in order, into consecutive
//! groups of at most `fan_in` runs and merges every group into one run of
//! the next pass. Groups are never rebalanced. Passes repeat until a
//! single run is left, so there are `ceil(log_fan_in(runs))` of them.

use tracing::info;

use super::merge::merge_runs;
use super::run::{RunId, TempRun};
use super::{RecordLayout, SortSummary};
use crate::SortError;
use crate::store::Store;

/// Counters of one merge pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PassState {
    pub(crate) pass: usize,
    pub(crate) runs_entering: usize,
    pub(crate) fan_in: usize,
    pub(crate) runs_produced: usize,
}

impl PassState {
    fn new(pass: usize, runs_entering: usize, fan_in: usize) -> Self {
        Self {
            pass,
            runs_entering,
            fan_in,
            runs_produced: 0,
        }
    }

    /// Runs this pass will produce.
    pub(crate) fn expected_runs(&self) -> usize {
        self.runs_entering.div_ceil(self.fan_in)
    }
}

/// Merges `runs` pass after pass until one run is left and returns it.
///
/// `runs` must not be empty. A single run is returned as is.
pub(crate) fn merge_until_one<'s, S: Store>(
    store: &'s S,
    output: &str,
    mut runs: Vec<TempRun<'s, S>>,
    layout: &RecordLayout,
    summary: &mut SortSummary,
) -> Result<TempRun<'s, S>, SortError> {
    let mut pass = 0;

    while runs.len() > 1 {
        pass += 1;
        let mut state = PassState::new(pass, runs.len(), layout.fan_in);

        info!(
            pass = state.pass,
            runs_entering = state.runs_entering,
            fan_in = state.fan_in,
            runs_expected = state.expected_runs(),
            "merge pass: starting"
        );

        let mut next = Vec::with_capacity(state.expected_runs());
        let mut pending = runs.into_iter();
        loop {
            let group: Vec<TempRun<'s, S>> = pending.by_ref().take(layout.fan_in).collect();
            if group.is_empty() {
                break;
            }
            let dest = RunId::new(pass, next.len());
            next.push(merge_runs(store, output, group, dest, layout)?);
        }

        state.runs_produced = next.len();
        if state.runs_produced != state.expected_runs() {
            return Err(SortError::Internal(format!(
                "pass {pass} produced {} runs, expected {}",
                state.runs_produced,
                state.expected_runs()
            )));
        }

        info!(
            pass = state.pass,
            runs_produced = state.runs_produced,
            "merge pass: complete"
        );

        summary.merge_passes = pass;
        summary.runs_per_pass.push(state.runs_produced);
        runs = next;
    }

    runs
        .pop()
        .ok_or_else(|| SortError::Internal("no run to finalize".into()))
}
