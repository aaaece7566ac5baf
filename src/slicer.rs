//! Worklist driver for the backward slicer.

use std::collections::{HashSet, VecDeque};

use tracing::{debug, trace};

use crate::context::LiveMap;
use crate::error::SlicerError;
use crate::expr::Expr;
use crate::host::SlicerHost;
use crate::interval::StridedInterval;
use crate::state::{SliceOutcome, SliceState};

#[derive(Debug)]
/// Backward slicer over a partially-constructed control flow graph.
///
/// Seed it with [`start`](Self::start) at the indirect jump, then call
/// [`step`](Self::step) until it returns `false` (or an error). The
/// recovered jump-table format, index and index interval stay readable
/// between steps, after exhaustion, and after a failed step.
pub struct BackwardSlicer<H: SlicerHost> {
    host: H,
    worklist: VecDeque<SliceState<H::Block>>,
    visited: HashSet<H::Block>,
    /// Most recently processed state; fallback source of partial results.
    state: Option<SliceState<H::Block>>,
    /// First state that found a bound; takes precedence when reporting.
    stopped: Option<SliceState<H::Block>>,
}

impl<H: SlicerHost> BackwardSlicer<H> {
    /// Create a slicer over `host`.
    pub fn new(host: H) -> Self {
        Self {
            host,
            worklist: VecDeque::new(),
            visited: HashSet::new(),
            state: None,
            stopped: None,
        }
    }

    /// The host this slicer reads the graph through.
    pub const fn host(&self) -> &H {
        &self.host
    }

    /// Seed a slice at statement `instr_index` of `block`, whose indirect
    /// target is `indirect`. Returns `false` when nothing in the target
    /// expression can be traced backwards, in which case no work is queued
    /// and all results stay empty.
    pub fn start(
        &mut self,
        block: H::Block,
        instr_index: usize,
        indirect: &Expr,
    ) -> Result<bool, SlicerError> {
        let mut state = SliceState::new(block.clone(), instr_index as isize);
        self.visited.insert(block);

        if !state.start(indirect)? {
            debug!(target = %indirect, "indirect target has no live expressions");
            return Ok(false);
        }

        debug!(target = %indirect, live = %state.live(), "seeded backward slice");
        self.state = Some(state.clone());
        self.worklist.push_back(state);

        Ok(true)
    }

    /// Process one unit of work: step a state backwards over one statement,
    /// or fan a finished state out to its unvisited predecessors. Returns
    /// `false` once the worklist is empty.
    pub fn step(&mut self) -> Result<bool, SlicerError> {
        let Some(mut state) = self.worklist.pop_front() else {
            return Ok(false);
        };

        if state.is_at_block_start() {
            self.fan_out(state);
            return Ok(true);
        }

        match state.step(&self.host) {
            Ok(SliceOutcome::Proceed) => {
                self.state = Some(state.clone());
                self.worklist.push_back(state);
            }
            Ok(SliceOutcome::Stopped) => {
                debug!(block = ?state.block(), "slice path stopped with a bound");
                if self.stopped.is_none() {
                    self.stopped = Some(state.clone());
                }
                self.state = Some(state);
            }
            Ok(SliceOutcome::DeadEnd) => {
                debug!(block = ?state.block(), "slice path exhausted");
                self.state = Some(state);
            }
            Err(e) => {
                // Keep whatever the path had recovered so far readable.
                self.state = Some(state);
                return Err(e);
            }
        }

        Ok(true)
    }

    /// Run [`step`](Self::step) until the worklist drains, but at most
    /// `max_steps` times. Returns `true` if the slice ran to completion
    /// within the step limit.
    pub fn run(&mut self, max_steps: usize) -> Result<bool, SlicerError> {
        for _ in 0..max_steps {
            if !self.step()? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn fan_out(&mut self, state: SliceState<H::Block>) {
        let preds = self.host.predecessors(state.block());
        debug!(block = ?state.block(), preds = preds.len(), "reached top of block");

        let addr = self.host.address(state.block());
        for pred in preds {
            if self.visited.insert(pred.clone()) {
                let cursor = self.host.instructions(&pred).len() as isize - 1;
                trace!(pred = ?pred, "fanning out to predecessor");
                self.worklist.push_back(state.create_new(pred, cursor, addr));
            }
        }
        self.state = Some(state);
    }

    fn result(&self) -> Option<&SliceState<H::Block>> {
        self.stopped.as_ref().or(self.state.as_ref())
    }

    /// Expressions whose values feed the indirect target.
    pub fn live(&self) -> Option<&LiveMap> {
        self.result().map(SliceState::live)
    }

    /// The symbolic expression that, given an index, produces the branch
    /// destination.
    pub fn jump_table_format(&self) -> Option<&Expr> {
        self.result().and_then(SliceState::jump_table_format)
    }

    /// The expression bounded by the guarding comparison or mask.
    pub fn jump_table_index(&self) -> Option<&Expr> {
        self.result().and_then(SliceState::jump_table_index)
    }

    /// The index expression to evaluate when enumerating table entries.
    pub fn jump_table_index_to_use(&self) -> Option<&Expr> {
        self.result().and_then(SliceState::jump_table_index_to_use)
    }

    /// Bound on the index; empty until a comparison or mask is found.
    pub fn jump_table_index_interval(&self) -> StridedInterval {
        self.result()
            .map(SliceState::jump_table_index_interval)
            .unwrap_or(StridedInterval::EMPTY)
    }
}
