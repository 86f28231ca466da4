//! Pending request queue for one surface.

use super::job::QueuedRequest;
use super::{ApplyBudget, ApplyJob, CellTally, RequestOutcome, WriteRequest};
use crate::core::Result;
use crate::layer::LayerStack;

/// Totals over a batch of applied requests.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub applied: usize,
    /// Requests rejected at application time (locked layer, unknown surface type)
    pub rejected: usize,
    pub cells: CellTally,
    pub entities_spawned: usize,
    pub entities_removed: usize,
    pub layers_created: usize,
}

impl ApplyReport {
    pub(crate) fn record(&mut self, outcome: &RequestOutcome) {
        self.applied += 1;
        self.cells += outcome.cells;
        self.entities_spawned += outcome.entities_spawned;
        self.entities_removed += outcome.entities_removed;
        if outcome.layer_created {
            self.layers_created += 1;
        }
    }
}

/// Collects write requests for one surface and applies them in priority order.
///
/// Requests are grouped by target layer and sorted by ascending priority key,
/// ties broken by submission order, so the final state does not depend on the
/// order requests of different priorities were submitted in.
///
/// Layer groups run in the order their first request was submitted. Missing
/// layers are created at the top of the stack as their group runs, so a layer
/// first targeted later in a batch ends up above one targeted earlier.
/// Entity removals run after every other request of the batch, whatever
/// their layer, so they see every entity the batch spawns.
#[derive(Debug, Default)]
pub struct ApplyManager {
    pending: Vec<QueuedRequest>,
    next_sequence: u64,
    budget: ApplyBudget,
}

impl ApplyManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_budget(budget: ApplyBudget) -> Self {
        Self {
            budget,
            ..Default::default()
        }
    }

    pub fn budget(&self) -> ApplyBudget {
        self.budget
    }

    pub fn set_budget(&mut self, budget: ApplyBudget) {
        self.budget = budget;
    }

    /// Queue a request. Returns its sequence number.
    pub fn submit(&mut self, request: WriteRequest) -> Result<u64> {
        request.validate()?;
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.pending.push(QueuedRequest::new(sequence, request));
        Ok(sequence)
    }

    /// Queue several requests. Nothing is queued if any of them is invalid.
    pub fn submit_all(&mut self, requests: impl IntoIterator<Item = WriteRequest>) -> Result<usize> {
        let requests: Vec<WriteRequest> = requests.into_iter().collect();
        for request in &requests {
            request.validate()?;
        }
        let count = requests.len();
        for request in requests {
            self.submit(request)?;
        }
        Ok(count)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drop every pending request.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Drain pending requests into a job to run over several ticks.
    pub fn begin_job(&mut self) -> ApplyJob {
        ApplyJob::new(std::mem::take(&mut self.pending), self.budget)
    }

    /// Apply every pending request now.
    pub fn apply_all(&mut self, stack: &mut LayerStack) -> ApplyReport {
        let mut job = self.begin_job();
        job.run(stack);
        job.into_report()
    }
}
