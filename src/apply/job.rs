//! Cooperative batch application: a fixed budget of requests and cells per tick.

use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use super::{apply_request, ApplyReport, Payload, WriteRequest};
use crate::layer::{LayerStack, SurfaceConfig};

/// Work allowed per [`ApplyJob::tick`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplyBudget {
    /// Maximum requests started per tick
    pub max_requests_per_tick: usize,
    /// Maximum estimated cells touched per tick; the first request of a tick
    /// always runs regardless
    pub max_cells_per_tick: usize,
}

impl Default for ApplyBudget {
    fn default() -> Self {
        Self {
            max_requests_per_tick: 8,
            max_cells_per_tick: 65_536,
        }
    }
}

impl ApplyBudget {
    /// No limits: one tick drains the job.
    pub fn unlimited() -> Self {
        Self {
            max_requests_per_tick: usize::MAX,
            max_cells_per_tick: usize::MAX,
        }
    }
}

/// State of a job after a tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobStatus {
    InProgress { remaining: usize },
    Complete,
}

/// A submitted request with its creation sequence number.
#[derive(Clone, Debug)]
pub(crate) struct QueuedRequest {
    pub sequence: u64,
    /// Sequence of the first request in the batch targeting the same layer
    pub group: u64,
    pub request: WriteRequest,
}

impl QueuedRequest {
    pub fn new(sequence: u64, request: WriteRequest) -> Self {
        Self { sequence, group: sequence, request }
    }

    /// Removals resolve against entities, so they run after every other write.
    fn is_removal(&self) -> bool {
        matches!(self.request.payload(), Payload::Remove)
    }
}

impl PartialEq for QueuedRequest {
    fn eq(&self, other: &Self) -> bool {
        self.sequence == other.sequence
    }
}

impl Eq for QueuedRequest {}

// Removals last, then grouped by layer in first-submission order, then
// ascending priority, then creation order
impl Ord for QueuedRequest {
    fn cmp(&self, other: &Self) -> Ordering {
        self.is_removal()
            .cmp(&other.is_removal())
            .then(self.group.cmp(&other.group))
            .then(self.request.priority_key().cmp(&other.request.priority_key()))
            .then(self.sequence.cmp(&other.sequence))
    }
}

impl PartialOrd for QueuedRequest {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Drained batch of requests applied over several ticks.
///
/// Each request is applied whole, so dropping the job between ticks leaves
/// the surface valid with only part of the batch applied.
#[derive(Debug)]
pub struct ApplyJob {
    queue: VecDeque<QueuedRequest>,
    budget: ApplyBudget,
    report: ApplyReport,
    ticks: u32,
}

impl ApplyJob {
    pub(crate) fn new(mut requests: Vec<QueuedRequest>, budget: ApplyBudget) -> Self {
        let mut first: HashMap<String, u64> = HashMap::new();
        for queued in &requests {
            first
                .entry(queued.request.target_layer().to_string())
                .and_modify(|s| *s = (*s).min(queued.sequence))
                .or_insert(queued.sequence);
        }
        for queued in &mut requests {
            queued.group = first
                .get(queued.request.target_layer())
                .copied()
                .unwrap_or(queued.sequence);
        }
        requests.sort();
        Self {
            queue: requests.into(),
            budget,
            report: ApplyReport::default(),
            ticks: 0,
        }
    }

    /// Apply requests until the tick budget runs out.
    pub fn tick(&mut self, stack: &mut LayerStack) -> JobStatus {
        let mut requests = 0;
        let mut cells = 0usize;
        while let Some(next) = self.queue.front() {
            if requests >= self.budget.max_requests_per_tick {
                break;
            }
            let estimate = estimated_cells(&next.request, stack.config());
            if requests > 0 && cells.saturating_add(estimate) > self.budget.max_cells_per_tick {
                break;
            }
            let Some(queued) = self.queue.pop_front() else {
                break;
            };
            match apply_request(stack, &queued.request) {
                Ok(outcome) => self.report.record(&outcome),
                Err(e) => {
                    log::warn!("Request #{} rejected: {}", queued.sequence, e);
                    self.report.rejected += 1;
                }
            }
            requests += 1;
            cells = cells.saturating_add(estimate);
        }
        self.ticks += 1;

        if self.queue.is_empty() {
            log::info!(
                "Apply job on '{}' complete after {} ticks: {} applied, {} rejected, {} cells written",
                stack.name(),
                self.ticks,
                self.report.applied,
                self.report.rejected,
                self.report.cells.written
            );
            JobStatus::Complete
        } else {
            JobStatus::InProgress { remaining: self.queue.len() }
        }
    }

    /// Tick until complete.
    pub fn run(&mut self, stack: &mut LayerStack) -> &ApplyReport {
        while self.tick(stack) != JobStatus::Complete {}
        &self.report
    }

    pub fn remaining(&self) -> usize {
        self.queue.len()
    }

    pub fn is_complete(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    pub fn budget(&self) -> ApplyBudget {
        self.budget
    }

    /// Totals so far.
    pub fn report(&self) -> &ApplyReport {
        &self.report
    }

    pub fn into_report(self) -> ApplyReport {
        self.report
    }
}

fn estimated_cells(request: &WriteRequest, config: &SurfaceConfig) -> usize {
    match request.payload() {
        Payload::Spawn(spawns) => spawns.len(),
        _ => request
            .footprint()
            .cell_estimate(config.resolution_for(request.channel().stencil_slot())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::{ApplyManager, ChannelKind, Footprint};
    use crate::layer::EntityKind;

    fn stack4() -> LayerStack {
        LayerStack::new("tile", SurfaceConfig::uniform(4)).unwrap()
    }

    fn full_height(layer: &str, priority: u32, value: f32) -> WriteRequest {
        WriteRequest::builder(layer, ChannelKind::Height)
            .priority(priority)
            .footprint(Footprint::full())
            .value(value)
            .build()
            .unwrap()
    }

    #[test]
    fn test_default_budget() {
        let budget = ApplyBudget::default();
        assert_eq!(budget.max_requests_per_tick, 8);
        assert_eq!(budget.max_cells_per_tick, 65_536);
        let parsed: ApplyBudget = serde_json::from_str(r#"{"max_requests_per_tick": 2}"#).unwrap();
        assert_eq!(parsed.max_cells_per_tick, 65_536);
    }

    #[test]
    fn test_request_budget_spreads_ticks() {
        let mut stack = stack4();
        let mut manager = ApplyManager::with_budget(ApplyBudget {
            max_requests_per_tick: 2,
            ..Default::default()
        });
        for i in 1..=5 {
            manager.submit(full_height("roads", i, i as f32)).unwrap();
        }
        let mut job = manager.begin_job();
        assert_eq!(manager.pending_count(), 0);
        assert_eq!(job.tick(&mut stack), JobStatus::InProgress { remaining: 3 });
        assert_eq!(job.tick(&mut stack), JobStatus::InProgress { remaining: 1 });
        assert_eq!(job.tick(&mut stack), JobStatus::Complete);
        assert_eq!(job.ticks(), 3);
        assert_eq!(job.report().applied, 5);
        assert_eq!(stack.compound_height_at(0, 0), 5.0);
    }

    #[test]
    fn test_cell_budget_runs_one_request_minimum() {
        let mut stack = stack4();
        let mut manager = ApplyManager::with_budget(ApplyBudget {
            max_requests_per_tick: 10,
            max_cells_per_tick: 20,
        });
        manager.submit(full_height("a", 1, 1.0)).unwrap();
        manager.submit(full_height("a", 2, 2.0)).unwrap();
        let mut job = manager.begin_job();
        assert_eq!(job.tick(&mut stack), JobStatus::InProgress { remaining: 1 });
        assert_eq!(job.tick(&mut stack), JobStatus::Complete);
    }

    #[test]
    fn test_cancelled_job_leaves_valid_state() {
        let mut stack = stack4();
        let mut manager = ApplyManager::with_budget(ApplyBudget {
            max_requests_per_tick: 1,
            ..Default::default()
        });
        manager.submit(full_height("roads", 1, 2.0)).unwrap();
        manager.submit(full_height("roads", 2, 7.0)).unwrap();
        let mut job = manager.begin_job();
        job.tick(&mut stack);
        drop(job);

        assert_eq!(stack.compound_height_at(3, 3), 2.0);
        assert!(stack.layer("roads").unwrap().is_dirty());
        assert_eq!(manager.pending_count(), 0);
    }

    fn planned_order(requests: Vec<WriteRequest>) -> Vec<u64> {
        let queued = requests
            .into_iter()
            .enumerate()
            .map(|(i, r)| QueuedRequest::new(i as u64, r))
            .collect();
        let job = ApplyJob::new(queued, ApplyBudget::default());
        job.queue.iter().map(|q| q.sequence).collect()
    }

    #[test]
    fn test_plan_groups_by_layer_then_priority() {
        let order = planned_order(vec![
            full_height("b", 1, 0.0),
            full_height("a", 9, 0.0),
            full_height("a", 3, 0.0),
            full_height("a", 3, 0.0),
            full_height("b", 7, 0.0),
        ]);
        assert_eq!(order, vec![0, 4, 2, 3, 1]);
    }

    #[test]
    fn test_plan_runs_removals_last() {
        let removal = WriteRequest::builder("a", ChannelKind::Entities(EntityKind::Tree))
            .priority(1)
            .footprint(Footprint::full())
            .remove()
            .build()
            .unwrap();
        let order = planned_order(vec![removal, full_height("z", 5, 0.0), full_height("a", 2, 0.0)]);
        assert_eq!(order, vec![2, 1, 0]);
    }

    #[test]
    fn test_lazy_layers_created_in_submission_order() {
        let mut stack = stack4();
        let mut manager = ApplyManager::new();
        manager.submit(full_height("zeta", 1, 1.0)).unwrap();
        manager.submit(full_height("alpha", 1, 2.0)).unwrap();
        manager.apply_all(&mut stack);
        let names: Vec<&str> = stack.layers().iter().map(|l| l.name()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }
}
