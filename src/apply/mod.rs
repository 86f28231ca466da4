//! Write application: requests, falloffs, per-cell arbitration and batching.
//!
//! Every write into a layer goes through [`apply_request`]: the request is
//! validated against the surface, the target layer is created if missing,
//! each footprint cell is arbitrated against the layer's stencil for the
//! channel kind, and the layer is marked dirty.

pub mod arbitration;
pub mod falloff;
pub mod footprint;
pub mod job;
pub mod manager;
pub mod request;

pub use arbitration::CellTally;
pub use falloff::{FalloffCurve, GeometryProvider, RadialBrush, Sampler};
pub use footprint::Footprint;
pub use job::{ApplyBudget, ApplyJob, JobStatus};
pub use manager::{ApplyManager, ApplyReport};
pub use request::{ChannelKind, Payload, WriteRequest, WriteRequestBuilder};

use std::collections::HashSet;

use crate::core::{Error, Result};
use crate::layer::LayerStack;
use crate::math::{cell_at, Bounds2};

/// What one applied request did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestOutcome {
    /// Target layer index after application
    pub layer_index: usize,
    /// The target layer did not exist and was created
    pub layer_created: bool,
    pub cells: CellTally,
    pub entities_spawned: usize,
    pub entities_removed: usize,
}

/// Apply one request to `stack`.
///
/// Fails without touching the stack when the request is invalid for this
/// surface or its target layer is locked. Individual cells may still be
/// blocked or skipped by arbitration.
pub fn apply_request(stack: &mut LayerStack, request: &WriteRequest) -> Result<RequestOutcome> {
    request.validate_for(stack.config())?;
    if stack.layer(request.target_layer()).is_some_and(|l| l.is_locked()) {
        log::warn!(
            "Surface '{}': rejecting write to locked layer '{}'",
            stack.name(),
            request.target_layer()
        );
        return Err(Error::LayerLocked(request.target_layer().to_string()));
    }

    let (index, created) = stack.ensure_layer(request.target_layer());
    let size = stack.config().resolution_for(request.channel().stencil_slot());
    let mut outcome = RequestOutcome {
        layer_index: index,
        layer_created: created,
        ..Default::default()
    };

    match (request.channel(), request.payload()) {
        (ChannelKind::Height, Payload::Scalar(values)) => {
            outcome.cells = arbitration::apply_height(stack.layer_at_mut(index), request, values, size);
        }
        (ChannelKind::SurfaceWeight(surface), Payload::Scalar(values)) => {
            outcome.cells =
                arbitration::apply_surface_weight(stack.layer_at_mut(index), surface, request, values, size);
        }
        (ChannelKind::Entities(kind), Payload::Spawn(spawns)) => {
            let mut known = if spawns.iter().any(|s| s.guid.is_some()) {
                stack.entity_guids()
            } else {
                HashSet::new()
            };
            outcome.cells =
                arbitration::spawn_entities(stack.layer_at_mut(index), kind, request, spawns, size, &mut known);
            outcome.entities_spawned = outcome.cells.written;
        }
        (ChannelKind::Entities(kind), Payload::Remove) => {
            let cells = arbitration::claim_removal_cells(
                stack.layer_at_mut(index),
                kind,
                request,
                size,
                &mut outcome.cells,
            );
            let doomed: Vec<_> = stack
                .layers()
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != index)
                .flat_map(|(_, layer)| layer.entities(kind))
                .filter(|e| {
                    let uv = e.surface_uv();
                    Bounds2::UNIT.contains_point(uv) && cells.contains(&cell_at(uv, size.width, size.height))
                })
                .map(|e| e.guid())
                .collect();
            let layer = stack.layer_at_mut(index);
            outcome.entities_removed = doomed
                .into_iter()
                .filter(|guid| layer.remove_entity(kind, *guid))
                .count();
        }
        (channel, payload) => {
            return Err(Error::InvalidRequest(format!(
                "payload {:?} cannot write channel {:?}",
                payload, channel
            )));
        }
    }

    stack.set_dirty_above_index(index);
    log::debug!(
        "Surface '{}': applied {:?} to '{}' (key {}): {} written, {} blocked, {} skipped",
        stack.name(),
        request.channel(),
        request.target_layer(),
        request.priority_key(),
        outcome.cells.written,
        outcome.cells.blocked,
        outcome.cells.skipped
    );
    Ok(outcome)
}
