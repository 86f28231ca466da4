//! Per-cell application of one request to its target layer.
//!
//! Scalar writes are planned against the layer's stencil first and committed
//! afterwards, so a request either lands on every accepted cell or on none.

use std::collections::{BTreeMap, HashSet};

use uuid::Uuid;

use super::falloff::Sampler;
use super::WriteRequest;
use crate::channel::SparseChannel;
use crate::layer::{EntityKind, EntitySpawn, GridSize, Layer, StencilSlot, SurfaceType};
use crate::math::{cell_at, cell_center, lerp, Bounds2};
use crate::stencil::{Arbitration, StencilValue};

/// Cell counts for one request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CellTally {
    /// Cells (or spawns) accepted and written
    pub written: usize,
    /// Cells rejected by a higher-priority claim
    pub blocked: usize,
    /// Cells with zero strength or an unusable payload value
    pub skipped: usize,
}

impl std::ops::AddAssign for CellTally {
    fn add_assign(&mut self, rhs: Self) {
        self.written += rhs.written;
        self.blocked += rhs.blocked;
        self.skipped += rhs.skipped;
    }
}

struct CellWrite {
    x: u32,
    z: u32,
    weight: f32,
    value: f32,
    ownership: StencilValue,
}

fn plan_scalar(
    layer: &mut Layer,
    request: &WriteRequest,
    values: &Sampler,
    size: GridSize,
    tally: &mut CellTally,
) -> Vec<CellWrite> {
    let key = request.priority_key();
    let stencil = layer.stencil_mut(request.channel().stencil_slot(), size);
    let mut writes = Vec::new();
    for (x, z) in request.footprint().cells(size) {
        let uv = cell_center(x, z, size.width, size.height);
        let weight = request.falloff_at(uv);
        match stencil.arbitrate(x, z, key, weight) {
            Arbitration::Skip => tally.skipped += 1,
            Arbitration::Blocked => tally.blocked += 1,
            Arbitration::Accepted { updated } => {
                let value = values(uv);
                if !value.is_finite() {
                    tally.skipped += 1;
                    continue;
                }
                writes.push(CellWrite { x, z, weight, value, ownership: updated });
            }
        }
    }
    tally.written = writes.len();
    writes
}

fn commit_ownership(layer: &mut Layer, slot: StencilSlot, size: GridSize, writes: &[CellWrite]) {
    let stencil = layer.stencil_mut(slot, size);
    for w in writes {
        stencil.store(w.x, w.z, w.ownership);
    }
}

/// Blend a height payload into the layer: `lerp(old, value, strength)` per accepted cell.
pub fn apply_height(layer: &mut Layer, request: &WriteRequest, values: &Sampler, size: GridSize) -> CellTally {
    let mut tally = CellTally::default();
    let writes = plan_scalar(layer, request, values, size, &mut tally);
    if writes.is_empty() {
        return tally;
    }
    let channel = layer.height_channel_mut(size);
    for w in &writes {
        channel.update(w.x, w.z, |old| lerp(old, w.value, w.weight));
    }
    commit_ownership(layer, StencilSlot::Height, size, &writes);
    tally
}

/// Blend a weight payload for `surface` into the layer, renormalizing the
/// other surface types at every written cell.
pub fn apply_surface_weight(
    layer: &mut Layer,
    surface: SurfaceType,
    request: &WriteRequest,
    values: &Sampler,
    size: GridSize,
) -> CellTally {
    let mut tally = CellTally::default();
    let writes = plan_scalar(layer, request, values, size, &mut tally);
    if writes.is_empty() {
        return tally;
    }
    layer.surface_channel_mut(surface, size);
    let weights = layer.surface_weights_mut(size);
    for w in &writes {
        let target = w.value.clamp(0.0, 1.0);
        write_weight(weights, surface, w.x, w.z, |old| lerp(old, target, w.weight));
    }
    commit_ownership(layer, StencilSlot::Splat, size, &writes);
    tally
}

/// Set one surface weight at a cell and renormalize the others so the cell
/// sum stays within `[0,1]`.
pub fn write_weight(
    weights: &mut BTreeMap<SurfaceType, SparseChannel<f32>>,
    surface: SurfaceType,
    x: u32,
    z: u32,
    blend: impl FnOnce(f32) -> f32,
) {
    let Some(channel) = weights.get_mut(&surface) else {
        return;
    };
    let old = channel.get(x, z);
    let new = blend(old).clamp(0.0, 1.0);
    channel.set(x, z, new);

    let delta = new - old;
    if delta > 0.0 {
        for (_, other) in weights.iter_mut().filter(|(t, _)| **t != surface) {
            other.update(x, z, |w| w * (1.0 - delta));
        }
    }

    let others: f32 = weights
        .iter()
        .filter(|(t, _)| **t != surface)
        .map(|(_, c)| c.get(x, z))
        .sum();
    if others > 0.0 && new + others > 1.0 {
        let scale = (1.0 - new) / others;
        for (_, other) in weights.iter_mut().filter(|(t, _)| **t != surface) {
            other.update(x, z, |w| w * scale);
        }
    }
}

/// Arbitrate each spawn at its entity cell and append the accepted ones.
///
/// Spawns whose preassigned guid is already in `known` are skipped; accepted
/// guids are added to it.
pub fn spawn_entities(
    layer: &mut Layer,
    kind: EntityKind,
    request: &WriteRequest,
    spawns: &[EntitySpawn],
    size: GridSize,
    known: &mut HashSet<Uuid>,
) -> CellTally {
    let slot = StencilSlot::Entities(kind);
    let key = request.priority_key();
    let mut tally = CellTally::default();
    for spawn in spawns {
        let uv = spawn.uv();
        if !Bounds2::UNIT.contains_point(uv) {
            tally.skipped += 1;
            continue;
        }
        if spawn.guid.is_some_and(|guid| known.contains(&guid)) {
            log::debug!("Skipping {:?} spawn: guid {:?} already placed", kind, spawn.guid);
            tally.skipped += 1;
            continue;
        }
        let (x, z) = cell_at(uv, size.width, size.height);
        match layer.stencil_mut(slot, size).try_claim(x, z, key, request.falloff_at(uv)) {
            Arbitration::Skip => tally.skipped += 1,
            Arbitration::Blocked => tally.blocked += 1,
            Arbitration::Accepted { .. } => {
                let entity = spawn.clone().into_entity();
                known.insert(entity.guid());
                layer.add_entity(kind, entity);
                tally.written += 1;
            }
        }
    }
    tally
}

/// Claim the footprint cells of a removal request in the layer's entity
/// stencil. Returns the accepted cells.
pub fn claim_removal_cells(
    layer: &mut Layer,
    kind: EntityKind,
    request: &WriteRequest,
    size: GridSize,
    tally: &mut CellTally,
) -> HashSet<(u32, u32)> {
    let key = request.priority_key();
    let stencil = layer.stencil_mut(StencilSlot::Entities(kind), size);
    let mut cells = HashSet::new();
    for (x, z) in request.footprint().cells(size) {
        let weight = request.falloff_at(cell_center(x, z, size.width, size.height));
        match stencil.try_claim(x, z, key, weight) {
            Arbitration::Skip => tally.skipped += 1,
            Arbitration::Blocked => tally.blocked += 1,
            Arbitration::Accepted { .. } => {
                cells.insert((x, z));
            }
        }
    }
    tally.written += cells.len();
    cells
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::{falloff, ChannelKind, Footprint, Payload};
    use crate::layer::{LayerKind, PrototypeRef};
    use crate::math::CellRect;
    use glam::Vec2;

    const SIZE: GridSize = GridSize::square(4);

    fn height_request(priority: u32, value: f32, footprint: Footprint) -> WriteRequest {
        WriteRequest::builder("roads", ChannelKind::Height)
            .priority(priority)
            .footprint(footprint)
            .value(value)
            .build()
            .unwrap()
    }

    fn splat_request(surface: u16, priority: u32, value: f32) -> WriteRequest {
        WriteRequest::builder("paint", ChannelKind::SurfaceWeight(SurfaceType(surface)))
            .priority(priority)
            .footprint(Footprint::full())
            .value(value)
            .build()
            .unwrap()
    }

    fn scalar(request: &WriteRequest) -> Sampler {
        match request.payload() {
            Payload::Scalar(values) => values.clone(),
            other => panic!("not a scalar payload: {:?}", other),
        }
    }

    fn apply(layer: &mut Layer, request: &WriteRequest) -> CellTally {
        apply_height(layer, request, &scalar(request), SIZE)
    }

    #[test]
    fn test_height_write_claims_cells() {
        let mut layer = Layer::new("roads", LayerKind::Procedural);
        let tally = apply(&mut layer, &height_request(3, 5.0, Footprint::rect(Vec2::ZERO, Vec2::splat(0.5))));
        assert_eq!(tally.written, 4);
        assert_eq!(layer.height_at(0, 0), 5.0);
        assert_eq!(layer.height_at(2, 2), 0.0);
        let stencil = layer.stencil(StencilSlot::Height).unwrap();
        assert_eq!(stencil.owner_at(1, 1), 3);
        assert_eq!(stencil.strength_at(1, 1), 1.0);
        assert_eq!(stencil.owner_at(3, 3), 0);
    }

    #[test]
    fn test_equal_priority_later_write_wins() {
        let mut layer = Layer::new("roads", LayerKind::Procedural);
        apply(&mut layer, &height_request(3, 4.0, Footprint::full()));
        apply(&mut layer, &height_request(3, 9.0, Footprint::full()));
        assert_eq!(layer.height_at(2, 1), 9.0);
    }

    #[test]
    fn test_higher_priority_blocks_lower() {
        let mut layer = Layer::new("roads", LayerKind::Procedural);
        apply(&mut layer, &height_request(5, 4.0, Footprint::full()));
        let tally = apply(&mut layer, &height_request(1, 9.0, Footprint::full()));
        assert_eq!(tally.blocked, 16);
        assert_eq!(tally.written, 0);
        assert_eq!(layer.height_at(2, 1), 4.0);
    }

    #[test]
    fn test_weaker_high_priority_edge_lets_lower_blend() {
        let mut layer = Layer::new("roads", LayerKind::Procedural);
        let faded = WriteRequest::builder("roads", ChannelKind::Height)
            .priority(5)
            .footprint(Footprint::full())
            .falloff(falloff::constant(0.25))
            .value(8.0)
            .build()
            .unwrap();
        apply(&mut layer, &faded);
        assert_eq!(layer.height_at(0, 0), 2.0);

        let tally = apply(&mut layer, &height_request(1, 4.0, Footprint::full()));
        assert_eq!(tally.written, 16);
        assert_eq!(layer.height_at(0, 0), 4.0);
        assert_eq!(layer.stencil(StencilSlot::Height).unwrap().owner_at(0, 0), 1);
    }

    #[test]
    fn test_zero_strength_changes_nothing() {
        let mut layer = Layer::new("roads", LayerKind::Procedural);
        apply(&mut layer, &height_request(2, 3.0, Footprint::full()));
        let before = layer.clone();

        let silent = WriteRequest::builder("roads", ChannelKind::Height)
            .priority(7)
            .footprint(Footprint::full())
            .falloff(falloff::constant(0.0))
            .value(100.0)
            .build()
            .unwrap();
        let tally = apply(&mut layer, &silent);
        assert_eq!(tally.skipped, 16);
        assert_eq!(layer, before);
    }

    #[test]
    fn test_non_finite_payload_skips_cell() {
        let mut layer = Layer::new("roads", LayerKind::Procedural);
        let request = WriteRequest::builder("roads", ChannelKind::Height)
            .priority(2)
            .footprint(Footprint::full())
            .values(falloff::sampler(|uv| if uv.x < 0.5 { f32::NAN } else { 1.0 }))
            .build()
            .unwrap();
        let tally = apply(&mut layer, &request);
        assert_eq!(tally.written, 8);
        assert_eq!(tally.skipped, 8);
        assert_eq!(layer.stencil(StencilSlot::Height).unwrap().owner_at(0, 0), 0);
        assert_eq!(layer.height_at(3, 0), 1.0);
    }

    #[test]
    fn test_renormalization_keeps_sum_bounded() {
        let mut layer = Layer::new("paint", LayerKind::Painted);
        let writes = [(0, 0.7), (1, 0.6), (2, 0.9), (0, 0.4), (1, 1.0), (2, 0.3)];
        for (surface, value) in writes {
            let request = splat_request(surface, 1, value);
            apply_surface_weight(&mut layer, SurfaceType(surface), &request, &scalar(&request), SIZE);
            for (x, z) in CellRect::full(4, 4).iter() {
                let sum: f32 = (0..3)
                    .map(|t| layer.surface_weight_at_resolution(SurfaceType(t), x, z, SIZE))
                    .sum();
                assert!(sum <= 1.0 + 1e-5, "sum {} at ({}, {})", sum, x, z);
            }
        }
        assert!((layer.surface_weight_at_resolution(SurfaceType(2), 0, 0, SIZE) - 0.3).abs() < 1e-5);
    }

    #[test]
    fn test_renormalization_scales_others() {
        let mut weights = BTreeMap::new();
        weights.insert(SurfaceType(0), SparseChannel::new(1, 1));
        weights.insert(SurfaceType(1), SparseChannel::new(1, 1));
        write_weight(&mut weights, SurfaceType(0), 0, 0, |_| 0.5);
        write_weight(&mut weights, SurfaceType(1), 0, 0, |_| 0.2);
        // grass 0.5 * (1 - 0.2) = 0.4
        assert!((weights[&SurfaceType(0)].get(0, 0) - 0.4).abs() < 1e-6);
        assert!((weights[&SurfaceType(1)].get(0, 0) - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_spawns_respect_stencil() {
        let mut layer = Layer::new("trees", LayerKind::Stamp);
        let spawns = vec![
            EntitySpawn::new(PrototypeRef(1), Vec2::new(0.1, 0.1)),
            EntitySpawn::new(PrototypeRef(1), Vec2::new(0.9, 0.9)),
            EntitySpawn::new(PrototypeRef(1), Vec2::new(1.5, 0.5)),
        ];
        let claim = WriteRequest::builder("trees", ChannelKind::Entities(EntityKind::Tree))
            .priority(9)
            .footprint(Footprint::rect(Vec2::ZERO, Vec2::splat(0.5)))
            .remove()
            .build()
            .unwrap();
        let mut tally = CellTally::default();
        let cells = claim_removal_cells(&mut layer, EntityKind::Tree, &claim, SIZE, &mut tally);
        assert_eq!(cells.len(), 4);

        let request = WriteRequest::builder("trees", ChannelKind::Entities(EntityKind::Tree))
            .priority(2)
            .footprint(Footprint::full())
            .spawns(spawns.clone())
            .build()
            .unwrap();
        let tally = spawn_entities(&mut layer, EntityKind::Tree, &request, &spawns, SIZE, &mut HashSet::new());
        assert_eq!(tally, CellTally { written: 1, blocked: 1, skipped: 1 });
        assert_eq!(layer.entities(EntityKind::Tree).len(), 1);
        assert_eq!(layer.entities(EntityKind::Tree)[0].surface_uv(), Vec2::new(0.9, 0.9));
    }

    #[test]
    fn test_spawn_skips_known_guid() {
        let mut layer = Layer::new("trees", LayerKind::Stamp);
        let guid = uuid::Uuid::new_v4();
        let spawns = vec![
            EntitySpawn::new(PrototypeRef(1), Vec2::new(0.2, 0.2)).with_guid(guid),
            EntitySpawn::new(PrototypeRef(1), Vec2::new(0.7, 0.7)).with_guid(guid),
        ];
        let request = WriteRequest::builder("trees", ChannelKind::Entities(EntityKind::Tree))
            .priority(2)
            .footprint(Footprint::full())
            .spawns(spawns.clone())
            .build()
            .unwrap();
        let mut known = HashSet::new();
        let tally = spawn_entities(&mut layer, EntityKind::Tree, &request, &spawns, SIZE, &mut known);
        assert_eq!(tally, CellTally { written: 1, blocked: 0, skipped: 1 });
        assert!(known.contains(&guid));

        let again = spawn_entities(&mut layer, EntityKind::Tree, &request, &spawns, SIZE, &mut known);
        assert_eq!(again.written, 0);
        assert_eq!(layer.entities(EntityKind::Tree).len(), 1);
    }
}
