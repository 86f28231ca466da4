//! Layers: named containers of sparse edits with their own blend mode and stencils.
//!
//! A layer holds an optional height channel, one weight channel per surface
//! type, per-kind entity add lists and tombstone sets, and one stencil per
//! channel kind. Layers never reach into each other; all cross-layer work
//! happens in [`LayerStack`].

pub mod config;
pub mod dirty;
pub mod entity;
pub mod stack;

pub use config::{GridSize, SurfaceConfig, SurfaceDef, SurfaceType};
pub use dirty::{DirtyListener, DirtyTracker};
pub use entity::{Entity, EntityKind, EntitySpawn, PrototypeRef};
pub use stack::{CompoundGrid, CompoundQuery, CompoundResult, LayerStack};

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::channel::SparseChannel;
use crate::math::{cell_center, lerp};
use crate::stencil::Stencil;

/// How a layer's value combines with the layers beneath it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlendMode {
    /// Added on top of the accumulated value
    Additive,
    /// Replaces the accumulated value
    Overlay,
    /// Blended over the accumulated value by the layer's stencil strength
    #[default]
    Stencil,
}

impl BlendMode {
    /// Fold one layer value into the accumulator.
    #[inline]
    pub fn blend(self, accum: f32, value: f32, stencil_strength: f32) -> f32 {
        match self {
            BlendMode::Additive => accum + value,
            BlendMode::Overlay => value,
            BlendMode::Stencil => lerp(accum, value, stencil_strength),
        }
    }
}

/// Where a layer's content comes from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LayerKind {
    /// Hand-authored edits
    Painted,
    /// Written by procedural generators such as road splines
    #[default]
    Procedural,
    /// Written by reusable terrain stamps
    Stamp,
}

impl LayerKind {
    pub fn default_blend_mode(self) -> BlendMode {
        match self {
            LayerKind::Painted => BlendMode::Additive,
            LayerKind::Procedural | LayerKind::Stamp => BlendMode::Stencil,
        }
    }
}

/// Channel kind a stencil arbitrates. Surface types share one splat stencil
/// because renormalization couples them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StencilSlot {
    Height,
    Splat,
    Entities(EntityKind),
}

/// A named layer of sparse edits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    name: String,
    kind: LayerKind,
    enabled: bool,
    locked: bool,
    blend_mode: BlendMode,
    dirty: bool,
    heights: Option<SparseChannel<f32>>,
    surface_weights: BTreeMap<SurfaceType, SparseChannel<f32>>,
    discrete_adds: BTreeMap<EntityKind, Vec<Entity>>,
    discrete_removals: BTreeMap<EntityKind, BTreeSet<Uuid>>,
    #[serde(with = "slot_map")]
    stencils: BTreeMap<StencilSlot, Stencil>,
}

impl Layer {
    /// Create an empty, enabled, unlocked layer.
    pub fn new(name: impl Into<String>, kind: LayerKind) -> Self {
        Self {
            name: name.into(),
            kind,
            enabled: true,
            locked: false,
            blend_mode: kind.default_blend_mode(),
            dirty: false,
            heights: None,
            surface_weights: BTreeMap::new(),
            discrete_adds: BTreeMap::new(),
            discrete_removals: BTreeMap::new(),
            stencils: BTreeMap::new(),
        }
    }

    /// Set the blend mode.
    pub fn with_blend_mode(mut self, mode: BlendMode) -> Self {
        self.blend_mode = mode;
        self
    }

    /// Set the enabled flag.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> LayerKind {
        self.kind
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn blend_mode(&self) -> BlendMode {
        self.blend_mode
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub(crate) fn set_locked(&mut self, locked: bool) {
        self.locked = locked;
    }

    pub(crate) fn set_blend_mode(&mut self, mode: BlendMode) {
        self.blend_mode = mode;
    }

    /// Set the dirty flag. Returns true if the layer was clean before.
    pub(crate) fn mark_dirty(&mut self) -> bool {
        !std::mem::replace(&mut self.dirty, true)
    }

    pub(crate) fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    // --- Channels ---

    pub fn heights(&self) -> Option<&SparseChannel<f32>> {
        self.heights.as_ref()
    }

    /// Height delta at a cell of the layer's own grid (0 without height data).
    pub fn height_at(&self, x: u32, z: u32) -> f32 {
        self.heights.as_ref().map_or(0.0, |h| h.get(x, z))
    }

    /// Height delta at cell `(x, z)` of a `size` grid, resampling when the
    /// layer's grid has a different resolution.
    pub fn height_at_resolution(&self, x: u32, z: u32, size: GridSize) -> f32 {
        self.heights.as_ref().map_or(0.0, |h| sample_channel(h, x, z, size))
    }

    pub fn surface_weight(&self, surface: SurfaceType) -> Option<&SparseChannel<f32>> {
        self.surface_weights.get(&surface)
    }

    /// Surface weight at a cell of a `size` grid (0 without data).
    pub fn surface_weight_at_resolution(&self, surface: SurfaceType, x: u32, z: u32, size: GridSize) -> f32 {
        self.surface_weights
            .get(&surface)
            .map_or(0.0, |c| sample_channel(c, x, z, size))
    }

    /// Surface types this layer holds weights for.
    pub fn surface_types(&self) -> impl Iterator<Item = SurfaceType> + '_ {
        self.surface_weights.keys().copied()
    }

    /// Height channel at `size`, created or resampled as needed.
    pub fn height_channel_mut(&mut self, size: GridSize) -> &mut SparseChannel<f32> {
        let channel = self
            .heights
            .get_or_insert_with(|| SparseChannel::new(size.width, size.height));
        conform_channel(channel, size, &self.name);
        channel
    }

    /// Weight channel for `surface` at `size`, created or resampled as needed.
    pub fn surface_channel_mut(&mut self, surface: SurfaceType, size: GridSize) -> &mut SparseChannel<f32> {
        let channel = self
            .surface_weights
            .entry(surface)
            .or_insert_with(|| SparseChannel::new(size.width, size.height));
        conform_channel(channel, size, &self.name);
        channel
    }

    /// All weight channels at `size`, for renormalization across surface types.
    pub(crate) fn surface_weights_mut(&mut self, size: GridSize) -> &mut BTreeMap<SurfaceType, SparseChannel<f32>> {
        for channel in self.surface_weights.values_mut() {
            conform_channel(channel, size, &self.name);
        }
        &mut self.surface_weights
    }

    // --- Stencils ---

    pub fn stencil(&self, slot: StencilSlot) -> Option<&Stencil> {
        self.stencils.get(&slot)
    }

    /// Stencil strength at cell `(x, z)` of a `size` grid (0 when unclaimed).
    pub fn stencil_strength_at_resolution(&self, slot: StencilSlot, x: u32, z: u32, size: GridSize) -> f32 {
        match self.stencils.get(&slot) {
            Some(stencil) if stencil.dimensions() == (size.width, size.height) => stencil.strength_at(x, z),
            Some(stencil) => stencil.strength_at_uv(cell_center(x, z, size.width, size.height)),
            None => 0.0,
        }
    }

    /// Stencil for `slot` at `size`, created or resampled as needed.
    pub fn stencil_mut(&mut self, slot: StencilSlot, size: GridSize) -> &mut Stencil {
        let stencil = self
            .stencils
            .entry(slot)
            .or_insert_with(|| Stencil::new(size.width, size.height));
        if stencil.dimensions() != (size.width, size.height) {
            log::debug!(
                "Layer '{}': resampling {:?} stencil {:?} -> {}x{}",
                self.name, slot, stencil.dimensions(), size.width, size.height
            );
            *stencil = stencil.resample(size.width, size.height);
        }
        stencil
    }

    // --- Discrete entities ---

    /// Entities this layer added, in creation order.
    pub fn entities(&self, kind: EntityKind) -> &[Entity] {
        self.discrete_adds.get(&kind).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Guids this layer tombstoned.
    pub fn removals(&self, kind: EntityKind) -> Option<&BTreeSet<Uuid>> {
        self.discrete_removals.get(&kind)
    }

    /// Whether this layer tombstoned `guid`.
    pub fn removes(&self, kind: EntityKind, guid: Uuid) -> bool {
        self.discrete_removals.get(&kind).is_some_and(|s| s.contains(&guid))
    }

    /// Append an entity.
    pub fn add_entity(&mut self, kind: EntityKind, entity: Entity) {
        self.discrete_adds.entry(kind).or_default().push(entity);
    }

    /// Tombstone `guid`. The entity's own layer is not touched.
    /// Returns false if the guid was already tombstoned here.
    pub fn remove_entity(&mut self, kind: EntityKind, guid: Uuid) -> bool {
        self.discrete_removals.entry(kind).or_default().insert(guid)
    }

    /// Guids of every entity this layer added, of any kind.
    pub fn entity_guids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.discrete_adds.values().flatten().map(|e| e.guid())
    }

    /// Entity kinds with adds or removals in this layer.
    pub fn entity_kinds(&self) -> BTreeSet<EntityKind> {
        self.discrete_adds
            .keys()
            .chain(self.discrete_removals.keys())
            .copied()
            .collect()
    }

    /// Drop every channel, stencil, entity and tombstone.
    pub fn clear(&mut self) {
        self.heights = None;
        self.surface_weights.clear();
        self.discrete_adds.clear();
        self.discrete_removals.clear();
        self.stencils.clear();
    }

    /// Resample float channels bilinearly and stencils by nearest cell.
    pub fn resize(&mut self, config: &SurfaceConfig) {
        if let Some(heights) = self.heights.as_mut() {
            conform_channel(heights, config.height_resolution, &self.name);
        }
        for channel in self.surface_weights.values_mut() {
            conform_channel(channel, config.splat_resolution, &self.name);
        }
        let slots: Vec<StencilSlot> = self.stencils.keys().copied().collect();
        for slot in slots {
            self.stencil_mut(slot, config.resolution_for(slot));
        }
    }
}

// JSON map keys must be strings, so stencils are stored as (slot, stencil) pairs
mod slot_map {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serializer};

    use super::StencilSlot;
    use crate::stencil::Stencil;

    pub fn serialize<S: Serializer>(map: &BTreeMap<StencilSlot, Stencil>, s: S) -> Result<S::Ok, S::Error> {
        s.collect_seq(map.iter())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<BTreeMap<StencilSlot, Stencil>, D::Error> {
        let pairs: Vec<(StencilSlot, Stencil)> = Vec::deserialize(d)?;
        Ok(pairs.into_iter().collect())
    }
}

fn sample_channel(channel: &SparseChannel<f32>, x: u32, z: u32, size: GridSize) -> f32 {
    if channel.dimensions() == (size.width, size.height) {
        channel.get(x, z)
    } else {
        channel.sample(cell_center(x, z, size.width, size.height))
    }
}

fn conform_channel(channel: &mut SparseChannel<f32>, size: GridSize, layer: &str) {
    if channel.dimensions() != (size.width, size.height) {
        log::debug!(
            "Layer '{}': resampling channel {:?} -> {}x{}",
            layer, channel.dimensions(), size.width, size.height
        );
        *channel = channel.resample(size.width, size.height);
    }
}
