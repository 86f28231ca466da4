//! Layer stack for one target surface and its compound queries.
//!
//! Index 0 is the highest precedence. Compound folds run from the bottom of
//! the stack (index `N-1`) to the top, so index 0 is folded last.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    BlendMode, DirtyListener, DirtyTracker, Entity, EntityKind, GridSize, Layer, LayerKind,
    StencilSlot, SurfaceConfig, SurfaceType,
};
use crate::core::{Error, Result};
use crate::math::{Bounds2, CellRect};

/// What to composite.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CompoundQuery {
    /// Height over a cell region of the height grid
    Height(CellRect),
    /// One surface type's weight over a cell region of the splat grid
    SurfaceWeight(SurfaceType, CellRect),
    /// Surviving entities of a kind, optionally restricted to a region
    Entities(EntityKind, Option<Bounds2>),
}

/// Result of a compound query.
#[derive(Clone, Debug, PartialEq)]
pub enum CompoundResult {
    Grid(CompoundGrid),
    Entities(Vec<Entity>),
}

/// Composited values over a cell region.
#[derive(Clone, Debug, PartialEq)]
pub struct CompoundGrid {
    rect: CellRect,
    values: Vec<f32>,
}

impl CompoundGrid {
    pub fn rect(&self) -> CellRect {
        self.rect
    }

    /// Row-major values (z outer, x inner).
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Value at absolute cell `(x, z)`, if inside the region.
    pub fn get(&self, x: u32, z: u32) -> Option<f32> {
        if !self.rect.contains(x, z) {
            return None;
        }
        let idx = (z - self.rect.z0) * self.rect.width() + (x - self.rect.x0);
        self.values.get(idx as usize).copied()
    }

    pub fn min(&self) -> f32 {
        self.values.iter().copied().fold(f32::INFINITY, f32::min)
    }

    pub fn max(&self) -> f32 {
        self.values.iter().copied().fold(f32::NEG_INFINITY, f32::max)
    }
}

/// Ordered layers bound to one target surface.
#[derive(Debug, Serialize, Deserialize)]
pub struct LayerStack {
    name: String,
    config: SurfaceConfig,
    layers: Vec<Layer>,
    #[serde(skip)]
    dirty: DirtyTracker,
}

impl LayerStack {
    /// Create an empty stack for the surface `name`.
    pub fn new(name: impl Into<String>, config: SurfaceConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            name: name.into(),
            config,
            layers: Vec::new(),
            dirty: DirtyTracker::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &SurfaceConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Layers in precedence order (index 0 first).
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.layers.iter().position(|l| l.name() == name)
    }

    pub fn layer(&self, name: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.name() == name)
    }

    /// Mutable access. Callers that change composited content should follow
    /// up with [`LayerStack::set_dirty_above`].
    pub fn layer_mut(&mut self, name: &str) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|l| l.name() == name)
    }

    /// Guids of every entity added by any layer, enabled or not.
    pub fn entity_guids(&self) -> HashSet<Uuid> {
        self.layers.iter().flat_map(|l| l.entity_guids()).collect()
    }

    pub(crate) fn layer_at_mut(&mut self, index: usize) -> &mut Layer {
        &mut self.layers[index]
    }

    // --- Layer management ---

    /// Insert a layer at `index` (clamped to the stack length).
    pub fn insert_layer(&mut self, index: usize, layer: Layer) -> Result<()> {
        if self.index_of(layer.name()).is_some() {
            return Err(Error::DuplicateLayer(layer.name().to_string()));
        }
        let index = index.min(self.layers.len());
        self.layers.insert(index, layer);
        self.set_dirty_above_index(index);
        Ok(())
    }

    /// Add a layer at the bottom of the stack (lowest precedence).
    pub fn push_layer(&mut self, layer: Layer) -> Result<()> {
        self.insert_layer(self.layers.len(), layer)
    }

    /// Remove a layer, marking the layers that were above it dirty.
    pub fn remove_layer(&mut self, name: &str) -> Option<Layer> {
        let index = self.index_of(name)?;
        let layer = self.layers.remove(index);
        self.dirty.forget(name);
        if index > 0 {
            self.set_dirty_above_index(index - 1);
        }
        Some(layer)
    }

    /// Move a layer to a new index.
    pub fn move_layer(&mut self, name: &str, new_index: usize) -> Result<()> {
        let index = self
            .index_of(name)
            .ok_or_else(|| Error::UnknownLayer(name.to_string()))?;
        let new_index = new_index.min(self.layers.len() - 1);
        if index == new_index {
            return Ok(());
        }
        let layer = self.layers.remove(index);
        self.layers.insert(new_index, layer);
        self.set_dirty_above_index(index.max(new_index));
        Ok(())
    }

    pub fn set_layer_enabled(&mut self, name: &str, enabled: bool) -> Result<()> {
        let index = self
            .index_of(name)
            .ok_or_else(|| Error::UnknownLayer(name.to_string()))?;
        if self.layers[index].is_enabled() != enabled {
            self.layers[index].set_enabled(enabled);
            self.set_dirty_above_index(index);
        }
        Ok(())
    }

    /// Locking only affects writes, so it never dirties the composite.
    pub fn set_layer_locked(&mut self, name: &str, locked: bool) -> Result<()> {
        let layer = self
            .layer_mut(name)
            .ok_or_else(|| Error::UnknownLayer(name.to_string()))?;
        layer.set_locked(locked);
        Ok(())
    }

    pub fn set_blend_mode(&mut self, name: &str, mode: BlendMode) -> Result<()> {
        let index = self
            .index_of(name)
            .ok_or_else(|| Error::UnknownLayer(name.to_string()))?;
        if self.layers[index].blend_mode() != mode {
            self.layers[index].set_blend_mode(mode);
            self.set_dirty_above_index(index);
        }
        Ok(())
    }

    /// Clear a layer's content.
    pub fn clear_layer(&mut self, name: &str) -> Result<()> {
        let index = self
            .index_of(name)
            .ok_or_else(|| Error::UnknownLayer(name.to_string()))?;
        self.layers[index].clear();
        self.set_dirty_above_index(index);
        Ok(())
    }

    /// Index of `name`, creating a procedural stencil-blended layer at the
    /// top of the stack when missing. Returns `(index, created)`.
    pub(crate) fn ensure_layer(&mut self, name: &str) -> (usize, bool) {
        if let Some(index) = self.index_of(name) {
            return (index, false);
        }
        log::debug!("Surface '{}': creating layer '{}'", self.name, name);
        let layer = Layer::new(name, LayerKind::Procedural).with_blend_mode(BlendMode::Stencil);
        self.layers.insert(0, layer);
        (0, true)
    }

    /// Change resolutions, resampling every layer.
    pub fn resize(&mut self, config: SurfaceConfig) -> Result<()> {
        config.validate()?;
        for layer in &mut self.layers {
            layer.resize(&config);
        }
        self.config = config;
        if !self.layers.is_empty() {
            self.set_dirty_above_index(self.layers.len() - 1);
        }
        Ok(())
    }

    // --- Dirty propagation ---

    /// Mark `name` and every layer above it dirty. Idempotent: layers that
    /// are already dirty emit no new event.
    pub fn set_dirty_above(&mut self, name: &str) -> Result<()> {
        let index = self
            .index_of(name)
            .ok_or_else(|| Error::UnknownLayer(name.to_string()))?;
        self.set_dirty_above_index(index);
        Ok(())
    }

    pub(crate) fn set_dirty_above_index(&mut self, index: usize) {
        if self.layers.is_empty() {
            return;
        }
        let end = index.min(self.layers.len() - 1);
        for layer in self.layers[..=end].iter_mut().rev() {
            if layer.mark_dirty() {
                self.dirty.notify(layer.name());
            }
        }
    }

    /// Names of dirty layers, clearing their dirty flags.
    pub fn take_dirty_layers(&mut self) -> Vec<String> {
        self.dirty.take_events();
        self.layers
            .iter_mut()
            .filter(|l| l.is_dirty())
            .map(|l| {
                l.clear_dirty();
                l.name().to_string()
            })
            .collect()
    }

    /// Dirty events (in emission order) since the last call.
    pub fn take_dirty_events(&mut self) -> Vec<String> {
        self.dirty.take_events()
    }

    pub fn has_dirty_layers(&self) -> bool {
        self.layers.iter().any(|l| l.is_dirty())
    }

    /// Generation counter of a layer; bumps each time it goes clean -> dirty.
    pub fn generation(&self, name: &str) -> u32 {
        self.dirty.generation(name)
    }

    pub fn subscribe(&mut self, listener: Box<dyn DirtyListener>) {
        self.dirty.subscribe(listener);
    }

    // --- Compound queries ---

    /// Run a compound query.
    pub fn query(&self, query: &CompoundQuery) -> CompoundResult {
        match *query {
            CompoundQuery::Height(rect) => CompoundResult::Grid(self.compound_heights(rect)),
            CompoundQuery::SurfaceWeight(surface, rect) => {
                CompoundResult::Grid(self.compound_surface_weights(surface, rect))
            }
            CompoundQuery::Entities(kind, Some(bounds)) => {
                CompoundResult::Entities(self.compound_entities_in(kind, &bounds))
            }
            CompoundQuery::Entities(kind, None) => CompoundResult::Entities(self.compound_entities(kind)),
        }
    }

    fn fold(&self, slot: StencilSlot, size: GridSize, value: impl Fn(&Layer) -> f32, x: u32, z: u32) -> f32 {
        let mut accum = 0.0;
        for layer in self.layers.iter().rev() {
            if !layer.is_enabled() {
                continue;
            }
            let v = value(layer);
            let s = match layer.blend_mode() {
                BlendMode::Stencil => layer.stencil_strength_at_resolution(slot, x, z, size),
                _ => 0.0,
            };
            accum = layer.blend_mode().blend(accum, v, s);
        }
        accum
    }

    /// Composited height at a cell of the height grid.
    pub fn compound_height_at(&self, x: u32, z: u32) -> f32 {
        let size = self.config.height_resolution;
        self.fold(StencilSlot::Height, size, |l| l.height_at_resolution(x, z, size), x, z)
    }

    /// Composited heights over a region (clamped to the height grid).
    pub fn compound_heights(&self, rect: CellRect) -> CompoundGrid {
        let size = self.config.height_resolution;
        let rect = rect.clamped(size.width, size.height);
        CompoundGrid {
            rect,
            values: rect.iter().map(|(x, z)| self.compound_height_at(x, z)).collect(),
        }
    }

    /// Composited weight of one surface type at a cell of the splat grid.
    pub fn compound_surface_weight_at(&self, surface: SurfaceType, x: u32, z: u32) -> f32 {
        let size = self.config.splat_resolution;
        self.fold(
            StencilSlot::Splat,
            size,
            |l| l.surface_weight_at_resolution(surface, x, z, size),
            x,
            z,
        )
    }

    /// Composited weights of one surface type over a region.
    pub fn compound_surface_weights(&self, surface: SurfaceType, rect: CellRect) -> CompoundGrid {
        let size = self.config.splat_resolution;
        let rect = rect.clamped(size.width, size.height);
        CompoundGrid {
            rect,
            values: rect
                .iter()
                .map(|(x, z)| self.compound_surface_weight_at(surface, x, z))
                .collect(),
        }
    }

    /// Surviving entities of `kind`, lowest layer's adds first.
    ///
    /// An entity survives unless some enabled layer tombstones its guid.
    pub fn compound_entities(&self, kind: EntityKind) -> Vec<Entity> {
        let mut order: Vec<Uuid> = Vec::new();
        let mut by_guid: HashMap<Uuid, &Entity> = HashMap::new();
        for layer in self.layers.iter().rev().filter(|l| l.is_enabled()) {
            for entity in layer.entities(kind) {
                if by_guid.insert(entity.guid(), entity).is_none() {
                    order.push(entity.guid());
                }
            }
        }

        let removed: HashSet<Uuid> = self
            .layers
            .iter()
            .filter(|l| l.is_enabled())
            .filter_map(|l| l.removals(kind))
            .flat_map(|set| set.iter().copied())
            .collect();

        order
            .into_iter()
            .filter(|guid| !removed.contains(guid))
            .filter_map(|guid| by_guid.get(&guid).map(|e| (*e).clone()))
            .collect()
    }

    /// Surviving entities of `kind` whose surface position lies in `bounds`.
    pub fn compound_entities_in(&self, kind: EntityKind, bounds: &Bounds2) -> Vec<Entity> {
        self.compound_entities(kind)
            .into_iter()
            .filter(|e| bounds.contains_point(e.surface_uv()))
            .collect()
    }
}
