//! Reusable terrain stamps and road geometry as sources of write requests.
//!
//! A [`StampTemplate`] holds content in stamp-local `[0,1]²` space. A
//! [`StampInstance`] places it on a surface with a center, size and rotation
//! and turns it into [`WriteRequest`]s for one layer at one priority.

pub mod height;
pub mod spline;

pub use height::{HeightStamp, NoiseParams};
pub use spline::PolylineFalloff;

use std::sync::Arc;

use glam::{Quat, Vec2};

use crate::apply::{falloff, ChannelKind, FalloffCurve, Footprint, GeometryProvider, Sampler, WriteRequest};
use crate::core::Result;
use crate::layer::{EntityKind, EntitySpawn, SurfaceType};

/// Stamp content in stamp-local coordinates.
#[derive(Clone, Debug, Default)]
pub struct StampTemplate {
    pub name: String,
    pub height: Option<HeightStamp>,
    /// Target weights in `[0,1]` per surface type
    pub surface_weights: Vec<(SurfaceType, HeightStamp)>,
    /// Entities placed with stamp-local positions
    pub spawns: Vec<(EntityKind, EntitySpawn)>,
    /// Entity kinds cleared from lower layers under the stamp
    pub clears: Vec<EntityKind>,
}

impl StampTemplate {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_height(mut self, height: HeightStamp) -> Self {
        self.height = Some(height);
        self
    }

    pub fn with_surface(mut self, surface: SurfaceType, weights: HeightStamp) -> Self {
        self.surface_weights.push((surface, weights));
        self
    }

    pub fn with_spawn(mut self, kind: EntityKind, spawn: EntitySpawn) -> Self {
        self.spawns.push((kind, spawn));
        self
    }

    pub fn clearing(mut self, kind: EntityKind) -> Self {
        if !self.clears.contains(&kind) {
            self.clears.push(kind);
        }
        self
    }
}

/// A template placed on a surface.
#[derive(Clone, Debug, PartialEq)]
pub struct StampInstance {
    pub layer: String,
    pub priority: u32,
    pub center: Vec2,
    pub size: Vec2,
    /// Radians, counter-clockwise in surface space
    pub rotation: f32,
    /// Multiplier on template heights
    pub height_scale: f32,
    /// Edge fade in stamp-local units
    pub falloff_margin: f32,
    pub curve: FalloffCurve,
}

impl StampInstance {
    pub fn new(layer: impl Into<String>, priority: u32, center: Vec2, size: Vec2) -> Self {
        Self {
            layer: layer.into(),
            priority,
            center,
            size,
            rotation: 0.0,
            height_scale: 1.0,
            falloff_margin: 0.1,
            curve: FalloffCurve::Smooth,
        }
    }

    pub fn with_rotation(mut self, rotation: f32) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_height_scale(mut self, scale: f32) -> Self {
        self.height_scale = scale;
        self
    }

    pub fn with_falloff(mut self, margin: f32, curve: FalloffCurve) -> Self {
        self.falloff_margin = margin;
        self.curve = curve;
        self
    }

    fn local_sampler(&self, stamp: &HeightStamp, scale: f32) -> Sampler {
        let stamp = Arc::new(stamp.clone());
        let footprint = self.footprint();
        falloff::sampler(move |uv| stamp.sample(footprint.to_local(uv)) * scale)
    }

    /// Requests writing `template` at this placement: entity clears first,
    /// then height, surface weights and spawns.
    pub fn requests(&self, template: &StampTemplate) -> Result<Vec<WriteRequest>> {
        let mut requests = Vec::new();
        let builder = |channel| {
            WriteRequest::builder(self.layer.clone(), channel)
                .priority(self.priority)
                .geometry(self)
        };

        for kind in &template.clears {
            requests.push(builder(ChannelKind::Entities(*kind)).remove().build()?);
        }
        if let Some(height) = &template.height {
            requests.push(
                builder(ChannelKind::Height)
                    .values(self.local_sampler(height, self.height_scale))
                    .build()?,
            );
        }
        for (surface, weights) in &template.surface_weights {
            requests.push(
                builder(ChannelKind::SurfaceWeight(*surface))
                    .values(self.local_sampler(weights, 1.0))
                    .build()?,
            );
        }

        let footprint = self.footprint();
        let yaw = Quat::from_rotation_y(-self.rotation);
        for kind in [EntityKind::Tree, EntityKind::Object] {
            let spawns: Vec<EntitySpawn> = template
                .spawns
                .iter()
                .filter(|(k, _)| *k == kind)
                .map(|(_, spawn)| {
                    let uv = footprint.to_surface(spawn.uv());
                    let mut placed = spawn.clone();
                    placed.position.x = uv.x;
                    placed.position.z = uv.y;
                    placed.rotation = yaw * spawn.rotation;
                    placed
                })
                .collect();
            if !spawns.is_empty() {
                requests.push(builder(ChannelKind::Entities(kind)).spawns(spawns).build()?);
            }
        }

        log::debug!(
            "Stamp '{}' on '{}' (key {}): {} requests",
            template.name,
            self.layer,
            self.priority,
            requests.len()
        );
        Ok(requests)
    }
}

impl GeometryProvider for StampInstance {
    fn footprint(&self) -> Footprint {
        Footprint::oriented(self.center, self.size * 0.5, self.rotation)
    }

    fn falloff(&self) -> Sampler {
        falloff::footprint_edge(self.footprint(), self.falloff_margin, self.curve.clone())
    }
}
