//! Write requests: immutable descriptions of one write into one layer channel.

use glam::Vec2;

use super::falloff::{self, Sampler};
use super::Footprint;
use crate::core::{Error, Result};
use crate::layer::{EntityKind, EntitySpawn, StencilSlot, SurfaceConfig, SurfaceType};
use crate::stencil::MAX_OWNER_KEY;

/// Channel a request writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Height,
    SurfaceWeight(SurfaceType),
    Entities(EntityKind),
}

impl ChannelKind {
    /// Stencil arbitrating writes to this channel.
    pub fn stencil_slot(&self) -> StencilSlot {
        match *self {
            ChannelKind::Height => StencilSlot::Height,
            ChannelKind::SurfaceWeight(_) => StencilSlot::Splat,
            ChannelKind::Entities(kind) => StencilSlot::Entities(kind),
        }
    }
}

/// What a request writes.
#[derive(Clone)]
pub enum Payload {
    /// Per-cell value for height or surface-weight channels
    Scalar(Sampler),
    /// Entities to create
    Spawn(Vec<EntitySpawn>),
    /// Tombstone entities of other layers inside the footprint
    Remove,
}

impl Payload {
    fn matches(&self, channel: ChannelKind) -> bool {
        matches!(
            (channel, self),
            (ChannelKind::Height | ChannelKind::SurfaceWeight(_), Payload::Scalar(_))
                | (ChannelKind::Entities(_), Payload::Spawn(_) | Payload::Remove)
        )
    }
}

impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Payload::Scalar(_) => f.write_str("Scalar(<sampler>)"),
            Payload::Spawn(spawns) => write!(f, "Spawn({} entities)", spawns.len()),
            Payload::Remove => f.write_str("Remove"),
        }
    }
}

/// One write into one layer channel. Immutable once built.
#[derive(Clone)]
pub struct WriteRequest {
    target_layer: String,
    channel: ChannelKind,
    priority_key: u32,
    footprint: Footprint,
    falloff: Sampler,
    payload: Payload,
}

impl WriteRequest {
    /// Start building a request for `channel` of `target_layer`.
    pub fn builder(target_layer: impl Into<String>, channel: ChannelKind) -> WriteRequestBuilder {
        WriteRequestBuilder {
            target_layer: target_layer.into(),
            channel,
            priority_key: 0,
            footprint: None,
            falloff: None,
            payload: None,
        }
    }

    pub fn target_layer(&self) -> &str {
        &self.target_layer
    }

    pub fn channel(&self) -> ChannelKind {
        self.channel
    }

    pub fn priority_key(&self) -> u32 {
        self.priority_key
    }

    pub fn footprint(&self) -> &Footprint {
        &self.footprint
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Falloff at a surface point, clamped to `[0,1]`; 0 outside the footprint.
    pub fn falloff_at(&self, uv: Vec2) -> f32 {
        if !self.footprint.contains(uv) {
            return 0.0;
        }
        let w = (self.falloff)(uv);
        if w.is_nan() { 0.0 } else { w.clamp(0.0, 1.0) }
    }

    /// Structural validation, independent of any surface.
    pub fn validate(&self) -> Result<()> {
        if self.target_layer.is_empty() {
            return Err(Error::InvalidRequest("empty target layer name".into()));
        }
        if self.priority_key == 0 {
            return Err(Error::InvalidRequest("priority key 0 is reserved".into()));
        }
        if self.priority_key > MAX_OWNER_KEY {
            return Err(Error::InvalidRequest(format!(
                "priority key {} exceeds maximum {}",
                self.priority_key, MAX_OWNER_KEY
            )));
        }
        if self.footprint.is_degenerate() {
            return Err(Error::InvalidRequest(format!(
                "degenerate footprint {:?}",
                self.footprint
            )));
        }
        if !self.payload.matches(self.channel) {
            return Err(Error::InvalidRequest(format!(
                "payload {:?} cannot write channel {:?}",
                self.payload, self.channel
            )));
        }
        Ok(())
    }

    /// Validation against a surface: the channel must be known there.
    pub fn validate_for(&self, config: &SurfaceConfig) -> Result<()> {
        self.validate()?;
        if let ChannelKind::SurfaceWeight(surface) = self.channel {
            if !config.has_surface(surface) {
                return Err(Error::InvalidRequest(format!(
                    "unknown surface type {}",
                    surface.0
                )));
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for WriteRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteRequest")
            .field("target_layer", &self.target_layer)
            .field("channel", &self.channel)
            .field("priority_key", &self.priority_key)
            .field("footprint", &self.footprint)
            .field("payload", &self.payload)
            .finish()
    }
}

/// Builder for [`WriteRequest`]. The falloff defaults to full strength.
pub struct WriteRequestBuilder {
    target_layer: String,
    channel: ChannelKind,
    priority_key: u32,
    footprint: Option<Footprint>,
    falloff: Option<Sampler>,
    payload: Option<Payload>,
}

impl WriteRequestBuilder {
    pub fn priority(mut self, key: u32) -> Self {
        self.priority_key = key;
        self
    }

    pub fn footprint(mut self, footprint: Footprint) -> Self {
        self.footprint = Some(footprint);
        self
    }

    pub fn falloff(mut self, falloff: Sampler) -> Self {
        self.falloff = Some(falloff);
        self
    }

    /// Footprint and falloff from a geometry provider.
    pub fn geometry(self, provider: &dyn super::GeometryProvider) -> Self {
        self.footprint(provider.footprint()).falloff(provider.falloff())
    }

    pub fn payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Per-cell scalar payload.
    pub fn values(self, sampler: Sampler) -> Self {
        self.payload(Payload::Scalar(sampler))
    }

    /// Constant scalar payload.
    pub fn value(self, value: f32) -> Self {
        self.values(falloff::constant(value))
    }

    pub fn spawns(self, spawns: Vec<EntitySpawn>) -> Self {
        self.payload(Payload::Spawn(spawns))
    }

    pub fn remove(self) -> Self {
        self.payload(Payload::Remove)
    }

    /// Validate and build.
    pub fn build(self) -> Result<WriteRequest> {
        let footprint = self
            .footprint
            .ok_or_else(|| Error::InvalidRequest("missing footprint".into()))?;
        let payload = self
            .payload
            .ok_or_else(|| Error::InvalidRequest("missing payload".into()))?;
        let request = WriteRequest {
            target_layer: self.target_layer,
            channel: self.channel,
            priority_key: self.priority_key,
            footprint,
            falloff: self.falloff.unwrap_or_else(|| falloff::constant(1.0)),
            payload,
        };
        request.validate()?;
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::PrototypeRef;

    fn height(priority: u32) -> WriteRequestBuilder {
        WriteRequest::builder("roads", ChannelKind::Height)
            .priority(priority)
            .footprint(Footprint::full())
            .value(1.0)
    }

    #[test]
    fn test_build_valid() {
        let request = height(3).build().unwrap();
        assert_eq!(request.target_layer(), "roads");
        assert_eq!(request.priority_key(), 3);
        assert_eq!(request.channel().stencil_slot(), StencilSlot::Height);
        assert_eq!(request.falloff_at(Vec2::splat(0.5)), 1.0);
    }

    #[test]
    fn test_priority_zero_rejected() {
        assert!(matches!(height(0).build(), Err(Error::InvalidRequest(_))));
        assert!(height(MAX_OWNER_KEY + 1).build().is_err());
    }

    #[test]
    fn test_degenerate_footprint_rejected() {
        let result = height(1)
            .footprint(Footprint::rect(Vec2::splat(0.5), Vec2::splat(0.5)))
            .build();
        assert!(matches!(result, Err(Error::InvalidRequest(_))));
    }

    #[test]
    fn test_payload_mismatch_rejected() {
        let result = WriteRequest::builder("trees", ChannelKind::Height)
            .priority(1)
            .footprint(Footprint::full())
            .remove()
            .build();
        assert!(result.is_err());

        let result = WriteRequest::builder("trees", ChannelKind::Entities(EntityKind::Tree))
            .priority(1)
            .footprint(Footprint::full())
            .value(2.0)
            .build();
        assert!(result.is_err());

        let result = WriteRequest::builder("trees", ChannelKind::Entities(EntityKind::Tree))
            .priority(1)
            .footprint(Footprint::full())
            .spawns(vec![EntitySpawn::new(PrototypeRef(0), Vec2::splat(0.5))])
            .build();
        assert!(result.is_ok());
    }

    #[test]
    fn test_unknown_surface_rejected_for_config() {
        let request = WriteRequest::builder("paint", ChannelKind::SurfaceWeight(SurfaceType(42)))
            .priority(1)
            .footprint(Footprint::full())
            .value(1.0)
            .build()
            .unwrap();
        assert!(request.validate_for(&SurfaceConfig::default()).is_err());
    }

    #[test]
    fn test_falloff_clamped_and_zero_outside() {
        let request = height(1)
            .footprint(Footprint::rect(Vec2::ZERO, Vec2::splat(0.5)))
            .falloff(falloff::constant(3.0))
            .build()
            .unwrap();
        assert_eq!(request.falloff_at(Vec2::splat(0.25)), 1.0);
        assert_eq!(request.falloff_at(Vec2::splat(0.75)), 0.0);
    }

    #[test]
    fn test_missing_parts() {
        let result = WriteRequest::builder("roads", ChannelKind::Height).priority(1).value(1.0).build();
        assert!(result.is_err());
        let result = WriteRequest::builder("", ChannelKind::Height)
            .priority(1)
            .footprint(Footprint::full())
            .value(1.0)
            .build();
        assert!(result.is_err());
    }
}
