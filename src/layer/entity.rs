//! Discrete entities (trees, objects) placed by write requests.

use glam::{Quat, Vec2, Vec3};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Category of discrete entity. Each kind has its own add list, tombstone
/// set and stencil per layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    Tree,
    Object,
}

/// Index into the consumer's prototype table (tree species, prefab, ...).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrototypeRef(pub u32);

/// A placed entity. Immutable once created; deleted only by tombstoning its
/// guid in another layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    guid: Uuid,
    prototype: PrototypeRef,
    /// x/z in normalized surface space, y is a height offset
    position: Vec3,
    rotation: Quat,
    scale: Vec3,
}

impl Entity {
    /// Create an entity with a fresh guid.
    pub fn new(prototype: PrototypeRef, position: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self::with_guid(Uuid::new_v4(), prototype, position, rotation, scale)
    }

    pub fn with_guid(guid: Uuid, prototype: PrototypeRef, position: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self { guid, prototype, position, rotation, scale }
    }

    pub fn guid(&self) -> Uuid {
        self.guid
    }

    pub fn prototype(&self) -> PrototypeRef {
        self.prototype
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    /// Position projected onto the surface plane.
    pub fn surface_uv(&self) -> Vec2 {
        Vec2::new(self.position.x, self.position.z)
    }
}

/// Request to create one entity, carried by a spawn payload.
#[derive(Clone, Debug, PartialEq)]
pub struct EntitySpawn {
    pub prototype: PrototypeRef,
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    /// Preassigned guid; a fresh one is generated when `None`
    pub guid: Option<Uuid>,
}

impl EntitySpawn {
    /// Spawn at normalized surface point `uv`.
    pub fn new(prototype: PrototypeRef, uv: Vec2) -> Self {
        Self {
            prototype,
            position: Vec3::new(uv.x, 0.0, uv.y),
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            guid: None,
        }
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_height(mut self, height: f32) -> Self {
        self.position.y = height;
        self
    }

    pub fn with_guid(mut self, guid: Uuid) -> Self {
        self.guid = Some(guid);
        self
    }

    pub fn uv(&self) -> Vec2 {
        Vec2::new(self.position.x, self.position.z)
    }

    /// Materialize the entity.
    pub fn into_entity(self) -> Entity {
        let guid = self.guid.unwrap_or_else(Uuid::new_v4);
        Entity::with_guid(guid, self.prototype, self.position, self.rotation, self.scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entities_get_unique_guids() {
        let a = Entity::new(PrototypeRef(0), Vec3::ZERO, Quat::IDENTITY, Vec3::ONE);
        let b = Entity::new(PrototypeRef(0), Vec3::ZERO, Quat::IDENTITY, Vec3::ONE);
        assert_ne!(a.guid(), b.guid());
    }

    #[test]
    fn test_spawn_builder() {
        let guid = Uuid::new_v4();
        let entity = EntitySpawn::new(PrototypeRef(3), Vec2::new(0.25, 0.75))
            .with_height(1.5)
            .with_scale(Vec3::splat(2.0))
            .with_guid(guid)
            .into_entity();
        assert_eq!(entity.guid(), guid);
        assert_eq!(entity.prototype(), PrototypeRef(3));
        assert_eq!(entity.position(), Vec3::new(0.25, 1.5, 0.75));
        assert_eq!(entity.surface_uv(), Vec2::new(0.25, 0.75));
        assert_eq!(entity.scale(), Vec3::splat(2.0));
    }
}
