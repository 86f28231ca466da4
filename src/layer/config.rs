//! Surface configuration: grid resolutions and registered surface types.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};
use super::StencilSlot;

/// Identifier of a surface-weight type (grass, dirt, rock, ...).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SurfaceType(pub u16);

/// Registered surface type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SurfaceDef {
    pub id: SurfaceType,
    pub name: String,
}

impl SurfaceDef {
    pub fn new(id: u16, name: impl Into<String>) -> Self {
        Self { id: SurfaceType(id), name: name.into() }
    }
}

/// Width and height of a channel grid in cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridSize {
    pub width: u32,
    pub height: u32,
}

impl GridSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const fn square(size: u32) -> Self {
        Self { width: size, height: size }
    }

    pub fn cell_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Configuration of one target surface (terrain tile).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceConfig {
    /// Height grid resolution
    pub height_resolution: GridSize,
    /// Surface-weight (splat) grid resolution
    pub splat_resolution: GridSize,
    /// Cell grid used to arbitrate discrete entity writes
    pub entity_resolution: GridSize,
    /// Surface types that splat writes may target
    pub surface_types: Vec<SurfaceDef>,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            height_resolution: GridSize::square(65),
            splat_resolution: GridSize::square(64),
            entity_resolution: GridSize::square(32),
            surface_types: vec![
                SurfaceDef::new(0, "grass"),
                SurfaceDef::new(1, "dirt"),
                SurfaceDef::new(2, "rock"),
            ],
        }
    }
}

impl SurfaceConfig {
    /// Same resolution for every channel kind.
    pub fn uniform(size: u32) -> Self {
        Self {
            height_resolution: GridSize::square(size),
            splat_resolution: GridSize::square(size),
            entity_resolution: GridSize::square(size),
            ..Default::default()
        }
    }

    /// Check resolutions are non-zero and surface ids unique.
    pub fn validate(&self) -> Result<()> {
        for (label, size) in [
            ("height", self.height_resolution),
            ("splat", self.splat_resolution),
            ("entity", self.entity_resolution),
        ] {
            if size.width == 0 || size.height == 0 {
                return Err(Error::Config(format!("{} resolution must be non-zero", label)));
            }
        }
        for (i, def) in self.surface_types.iter().enumerate() {
            if self.surface_types[..i].iter().any(|d| d.id == def.id) {
                return Err(Error::Config(format!("duplicate surface type id {}", def.id.0)));
            }
        }
        Ok(())
    }

    /// Whether splat writes may target `surface`.
    pub fn has_surface(&self, surface: SurfaceType) -> bool {
        self.surface_types.iter().any(|d| d.id == surface)
    }

    /// Look up a surface type by name.
    pub fn surface_by_name(&self, name: &str) -> Option<SurfaceType> {
        self.surface_types.iter().find(|d| d.name == name).map(|d| d.id)
    }

    /// Grid resolution of the channels guarded by `slot`.
    pub fn resolution_for(&self, slot: StencilSlot) -> GridSize {
        match slot {
            StencilSlot::Height => self.height_resolution,
            StencilSlot::Splat => self.splat_resolution,
            StencilSlot::Entities(_) => self.entity_resolution,
        }
    }

    /// Load from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: SurfaceConfig = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    /// Save to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_is_valid() {
        let config = SurfaceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.surface_by_name("rock"), Some(SurfaceType(2)));
        assert!(config.has_surface(SurfaceType(0)));
        assert!(!config.has_surface(SurfaceType(9)));
    }

    #[test]
    fn test_validate_rejects_zero_resolution() {
        let config = SurfaceConfig {
            splat_resolution: GridSize::new(0, 16),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_duplicate_surface() {
        let mut config = SurfaceConfig::default();
        config.surface_types.push(SurfaceDef::new(1, "mud"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: SurfaceConfig =
            serde_json::from_str(r#"{ "height_resolution": { "width": 9, "height": 9 } }"#).unwrap();
        assert_eq!(config.height_resolution, GridSize::square(9));
        assert_eq!(config.splat_resolution, GridSize::square(64));
        assert_eq!(config.surface_types.len(), 3);
    }

    #[test]
    fn test_save_load() {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let path = temp_dir.path().join("surface.json");
        let config = SurfaceConfig::uniform(16);
        config.save(&path).expect("save failed");
        let loaded = SurfaceConfig::load(&path).expect("load failed");
        assert_eq!(loaded, config);
    }
}
