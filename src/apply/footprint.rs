//! Spatial footprints of write requests.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::layer::GridSize;
use crate::math::{cell_center, Bounds2};

/// Region of the surface a write may touch, in normalized coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Footprint {
    /// Axis-aligned bounds
    Rect(Bounds2),
    /// Rectangle rotated by `rotation` radians around `center`
    Oriented {
        center: Vec2,
        half_extents: Vec2,
        rotation: f32,
    },
}

impl Footprint {
    /// The whole surface.
    pub fn full() -> Self {
        Footprint::Rect(Bounds2::UNIT)
    }

    pub fn rect(min: Vec2, max: Vec2) -> Self {
        Footprint::Rect(Bounds2::new(min, max))
    }

    pub fn oriented(center: Vec2, half_extents: Vec2, rotation: f32) -> Self {
        Footprint::Oriented { center, half_extents, rotation }
    }

    /// True for zero/negative size or non-finite geometry.
    pub fn is_degenerate(&self) -> bool {
        match *self {
            Footprint::Rect(bounds) => bounds.is_degenerate(),
            Footprint::Oriented { center, half_extents, rotation } => {
                !center.is_finite()
                    || !half_extents.is_finite()
                    || !rotation.is_finite()
                    || half_extents.x <= 0.0
                    || half_extents.y <= 0.0
            }
        }
    }

    /// Axis-aligned bounds enclosing the footprint.
    pub fn bounds(&self) -> Bounds2 {
        match *self {
            Footprint::Rect(bounds) => bounds,
            Footprint::Oriented { center, half_extents, rotation } => {
                let axis = Vec2::from_angle(rotation);
                let ex = axis.rotate(Vec2::new(half_extents.x, 0.0)).abs();
                let ez = axis.rotate(Vec2::new(0.0, half_extents.y)).abs();
                Bounds2::from_center_half_extent(center, ex + ez)
            }
        }
    }

    /// Map a surface point into footprint-local `[0,1]x[0,1]` coordinates.
    /// Points outside the footprint map outside the unit square.
    pub fn to_local(&self, uv: Vec2) -> Vec2 {
        match *self {
            Footprint::Rect(bounds) => (uv - bounds.min) / bounds.size(),
            Footprint::Oriented { center, half_extents, rotation } => {
                let local = Vec2::from_angle(-rotation).rotate(uv - center);
                local / half_extents * 0.5 + Vec2::splat(0.5)
            }
        }
    }

    /// Map footprint-local coordinates back to the surface.
    pub fn to_surface(&self, local: Vec2) -> Vec2 {
        match *self {
            Footprint::Rect(bounds) => bounds.min + local * bounds.size(),
            Footprint::Oriented { center, half_extents, rotation } => {
                let offset = (local - Vec2::splat(0.5)) * 2.0 * half_extents;
                center + Vec2::from_angle(rotation).rotate(offset)
            }
        }
    }

    /// Whether a surface point lies inside (edges inclusive).
    pub fn contains(&self, uv: Vec2) -> bool {
        match *self {
            Footprint::Rect(bounds) => bounds.contains_point(uv),
            Footprint::Oriented { .. } => {
                let local = self.to_local(uv);
                (0.0..=1.0).contains(&local.x) && (0.0..=1.0).contains(&local.y)
            }
        }
    }

    /// Cells of a `size` grid whose centers fall inside the footprint.
    pub fn cells(&self, size: GridSize) -> impl Iterator<Item = (u32, u32)> + use<> {
        let footprint = *self;
        self.bounds()
            .cell_range(size.width, size.height)
            .iter()
            .filter(move |&(x, z)| footprint.contains(cell_center(x, z, size.width, size.height)))
    }

    /// Upper bound on the cells touched on a `size` grid.
    pub fn cell_estimate(&self, size: GridSize) -> usize {
        self.bounds().cell_range(size.width, size.height).cell_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_degenerate() {
        assert!(Footprint::rect(Vec2::ZERO, Vec2::new(0.0, 1.0)).is_degenerate());
        assert!(Footprint::oriented(Vec2::splat(0.5), Vec2::new(0.1, -0.1), 0.0).is_degenerate());
        assert!(Footprint::oriented(Vec2::splat(0.5), Vec2::splat(0.1), f32::NAN).is_degenerate());
        assert!(!Footprint::full().is_degenerate());
    }

    #[test]
    fn test_rect_cells() {
        let cells: Vec<_> = Footprint::rect(Vec2::ZERO, Vec2::splat(0.5)).cells(GridSize::square(4)).collect();
        assert_eq!(cells, vec![(0, 0), (1, 0), (0, 1), (1, 1)]);
    }

    #[test]
    fn test_oriented_bounds_rotated_quarter_turn() {
        let fp = Footprint::oriented(Vec2::splat(0.5), Vec2::new(0.4, 0.1), FRAC_PI_2);
        let bounds = fp.bounds();
        assert!((bounds.size().x - 0.2).abs() < 1e-5);
        assert!((bounds.size().y - 0.8).abs() < 1e-5);
        assert!(fp.contains(Vec2::new(0.5, 0.85)));
        assert!(!fp.contains(Vec2::new(0.85, 0.5)));
    }

    #[test]
    fn test_local_round_trip() {
        let fp = Footprint::oriented(Vec2::new(0.3, 0.6), Vec2::new(0.2, 0.1), 0.7);
        let local = Vec2::new(0.25, 0.8);
        let back = fp.to_local(fp.to_surface(local));
        assert!((back - local).length() < 1e-5);
        assert_eq!(fp.to_local(Vec2::new(0.3, 0.6)), Vec2::splat(0.5));
    }

    #[test]
    fn test_cells_subset_of_estimate() {
        let fp = Footprint::oriented(Vec2::splat(0.5), Vec2::new(0.3, 0.05), 0.5);
        let size = GridSize::square(32);
        let count = fp.cells(size).count();
        assert!(count > 0);
        assert!(count <= fp.cell_estimate(size));
    }
}
