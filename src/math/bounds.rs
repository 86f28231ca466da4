//! Axis-aligned bounds in normalized surface space

use crate::core::types::Vec2;
use serde::{Deserialize, Serialize};

use super::CellRect;

/// 2D axis-aligned bounding box defined by min and max corners
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Bounds2 {
    pub min: Vec2,
    pub max: Vec2,
}

impl Bounds2 {
    /// The whole surface, `[0,1]x[0,1]`.
    pub const UNIT: Bounds2 = Bounds2 { min: Vec2::ZERO, max: Vec2::ONE };

    /// Create bounds from min and max corners
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    /// Create bounds from center and half-extents
    pub fn from_center_half_extent(center: Vec2, half_extent: Vec2) -> Self {
        Self {
            min: center - half_extent,
            max: center + half_extent,
        }
    }

    /// Get center point
    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    /// Get size (max - min)
    pub fn size(&self) -> Vec2 {
        self.max - self.min
    }

    /// Get half-extents
    pub fn half_extent(&self) -> Vec2 {
        self.size() * 0.5
    }

    /// Area, zero or negative for degenerate bounds
    pub fn area(&self) -> f32 {
        let size = self.size();
        if size.x <= 0.0 || size.y <= 0.0 {
            0.0
        } else {
            size.x * size.y
        }
    }

    /// True if the bounds enclose no area or hold non-finite corners.
    pub fn is_degenerate(&self) -> bool {
        !self.min.is_finite() || !self.max.is_finite() || self.area() <= 0.0
    }

    /// Check if point is inside the bounds (inclusive)
    pub fn contains_point(&self, p: Vec2) -> bool {
        p.x >= self.min.x && p.x <= self.max.x &&
        p.y >= self.min.y && p.y <= self.max.y
    }

    /// Check if two bounds intersect
    pub fn intersects(&self, other: &Bounds2) -> bool {
        self.min.x <= other.max.x && self.max.x >= other.min.x &&
        self.min.y <= other.max.y && self.max.y >= other.min.y
    }

    /// Expand bounds to include point
    pub fn expand(&mut self, point: Vec2) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    /// Return bounds grown by `margin` on every side
    pub fn inflated(&self, margin: f32) -> Bounds2 {
        Bounds2 {
            min: self.min - Vec2::splat(margin),
            max: self.max + Vec2::splat(margin),
        }
    }

    /// Return merged bounds containing both
    pub fn merged(&self, other: &Bounds2) -> Bounds2 {
        Bounds2 {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Cells of a `width x height` grid whose centers may fall inside these bounds.
    ///
    /// The result is clamped to the grid and may be empty.
    pub fn cell_range(&self, width: u32, height: u32) -> CellRect {
        let to_cell = |v: f32, n: u32| -> i64 {
            // Cell x has center (x + 0.5) / n, so the first center >= v is ceil(v*n - 0.5).
            (v * n as f32 - 0.5).ceil() as i64
        };
        let x0 = to_cell(self.min.x, width).clamp(0, width as i64);
        let z0 = to_cell(self.min.y, height).clamp(0, height as i64);
        let x1 = ((self.max.x * width as f32 - 0.5).floor() as i64 + 1).clamp(0, width as i64);
        let z1 = ((self.max.y * height as f32 - 0.5).floor() as i64 + 1).clamp(0, height as i64);
        CellRect::new(x0 as u32, z0 as u32, x1.max(x0) as u32, z1.max(z0) as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_and_accessors() {
        let b = Bounds2::new(Vec2::ZERO, Vec2::ONE);
        assert_eq!(b.center(), Vec2::splat(0.5));
        assert_eq!(b.size(), Vec2::ONE);
        assert_eq!(b.area(), 1.0);
    }

    #[test]
    fn test_degenerate() {
        assert!(Bounds2::new(Vec2::ONE, Vec2::ONE).is_degenerate());
        assert!(Bounds2::new(Vec2::ONE, Vec2::ZERO).is_degenerate());
        assert!(Bounds2::new(Vec2::ZERO, Vec2::new(f32::NAN, 1.0)).is_degenerate());
        assert!(!Bounds2::UNIT.is_degenerate());
    }

    #[test]
    fn test_contains_and_intersects() {
        let a = Bounds2::new(Vec2::ZERO, Vec2::ONE);
        let b = Bounds2::new(Vec2::splat(0.5), Vec2::splat(1.5));
        let c = Bounds2::new(Vec2::splat(2.0), Vec2::splat(3.0));
        assert!(a.contains_point(Vec2::splat(0.5)));
        assert!(!a.contains_point(Vec2::splat(2.0)));
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn test_cell_range_whole_surface() {
        let rect = Bounds2::UNIT.cell_range(4, 4);
        assert_eq!(rect, CellRect::new(0, 0, 4, 4));
    }

    #[test]
    fn test_cell_range_sub_region() {
        // Centers of a 4-wide grid: 0.125, 0.375, 0.625, 0.875
        let b = Bounds2::new(Vec2::new(0.3, 0.0), Vec2::new(0.7, 0.2));
        let rect = b.cell_range(4, 4);
        assert_eq!(rect, CellRect::new(1, 0, 3, 1));
    }

    #[test]
    fn test_cell_range_outside_is_empty() {
        let b = Bounds2::new(Vec2::splat(2.0), Vec2::splat(3.0));
        assert!(b.cell_range(8, 8).is_empty());
    }
}
