//! Mathematical utilities and data structures

pub mod bounds;
pub mod cell;

pub use bounds::Bounds2;
pub use cell::CellRect;

/// Linear interpolation from `a` to `b` by `t`.
#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Normalized center of cell `(x, z)` on a `width x height` grid.
#[inline]
pub fn cell_center(x: u32, z: u32, width: u32, height: u32) -> glam::Vec2 {
    glam::Vec2::new(
        (x as f32 + 0.5) / width as f32,
        (z as f32 + 0.5) / height as f32,
    )
}

/// Cell containing normalized point `uv`, clamped to the grid.
#[inline]
pub fn cell_at(uv: glam::Vec2, width: u32, height: u32) -> (u32, u32) {
    let x = (uv.x * width as f32).floor().clamp(0.0, (width.max(1) - 1) as f32);
    let z = (uv.y * height as f32).floor().clamp(0.0, (height.max(1) - 1) as f32);
    (x as u32, z as u32)
}
