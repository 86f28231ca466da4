//! Integer cell ranges over a grid

use serde::{Deserialize, Serialize};

/// Half-open rectangle of grid cells: `x0..x1` by `z0..z1`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellRect {
    pub x0: u32,
    pub z0: u32,
    pub x1: u32,
    pub z1: u32,
}

impl CellRect {
    pub fn new(x0: u32, z0: u32, x1: u32, z1: u32) -> Self {
        Self { x0, z0, x1, z1 }
    }

    /// Rectangle covering a whole `width x height` grid.
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn width(&self) -> u32 {
        self.x1.saturating_sub(self.x0)
    }

    pub fn height(&self) -> u32 {
        self.z1.saturating_sub(self.z0)
    }

    /// Number of cells covered.
    pub fn cell_count(&self) -> usize {
        self.width() as usize * self.height() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.cell_count() == 0
    }

    pub fn contains(&self, x: u32, z: u32) -> bool {
        x >= self.x0 && x < self.x1 && z >= self.z0 && z < self.z1
    }

    /// Clamp to a `width x height` grid.
    pub fn clamped(&self, width: u32, height: u32) -> CellRect {
        let x1 = self.x1.min(width);
        let z1 = self.z1.min(height);
        CellRect::new(self.x0.min(x1), self.z0.min(z1), x1, z1)
    }

    /// Iterate cells row by row (z outer, x inner).
    pub fn iter(&self) -> impl Iterator<Item = (u32, u32)> + use<> {
        let (x0, x1) = (self.x0, self.x1);
        (self.z0..self.z1).flat_map(move |z| (x0..x1).map(move |x| (x, z)))
    }
}
