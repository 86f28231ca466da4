//! Tiled sparse grid storage.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::{ChannelValue, Interpolate};
use crate::math::{cell_center, CellRect};

/// Edge length of a storage tile in cells.
pub const TILE_SIZE: u32 = 16;

const TILE_CELLS: usize = (TILE_SIZE * TILE_SIZE) as usize;

/// A `width x height` grid of values with a neutral default.
///
/// Cells are grouped into `TILE_SIZE`² tiles that are allocated on first
/// non-neutral write. Reads outside the grid return the neutral value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SparseChannelData<T>", bound(deserialize = "T: ChannelValue"))]
pub struct SparseChannel<T> {
    width: u32,
    height: u32,
    neutral: T,
    tiles_x: u32,
    tiles: Vec<Option<Vec<T>>>,
}

/// Serialized form, checked before it becomes a channel.
#[derive(Deserialize)]
#[serde(bound(deserialize = "T: ChannelValue"))]
struct SparseChannelData<T> {
    width: u32,
    height: u32,
    neutral: T,
    tiles_x: u32,
    tiles: Vec<Option<Vec<T>>>,
}

impl<T: ChannelValue> TryFrom<SparseChannelData<T>> for SparseChannel<T> {
    type Error = String;

    fn try_from(data: SparseChannelData<T>) -> std::result::Result<Self, String> {
        let tiles_x = data.width.div_ceil(TILE_SIZE);
        if data.tiles_x != tiles_x {
            return Err(format!(
                "channel {}x{} has {} tile columns, expected {}",
                data.width, data.height, data.tiles_x, tiles_x
            ));
        }
        let expected = tiles_x as usize * data.height.div_ceil(TILE_SIZE) as usize;
        if data.tiles.len() != expected {
            return Err(format!(
                "channel {}x{} has {} tiles, expected {}",
                data.width,
                data.height,
                data.tiles.len(),
                expected
            ));
        }
        if let Some(len) = data.tiles.iter().flatten().map(Vec::len).find(|len| *len != TILE_CELLS) {
            return Err(format!("channel tile has {} cells, expected {}", len, TILE_CELLS));
        }
        Ok(Self {
            width: data.width,
            height: data.height,
            neutral: data.neutral,
            tiles_x,
            tiles: data.tiles,
        })
    }
}

impl<T: ChannelValue> SparseChannel<T> {
    /// Create an empty channel whose neutral value is `T::default()`.
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_neutral(width, height, T::default())
    }

    /// Create an empty channel with an explicit neutral value.
    pub fn with_neutral(width: u32, height: u32, neutral: T) -> Self {
        let tiles_x = width.div_ceil(TILE_SIZE);
        let tiles_z = height.div_ceil(TILE_SIZE);
        Self {
            width,
            height,
            neutral,
            tiles_x,
            tiles: vec![None; (tiles_x * tiles_z) as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// `(width, height)`
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn neutral(&self) -> T {
        self.neutral
    }

    pub fn in_bounds(&self, x: u32, z: u32) -> bool {
        x < self.width && z < self.height
    }

    #[inline]
    fn locate(&self, x: u32, z: u32) -> (usize, usize) {
        let tile = (z / TILE_SIZE) * self.tiles_x + x / TILE_SIZE;
        let local = (z % TILE_SIZE) * TILE_SIZE + x % TILE_SIZE;
        (tile as usize, local as usize)
    }

    /// Value at `(x, z)`, or the neutral value when out of range or unwritten.
    pub fn get(&self, x: u32, z: u32) -> T {
        if !self.in_bounds(x, z) {
            return self.neutral;
        }
        let (tile, local) = self.locate(x, z);
        match &self.tiles[tile] {
            Some(cells) => cells[local],
            None => self.neutral,
        }
    }

    /// Store `value` at `(x, z)`. Returns false (and does nothing) when out of range.
    pub fn set(&mut self, x: u32, z: u32, value: T) -> bool {
        if !self.in_bounds(x, z) {
            return false;
        }
        let (tile, local) = self.locate(x, z);
        let neutral = self.neutral;
        let slot = &mut self.tiles[tile];
        if let Some(cells) = slot.as_mut() {
            cells[local] = value;
            return true;
        }
        if value != neutral {
            let mut cells = vec![neutral; TILE_CELLS];
            cells[local] = value;
            *slot = Some(cells);
        }
        true
    }

    /// Apply `f` to the value at `(x, z)` in place.
    pub fn update(&mut self, x: u32, z: u32, f: impl FnOnce(T) -> T) -> bool {
        let current = self.get(x, z);
        self.set(x, z, f(current))
    }

    /// Number of allocated storage tiles.
    pub fn allocated_tiles(&self) -> usize {
        self.tiles.iter().filter(|t| t.is_some()).count()
    }

    /// True when nothing has ever been written.
    pub fn is_empty(&self) -> bool {
        self.allocated_tiles() == 0
    }

    /// Reset every cell to neutral and release tile storage.
    pub fn clear(&mut self) {
        for tile in &mut self.tiles {
            *tile = None;
        }
    }

    /// Iterate cells holding a non-neutral value as `(x, z, value)`.
    pub fn iter_written(&self) -> impl Iterator<Item = (u32, u32, T)> + '_ {
        CellRect::full(self.width, self.height)
            .iter()
            .map(move |(x, z)| (x, z, self.get(x, z)))
            .filter(move |(_, _, v)| *v != self.neutral)
    }

    /// Value of the cell containing normalized point `uv`.
    pub fn sample_nearest(&self, uv: Vec2) -> T {
        if self.width == 0 || self.height == 0 {
            return self.neutral;
        }
        let (x, z) = crate::math::cell_at(uv, self.width, self.height);
        self.get(x, z)
    }

    /// Nearest-neighbour resample to a new resolution.
    pub fn resample_nearest(&self, new_width: u32, new_height: u32) -> SparseChannel<T> {
        let mut out = SparseChannel::with_neutral(new_width, new_height, self.neutral);
        if self.is_empty() {
            return out;
        }
        for (x, z) in CellRect::full(new_width, new_height).iter() {
            let v = self.sample_nearest(cell_center(x, z, new_width, new_height));
            out.set(x, z, v);
        }
        out
    }
}

impl<T: Interpolate> SparseChannel<T> {
    /// Bilinear sample at normalized point `uv`, clamped at the grid edges.
    ///
    /// Sampling at a cell center returns that cell's value exactly.
    pub fn sample(&self, uv: Vec2) -> T {
        if self.width == 0 || self.height == 0 {
            return self.neutral;
        }
        let fx = (uv.x * self.width as f32 - 0.5).clamp(0.0, (self.width - 1) as f32);
        let fz = (uv.y * self.height as f32 - 0.5).clamp(0.0, (self.height - 1) as f32);
        let x0 = fx.floor() as u32;
        let z0 = fz.floor() as u32;
        let x1 = (x0 + 1).min(self.width - 1);
        let z1 = (z0 + 1).min(self.height - 1);
        let tx = fx - x0 as f32;
        let tz = fz - z0 as f32;

        let top = T::interpolate(self.get(x0, z0), self.get(x1, z0), tx);
        let bottom = T::interpolate(self.get(x0, z1), self.get(x1, z1), tx);
        T::interpolate(top, bottom, tz)
    }

    /// Bilinear resample to a new resolution.
    pub fn resample(&self, new_width: u32, new_height: u32) -> SparseChannel<T> {
        if (new_width, new_height) == self.dimensions() {
            return self.clone();
        }
        let mut out = SparseChannel::with_neutral(new_width, new_height, self.neutral);
        if self.is_empty() {
            return out;
        }
        for (x, z) in CellRect::full(new_width, new_height).iter() {
            let v = self.sample(cell_center(x, z, new_width, new_height));
            out.set(x, z, v);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_channel_is_neutral() {
        let channel: SparseChannel<f32> = SparseChannel::new(40, 20);
        assert_eq!(channel.dimensions(), (40, 20));
        assert_eq!(channel.get(5, 5), 0.0);
        assert!(channel.is_empty());
    }

    #[test]
    fn test_set_get() {
        let mut channel = SparseChannel::new(40, 40);
        assert!(channel.set(17, 33, 2.5_f32));
        assert_eq!(channel.get(17, 33), 2.5);
        assert_eq!(channel.get(16, 33), 0.0);
        assert_eq!(channel.allocated_tiles(), 1);
    }

    #[test]
    fn test_out_of_range_reads_neutral() {
        let mut channel = SparseChannel::with_neutral(8, 8, -1.0_f32);
        assert!(!channel.set(8, 0, 3.0));
        assert_eq!(channel.get(8, 0), -1.0);
        assert_eq!(channel.get(100, 100), -1.0);
    }

    #[test]
    fn test_neutral_write_does_not_allocate() {
        let mut channel = SparseChannel::new(32, 32);
        channel.set(3, 3, 0.0_f32);
        assert!(channel.is_empty());
    }

    #[test]
    fn test_clear() {
        let mut channel = SparseChannel::new(32, 32);
        channel.set(0, 0, 1_u32);
        channel.set(31, 31, 2_u32);
        assert_eq!(channel.allocated_tiles(), 2);
        channel.clear();
        assert!(channel.is_empty());
        assert_eq!(channel.get(31, 31), 0);
    }

    #[test]
    fn test_iter_written() {
        let mut channel = SparseChannel::new(4, 4);
        channel.set(1, 2, 5.0_f32);
        channel.set(3, 0, 1.0);
        let written: Vec<_> = channel.iter_written().collect();
        assert_eq!(written, vec![(3, 0, 1.0), (1, 2, 5.0)]);
    }

    #[test]
    fn test_sample_at_cell_center_is_exact() {
        let mut channel = SparseChannel::new(4, 4);
        channel.set(2, 1, 8.0_f32);
        assert_eq!(channel.sample(cell_center(2, 1, 4, 4)), 8.0);
    }

    #[test]
    fn test_sample_between_cells() {
        let mut channel = SparseChannel::new(2, 1);
        channel.set(0, 0, 0.0_f32);
        channel.set(1, 0, 4.0);
        // Halfway between the two cell centers
        assert!((channel.sample(Vec2::new(0.5, 0.5)) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_resample_same_size_is_identity() {
        let mut channel = SparseChannel::new(8, 8);
        channel.set(3, 4, 1.25_f32);
        assert_eq!(channel.resample(8, 8), channel);
    }

    #[test]
    fn test_resample_constant_field() {
        let mut channel = SparseChannel::new(4, 4);
        for (x, z) in CellRect::full(4, 4).iter() {
            channel.set(x, z, 3.0_f32);
        }
        let up = channel.resample(9, 7);
        assert_eq!(up.dimensions(), (9, 7));
        for (x, z) in CellRect::full(9, 7).iter() {
            assert!((up.get(x, z) - 3.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_resample_nearest_keeps_values() {
        let mut channel = SparseChannel::new(2, 2);
        channel.set(1, 1, 42_u32);
        let up = channel.resample_nearest(4, 4);
        assert_eq!(up.get(3, 3), 42);
        assert_eq!(up.get(2, 2), 42);
        assert_eq!(up.get(1, 1), 0);
    }

    #[test]
    fn test_deserialize_round_trip() {
        let mut channel = SparseChannel::<f32>::new(20, 5);
        channel.set(17, 4, 2.5);
        let json = serde_json::to_string(&channel).unwrap();
        let restored: SparseChannel<f32> = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, channel);
    }

    #[test]
    fn test_deserialize_rejects_inconsistent_tiles() {
        let missing = r#"{"width":40,"height":40,"neutral":0.0,"tiles_x":3,"tiles":[]}"#;
        assert!(serde_json::from_str::<SparseChannel<f32>>(missing).is_err());

        let columns = r#"{"width":40,"height":4,"neutral":0.0,"tiles_x":1,"tiles":[null]}"#;
        assert!(serde_json::from_str::<SparseChannel<f32>>(columns).is_err());

        let short = r#"{"width":4,"height":4,"neutral":0.0,"tiles_x":1,"tiles":[[1.0,2.0]]}"#;
        assert!(serde_json::from_str::<SparseChannel<f32>>(short).is_err());
    }
}
