//! Stencils: per-cell ownership records used to arbitrate overlapping writes.
//!
//! A stencil only records ownership among write sources that target the
//! layer it belongs to, never across layers.

pub mod codec;

pub use codec::{PackedStencil, StencilValue, MAX_OWNER_KEY};

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::channel::SparseChannel;
use crate::math::CellRect;

/// Outcome of arbitrating one write at one cell.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Arbitration {
    /// Zero strength: the cell is outside the write's influence.
    Skip,
    /// A stronger, higher-priority claim blocks the write.
    Blocked,
    /// The write may blend in; `updated` is the cell's new ownership.
    Accepted { updated: StencilValue },
}

impl Arbitration {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Arbitration::Accepted { .. })
    }
}

/// Decide whether a write with `key` at `strength` may touch a cell owned by `existing`.
///
/// A strictly higher key blocks lower keys, except where the higher claim is
/// weaker than the incoming strength (the fading edge of a feature). Equal
/// keys always blend. On acceptance the stronger claim takes ownership and
/// the stored strength never decreases.
pub fn arbitrate(existing: StencilValue, key: u32, strength: f32) -> Arbitration {
    if !(strength > 0.0) {
        return Arbitration::Skip;
    }
    let strength = strength.min(1.0);
    if existing.key != key && existing.key > key && !(existing.strength < strength) {
        return Arbitration::Blocked;
    }
    let owner = if strength > existing.strength { key } else { existing.key };
    Arbitration::Accepted {
        updated: StencilValue::new(owner, existing.strength.max(strength)),
    }
}

/// Packed ownership grid for one channel kind of a layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stencil {
    cells: SparseChannel<PackedStencil>,
}

impl Stencil {
    /// Create an unclaimed stencil.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            cells: SparseChannel::new(width, height),
        }
    }

    /// Import a grid in the scalar `key + strength` form.
    ///
    /// Corrupt scalars are logged and imported as unclaimed.
    pub fn from_scalar_grid(width: u32, height: u32, values: &[f32]) -> Self {
        let mut stencil = Self::new(width, height);
        let mut corrupt = 0usize;
        for (x, z) in CellRect::full(width, height).iter() {
            let idx = (z * width + x) as usize;
            let Some(&v) = values.get(idx) else { break };
            match codec::decode_scalar(v) {
                Ok(value) if value.is_claimed() => {
                    stencil.store(x, z, value);
                }
                Ok(_) => {}
                Err(e) => {
                    corrupt += 1;
                    log::warn!("Stencil import at ({}, {}): {}", x, z, e);
                }
            }
        }
        if corrupt > 0 {
            log::warn!("Imported stencil with {} corrupt cells treated as unclaimed", corrupt);
        }
        stencil
    }

    pub fn width(&self) -> u32 {
        self.cells.width()
    }

    pub fn height(&self) -> u32 {
        self.cells.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.cells.dimensions()
    }

    /// Raw packed value at a cell.
    pub fn packed_at(&self, x: u32, z: u32) -> PackedStencil {
        self.cells.get(x, z)
    }

    /// Decoded ownership at a cell. Corrupt cells read as unclaimed.
    pub fn value_at(&self, x: u32, z: u32) -> StencilValue {
        match codec::decode_checked(self.cells.get(x, z)) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("Stencil cell ({}, {}): {}; treating as unclaimed", x, z, e);
                StencilValue::UNCLAIMED
            }
        }
    }

    pub fn strength_at(&self, x: u32, z: u32) -> f32 {
        self.value_at(x, z).strength
    }

    pub fn owner_at(&self, x: u32, z: u32) -> u32 {
        self.value_at(x, z).key
    }

    /// Strength of the cell containing normalized point `uv`.
    pub fn strength_at_uv(&self, uv: Vec2) -> f32 {
        if self.width() == 0 || self.height() == 0 {
            return 0.0;
        }
        let (x, z) = crate::math::cell_at(uv, self.width(), self.height());
        self.strength_at(x, z)
    }

    /// Arbitrate a write at a cell without modifying the stencil.
    pub fn arbitrate(&self, x: u32, z: u32, key: u32, strength: f32) -> Arbitration {
        arbitrate(self.value_at(x, z), key, strength)
    }

    /// Overwrite ownership at a cell.
    pub fn store(&mut self, x: u32, z: u32, value: StencilValue) {
        self.cells.set(x, z, codec::encode(value.key, value.strength));
    }

    /// Arbitrate and, if accepted, record the new ownership.
    pub fn try_claim(&mut self, x: u32, z: u32, key: u32, strength: f32) -> Arbitration {
        let outcome = self.arbitrate(x, z, key, strength);
        if let Arbitration::Accepted { updated } = outcome {
            self.store(x, z, updated);
        }
        outcome
    }

    /// Number of claimed cells.
    pub fn claimed_cells(&self) -> usize {
        self.cells.iter_written().count()
    }

    /// Release every claim.
    pub fn clear(&mut self) {
        self.cells.clear();
    }

    /// Nearest-neighbour resample; ownership is never interpolated.
    pub fn resample(&self, new_width: u32, new_height: u32) -> Stencil {
        Stencil {
            cells: self.cells.resample_nearest(new_width, new_height),
        }
    }
}
