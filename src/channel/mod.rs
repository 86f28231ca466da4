//! Sparse grid channels: height deltas, surface weights, packed stencils.
//!
//! Every channel covers the whole surface in normalized `[0,1]x[0,1]`
//! space; cell `(x, z)` has its center at `((x + 0.5) / w, (z + 0.5) / h)`.
//! Storage is tiled so channels that are only touched near a road or a
//! stamp cost memory only where they were written.

pub mod sparse;

pub use sparse::{SparseChannel, TILE_SIZE};

use serde::{Serialize, de::DeserializeOwned};

/// Trait for values stored in sparse channels.
///
/// Must be cheap to copy, have a meaningful default (the neutral value),
/// and support equality so untouched tiles can stay unallocated.
pub trait ChannelValue:
    Copy + Clone + Default + PartialEq + std::fmt::Debug + Serialize + DeserializeOwned + 'static
{
    /// Returns true if this value is the default (neutral/unset).
    fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

impl ChannelValue for f32 {}
impl ChannelValue for u32 {}
impl ChannelValue for u8 {}

/// Values that can be blended for bilinear resampling.
pub trait Interpolate: ChannelValue {
    fn interpolate(a: Self, b: Self, t: f32) -> Self;
}

impl Interpolate for f32 {
    #[inline]
    fn interpolate(a: Self, b: Self, t: f32) -> Self {
        crate::math::lerp(a, b, t)
    }
}
