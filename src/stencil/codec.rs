//! Packing of (owner key, strength) pairs into one scalar per cell.
//!
//! Packed layout (`PackedStencil`, u32):
//!
//! ```text
//!  31                     8 7        0
//! +------------------------+----------+
//! |   owner key (24 bits)  | strength |
//! +------------------------+----------+
//! ```
//!
//! Strength is quantized to `round(s * 255)`, so 255 is exactly 1.0 and can
//! never carry into the key. Key 0 means "unclaimed".
//!
//! The scalar form (`key + strength` in one f32) is kept for importing float
//! stencil grids. There strength is clamped to `[0, 1)` and quantized to
//! 1/256 steps, which is exact for keys below 2^16.

use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};

/// Bits of strength precision in a packed stencil value.
pub const STRENGTH_BITS: u32 = 8;
/// Largest quantized strength.
pub const STRENGTH_STEPS: u32 = (1 << STRENGTH_BITS) - 1;
/// Largest owner key a packed stencil can hold.
pub const MAX_OWNER_KEY: u32 = (1 << (32 - STRENGTH_BITS)) - 1;
/// Largest owner key the scalar form represents exactly.
pub const MAX_SCALAR_KEY: u32 = (1 << 16) - 1;

const SCALAR_STEPS: f32 = 256.0;

/// Decoded ownership of one cell.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StencilValue {
    /// Priority key of the owning write source, 0 if unclaimed
    pub key: u32,
    /// Strength of the claim in `[0, 1]`
    pub strength: f32,
}

impl StencilValue {
    pub const UNCLAIMED: StencilValue = StencilValue { key: 0, strength: 0.0 };

    pub fn new(key: u32, strength: f32) -> Self {
        Self { key, strength }
    }

    pub fn is_claimed(&self) -> bool {
        self.key != 0
    }
}

/// A stencil value packed into one u32.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackedStencil(pub u32);

impl crate::channel::ChannelValue for PackedStencil {}

/// Quantize strength to `0..=STRENGTH_STEPS`.
#[inline]
fn quantize(strength: f32) -> u32 {
    if strength.is_nan() {
        return 0;
    }
    (strength.clamp(0.0, 1.0) * STRENGTH_STEPS as f32).round() as u32
}

/// Pack `(key, strength)`. Keys above [`MAX_OWNER_KEY`] are truncated to the
/// key field, so callers validate keys first.
pub fn encode(key: u32, strength: f32) -> PackedStencil {
    debug_assert!(key <= MAX_OWNER_KEY, "owner key {} exceeds 24 bits", key);
    PackedStencil(((key & MAX_OWNER_KEY) << STRENGTH_BITS) | quantize(strength))
}

/// Unpack a stencil value. Total: every bit pattern decodes.
pub fn decode(packed: PackedStencil) -> StencilValue {
    StencilValue {
        key: packed.0 >> STRENGTH_BITS,
        strength: (packed.0 & STRENGTH_STEPS) as f32 / STRENGTH_STEPS as f32,
    }
}

/// Unpack and validate: an unclaimed cell must carry zero strength.
pub fn decode_checked(packed: PackedStencil) -> Result<StencilValue> {
    let value = decode(packed);
    if value.key == 0 && packed.0 != 0 {
        return Err(Error::CorruptStencil { raw: format!("{:#010x}", packed.0) });
    }
    Ok(value)
}

/// Quantize a strength the way a packed stencil stores it.
pub fn quantized_strength(strength: f32) -> f32 {
    quantize(strength) as f32 / STRENGTH_STEPS as f32
}

/// Encode into the scalar form `key + strength`.
pub fn encode_scalar(key: u32, strength: f32) -> f32 {
    debug_assert!(key <= MAX_SCALAR_KEY, "owner key {} too large for scalar form", key);
    let s = if strength.is_nan() { 0.0 } else { strength.clamp(0.0, 1.0) };
    let steps = ((s * SCALAR_STEPS).round() as u32).min(SCALAR_STEPS as u32 - 1);
    key as f32 + steps as f32 / SCALAR_STEPS
}

/// Decode the scalar form. `0.0` decodes to `(0, 0)`.
pub fn decode_scalar(v: f32) -> Result<StencilValue> {
    if !v.is_finite() || v < 0.0 || v >= (MAX_SCALAR_KEY + 1) as f32 {
        return Err(Error::CorruptStencil { raw: format!("{}", v) });
    }
    let key = v.floor();
    let strength = v - key;
    if key == 0.0 && strength > 0.0 {
        return Err(Error::CorruptStencil { raw: format!("{}", v) });
    }
    Ok(StencilValue { key: key as u32, strength })
}
