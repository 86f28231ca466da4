//! Strata - non-destructive layer and stencil compositing for terrain surfaces

pub mod core;
pub mod math;
pub mod channel;
pub mod stencil;
pub mod layer;
pub mod apply;
pub mod stamp;
pub mod persist;
