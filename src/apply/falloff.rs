//! Falloff functions: per-cell weights in `[0,1]` for write sources.

use std::sync::Arc;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::Footprint;
use crate::math::Bounds2;

/// Function of a normalized surface point, shared between requests.
pub type Sampler = Arc<dyn Fn(Vec2) -> f32 + Send + Sync>;

/// Wrap a closure as a [`Sampler`].
pub fn sampler(f: impl Fn(Vec2) -> f32 + Send + Sync + 'static) -> Sampler {
    Arc::new(f)
}

/// Sampler returning `value` everywhere.
pub fn constant(value: f32) -> Sampler {
    Arc::new(move |_| value)
}

/// Shapes the transition from a feature's edge (t = 0) to its core (t = 1).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum FalloffCurve {
    Linear,
    /// Smoothstep
    #[default]
    Smooth,
    /// Full strength anywhere inside
    Constant,
    /// Piecewise-linear `(t, weight)` keys, sorted by t
    Keyframes(Vec<(f32, f32)>),
}

impl FalloffCurve {
    /// Weight for inside-ness `t` (clamped to `[0,1]`).
    pub fn evaluate(&self, t: f32) -> f32 {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        let w = match self {
            FalloffCurve::Linear => t,
            FalloffCurve::Smooth => t * t * (3.0 - 2.0 * t),
            FalloffCurve::Constant => {
                if t > 0.0 { 1.0 } else { 0.0 }
            }
            FalloffCurve::Keyframes(keys) => evaluate_keys(keys, t),
        };
        w.clamp(0.0, 1.0)
    }
}

fn evaluate_keys(keys: &[(f32, f32)], t: f32) -> f32 {
    let Some(&(first_t, first_w)) = keys.first() else {
        return t;
    };
    if t <= first_t {
        return first_w;
    }
    for pair in keys.windows(2) {
        let (t0, w0) = pair[0];
        let (t1, w1) = pair[1];
        if t <= t1 {
            let span = t1 - t0;
            if span <= f32::EPSILON {
                return w1;
            }
            return crate::math::lerp(w0, w1, (t - t0) / span);
        }
    }
    keys[keys.len() - 1].1
}

/// Circular falloff: full strength inside `inner_radius`, fading to zero at
/// `outer_radius`.
pub fn radial(center: Vec2, inner_radius: f32, outer_radius: f32, curve: FalloffCurve) -> Sampler {
    Arc::new(move |uv| {
        let d = uv.distance(center);
        if d >= outer_radius {
            return 0.0;
        }
        let band = outer_radius - inner_radius;
        let t = if band <= 0.0 { 1.0 } else { (outer_radius - d) / band };
        curve.evaluate(t)
    })
}

/// Rectangular falloff fading over `margin` inside the bounds' edges.
pub fn rect(bounds: Bounds2, margin: f32, curve: FalloffCurve) -> Sampler {
    Arc::new(move |uv| {
        if !bounds.contains_point(uv) {
            return 0.0;
        }
        let edge = (uv - bounds.min).min(bounds.max - uv);
        let d = edge.x.min(edge.y);
        let t = if margin <= 0.0 { 1.0 } else { d / margin };
        curve.evaluate(t)
    })
}

/// Falloff in a footprint's local space, fading over `margin` (local units)
/// from every edge. Used for stamps placed with rotation.
pub fn footprint_edge(footprint: Footprint, margin: f32, curve: FalloffCurve) -> Sampler {
    Arc::new(move |uv| {
        let local = footprint.to_local(uv);
        if !(0.0..=1.0).contains(&local.x) || !(0.0..=1.0).contains(&local.y) {
            return 0.0;
        }
        let edge = local.min(Vec2::ONE - local);
        let d = edge.x.min(edge.y);
        let t = if margin <= 0.0 { 1.0 } else { d / margin };
        curve.evaluate(t)
    })
}

/// A write source's geometry: where it applies and how strongly.
pub trait GeometryProvider {
    fn footprint(&self) -> Footprint;
    fn falloff(&self) -> Sampler;
}

/// Round brush for hand-painted edits.
#[derive(Clone, Debug, PartialEq)]
pub struct RadialBrush {
    pub center: Vec2,
    pub radius: f32,
    /// Fraction of the radius at full strength
    pub hardness: f32,
    pub curve: FalloffCurve,
}

impl RadialBrush {
    pub fn new(center: Vec2, radius: f32) -> Self {
        Self {
            center,
            radius,
            hardness: 0.5,
            curve: FalloffCurve::Smooth,
        }
    }

    pub fn with_hardness(mut self, hardness: f32) -> Self {
        self.hardness = hardness.clamp(0.0, 1.0);
        self
    }

    pub fn with_curve(mut self, curve: FalloffCurve) -> Self {
        self.curve = curve;
        self
    }
}

impl GeometryProvider for RadialBrush {
    fn footprint(&self) -> Footprint {
        Footprint::Rect(Bounds2::from_center_half_extent(self.center, Vec2::splat(self.radius)))
    }

    fn falloff(&self) -> Sampler {
        radial(self.center, self.radius * self.hardness, self.radius, self.curve.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_curves() {
        assert_eq!(FalloffCurve::Linear.evaluate(0.25), 0.25);
        assert_eq!(FalloffCurve::Smooth.evaluate(0.5), 0.5);
        assert_eq!(FalloffCurve::Smooth.evaluate(0.0), 0.0);
        assert_eq!(FalloffCurve::Smooth.evaluate(1.0), 1.0);
        assert_eq!(FalloffCurve::Constant.evaluate(0.01), 1.0);
        assert_eq!(FalloffCurve::Constant.evaluate(0.0), 0.0);
        assert_eq!(FalloffCurve::Linear.evaluate(f32::NAN), 0.0);
    }

    #[test]
    fn test_keyframes() {
        let curve = FalloffCurve::Keyframes(vec![(0.0, 0.0), (0.5, 1.0), (1.0, 0.5)]);
        assert_eq!(curve.evaluate(0.25), 0.5);
        assert_eq!(curve.evaluate(0.5), 1.0);
        assert_eq!(curve.evaluate(0.75), 0.75);
        assert_eq!(FalloffCurve::Keyframes(vec![]).evaluate(0.3), 0.3);
    }

    #[test]
    fn test_radial() {
        let f = radial(Vec2::splat(0.5), 0.1, 0.3, FalloffCurve::Linear);
        assert_eq!(f(Vec2::splat(0.5)), 1.0);
        assert_eq!(f(Vec2::new(0.5, 0.95)), 0.0);
        assert!((f(Vec2::new(0.5, 0.7)) - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_rect_margin() {
        let f = rect(Bounds2::new(Vec2::ZERO, Vec2::ONE), 0.2, FalloffCurve::Linear);
        assert_eq!(f(Vec2::splat(0.5)), 1.0);
        assert!((f(Vec2::new(0.1, 0.5)) - 0.5).abs() < 1e-5);
        assert_eq!(f(Vec2::new(1.5, 0.5)), 0.0);
    }

    #[test]
    fn test_brush_geometry() {
        let brush = RadialBrush::new(Vec2::splat(0.5), 0.25).with_hardness(1.0);
        assert!(brush.footprint().contains(Vec2::new(0.3, 0.3)));
        assert_eq!((brush.falloff())(Vec2::new(0.6, 0.5)), 1.0);
    }
}
