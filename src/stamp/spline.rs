//! Road-like write geometry from a sampled centerline.

use std::sync::Arc;

use glam::{Vec2, Vec3};

use crate::apply::{FalloffCurve, Footprint, GeometryProvider, Sampler};
use crate::core::{Error, Result};
use crate::math::{lerp, Bounds2};

/// Polyline with a flat core of `half_width` and a falloff band of `margin`
/// beyond it.
///
/// Points are `(x, elevation, z)` with `x`/`z` in normalized surface space,
/// matching entity positions.
#[derive(Clone, Debug, PartialEq)]
pub struct PolylineFalloff {
    points: Arc<[Vec3]>,
    half_width: f32,
    margin: f32,
    curve: FalloffCurve,
}

impl PolylineFalloff {
    pub fn new(points: Vec<Vec3>, half_width: f32) -> Result<Self> {
        if points.is_empty() {
            return Err(Error::InvalidRequest("polyline needs at least one point".into()));
        }
        if !(half_width > 0.0) || points.iter().any(|p| !p.is_finite()) {
            return Err(Error::InvalidRequest(format!(
                "invalid polyline: {} points, half width {}",
                points.len(),
                half_width
            )));
        }
        Ok(Self {
            points: points.into(),
            half_width,
            margin: 0.0,
            curve: FalloffCurve::default(),
        })
    }

    /// Flat polyline from surface points.
    pub fn flat(points: &[Vec2], half_width: f32) -> Result<Self> {
        Self::new(points.iter().map(|p| Vec3::new(p.x, 0.0, p.y)).collect(), half_width)
    }

    pub fn with_falloff(mut self, margin: f32, curve: FalloffCurve) -> Self {
        self.margin = margin.max(0.0);
        self.curve = curve;
        self
    }

    pub fn points(&self) -> &[Vec3] {
        &self.points
    }

    pub fn half_width(&self) -> f32 {
        self.half_width
    }

    pub fn margin(&self) -> f32 {
        self.margin
    }

    /// Length of the centerline in surface units.
    pub fn length(&self) -> f32 {
        self.points
            .windows(2)
            .map(|w| surface(w[0]).distance(surface(w[1])))
            .sum()
    }

    /// Distance from `uv` to the centerline and the elevation there.
    pub fn closest(&self, uv: Vec2) -> (f32, f32) {
        closest(&self.points, uv)
    }

    /// Sampler returning the centerline elevation nearest each point, for
    /// flattening the surface under the road.
    pub fn elevation(&self) -> Sampler {
        let points = Arc::clone(&self.points);
        Arc::new(move |uv| closest(&points, uv).1)
    }
}

impl GeometryProvider for PolylineFalloff {
    fn footprint(&self) -> Footprint {
        let mut bounds = Bounds2::new(surface(self.points[0]), surface(self.points[0]));
        for p in self.points.iter().skip(1) {
            bounds.expand(surface(*p));
        }
        Footprint::Rect(bounds.inflated(self.half_width + self.margin))
    }

    fn falloff(&self) -> Sampler {
        let points = Arc::clone(&self.points);
        let half_width = self.half_width;
        let margin = self.margin;
        let curve = self.curve.clone();
        Arc::new(move |uv| {
            let (d, _) = closest(&points, uv);
            if d <= half_width {
                return 1.0;
            }
            if margin <= 0.0 || d >= half_width + margin {
                return 0.0;
            }
            curve.evaluate(1.0 - (d - half_width) / margin)
        })
    }
}

#[inline]
fn surface(p: Vec3) -> Vec2 {
    Vec2::new(p.x, p.z)
}

fn closest(points: &[Vec3], uv: Vec2) -> (f32, f32) {
    if points.len() == 1 {
        return (uv.distance(surface(points[0])), points[0].y);
    }
    let mut best = (f32::INFINITY, 0.0);
    for w in points.windows(2) {
        let (a, b) = (surface(w[0]), surface(w[1]));
        let ab = b - a;
        let len2 = ab.length_squared();
        let t = if len2 <= f32::EPSILON { 0.0 } else { ((uv - a).dot(ab) / len2).clamp(0.0, 1.0) };
        let d = uv.distance(a + ab * t);
        if d < best.0 {
            best = (d, lerp(w[0].y, w[1].y, t));
        }
    }
    best
}
