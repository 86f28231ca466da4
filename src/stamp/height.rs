//! Dense height grids sampled in stamp-local coordinates.

use std::path::Path;

use glam::Vec2;
use image::ImageReader;
use noise::{Fbm, MultiFractal, NoiseFn, Perlin};
use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};
use crate::math::lerp;

/// Parameters for a noise-generated stamp.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NoiseParams {
    pub seed: u32,
    pub frequency: f32,   // Features across the stamp
    pub octaves: u32,     // FBM octaves
    pub persistence: f32, // FBM persistence (0.5 typical)
    pub lacunarity: f32,  // FBM lacunarity (2.0 typical)
    pub amplitude: f32,   // Output range is [0, amplitude]
}

impl Default for NoiseParams {
    fn default() -> Self {
        Self {
            seed: 12345,
            frequency: 4.0,
            octaves: 4,
            persistence: 0.5,
            lacunarity: 2.0,
            amplitude: 1.0,
        }
    }
}

/// Row-major grid of values covering stamp-local `[0,1]²`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "HeightStampData")]
pub struct HeightStamp {
    width: u32,
    height: u32,
    values: Vec<f32>,
}

#[derive(Deserialize)]
struct HeightStampData {
    width: u32,
    height: u32,
    values: Vec<f32>,
}

impl TryFrom<HeightStampData> for HeightStamp {
    type Error = Error;

    fn try_from(data: HeightStampData) -> Result<Self> {
        Self::new(data.width, data.height, data.values)
    }
}

impl HeightStamp {
    /// Wrap raw row-major values.
    pub fn new(width: u32, height: u32, values: Vec<f32>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidRequest(format!("empty stamp grid {}x{}", width, height)));
        }
        if values.len() != width as usize * height as usize {
            return Err(Error::InvalidRequest(format!(
                "stamp grid {}x{} needs {} values, got {}",
                width,
                height,
                width as usize * height as usize,
                values.len()
            )));
        }
        Ok(Self { width, height, values })
    }

    /// Evaluate `f` at every cell center.
    pub fn from_fn(width: u32, height: u32, f: impl Fn(Vec2) -> f32) -> Result<Self> {
        let values = (0..height)
            .flat_map(|z| (0..width).map(move |x| (x, z)))
            .map(|(x, z)| f(crate::math::cell_center(x, z, width, height)))
            .collect();
        Self::new(width, height, values)
    }

    /// Load a grayscale heightmap. Luminance maps linearly to `[0, scale]`.
    pub fn from_image(path: &Path, scale: f32) -> Result<Self> {
        let image = ImageReader::open(path)?.decode()?.to_luma16();
        let (width, height) = image.dimensions();
        let values = image
            .pixels()
            .map(|p| p.0[0] as f32 / u16::MAX as f32 * scale)
            .collect();
        log::debug!("Loaded {}x{} height stamp from {}", width, height, path.display());
        Self::new(width, height, values)
    }

    /// Fractal noise mapped to `[0, amplitude]`.
    pub fn from_noise(width: u32, height: u32, params: &NoiseParams) -> Result<Self> {
        let noise = Fbm::<Perlin>::new(params.seed)
            .set_octaves(params.octaves as usize)
            .set_persistence(params.persistence as f64)
            .set_lacunarity(params.lacunarity as f64);
        let frequency = params.frequency as f64;
        let amplitude = params.amplitude as f64;
        Self::from_fn(width, height, |uv| {
            let n = noise.get([uv.x as f64 * frequency, uv.y as f64 * frequency]);
            (((n + 1.0) * 0.5).clamp(0.0, 1.0) * amplitude) as f32
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    fn get(&self, x: u32, z: u32) -> f32 {
        self.values[(z * self.width + x) as usize]
    }

    /// Bilinear sample at stamp-local `uv`, clamped at the edges.
    pub fn sample(&self, uv: Vec2) -> f32 {
        let fx = (uv.x * self.width as f32 - 0.5).clamp(0.0, (self.width - 1) as f32);
        let fz = (uv.y * self.height as f32 - 0.5).clamp(0.0, (self.height - 1) as f32);
        let x0 = fx.floor() as u32;
        let z0 = fz.floor() as u32;
        let x1 = (x0 + 1).min(self.width - 1);
        let z1 = (z0 + 1).min(self.height - 1);
        let tx = fx - x0 as f32;
        let tz = fz - z0 as f32;
        let top = lerp(self.get(x0, z0), self.get(x1, z0), tx);
        let bottom = lerp(self.get(x0, z1), self.get(x1, z1), tx);
        lerp(top, bottom, tz)
    }

    /// Multiply every value by `factor`.
    pub fn scaled(mut self, factor: f32) -> Self {
        for v in &mut self.values {
            *v *= factor;
        }
        self
    }

    pub fn min(&self) -> f32 {
        self.values.iter().copied().fold(f32::INFINITY, f32::min)
    }

    pub fn max(&self) -> f32 {
        self.values.iter().copied().fold(f32::NEG_INFINITY, f32::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Luma};

    #[test]
    fn test_new_checks_length() {
        assert!(HeightStamp::new(2, 2, vec![0.0; 3]).is_err());
        assert!(HeightStamp::new(0, 2, vec![]).is_err());
        assert!(HeightStamp::new(2, 2, vec![0.0; 4]).is_ok());
    }

    #[test]
    fn test_deserialize_checks_length() {
        let stamp: HeightStamp = serde_json::from_str(r#"{"width":2,"height":1,"values":[1.0,3.0]}"#).unwrap();
        assert_eq!(stamp.max(), 3.0);
        assert!(serde_json::from_str::<HeightStamp>(r#"{"width":3,"height":3,"values":[1.0]}"#).is_err());
    }

    #[test]
    fn test_sample_at_centers_and_between() {
        let stamp = HeightStamp::new(2, 1, vec![0.0, 4.0]).unwrap();
        assert_eq!(stamp.sample(Vec2::new(0.25, 0.5)), 0.0);
        assert_eq!(stamp.sample(Vec2::new(0.75, 0.5)), 4.0);
        assert_eq!(stamp.sample(Vec2::new(0.5, 0.5)), 2.0);
        // Clamped beyond the edge
        assert_eq!(stamp.sample(Vec2::new(-1.0, 0.5)), 0.0);
    }

    #[test]
    fn test_from_fn_uses_cell_centers() {
        let stamp = HeightStamp::from_fn(4, 4, |uv| uv.x).unwrap();
        assert_eq!(stamp.values()[0], 0.125);
        assert_eq!(stamp.values()[3], 0.875);
    }

    #[test]
    fn test_from_noise_is_deterministic_and_bounded() {
        let params = NoiseParams { amplitude: 10.0, ..Default::default() };
        let a = HeightStamp::from_noise(16, 16, &params).unwrap();
        let b = HeightStamp::from_noise(16, 16, &params).unwrap();
        assert_eq!(a, b);
        assert!(a.min() >= 0.0);
        assert!(a.max() <= 10.0);
    }

    #[test]
    fn test_from_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hill.png");
        let image = ImageBuffer::from_fn(2, 2, |x, _| Luma([if x == 0 { 0u16 } else { u16::MAX }]));
        image.save(&path).unwrap();

        let stamp = HeightStamp::from_image(&path, 8.0).unwrap();
        assert_eq!((stamp.width(), stamp.height()), (2, 2));
        assert_eq!(stamp.values(), &[0.0, 8.0, 0.0, 8.0]);
    }

    #[test]
    fn test_missing_image_is_io_error() {
        let err = HeightStamp::from_image(Path::new("/nonexistent/stamp.png"), 1.0);
        assert!(matches!(err, Err(Error::Io(_))));
    }
}
