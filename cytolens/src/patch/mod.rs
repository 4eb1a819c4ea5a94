//! Fixed-size square crops around centroids, quantised to a reduced grey depth.


use common::Buffer2;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::image::{CellImage, Channel};
use crate::segmentation::Centroid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Half side of the square window; the side is `2 * radius + 1`.
    pub radius: usize,
    /// Output has `2^depth` grey levels scaled into 0..=255.
    pub depth: u8,
    pub channel: Channel,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            radius: 50,
            depth: 3,
            channel: Channel::Blue,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        validate_depth(self.depth)?;
        if self.radius == 0 {
            return Err(Error::config("patch radius must be at least 1"));
        }
        Ok(())
    }

    #[inline]
    pub fn side(&self) -> usize {
        2 * self.radius + 1
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.side() * self.side()
    }
}

pub(crate) fn validate_depth(depth: u8) -> Result<()> {
    if !(1..=8).contains(&depth) {
        return Err(Error::config(format!(
            "grey depth must be in [1, 8], got {depth}"
        )));
    }
    Ok(())
}

/// A quantised crop, or the sentinel for a centroid too close to the border.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellPatch {
    Cell(Buffer2<u8>),
    Edge,
}

impl CellPatch {
    #[inline]
    pub fn is_edge(&self) -> bool {
        matches!(self, CellPatch::Edge)
    }

    /// Quantised pixels, `None` for the edge sentinel.
    pub fn pixels(&self) -> Option<&Buffer2<u8>> {
        match self {
            CellPatch::Cell(pixels) => Some(pixels),
            CellPatch::Edge => None,
        }
    }

    /// Flattened length, `None` for the edge sentinel.
    pub fn dimension(&self) -> Option<usize> {
        self.pixels().map(|p| p.len())
    }

    /// Row-major feature vector: pixels divided by their maximum.
    /// The edge sentinel gives `None`; all-zero pixels give all-zero features.
    pub fn features(&self) -> Option<Vec<f64>> {
        self.pixels().map(|p| normalized_features(p.data()))
    }
}

/// Divides `samples` by their maximum; an all-zero input stays all-zero.
pub fn normalized_features(samples: &[u8]) -> Vec<f64> {
    let max = samples.iter().copied().max().unwrap_or(0);
    if max == 0 {
        return vec![0.0; samples.len()];
    }
    let max = max as f64;
    samples.iter().map(|&v| v as f64 / max).collect()
}

/// Crops the `(2r+1)`² window centred on `centroid`, or [`CellPatch::Edge`]
/// if the window does not lie fully inside the image.
pub fn extract(
    image: &CellImage,
    centroid: Centroid,
    radius: usize,
    channel: Channel,
    depth: u8,
) -> CellPatch {
    let Centroid { row, col } = centroid;
    let inside = row >= radius
        && col >= radius
        && row + radius < image.rows()
        && col + radius < image.cols();
    if !inside {
        return CellPatch::Edge;
    }

    let side = 2 * radius + 1;
    let window = Buffer2::from_fn(side, side, |r, c| {
        image.sample(row - radius + r, col - radius + c, channel)
    });
    CellPatch::Cell(quantize(&window, depth))
}

/// Stretches `window` to its own min/max and keeps `2^depth` levels:
/// `ceil(norm * levels) * 256 / levels`, clamped to 255. A flat window maps
/// to zeros.
pub fn quantize(window: &Buffer2<u8>, depth: u8) -> Buffer2<u8> {
    let depth = depth.clamp(1, 8);
    let levels = (1u32 << depth) as f64;
    let step = 256.0 / levels;

    let min = window.iter().copied().min().unwrap_or(0);
    let max = window.iter().copied().max().unwrap_or(0);
    if max == min {
        return Buffer2::new_default(window.rows(), window.cols());
    }
    let span = (max - min) as f64;

    window.map(|&v| {
        let norm = (v - min) as f64 / span;
        ((norm * levels).ceil() * step).min(255.0) as u8
    })
}
