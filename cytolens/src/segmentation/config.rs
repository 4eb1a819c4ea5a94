//! Configuration types for cell segmentation.
//!
//! Parameters of the flat [`Config`] struct are grouped by comments into the
//! pipeline stages they steer.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::error::{Error, Result};
use crate::image::Channel;

// ============================================================================
// Enums
// ============================================================================

/// Global threshold selection applied to the channel histogram.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(ascii_case_insensitive)]
pub enum ThresholdMethod {
    /// Between-class variance maximisation.
    Otsu,
    /// Histogram-triangle heuristic. Suited to a dominant background peak.
    #[default]
    Triangle,
}

/// Contrast polarity of the objects against the background.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(ascii_case_insensitive)]
pub enum Illumination {
    /// Objects darker than background: foreground is `value <= threshold`.
    #[default]
    BrightField,
    /// Objects brighter than background: foreground is `value > threshold`.
    Fluorescence,
}

/// Pixel connectivity for connected component labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Connectivity {
    /// Horizontal and vertical neighbours only.
    Four,
    /// Diagonal neighbours included.
    #[default]
    Eight,
}

// ============================================================================
// Config
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // -- Binarisation --
    pub channel: Channel,
    pub method: ThresholdMethod,
    pub illumination: Illumination,

    // -- Morphology --
    /// Erode/dilate iterations of the 3×3 opening.
    pub open_iterations: usize,
    /// Dilations of the opened mask that define sure background.
    pub background_dilations: usize,
    /// Sure foreground keeps distances strictly above this share of the maximum.
    pub foreground_fraction: f32,
    /// Connectivity used to split sure foreground into seeds.
    pub seed_connectivity: Connectivity,

    // -- Locating --
    /// Regions with fewer pixels are treated as debris.
    pub min_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            channel: Channel::Blue,
            method: ThresholdMethod::Triangle,
            illumination: Illumination::BrightField,
            open_iterations: 2,
            background_dilations: 3,
            foreground_fraction: 0.6,
            seed_connectivity: Connectivity::Eight,
            min_size: 9000,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if !(self.foreground_fraction > 0.0 && self.foreground_fraction < 1.0) {
            return Err(Error::config(format!(
                "foreground_fraction must be in (0, 1), got {}",
                self.foreground_fraction
            )));
        }
        if self.min_size == 0 {
            return Err(Error::config("min_size must be at least 1"));
        }
        Ok(())
    }
}
