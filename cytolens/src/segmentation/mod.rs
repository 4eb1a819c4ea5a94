//! Cell segmentation: binarise, clean up, split touching cells, locate them.
//!
//! The stages run in this order:
//! 1. select a channel and binarise it with a global Otsu or Triangle threshold
//! 2. fill enclosed holes and open the mask
//! 3. derive sure background (dilated mask) and sure foreground (distance
//!    transform above a share of its maximum)
//! 4. label sure-foreground components as seeds and flood the unknown band
//!    with a marker watershed
//! 5. reduce every large enough region to its rounded centroid

pub(crate) mod config;
pub(crate) mod distance;
pub(crate) mod labeling;
pub(crate) mod morphology;
mod region_map;
pub(crate) mod threshold;
pub(crate) mod watershed;


use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use config::{Config, Connectivity, Illumination, ThresholdMethod};
pub use region_map::RegionMap;

use crate::error::Result;
use crate::image::{CellImage, Channel};
use labeling::LabelMap;

/// Integer pixel position of a located cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Centroid {
    pub row: usize,
    pub col: usize,
}

impl Centroid {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

/// Segments images with a validated [`Config`].
#[derive(Debug, Clone)]
pub struct Segmenter {
    config: Config,
}

impl Default for Segmenter {
    fn default() -> Self {
        Self {
            config: Config::default(),
        }
    }
}

impl Segmenter {
    pub fn from_config(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn segment(&self, image: &CellImage) -> RegionMap {
        segment_with(image, &self.config)
    }

    pub fn locate(&self, map: &RegionMap) -> Vec<Centroid> {
        locate(map, self.config.min_size)
    }

    /// Segments `image` and returns the centroids of all qualifying regions.
    pub fn detect(&self, image: &CellImage) -> Vec<Centroid> {
        let map = self.segment(image);
        let centroids = self.locate(&map);
        tracing::debug!(
            "Located {} cells among {} regions",
            centroids.len(),
            map.region_count()
        );
        centroids
    }
}

/// Segments `image` with the default morphology parameters.
pub fn segment(
    image: &CellImage,
    channel: Channel,
    method: ThresholdMethod,
    illumination: Illumination,
) -> RegionMap {
    let config = Config {
        channel,
        method,
        illumination,
        ..Config::default()
    };
    segment_with(image, &config)
}

pub(crate) fn segment_with(image: &CellImage, config: &Config) -> RegionMap {
    let plane = image.plane(config.channel);
    let level = threshold::select_threshold(&plane, config.method);
    let binary = threshold::binarize(&plane, level, config.illumination);
    tracing::debug!(
        "Threshold {} ({}) -> {} foreground pixels",
        level,
        config.method,
        binary.count_ones()
    );

    let filled = morphology::fill_holes(&binary);
    let opened = morphology::open(&filled, config.open_iterations);
    let sure_background = morphology::dilate(&opened, config.background_dilations);

    let distance = distance::distance_transform(&opened);
    let rounded = distance.map(|&d| d.round_ties_even());
    let max_distance = rounded.iter().copied().fold(0.0f32, f32::max);
    let cutoff = config.foreground_fraction * max_distance;
    let sure_foreground = common::BitBuffer2::from_fn(rounded.rows(), rounded.cols(), |r, c| {
        rounded[(r, c)] > cutoff
    });

    let mut unknown = sure_background;
    unknown.and_not(&sure_foreground);

    let seeds = LabelMap::from_mask(&sure_foreground, config.seed_connectivity);
    tracing::debug!(
        "Max distance {}, {} seeds, {} unknown pixels",
        max_distance,
        seeds.num_labels(),
        unknown.count_ones()
    );

    let mut markers = seeds.labels().map(|&label| label as i32 + 1);
    for idx in unknown.iter_ones() {
        markers.data_mut()[idx] = RegionMap::UNASSIGNED;
    }

    watershed::watershed(image, &mut markers);
    RegionMap::new(markers)
}

/// Centroids of every region id `>= 2` holding at least `min_size` pixels,
/// in ascending id order. Mean row and column are rounded half to even.
pub fn locate(map: &RegionMap, min_size: usize) -> Vec<Centroid> {
    #[derive(Clone, Copy, Default)]
    struct Accumulator {
        count: usize,
        sum_row: u64,
        sum_col: u64,
    }

    // Ids need not be contiguous.
    let mut regions: BTreeMap<i32, Accumulator> = BTreeMap::new();
    for row in 0..map.rows() {
        for col in 0..map.cols() {
            let id = map.at(row, col);
            if id >= RegionMap::FIRST_REGION {
                let acc = regions.entry(id).or_default();
                acc.count += 1;
                acc.sum_row += row as u64;
                acc.sum_col += col as u64;
            }
        }
    }

    regions
        .values()
        .filter(|acc| acc.count >= min_size)
        .map(|acc| {
            let n = acc.count as f64;
            Centroid::new(
                (acc.sum_row as f64 / n).round_ties_even() as usize,
                (acc.sum_col as f64 / n).round_ties_even() as usize,
            )
        })
        .collect()
}
