//! Per-folder summary: per-image tallies, percentages and mean confidence.
//!
//! Categories are matched exactly against the taxonomy. "Ignore" and any
//! other value outside it land in `unmatched`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::classifier::{EDGE, OTHER};
use crate::error::{Error, Result};
use crate::pipeline::{BatchResult, ImageFailure, ImageResult, PipelineConfig};

/// File written next to the analysed images.
pub const REPORT_FILE_NAME: &str = "cytolens_report.json";

/// Where the run read from and how it was configured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSettings {
    pub image_folder: PathBuf,
    pub library_folder: PathBuf,
    pub config: PipelineConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRow {
    pub name: String,
    /// Cells per category, aligned with [`FolderReport::categories`].
    pub counts: Vec<usize>,
    pub unmatched: usize,
    pub total: usize,
    /// `counts` as percent of `total`; all zero for an image without cells.
    pub percentages: Vec<f64>,
    /// Mean confidence over the image's non-edge cells, 0 without any.
    pub mean_confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderReport {
    pub name: String,
    pub settings: ReportSettings,
    pub categories: Vec<String>,
    pub rows: Vec<ImageRow>,
    pub totals: Vec<usize>,
    pub unmatched: usize,
    pub total_cells: usize,
    /// Cells assigned to a trained category.
    pub identified: usize,
    /// Share of `identified` per category; `None` for "Other" and "Edge".
    pub identified_percentages: Vec<Option<f64>>,
    /// Mean of the per-image mean confidences.
    pub mean_confidence: f64,
    pub failures: Vec<ImageFailure>,
    pub cancelled: bool,
    /// Per-cell detail in centroid order.
    pub images: Vec<ImageResult>,
}

impl FolderReport {
    pub fn build(
        name: impl Into<String>,
        settings: ReportSettings,
        categories: &[String],
        batch: &BatchResult,
    ) -> Self {
        let rows: Vec<ImageRow> = batch
            .images
            .iter()
            .map(|image| tally_image(image, categories))
            .collect();

        let mut totals = vec![0usize; categories.len()];
        for row in &rows {
            for (total, count) in totals.iter_mut().zip(&row.counts) {
                *total += count;
            }
        }
        let unmatched: usize = rows.iter().map(|r| r.unmatched).sum();
        let total_cells: usize = rows.iter().map(|r| r.total).sum();

        let is_trained = |category: &str| category != OTHER && category != EDGE;
        let identified: usize = categories
            .iter()
            .zip(&totals)
            .filter(|(category, _)| is_trained(category))
            .map(|(_, count)| count)
            .sum();
        let identified_percentages = categories
            .iter()
            .zip(&totals)
            .map(|(category, &count)| {
                is_trained(category).then(|| percent(count, identified))
            })
            .collect();

        let mean_confidence = if rows.is_empty() {
            0.0
        } else {
            rows.iter().map(|r| r.mean_confidence).sum::<f64>() / rows.len() as f64
        };

        Self {
            name: name.into(),
            settings,
            categories: categories.to_vec(),
            rows,
            totals,
            unmatched,
            total_cells,
            identified,
            identified_percentages,
            mean_confidence,
            failures: batch.failures.clone(),
            cancelled: batch.cancelled,
            images: batch.images.clone(),
        }
    }

    /// Writes the report as pretty JSON into `dir` and returns the path.
    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(REPORT_FILE_NAME);
        let persist = |reason: String| Error::Persist {
            path: path.clone(),
            reason,
        };
        let bytes = serde_json::to_vec_pretty(self).map_err(|e| persist(e.to_string()))?;
        std::fs::write(&path, bytes).map_err(|e| persist(e.to_string()))?;
        tracing::info!(
            "Wrote report for '{}' ({} cells, {} identified) to {}",
            self.name,
            self.total_cells,
            self.identified,
            path.display()
        );
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| Error::io(path, e))?;
        serde_json::from_slice(&bytes).map_err(|e| Error::Persist {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

fn tally_image(image: &ImageResult, categories: &[String]) -> ImageRow {
    let mut counts = vec![0usize; categories.len()];
    let mut unmatched = 0;
    let mut confidence_sum = 0.0;
    let mut non_edge = 0usize;

    for result in &image.results {
        match categories.iter().position(|c| *c == result.category) {
            Some(index) => counts[index] += 1,
            None => unmatched += 1,
        }
        if result.category != EDGE {
            confidence_sum += result.confidence;
            non_edge += 1;
        }
    }

    let total = image.results.len();
    ImageRow {
        name: image.name.clone(),
        percentages: counts.iter().map(|&c| percent(c, total)).collect(),
        counts,
        unmatched,
        total,
        mean_confidence: if non_edge == 0 {
            0.0
        } else {
            confidence_sum / non_edge as f64
        },
    }
}

#[inline]
fn percent(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 * 100.0 / total as f64
    }
}
