//! Per-image orchestration: segment, extract, classify, zip with centroids.
//!
//! Images are processed strictly one after another and so are the cells of an
//! image, since a human verification blocks the whole run.

mod config;

#[cfg(test)]
mod tests;

use std::path::{Path, PathBuf};

use common::CancelToken;
use serde::{Deserialize, Serialize};

pub use config::PipelineConfig;

use crate::classifier::{self, Classifier, EDGE, HumanVerifier, OTHER};
use crate::error::{Error, Result};
use crate::image::CellImage;
use crate::io;
use crate::library::{LibraryFolder, LibraryModel};
use crate::patch::{self, CellPatch};
use crate::segmentation::{Centroid, Segmenter};

/// Outcome for one located cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub category: String,
    pub confidence: f64,
    pub centroid: Centroid,
    #[serde(default, skip_serializing_if = "common::is_false")]
    pub verified: bool,
}

/// Results of one image, index-aligned with its centroids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageResult {
    pub name: String,
    pub results: Vec<ClassificationResult>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageFailure {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub images: Vec<ImageResult>,
    pub failures: Vec<ImageFailure>,
    pub cancelled: bool,
}

impl BatchResult {
    pub fn cell_count(&self) -> usize {
        self.images.iter().map(|image| image.results.len()).sum()
    }
}

/// Ordered category list offered to the verifier and used by reports:
/// trained categories, then "Other", then "Edge".
pub fn taxonomy(trained: &[String]) -> Vec<String> {
    let mut categories: Vec<String> = trained
        .iter()
        .filter(|c| c.as_str() != OTHER && c.as_str() != EDGE)
        .cloned()
        .collect();
    categories.push(OTHER.to_string());
    categories.push(EDGE.to_string());
    categories
}

/// Patch radius implied by a model dimension `d = (2r + 1)^2`.
pub fn patch_radius(dimension: usize) -> Result<usize> {
    let side = dimension.isqrt();
    if side * side != dimension {
        return Err(Error::config(format!(
            "model dimension {dimension} is not a square patch"
        )));
    }
    if side % 2 == 0 {
        return Err(Error::config(format!(
            "model patch side {side} is even, expected an odd side"
        )));
    }
    Ok((side - 1) / 2)
}

pub struct Pipeline<'a> {
    config: PipelineConfig,
    segmenter: Segmenter,
    classifier: Classifier<'a>,
    radius: usize,
    trained: Vec<String>,
    categories: Vec<String>,
    archive: Option<LibraryFolder>,
}

impl<'a> Pipeline<'a> {
    pub fn new(model: &'a LibraryModel, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let radius = patch_radius(model.dimension())?;
        let segmenter = Segmenter::from_config(config.segmentation.clone())?;
        let classifier = Classifier::new(model, config.classifier.clone())?;
        let trained = model.categories();
        let categories = taxonomy(&trained);
        tracing::debug!(
            "Pipeline ready: patch radius {}, categories {:?}",
            radius,
            categories
        );
        Ok(Self {
            config,
            segmenter,
            classifier,
            radius,
            trained,
            categories,
            archive: None,
        })
    }

    /// Human-verified patches of trained categories are written into
    /// `folder` for a future retrain.
    pub fn with_archive(mut self, folder: LibraryFolder) -> Self {
        self.archive = Some(folder);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[inline]
    pub fn radius(&self) -> usize {
        self.radius
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// Classifies every located cell of `image`, in centroid order.
    pub fn run_image(
        &self,
        image: &CellImage,
        verifier: Option<&mut dyn HumanVerifier>,
        cancel: &CancelToken,
    ) -> Result<Vec<ClassificationResult>> {
        cancel.check()?;
        let centroids = self.segmenter.detect(image);
        let patches: Vec<CellPatch> = centroids
            .iter()
            .map(|&centroid| {
                patch::extract(
                    image,
                    centroid,
                    self.radius,
                    self.config.segmentation.channel,
                    self.config.depth,
                )
            })
            .collect();

        let decisions = self
            .classifier
            .classify(&patches, &self.categories, verifier, cancel)?;

        let mut results = Vec::with_capacity(centroids.len());
        for ((centroid, patch), decision) in centroids.iter().zip(&patches).zip(decisions) {
            if decision.verified {
                self.archive_verified(&decision.category, patch);
            }
            results.push(ClassificationResult {
                category: decision.category,
                confidence: decision.confidence,
                centroid: *centroid,
                verified: decision.verified,
            });
        }
        Ok(results)
    }

    /// Loads and classifies `images` in order.
    ///
    /// Unreadable images and per-image classification failures are recorded
    /// and skipped; configuration and library errors abort the batch.
    pub fn run_batch(
        &self,
        images: &[PathBuf],
        mut verifier: Option<&mut dyn HumanVerifier>,
        cancel: &CancelToken,
    ) -> Result<BatchResult> {
        self.require_verifier(verifier.is_some())?;
        let mut batch = BatchResult::default();
        for path in images {
            if cancel.is_cancelled() {
                tracing::info!("Batch cancelled after {} images", batch.images.len());
                batch.cancelled = true;
                break;
            }
            let name = image_name(path);

            let image = match io::load_image(path) {
                Ok(image) => image,
                Err(e) => {
                    tracing::warn!("Skipping image: {e}");
                    batch.failures.push(ImageFailure {
                        name,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            match self.run_image(&image, classifier::reborrow(&mut verifier), cancel) {
                Ok(results) => {
                    tracing::info!("{}: {} cells", name, results.len());
                    batch.images.push(ImageResult { name, results });
                }
                Err(Error::Cancelled(_)) => {
                    tracing::info!("Batch cancelled while classifying {}", name);
                    batch.cancelled = true;
                    break;
                }
                Err(
                    e @ (Error::DimensionMismatch { .. } | Error::DegenerateDistance { .. }),
                ) => {
                    tracing::warn!("Failed to classify {}: {e}", name);
                    batch.failures.push(ImageFailure {
                        name,
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
        Ok(batch)
    }

    /// Fails before any image is read when interactive mode has no verifier.
    pub fn require_verifier(&self, has_verifier: bool) -> Result<()> {
        self.classifier.require_verifier(has_verifier)
    }

    fn archive_verified(&self, category: &str, patch: &CellPatch) {
        let Some(folder) = &self.archive else {
            return;
        };
        if patch.is_edge() || !self.trained.iter().any(|c| c == category) {
            return;
        }
        if let Err(e) = folder.archive_verified(category, patch) {
            tracing::warn!("Failed to archive verified patch: {e}");
        }
    }
}

fn image_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
