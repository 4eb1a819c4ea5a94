//! Cytolens - cell segmentation and classification for microscopy images.
//!
//! The library locates roughly circular cells, cuts a fixed-size greyscale
//! patch around each one and classifies it against a principal-component
//! appearance model trained from a folder of hand-sorted example patches.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use cytolens::{CancelToken, LibraryFolder, Pipeline, PipelineConfig};
//!
//! // Train once from library/<Category>/*.tif
//! let library = LibraryFolder::new("library");
//! let model = library.compile()?;
//!
//! // Classify a folder of images
//! let pipeline = Pipeline::new(&model, PipelineConfig::default())?;
//! let images = common::file_utils::image_files("images".as_ref())?;
//! let batch = pipeline.run_batch(&images, None, &CancelToken::new())?;
//!
//! println!("Classified {} cells", batch.cell_count());
//! ```

pub mod batch;
pub mod classifier;
mod error;
mod image;
pub mod io;
pub mod library;
pub mod patch;
pub mod pipeline;
pub mod report;
pub mod segmentation;

#[cfg(test)]
pub(crate) mod testing;

pub mod prelude;

pub use common::{CancelToken, Cancelled};

// ============================================================================
// Core types
// ============================================================================

pub use error::{Error, ImageLoadError, Result};
pub use crate::image::{CellImage, Channel};

// ============================================================================
// Segmentation
// ============================================================================

pub use segmentation::{
    Centroid, Config as SegmentationConfig, Connectivity, Illumination, RegionMap, Segmenter,
    ThresholdMethod, locate, segment,
};

// ============================================================================
// Patches and library
// ============================================================================

pub use library::{HarvestSummary, LibraryFolder, LibraryModel, MODEL_FILE_NAME, harvest};
pub use patch::{CellPatch, Config as PatchConfig};

// ============================================================================
// Classification
// ============================================================================

pub use classifier::{
    Classification, Classifier, Config as ClassifierConfig, HumanVerifier, Verdict,
    select_components,
};

// ============================================================================
// Orchestration
// ============================================================================

pub use batch::{FolderWalker, WalkSummary};
pub use pipeline::{
    BatchResult, ClassificationResult, ImageFailure, ImageResult, Pipeline, PipelineConfig,
    taxonomy,
};
pub use report::{FolderReport, ReportSettings};
