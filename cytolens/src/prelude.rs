//! Prelude module for convenient imports.
//!
//! ```rust,ignore
//! use cytolens::prelude::*;
//! ```

pub use crate::{CancelToken, CellImage, Channel, Error, Result};

pub use crate::{Centroid, Illumination, SegmentationConfig, Segmenter, ThresholdMethod};

pub use crate::{CellPatch, LibraryFolder, LibraryModel, PatchConfig};

pub use crate::{ClassificationResult, ClassifierConfig, HumanVerifier, Verdict};

pub use crate::{BatchResult, FolderReport, FolderWalker, Pipeline, PipelineConfig};
