//! Run configuration shared by the orchestrator, the batch walker and the
//! folder report.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::classifier;
use crate::error::{Error, Result};
use crate::patch;
use crate::segmentation;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Grey depth of the extracted patches.
    pub depth: u8,
    pub segmentation: segmentation::Config,
    pub classifier: classifier::Config,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            depth: 3,
            segmentation: segmentation::Config::default(),
            classifier: classifier::Config::default(),
        }
    }
}

impl PipelineConfig {
    pub fn new(segmentation: segmentation::Config, classifier: classifier::Config) -> Self {
        Self {
            segmentation,
            classifier,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        patch::validate_depth(self.depth)?;
        self.segmentation.validate()?;
        self.classifier.validate()
    }

    /// Reads a yaml, json, toml or bin file and validates it.
    pub fn load(path: &Path) -> Result<Self> {
        let config: Self = common::serde_format::load_from_file(path).map_err(|e| {
            Error::config(format!("failed to read '{}': {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        common::serde_format::save_to_file(self, path).map_err(|e| Error::Persist {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}
