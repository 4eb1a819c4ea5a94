use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Share of the total variance (percent, `(0, 100]`) the kept components explain.
    pub component_fraction: f64,
    /// Minimum vote share (percent) for an automatic decision.
    pub confidence_threshold: f64,
    /// Number of nearest training samples that vote.
    pub neighbours: usize,
    /// Ask a human below the confidence threshold instead of answering "Other".
    pub interactive: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            component_fraction: 90.0,
            confidence_threshold: 50.0,
            neighbours: 10,
            interactive: false,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if !(self.component_fraction > 0.0 && self.component_fraction <= 100.0) {
            return Err(Error::config(format!(
                "component_fraction must be in (0, 100], got {}",
                self.component_fraction
            )));
        }
        if !(0.0..=100.0).contains(&self.confidence_threshold) {
            return Err(Error::config(format!(
                "confidence_threshold must be in [0, 100], got {}",
                self.confidence_threshold
            )));
        }
        if self.neighbours < 1 {
            return Err(Error::config("neighbours must be at least 1"));
        }
        Ok(())
    }
}
