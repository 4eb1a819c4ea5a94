//! Nearest-neighbour classification in the reduced component space.
//!
//! Each query is projected onto the leading components, ranked against the
//! training scores and decided by rank-weighted voting. Low-confidence votes
//! fall back to "Other" or, in interactive mode, to a human.

mod config;
mod verifier;


use common::CancelToken;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

pub use config::Config;
pub use verifier::{HumanVerifier, Verdict};

use crate::error::{Error, Result};
use crate::library::LibraryModel;
use crate::patch::CellPatch;

pub const OTHER: &str = "Other";
pub const EDGE: &str = "Edge";
pub const IGNORE: &str = "Ignore";

/// Training sets at least this large rank distances in parallel.
const PARALLEL_RANKING_THRESHOLD: usize = 4096;

/// Final decision for one query patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub category: String,
    /// Percent in `[0, 100]`.
    pub confidence: f64,
    /// Decided by the human verifier.
    #[serde(default, skip_serializing_if = "common::is_false")]
    pub verified: bool,
}

impl Classification {
    fn new(category: impl Into<String>, confidence: f64) -> Self {
        Self {
            category: category.into(),
            confidence,
            verified: false,
        }
    }

    fn verified(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            confidence: 100.0,
            verified: true,
        }
    }
}

/// Outcome of the neighbour vote before the decision policy.
#[derive(Debug, Clone, PartialEq)]
pub struct Vote {
    pub category: String,
    pub confidence: f64,
    /// Vote share per category in order of first appearance among neighbours.
    pub shares: Vec<(String, f64)>,
}

/// Per-cell decision progress. Only `AwaitingHuman` suspends.
#[derive(Debug, Clone, PartialEq)]
pub enum DecisionState {
    Pending,
    Voted(Vote),
    AwaitingHuman(Vote),
    Resolved(Classification),
}

/// Number of leading components whose cumulative variance reaches
/// `fraction` percent of the total, at least 1. `100` keeps all of them.
pub fn select_components(variances: &[f64], fraction: f64) -> usize {
    if variances.is_empty() {
        return 0;
    }
    if fraction >= 100.0 {
        return variances.len();
    }
    let total: f64 = variances.iter().sum();
    let level = fraction / 100.0 * total;
    let mut cumulative = 0.0;
    for (i, &v) in variances.iter().enumerate() {
        cumulative += v;
        if cumulative >= level {
            return i + 1;
        }
    }
    variances.len()
}

pub struct Classifier<'a> {
    model: &'a LibraryModel,
    config: Config,
    components: usize,
    /// Training scores truncated to `components` columns.
    gallery: Vec<Vec<f64>>,
}

impl<'a> Classifier<'a> {
    pub fn new(model: &'a LibraryModel, config: Config) -> Result<Self> {
        config.validate()?;
        let components = select_components(model.variances(), config.component_fraction).max(1);
        let gallery = model
            .scores()
            .iter()
            .map(|row| row[..components.min(row.len())].to_vec())
            .collect();
        tracing::debug!(
            "Classifier uses {} of {} components, k = {}",
            components,
            model.component_count(),
            config.neighbours.min(model.sample_count())
        );
        Ok(Self {
            model,
            config,
            components,
            gallery,
        })
    }

    #[inline]
    pub fn components(&self) -> usize {
        self.components
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Fails with a configuration error in interactive mode without a verifier.
    pub fn require_verifier(&self, has_verifier: bool) -> Result<()> {
        if self.config.interactive && !has_verifier {
            return Err(Error::config("interactive classification needs a verifier"));
        }
        Ok(())
    }

    /// Fails with `DimensionMismatch` if any non-edge patch has the wrong size.
    pub fn check_dimensions(&self, patches: &[CellPatch]) -> Result<()> {
        let expected = self.model.dimension();
        for patch in patches {
            if let Some(actual) = patch.dimension() {
                if actual != expected {
                    return Err(Error::DimensionMismatch { expected, actual });
                }
            }
        }
        Ok(())
    }

    /// Classifies `patches` in order; results are index-aligned with them.
    ///
    /// `categories` is what the verifier is offered. The verifier is required
    /// in interactive mode.
    pub fn classify(
        &self,
        patches: &[CellPatch],
        categories: &[String],
        mut verifier: Option<&mut dyn HumanVerifier>,
        cancel: &CancelToken,
    ) -> Result<Vec<Classification>> {
        self.require_verifier(verifier.is_some())?;
        self.check_dimensions(patches)?;

        let mut results = Vec::with_capacity(patches.len());
        for (index, patch) in patches.iter().enumerate() {
            cancel.check()?;
            let result = self.decide(patch, categories, reborrow(&mut verifier))?;
            tracing::debug!(
                "Cell {}: {} ({:.1}%)",
                index,
                result.category,
                result.confidence
            );
            results.push(result);
        }
        Ok(results)
    }

    /// Runs the decision state machine for one patch.
    pub fn decide(
        &self,
        patch: &CellPatch,
        categories: &[String],
        mut verifier: Option<&mut dyn HumanVerifier>,
    ) -> Result<Classification> {
        let mut state = DecisionState::Pending;
        loop {
            state = match state {
                DecisionState::Pending => match patch.features() {
                    None => DecisionState::Resolved(Classification::new(EDGE, 100.0)),
                    Some(features) => DecisionState::Voted(self.vote(&features)?),
                },
                DecisionState::Voted(vote) => {
                    if vote.confidence >= self.config.confidence_threshold {
                        DecisionState::Resolved(Classification::new(vote.category, vote.confidence))
                    } else if self.config.interactive {
                        DecisionState::AwaitingHuman(vote)
                    } else {
                        DecisionState::Resolved(Classification::new(OTHER, vote.confidence))
                    }
                }
                DecisionState::AwaitingHuman(vote) => {
                    let Some(human) = verifier.as_deref_mut() else {
                        return Err(Error::config("interactive classification needs a verifier"));
                    };
                    tracing::info!(
                        "Asking for verification: best guess {} at {:.1}%",
                        vote.category,
                        vote.confidence
                    );
                    match human.verify(patch, categories) {
                        Verdict::Category(category) => {
                            DecisionState::Resolved(Classification::verified(category))
                        }
                        Verdict::Ignore => DecisionState::Resolved(Classification::verified(IGNORE)),
                    }
                }
                DecisionState::Resolved(result) => return Ok(result),
            };
        }
    }

    /// Rank-weighted vote of the `k` nearest training samples.
    pub fn vote(&self, features: &[f64]) -> Result<Vote> {
        let expected = self.model.dimension();
        if features.len() != expected {
            return Err(Error::DimensionMismatch {
                expected,
                actual: features.len(),
            });
        }

        let projected = self.model.project(features, self.components);
        let ranked = self.rank(&projected);
        let k = self.config.neighbours.min(ranked.len());
        let labels = self.model.labels();

        let mut totals: Vec<(String, f64)> = Vec::new();
        for (rank, &(distance, index)) in ranked.iter().take(k).enumerate() {
            if distance == 0.0 {
                return Err(Error::DegenerateDistance { index });
            }
            let weight = 1.0 / ((rank + 1) as f64 * distance);
            let label = &labels[index];
            match totals.iter_mut().find(|(category, _)| category == label) {
                Some((_, total)) => *total += weight,
                None => totals.push((label.clone(), weight)),
            }
        }

        let sum: f64 = totals.iter().map(|(_, t)| t).sum();
        let shares: Vec<(String, f64)> = totals
            .into_iter()
            .map(|(category, total)| (category, (total / sum * 100.0).clamp(0.0, 100.0)))
            .collect();

        let mut best = 0;
        for (i, (_, share)) in shares.iter().enumerate() {
            if *share > shares[best].1 {
                best = i;
            }
        }
        let (category, confidence) = shares
            .get(best)
            .cloned()
            .ok_or(Error::EmptyLibrary)?;

        Ok(Vote {
            category,
            confidence,
            shares,
        })
    }

    /// `(squared distance, training index)` sorted ascending, ties by index.
    fn rank(&self, projected: &[f64]) -> Vec<(f64, usize)> {
        let distance = |(index, row): (usize, &Vec<f64>)| {
            let d: f64 = row
                .iter()
                .zip(projected)
                .map(|(a, b)| (a - b) * (a - b))
                .sum();
            (d, index)
        };

        let mut ranked: Vec<(f64, usize)> = if self.gallery.len() >= PARALLEL_RANKING_THRESHOLD {
            self.gallery.par_iter().enumerate().map(distance).collect()
        } else {
            self.gallery.iter().enumerate().map(distance).collect()
        };
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        ranked
    }
}

pub(crate) fn reborrow<'a>(
    verifier: &'a mut Option<&mut dyn HumanVerifier>,
) -> Option<&'a mut dyn HumanVerifier> {
    match verifier {
        Some(human) => Some(&mut **human),
        None => None,
    }
}

/// Classifies `patches` against `model` with the given policy.
pub fn classify(
    patches: &[CellPatch],
    model: &LibraryModel,
    config: &Config,
    verifier: Option<&mut dyn HumanVerifier>,
    cancel: &CancelToken,
) -> Result<Vec<Classification>> {
    let classifier = Classifier::new(model, config.clone())?;
    let categories = crate::pipeline::taxonomy(&model.categories());
    classifier.classify(patches, &categories, verifier, cancel)
}
