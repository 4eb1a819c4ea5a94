//! Principal-component appearance model trained from labeled patches.

use std::collections::BTreeMap;
use std::path::Path;

use nalgebra::{DMatrix, SymmetricEigen};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::patch::CellPatch;

/// Eigenvalues below this share of the largest one count as zero in the
/// sample-space decomposition.
const RANK_TOLERANCE: f64 = 1e-10;

/// Immutable trained model.
///
/// `components[j]` is the unit eigenvector with the `j`-th largest variance,
/// `scores[i]` the projection of training sample `i` onto all components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryModel {
    mean: Vec<f64>,
    components: Vec<Vec<f64>>,
    variances: Vec<f64>,
    scores: Vec<Vec<f64>>,
    labels: Vec<String>,
}

impl LibraryModel {
    /// Trains on every non-edge patch of every category, visiting categories in
    /// key order.
    pub fn train(sets: &BTreeMap<String, Vec<CellPatch>>) -> Result<Self> {
        let mut rows: Vec<Vec<f64>> = Vec::new();
        let mut labels: Vec<String> = Vec::new();
        let mut dimension: Option<usize> = None;

        for (category, patches) in sets {
            for patch in patches {
                let Some(features) = patch.features() else {
                    continue;
                };
                match dimension {
                    None => dimension = Some(features.len()),
                    Some(d) if d != features.len() => {
                        return Err(Error::config(format!(
                            "patch of category '{category}' has dimension {}, expected {d}",
                            features.len()
                        )));
                    }
                    Some(_) => {}
                }
                rows.push(features);
                labels.push(category.clone());
            }
        }

        let Some(d) = dimension else {
            return Err(Error::EmptyLibrary);
        };
        if d == 0 {
            return Err(Error::EmptyLibrary);
        }

        let model = Self::fit(rows, labels, d);
        tracing::info!(
            "Trained library model: {} samples, dimension {}, {} components",
            model.sample_count(),
            d,
            model.component_count()
        );
        Ok(model)
    }

    fn fit(rows: Vec<Vec<f64>>, labels: Vec<String>, d: usize) -> Self {
        let n = rows.len();
        let mut mean = vec![0.0; d];
        for row in &rows {
            for (m, &v) in mean.iter_mut().zip(row) {
                *m += v;
            }
        }
        for m in &mut mean {
            *m /= n as f64;
        }

        let centred: Vec<Vec<f64>> = rows
            .into_par_iter()
            .map(|row| row.iter().zip(&mean).map(|(v, m)| v - m).collect())
            .collect();
        let norm = (n.max(2) - 1) as f64;

        let (mut components, mut variances) = if n >= d {
            covariance_basis(&centred, d, norm)
        } else {
            sample_space_basis(&centred, d, norm)
        };

        let total: f64 = variances.iter().sum();
        if components.is_empty() || total <= 0.0 {
            tracing::debug!("Training set has no variance, keeping a single flat component");
            let mut axis = vec![0.0; d];
            axis[0] = 1.0;
            components = vec![axis];
            variances = vec![0.0];
        }

        let scores = centred
            .par_iter()
            .map(|row| components.iter().map(|c| dot(row, c)).collect())
            .collect();

        Self {
            mean,
            components,
            variances,
            scores,
            labels,
        }
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.mean.len()
    }

    #[inline]
    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    #[inline]
    pub fn sample_count(&self) -> usize {
        self.labels.len()
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn components(&self) -> &[Vec<f64>] {
        &self.components
    }

    /// Per-component variance, descending.
    pub fn variances(&self) -> &[f64] {
        &self.variances
    }

    pub fn scores(&self) -> &[Vec<f64>] {
        &self.scores
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Distinct training categories in order of first appearance.
    pub fn categories(&self) -> Vec<String> {
        let mut categories: Vec<String> = Vec::new();
        for label in &self.labels {
            if !categories.contains(label) {
                categories.push(label.clone());
            }
        }
        categories
    }

    /// Projection of `features - mean` onto the first `components` components.
    pub fn project(&self, features: &[f64], components: usize) -> Vec<f64> {
        let centred: Vec<f64> = features.iter().zip(&self.mean).map(|(v, m)| v - m).collect();
        self.components
            .iter()
            .take(components)
            .map(|c| dot(&centred, c))
            .collect()
    }

    /// Checks that all stored arrays agree in shape.
    pub fn validate(&self) -> std::result::Result<(), String> {
        let d = self.mean.len();
        let m = self.components.len();
        if d == 0 {
            return Err("empty mean vector".into());
        }
        if m == 0 || m > d {
            return Err(format!("{m} components for dimension {d}"));
        }
        if let Some(bad) = self.components.iter().position(|c| c.len() != d) {
            return Err(format!("component {bad} does not have dimension {d}"));
        }
        if self.variances.len() != m {
            return Err(format!("{} variances for {m} components", self.variances.len()));
        }
        if self.labels.is_empty() || self.labels.len() != self.scores.len() {
            return Err(format!(
                "{} labels for {} score rows",
                self.labels.len(),
                self.scores.len()
            ));
        }
        if let Some(bad) = self.scores.iter().position(|s| s.len() != m) {
            return Err(format!("score row {bad} does not have {m} columns"));
        }
        Ok(())
    }

    /// Writes the model, choosing the encoding from the extension.
    pub fn save(&self, path: &Path) -> Result<()> {
        common::serde_format::save_to_file(self, path).map_err(|e| Error::Persist {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        tracing::info!("Saved library model to {}", path.display());
        Ok(())
    }

    /// Reads and validates a model written by [`save`](Self::save).
    pub fn load(path: &Path) -> Result<Self> {
        let not_found = |reason: String| Error::LibraryNotFound {
            path: path.to_path_buf(),
            reason,
        };
        let model: Self =
            common::serde_format::load_from_file(path).map_err(|e| not_found(e.to_string()))?;
        model.validate().map_err(not_found)?;
        tracing::debug!(
            "Loaded library model from {}: {} samples, {} components",
            path.display(),
            model.sample_count(),
            model.component_count()
        );
        Ok(model)
    }
}

#[inline]
pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Symmetric matrix of pairwise dot products of `vectors`, divided by `norm`.
fn gram_matrix(vectors: &[Vec<f64>], norm: f64) -> DMatrix<f64> {
    let k = vectors.len();
    let upper: Vec<Vec<f64>> = (0..k)
        .into_par_iter()
        .map(|i| (i..k).map(|j| dot(&vectors[i], &vectors[j]) / norm).collect())
        .collect();

    let mut gram = DMatrix::zeros(k, k);
    for (i, row) in upper.iter().enumerate() {
        for (offset, &v) in row.iter().enumerate() {
            let j = i + offset;
            gram[(i, j)] = v;
            gram[(j, i)] = v;
        }
    }
    gram
}

/// Eigen pairs sorted by descending eigenvalue.
fn sorted_eigen(matrix: DMatrix<f64>) -> (Vec<f64>, DMatrix<f64>, Vec<usize>) {
    let eig = SymmetricEigen::new(matrix);
    let mut order: Vec<usize> = (0..eig.eigenvalues.len()).collect();
    order.sort_by(|&a, &b| eig.eigenvalues[b].total_cmp(&eig.eigenvalues[a]));
    let values = eig.eigenvalues.iter().copied().collect();
    (values, eig.eigenvectors, order)
}

/// Full `d`-component basis from the `d × d` covariance.
fn covariance_basis(centred: &[Vec<f64>], d: usize, norm: f64) -> (Vec<Vec<f64>>, Vec<f64>) {
    let columns: Vec<Vec<f64>> = (0..d)
        .map(|j| centred.iter().map(|row| row[j]).collect())
        .collect();
    let (values, vectors, order) = sorted_eigen(gram_matrix(&columns, norm));

    let mut components = Vec::with_capacity(d);
    let mut variances = Vec::with_capacity(d);
    for idx in order {
        let mut axis: Vec<f64> = vectors.column(idx).iter().copied().collect();
        orient(&mut axis);
        components.push(axis);
        variances.push(values[idx].max(0.0));
    }
    (components, variances)
}

/// Rank-limited basis through the `n × n` sample Gram matrix, for `n < d`.
fn sample_space_basis(centred: &[Vec<f64>], d: usize, norm: f64) -> (Vec<Vec<f64>>, Vec<f64>) {
    let (values, vectors, order) = sorted_eigen(gram_matrix(centred, norm));
    let largest = order.first().map(|&i| values[i]).unwrap_or(0.0);

    let mut components = Vec::new();
    let mut variances = Vec::new();
    if largest <= 0.0 {
        return (components, variances);
    }

    for idx in order {
        let value = values[idx];
        if value <= largest * RANK_TOLERANCE {
            break;
        }
        let weights = vectors.column(idx);
        let mut axis = vec![0.0; d];
        for (row, &w) in centred.iter().zip(weights.iter()) {
            for (a, &v) in axis.iter_mut().zip(row) {
                *a += w * v;
            }
        }
        let length = dot(&axis, &axis).sqrt();
        if length <= 0.0 {
            continue;
        }
        for a in &mut axis {
            *a /= length;
        }
        orient(&mut axis);
        components.push(axis);
        variances.push(value);
    }
    (components, variances)
}

/// Flips `axis` so its largest-magnitude entry is positive.
fn orient(axis: &mut [f64]) {
    let pivot = axis
        .iter()
        .copied()
        .fold(0.0f64, |best, v| if v.abs() > best.abs() { v } else { best });
    if pivot < 0.0 {
        for a in axis.iter_mut() {
            *a = -*a;
        }
    }
}
