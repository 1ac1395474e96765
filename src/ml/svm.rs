//! Class-balanced linear max-margin classifier.
//!
//! L2-regularized squared-hinge loss solved in the dual by coordinate descent, with a
//! constant bias feature appended to every row.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use sprs::CsVec;

use crate::labeling::BinaryLabel;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SvmOptions {
    pub c: f64,
    pub max_iter: usize,
    /// Stop when the projected-gradient gap falls below this value.
    pub tol: f64,
    pub seed: u64,
}

impl Default for SvmOptions {
    fn default() -> Self {
        Self {
            c: 1.0,
            max_iter: 1000,
            tol: 1e-4,
            seed: 42,
        }
    }
}

/// Fitted linear classifier. Positive decisions mean [`BinaryLabel::Positive`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearSvm {
    pub weights: Vec<f64>,
    pub bias: f64,
}

impl LinearSvm {
    pub fn dim(&self) -> usize {
        self.weights.len()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.weights.iter().any(|w| !w.is_finite()) || !self.bias.is_finite() {
            return Err("svm weights must be finite".to_string());
        }
        Ok(())
    }

    /// Signed distance-like score; rows wider than the model ignore extra columns.
    pub fn decision(&self, x: &CsVec<f64>) -> f64 {
        dot(&self.weights, x) + self.bias
    }

    pub fn predict(&self, x: &CsVec<f64>) -> BinaryLabel {
        if self.decision(x) > 0.0 {
            BinaryLabel::Positive
        } else {
            BinaryLabel::Negative
        }
    }
}

pub(crate) fn dot(weights: &[f64], x: &CsVec<f64>) -> f64 {
    x.iter()
        .filter_map(|(i, v)| weights.get(i).map(|w| w * v))
        .sum()
}

/// Balanced per-class weights `n / (2 * n_class)`.
pub fn balanced_class_weights(labels: &[BinaryLabel]) -> [f64; 2] {
    let mut counts = [0usize; 2];
    for label in labels {
        counts[label.index()] += 1;
    }
    let n = labels.len() as f64;
    counts.map(|count| {
        if count == 0 {
            0.0
        } else {
            n / (2.0 * count as f64)
        }
    })
}

/// Train on rows of dimension `dim`. Both classes must be present.
pub fn train_linear_svm(
    x: &[CsVec<f64>],
    y: &[BinaryLabel],
    dim: usize,
    options: &SvmOptions,
) -> Result<LinearSvm, String> {
    if x.is_empty() {
        return Err("Empty training set".to_string());
    }
    if x.len() != y.len() {
        return Err("Mismatched training inputs/labels".to_string());
    }
    if x.iter().any(|row| row.dim() != dim) {
        return Err(format!("Inconsistent feature row length (expected {dim})"));
    }
    if !(options.c.is_finite() && options.c > 0.0) {
        return Err("C must be > 0".to_string());
    }
    let class_weights = balanced_class_weights(y);
    if class_weights.iter().any(|w| *w == 0.0) {
        return Err("Training labels must contain both classes".to_string());
    }

    let signs: Vec<f64> = y
        .iter()
        .map(|label| match label {
            BinaryLabel::Positive => 1.0,
            BinaryLabel::Negative => -1.0,
        })
        .collect();
    // Squared hinge: the box constraint disappears and 1/(2 C_i) joins the diagonal.
    let diag: Vec<f64> = y
        .iter()
        .map(|label| 0.5 / (options.c * class_weights[label.index()]))
        .collect();
    let q_ii: Vec<f64> = x
        .iter()
        .zip(&diag)
        .map(|(row, d)| row.data().iter().map(|v| v * v).sum::<f64>() + 1.0 + d)
        .collect();

    let mut weights = vec![0.0f64; dim];
    let mut bias = 0.0f64;
    let mut alpha = vec![0.0f64; x.len()];
    let mut order: Vec<usize> = (0..x.len()).collect();
    let mut rng = StdRng::seed_from_u64(options.seed);

    let mut converged = false;
    for _ in 0..options.max_iter.max(1) {
        order.shuffle(&mut rng);
        let mut pg_max = f64::NEG_INFINITY;
        let mut pg_min = f64::INFINITY;
        for &i in &order {
            let row = &x[i];
            let gradient = signs[i] * (dot(&weights, row) + bias) - 1.0 + diag[i] * alpha[i];
            let projected = if alpha[i] == 0.0 {
                gradient.min(0.0)
            } else {
                gradient
            };
            pg_max = pg_max.max(projected);
            pg_min = pg_min.min(projected);
            if projected.abs() <= 1e-12 {
                continue;
            }
            let previous = alpha[i];
            alpha[i] = (alpha[i] - gradient / q_ii[i]).max(0.0);
            let delta = (alpha[i] - previous) * signs[i];
            for (j, v) in row.iter() {
                weights[j] += delta * v;
            }
            bias += delta;
        }
        if pg_max - pg_min <= options.tol {
            converged = true;
            break;
        }
    }
    if !converged {
        tracing::debug!(
            "Linear SVM stopped after {} iterations without converging",
            options.max_iter
        );
    }

    let model = LinearSvm { weights, bias };
    model.validate()?;
    Ok(model)
}
