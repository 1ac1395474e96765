//! Sigmoid probability calibration for the linear classifier.

use serde::{Deserialize, Serialize};
use sprs::CsVec;

use super::svm::{LinearSvm, SvmOptions, train_linear_svm};
use crate::labeling::BinaryLabel;

/// Platt sigmoid `P(positive | f) = 1 / (1 + exp(a * f + b))`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlattSigmoid {
    pub a: f64,
    pub b: f64,
}

impl PlattSigmoid {
    pub fn probability(&self, decision: f64) -> f64 {
        let z = self.a * decision + self.b;
        if z >= 0.0 {
            let e = (-z).exp();
            e / (1.0 + e)
        } else {
            1.0 / (1.0 + z.exp())
        }
    }

    /// Fit on decision values with prior-corrected targets, by Newton steps with
    /// backtracking line search.
    pub fn fit(decisions: &[f64], labels: &[BinaryLabel]) -> Result<Self, String> {
        if decisions.is_empty() || decisions.len() != labels.len() {
            return Err("Calibration needs one label per decision value".to_string());
        }
        let positives = labels
            .iter()
            .filter(|label| **label == BinaryLabel::Positive)
            .count() as f64;
        let negatives = labels.len() as f64 - positives;
        let hi = (positives + 1.0) / (positives + 2.0);
        let lo = 1.0 / (negatives + 2.0);
        let targets: Vec<f64> = labels
            .iter()
            .map(|label| match label {
                BinaryLabel::Positive => hi,
                BinaryLabel::Negative => lo,
            })
            .collect();

        const MAX_ITER: usize = 100;
        const MIN_STEP: f64 = 1e-10;
        const SIGMA: f64 = 1e-12;
        const EPS: f64 = 1e-5;

        let objective = |a: f64, b: f64| -> f64 {
            decisions
                .iter()
                .zip(&targets)
                .map(|(f, t)| {
                    let z = f * a + b;
                    if z >= 0.0 {
                        t * z + (-z).exp().ln_1p()
                    } else {
                        (t - 1.0) * z + z.exp().ln_1p()
                    }
                })
                .sum()
        };

        let mut a = 0.0;
        let mut b = ((negatives + 1.0) / (positives + 1.0)).ln();
        let mut value = objective(a, b);
        for _ in 0..MAX_ITER {
            let (mut h11, mut h22, mut h21) = (SIGMA, SIGMA, 0.0);
            let (mut g1, mut g2) = (0.0, 0.0);
            for (f, t) in decisions.iter().zip(&targets) {
                let z = f * a + b;
                let (p, q) = if z >= 0.0 {
                    let e = (-z).exp();
                    (e / (1.0 + e), 1.0 / (1.0 + e))
                } else {
                    let e = z.exp();
                    (1.0 / (1.0 + e), e / (1.0 + e))
                };
                let d2 = p * q;
                h11 += f * f * d2;
                h22 += d2;
                h21 += f * d2;
                let d1 = t - p;
                g1 += f * d1;
                g2 += d1;
            }
            if g1.abs() < EPS && g2.abs() < EPS {
                break;
            }
            let det = h11 * h22 - h21 * h21;
            let da = -(h22 * g1 - h21 * g2) / det;
            let db = -(-h21 * g1 + h11 * g2) / det;
            let gd = g1 * da + g2 * db;
            let mut step = 1.0;
            while step >= MIN_STEP {
                let (next_a, next_b) = (a + step * da, b + step * db);
                let next_value = objective(next_a, next_b);
                if next_value < value + 1e-4 * step * gd {
                    a = next_a;
                    b = next_b;
                    value = next_value;
                    break;
                }
                step /= 2.0;
            }
            if step < MIN_STEP {
                break;
            }
        }
        if !(a.is_finite() && b.is_finite()) {
            return Err("Sigmoid calibration diverged".to_string());
        }
        Ok(Self { a, b })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibratedMember {
    pub svm: LinearSvm,
    pub sigmoid: PlattSigmoid,
}

/// Linear classifier averaged over calibrated cross-validation folds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibratedClassifier {
    pub input_dim: usize,
    pub members: Vec<CalibratedMember>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationOptions {
    pub folds: usize,
    pub svm: SvmOptions,
}

impl Default for CalibrationOptions {
    fn default() -> Self {
        Self {
            folds: 3,
            svm: SvmOptions::default(),
        }
    }
}

impl CalibratedClassifier {
    /// Fit one calibrated member per stratified fold.
    ///
    /// `folds` shrinks to the smallest class count. A class with a single row leaves no
    /// room for held-out calibration, so the sigmoid is then fitted in-sample.
    pub fn fit(
        x: &[CsVec<f64>],
        y: &[BinaryLabel],
        dim: usize,
        options: &CalibrationOptions,
    ) -> Result<Self, String> {
        if x.len() != y.len() {
            return Err("Mismatched training inputs/labels".to_string());
        }
        let mut by_class: [Vec<usize>; 2] = [Vec::new(), Vec::new()];
        for (i, label) in y.iter().enumerate() {
            by_class[label.index()].push(i);
        }
        let smallest = by_class.iter().map(Vec::len).min().unwrap_or(0);
        if smallest == 0 {
            return Err("Training labels must contain both classes".to_string());
        }

        let folds = options.folds.min(smallest);
        let members = if folds < 2 {
            tracing::debug!("Calibrating in-sample: smallest class has {smallest} row(s)");
            let svm = train_linear_svm(x, y, dim, &options.svm)?;
            let decisions: Vec<f64> = x.iter().map(|row| svm.decision(row)).collect();
            let sigmoid = PlattSigmoid::fit(&decisions, y)?;
            vec![CalibratedMember { svm, sigmoid }]
        } else {
            let assignment = stratified_folds(&by_class, y.len(), folds);
            let mut members = Vec::with_capacity(folds);
            for fold in 0..folds {
                let mut train_x = Vec::new();
                let mut train_y = Vec::new();
                let mut held_out = Vec::new();
                for (i, &assigned) in assignment.iter().enumerate() {
                    if assigned == fold {
                        held_out.push(i);
                    } else {
                        train_x.push(x[i].clone());
                        train_y.push(y[i]);
                    }
                }
                let svm = train_linear_svm(&train_x, &train_y, dim, &options.svm)?;
                let decisions: Vec<f64> = held_out.iter().map(|&i| svm.decision(&x[i])).collect();
                let labels: Vec<BinaryLabel> = held_out.iter().map(|&i| y[i]).collect();
                let sigmoid = PlattSigmoid::fit(&decisions, &labels)?;
                members.push(CalibratedMember { svm, sigmoid });
            }
            members
        };
        let model = Self {
            input_dim: dim,
            members,
        };
        model.validate()?;
        Ok(model)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.members.is_empty() {
            return Err("Calibrated classifier has no members".to_string());
        }
        for member in &self.members {
            if member.svm.dim() != self.input_dim {
                return Err(format!(
                    "Classifier member expects {} features (declared {})",
                    member.svm.dim(),
                    self.input_dim
                ));
            }
            member.svm.validate()?;
            if !(member.sigmoid.a.is_finite() && member.sigmoid.b.is_finite()) {
                return Err("Sigmoid parameters must be finite".to_string());
            }
        }
        Ok(())
    }

    /// Averaged `[P(negative), P(positive)]`.
    pub fn predict_proba(&self, x: &CsVec<f64>) -> [f64; 2] {
        if self.members.is_empty() {
            return [0.5, 0.5];
        }
        let positive = self
            .members
            .iter()
            .map(|member| member.sigmoid.probability(member.svm.decision(x)))
            .sum::<f64>()
            / self.members.len() as f64;
        [1.0 - positive, positive]
    }

    /// Argmax label with its probability; ties go to the negative class.
    pub fn predict_with_confidence(&self, x: &CsVec<f64>) -> (BinaryLabel, f64) {
        let [negative, positive] = self.predict_proba(x);
        if positive > negative {
            (BinaryLabel::Positive, positive)
        } else {
            (BinaryLabel::Negative, negative)
        }
    }

    pub fn predict(&self, x: &CsVec<f64>) -> BinaryLabel {
        self.predict_with_confidence(x).0
    }
}

/// Round-robin fold index per row, within each class in row order.
fn stratified_folds(by_class: &[Vec<usize>; 2], len: usize, folds: usize) -> Vec<usize> {
    let mut assignment = vec![0usize; len];
    for rows in by_class {
        for (position, &row) in rows.iter().enumerate() {
            assignment[row] = position % folds;
        }
    }
    assignment
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(value: f64) -> CsVec<f64> {
        CsVec::new(1, vec![0], vec![value])
    }

    #[test]
    fn sigmoid_is_monotonic_for_separable_scores() {
        let decisions = [-2.0, -1.0, -0.5, 0.5, 1.0, 2.0];
        let labels = [
            BinaryLabel::Negative,
            BinaryLabel::Negative,
            BinaryLabel::Negative,
            BinaryLabel::Positive,
            BinaryLabel::Positive,
            BinaryLabel::Positive,
        ];
        let sigmoid = PlattSigmoid::fit(&decisions, &labels).unwrap();
        assert!(sigmoid.a < 0.0);
        assert!(sigmoid.probability(2.0) > sigmoid.probability(-2.0));
        // Prior-corrected targets keep probabilities away from 0 and 1.
        assert!(sigmoid.probability(2.0) < 1.0);
    }

    #[test]
    fn folds_shrink_to_smallest_class() {
        let x: Vec<_> = [1.0, 0.8, 0.9, -1.0, -0.7].into_iter().map(row).collect();
        let y = [
            BinaryLabel::Positive,
            BinaryLabel::Positive,
            BinaryLabel::Positive,
            BinaryLabel::Negative,
            BinaryLabel::Negative,
        ];
        let model = CalibratedClassifier::fit(&x, &y, 1, &CalibrationOptions::default()).unwrap();
        assert_eq!(model.members.len(), 2);
        assert_eq!(model.predict(&row(1.0)), BinaryLabel::Positive);
        assert_eq!(model.predict(&row(-1.0)), BinaryLabel::Negative);
    }

    #[test]
    fn single_row_class_calibrates_in_sample() {
        let x = vec![row(1.0), row(-1.0)];
        let y = [BinaryLabel::Positive, BinaryLabel::Negative];
        let model = CalibratedClassifier::fit(&x, &y, 1, &CalibrationOptions::default()).unwrap();
        assert_eq!(model.members.len(), 1);
        let (_, confidence) = model.predict_with_confidence(&row(1.0));
        assert!((0.5..0.99).contains(&confidence));
    }

    #[test]
    fn probabilities_sum_to_one() {
        let x = vec![row(1.0), row(0.5), row(-1.0), row(-0.5)];
        let y = [
            BinaryLabel::Positive,
            BinaryLabel::Positive,
            BinaryLabel::Negative,
            BinaryLabel::Negative,
        ];
        let model = CalibratedClassifier::fit(&x, &y, 1, &CalibrationOptions::default()).unwrap();
        let [negative, positive] = model.predict_proba(&row(0.2));
        assert!((negative + positive - 1.0).abs() < 1e-12);
    }

    #[test]
    fn validate_rejects_dimension_mismatch() {
        let x = vec![row(1.0), row(-1.0)];
        let y = [BinaryLabel::Positive, BinaryLabel::Negative];
        let mut model =
            CalibratedClassifier::fit(&x, &y, 1, &CalibrationOptions::default()).unwrap();
        model.input_dim = 3;
        assert!(model.validate().is_err());
    }
}
