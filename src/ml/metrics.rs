//! Evaluation metrics for the binary classifiers.

use serde::{Deserialize, Serialize};

use crate::labeling::BinaryLabel;

/// Confusion matrix over `BinaryLabel` (`counts[truth][predicted]`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub counts: [[u32; 2]; 2],
}

impl ConfusionMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs(truth: &[BinaryLabel], predicted: &[BinaryLabel]) -> Self {
        let mut cm = Self::new();
        for (t, p) in truth.iter().zip(predicted) {
            cm.add(*t, *p);
        }
        cm
    }

    pub fn add(&mut self, truth: BinaryLabel, predicted: BinaryLabel) {
        let cell = &mut self.counts[truth.index()][predicted.index()];
        *cell = cell.saturating_add(1);
    }

    pub fn get(&self, truth: BinaryLabel, predicted: BinaryLabel) -> u32 {
        self.counts[truth.index()][predicted.index()]
    }

    pub fn total(&self) -> u32 {
        self.counts.iter().flatten().sum()
    }
}

/// Precision/recall statistics for a single class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerClassStats {
    pub label: BinaryLabel,
    /// `TP / (TP + FP)`.
    pub precision: f32,
    /// `TP / (TP + FN)`.
    pub recall: f32,
    pub support: u32,
}

/// Compute per-class precision and recall from a confusion matrix.
pub fn precision_recall_by_class(cm: &ConfusionMatrix) -> Vec<PerClassStats> {
    BinaryLabel::ALL
        .iter()
        .map(|&label| {
            let other = match label {
                BinaryLabel::Negative => BinaryLabel::Positive,
                BinaryLabel::Positive => BinaryLabel::Negative,
            };
            let tp = cm.get(label, label) as f32;
            let fn_ = cm.get(label, other) as f32;
            let fp = cm.get(other, label) as f32;
            let precision = if tp + fp == 0.0 { 0.0 } else { tp / (tp + fp) };
            let recall = if tp + fn_ == 0.0 { 0.0 } else { tp / (tp + fn_) };
            PerClassStats {
                label,
                precision,
                recall,
                support: cm.get(label, label) + cm.get(label, other),
            }
        })
        .collect()
}

/// Compute overall accuracy from a confusion matrix.
pub fn accuracy(cm: &ConfusionMatrix) -> f32 {
    let total = cm.total();
    if total == 0 {
        return 0.0;
    }
    let correct = cm.get(BinaryLabel::Negative, BinaryLabel::Negative)
        + cm.get(BinaryLabel::Positive, BinaryLabel::Positive);
    correct as f32 / total as f32
}

/// Held-out evaluation snapshot recorded in the training report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldoutMetrics {
    pub train_rows: usize,
    pub test_rows: usize,
    pub accuracy: f32,
    pub per_class: Vec<PerClassStats>,
    pub confusion: ConfusionMatrix,
}

impl HoldoutMetrics {
    pub fn from_confusion(train_rows: usize, confusion: ConfusionMatrix) -> Self {
        Self {
            train_rows,
            test_rows: confusion.total() as usize,
            accuracy: accuracy(&confusion),
            per_class: precision_recall_by_class(&confusion),
            confusion,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use BinaryLabel::{Negative, Positive};

    #[test]
    fn precision_recall_and_accuracy() {
        let cm = ConfusionMatrix::from_pairs(
            &[Positive, Positive, Negative, Negative],
            &[Positive, Negative, Negative, Negative],
        );
        let stats = precision_recall_by_class(&cm);
        assert_eq!(stats[1].label, Positive);
        assert!((stats[1].precision - 1.0).abs() < 1e-6);
        assert!((stats[1].recall - 0.5).abs() < 1e-6);
        assert!((stats[0].precision - 2.0 / 3.0).abs() < 1e-6);
        assert_eq!(stats[0].support, 2);
        assert!((accuracy(&cm) - 0.75).abs() < 1e-6);
    }

    #[test]
    fn empty_matrix_is_zero() {
        let cm = ConfusionMatrix::new();
        assert_eq!(accuracy(&cm), 0.0);
        assert!(precision_recall_by_class(&cm).iter().all(|s| s.precision == 0.0));
    }
}
