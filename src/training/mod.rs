//! Self-training: seed labels from manual annotations and keyword rules, evaluate on a
//! holdout, accept confident pseudo-labels, and fit the final artifact.
//!
//! The run moves through [`TrainingStage`]s in order; any error aborts it before an
//! artifact exists.

pub mod export;
pub mod split;

pub use export::{ExportError, LabeledRow, write_labeled_jsonl};
pub use split::{HoldoutSplit, stratified_holdout};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::artifact::{ArtifactMetadata, LabelDistribution, ModelArtifact, SeedSourceCounts};
use crate::features::FeatureExtractor;
use crate::labeling::{BinaryLabel, KeywordRuleEngine, LabelSource};
use crate::ml::metrics::{ConfusionMatrix, HoldoutMetrics};
use crate::ml::{CalibratedClassifier, CalibrationOptions, SvmOptions};
use crate::profile::{DomainProfile, LabelStage};
use crate::store::{LabeledStore, ProductId, TrainingRow};
use crate::text;

#[derive(Debug, Error)]
pub enum TrainError {
    #[error("Degenerate labels: {distinct} distinct seed label(s) across {seed_rows} seed row(s); need both classes")]
    DegenerateLabels { distinct: usize, seed_rows: usize },
    #[error("Invalid training options: {0}")]
    InvalidOptions(String),
    #[error("Model fitting failed: {0}")]
    Fit(String),
    #[error(transparent)]
    Export(#[from] ExportError),
}

/// Steps of one training run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingStage {
    Seed,
    HoldoutEval,
    PseudoLabel,
    Augment,
    FinalFit,
    ArtifactReady,
}

impl TrainingStage {
    pub fn as_str(self) -> &'static str {
        match self {
            TrainingStage::Seed => "seed",
            TrainingStage::HoldoutEval => "holdout_eval",
            TrainingStage::PseudoLabel => "pseudo_label",
            TrainingStage::Augment => "augment",
            TrainingStage::FinalFit => "final_fit",
            TrainingStage::ArtifactReady => "artifact_ready",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainOptions {
    /// Minimum pseudo-label confidence, inclusive.
    pub conf_threshold: f64,
    pub test_fraction: f64,
    pub calibration: CalibrationOptions,
    pub split_seed: String,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            conf_threshold: 0.7,
            test_fraction: 0.2,
            calibration: CalibrationOptions::default(),
            split_seed: "catalabel".to_string(),
        }
    }
}

impl TrainOptions {
    pub fn validate(&self) -> Result<(), TrainError> {
        if !(0.0..=1.0).contains(&self.conf_threshold) {
            return Err(TrainError::InvalidOptions(format!(
                "conf_threshold {} must be within [0, 1]",
                self.conf_threshold
            )));
        }
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(TrainError::InvalidOptions(format!(
                "test_fraction {} must be within (0, 1)",
                self.test_fraction
            )));
        }
        if self.calibration.folds < 2 {
            return Err(TrainError::InvalidOptions(
                "cv_folds must be at least 2".to_string(),
            ));
        }
        let svm = &self.calibration.svm;
        if !(svm.c.is_finite() && svm.c > 0.0) || svm.max_iter == 0 || !(svm.tol > 0.0) {
            return Err(TrainError::InvalidOptions(format!(
                "invalid svm options (c={}, max_iter={}, tol={})",
                svm.c, svm.max_iter, svm.tol
            )));
        }
        Ok(())
    }

    pub fn svm(&self) -> &SvmOptions {
        &self.calibration.svm
    }
}

/// Holdout evaluation result; skipped when the seed set is too small to split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HoldoutOutcome {
    Evaluated(HoldoutMetrics),
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PseudoLabel {
    pub id: ProductId,
    pub label: BinaryLabel,
    pub confidence: f64,
    pub accepted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub stage: String,
    pub rows_total: usize,
    pub seed_sources: SeedSourceCounts,
    pub seed_distribution: LabelDistribution,
    pub holdout: HoldoutOutcome,
    pub pseudo_candidates: usize,
    pub pseudo_accepted: usize,
    pub final_corpus_size: usize,
    pub final_distribution: LabelDistribution,
}

/// Artifact of a finished run plus everything needed for diagnostics and export.
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub artifact: ModelArtifact,
    pub report: TrainingReport,
    pub pseudo_labels: Vec<PseudoLabel>,
    rows: Vec<TrainingRow>,
    sources: Vec<LabelSource>,
}

impl TrainingOutcome {
    /// Every training row with the final model's label and confidence.
    pub fn labeled_rows(&self) -> Vec<LabeledRow> {
        let texts: Vec<String> = self.rows.iter().map(|row| text::normalize(&row.name)).collect();
        let predictions = self.artifact.predict_with_confidence(&texts);
        self.rows
            .iter()
            .zip(&self.sources)
            .zip(predictions)
            .map(|((row, source), (final_label, confidence))| LabeledRow {
                id: row.id,
                name: row.name.clone(),
                manual_label: row.manual_label,
                final_label,
                confidence,
                source: *source,
            })
            .collect()
    }
}

/// Self-training driver for one label stage.
pub struct Trainer<'a> {
    stage: &'a LabelStage,
    options: TrainOptions,
    engine: KeywordRuleEngine,
}

struct SeedSet {
    texts: Vec<String>,
    labels: Vec<BinaryLabel>,
    ids: Vec<ProductId>,
    candidates: Vec<usize>,
    sources: Vec<LabelSource>,
    counts: SeedSourceCounts,
}

impl<'a> Trainer<'a> {
    pub fn new(stage: &'a LabelStage, options: TrainOptions) -> Result<Self, TrainError> {
        options.validate()?;
        Ok(Self {
            engine: KeywordRuleEngine::new(&stage.keywords),
            stage,
            options,
        })
    }

    /// Run every stage on `rows` and return the final artifact.
    pub fn train(&self, rows: Vec<TrainingRow>) -> Result<TrainingOutcome, TrainError> {
        let texts: Vec<String> = rows.iter().map(|row| text::normalize(&row.name)).collect();

        self.log_stage(TrainingStage::Seed);
        let seed = self.seed(&rows, &texts);
        let seed_distribution = LabelDistribution::from_labels(&seed.labels);
        tracing::info!(
            stage = TrainingStage::Seed.as_str(),
            "{} rows: {} manual, {} rule, {} unlabeled; labels {}/{} (negative/positive)",
            rows.len(),
            seed.counts.manual,
            seed.counts.rule,
            seed.candidates.len(),
            seed_distribution.negative,
            seed_distribution.positive
        );
        if seed_distribution.distinct() < 2 {
            return Err(TrainError::DegenerateLabels {
                distinct: seed_distribution.distinct(),
                seed_rows: seed.labels.len(),
            });
        }

        self.log_stage(TrainingStage::HoldoutEval);
        let holdout = self.holdout(&seed)?;

        self.log_stage(TrainingStage::PseudoLabel);
        let (extractor, classifier) = self.fit(&seed.texts, &seed.labels)?;
        let mut pseudo_labels: Vec<PseudoLabel> = seed
            .candidates
            .iter()
            .map(|&index| {
                let row = extractor.transform(&texts[index]);
                let (label, confidence) = classifier.predict_with_confidence(&row);
                PseudoLabel {
                    id: rows[index].id,
                    label,
                    confidence,
                    accepted: false,
                }
            })
            .collect();

        self.log_stage(TrainingStage::Augment);
        let accepted = select_confident(&mut pseudo_labels, self.options.conf_threshold);
        tracing::info!(
            stage = TrainingStage::Augment.as_str(),
            "Accepted {accepted} of {} pseudo-labels at confidence >= {}",
            pseudo_labels.len(),
            self.options.conf_threshold
        );
        let mut corpus_texts = seed.texts.clone();
        let mut corpus_labels = seed.labels.clone();
        let mut sources = seed.sources.clone();
        for (pseudo, &index) in pseudo_labels.iter().zip(&seed.candidates) {
            if pseudo.accepted {
                corpus_texts.push(texts[index].clone());
                corpus_labels.push(pseudo.label);
                sources[index] = LabelSource::Pseudo;
            }
        }

        self.log_stage(TrainingStage::FinalFit);
        let (extractor, classifier) = self.fit(&corpus_texts, &corpus_labels)?;
        let final_distribution = LabelDistribution::from_labels(&corpus_labels);
        let metadata = ArtifactMetadata::new(
            self.stage.name.clone(),
            final_distribution,
            self.options.conf_threshold,
            seed.counts,
        );
        let artifact = ModelArtifact::new(extractor, classifier, metadata)
            .map_err(|err| TrainError::Fit(err.to_string()))?;

        self.log_stage(TrainingStage::ArtifactReady);
        tracing::info!(
            stage = TrainingStage::ArtifactReady.as_str(),
            "Final corpus {} rows ({} features)",
            final_distribution.total(),
            artifact.extractor().dim()
        );
        let report = TrainingReport {
            stage: self.stage.name.clone(),
            rows_total: rows.len(),
            seed_sources: seed.counts,
            seed_distribution,
            holdout,
            pseudo_candidates: pseudo_labels.len(),
            pseudo_accepted: accepted,
            final_corpus_size: final_distribution.total(),
            final_distribution,
        };
        Ok(TrainingOutcome {
            artifact,
            report,
            pseudo_labels,
            rows,
            sources,
        })
    }

    fn log_stage(&self, stage: TrainingStage) {
        tracing::debug!(stage = stage.as_str(), "Training '{}'", self.stage.name);
    }

    /// Manual label first, then the keyword rules; rows with neither become candidates.
    fn seed(&self, rows: &[TrainingRow], texts: &[String]) -> SeedSet {
        let mut seed = SeedSet {
            texts: Vec::new(),
            labels: Vec::new(),
            ids: Vec::new(),
            candidates: Vec::new(),
            sources: Vec::with_capacity(rows.len()),
            counts: SeedSourceCounts::default(),
        };
        for (index, (row, text)) in rows.iter().zip(texts).enumerate() {
            let (label, source) = match row.manual_label {
                Some(label) => (Some(label), LabelSource::Manual),
                None => match self.stage.polarity.label_for(self.engine.classify(text)) {
                    Some(label) => (Some(label), LabelSource::Rule),
                    None => (None, LabelSource::Model),
                },
            };
            seed.sources.push(source);
            match label {
                Some(label) => {
                    match source {
                        LabelSource::Manual => seed.counts.manual += 1,
                        _ => seed.counts.rule += 1,
                    }
                    seed.texts.push(text.clone());
                    seed.labels.push(label);
                    seed.ids.push(row.id);
                }
                None => seed.candidates.push(index),
            }
        }
        seed
    }

    fn holdout(&self, seed: &SeedSet) -> Result<HoldoutOutcome, TrainError> {
        let keyed: Vec<(ProductId, BinaryLabel)> = seed
            .ids
            .iter()
            .copied()
            .zip(seed.labels.iter().copied())
            .collect();
        let Some(split) =
            stratified_holdout(&keyed, &self.options.split_seed, self.options.test_fraction)
        else {
            let reason = "a seed class has fewer than 2 rows".to_string();
            tracing::info!(stage = TrainingStage::HoldoutEval.as_str(), "Holdout skipped: {reason}");
            return Ok(HoldoutOutcome::Skipped { reason });
        };
        let pick = |indices: &[usize]| -> (Vec<String>, Vec<BinaryLabel>) {
            indices
                .iter()
                .map(|&i| (seed.texts[i].clone(), seed.labels[i]))
                .unzip()
        };
        let (train_texts, train_labels) = pick(&split.train);
        let (test_texts, test_labels) = pick(&split.test);
        let (extractor, classifier) = self.fit(&train_texts, &train_labels)?;
        let predicted: Vec<BinaryLabel> = test_texts
            .iter()
            .map(|text| classifier.predict(&extractor.transform(text)))
            .collect();
        let metrics = HoldoutMetrics::from_confusion(
            train_texts.len(),
            ConfusionMatrix::from_pairs(&test_labels, &predicted),
        );
        for stats in &metrics.per_class {
            tracing::info!(
                stage = TrainingStage::HoldoutEval.as_str(),
                "label {}: precision {:.3} recall {:.3} support {}",
                stats.label.as_i64(),
                stats.precision,
                stats.recall,
                stats.support
            );
        }
        tracing::info!(
            stage = TrainingStage::HoldoutEval.as_str(),
            "accuracy {:.3} on {} held-out rows; confusion {:?}",
            metrics.accuracy,
            metrics.test_rows,
            metrics.confusion.counts
        );
        Ok(HoldoutOutcome::Evaluated(metrics))
    }

    /// Fit a fresh extractor and calibrated classifier.
    fn fit(
        &self,
        texts: &[String],
        labels: &[BinaryLabel],
    ) -> Result<(FeatureExtractor, CalibratedClassifier), TrainError> {
        let extractor = FeatureExtractor::fit(&self.stage.features, &self.stage.keywords, texts)
            .map_err(TrainError::Fit)?;
        let rows = extractor.transform_batch(texts);
        let classifier =
            CalibratedClassifier::fit(&rows, labels, extractor.dim(), &self.options.calibration)
                .map_err(TrainError::Fit)?;
        Ok((extractor, classifier))
    }
}

/// Mark pseudo-labels whose confidence is at least `threshold` and return how many were.
pub fn select_confident(pseudo_labels: &mut [PseudoLabel], threshold: f64) -> usize {
    let mut accepted = 0;
    for pseudo in pseudo_labels.iter_mut() {
        pseudo.accepted = pseudo.confidence >= threshold;
        if pseudo.accepted {
            accepted += 1;
        }
    }
    accepted
}

/// Read the stage's rows from `store` and train it.
pub fn train_stage<S: LabeledStore + ?Sized>(
    store: &mut S,
    profile: &DomainProfile,
    stage: &LabelStage,
    options: TrainOptions,
) -> Result<TrainingOutcome, crate::Error> {
    let target = profile.target(stage)?;
    let trainer = Trainer::new(stage, options)?;
    let rows = store.fetch_training_rows(&target)?;
    tracing::info!(
        "Training {}.{} on {} rows from {}",
        profile.name,
        stage.name,
        rows.len(),
        profile.table
    );
    Ok(trainer.train(rows)?)
}
