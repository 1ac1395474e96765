//! Batch inference: label every unlabeled row of a catalog table, one stage at a time.

use serde::Serialize;
use std::path::PathBuf;

use crate::artifact::ModelArtifact;
use crate::config::ConfigError;
use crate::profile::{DomainProfile, LabelStage};
use crate::store::{LabeledStore, ProductId, UnlabeledPredicate};

pub const DEFAULT_BATCH_SIZE: usize = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InferenceOptions {
    pub batch_size: usize,
    /// Predict and log without writing labels.
    pub dry_run: bool,
}

impl Default for InferenceOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            dry_run: false,
        }
    }
}

/// Counts for one stage of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub stage: String,
    pub column: String,
    pub batches: usize,
    pub rows_predicted: usize,
    pub rows_updated: usize,
    pub dry_run: bool,
}

/// Applies one model artifact per stage of a profile, in stage order.
#[derive(Debug)]
pub struct BatchInferenceRunner {
    profile: DomainProfile,
    models: Vec<ModelArtifact>,
    options: InferenceOptions,
}

impl BatchInferenceRunner {
    pub fn new(
        profile: DomainProfile,
        models: Vec<ModelArtifact>,
        options: InferenceOptions,
    ) -> Result<Self, crate::Error> {
        if models.len() != profile.stages.len() {
            return Err(ConfigError::ModelPathCount {
                profile: profile.name.clone(),
                expected: profile.stages.len(),
                given: models.len(),
            }
            .into());
        }
        if options.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be > 0".to_string()).into());
        }
        for (stage, model) in profile.stages.iter().zip(&models) {
            if !model.metadata().stage.eq_ignore_ascii_case(&stage.name) {
                tracing::warn!(
                    "Artifact trained for stage '{}' is applied to stage '{}'",
                    model.metadata().stage,
                    stage.name
                );
            }
        }
        Ok(Self {
            profile,
            models,
            options,
        })
    }

    /// Load one artifact per stage from `model_paths`, in stage order.
    pub fn load(
        profile: DomainProfile,
        model_paths: &[PathBuf],
        options: InferenceOptions,
    ) -> Result<Self, crate::Error> {
        if model_paths.len() != profile.stages.len() {
            return Err(ConfigError::ModelPathCount {
                profile: profile.name.clone(),
                expected: profile.stages.len(),
                given: model_paths.len(),
            }
            .into());
        }
        let mut models = Vec::with_capacity(model_paths.len());
        for path in model_paths {
            let model = ModelArtifact::load(path)?;
            tracing::info!(
                "Loaded {} model from {} (corpus {}, trained {})",
                model.metadata().stage,
                path.display(),
                model.metadata().corpus_size,
                model.metadata().trained_at
            );
            models.push(model);
        }
        Self::new(profile, models, options)
    }

    pub fn profile(&self) -> &DomainProfile {
        &self.profile
    }

    /// Run every stage; a gated stage sees the labels its prerequisite stage just wrote.
    pub fn run<S: LabeledStore + ?Sized>(&self, store: &mut S) -> Result<Vec<RunSummary>, crate::Error> {
        let mut summaries = Vec::with_capacity(self.models.len());
        for (stage, model) in self.profile.stages.iter().zip(&self.models) {
            summaries.push(self.run_stage(store, stage, model)?);
        }
        Ok(summaries)
    }

    fn run_stage<S: LabeledStore + ?Sized>(
        &self,
        store: &mut S,
        stage: &LabelStage,
        model: &ModelArtifact,
    ) -> Result<RunSummary, crate::Error> {
        let target = self.profile.target(stage)?;
        let mut summary = RunSummary {
            stage: stage.name.clone(),
            column: stage.label_column.clone(),
            batches: 0,
            rows_predicted: 0,
            rows_updated: 0,
            dry_run: self.options.dry_run,
        };
        let mut after_id: Option<ProductId> = None;
        loop {
            let predicate = UnlabeledPredicate {
                target: &target,
                after_id,
            };
            let rows = store.fetch_unlabeled(predicate, self.options.batch_size)?;
            let Some(last) = rows.last() else {
                break;
            };
            after_id = Some(last.id);
            summary.batches += 1;

            let names: Vec<&str> = rows.iter().map(|row| row.name.as_str()).collect();
            let labels = model.predict(&names);
            let pairs: Vec<_> = labels
                .into_iter()
                .zip(rows.iter().map(|row| row.id))
                .collect();
            let positives = pairs
                .iter()
                .filter(|(label, _)| label.as_i64() == 1)
                .count();
            let updated = if self.options.dry_run {
                0
            } else {
                store.update_labels(&target, &pairs)?
            };
            summary.rows_predicted += rows.len();
            summary.rows_updated += updated;
            tracing::info!(
                "[{}] batch {}: {} rows, {} positive, {} updated{}",
                summary.column,
                summary.batches,
                rows.len(),
                positives,
                updated,
                if self.options.dry_run { " (dry run)" } else { "" }
            );
            if rows.len() < self.options.batch_size {
                break;
            }
        }
        tracing::info!(
            "[{}] done: {} batches, {} predicted, {} updated",
            summary.column,
            summary.batches,
            summary.rows_predicted,
            summary.rows_updated
        );
        Ok(summary)
    }
}
