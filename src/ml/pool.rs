use rayon::prelude::*;
use tracing::{debug, info, warn};

use super::folds::Fold;
use super::learners::{BinaryClassifier, FittedClassifier, LearnerError, LearnerSpec};
use super::logistic::clamp_probability;
use crate::config::PoolSettings;
use crate::data::FoldData;
use crate::error::EngineResult;

/// One learner's output on one fold
pub struct BaseModelResult {
    pub learner_id: String,
    pub fold_id: usize,
    /// Probabilities for the fold's validation rows, in row order
    pub oof_probabilities: Vec<f64>,
    pub model: Box<dyn FittedClassifier>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LearnerFailure {
    pub learner_id: String,
    pub fold_id: usize,
    pub error: LearnerError,
}

/// Everything the pool produced for one fold
pub struct FoldOutcome {
    pub fold: Fold,
    pub results: Vec<BaseModelResult>,
    pub failures: Vec<LearnerFailure>,
}

/// The configured learner set plus the per-fold size minimums
pub struct BaseLearnerPool {
    learners: Vec<Box<dyn BinaryClassifier>>,
    min_train_rows: usize,
    min_validation_rows: usize,
}

impl BaseLearnerPool {
    pub fn new(learners: Vec<Box<dyn BinaryClassifier>>, min_train_rows: usize, min_validation_rows: usize) -> Self {
        Self {
            learners,
            min_train_rows,
            min_validation_rows,
        }
    }

    /// Build every learner up front; an unavailable family fails here, before
    /// any data is read
    pub fn from_specs(specs: &[LearnerSpec], settings: &PoolSettings) -> EngineResult<Self> {
        let learners = specs
            .iter()
            .map(|spec| spec.build())
            .collect::<EngineResult<Vec<_>>>()?;
        info!(
            "Learner pool: {}",
            specs
                .iter()
                .map(|s| format!("{} ({})", s.id(), s.family()))
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(Self::new(learners, settings.min_train_rows, settings.min_validation_rows))
    }

    pub fn learner_ids(&self) -> Vec<String> {
        self.learners.iter().map(|l| l.id().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.learners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.learners.is_empty()
    }

    pub fn min_train_rows(&self) -> usize {
        self.min_train_rows
    }

    pub fn min_validation_rows(&self) -> usize {
        self.min_validation_rows
    }

    /// Whether a fold is large enough to train on at all
    pub fn admits(&self, fold: &Fold) -> bool {
        fold_admitted(fold, self.min_train_rows, self.min_validation_rows)
    }

    /// Train every learner on the fold in parallel. Per-learner failures are
    /// collected, never propagated.
    pub fn train_fold(&self, fold: &Fold, data: &FoldData) -> FoldOutcome {
        let expected = data.x_validation.nrows();
        let outputs: Vec<(String, Result<(Vec<f64>, Box<dyn FittedClassifier>), LearnerError>)> = self
            .learners
            .par_iter()
            .map(|learner| {
                let outcome = learner.fit(&data.x_train, &data.y_train).and_then(|model| {
                    let probs = model.predict_proba(&data.x_validation);
                    check_output(&probs, expected)?;
                    Ok((probs.into_iter().map(clamp_probability).collect(), model))
                });
                (learner.id().to_string(), outcome)
            })
            .collect();

        let mut results = Vec::new();
        let mut failures = Vec::new();
        for (learner_id, outcome) in outputs {
            match outcome {
                Ok((oof_probabilities, model)) => {
                    debug!("Fold {}: {} produced {} OOF predictions", fold.fold_id, learner_id, expected);
                    results.push(BaseModelResult {
                        learner_id,
                        fold_id: fold.fold_id,
                        oof_probabilities,
                        model,
                    });
                }
                Err(error) => {
                    warn!("Fold {}: learner {} skipped: {}", fold.fold_id, learner_id, error);
                    failures.push(LearnerFailure {
                        learner_id,
                        fold_id: fold.fold_id,
                        error,
                    });
                }
            }
        }

        FoldOutcome {
            fold: *fold,
            results,
            failures,
        }
    }
}

/// Fold size rule shared by the pool and the printed fold plan
pub fn fold_admitted(fold: &Fold, min_train_rows: usize, min_validation_rows: usize) -> bool {
    fold.train_len() >= min_train_rows && fold.validation_len() >= min_validation_rows
}

fn check_output(probs: &[f64], expected: usize) -> Result<(), LearnerError> {
    if probs.len() != expected {
        return Err(LearnerError::ShapeMismatch {
            expected,
            got: probs.len(),
        });
    }
    if let Some(bad) = probs.iter().find(|p| !p.is_finite() || **p < 0.0 || **p > 1.0) {
        return Err(LearnerError::InvalidOutput(format!("probability {} outside [0, 1]", bad)));
    }
    Ok(())
}
