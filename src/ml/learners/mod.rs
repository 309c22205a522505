pub mod bagged;
pub mod boosted;
pub mod constant;
pub mod elastic_net;
pub mod tree;

pub use bagged::{BaggedTrees, BaggingParams};
pub use boosted::{BoostingParams, GradientBoosting};
pub use constant::ConstantLearner;
pub use elastic_net::{ElasticNet, ElasticNetParams};

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{EngineError, EngineResult};

/// Per-learner failure. These are absorbed by the pool and recorded; they never
/// abort a run on their own.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LearnerError {
    #[error("training labels are single-class ({rows} rows)")]
    SingleClass { rows: usize },

    #[error("empty training set")]
    EmptyTrainingSet,

    #[error("shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: usize, got: usize },

    #[error("invalid output: {0}")]
    InvalidOutput(String),
}

impl LearnerError {
    pub fn is_degenerate_labels(&self) -> bool {
        matches!(self, LearnerError::SingleClass { .. })
    }
}

/// A trainable binary classifier. `fit` returns an owned handle so that one
/// configured learner can be trained independently on every fold.
pub trait BinaryClassifier: Send + Sync {
    fn id(&self) -> &str;

    fn fit(&self, x: &Array2<f64>, y: &[bool]) -> Result<Box<dyn FittedClassifier>, LearnerError>;
}

/// A fitted model handle
pub trait FittedClassifier: Send + Sync {
    /// P(label = 1) for every row of `x`
    fn predict_proba(&self, x: &Array2<f64>) -> Vec<f64>;
}

/// Configured learner. `Backend` names an out-of-process family (e.g. a
/// vendor GBM library) that this build does not link; asking for one fails
/// before any data is touched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LearnerSpec {
    GradientBoosting {
        id: String,
        #[serde(default)]
        params: BoostingParams,
    },
    BaggedTrees {
        id: String,
        #[serde(default)]
        params: BaggingParams,
    },
    ElasticNet {
        id: String,
        #[serde(default)]
        params: ElasticNetParams,
    },
    Constant {
        id: String,
        probability: f64,
    },
    Backend {
        id: String,
        backend: String,
    },
}

impl LearnerSpec {
    pub fn id(&self) -> &str {
        match self {
            LearnerSpec::GradientBoosting { id, .. }
            | LearnerSpec::BaggedTrees { id, .. }
            | LearnerSpec::ElasticNet { id, .. }
            | LearnerSpec::Constant { id, .. }
            | LearnerSpec::Backend { id, .. } => id,
        }
    }

    pub fn family(&self) -> &'static str {
        match self {
            LearnerSpec::GradientBoosting { .. } => "gradient_boosting",
            LearnerSpec::BaggedTrees { .. } => "bagged_trees",
            LearnerSpec::ElasticNet { .. } => "elastic_net",
            LearnerSpec::Constant { .. } => "constant",
            LearnerSpec::Backend { .. } => "backend",
        }
    }

    /// Parameter sanity checks, collected like config validation errors
    pub fn validate(&self) -> Vec<String> {
        let id = self.id();
        match self {
            LearnerSpec::GradientBoosting { params, .. } => params.validate(id),
            LearnerSpec::BaggedTrees { params, .. } => params.validate(id),
            LearnerSpec::ElasticNet { params, .. } => params.validate(id),
            LearnerSpec::Constant { probability, .. } => {
                if *probability > 0.0 && *probability < 1.0 {
                    Vec::new()
                } else {
                    vec![format!("{}: constant probability must be in (0, 1)", id)]
                }
            }
            LearnerSpec::Backend { .. } => Vec::new(),
        }
    }

    pub fn build(&self) -> EngineResult<Box<dyn BinaryClassifier>> {
        let learner: Box<dyn BinaryClassifier> = match self {
            LearnerSpec::GradientBoosting { id, params } => Box::new(GradientBoosting::new(id, params.clone())),
            LearnerSpec::BaggedTrees { id, params } => Box::new(BaggedTrees::new(id, params.clone())),
            LearnerSpec::ElasticNet { id, params } => Box::new(ElasticNet::new(id, params.clone())),
            LearnerSpec::Constant { id, probability } => Box::new(ConstantLearner::new(id, *probability)),
            LearnerSpec::Backend { id, backend } => {
                return Err(EngineError::MissingDependency {
                    learner_id: id.clone(),
                    backend: backend.clone(),
                })
            }
        };
        Ok(learner)
    }
}

/// Count positives, rejecting empty or single-class label sets
pub(crate) fn ensure_two_classes(y: &[bool]) -> Result<usize, LearnerError> {
    if y.is_empty() {
        return Err(LearnerError::EmptyTrainingSet);
    }
    let positives = y.iter().filter(|&&l| l).count();
    if positives == 0 || positives == y.len() {
        return Err(LearnerError::SingleClass { rows: y.len() });
    }
    Ok(positives)
}

pub(crate) fn check_rows(x: &Array2<f64>, y: &[bool]) -> Result<(), LearnerError> {
    if x.nrows() != y.len() {
        return Err(LearnerError::ShapeMismatch {
            expected: x.nrows(),
            got: y.len(),
        });
    }
    Ok(())
}
