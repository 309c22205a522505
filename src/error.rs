use serde::Serialize;
use thiserror::Error;

/// Why a run could not produce a statistically meaningful model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
pub enum Insufficiency {
    #[error("no usable folds for {rows} rows with {n_folds} folds")]
    NoUsableFolds { rows: usize, n_folds: usize },

    #[error("only {usable} usable folds, {required} required")]
    TooFewFolds { usable: usize, required: usize },

    #[error("insufficient OOF samples: {eligible} eligible rows, {required} required")]
    InsufficientOofSamples { eligible: usize, required: usize },

    #[error("no learner produced out-of-fold predictions")]
    NoActiveLearners,
}

/// Fatal engine errors. Fold- and learner-local failures never surface here;
/// they are recorded as run notes instead.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("insufficient data: {0}")]
    DataInsufficiency(#[from] Insufficiency),

    #[error("learner backend '{backend}' for '{learner_id}' is not compiled into this build")]
    MissingDependency { learner_id: String, backend: String },

    #[error("invalid configuration: {}", .0.join(", "))]
    InvalidConfig(Vec<String>),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("OOF table conflict: {0}")]
    OofConflict(String),
}

impl EngineError {
    pub fn is_data_insufficiency(&self) -> bool {
        matches!(self, EngineError::DataInsufficiency(_))
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficiency_message_names_counts() {
        let err = EngineError::from(Insufficiency::InsufficientOofSamples {
            eligible: 120,
            required: 500,
        });
        assert!(err.is_data_insufficiency());
        assert_eq!(
            err.to_string(),
            "insufficient data: insufficient OOF samples: 120 eligible rows, 500 required"
        );
    }

    #[test]
    fn test_invalid_config_joins_messages() {
        let err = EngineError::InvalidConfig(vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), "invalid configuration: a, b");
        assert!(!err.is_data_insufficiency());
    }
}
