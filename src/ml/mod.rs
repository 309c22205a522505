pub mod calibration;
pub mod folds;
pub mod gating;
pub mod learners;
pub mod logistic;
pub mod metrics;
pub mod oof;
pub mod pool;
pub mod stacking;

pub use calibration::{CalibrationMap, CalibrationStatus, LearnerCalibration};
pub use folds::{generate_folds, Fold};
pub use gating::{ConfidenceGate, Direction, GateEvaluation, ThresholdResult};
pub use learners::{BinaryClassifier, FittedClassifier, LearnerError, LearnerSpec};
pub use logistic::{LogisticOptions, LogisticRegression};
pub use metrics::ProbabilityMetrics;
pub use oof::{EligibleSet, OofTable};
pub use pool::{BaseLearnerPool, BaseModelResult, FoldOutcome, LearnerFailure};
pub use stacking::{HoldoutMetrics, MetaModel, StackedModel};
