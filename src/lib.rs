//! Time-series-safe stacking and calibration engine.
//!
//! Heterogeneous binary classifiers are trained on expanding, embargoed folds;
//! their out-of-fold probabilities are Platt-calibrated, combined by a
//! logistic meta-learner and evaluated under a confidence gate.

pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod ml;
pub mod types;

pub use config::EngineConfig;
pub use engine::{StackingPipeline, StackingReport};
pub use error::{EngineError, EngineResult, Insufficiency};
pub use types::Dataset;
