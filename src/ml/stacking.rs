use ndarray::{concatenate, s, Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::calibration::CalibrationMap;
use super::logistic::{clamp_probability, LogisticOptions, LogisticRegression};
use super::metrics::{accuracy, roc_auc};
use crate::config::StackingSettings;
use crate::error::{EngineError, EngineResult};

/// Second-level combiner over calibrated learner probabilities (and regime
/// columns, when present)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetaModel {
    Logistic { model: LogisticRegression },
    /// Mean of the calibrated columns; used when labels are single-class
    Average { n_learners: usize },
}

impl MetaModel {
    pub fn fit(design: &Array2<f64>, labels: &[bool], n_learners: usize, settings: &StackingSettings) -> Self {
        let opts = LogisticOptions {
            l2: settings.l2,
            max_iter: settings.max_iter,
            ..LogisticOptions::default()
        };
        match LogisticRegression::fit(design, labels, &opts) {
            Ok(model) => MetaModel::Logistic { model },
            Err(e) => {
                warn!("Meta-learner fit failed ({}); falling back to averaging", e);
                MetaModel::Average { n_learners }
            }
        }
    }

    pub fn predict_proba(&self, design: &Array2<f64>) -> Vec<f64> {
        match self {
            MetaModel::Logistic { model } => model.predict_proba(design),
            MetaModel::Average { n_learners } => design
                .axis_iter(Axis(0))
                .map(|row| {
                    let k = (*n_learners).min(row.len()).max(1);
                    clamp_probability(row.iter().take(k).sum::<f64>() / k as f64)
                })
                .collect(),
        }
    }

    /// Combiner weight per design column, in design order (empty for averaging)
    pub fn weights(&self) -> Vec<f64> {
        match self {
            MetaModel::Logistic { model } => model.coefficients.clone(),
            MetaModel::Average { .. } => Vec::new(),
        }
    }
}

/// Published artifact: calibrators plus combiner, applied to new raw
/// per-learner probabilities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackedModel {
    pub learner_ids: Vec<String>,
    pub calibrators: Vec<CalibrationMap>,
    pub regime_columns: Vec<String>,
    pub meta: MetaModel,
}

impl StackedModel {
    /// `raw` holds one column per learner in `learner_ids` order; `regime`
    /// must be supplied exactly when the model was fitted with regime columns
    pub fn predict_proba(&self, raw: &Array2<f64>, regime: Option<&Array2<f64>>) -> EngineResult<Vec<f64>> {
        if raw.ncols() != self.learner_ids.len() {
            return Err(EngineError::InvalidData(format!(
                "expected {} learner columns, got {}",
                self.learner_ids.len(),
                raw.ncols()
            )));
        }
        let calibrated = calibrate_columns(&self.calibrators, raw);
        let design = match (self.regime_columns.is_empty(), regime) {
            (true, _) => calibrated,
            (false, Some(regime)) if regime.ncols() == self.regime_columns.len() && regime.nrows() == raw.nrows() => {
                design_matrix(&calibrated, Some(regime))?
            }
            (false, _) => {
                return Err(EngineError::InvalidData(format!(
                    "model expects regime columns {:?}",
                    self.regime_columns
                )))
            }
        };
        Ok(self.meta.predict_proba(&design))
    }
}

/// Apply each learner's map to its column
pub fn calibrate_columns(calibrators: &[CalibrationMap], raw: &Array2<f64>) -> Array2<f64> {
    let mut out = raw.clone();
    for (map, mut col) in calibrators.iter().zip(out.axis_iter_mut(Axis(1))) {
        col.mapv_inplace(|p| map.apply(p));
    }
    out
}

/// Calibrated learner columns followed by regime columns
pub fn design_matrix(calibrated: &Array2<f64>, regime: Option<&Array2<f64>>) -> EngineResult<Array2<f64>> {
    match regime {
        None => Ok(calibrated.clone()),
        Some(regime) => concatenate(Axis(1), &[calibrated.view(), regime.view()])
            .map_err(|e| EngineError::InvalidData(format!("design matrix: {}", e))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HoldoutMetrics {
    pub train_rows: usize,
    pub holdout_rows: usize,
    pub accuracy: f64,
    pub auc: Option<f64>,
}

/// Fit a combiner on the chronological head of the eligible rows and score it
/// on the tail. `None` when either side is empty or `fraction` is 0.
pub fn evaluate_holdout(
    design: &Array2<f64>,
    labels: &[bool],
    n_learners: usize,
    fraction: f64,
    settings: &StackingSettings,
) -> Option<HoldoutMetrics> {
    let n = design.nrows();
    let holdout_rows = (n as f64 * fraction).round() as usize;
    if fraction <= 0.0 || holdout_rows == 0 || holdout_rows >= n {
        return None;
    }
    let split = n - holdout_rows;
    let head = design.slice(s![..split, ..]).to_owned();
    let tail = design.slice(s![split.., ..]).to_owned();
    let meta = MetaModel::fit(&head, &labels[..split], n_learners, settings);
    let probs = meta.predict_proba(&tail);
    let metrics = HoldoutMetrics {
        train_rows: split,
        holdout_rows,
        accuracy: accuracy(&probs, &labels[split..]),
        auc: roc_auc(&probs, &labels[split..]),
    };
    info!(
        "Meta holdout: trained on {} rows, accuracy {:.4} on last {} rows",
        split, metrics.accuracy, holdout_rows
    );
    Some(metrics)
}
