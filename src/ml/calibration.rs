//! Per-learner Platt calibration of pooled OOF probabilities.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::logistic::{clamp_probability, logit, sigmoid, LogisticOptions, LogisticRegression};
use super::metrics::ProbabilityMetrics;
use crate::config::CalibrationSettings;

/// Monotone map from a learner's raw probability to a calibrated one
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum CalibrationMap {
    /// `sigmoid(slope * p + intercept)` with `slope >= 0`
    Platt { slope: f64, intercept: f64 },
    /// Clamped pass-through, used when labels are single-class
    Identity,
}

/// How a map came about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationStatus {
    Fitted,
    /// Fitted slope was negative (or the input constant); replaced by the
    /// base-rate map
    Projected,
    /// Single-class labels
    Identity,
}

impl CalibrationMap {
    /// Fit on one learner's eligible (raw probability, label) pairs
    pub fn fit(raw: &[f64], labels: &[bool], settings: &CalibrationSettings) -> (Self, CalibrationStatus) {
        let n = raw.len().min(labels.len());
        let positives = labels[..n].iter().filter(|&&y| y).count();
        if n == 0 || positives == 0 || positives == n {
            return (CalibrationMap::Identity, CalibrationStatus::Identity);
        }
        let base_rate = CalibrationMap::Platt {
            slope: 0.0,
            intercept: logit(positives as f64 / n as f64),
        };

        let spread = raw[..n].iter().fold(f64::NEG_INFINITY, |m, &v| m.max(v))
            - raw[..n].iter().fold(f64::INFINITY, |m, &v| m.min(v));
        if spread < 1e-12 {
            return (base_rate, CalibrationStatus::Projected);
        }

        let x = match Array2::from_shape_vec((n, 1), raw[..n].to_vec()) {
            Ok(x) => x,
            Err(_) => return (base_rate, CalibrationStatus::Projected),
        };
        let opts = LogisticOptions {
            l2: settings.l2,
            max_iter: settings.max_iter,
            tol: 1e-10,
            standardize: false,
        };
        match LogisticRegression::fit(&x, &labels[..n], &opts) {
            Ok(model) if model.coefficients[0] >= 0.0 => (
                CalibrationMap::Platt {
                    slope: model.coefficients[0],
                    intercept: model.intercept,
                },
                CalibrationStatus::Fitted,
            ),
            Ok(model) => {
                debug!("Negative Platt slope {:.4} projected to 0", model.coefficients[0]);
                (base_rate, CalibrationStatus::Projected)
            }
            Err(e) => {
                warn!("Platt fit failed ({}), using base-rate map", e);
                (base_rate, CalibrationStatus::Projected)
            }
        }
    }

    pub fn apply(&self, p: f64) -> f64 {
        match self {
            CalibrationMap::Platt { slope, intercept } => clamp_probability(sigmoid(slope * p + intercept)),
            CalibrationMap::Identity => clamp_probability(p),
        }
    }

    pub fn apply_all(&self, raw: &[f64]) -> Vec<f64> {
        raw.iter().map(|&p| self.apply(p)).collect()
    }
}

/// Calibration result for one learner over the eligible rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnerCalibration {
    pub learner_id: String,
    pub map: CalibrationMap,
    pub status: CalibrationStatus,
    pub raw_metrics: ProbabilityMetrics,
    pub calibrated_metrics: ProbabilityMetrics,
    #[serde(skip)]
    pub calibrated: Vec<f64>,
}

impl LearnerCalibration {
    pub fn fit(learner_id: &str, raw: &[f64], labels: &[bool], settings: &CalibrationSettings) -> Self {
        let (map, status) = CalibrationMap::fit(raw, labels, settings);
        let calibrated = map.apply_all(raw);
        let raw_metrics = ProbabilityMetrics::compute(raw, labels);
        let calibrated_metrics = ProbabilityMetrics::compute(&calibrated, labels);
        debug!(
            "Calibrated {}: {:?}, ECE {:.4} -> {:.4}",
            learner_id, map, raw_metrics.ece, calibrated_metrics.ece
        );
        Self {
            learner_id: learner_id.to_string(),
            map,
            status,
            raw_metrics,
            calibrated_metrics,
            calibrated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    /// Overconfident scores: true probability is a shrunk version of the raw one
    fn overconfident(n: usize, seed: u64) -> (Vec<f64>, Vec<bool>) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let raw: Vec<f64> = (0..n).map(|_| rng.gen_range(0.01..0.99)).collect();
        let labels = raw.iter().map(|&p| rng.gen::<f64>() < 0.25 + 0.5 * p).collect();
        (raw, labels)
    }

    #[test]
    fn test_platt_improves_overconfident_scores() {
        let (raw, labels) = overconfident(4_000, 1);
        let cal = LearnerCalibration::fit("m", &raw, &labels, &CalibrationSettings::default());
        assert_eq!(cal.status, CalibrationStatus::Fitted);
        assert!(cal.calibrated_metrics.brier < cal.raw_metrics.brier);
        assert!(cal.calibrated_metrics.ece < cal.raw_metrics.ece);
        // Monotone map leaves ranking, hence AUC, unchanged
        let raw_auc = cal.raw_metrics.auc.unwrap();
        let cal_auc = cal.calibrated_metrics.auc.unwrap();
        assert!((raw_auc - cal_auc).abs() < 1e-9);
    }

    #[test]
    fn test_map_is_non_decreasing_and_inside_unit_interval() {
        let (raw, labels) = overconfident(1_000, 2);
        let (map, _) = CalibrationMap::fit(&raw, &labels, &CalibrationSettings::default());
        let grid: Vec<f64> = (0..=100).map(|i| i as f64 / 100.0).collect();
        let out = map.apply_all(&grid);
        assert!(out.windows(2).all(|w| w[0] <= w[1]));
        assert!(out.iter().all(|&p| p > 0.0 && p < 1.0));
    }

    #[test]
    fn test_negative_slope_is_projected() {
        let raw: Vec<f64> = (0..200).map(|i| i as f64 / 200.0).collect();
        let labels: Vec<bool> = raw.iter().map(|&p| p < 0.3).collect();
        let (map, status) = CalibrationMap::fit(&raw, &labels, &CalibrationSettings::default());
        assert_eq!(status, CalibrationStatus::Projected);
        match map {
            CalibrationMap::Platt { slope, intercept } => {
                assert_eq!(slope, 0.0);
                assert!((sigmoid(intercept) - 0.3).abs() < 1e-9);
            }
            CalibrationMap::Identity => panic!("expected base-rate map"),
        }
    }

    #[test]
    fn test_single_class_falls_back_to_identity() {
        let (map, status) = CalibrationMap::fit(&[0.0, 0.4, 1.0], &[true, true, true], &CalibrationSettings::default());
        assert_eq!(map, CalibrationMap::Identity);
        assert_eq!(status, CalibrationStatus::Identity);
        assert_eq!(map.apply(0.4), 0.4);
        assert!(map.apply(0.0) > 0.0);
        assert!(map.apply(1.0) < 1.0);
    }

    #[test]
    fn test_constant_input_maps_to_base_rate() {
        let raw = vec![0.5; 100];
        let labels: Vec<bool> = (0..100).map(|i| i % 4 == 0).collect();
        let cal = LearnerCalibration::fit("flat", &raw, &labels, &CalibrationSettings::default());
        assert_eq!(cal.status, CalibrationStatus::Projected);
        assert!(cal.calibrated.iter().all(|&p| (p - 0.25).abs() < 1e-9));
        assert_eq!(cal.calibrated_metrics.auc, Some(0.5));
    }
}
