use serde::{Deserialize, Serialize};
use tracing::debug;

use super::metrics::{accuracy, roc_auc};
use crate::config::GateSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
}

/// Outcome of one threshold over the evaluated rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdResult {
    pub threshold: f64,
    pub signal_count: usize,
    pub coverage: f64,
    /// Accuracy among called rows; absent when nothing was called
    pub accuracy: Option<f64>,
    #[serde(skip)]
    pub called_mask: Vec<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateEvaluation {
    pub thresholds: Vec<ThresholdResult>,
    pub recommended_threshold: Option<f64>,
    pub overall_accuracy: f64,
    pub overall_auc: Option<f64>,
}

/// Emits a direction only when the probability is far enough from 0.5
#[derive(Debug, Clone)]
pub struct ConfidenceGate {
    thresholds: Vec<f64>,
    min_coverage: f64,
}

impl ConfidenceGate {
    pub fn new(thresholds: Vec<f64>, min_coverage: f64) -> Self {
        Self {
            thresholds,
            min_coverage,
        }
    }

    pub fn from_settings(settings: &GateSettings) -> Self {
        Self::new(settings.thresholds.clone(), settings.min_coverage)
    }

    /// Called direction at `threshold`, or `None` when the row is not called
    pub fn signal(p: f64, threshold: f64) -> Option<Direction> {
        if p >= threshold || p <= 1.0 - threshold {
            Some(if p >= 0.5 { Direction::Up } else { Direction::Down })
        } else {
            None
        }
    }

    pub fn evaluate_threshold(&self, probs: &[f64], labels: &[bool], threshold: f64) -> ThresholdResult {
        let n = probs.len().min(labels.len());
        let mut called_mask = vec![false; n];
        let mut called = 0;
        let mut correct = 0;
        for i in 0..n {
            if let Some(direction) = Self::signal(probs[i], threshold) {
                called_mask[i] = true;
                called += 1;
                if (direction == Direction::Up) == labels[i] {
                    correct += 1;
                }
            }
        }
        ThresholdResult {
            threshold,
            signal_count: called,
            coverage: if n == 0 { 0.0 } else { called as f64 / n as f64 },
            accuracy: (called > 0).then(|| correct as f64 / called as f64),
            called_mask,
        }
    }

    pub fn evaluate(&self, probs: &[f64], labels: &[bool]) -> GateEvaluation {
        let thresholds: Vec<ThresholdResult> = self
            .thresholds
            .iter()
            .map(|&t| self.evaluate_threshold(probs, labels, t))
            .collect();
        for t in &thresholds {
            debug!(
                "Gate {:.2}: {} signals, coverage {:.3}, accuracy {:?}",
                t.threshold, t.signal_count, t.coverage, t.accuracy
            );
        }
        let recommended_threshold = self.recommend(&thresholds);
        GateEvaluation {
            thresholds,
            recommended_threshold,
            overall_accuracy: accuracy(probs, labels),
            overall_auc: roc_auc(probs, labels),
        }
    }

    /// Highest called accuracy among thresholds meeting the coverage floor;
    /// ties go to the higher coverage
    fn recommend(&self, results: &[ThresholdResult]) -> Option<f64> {
        results
            .iter()
            .filter(|r| r.coverage >= self.min_coverage)
            .filter_map(|r| r.accuracy.map(|acc| (acc, r.coverage, r.threshold)))
            .max_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)))
            .map(|(_, _, threshold)| threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> ConfidenceGate {
        ConfidenceGate::from_settings(&GateSettings::default())
    }

    #[test]
    fn test_signal_is_symmetric() {
        assert_eq!(ConfidenceGate::signal(0.7, 0.6), Some(Direction::Up));
        assert_eq!(ConfidenceGate::signal(0.3, 0.6), Some(Direction::Down));
        assert_eq!(ConfidenceGate::signal(0.55, 0.6), None);
        assert_eq!(ConfidenceGate::signal(0.6, 0.6), Some(Direction::Up));
    }

    #[test]
    fn test_nothing_called_has_no_accuracy() {
        let result = gate().evaluate_threshold(&[0.5, 0.51, 0.49], &[true, false, true], 0.7);
        assert_eq!(result.signal_count, 0);
        assert_eq!(result.coverage, 0.0);
        assert_eq!(result.accuracy, None);
    }

    #[test]
    fn test_coverage_and_accuracy() {
        let probs = [0.9, 0.1, 0.62, 0.5];
        let labels = [true, true, false, false];
        let result = gate().evaluate_threshold(&probs, &labels, 0.6);
        assert_eq!(result.called_mask, vec![true, true, true, false]);
        assert_eq!(result.signal_count, 3);
        assert_eq!(result.coverage, 0.75);
        assert!((result.accuracy.unwrap() - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_recommendation_respects_coverage_floor() {
        // 0.7 is perfect but covers only 1 of 10 rows
        let probs = [0.95, 0.66, 0.66, 0.4, 0.6, 0.56, 0.45, 0.5, 0.5, 0.5];
        let labels = [true, true, false, false, true, true, true, false, true, false];
        let eval = gate().evaluate(&probs, &labels);
        let by_threshold: Vec<(f64, f64)> = eval.thresholds.iter().map(|t| (t.threshold, t.coverage)).collect();
        assert_eq!(by_threshold[3], (0.70, 0.1));
        assert_eq!(eval.thresholds[3].accuracy, Some(1.0));
        assert_ne!(eval.recommended_threshold, Some(0.70));
        assert!(eval.recommended_threshold.is_some());
    }

    #[test]
    fn test_ties_prefer_higher_coverage() {
        let probs = [0.9, 0.1, 0.58, 0.42, 0.5];
        let labels = [true, false, true, false, true];
        let eval = gate().evaluate(&probs, &labels);
        // 0.55 calls four rows, the stricter thresholds two; all are perfect
        assert_eq!(eval.thresholds[0].accuracy, Some(1.0));
        assert_eq!(eval.thresholds[1].accuracy, Some(1.0));
        assert_eq!(eval.recommended_threshold, Some(0.55));
    }

    #[test]
    fn test_no_recommendation_when_coverage_too_low() {
        let probs = vec![0.5; 20];
        let labels: Vec<bool> = (0..20).map(|i| i % 2 == 0).collect();
        let eval = gate().evaluate(&probs, &labels);
        assert_eq!(eval.recommended_threshold, None);
        assert_eq!(eval.overall_auc, Some(0.5));
    }
}
