//! Scoring helpers for probability forecasts against binary labels.

use serde::{Deserialize, Serialize};

use super::logistic::clamp_probability;

/// Fraction of rows where `p >= 0.5` agrees with the label. 0 for empty input.
pub fn accuracy(probs: &[f64], labels: &[bool]) -> f64 {
    let n = probs.len().min(labels.len());
    if n == 0 {
        return 0.0;
    }
    let correct = probs
        .iter()
        .zip(labels)
        .filter(|&(&p, &y)| (p >= 0.5) == y)
        .count();
    correct as f64 / n as f64
}

/// Area under the ROC curve via the rank-sum statistic, averaging ranks over
/// ties. `None` when the labels contain a single class.
pub fn roc_auc(probs: &[f64], labels: &[bool]) -> Option<f64> {
    let n = probs.len().min(labels.len());
    let positives = labels[..n].iter().filter(|&&y| y).count();
    let negatives = n - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| probs[a].total_cmp(&probs[b]));

    let mut rank_sum = 0.0;
    let mut start = 0;
    while start < n {
        let mut end = start + 1;
        while end < n && probs[order[end]] == probs[order[start]] {
            end += 1;
        }
        // Ranks are 1-based; tied block shares the mean rank
        let mean_rank = (start + end + 1) as f64 / 2.0;
        rank_sum += mean_rank * order[start..end].iter().filter(|&&i| labels[i]).count() as f64;
        start = end;
    }

    let pos = positives as f64;
    Some((rank_sum - pos * (pos + 1.0) / 2.0) / (pos * negatives as f64))
}

pub fn brier_score(probs: &[f64], labels: &[bool]) -> f64 {
    let n = probs.len().min(labels.len());
    if n == 0 {
        return 0.0;
    }
    probs
        .iter()
        .zip(labels)
        .map(|(&p, &y)| {
            let target = if y { 1.0 } else { 0.0 };
            (p - target).powi(2)
        })
        .sum::<f64>()
        / n as f64
}

/// Mean negative log-likelihood with probabilities clamped away from 0 and 1
pub fn log_loss(probs: &[f64], labels: &[bool]) -> f64 {
    let n = probs.len().min(labels.len());
    if n == 0 {
        return 0.0;
    }
    probs
        .iter()
        .zip(labels)
        .map(|(&p, &y)| {
            let p = clamp_probability(p);
            if y {
                -p.ln()
            } else {
                -(1.0 - p).ln()
            }
        })
        .sum::<f64>()
        / n as f64
}

/// Expected calibration error over `num_bins` equal-width bins
pub fn expected_calibration_error(probs: &[f64], labels: &[bool], num_bins: usize) -> f64 {
    let n = probs.len().min(labels.len());
    if n == 0 || num_bins == 0 {
        return 0.0;
    }
    let mut confidence = vec![0.0; num_bins];
    let mut hits = vec![0.0; num_bins];
    let mut counts = vec![0usize; num_bins];
    for (&p, &y) in probs.iter().zip(labels) {
        let p = p.clamp(0.0, 1.0);
        let bin = ((p * num_bins as f64) as usize).min(num_bins - 1);
        confidence[bin] += p;
        if y {
            hits[bin] += 1.0;
        }
        counts[bin] += 1;
    }
    (0..num_bins)
        .filter(|&b| counts[b] > 0)
        .map(|b| {
            let c = counts[b] as f64;
            (c / n as f64) * (confidence[b] / c - hits[b] / c).abs()
        })
        .sum()
}

/// Standard scorecard for one probability column
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityMetrics {
    pub accuracy: f64,
    pub auc: Option<f64>,
    pub brier: f64,
    pub log_loss: f64,
    pub ece: f64,
}

impl ProbabilityMetrics {
    pub const ECE_BINS: usize = 10;

    pub fn compute(probs: &[f64], labels: &[bool]) -> Self {
        Self {
            accuracy: accuracy(probs, labels),
            auc: roc_auc(probs, labels),
            brier: brier_score(probs, labels),
            log_loss: log_loss(probs, labels),
            ece: expected_calibration_error(probs, labels, Self::ECE_BINS),
        }
    }
}
