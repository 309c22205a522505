use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::ml::calibration::{CalibrationMap, CalibrationStatus};
use crate::ml::folds::Fold;
use crate::ml::gating::GateEvaluation;
use crate::ml::metrics::ProbabilityMetrics;
use crate::ml::stacking::{HoldoutMetrics, StackedModel};

/// Non-fatal condition recorded during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunNote {
    FoldSkipped {
        fold_id: usize,
        train_rows: usize,
        validation_rows: usize,
    },
    FoldFetchFailed {
        fold_id: usize,
        message: String,
    },
    LearnerSkipped {
        fold_id: usize,
        learner_id: String,
        degenerate_labels: bool,
        reason: String,
    },
    LearnerDropped {
        learner_id: String,
    },
    CalibrationFallback {
        learner_id: String,
        status: CalibrationStatus,
    },
    RegimeColumnsTruncated {
        dropped: Vec<String>,
    },
    RegimeDropped {
        reason: String,
    },
    MetaAveraging,
}

impl std::fmt::Display for RunNote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunNote::FoldSkipped {
                fold_id,
                train_rows,
                validation_rows,
            } => write!(
                f,
                "fold {} skipped: {} train / {} validation rows below minimum",
                fold_id, train_rows, validation_rows
            ),
            RunNote::FoldFetchFailed { fold_id, message } => write!(f, "fold {} fetch failed: {}", fold_id, message),
            RunNote::LearnerSkipped {
                fold_id,
                learner_id,
                reason,
                ..
            } => write!(f, "{} skipped on fold {}: {}", learner_id, fold_id, reason),
            RunNote::LearnerDropped { learner_id } => write!(f, "{} dropped: no OOF predictions", learner_id),
            RunNote::CalibrationFallback { learner_id, status } => {
                write!(f, "{} calibration fell back ({:?})", learner_id, status)
            }
            RunNote::RegimeColumnsTruncated { dropped } => write!(f, "regime columns over cap dropped: {:?}", dropped),
            RunNote::RegimeDropped { reason } => write!(f, "regime features dropped: {}", reason),
            RunNote::MetaAveraging => write!(f, "meta-learner fell back to averaging"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FoldStatus {
    Completed,
    Skipped,
    FetchFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldSummary {
    pub fold: Fold,
    pub status: FoldStatus,
    pub learners_trained: Vec<String>,
    pub learners_failed: Vec<String>,
}

impl FoldSummary {
    pub fn new(fold: Fold, status: FoldStatus) -> Self {
        Self {
            fold,
            status,
            learners_trained: Vec::new(),
            learners_failed: Vec::new(),
        }
    }
}

/// Per-learner diagnostics over the eligible rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnerDiagnostics {
    pub learner_id: String,
    pub oof_coverage: usize,
    pub calibration: CalibrationMap,
    pub calibration_status: CalibrationStatus,
    pub raw: ProbabilityMetrics,
    pub calibrated: ProbabilityMetrics,
    /// Combiner weight on this learner's standardised column
    pub meta_weight: Option<f64>,
}

/// One row of the gating table
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GatingEntry {
    pub accuracy: Option<f64>,
    pub coverage: f64,
    pub signal_count: usize,
}

/// Complete result of a successful run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackingReport {
    pub run_id: Uuid,
    pub completed_at: DateTime<Utc>,
    pub n_rows: usize,
    pub folds: Vec<FoldSummary>,
    pub oof_samples: usize,
    #[serde(skip)]
    pub eligible_rows: Vec<usize>,
    pub overall_accuracy: f64,
    pub overall_auc: Option<f64>,
    pub overall: ProbabilityMetrics,
    pub learners: Vec<LearnerDiagnostics>,
    pub gating_table: BTreeMap<String, GatingEntry>,
    pub recommended_threshold: Option<f64>,
    pub holdout: Option<HoldoutMetrics>,
    pub model: StackedModel,
    pub notes: Vec<RunNote>,
}

impl StackingReport {
    /// Keyed by `threshold_key`, which sorts ascending for thresholds in [0.5, 1)
    pub fn gating_table_from(gate: &GateEvaluation) -> BTreeMap<String, GatingEntry> {
        gate.thresholds
            .iter()
            .map(|t| {
                (
                    threshold_key(t.threshold),
                    GatingEntry {
                        accuracy: t.accuracy,
                        coverage: t.coverage,
                        signal_count: t.signal_count,
                    },
                )
            })
            .collect()
    }

    pub fn new_run_id() -> Uuid {
        Uuid::new_v4()
    }

    pub fn calibrated_auc(&self, learner_id: &str) -> Option<f64> {
        self.learners
            .iter()
            .find(|l| l.learner_id == learner_id)
            .and_then(|l| l.calibrated.auc)
    }

    pub fn completed_folds(&self) -> usize {
        self.folds.iter().filter(|f| f.status == FoldStatus::Completed).count()
    }

    pub fn print_summary(&self) {
        println!("\n{}", "=".repeat(60));
        println!("                  STACKING RESULTS");
        println!("{}", "=".repeat(60));
        println!("Run:                {}", self.run_id);
        println!("Completed:          {}", self.completed_at.format("%Y-%m-%d %H:%M:%S UTC"));
        println!("Rows:               {}", self.n_rows);
        println!("Folds completed:    {} of {}", self.completed_folds(), self.folds.len());
        println!("OOF samples:        {}", self.oof_samples);
        println!("{}", "-".repeat(60));
        println!("OVERALL");
        println!("  Accuracy:           {:.2}%", self.overall_accuracy * 100.0);
        println!("  AUC:                {}", fmt_opt(self.overall_auc, 4));
        println!("  Brier:              {:.4}", self.overall.brier);
        println!("  Log Loss:           {:.4}", self.overall.log_loss);
        println!("  ECE:                {:.4}", self.overall.ece);
        if let Some(h) = &self.holdout {
            println!(
                "  Holdout:            {:.2}% accuracy, AUC {} ({} rows)",
                h.accuracy * 100.0,
                fmt_opt(h.auc, 4),
                h.holdout_rows
            );
        }
        println!("{}", "-".repeat(60));
        println!("LEARNERS");
        for l in &self.learners {
            println!(
                "  {}: AUC {} -> {}, ECE {:.4} -> {:.4}, weight {}",
                l.learner_id,
                fmt_opt(l.raw.auc, 4),
                fmt_opt(l.calibrated.auc, 4),
                l.raw.ece,
                l.calibrated.ece,
                fmt_opt(l.meta_weight, 3)
            );
        }
        println!("{}", "-".repeat(60));
        println!("GATING");
        for (threshold, entry) in &self.gating_table {
            println!(
                "  {}: {} signals, {:.1}% coverage, accuracy {}",
                threshold,
                entry.signal_count,
                entry.coverage * 100.0,
                entry
                    .accuracy
                    .map(|a| format!("{:.2}%", a * 100.0))
                    .unwrap_or_else(|| "n/a".to_string())
            );
        }
        match self.recommended_threshold {
            Some(t) => println!("  Recommended:        {}", threshold_key(t)),
            None => println!("  Recommended:        none"),
        }
        if !self.notes.is_empty() {
            println!("{}", "-".repeat(60));
            println!("NOTES");
            for note in &self.notes {
                println!("  {}", note);
            }
        }
        println!("{}", "=".repeat(60));
    }
}

fn fmt_opt(value: Option<f64>, decimals: usize) -> String {
    value
        .map(|v| format!("{:.*}", decimals, v))
        .unwrap_or_else(|| "n/a".to_string())
}

/// Two decimals when that is exact, otherwise the shortest lossless form, so
/// distinct thresholds never share a key
pub fn threshold_key(threshold: f64) -> String {
    let short = format!("{:.2}", threshold);
    if short.parse::<f64>() == Ok(threshold) {
        short
    } else {
        threshold.to_string()
    }
}
