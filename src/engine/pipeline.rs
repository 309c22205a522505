//! End-to-end stacking run.
//!
//! Stages: INIT -> FOLD_GENERATION -> {TRAIN_BASE_LEARNERS -> COLLECT_OOF}* ->
//! CALIBRATE -> STACK -> GATE_EVALUATE -> DONE. Any data shortfall moves the
//! pipeline to INSUFFICIENT_DATA and no artifact is returned.

use chrono::Utc;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::results::{FoldStatus, FoldSummary, LearnerDiagnostics, RunNote, StackingReport};
use crate::config::EngineConfig;
use crate::data::{FoldDataSource, InMemorySource, RegimeFeatures};
use crate::error::{EngineError, EngineResult, Insufficiency};
use crate::ml::calibration::{CalibrationStatus, LearnerCalibration};
use crate::ml::folds::{generate_folds, Fold};
use crate::ml::gating::ConfidenceGate;
use crate::ml::metrics::ProbabilityMetrics;
use crate::ml::oof::OofTable;
use crate::ml::pool::BaseLearnerPool;
use crate::ml::stacking::{design_matrix, evaluate_holdout, MetaModel, StackedModel};
use crate::types::Dataset;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Init,
    FoldGeneration,
    TrainBaseLearners { fold_id: usize },
    CollectOof { fold_id: usize },
    Calibrate,
    Stack,
    GateEvaluate,
    Done,
    InsufficientData,
}

pub struct StackingPipeline {
    config: EngineConfig,
    pool: BaseLearnerPool,
    history: Vec<PipelineStage>,
}

impl StackingPipeline {
    /// Validate the configuration and build the learner pool. Fails on invalid
    /// settings or an unavailable learner family before any data is read.
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        config.validate().map_err(EngineError::InvalidConfig)?;
        let pool = BaseLearnerPool::from_specs(&config.learner_specs(), &config.pool)?;
        Ok(Self::with_pool(config, pool))
    }

    /// Use a pre-built pool (custom `BinaryClassifier` implementations)
    pub fn with_pool(config: EngineConfig, pool: BaseLearnerPool) -> Self {
        Self {
            config,
            pool,
            history: vec![PipelineStage::Init],
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn stage(&self) -> PipelineStage {
        self.history.last().copied().unwrap_or(PipelineStage::Init)
    }

    pub fn history(&self) -> &[PipelineStage] {
        &self.history
    }

    /// Run over an in-memory dataset, applying the configured feature subset
    pub fn run_dataset(&mut self, dataset: &Dataset, regime: Option<&RegimeFeatures>) -> EngineResult<StackingReport> {
        match self.config.data.feature_columns.clone() {
            Some(columns) => {
                let reduced = dataset.select_columns(&columns)?;
                info!("Using {} of {} feature columns", reduced.n_features(), dataset.n_features());
                self.run(&InMemorySource::new(&reduced), regime)
            }
            None => self.run(&InMemorySource::new(dataset), regime),
        }
    }

    pub fn run(&mut self, source: &dyn FoldDataSource, regime: Option<&RegimeFeatures>) -> EngineResult<StackingReport> {
        self.history = vec![PipelineStage::Init];
        let n_rows = source.n_rows();
        let mut notes = Vec::new();

        self.enter(PipelineStage::FoldGeneration);
        let folds = match generate_folds(n_rows, self.config.folds.n_folds, self.config.folds.embargo) {
            Ok(folds) => folds,
            Err(EngineError::DataInsufficiency(reason)) => return Err(self.insufficient(reason)),
            Err(e) => return Err(e),
        };

        let mut summaries = Vec::with_capacity(folds.len());
        let mut admitted = Vec::new();
        for fold in folds {
            if self.pool.admits(&fold) {
                admitted.push(fold);
                summaries.push(FoldSummary::new(fold, FoldStatus::Completed));
            } else {
                warn!(
                    "Fold {} skipped: {} train / {} validation rows (minimum {} / {})",
                    fold.fold_id,
                    fold.train_len(),
                    fold.validation_len(),
                    self.pool.min_train_rows(),
                    self.pool.min_validation_rows()
                );
                notes.push(RunNote::FoldSkipped {
                    fold_id: fold.fold_id,
                    train_rows: fold.train_len(),
                    validation_rows: fold.validation_len(),
                });
                summaries.push(FoldSummary::new(fold, FoldStatus::Skipped));
            }
        }
        self.check_plan(n_rows, &admitted)?;

        let mut oof = OofTable::new(n_rows, self.pool.learner_ids());
        for fold in &admitted {
            self.enter(PipelineStage::TrainBaseLearners { fold_id: fold.fold_id });
            let summary = summaries
                .iter_mut()
                .find(|s| s.fold.fold_id == fold.fold_id)
                .ok_or_else(|| EngineError::InvalidData(format!("no summary for fold {}", fold.fold_id)))?;

            let data = match source.load(fold).and_then(|d| d.check_shape(fold).map(|_| d)) {
                Ok(data) => data,
                Err(e) => {
                    warn!("{}; fold excluded", e);
                    summary.status = FoldStatus::FetchFailed;
                    notes.push(RunNote::FoldFetchFailed {
                        fold_id: fold.fold_id,
                        message: e.message,
                    });
                    continue;
                }
            };

            let outcome = self.pool.train_fold(fold, &data);
            self.enter(PipelineStage::CollectOof { fold_id: fold.fold_id });
            oof.absorb(&outcome, &data.y_validation)?;

            summary.learners_trained = outcome.results.iter().map(|r| r.learner_id.clone()).collect();
            summary.learners_failed = outcome.failures.iter().map(|f| f.learner_id.clone()).collect();
            for failure in outcome.failures {
                notes.push(RunNote::LearnerSkipped {
                    fold_id: failure.fold_id,
                    learner_id: failure.learner_id,
                    degenerate_labels: failure.error.is_degenerate_labels(),
                    reason: failure.error.to_string(),
                });
            }
        }

        let completed = summaries.iter().filter(|s| s.status == FoldStatus::Completed).count();
        if completed == 0 {
            return Err(self.insufficient(Insufficiency::NoUsableFolds {
                rows: n_rows,
                n_folds: self.config.folds.n_folds,
            }));
        }
        if completed < self.config.folds.min_folds {
            return Err(self.insufficient(Insufficiency::TooFewFolds {
                usable: completed,
                required: self.config.folds.min_folds,
            }));
        }

        for learner_id in oof.prune_uncovered() {
            notes.push(RunNote::LearnerDropped { learner_id });
        }
        let eligible = match oof.eligible(self.config.oof.min_eligible_rows) {
            Ok(eligible) => eligible,
            Err(EngineError::DataInsufficiency(reason)) => return Err(self.insufficient(reason)),
            Err(e) => return Err(e),
        };
        info!(
            "OOF aggregation: {} of {} rows eligible across {} learners",
            eligible.len(),
            n_rows,
            eligible.learner_ids.len()
        );

        self.enter(PipelineStage::Calibrate);
        let calibrations: Vec<LearnerCalibration> = eligible
            .learner_ids
            .iter()
            .enumerate()
            .map(|(j, id)| LearnerCalibration::fit(id, &eligible.raw_column(j), &eligible.labels, &self.config.calibration))
            .collect();
        for cal in &calibrations {
            if cal.status != CalibrationStatus::Fitted {
                warn!("Calibration for {} fell back: {:?}", cal.learner_id, cal.status);
                notes.push(RunNote::CalibrationFallback {
                    learner_id: cal.learner_id.clone(),
                    status: cal.status,
                });
            }
        }

        self.enter(PipelineStage::Stack);
        let n_learners = calibrations.len();
        let calibrated = Array2::from_shape_fn((eligible.len(), n_learners), |(i, j)| calibrations[j].calibrated[i]);
        let (regime_matrix, regime_columns) = self.align_regime(regime, &eligible.rows, &mut notes);
        let design = design_matrix(&calibrated, regime_matrix.as_ref())?;
        let meta = MetaModel::fit(&design, &eligible.labels, n_learners, &self.config.stacking);
        if matches!(meta, MetaModel::Average { .. }) {
            notes.push(RunNote::MetaAveraging);
        }
        let final_probs = meta.predict_proba(&design);
        let holdout = evaluate_holdout(
            &design,
            &eligible.labels,
            n_learners,
            self.config.stacking.meta_holdout_fraction,
            &self.config.stacking,
        );

        self.enter(PipelineStage::GateEvaluate);
        let gate = ConfidenceGate::from_settings(&self.config.gate).evaluate(&final_probs, &eligible.labels);
        let overall = ProbabilityMetrics::compute(&final_probs, &eligible.labels);

        let weights = meta.weights();
        let coverage = oof.coverage();
        let learners: Vec<LearnerDiagnostics> = calibrations
            .iter()
            .enumerate()
            .map(|(j, cal)| LearnerDiagnostics {
                learner_id: cal.learner_id.clone(),
                oof_coverage: coverage
                    .iter()
                    .find(|(id, _)| *id == cal.learner_id)
                    .map_or(0, |(_, count)| *count),
                calibration: cal.map,
                calibration_status: cal.status,
                raw: cal.raw_metrics,
                calibrated: cal.calibrated_metrics,
                meta_weight: weights.get(j).copied(),
            })
            .collect();

        let report = StackingReport {
            run_id: StackingReport::new_run_id(),
            completed_at: Utc::now(),
            n_rows,
            folds: summaries,
            oof_samples: eligible.len(),
            overall_accuracy: gate.overall_accuracy,
            overall_auc: gate.overall_auc,
            overall,
            learners,
            gating_table: StackingReport::gating_table_from(&gate),
            recommended_threshold: gate.recommended_threshold,
            holdout,
            model: StackedModel {
                learner_ids: eligible.learner_ids.clone(),
                calibrators: calibrations.iter().map(|c| c.map).collect(),
                regime_columns,
                meta,
            },
            notes,
            eligible_rows: eligible.rows,
        };
        self.enter(PipelineStage::Done);
        info!(
            "Stacking complete: accuracy {:.4}, AUC {:?}, {} OOF samples, recommended threshold {:?}",
            report.overall_accuracy, report.overall_auc, report.oof_samples, report.recommended_threshold
        );
        Ok(report)
    }

    /// Fail before any fit when the admitted folds cannot meet the fold or
    /// eligible-row minimums
    fn check_plan(&mut self, n_rows: usize, admitted: &[Fold]) -> EngineResult<()> {
        if admitted.is_empty() {
            return Err(self.insufficient(Insufficiency::NoUsableFolds {
                rows: n_rows,
                n_folds: self.config.folds.n_folds,
            }));
        }
        if admitted.len() < self.config.folds.min_folds {
            return Err(self.insufficient(Insufficiency::TooFewFolds {
                usable: admitted.len(),
                required: self.config.folds.min_folds,
            }));
        }
        let reachable: usize = admitted.iter().map(|f| f.validation_len()).sum();
        if reachable < self.config.oof.min_eligible_rows {
            return Err(self.insufficient(Insufficiency::InsufficientOofSamples {
                eligible: reachable,
                required: self.config.oof.min_eligible_rows,
            }));
        }
        info!(
            "Fold plan: {} folds admitted, up to {} OOF rows",
            admitted.len(),
            reachable
        );
        Ok(())
    }

    fn align_regime(
        &self,
        regime: Option<&RegimeFeatures>,
        eligible_rows: &[usize],
        notes: &mut Vec<RunNote>,
    ) -> (Option<Array2<f64>>, Vec<String>) {
        let Some(regime) = regime else {
            return (None, Vec::new());
        };
        let (regime, dropped) = regime.truncated(self.config.stacking.max_regime_columns);
        if !dropped.is_empty() {
            warn!("Regime columns over the cap dropped: {:?}", dropped);
            notes.push(RunNote::RegimeColumnsTruncated { dropped });
        }
        if regime.n_columns() == 0 {
            return (None, Vec::new());
        }
        match regime.align(eligible_rows) {
            Ok(matrix) => {
                info!("Regime columns in meta design: {:?}", regime.names);
                (Some(matrix), regime.names)
            }
            Err(e) => {
                warn!("Regime features dropped: {}", e);
                notes.push(RunNote::RegimeDropped { reason: e.to_string() });
                (None, Vec::new())
            }
        }
    }

    fn enter(&mut self, stage: PipelineStage) {
        info!("Pipeline: {:?} -> {:?}", self.stage(), stage);
        self.history.push(stage);
    }

    fn insufficient(&mut self, reason: Insufficiency) -> EngineError {
        warn!("Insufficient data: {}", reason);
        self.enter(PipelineStage::InsufficientData);
        reason.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineProfile;
    use crate::data::source::MockFoldDataSource;
    use crate::data::synthetic::{generate, generate_regime, SyntheticKind};
    use crate::data::{FetchError, FoldData};
    use crate::ml::learners::{BinaryClassifier, FittedClassifier, LearnerError, LearnerSpec};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn fast_config() -> EngineConfig {
        EngineConfig::for_profile(EngineProfile::Fast)
    }

    /// Wraps a learner and counts `fit` calls
    struct CountingLearner {
        inner: Box<dyn BinaryClassifier>,
        fits: Arc<AtomicUsize>,
    }

    impl BinaryClassifier for CountingLearner {
        fn id(&self) -> &str {
            self.inner.id()
        }

        fn fit(&self, x: &Array2<f64>, y: &[bool]) -> Result<Box<dyn FittedClassifier>, LearnerError> {
            self.fits.fetch_add(1, Ordering::SeqCst);
            self.inner.fit(x, y)
        }
    }

    /// Rejects every training set as single-class
    struct AlwaysDegenerate;

    impl BinaryClassifier for AlwaysDegenerate {
        fn id(&self) -> &str {
            "degenerate"
        }

        fn fit(&self, _x: &Array2<f64>, y: &[bool]) -> Result<Box<dyn FittedClassifier>, LearnerError> {
            Err(LearnerError::SingleClass { rows: y.len() })
        }
    }

    fn counting_pool(config: &EngineConfig, fits: &Arc<AtomicUsize>) -> BaseLearnerPool {
        let learners: Vec<Box<dyn BinaryClassifier>> = config
            .learner_specs()
            .iter()
            .map(|spec| {
                Box::new(CountingLearner {
                    inner: spec.build().unwrap(),
                    fits: Arc::clone(fits),
                }) as Box<dyn BinaryClassifier>
            })
            .collect();
        BaseLearnerPool::new(learners, config.pool.min_train_rows, config.pool.min_validation_rows)
    }

    #[test]
    fn test_scenario_a_noise_has_no_edge() {
        let ds = generate(10_000, 20, SyntheticKind::Noise, 1).unwrap();
        let mut pipeline = StackingPipeline::new(fast_config()).unwrap();
        let report = pipeline.run_dataset(&ds, None).unwrap();

        assert_eq!(report.folds.len(), 5);
        assert_eq!(report.completed_folds(), 5);
        assert!(report.oof_samples > 500);
        let auc = report.overall_auc.unwrap();
        assert!((0.45..=0.55).contains(&auc), "auc {}", auc);
        for summary in &report.folds {
            assert!(summary.fold.train_end + 30 <= summary.fold.validation_start);
        }
        assert_eq!(pipeline.stage(), PipelineStage::Done);
    }

    #[test]
    fn test_scenario_b_separable_signal() {
        let ds = generate(6_000, 5, SyntheticKind::Separable, 2).unwrap();
        let mut pipeline = StackingPipeline::new(fast_config()).unwrap();
        let report = pipeline.run_dataset(&ds, None).unwrap();

        assert!(report.overall_accuracy > 0.95, "accuracy {}", report.overall_accuracy);
        let confident = report
            .gating_table
            .values()
            .any(|e| e.coverage >= 0.20 && e.accuracy.map_or(false, |a| a > 0.97));
        assert!(confident, "{:?}", report.gating_table);
        assert!(report.recommended_threshold.is_some());

        // Stricter thresholds never lose called accuracy on separable data
        let accuracies: Vec<f64> = report.gating_table.values().filter_map(|e| e.accuracy).collect();
        assert!(accuracies.windows(2).all(|w| w[1] >= w[0] - 1e-12));
    }

    #[test]
    fn test_scenario_c_fails_before_any_fit() {
        let ds = generate(200, 4, SyntheticKind::Noise, 3).unwrap();
        let config = fast_config();
        let fits = Arc::new(AtomicUsize::new(0));
        let mut pipeline = StackingPipeline::with_pool(config.clone(), counting_pool(&config, &fits));

        let err = pipeline.run_dataset(&ds, None).unwrap_err();
        assert!(err.is_data_insufficiency());
        assert_eq!(fits.load(Ordering::SeqCst), 0);
        assert_eq!(pipeline.stage(), PipelineStage::InsufficientData);
        assert!(!pipeline
            .history()
            .iter()
            .any(|s| matches!(s, PipelineStage::TrainBaseLearners { .. })));
    }

    #[test]
    fn test_scenario_d_constant_learner_is_ignored() {
        let ds = generate(6_000, 5, SyntheticKind::Separable, 4).unwrap();
        let mut config = fast_config();
        let mut learners = EngineProfile::Fast.learners();
        learners.push(LearnerSpec::Constant {
            id: "flat".to_string(),
            probability: 0.5,
        });
        config.pool.learners = learners;

        let mut pipeline = StackingPipeline::new(config).unwrap();
        let report = pipeline.run_dataset(&ds, None).unwrap();
        let flat = report.learners.iter().find(|l| l.learner_id == "flat").unwrap();
        let auc = flat.calibrated.auc.unwrap();
        assert!((auc - 0.5).abs() < 1e-9);
        assert!(flat.meta_weight.unwrap().abs() < 1e-6);
        assert!(report.calibrated_auc("gbm_shallow").unwrap() > 0.95);
    }

    #[test]
    fn test_learner_failing_every_fold_is_dropped() {
        let ds = generate(3_000, 4, SyntheticKind::Separable, 5).unwrap();
        let config = fast_config();
        let learners: Vec<Box<dyn BinaryClassifier>> = vec![
            EngineProfile::Fast.learners()[3].build().unwrap(),
            Box::new(AlwaysDegenerate),
        ];
        let pool = BaseLearnerPool::new(learners, config.pool.min_train_rows, config.pool.min_validation_rows);
        let mut pipeline = StackingPipeline::with_pool(config, pool);
        let report = pipeline.run_dataset(&ds, None).unwrap();

        assert_eq!(report.model.learner_ids, vec!["elastic_net".to_string()]);
        assert!(report.notes.contains(&RunNote::LearnerDropped {
            learner_id: "degenerate".to_string()
        }));
        let skipped = report
            .notes
            .iter()
            .filter(|n| matches!(n, RunNote::LearnerSkipped { learner_id, .. } if learner_id == "degenerate"))
            .count();
        assert_eq!(skipped, report.completed_folds());
        assert!(report.learners.iter().all(|l| l.learner_id != "degenerate"));
        assert_eq!(pipeline.stage(), PipelineStage::Done);
    }

    #[test]
    fn test_runs_are_idempotent() {
        let ds = generate(4_000, 4, SyntheticKind::Noise, 5).unwrap();
        let mut config = fast_config();
        config.folds.n_folds = 3;
        let mut first = StackingPipeline::new(config.clone()).unwrap();
        let mut second = StackingPipeline::new(config).unwrap();
        let a = first.run_dataset(&ds, None).unwrap();
        let b = second.run_dataset(&ds, None).unwrap();

        let folds_a: Vec<Fold> = a.folds.iter().map(|f| f.fold).collect();
        let folds_b: Vec<Fold> = b.folds.iter().map(|f| f.fold).collect();
        assert_eq!(folds_a, folds_b);
        assert_eq!(a.eligible_rows, b.eligible_rows);
        assert_eq!(a.overall_accuracy, b.overall_accuracy);
        assert_ne!(a.run_id, b.run_id);
    }

    #[test]
    fn test_fetch_failure_skips_fold() {
        let ds = generate(5_000, 4, SyntheticKind::Separable, 6).unwrap();
        let n_rows = ds.len();
        let mut source = MockFoldDataSource::new();
        source.expect_n_rows().return_const(n_rows);
        source.expect_load().returning(move |fold| {
            if fold.fold_id == 1 {
                Err(FetchError::new(1, "warehouse timeout"))
            } else {
                InMemorySource::new(&ds).load(fold)
            }
        });

        let mut config = fast_config();
        config.folds.n_folds = 4;
        let mut pipeline = StackingPipeline::new(config).unwrap();
        let report = pipeline.run(&source, None).unwrap();

        assert_eq!(report.completed_folds(), 3);
        assert_eq!(report.folds[1].status, FoldStatus::FetchFailed);
        assert!(report.notes.iter().any(|n| matches!(
            n,
            RunNote::FoldFetchFailed { fold_id: 1, .. }
        )));
        let failed = report.folds[1].fold.validation_range();
        assert!(report.eligible_rows.iter().all(|r| !failed.contains(r)));
    }

    #[test]
    fn test_every_fold_failing_is_insufficient() {
        let mut source = MockFoldDataSource::new();
        source.expect_n_rows().return_const(5_000usize);
        // Wrong shape counts as a failed fetch
        source.expect_load().returning(|_| {
            Ok(FoldData {
                x_train: Array2::zeros((1, 2)),
                y_train: vec![true],
                x_validation: Array2::zeros((1, 2)),
                y_validation: vec![false],
            })
        });

        let mut pipeline = StackingPipeline::new(fast_config()).unwrap();
        let err = pipeline.run(&source, None).unwrap_err();
        assert!(matches!(
            err,
            EngineError::DataInsufficiency(Insufficiency::NoUsableFolds { .. })
        ));
        assert_eq!(pipeline.stage(), PipelineStage::InsufficientData);
    }

    #[test]
    fn test_min_folds_enforced_after_failures() {
        let ds = generate(5_000, 4, SyntheticKind::Noise, 7).unwrap();
        let mut source = MockFoldDataSource::new();
        source.expect_n_rows().return_const(ds.len());
        source.expect_load().returning(move |fold| {
            if fold.fold_id == 0 {
                InMemorySource::new(&ds).load(fold)
            } else {
                Err(FetchError::new(fold.fold_id, "unavailable"))
            }
        });

        let mut config = fast_config();
        config.folds.n_folds = 3;
        config.folds.min_folds = 2;
        let mut pipeline = StackingPipeline::new(config).unwrap();
        let err = pipeline.run(&source, None).unwrap_err();
        assert!(matches!(
            err,
            EngineError::DataInsufficiency(Insufficiency::TooFewFolds { usable: 1, required: 2 })
        ));
    }

    #[test]
    fn test_missing_backend_fails_at_construction() {
        let mut config = fast_config();
        config.pool.learners = vec![LearnerSpec::Backend {
            id: "xgb".into(),
            backend: "xgboost".into(),
        }];
        assert!(matches!(
            StackingPipeline::new(config),
            Err(EngineError::MissingDependency { .. })
        ));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = fast_config();
        config.gate.thresholds = Vec::new();
        assert!(matches!(StackingPipeline::new(config), Err(EngineError::InvalidConfig(_))));
    }

    #[test]
    fn test_regime_columns_join_meta_design() {
        let ds = generate(4_000, 4, SyntheticKind::Separable, 8).unwrap();
        let regime = generate_regime(ds.len(), 8);
        let mut config = fast_config();
        config.folds.n_folds = 3;
        let mut pipeline = StackingPipeline::new(config).unwrap();
        let report = pipeline.run_dataset(&ds, Some(&regime)).unwrap();

        assert_eq!(report.model.regime_columns, regime.names);
        assert_eq!(report.model.meta.weights().len(), report.learners.len() + 2);
        assert!(!report.notes.iter().any(|n| matches!(n, RunNote::RegimeDropped { .. })));
    }

    #[test]
    fn test_misaligned_regime_is_dropped() {
        let ds = generate(4_000, 4, SyntheticKind::Separable, 9).unwrap();
        // Covers only the first half of the series
        let regime = generate_regime(2_000, 9);
        let mut config = fast_config();
        config.folds.n_folds = 3;
        let mut pipeline = StackingPipeline::new(config).unwrap();
        let report = pipeline.run_dataset(&ds, Some(&regime)).unwrap();

        assert!(report.model.regime_columns.is_empty());
        assert!(report.notes.iter().any(|n| matches!(n, RunNote::RegimeDropped { .. })));
        assert_eq!(report.model.meta.weights().len(), report.learners.len());
    }

    #[test]
    fn test_report_model_predicts_new_rows() {
        let ds = generate(4_000, 4, SyntheticKind::Separable, 10).unwrap();
        let mut config = fast_config();
        config.folds.n_folds = 3;
        config.stacking.meta_holdout_fraction = 0.25;
        let mut pipeline = StackingPipeline::new(config).unwrap();
        let report = pipeline.run_dataset(&ds, None).unwrap();

        assert!(report.holdout.is_some());
        let k = report.model.learner_ids.len();
        let raw = Array2::from_shape_fn((2, k), |(i, _)| if i == 0 { 0.95 } else { 0.05 });
        let probs = report.model.predict_proba(&raw, None).unwrap();
        assert!(probs[0] > probs[1]);

        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("gating_table"));
        assert!(json.contains("\"0.55\""));
    }
}
