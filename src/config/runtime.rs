use serde::{Deserialize, Serialize};

use super::profiles::EngineProfile;
use crate::ml::folds::Fold;
use crate::ml::learners::LearnerSpec;
use crate::ml::pool::fold_admitted;

/// Everything a run needs. Passed explicitly into the pipeline; nothing is
/// read from process-wide state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub profile: EngineProfile,
    pub data: DataSettings,
    pub folds: FoldSettings,
    pub pool: PoolSettings,
    pub oof: OofSettings,
    pub calibration: CalibrationSettings,
    pub stacking: StackingSettings,
    pub gate: GateSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::for_profile(EngineProfile::Standard)
    }
}

impl EngineConfig {
    pub fn for_profile(profile: EngineProfile) -> Self {
        Self {
            profile,
            data: DataSettings::default(),
            folds: FoldSettings::default(),
            pool: PoolSettings::default(),
            oof: OofSettings::default(),
            calibration: CalibrationSettings::default(),
            stacking: StackingSettings::default(),
            gate: GateSettings::default(),
        }
    }

    /// Learner set in effect: the explicit list, or the profile's preset when
    /// none is configured
    pub fn learner_specs(&self) -> Vec<LearnerSpec> {
        if self.pool.learners.is_empty() {
            self.profile.learners()
        } else {
            self.pool.learners.clone()
        }
    }

    /// Switch the learner preset. Returns false when an explicit
    /// `pool.learners` list shadows the preset.
    pub fn apply_profile(&mut self, profile: EngineProfile) -> bool {
        self.profile = profile;
        self.pool.learners.is_empty()
    }

    /// Copy with the profile's learner preset written out explicitly
    pub fn resolved(&self) -> Self {
        let mut config = self.clone();
        config.pool.learners = self.learner_specs();
        config
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        // Data
        if self.data.target_column.trim().is_empty() {
            errors.push("target_column must not be empty".to_string());
        }
        if let Some(columns) = &self.data.feature_columns {
            if columns.is_empty() {
                errors.push("feature_columns must list at least one column when set".to_string());
            }
        }

        // Folds
        if self.folds.n_folds == 0 {
            errors.push("n_folds must be > 0".to_string());
        }
        if self.folds.min_folds == 0 || self.folds.min_folds > self.folds.n_folds {
            errors.push("min_folds must be between 1 and n_folds".to_string());
        }

        // Pool
        if self.pool.min_train_rows == 0 || self.pool.min_validation_rows == 0 {
            errors.push("pool row minimums must be > 0".to_string());
        }
        let specs = self.learner_specs();
        if specs.is_empty() {
            errors.push("at least one learner must be configured".to_string());
        }
        let mut seen = std::collections::HashSet::new();
        for spec in &specs {
            if !seen.insert(spec.id()) {
                errors.push(format!("duplicate learner id '{}'", spec.id()));
            }
            errors.extend(spec.validate());
        }

        // OOF
        if self.oof.min_eligible_rows == 0 {
            errors.push("min_eligible_rows must be > 0".to_string());
        }

        // Calibration / stacking
        if self.calibration.l2 < 0.0 || self.stacking.l2 < 0.0 {
            errors.push("l2 penalties must be >= 0".to_string());
        }
        if self.calibration.max_iter == 0 || self.stacking.max_iter == 0 {
            errors.push("max_iter must be > 0".to_string());
        }
        if self.stacking.max_regime_columns > 10 {
            errors.push("max_regime_columns must be <= 10".to_string());
        }
        if !(0.0..0.5).contains(&self.stacking.meta_holdout_fraction) {
            errors.push("meta_holdout_fraction must be in [0, 0.5)".to_string());
        }

        // Gate
        if self.gate.thresholds.is_empty() {
            errors.push("at least one gate threshold is required".to_string());
        }
        if self.gate.thresholds.iter().any(|&t| !(0.5..1.0).contains(&t)) {
            errors.push("gate thresholds must be in [0.5, 1)".to_string());
        }
        if self.gate.thresholds.windows(2).any(|w| w[0] >= w[1]) {
            errors.push("gate thresholds must be strictly ascending".to_string());
        }
        if !(0.0..=1.0).contains(&self.gate.min_coverage) {
            errors.push("min_coverage must be between 0 and 1".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    /// Raw target column; label = target > 0
    pub target_column: String,
    /// Reduced feature list; `None` uses every non-target column
    pub feature_columns: Option<Vec<String>>,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            target_column: "target".to_string(),
            feature_columns: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FoldSettings {
    pub n_folds: usize,
    /// Rows skipped between the end of training and the start of validation
    pub embargo: usize,
    /// Completed folds required for the run to proceed
    pub min_folds: usize,
}

impl Default for FoldSettings {
    fn default() -> Self {
        Self {
            n_folds: 5,
            embargo: 30,
            min_folds: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    pub min_train_rows: usize,
    pub min_validation_rows: usize,
    /// Explicit learner list; empty means the profile preset
    pub learners: Vec<LearnerSpec>,
}

impl PoolSettings {
    pub fn admits(&self, fold: &Fold) -> bool {
        fold_admitted(fold, self.min_train_rows, self.min_validation_rows)
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            min_train_rows: 1000,
            min_validation_rows: 100,
            learners: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OofSettings {
    pub min_eligible_rows: usize,
}

impl Default for OofSettings {
    fn default() -> Self {
        Self { min_eligible_rows: 500 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationSettings {
    /// Ridge penalty on the Platt slope
    pub l2: f64,
    pub max_iter: usize,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            l2: 1e-2,
            max_iter: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackingSettings {
    pub l2: f64,
    pub max_iter: usize,
    pub max_regime_columns: usize,
    /// Chronological tail share used to score a second, head-only combiner.
    /// 0 disables the holdout.
    pub meta_holdout_fraction: f64,
}

impl Default for StackingSettings {
    fn default() -> Self {
        Self {
            l2: 1.0,
            max_iter: 100,
            max_regime_columns: 10,
            meta_holdout_fraction: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateSettings {
    pub thresholds: Vec<f64>,
    pub min_coverage: f64,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            thresholds: vec![0.55, 0.60, 0.65, 0.70],
            min_coverage: 0.20,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.learner_specs().len(), 4);
    }

    #[test]
    fn test_validate_collects_every_error() {
        let mut config = EngineConfig::default();
        config.folds.n_folds = 0;
        config.gate.thresholds = vec![0.7, 0.6];
        config.stacking.meta_holdout_fraction = 0.5;
        let errors = config.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("n_folds")));
        assert!(errors.iter().any(|e| e.contains("ascending")));
        assert!(errors.iter().any(|e| e.contains("meta_holdout_fraction")));
    }

    #[test]
    fn test_duplicate_learner_ids_rejected() {
        let mut config = EngineConfig::default();
        config.pool.learners = vec![
            LearnerSpec::Constant {
                id: "a".into(),
                probability: 0.5,
            },
            LearnerSpec::Constant {
                id: "a".into(),
                probability: 0.4,
            },
        ];
        let errors = config.validate().unwrap_err();
        assert_eq!(errors, vec!["duplicate learner id 'a'".to_string()]);
    }

    #[test]
    fn test_explicit_learners_shadow_profile() {
        let mut config = EngineConfig::default();
        assert!(config.apply_profile(EngineProfile::Fast));
        assert_eq!(config.learner_specs(), EngineProfile::Fast.learners());

        config.pool.learners = vec![LearnerSpec::Constant {
            id: "flat".into(),
            probability: 0.5,
        }];
        assert!(!config.apply_profile(EngineProfile::Standard));
        assert_eq!(config.profile, EngineProfile::Standard);
        assert_eq!(config.learner_specs().len(), 1);
    }

    #[test]
    fn test_pool_settings_admit_like_the_pool() {
        let settings = PoolSettings::default();
        let pool = crate::ml::pool::BaseLearnerPool::from_specs(&[], &settings).unwrap();
        for fold in crate::ml::folds::generate_folds(2_400, 5, 30).unwrap() {
            assert_eq!(settings.admits(&fold), pool.admits(&fold));
        }
        let edge = Fold {
            fold_id: 0,
            train_end: 1_000,
            validation_start: 1_000,
            validation_end: 1_100,
        };
        assert!(settings.admits(&edge));
        let short = Fold {
            validation_end: 1_099,
            ..edge
        };
        assert!(!settings.admits(&short));
    }

    #[test]
    fn test_resolved_writes_out_preset() {
        let config = EngineConfig::for_profile(EngineProfile::Fast);
        assert!(config.pool.learners.is_empty());
        let resolved = config.resolved();
        assert_eq!(resolved.pool.learners, EngineProfile::Fast.learners());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            [folds]
            embargo = 10

            [gate]
            thresholds = [0.6, 0.8]
            "#,
        )
        .unwrap();
        assert_eq!(config.folds.embargo, 10);
        assert_eq!(config.folds.n_folds, 5);
        assert_eq!(config.gate.min_coverage, 0.20);
        assert_eq!(config.oof.min_eligible_rows, 500);
    }
}
