use serde::{Deserialize, Serialize};

use crate::ml::learners::{BaggingParams, BoostingParams, ElasticNetParams, LearnerSpec};

/// Learner presets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum EngineProfile {
    /// Two boosted variants, a bagged forest and an elastic net at full size
    #[default]
    Standard,

    /// Same families with far fewer trees, for smoke runs and tests
    Fast,
}

impl EngineProfile {
    pub fn name(&self) -> &str {
        match self {
            Self::Standard => "Standard",
            Self::Fast => "Fast",
        }
    }

    pub fn description(&self) -> &str {
        match self {
            Self::Standard => "Shallow and deep boosted trees, 60-tree bagged forest, elastic-net logistic.",
            Self::Fast => "Reduced tree counts across the same four families.",
        }
    }

    pub fn learners(&self) -> Vec<LearnerSpec> {
        let (shallow_trees, deep_trees, forest_trees) = match self {
            Self::Standard => (120, 80, 60),
            Self::Fast => (25, 15, 12),
        };
        vec![
            LearnerSpec::GradientBoosting {
                id: "gbm_shallow".to_string(),
                params: BoostingParams {
                    n_estimators: shallow_trees,
                    ..BoostingParams::default()
                },
            },
            LearnerSpec::GradientBoosting {
                id: "gbm_deep".to_string(),
                params: BoostingParams {
                    n_estimators: deep_trees,
                    learning_rate: 0.08,
                    max_depth: 5,
                    min_samples_leaf: 40,
                    subsample: 0.7,
                    colsample: 0.6,
                    seed: 43,
                    ..BoostingParams::default()
                },
            },
            LearnerSpec::BaggedTrees {
                id: "bagged_trees".to_string(),
                params: BaggingParams {
                    n_trees: forest_trees,
                    ..BaggingParams::default()
                },
            },
            LearnerSpec::ElasticNet {
                id: "elastic_net".to_string(),
                params: ElasticNetParams::default(),
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profiles_cover_required_families() {
        for profile in [EngineProfile::Standard, EngineProfile::Fast] {
            let learners = profile.learners();
            let boosted = learners.iter().filter(|l| l.family() == "gradient_boosting").count();
            assert_eq!(boosted, 2);
            assert!(learners.iter().any(|l| l.family() == "bagged_trees"));
            assert!(learners.iter().any(|l| l.family() == "elastic_net"));
            assert!(learners.iter().all(|l| l.validate().is_empty()));
        }
    }

    #[test]
    fn test_boosted_variants_differ() {
        let learners = EngineProfile::Standard.learners();
        assert_ne!(learners[0], learners[1]);
    }
}
