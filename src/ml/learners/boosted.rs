use ndarray::{Array2, Axis};
use rand::seq::index;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::tree::{BinMapper, RegressionTree, TreeInput, TreeParams};
use super::{check_rows, ensure_two_classes, BinaryClassifier, FittedClassifier, LearnerError};
use crate::ml::logistic::{clamp_probability, logit, sigmoid};

/// Gradient-boosted trees on the logistic loss
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostingParams {
    /// Number of boosting rounds (trees)
    pub n_estimators: usize,
    /// Shrinkage applied to every tree
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// L2 penalty on leaf weights
    pub l2_leaf: f64,
    /// Row fraction sampled (without replacement) per round
    pub subsample: f64,
    /// Feature fraction sampled per round
    pub colsample: f64,
    pub max_bins: usize,
    pub seed: u64,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 120,
            learning_rate: 0.05,
            max_depth: 3,
            min_samples_leaf: 20,
            l2_leaf: 1.0,
            subsample: 0.8,
            colsample: 0.8,
            max_bins: 64,
            seed: 42,
        }
    }
}

impl BoostingParams {
    pub fn validate(&self, id: &str) -> Vec<String> {
        let mut errors = Vec::new();
        if self.n_estimators == 0 {
            errors.push(format!("{}: n_estimators must be > 0", id));
        }
        if self.learning_rate <= 0.0 || self.learning_rate > 1.0 {
            errors.push(format!("{}: learning_rate must be in (0, 1]", id));
        }
        if self.max_depth == 0 {
            errors.push(format!("{}: max_depth must be > 0", id));
        }
        if self.subsample <= 0.0 || self.subsample > 1.0 {
            errors.push(format!("{}: subsample must be in (0, 1]", id));
        }
        if self.colsample <= 0.0 || self.colsample > 1.0 {
            errors.push(format!("{}: colsample must be in (0, 1]", id));
        }
        if self.l2_leaf < 0.0 {
            errors.push(format!("{}: l2_leaf must be >= 0", id));
        }
        if !(2..=255).contains(&self.max_bins) {
            errors.push(format!("{}: max_bins must be between 2 and 255", id));
        }
        errors
    }
}

pub struct GradientBoosting {
    id: String,
    params: BoostingParams,
}

impl GradientBoosting {
    pub fn new(id: &str, params: BoostingParams) -> Self {
        Self {
            id: id.to_string(),
            params,
        }
    }
}

impl BinaryClassifier for GradientBoosting {
    fn id(&self) -> &str {
        &self.id
    }

    fn fit(&self, x: &Array2<f64>, y: &[bool]) -> Result<Box<dyn FittedClassifier>, LearnerError> {
        check_rows(x, y)?;
        let positives = ensure_two_classes(y)?;
        let p = &self.params;
        let n = x.nrows();
        let n_features = x.ncols();

        let mapper = BinMapper::fit(x, p.max_bins);
        let binned = mapper.transform(x);
        let labels: Vec<f64> = y.iter().map(|&l| if l { 1.0 } else { 0.0 }).collect();

        let base_score = logit(positives as f64 / n as f64);
        let mut raw = vec![base_score; binned.n_rows()];
        let mut grad = vec![0.0; n];
        let mut hess = vec![0.0; n];
        let mut rng = ChaCha8Rng::seed_from_u64(p.seed);

        let row_count = ((n as f64 * p.subsample).round() as usize).clamp(1, n);
        let feature_count = ((n_features as f64 * p.colsample).ceil() as usize).clamp(1, n_features.max(1));
        let tree_params = TreeParams {
            max_depth: p.max_depth,
            min_samples_leaf: p.min_samples_leaf,
            lambda: p.l2_leaf,
            max_features: None,
        };

        let mut trees = Vec::with_capacity(p.n_estimators);
        for _ in 0..p.n_estimators {
            for i in 0..n {
                let prob = sigmoid(raw[i]);
                grad[i] = prob - labels[i];
                hess[i] = (prob * (1.0 - prob)).max(1e-6);
            }

            let rows: Vec<usize> = if row_count < n {
                index::sample(&mut rng, n, row_count).into_vec()
            } else {
                (0..n).collect()
            };
            let mut features: Vec<usize> = if feature_count < n_features {
                index::sample(&mut rng, n_features, feature_count).into_vec()
            } else {
                (0..n_features).collect()
            };
            features.sort_unstable();

            let input = TreeInput {
                binned: &binned,
                mapper: &mapper,
                grad: &grad,
                hess: &hess,
                features: &features,
            };
            let tree = RegressionTree::fit(&input, rows, &tree_params, &mut rng);
            for (i, r) in raw.iter_mut().enumerate() {
                *r += p.learning_rate * tree.predict_binned(&binned, i);
            }
            trees.push(tree);
        }

        let train_loss = raw
            .iter()
            .zip(&labels)
            .map(|(&z, &yi)| {
                let prob = clamp_probability(sigmoid(z));
                -(yi * prob.ln() + (1.0 - yi) * (1.0 - prob).ln())
            })
            .sum::<f64>()
            / n as f64;
        debug!(
            "{}: boosted {} trees on {} rows x {} features, train log loss {:.4}",
            self.id,
            trees.len(),
            n,
            n_features,
            train_loss
        );

        Ok(Box::new(BoostedModel {
            base_score,
            learning_rate: p.learning_rate,
            trees,
        }))
    }
}

struct BoostedModel {
    base_score: f64,
    learning_rate: f64,
    trees: Vec<RegressionTree>,
}

impl FittedClassifier for BoostedModel {
    fn predict_proba(&self, x: &Array2<f64>) -> Vec<f64> {
        x.axis_iter(Axis(0))
            .map(|row| {
                let z = self.base_score
                    + self.learning_rate * self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>();
                clamp_probability(sigmoid(z))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic::{generate, SyntheticKind};
    use crate::ml::metrics::{accuracy, roc_auc};

    fn small_params() -> BoostingParams {
        BoostingParams {
            n_estimators: 30,
            learning_rate: 0.2,
            ..BoostingParams::default()
        }
    }

    #[test]
    fn test_learns_separable_signal() {
        let ds = generate(1_500, 5, SyntheticKind::Separable, 3).unwrap();
        let x = ds.feature_rows(0..1_000);
        let y = ds.label_rows(0..1_000);
        let model = GradientBoosting::new("gbm", small_params()).fit(&x, &y).unwrap();

        let probs = model.predict_proba(&ds.feature_rows(1_000..1_500));
        let labels = ds.label_rows(1_000..1_500);
        assert!(accuracy(&probs, &labels) > 0.95);
        assert!(roc_auc(&probs, &labels).unwrap() > 0.98);
        assert!(probs.iter().all(|&p| p > 0.0 && p < 1.0));
    }

    #[test]
    fn test_single_class_is_degenerate() {
        let x = Array2::zeros((50, 2));
        let err = GradientBoosting::new("gbm", small_params()).fit(&x, &[true; 50]).err().unwrap();
        assert!(err.is_degenerate_labels());
    }

    #[test]
    fn test_same_seed_same_predictions() {
        let ds = generate(600, 4, SyntheticKind::Noise, 9).unwrap();
        let x = ds.feature_rows(0..500);
        let y = ds.label_rows(0..500);
        let learner = GradientBoosting::new("gbm", small_params());
        let a = learner.fit(&x, &y).unwrap().predict_proba(&ds.feature_rows(500..600));
        let b = learner.fit(&x, &y).unwrap().predict_proba(&ds.feature_rows(500..600));
        assert_eq!(a, b);
    }

    #[test]
    fn test_validate_catches_bad_params() {
        let params = BoostingParams {
            learning_rate: 0.0,
            subsample: 1.5,
            max_bins: 1,
            ..BoostingParams::default()
        };
        assert_eq!(params.validate("gbm").len(), 3);
    }
}
