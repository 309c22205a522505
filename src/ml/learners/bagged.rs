use ndarray::{Array2, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::tree::{BinMapper, RegressionTree, TreeInput, TreeParams};
use super::{check_rows, ensure_two_classes, BinaryClassifier, FittedClassifier, LearnerError};
use crate::ml::logistic::clamp_probability;

/// Bootstrap-aggregated probability trees (random forest style)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaggingParams {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Features tried per split; defaults to sqrt(n_features)
    pub max_features: Option<usize>,
    /// Bootstrap sample size as a fraction of the training rows
    pub sample_fraction: f64,
    pub max_bins: usize,
    pub seed: u64,
}

impl Default for BaggingParams {
    fn default() -> Self {
        Self {
            n_trees: 60,
            max_depth: 8,
            min_samples_leaf: 20,
            max_features: None,
            sample_fraction: 1.0,
            max_bins: 64,
            seed: 7,
        }
    }
}

impl BaggingParams {
    pub fn validate(&self, id: &str) -> Vec<String> {
        let mut errors = Vec::new();
        if self.n_trees == 0 {
            errors.push(format!("{}: n_trees must be > 0", id));
        }
        if self.max_depth == 0 {
            errors.push(format!("{}: max_depth must be > 0", id));
        }
        if self.max_features == Some(0) {
            errors.push(format!("{}: max_features must be > 0 when set", id));
        }
        if self.sample_fraction <= 0.0 || self.sample_fraction > 1.0 {
            errors.push(format!("{}: sample_fraction must be in (0, 1]", id));
        }
        if !(2..=255).contains(&self.max_bins) {
            errors.push(format!("{}: max_bins must be between 2 and 255", id));
        }
        errors
    }
}

pub struct BaggedTrees {
    id: String,
    params: BaggingParams,
}

impl BaggedTrees {
    pub fn new(id: &str, params: BaggingParams) -> Self {
        Self {
            id: id.to_string(),
            params,
        }
    }
}

impl BinaryClassifier for BaggedTrees {
    fn id(&self) -> &str {
        &self.id
    }

    fn fit(&self, x: &Array2<f64>, y: &[bool]) -> Result<Box<dyn FittedClassifier>, LearnerError> {
        check_rows(x, y)?;
        ensure_two_classes(y)?;
        let p = &self.params;
        let n = x.nrows();
        let n_features = x.ncols();

        let mapper = BinMapper::fit(x, p.max_bins);
        let binned = mapper.transform(x);
        // Mean-label leaves: g = -y, h = 1, lambda = 0
        let grad: Vec<f64> = y.iter().map(|&l| if l { -1.0 } else { 0.0 }).collect();
        let hess = vec![1.0; n];
        let features: Vec<usize> = (0..n_features).collect();

        let sample_size = ((n as f64 * p.sample_fraction).round() as usize).max(1);
        let max_features = p
            .max_features
            .unwrap_or_else(|| (n_features as f64).sqrt().ceil() as usize)
            .clamp(1, n_features.max(1));
        let tree_params = TreeParams {
            max_depth: p.max_depth,
            min_samples_leaf: p.min_samples_leaf,
            lambda: 0.0,
            max_features: Some(max_features),
        };

        let trees: Vec<RegressionTree> = (0..p.n_trees)
            .into_par_iter()
            .map(|t| {
                let mut rng = ChaCha8Rng::seed_from_u64(p.seed.wrapping_add(t as u64));
                let rows: Vec<usize> = (0..sample_size).map(|_| rng.gen_range(0..n)).collect();
                let input = TreeInput {
                    binned: &binned,
                    mapper: &mapper,
                    grad: &grad,
                    hess: &hess,
                    features: &features,
                };
                RegressionTree::fit(&input, rows, &tree_params, &mut rng)
            })
            .collect();

        let mean_leaves = trees.iter().map(|t| t.n_leaves()).sum::<usize>() as f64 / trees.len() as f64;
        debug!(
            "{}: bagged {} trees ({} features per split, {:.1} leaves avg) on {} rows",
            self.id,
            trees.len(),
            max_features,
            mean_leaves,
            n
        );

        Ok(Box::new(BaggedModel { trees }))
    }
}

struct BaggedModel {
    trees: Vec<RegressionTree>,
}

impl FittedClassifier for BaggedModel {
    fn predict_proba(&self, x: &Array2<f64>) -> Vec<f64> {
        let n_trees = self.trees.len() as f64;
        x.axis_iter(Axis(0))
            .map(|row| {
                let vote: f64 = self.trees.iter().map(|t| t.predict_row(row)).sum();
                clamp_probability(vote / n_trees)
            })
            .collect()
    }
}
