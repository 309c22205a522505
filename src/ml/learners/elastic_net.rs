use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{check_rows, ensure_two_classes, BinaryClassifier, FittedClassifier, LearnerError};
use crate::ml::logistic::{column_moments, logit, normalize, sigmoid, LogisticRegression};

/// Elastic-net penalised logistic regression, fit by proximal gradient descent
/// on z-scored features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElasticNetParams {
    /// Overall penalty strength (per-row loss scale)
    pub alpha: f64,
    /// Share of the penalty that is L1; 0 is ridge, 1 is lasso
    pub l1_ratio: f64,
    pub max_iter: usize,
    pub tol: f64,
}

impl Default for ElasticNetParams {
    fn default() -> Self {
        Self {
            alpha: 0.01,
            l1_ratio: 0.5,
            max_iter: 300,
            tol: 1e-6,
        }
    }
}

impl ElasticNetParams {
    pub fn validate(&self, id: &str) -> Vec<String> {
        let mut errors = Vec::new();
        if self.alpha < 0.0 {
            errors.push(format!("{}: alpha must be >= 0", id));
        }
        if !(0.0..=1.0).contains(&self.l1_ratio) {
            errors.push(format!("{}: l1_ratio must be in [0, 1]", id));
        }
        if self.max_iter == 0 {
            errors.push(format!("{}: max_iter must be > 0", id));
        }
        errors
    }
}

pub struct ElasticNet {
    id: String,
    params: ElasticNetParams,
}

impl ElasticNet {
    pub fn new(id: &str, params: ElasticNetParams) -> Self {
        Self {
            id: id.to_string(),
            params,
        }
    }
}

impl BinaryClassifier for ElasticNet {
    fn id(&self) -> &str {
        &self.id
    }

    fn fit(&self, x: &Array2<f64>, y: &[bool]) -> Result<Box<dyn FittedClassifier>, LearnerError> {
        check_rows(x, y)?;
        let positives = ensure_two_classes(y)?;
        let p = &self.params;
        let n = x.nrows() as f64;

        let (means, stds) = column_moments(x);
        let z = normalize(x, &means, &stds);
        let labels: Array1<f64> = y.iter().map(|&l| if l { 1.0 } else { 0.0 }).collect();

        let l1 = p.alpha * p.l1_ratio;
        let l2 = p.alpha * (1.0 - p.l1_ratio);
        // Lipschitz bound of the mean log loss on standardised columns
        let step = 1.0 / (0.25 * (x.ncols() as f64 + 1.0) + l2);

        let mut w = Array1::<f64>::zeros(x.ncols());
        let mut b = logit(positives as f64 / n);
        let mut iterations = 0;

        for iter in 0..p.max_iter {
            iterations = iter + 1;
            let margin = z.dot(&w) + b;
            let residual = margin.mapv(sigmoid) - &labels;
            let grad_w = z.t().dot(&residual) / n + &w * l2;
            let grad_b = residual.sum() / n;

            let mut max_change: f64 = 0.0;
            b -= step * grad_b;
            max_change = max_change.max((step * grad_b).abs());
            for (j, wj) in w.iter_mut().enumerate() {
                let updated = soft_threshold(*wj - step * grad_w[j], step * l1);
                max_change = max_change.max((updated - *wj).abs());
                *wj = updated;
            }
            if max_change < p.tol {
                break;
            }
        }

        let nonzero = w.iter().filter(|v| **v != 0.0).count();
        debug!(
            "{}: elastic net converged in {} iterations, {}/{} non-zero coefficients",
            self.id,
            iterations,
            nonzero,
            w.len()
        );

        Ok(Box::new(ElasticNetModel {
            model: LogisticRegression {
                coefficients: w.to_vec(),
                intercept: b,
                feature_means: means,
                feature_stds: stds,
                iterations,
            },
        }))
    }
}

fn soft_threshold(v: f64, t: f64) -> f64 {
    if v > t {
        v - t
    } else if v < -t {
        v + t
    } else {
        0.0
    }
}

struct ElasticNetModel {
    model: LogisticRegression,
}

impl FittedClassifier for ElasticNetModel {
    fn predict_proba(&self, x: &Array2<f64>) -> Vec<f64> {
        self.model.predict_proba(x)
    }
}
