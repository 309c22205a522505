use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::learners::LearnerError;

/// Smallest and largest probability the engine ever emits
pub const PROB_EPS: f64 = 1e-6;

/// Solver settings for L2-regularised logistic regression
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogisticOptions {
    /// Ridge penalty on coefficients (not the intercept), applied to the summed log loss
    pub l2: f64,
    pub max_iter: usize,
    /// Relative loss change that counts as converged
    pub tol: f64,
    /// Z-score features before fitting; constant columns are zeroed
    pub standardize: bool,
}

impl Default for LogisticOptions {
    fn default() -> Self {
        Self {
            l2: 1.0,
            max_iter: 100,
            tol: 1e-9,
            standardize: true,
        }
    }
}

/// Fitted logistic regression with its normalisation constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    pub feature_means: Vec<f64>,
    /// Zero marks a column that was constant at fit time and is ignored
    pub feature_stds: Vec<f64>,
    pub iterations: usize,
}

impl LogisticRegression {
    /// Newton-Raphson fit with step halving
    pub fn fit(
        features: &Array2<f64>,
        labels: &[bool],
        opts: &LogisticOptions,
    ) -> Result<Self, LearnerError> {
        let n = features.nrows();
        let p = features.ncols();
        if n == 0 {
            return Err(LearnerError::EmptyTrainingSet);
        }
        if labels.len() != n {
            return Err(LearnerError::ShapeMismatch {
                expected: n,
                got: labels.len(),
            });
        }
        let positives = labels.iter().filter(|&&l| l).count();
        if positives == 0 || positives == n {
            return Err(LearnerError::SingleClass { rows: n });
        }

        let (means, stds) = if opts.standardize {
            column_moments(features)
        } else {
            (vec![0.0; p], vec![1.0; p])
        };
        let x = normalize(features, &means, &stds);
        let y: Vec<f64> = labels.iter().map(|&l| if l { 1.0 } else { 0.0 }).collect();

        // theta[0] is the intercept
        let mut theta = Array1::<f64>::zeros(p + 1);
        theta[0] = logit(positives as f64 / n as f64);
        let mut loss = penalized_loss(&x, &y, &theta, opts.l2);
        let mut iterations = 0;

        for iter in 0..opts.max_iter {
            iterations = iter + 1;
            let (grad, hess) = gradient_and_hessian(&x, &y, &theta, opts.l2);
            let step = match solve(hess, grad) {
                Some(step) => step,
                None => {
                    debug!("Logistic fit: singular Hessian at iteration {}", iter);
                    break;
                }
            };

            let mut scale = 1.0;
            let mut accepted = None;
            for _ in 0..30 {
                let candidate = &theta - &(&step * scale);
                let candidate_loss = penalized_loss(&x, &y, &candidate, opts.l2);
                if candidate_loss.is_finite() && candidate_loss <= loss {
                    accepted = Some((candidate, candidate_loss));
                    break;
                }
                scale *= 0.5;
            }

            let Some((next, next_loss)) = accepted else {
                break;
            };
            let improvement = loss - next_loss;
            theta = next;
            loss = next_loss;
            if improvement <= opts.tol * (1.0 + loss.abs()) {
                break;
            }
        }

        debug!(
            "Logistic fit: {} rows, {} features, {} iterations, loss {:.4}",
            n,
            p,
            iterations,
            loss / n as f64
        );

        Ok(Self {
            coefficients: theta.iter().skip(1).copied().collect(),
            intercept: theta[0],
            feature_means: means,
            feature_stds: stds,
            iterations,
        })
    }

    pub fn n_features(&self) -> usize {
        self.coefficients.len()
    }

    pub fn decision(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut z = self.intercept;
        for (j, &v) in row.iter().enumerate() {
            let std = self.feature_stds[j];
            if std > 0.0 {
                z += self.coefficients[j] * (v - self.feature_means[j]) / std;
            }
        }
        z
    }

    pub fn predict_proba(&self, features: &Array2<f64>) -> Vec<f64> {
        features
            .axis_iter(Axis(0))
            .map(|row| clamp_probability(sigmoid(self.decision(row))))
            .collect()
    }
}

pub fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

pub fn logit(p: f64) -> f64 {
    let p = clamp_probability(p);
    (p / (1.0 - p)).ln()
}

/// Clamp into `[PROB_EPS, 1 - PROB_EPS]` so every emitted probability is strictly inside (0, 1)
pub fn clamp_probability(p: f64) -> f64 {
    if p.is_nan() {
        return 0.5;
    }
    p.clamp(PROB_EPS, 1.0 - PROB_EPS)
}

/// Column means and sample standard deviations; near-constant columns get std 0
pub(crate) fn column_moments(features: &Array2<f64>) -> (Vec<f64>, Vec<f64>) {
    let p = features.ncols();
    if features.nrows() == 0 {
        return (vec![0.0; p], vec![0.0; p]);
    }
    let means = features
        .mean_axis(Axis(0))
        .map(|m| m.to_vec())
        .unwrap_or_else(|| vec![0.0; p]);
    let ddof = if features.nrows() > 1 { 1.0 } else { 0.0 };
    let stds = features
        .std_axis(Axis(0), ddof)
        .iter()
        .map(|&s| if s > 1e-10 { s } else { 0.0 })
        .collect();
    (means, stds)
}

pub(crate) fn normalize(features: &Array2<f64>, means: &[f64], stds: &[f64]) -> Array2<f64> {
    let mut x = features.clone();
    for (j, mut col) in x.axis_iter_mut(Axis(1)).enumerate() {
        let std = stds[j];
        if std > 0.0 {
            col.mapv_inplace(|v| (v - means[j]) / std);
        } else {
            col.fill(0.0);
        }
    }
    x
}

fn linear_predictor(x: &Array2<f64>, theta: &Array1<f64>, i: usize) -> f64 {
    let mut z = theta[0];
    for j in 0..x.ncols() {
        z += theta[j + 1] * x[[i, j]];
    }
    z
}

/// Numerically stable ln(1 + e^z)
fn softplus(z: f64) -> f64 {
    if z > 0.0 {
        z + (-z).exp().ln_1p()
    } else {
        z.exp().ln_1p()
    }
}

fn penalized_loss(x: &Array2<f64>, y: &[f64], theta: &Array1<f64>, l2: f64) -> f64 {
    let mut loss = 0.0;
    for (i, &yi) in y.iter().enumerate() {
        let z = linear_predictor(x, theta, i);
        loss += softplus(z) - yi * z;
    }
    let penalty: f64 = theta.iter().skip(1).map(|w| w * w).sum();
    loss + 0.5 * l2 * penalty
}

fn gradient_and_hessian(
    x: &Array2<f64>,
    y: &[f64],
    theta: &Array1<f64>,
    l2: f64,
) -> (Array1<f64>, Array2<f64>) {
    let p = x.ncols();
    let mut grad = Array1::<f64>::zeros(p + 1);
    let mut hess = Array2::<f64>::zeros((p + 1, p + 1));
    let mut row = vec![0.0; p + 1];

    for (i, &yi) in y.iter().enumerate() {
        let prob = sigmoid(linear_predictor(x, theta, i));
        let err = prob - yi;
        let weight = prob * (1.0 - prob);
        row[0] = 1.0;
        for j in 0..p {
            row[j + 1] = x[[i, j]];
        }
        for a in 0..=p {
            grad[a] += err * row[a];
            let wa = weight * row[a];
            for b in a..=p {
                hess[[a, b]] += wa * row[b];
            }
        }
    }

    for a in 0..=p {
        for b in 0..a {
            hess[[a, b]] = hess[[b, a]];
        }
        hess[[a, a]] += 1e-9;
    }
    for j in 1..=p {
        grad[j] += l2 * theta[j];
        hess[[j, j]] += l2;
    }
    (grad, hess)
}

/// Gaussian elimination with partial pivoting; `None` when the system is singular
pub(crate) fn solve(mut a: Array2<f64>, mut b: Array1<f64>) -> Option<Array1<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&r, &s| a[[r, col]].abs().total_cmp(&a[[s, col]].abs()))?;
        if a[[pivot, col]].abs() < 1e-14 {
            return None;
        }
        if pivot != col {
            for k in 0..n {
                a.swap([col, k], [pivot, k]);
            }
            b.swap(col, pivot);
        }
        for r in (col + 1)..n {
            let factor = a[[r, col]] / a[[col, col]];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[[r, k]] -= factor * a[[col, k]];
            }
            b[r] -= factor * b[col];
        }
    }

    let mut x = Array1::<f64>::zeros(n);
    for r in (0..n).rev() {
        let mut acc = b[r];
        for k in (r + 1)..n {
            acc -= a[[r, k]] * x[k];
        }
        x[r] = acc / a[[r, r]];
    }
    if x.iter().all(|v| v.is_finite()) {
        Some(x)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn one_feature(values: &[f64]) -> Array2<f64> {
        Array2::from_shape_vec((values.len(), 1), values.to_vec()).unwrap()
    }

    #[test]
    fn test_sigmoid_logit_inverse() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-12);
        assert!((sigmoid(logit(0.3)) - 0.3).abs() < 1e-9);
        assert_eq!(clamp_probability(1.0), 1.0 - PROB_EPS);
        assert_eq!(clamp_probability(f64::NAN), 0.5);
    }

    #[test]
    fn test_solve_small_system() {
        let a = array![[2.0, 1.0], [1.0, 3.0]];
        let b = array![3.0, 5.0];
        let x = solve(a, b).unwrap();
        assert!((x[0] - 0.8).abs() < 1e-12);
        assert!((x[1] - 1.4).abs() < 1e-12);
        assert!(solve(array![[1.0, 2.0], [2.0, 4.0]], array![1.0, 2.0]).is_none());
    }

    #[test]
    fn test_fit_learns_positive_slope() {
        let xs: Vec<f64> = (0..200).map(|i| i as f64 / 200.0).collect();
        // Noisy but increasing relationship
        let labels: Vec<bool> = xs.iter().enumerate().map(|(i, &x)| x > 0.5 || i % 7 == 0).collect();
        let model = LogisticRegression::fit(&one_feature(&xs), &labels, &LogisticOptions::default()).unwrap();
        assert!(model.coefficients[0] > 0.0);
        let probs = model.predict_proba(&one_feature(&[0.1, 0.9]));
        assert!(probs[1] > probs[0]);
    }

    #[test]
    fn test_constant_column_gets_zero_weight() {
        let x = Array2::from_shape_fn((100, 2), |(i, j)| if j == 0 { i as f64 } else { 0.5 });
        let labels: Vec<bool> = (0..100).map(|i| i % 3 != 0 && i > 20).collect();
        let model = LogisticRegression::fit(&x, &labels, &LogisticOptions::default()).unwrap();
        assert_eq!(model.feature_stds[1], 0.0);
        assert_eq!(model.coefficients[1], 0.0);
    }

    #[test]
    fn test_separable_data_stays_finite() {
        let xs: Vec<f64> = (0..100).map(|i| i as f64).collect();
        let labels: Vec<bool> = xs.iter().map(|&x| x >= 50.0).collect();
        let model = LogisticRegression::fit(&one_feature(&xs), &labels, &LogisticOptions::default()).unwrap();
        assert!(model.intercept.is_finite());
        assert!(model.coefficients[0].is_finite() && model.coefficients[0] > 0.0);
        for p in model.predict_proba(&one_feature(&xs)) {
            assert!(p > 0.0 && p < 1.0);
        }
    }

    #[test]
    fn test_single_class_rejected() {
        let err = LogisticRegression::fit(&one_feature(&[1.0, 2.0]), &[true, true], &LogisticOptions::default())
            .unwrap_err();
        assert!(matches!(err, LearnerError::SingleClass { rows: 2 }));
    }
}
