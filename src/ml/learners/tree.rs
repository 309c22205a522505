//! Histogram regression tree shared by the boosted and bagged ensembles.
//!
//! Features are quantised once per fit into at most 255 quantile bins. A tree
//! is grown on per-row gradient/hessian pairs, so the same builder serves
//! Newton boosting (`g = p - y`, `h = p(1-p)`) and probability trees for
//! bagging (`g = -y`, `h = 1`, no leaf penalty, so each leaf holds the mean
//! label of its rows).

use ndarray::{Array2, ArrayView1};
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

/// Per-feature split candidates. A value goes left of edge `e` when `v <= e`.
#[derive(Debug, Clone)]
pub(crate) struct BinMapper {
    edges: Vec<Vec<f64>>,
}

impl BinMapper {
    pub fn fit(x: &Array2<f64>, max_bins: usize) -> Self {
        let max_bins = max_bins.clamp(2, 255);
        let edges = x
            .columns()
            .into_iter()
            .map(|col| {
                let mut sorted = col.to_vec();
                sorted.sort_by(|a, b| a.total_cmp(b));
                feature_edges(&sorted, max_bins)
            })
            .collect();
        Self { edges }
    }

    pub fn n_bins(&self, feature: usize) -> usize {
        self.edges[feature].len() + 1
    }

    pub fn bin(&self, feature: usize, value: f64) -> u8 {
        self.edges[feature].partition_point(|&e| e < value) as u8
    }

    /// Threshold equivalent to "bin <= `bin`"
    pub fn threshold(&self, feature: usize, bin: u8) -> f64 {
        self.edges[feature][bin as usize]
    }

    pub fn transform(&self, x: &Array2<f64>) -> BinnedMatrix {
        let n_rows = x.nrows();
        let n_features = x.ncols();
        let mut bins = vec![0u8; n_rows * n_features];
        for (f, col) in x.columns().into_iter().enumerate() {
            for (i, &v) in col.iter().enumerate() {
                bins[f * n_rows + i] = self.bin(f, v);
            }
        }
        BinnedMatrix { n_rows, bins }
    }
}

fn feature_edges(sorted: &[f64], max_bins: usize) -> Vec<f64> {
    let n = sorted.len();
    let mut distinct: Vec<f64> = sorted.to_vec();
    distinct.dedup();

    if distinct.len() <= max_bins {
        return distinct.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect();
    }

    let mut edges = Vec::with_capacity(max_bins);
    for q in 1..max_bins {
        let v = sorted[q * n / max_bins];
        // Split just above v, halfway to the next distinct value
        let next = distinct.partition_point(|&d| d <= v);
        if next < distinct.len() {
            let edge = 0.5 * (v + distinct[next]);
            if edges.last().map_or(true, |&last| edge > last) {
                edges.push(edge);
            }
        }
    }
    edges
}

/// Column-major bin indices
#[derive(Debug, Clone)]
pub(crate) struct BinnedMatrix {
    n_rows: usize,
    bins: Vec<u8>,
}

impl BinnedMatrix {
    #[inline]
    pub fn get(&self, row: usize, feature: usize) -> u8 {
        self.bins[feature * self.n_rows + row]
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }
}

#[derive(Debug, Clone)]
pub(crate) struct TreeParams {
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// L2 penalty on leaf values
    pub lambda: f64,
    /// Features sampled at every split; `None` considers all candidate features
    pub max_features: Option<usize>,
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        bin: u8,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

struct BestSplit {
    feature: usize,
    bin: u8,
    gain: f64,
}

/// Fit inputs shared by every node of one tree
pub(crate) struct TreeInput<'a> {
    pub binned: &'a BinnedMatrix,
    pub mapper: &'a BinMapper,
    pub grad: &'a [f64],
    pub hess: &'a [f64],
    /// Candidate feature indices for this tree
    pub features: &'a [usize],
}

#[derive(Debug, Clone)]
pub(crate) struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    /// Grow a tree on `rows` (duplicates allowed, e.g. bootstrap samples)
    pub fn fit(input: &TreeInput<'_>, rows: Vec<usize>, params: &TreeParams, rng: &mut ChaCha8Rng) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.grow(input, rows, 0, params, rng);
        tree
    }

    fn grow(
        &mut self,
        input: &TreeInput<'_>,
        rows: Vec<usize>,
        depth: usize,
        params: &TreeParams,
        rng: &mut ChaCha8Rng,
    ) -> usize {
        let (g_sum, h_sum) = rows
            .iter()
            .fold((0.0, 0.0), |(g, h), &i| (g + input.grad[i], h + input.hess[i]));
        let leaf_value = leaf_weight(g_sum, h_sum, params.lambda);
        let idx = self.nodes.len();
        self.nodes.push(Node::Leaf { value: leaf_value });

        if depth >= params.max_depth || rows.len() < 2 * params.min_samples_leaf.max(1) {
            return idx;
        }

        let Some(best) = self.best_split(input, &rows, g_sum, h_sum, params, rng) else {
            return idx;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .iter()
            .partition(|&&i| input.binned.get(i, best.feature) <= best.bin);
        drop(rows);

        let left = self.grow(input, left_rows, depth + 1, params, rng);
        let right = self.grow(input, right_rows, depth + 1, params, rng);
        self.nodes[idx] = Node::Split {
            feature: best.feature,
            bin: best.bin,
            threshold: input.mapper.threshold(best.feature, best.bin),
            left,
            right,
        };
        idx
    }

    fn best_split(
        &self,
        input: &TreeInput<'_>,
        rows: &[usize],
        g_sum: f64,
        h_sum: f64,
        params: &TreeParams,
        rng: &mut ChaCha8Rng,
    ) -> Option<BestSplit> {
        let candidates: Vec<usize> = match params.max_features {
            Some(k) if k < input.features.len() => {
                input.features.choose_multiple(rng, k).copied().collect()
            }
            _ => input.features.to_vec(),
        };

        let parent_score = split_score(g_sum, h_sum, params.lambda);
        let min_leaf = params.min_samples_leaf.max(1);
        let mut best: Option<BestSplit> = None;

        for feature in candidates {
            let n_bins = input.mapper.n_bins(feature);
            if n_bins < 2 {
                continue;
            }
            let mut hist_g = vec![0.0; n_bins];
            let mut hist_h = vec![0.0; n_bins];
            let mut hist_n = vec![0usize; n_bins];
            for &i in rows {
                let b = input.binned.get(i, feature) as usize;
                hist_g[b] += input.grad[i];
                hist_h[b] += input.hess[i];
                hist_n[b] += 1;
            }

            let (mut g_left, mut h_left, mut n_left) = (0.0, 0.0, 0usize);
            for b in 0..n_bins - 1 {
                g_left += hist_g[b];
                h_left += hist_h[b];
                n_left += hist_n[b];
                let n_right = rows.len() - n_left;
                if n_left < min_leaf {
                    continue;
                }
                if n_right < min_leaf {
                    break;
                }
                let gain = split_score(g_left, h_left, params.lambda)
                    + split_score(g_sum - g_left, h_sum - h_left, params.lambda)
                    - parent_score;
                if gain > 1e-12 && best.as_ref().map_or(true, |s| gain > s.gain) {
                    best = Some(BestSplit {
                        feature,
                        bin: b as u8,
                        gain,
                    });
                }
            }
        }
        best
    }

    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    idx = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    /// Same traversal on pre-binned training rows
    pub fn predict_binned(&self, binned: &BinnedMatrix, row: usize) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    bin,
                    left,
                    right,
                    ..
                } => {
                    idx = if binned.get(row, *feature) <= *bin { *left } else { *right };
                }
            }
        }
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| matches!(n, Node::Leaf { .. })).count()
    }
}

fn leaf_weight(g: f64, h: f64, lambda: f64) -> f64 {
    let denom = h + lambda;
    if denom > 1e-12 {
        -g / denom
    } else {
        0.0
    }
}

fn split_score(g: f64, h: f64, lambda: f64) -> f64 {
    let denom = h + lambda;
    if denom > 1e-12 {
        g * g / denom
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::SeedableRng;

    #[test]
    fn test_low_cardinality_edges_are_midpoints() {
        let x = array![[0.0], [1.0], [1.0], [2.0]];
        let mapper = BinMapper::fit(&x, 64);
        assert_eq!(mapper.edges[0], vec![0.5, 1.5]);
        assert_eq!(mapper.bin(0, 0.0), 0);
        assert_eq!(mapper.bin(0, 1.0), 1);
        assert_eq!(mapper.bin(0, 9.0), 2);
    }

    #[test]
    fn test_quantile_edges_are_increasing() {
        let col: Vec<f64> = (0..1000).map(|i| ((i * 37) % 1000) as f64).collect();
        let x = Array2::from_shape_vec((1000, 1), col).unwrap();
        let mapper = BinMapper::fit(&x, 16);
        assert!(mapper.n_bins(0) <= 16);
        assert!(mapper.edges[0].windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_binned_and_raw_traversal_agree() {
        let x = Array2::from_shape_fn((200, 2), |(i, j)| if j == 0 { i as f64 } else { (i % 10) as f64 });
        let y: Vec<f64> = (0..200).map(|i| if i >= 120 { 1.0 } else { 0.0 }).collect();
        let grad: Vec<f64> = y.iter().map(|v| -v).collect();
        let hess = vec![1.0; 200];
        let mapper = BinMapper::fit(&x, 32);
        let binned = mapper.transform(&x);
        let input = TreeInput {
            binned: &binned,
            mapper: &mapper,
            grad: &grad,
            hess: &hess,
            features: &[0, 1],
        };
        let params = TreeParams {
            max_depth: 3,
            min_samples_leaf: 5,
            lambda: 0.0,
            max_features: None,
        };
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let tree = RegressionTree::fit(&input, (0..200).collect(), &params, &mut rng);
        assert!(tree.n_leaves() >= 2);
        for i in 0..200 {
            assert_eq!(tree.predict_row(x.row(i)), tree.predict_binned(&binned, i));
        }
        // Leaves hold mean labels, so the split on feature 0 recovers the step
        assert!(tree.predict_row(x.row(10)) < 0.2);
        assert!(tree.predict_row(x.row(190)) > 0.8);
    }

    #[test]
    fn test_min_samples_leaf_stops_growth() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let grad = vec![-1.0, 0.0, -1.0, 0.0];
        let hess = vec![1.0; 4];
        let mapper = BinMapper::fit(&x, 8);
        let binned = mapper.transform(&x);
        let input = TreeInput {
            binned: &binned,
            mapper: &mapper,
            grad: &grad,
            hess: &hess,
            features: &[0],
        };
        let params = TreeParams {
            max_depth: 5,
            min_samples_leaf: 3,
            lambda: 0.0,
            max_features: None,
        };
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let tree = RegressionTree::fit(&input, (0..4).collect(), &params, &mut rng);
        assert_eq!(tree.n_leaves(), 1);
        assert!((tree.predict_row(x.row(0)) - 0.5).abs() < 1e-12);
    }
}
