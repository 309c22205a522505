use chrono::{DateTime, TimeZone, Utc};
use ndarray::Array2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

use super::regime::RegimeFeatures;
use crate::error::{EngineError, EngineResult};
use crate::types::Dataset;

const BASE_EPOCH_SECS: i64 = 1_577_836_800; // 2020-01-01T00:00:00Z

/// Shape of the synthetic target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum SyntheticKind {
    /// Target is independent standard-normal noise; no learnable signal
    Noise,
    /// Target equals feature_0, so the label is `feature_0 > 0` exactly
    Separable,
}

/// Seeded hourly series of standard-normal features
pub fn generate(
    rows: usize,
    n_features: usize,
    kind: SyntheticKind,
    seed: u64,
) -> EngineResult<Dataset> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let features: Array2<f64> = Array2::from_shape_simple_fn((rows, n_features), || {
        StandardNormal.sample(&mut rng)
    });
    let targets: Vec<f64> = match kind {
        SyntheticKind::Noise => (0..rows).map(|_| StandardNormal.sample(&mut rng)).collect(),
        SyntheticKind::Separable => features.column(0).to_vec(),
    };

    let timestamps = hourly_timestamps(rows)?;
    let feature_names = (0..n_features).map(|j| format!("feature_{}", j)).collect();

    Dataset::new(timestamps, feature_names, features, targets)
}

/// Low-cardinality regime columns (0/1/2 bucket plus a volatility flag) for every row
pub fn generate_regime(rows: usize, seed: u64) -> RegimeFeatures {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut values = Array2::zeros((rows, 2));
    for i in 0..rows {
        values[[i, 0]] = rng.gen_range(0..3) as f64;
        values[[i, 1]] = if rng.gen_bool(0.3) { 1.0 } else { 0.0 };
    }
    RegimeFeatures {
        row_index: (0..rows).collect(),
        names: vec!["trend_bucket".to_string(), "high_vol".to_string()],
        values,
    }
}

fn hourly_timestamps(rows: usize) -> EngineResult<Vec<DateTime<Utc>>> {
    (0..rows)
        .map(|i| {
            Utc.timestamp_opt(BASE_EPOCH_SECS + i as i64 * 3600, 0)
                .single()
                .ok_or_else(|| EngineError::InvalidData(format!("hour offset {} out of range", i)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_separable_labels_match_first_feature() {
        let ds = generate(500, 4, SyntheticKind::Separable, 11).unwrap();
        for (i, &label) in ds.labels().iter().enumerate() {
            assert_eq!(label, ds.features()[[i, 0]] > 0.0);
        }
    }

    #[test]
    fn test_seed_reproducibility() {
        let a = generate(200, 3, SyntheticKind::Noise, 5).unwrap();
        let b = generate(200, 3, SyntheticKind::Noise, 5).unwrap();
        assert_eq!(a.features(), b.features());
        assert_eq!(a.targets(), b.targets());
    }

    #[test]
    fn test_noise_is_balanced() {
        let ds = generate(5_000, 2, SyntheticKind::Noise, 3).unwrap();
        assert!((ds.positive_rate() - 0.5).abs() < 0.05);
    }

    #[test]
    fn test_regime_covers_all_rows() {
        let regime = generate_regime(100, 9);
        assert_eq!(regime.row_index.len(), 100);
        assert_eq!(regime.values.ncols(), regime.names.len());
        assert!(regime.values.column(0).iter().all(|&v| v == 0.0 || v == 1.0 || v == 2.0));
    }
}
