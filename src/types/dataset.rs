use chrono::{DateTime, Utc};
use ndarray::{s, Array2, ArrayView2, Axis};
use std::ops::Range;

use crate::error::{EngineError, EngineResult};

/// Chronologically ordered feature matrix with a raw target column.
///
/// The binary label of a row is `target > 0`. Construction rejects unsorted or
/// duplicated timestamps, ragged shapes and non-finite values so that every
/// downstream stage can index rows without re-checking.
#[derive(Debug, Clone)]
pub struct Dataset {
    timestamps: Vec<DateTime<Utc>>,
    feature_names: Vec<String>,
    features: Array2<f64>,
    targets: Vec<f64>,
    labels: Vec<bool>,
}

impl Dataset {
    pub fn new(
        timestamps: Vec<DateTime<Utc>>,
        feature_names: Vec<String>,
        features: Array2<f64>,
        targets: Vec<f64>,
    ) -> EngineResult<Self> {
        let n = timestamps.len();
        if features.nrows() != n || targets.len() != n {
            return Err(EngineError::InvalidData(format!(
                "row count mismatch: {} timestamps, {} feature rows, {} targets",
                n,
                features.nrows(),
                targets.len()
            )));
        }
        if feature_names.len() != features.ncols() {
            return Err(EngineError::InvalidData(format!(
                "{} feature names for {} feature columns",
                feature_names.len(),
                features.ncols()
            )));
        }

        for (i, pair) in timestamps.windows(2).enumerate() {
            if pair[1] <= pair[0] {
                return Err(EngineError::InvalidData(format!(
                    "timestamps must be strictly increasing: row {} ({}) follows row {} ({})",
                    i + 1,
                    pair[1],
                    i,
                    pair[0]
                )));
            }
        }

        if let Some(((row, col), _)) = features.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(EngineError::InvalidData(format!(
                "non-finite feature value at row {}, column '{}'",
                row, feature_names[col]
            )));
        }
        if let Some(row) = targets.iter().position(|t| !t.is_finite()) {
            return Err(EngineError::InvalidData(format!("non-finite target at row {}", row)));
        }

        let labels = targets.iter().map(|&t| t > 0.0).collect();

        Ok(Self {
            timestamps,
            feature_names,
            features,
            targets,
            labels,
        })
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn features(&self) -> ArrayView2<'_, f64> {
        self.features.view()
    }

    pub fn targets(&self) -> &[f64] {
        &self.targets
    }

    pub fn labels(&self) -> &[bool] {
        &self.labels
    }

    /// Positive-label share, 0.0 for an empty dataset
    pub fn positive_rate(&self) -> f64 {
        if self.labels.is_empty() {
            return 0.0;
        }
        self.labels.iter().filter(|&&l| l).count() as f64 / self.labels.len() as f64
    }

    /// Copy of a contiguous row range
    pub fn feature_rows(&self, rows: Range<usize>) -> Array2<f64> {
        self.features.slice(s![rows, ..]).to_owned()
    }

    pub fn label_rows(&self, rows: Range<usize>) -> Vec<bool> {
        self.labels[rows].to_vec()
    }

    /// Keep only the named feature columns, in the order given
    pub fn select_columns(&self, names: &[String]) -> EngineResult<Self> {
        if names.is_empty() {
            return Err(EngineError::InvalidData("feature column list is empty".to_string()));
        }
        let mut indices = Vec::with_capacity(names.len());
        for name in names {
            let idx = self
                .feature_names
                .iter()
                .position(|n| n == name)
                .ok_or_else(|| EngineError::InvalidData(format!("unknown feature column '{}'", name)))?;
            if indices.contains(&idx) {
                return Err(EngineError::InvalidData(format!("feature column '{}' listed twice", name)));
            }
            indices.push(idx);
        }

        Ok(Self {
            timestamps: self.timestamps.clone(),
            feature_names: names.to_vec(),
            features: self.features.select(Axis(1), &indices),
            targets: self.targets.clone(),
            labels: self.labels.clone(),
        })
    }
}
