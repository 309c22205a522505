use ndarray::Array2;
use thiserror::Error;

use crate::ml::folds::Fold;
use crate::types::Dataset;

/// Failure of the data-loading collaborator for a single fold
#[derive(Debug, Clone, Error)]
#[error("fetch failed for fold {fold_id}: {message}")]
pub struct FetchError {
    pub fold_id: usize,
    pub message: String,
}

impl FetchError {
    pub fn new(fold_id: usize, message: impl Into<String>) -> Self {
        Self {
            fold_id,
            message: message.into(),
        }
    }
}

/// Train/validation matrices for one fold
#[derive(Debug, Clone)]
pub struct FoldData {
    pub x_train: Array2<f64>,
    pub y_train: Vec<bool>,
    pub x_validation: Array2<f64>,
    pub y_validation: Vec<bool>,
}

impl FoldData {
    /// Shape check against the fold plan; a mismatch is treated like a failed fetch
    pub fn check_shape(&self, fold: &Fold) -> Result<(), FetchError> {
        let expected = [
            ("train rows", fold.train_len(), self.x_train.nrows()),
            ("train labels", fold.train_len(), self.y_train.len()),
            ("validation rows", fold.validation_len(), self.x_validation.nrows()),
            ("validation labels", fold.validation_len(), self.y_validation.len()),
            ("validation columns", self.x_train.ncols(), self.x_validation.ncols()),
        ];
        for (what, want, got) in expected {
            if want != got {
                return Err(FetchError::new(
                    fold.fold_id,
                    format!("{} mismatch: expected {}, got {}", what, want, got),
                ));
            }
        }
        Ok(())
    }
}

/// Supplies per-fold data. Query construction and warehouse access live behind
/// this trait; the engine only ever asks for a fold's rows.
#[cfg_attr(test, mockall::automock)]
pub trait FoldDataSource: Send + Sync {
    /// Total rows in the chronologically ordered series
    fn n_rows(&self) -> usize;

    fn load(&self, fold: &Fold) -> Result<FoldData, FetchError>;
}

/// Serves folds from a dataset already held in memory
pub struct InMemorySource<'a> {
    dataset: &'a Dataset,
}

impl<'a> InMemorySource<'a> {
    pub fn new(dataset: &'a Dataset) -> Self {
        Self { dataset }
    }
}

impl FoldDataSource for InMemorySource<'_> {
    fn n_rows(&self) -> usize {
        self.dataset.len()
    }

    fn load(&self, fold: &Fold) -> Result<FoldData, FetchError> {
        if fold.validation_end > self.dataset.len() {
            return Err(FetchError::new(
                fold.fold_id,
                format!(
                    "validation window ends at {} but dataset has {} rows",
                    fold.validation_end,
                    self.dataset.len()
                ),
            ));
        }

        Ok(FoldData {
            x_train: self.dataset.feature_rows(fold.train_range()),
            y_train: self.dataset.label_rows(fold.train_range()),
            x_validation: self.dataset.feature_rows(fold.validation_range()),
            y_validation: self.dataset.label_rows(fold.validation_range()),
        })
    }
}
