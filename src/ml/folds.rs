use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::{debug, info};

use crate::error::{EngineResult, Insufficiency};

/// One expanding-window fold: train on `[0, train_end)`, validate on
/// `[validation_start, validation_end)` with `validation_start >= train_end + embargo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fold {
    pub fold_id: usize,
    pub train_end: usize,
    pub validation_start: usize,
    pub validation_end: usize,
}

impl Fold {
    pub fn train_range(&self) -> Range<usize> {
        0..self.train_end
    }

    pub fn validation_range(&self) -> Range<usize> {
        self.validation_start..self.validation_end
    }

    pub fn train_len(&self) -> usize {
        self.train_end
    }

    pub fn validation_len(&self) -> usize {
        self.validation_end - self.validation_start
    }

    /// Rows left out between the end of training and the start of validation
    pub fn embargo_len(&self) -> usize {
        self.validation_start - self.train_end
    }
}

/// Chronological fold plan.
///
/// The series is cut into `n_folds + 1` equal blocks. Fold `i` trains on blocks
/// `0..=i` and validates on block `i + 1` minus the first `embargo` rows; the
/// last fold's validation window runs to the end of the series. Folds whose
/// validation window is empty after the embargo are dropped.
pub fn generate_folds(n_rows: usize, n_folds: usize, embargo: usize) -> EngineResult<Vec<Fold>> {
    let no_folds = Insufficiency::NoUsableFolds { rows: n_rows, n_folds };
    if n_folds == 0 {
        return Err(no_folds.into());
    }

    let block = n_rows / (n_folds + 1);
    if block == 0 {
        return Err(no_folds.into());
    }

    let mut folds = Vec::with_capacity(n_folds);
    for i in 0..n_folds {
        let train_end = (i + 1) * block;
        let validation_start = train_end + embargo;
        let validation_end = if i == n_folds - 1 {
            n_rows
        } else {
            ((i + 2) * block).min(n_rows)
        };

        if validation_start >= validation_end {
            debug!(
                "Fold {}: validation window empty after embargo ({} >= {}), skipping",
                i, validation_start, validation_end
            );
            continue;
        }

        folds.push(Fold {
            fold_id: i,
            train_end,
            validation_start,
            validation_end,
        });
    }

    if folds.is_empty() {
        return Err(no_folds.into());
    }

    info!(
        "Fold plan: {} of {} folds over {} rows (block {}, embargo {})",
        folds.len(),
        n_folds,
        n_rows,
        block,
        embargo
    );
    Ok(folds)
}
