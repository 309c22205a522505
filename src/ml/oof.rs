use ndarray::Array2;
use tracing::{debug, warn};

use super::pool::FoldOutcome;
use crate::error::{EngineError, EngineResult, Insufficiency};

/// Full-length out-of-fold table: one optional probability per (learner, row),
/// plus the label of every row that some fold validated.
#[derive(Debug, Clone)]
pub struct OofTable {
    n_rows: usize,
    learner_ids: Vec<String>,
    values: Vec<Vec<Option<f64>>>,
    labels: Vec<Option<bool>>,
}

/// Rows where every active learner has an OOF value
#[derive(Debug, Clone, PartialEq)]
pub struct EligibleSet {
    pub rows: Vec<usize>,
    pub labels: Vec<bool>,
    pub learner_ids: Vec<String>,
    /// Raw probabilities, one column per learner in `learner_ids` order
    pub raw: Array2<f64>,
}

impl EligibleSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn raw_column(&self, learner: usize) -> Vec<f64> {
        self.raw.column(learner).to_vec()
    }
}

impl OofTable {
    pub fn new(n_rows: usize, learner_ids: Vec<String>) -> Self {
        let values = vec![vec![None; n_rows]; learner_ids.len()];
        Self {
            n_rows,
            learner_ids,
            values,
            labels: vec![None; n_rows],
        }
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn learner_ids(&self) -> &[String] {
        &self.learner_ids
    }

    /// Write one fold's validation labels and every learner's predictions.
    /// A cell may be written once; a second write is an invariant violation.
    pub fn absorb(&mut self, outcome: &FoldOutcome, validation_labels: &[bool]) -> EngineResult<()> {
        let fold = &outcome.fold;
        let range = fold.validation_range();
        if range.end > self.n_rows || validation_labels.len() != range.len() {
            return Err(EngineError::InvalidData(format!(
                "fold {} validation window {:?} does not fit a {}-row table with {} labels",
                fold.fold_id,
                range,
                self.n_rows,
                validation_labels.len()
            )));
        }

        for (row, &label) in range.clone().zip(validation_labels) {
            match self.labels[row] {
                Some(existing) if existing != label => {
                    return Err(EngineError::OofConflict(format!(
                        "row {} relabelled by fold {}",
                        row, fold.fold_id
                    )));
                }
                _ => self.labels[row] = Some(label),
            }
        }

        for result in &outcome.results {
            let learner = self
                .learner_ids
                .iter()
                .position(|id| *id == result.learner_id)
                .ok_or_else(|| EngineError::OofConflict(format!("unknown learner '{}'", result.learner_id)))?;
            if result.oof_probabilities.len() != range.len() {
                return Err(EngineError::OofConflict(format!(
                    "{} returned {} predictions for {} validation rows in fold {}",
                    result.learner_id,
                    result.oof_probabilities.len(),
                    range.len(),
                    fold.fold_id
                )));
            }
            let column = &mut self.values[learner];
            for (row, &p) in range.clone().zip(&result.oof_probabilities) {
                if column[row].is_some() {
                    return Err(EngineError::OofConflict(format!(
                        "second write to ({}, row {}) from fold {}",
                        result.learner_id, row, fold.fold_id
                    )));
                }
                column[row] = Some(p);
            }
        }
        debug!(
            "Fold {}: absorbed {} learners over rows {:?}",
            fold.fold_id,
            outcome.results.len(),
            range
        );
        Ok(())
    }

    /// Rows with a value, per learner
    pub fn coverage(&self) -> Vec<(String, usize)> {
        self.learner_ids
            .iter()
            .zip(&self.values)
            .map(|(id, column)| (id.clone(), column.iter().filter(|v| v.is_some()).count()))
            .collect()
    }

    /// Drop learners that never produced a prediction, returning their ids
    pub fn prune_uncovered(&mut self) -> Vec<String> {
        let mut dropped = Vec::new();
        let mut kept_ids = Vec::new();
        let mut kept_values = Vec::new();
        for (id, column) in self.learner_ids.drain(..).zip(self.values.drain(..)) {
            if column.iter().any(|v| v.is_some()) {
                kept_ids.push(id);
                kept_values.push(column);
            } else {
                warn!("Learner {} produced no OOF predictions and is dropped", id);
                dropped.push(id);
            }
        }
        self.learner_ids = kept_ids;
        self.values = kept_values;
        dropped
    }

    /// Coverage-eligible rows in chronological order. Fails when no learner
    /// remains or fewer than `min_rows` rows qualify.
    pub fn eligible(&self, min_rows: usize) -> EngineResult<EligibleSet> {
        if self.learner_ids.is_empty() {
            return Err(Insufficiency::NoActiveLearners.into());
        }

        let rows: Vec<usize> = (0..self.n_rows)
            .filter(|&row| self.labels[row].is_some() && self.values.iter().all(|column| column[row].is_some()))
            .collect();
        if rows.len() < min_rows {
            return Err(Insufficiency::InsufficientOofSamples {
                eligible: rows.len(),
                required: min_rows,
            }
            .into());
        }

        let labels = rows.iter().filter_map(|&row| self.labels[row]).collect();
        let mut raw = Array2::zeros((rows.len(), self.learner_ids.len()));
        for (j, column) in self.values.iter().enumerate() {
            for (i, &row) in rows.iter().enumerate() {
                raw[[i, j]] = column[row].unwrap_or(f64::NAN);
            }
        }

        Ok(EligibleSet {
            rows,
            labels,
            learner_ids: self.learner_ids.clone(),
            raw,
        })
    }
}
