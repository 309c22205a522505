use ndarray::Array2;
use std::collections::HashMap;
use thiserror::Error;

/// Externally supplied low-cardinality columns keyed by original row index
#[derive(Debug, Clone)]
pub struct RegimeFeatures {
    pub row_index: Vec<usize>,
    pub names: Vec<String>,
    pub values: Array2<f64>,
}

/// Reason regime columns could not be used for a run
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AlignmentError {
    #[error("regime table has {index} row indices but {rows} value rows")]
    RaggedTable { index: usize, rows: usize },

    #[error("regime table has {names} names for {columns} columns")]
    NameMismatch { names: usize, columns: usize },

    #[error("row {0} appears more than once in the regime table")]
    DuplicateRow(usize),

    #[error("{missing} of {eligible} eligible rows have no regime values (first: row {first})")]
    MissingRows { missing: usize, eligible: usize, first: usize },

    #[error("non-finite regime value at row {row}, column '{column}'")]
    NonFinite { row: usize, column: String },
}

impl RegimeFeatures {
    pub fn n_columns(&self) -> usize {
        self.values.ncols()
    }

    /// Matrix whose i-th row holds the regime values of `eligible_rows[i]`.
    ///
    /// Alignment is all-or-nothing: a duplicate index, a missing eligible row or
    /// a non-finite value rejects the whole table. Rows outside the eligible set
    /// are ignored.
    pub fn align(&self, eligible_rows: &[usize]) -> Result<Array2<f64>, AlignmentError> {
        if self.row_index.len() != self.values.nrows() {
            return Err(AlignmentError::RaggedTable {
                index: self.row_index.len(),
                rows: self.values.nrows(),
            });
        }
        if self.names.len() != self.values.ncols() {
            return Err(AlignmentError::NameMismatch {
                names: self.names.len(),
                columns: self.values.ncols(),
            });
        }

        let mut position: HashMap<usize, usize> = HashMap::with_capacity(self.row_index.len());
        for (pos, &row) in self.row_index.iter().enumerate() {
            if position.insert(row, pos).is_some() {
                return Err(AlignmentError::DuplicateRow(row));
            }
        }

        let missing: Vec<usize> = eligible_rows
            .iter()
            .copied()
            .filter(|row| !position.contains_key(row))
            .collect();
        if let Some(&first) = missing.first() {
            return Err(AlignmentError::MissingRows {
                missing: missing.len(),
                eligible: eligible_rows.len(),
                first,
            });
        }

        let mut aligned = Array2::zeros((eligible_rows.len(), self.values.ncols()));
        for (i, row) in eligible_rows.iter().enumerate() {
            let src = position[row];
            for j in 0..self.values.ncols() {
                let v = self.values[[src, j]];
                if !v.is_finite() {
                    return Err(AlignmentError::NonFinite {
                        row: *row,
                        column: self.names[j].clone(),
                    });
                }
                aligned[[i, j]] = v;
            }
        }
        Ok(aligned)
    }

    /// Keep the first `max_columns` columns, returning the names that were cut
    pub fn truncated(&self, max_columns: usize) -> (RegimeFeatures, Vec<String>) {
        if self.n_columns() <= max_columns {
            return (self.clone(), Vec::new());
        }
        let kept = RegimeFeatures {
            row_index: self.row_index.clone(),
            names: self.names[..max_columns].to_vec(),
            values: self.values.slice(ndarray::s![.., ..max_columns]).to_owned(),
        };
        (kept, self.names[max_columns..].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn table() -> RegimeFeatures {
        RegimeFeatures {
            row_index: vec![4, 2, 3],
            names: vec!["bucket".into(), "flag".into()],
            values: array![[4.0, 0.0], [2.0, 1.0], [3.0, 0.0]],
        }
    }

    #[test]
    fn test_align_reorders_by_row_index() {
        let aligned = table().align(&[2, 3, 4]).unwrap();
        assert_eq!(aligned.column(0).to_vec(), vec![2.0, 3.0, 4.0]);
        assert_eq!(aligned[[0, 1]], 1.0);
    }

    #[test]
    fn test_align_ignores_rows_outside_eligible_set() {
        let aligned = table().align(&[3]).unwrap();
        assert_eq!(aligned.nrows(), 1);
        assert_eq!(aligned[[0, 0]], 3.0);
    }

    #[test]
    fn test_missing_row_rejects_table() {
        let err = table().align(&[2, 3, 9]).unwrap_err();
        assert_eq!(
            err,
            AlignmentError::MissingRows {
                missing: 1,
                eligible: 3,
                first: 9
            }
        );
    }

    #[test]
    fn test_duplicate_row_rejects_table() {
        let mut t = table();
        t.row_index = vec![2, 2, 3];
        assert_eq!(t.align(&[2, 3]).unwrap_err(), AlignmentError::DuplicateRow(2));
    }

    #[test]
    fn test_non_finite_value_rejects_table() {
        let mut t = table();
        t.values[[1, 1]] = f64::NAN;
        assert!(matches!(t.align(&[2]), Err(AlignmentError::NonFinite { row: 2, .. })));
    }

    #[test]
    fn test_truncate_caps_columns() {
        let (kept, dropped) = table().truncated(1);
        assert_eq!(kept.names, vec!["bucket".to_string()]);
        assert_eq!(kept.values.ncols(), 1);
        assert_eq!(dropped, vec!["flag".to_string()]);
    }
}
