use ndarray::Array2;

use super::{check_rows, BinaryClassifier, FittedClassifier, LearnerError};
use crate::ml::logistic::clamp_probability;

/// Emits the same probability for every row. Useful as a baseline column and
/// for exercising the meta-learner's handling of constant inputs.
pub struct ConstantLearner {
    id: String,
    probability: f64,
}

impl ConstantLearner {
    pub fn new(id: &str, probability: f64) -> Self {
        Self {
            id: id.to_string(),
            probability: clamp_probability(probability),
        }
    }
}

impl BinaryClassifier for ConstantLearner {
    fn id(&self) -> &str {
        &self.id
    }

    fn fit(&self, x: &Array2<f64>, y: &[bool]) -> Result<Box<dyn FittedClassifier>, LearnerError> {
        check_rows(x, y)?;
        if y.is_empty() {
            return Err(LearnerError::EmptyTrainingSet);
        }
        Ok(Box::new(ConstantModel {
            probability: self.probability,
        }))
    }
}

struct ConstantModel {
    probability: f64,
}

impl FittedClassifier for ConstantModel {
    fn predict_proba(&self, x: &Array2<f64>) -> Vec<f64> {
        vec![self.probability; x.nrows()]
    }
}
