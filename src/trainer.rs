//! # Model Training
//!
//! Fits a binary match/non-match classifier on the training similarity
//! matrix. The learning algorithm is a black box behind the `Classifier`
//! trait; the built-in implementation is deterministic logistic regression.

use crate::error::LinkageError;
use crate::split::TrainingSet;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// A binary classifier over similarity feature rows.
pub trait Classifier {
    fn fit(&mut self, matrix: &[Vec<f64>], labels: &[bool]) -> Result<(), LinkageError>;

    /// Match probability for a feature row.
    fn predict_score(&self, row: &[f64]) -> f64;

    fn predict(&self, row: &[f64]) -> bool {
        self.predict_score(row) >= 0.5
    }
}

/// Logistic regression trained with full-batch gradient descent.
///
/// Deterministic: fixed epoch count, zero-initialized weights, no random
/// state of its own. The training rows are already shuffled by the splitter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearClassifier {
    weights: Vec<f64>,
    bias: f64,
    learning_rate: f64,
    epochs: usize,
}

impl Default for LinearClassifier {
    fn default() -> Self {
        Self::new(0.1, 200)
    }
}

impl LinearClassifier {
    pub fn new(learning_rate: f64, epochs: usize) -> Self {
        Self {
            weights: Vec::new(),
            bias: 0.0,
            learning_rate,
            epochs,
        }
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Persist the fitted model as a JSON artifact.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let encoded = serde_json::to_string_pretty(self)
            .context("failed to serialize classifier")?;
        std::fs::write(path, encoded)
            .with_context(|| format!("failed to write model to {}", path.display()))?;
        info!(path = %path.display(), "model persisted");
        Ok(())
    }

    /// Load a previously persisted model.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let encoded = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read model from {}", path.display()))?;
        serde_json::from_str(&encoded).context("failed to deserialize classifier")
    }

    fn sigmoid(z: f64) -> f64 {
        1.0 / (1.0 + (-z).exp())
    }
}

impl Classifier for LinearClassifier {
    fn fit(&mut self, matrix: &[Vec<f64>], labels: &[bool]) -> Result<(), LinkageError> {
        if matrix.is_empty() {
            return Err(LinkageError::InsufficientTrainingData(
                "training matrix is empty".to_string(),
            ));
        }
        if matrix.len() != labels.len() {
            return Err(LinkageError::Configuration(format!(
                "matrix has {} rows but {} labels",
                matrix.len(),
                labels.len()
            )));
        }

        let dims = matrix[0].len();
        self.weights = vec![0.0; dims];
        self.bias = 0.0;

        for _ in 0..self.epochs {
            let mut weight_grad = vec![0.0; dims];
            let mut bias_grad = 0.0;
            for (row, &label) in matrix.iter().zip(labels) {
                let z = self.bias
                    + row
                        .iter()
                        .zip(&self.weights)
                        .map(|(x, w)| x * w)
                        .sum::<f64>();
                let error = Self::sigmoid(z) - if label { 1.0 } else { 0.0 };
                for (grad, x) in weight_grad.iter_mut().zip(row) {
                    *grad += error * x;
                }
                bias_grad += error;
            }
            let step = self.learning_rate / matrix.len() as f64;
            for (w, grad) in self.weights.iter_mut().zip(&weight_grad) {
                *w -= step * grad;
            }
            self.bias -= step * bias_grad;
        }
        Ok(())
    }

    fn predict_score(&self, row: &[f64]) -> f64 {
        let z = self.bias
            + row
                .iter()
                .zip(&self.weights)
                .map(|(x, w)| x * w)
                .sum::<f64>();
        Self::sigmoid(z)
    }
}

/// Fits and validates the classifier against a training set.
#[derive(Debug, Clone, Default)]
pub struct ModelTrainer {
    pub learning_rate: Option<f64>,
    pub epochs: Option<usize>,
}

impl ModelTrainer {
    /// Fit a classifier on the training matrix.
    ///
    /// Fails with `InsufficientTrainingData` when the matrix is empty or
    /// either class has no examples: a binary classifier cannot be fit on
    /// zero examples of a class.
    pub fn fit(&self, training: &TrainingSet) -> Result<LinearClassifier, LinkageError> {
        if training.matrix.is_empty() {
            return Err(LinkageError::InsufficientTrainingData(
                "training matrix is empty".to_string(),
            ));
        }
        if training.true_matches.is_empty() {
            return Err(LinkageError::InsufficientTrainingData(
                "no true-match rows in the train partition".to_string(),
            ));
        }
        if training.labels.iter().all(|&label| label) {
            return Err(LinkageError::InsufficientTrainingData(
                "no non-match rows were sampled".to_string(),
            ));
        }

        let mut model = LinearClassifier::new(
            self.learning_rate.unwrap_or(0.1),
            self.epochs.unwrap_or(200),
        );
        model.fit(&training.matrix, &training.labels)?;
        info!(
            rows = training.matrix.len(),
            positives = training.labels.iter().filter(|&&l| l).count(),
            "classifier fitted"
        );
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CandidatePair, RowPos};

    fn training_set(matrix: Vec<Vec<f64>>, labels: Vec<bool>) -> TrainingSet {
        let pairs = (0..matrix.len() as u32)
            .map(|i| CandidatePair::canonical(RowPos(i), RowPos(i + 100)))
            .collect::<Vec<_>>();
        let true_matches = pairs
            .iter()
            .zip(&labels)
            .filter(|(_, &l)| l)
            .map(|(p, _)| *p)
            .collect();
        TrainingSet {
            pairs,
            matrix,
            labels,
            true_matches,
        }
    }

    #[test]
    fn test_fit_separable_data() {
        let matrix = vec![
            vec![1.0, 0.9],
            vec![0.9, 1.0],
            vec![0.1, 0.0],
            vec![0.0, 0.2],
        ];
        let labels = vec![true, true, false, false];
        let model = ModelTrainer::default().fit(&training_set(matrix, labels)).unwrap();

        assert!(model.predict(&[1.0, 1.0]));
        assert!(!model.predict(&[0.0, 0.0]));
        assert!(model.predict_score(&[1.0, 1.0]) > model.predict_score(&[0.0, 0.0]));
    }

    #[test]
    fn test_empty_matrix_is_insufficient() {
        let err = ModelTrainer::default()
            .fit(&training_set(vec![], vec![]))
            .unwrap_err();
        assert!(matches!(err, LinkageError::InsufficientTrainingData(_)));
    }

    #[test]
    fn test_single_class_is_insufficient() {
        let only_negatives = training_set(vec![vec![0.1], vec![0.2]], vec![false, false]);
        assert!(matches!(
            ModelTrainer::default().fit(&only_negatives),
            Err(LinkageError::InsufficientTrainingData(_))
        ));

        let only_positives = training_set(vec![vec![0.9], vec![0.8]], vec![true, true]);
        assert!(matches!(
            ModelTrainer::default().fit(&only_positives),
            Err(LinkageError::InsufficientTrainingData(_))
        ));
    }

    #[test]
    fn test_persistence_roundtrip() {
        let matrix = vec![vec![1.0], vec![0.0]];
        let labels = vec![true, false];
        let model = ModelTrainer::default().fit(&training_set(matrix, labels)).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        model.save(&path).unwrap();

        let restored = LinearClassifier::load(&path).unwrap();
        assert_eq!(model.weights(), restored.weights());
        assert_eq!(
            model.predict_score(&[0.5]),
            restored.predict_score(&[0.5])
        );
    }
}
