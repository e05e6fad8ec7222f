//! The trainable classification head: multinomial logistic regression over
//! backbone embeddings, fit with minibatch SGD.
//!
//! The head is the only part of the pipeline that is ever retrained. Its
//! label vocabulary is derived from the training set at fit time (sorted
//! distinct labels) and lives only inside the fitted model.

use ndarray::Array1;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// Label reported when the model has no vocabulary to predict from.
pub const UNKNOWN_LABEL: &str = "unknown";

#[derive(Debug, thiserror::Error)]
pub enum FitError {
    #[error("inconsistent embedding dimensions: expected {expected}, got {actual}")]
    DimMismatch { expected: usize, actual: usize },
}

/// Training options for the logistic-regression head.
#[derive(Debug, Clone)]
pub struct TrainOptions {
    pub epochs: usize,
    pub learning_rate: f32,
    pub l2: f32,
    pub batch_size: usize,
    pub seed: u64,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            epochs: 40,
            learning_rate: 0.1,
            l2: 1e-4,
            batch_size: 32,
            seed: 42,
        }
    }
}

/// A fitted multinomial logistic-regression model. Immutable once fit; the
/// engine replaces the whole model on every retrain.
#[derive(Debug, Clone)]
pub struct HeadModel {
    classes: Vec<String>,
    embedding_dim: usize,
    /// Row-major `classes x embedding_dim`.
    weights: Vec<f32>,
    bias: Vec<f32>,
}

impl HeadModel {
    /// The degenerate model produced by fitting an empty training set.
    /// Queryable, but predicts [`UNKNOWN_LABEL`] with zero confidence.
    pub fn empty() -> Self {
        Self {
            classes: Vec::new(),
            embedding_dim: 0,
            weights: Vec::new(),
            bias: Vec::new(),
        }
    }

    /// Label vocabulary in sorted order.
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    pub fn is_degenerate(&self) -> bool {
        self.classes.is_empty()
    }

    /// Fits a fresh head over `(embedding, label)` pairs. An empty input
    /// yields the degenerate model rather than an error.
    pub fn fit(
        examples: &[(Array1<f32>, String)],
        options: &TrainOptions,
    ) -> Result<Self, FitError> {
        if examples.is_empty() {
            return Ok(Self::empty());
        }

        let dim = examples[0].0.len();
        for (embedding, _) in examples {
            if embedding.len() != dim {
                return Err(FitError::DimMismatch {
                    expected: dim,
                    actual: embedding.len(),
                });
            }
        }

        let mut classes: Vec<String> = examples.iter().map(|(_, label)| label.clone()).collect();
        classes.sort();
        classes.dedup();
        let num_classes = classes.len();

        let targets: Vec<usize> = examples
            .iter()
            .map(|(_, label)| {
                classes
                    .binary_search(label)
                    .unwrap_or_default()
            })
            .collect();

        let mut rng = StdRng::seed_from_u64(options.seed);
        let mut weights = vec![0.0f32; num_classes * dim];
        let mut bias = vec![0.0f32; num_classes];
        for w in &mut weights {
            *w = (rng.gen::<f32>() - 0.5) * 0.01;
        }

        let mut indices: Vec<usize> = (0..examples.len()).collect();
        let batch_size = options.batch_size.max(1);
        let lr = options.learning_rate;
        let l2 = options.l2.max(0.0);

        for _epoch in 0..options.epochs {
            indices.shuffle(&mut rng);
            for chunk in indices.chunks(batch_size) {
                let mut grad_w = vec![0.0f32; weights.len()];
                let mut grad_b = vec![0.0f32; bias.len()];
                for &idx in chunk {
                    let embedding = &examples[idx].0;
                    let target = targets[idx];

                    let mut logits = vec![0.0f32; num_classes];
                    for c in 0..num_classes {
                        let base = c * dim;
                        let mut sum = bias[c];
                        for (i, &x) in embedding.iter().enumerate() {
                            sum += weights[base + i] * x;
                        }
                        logits[c] = sum;
                    }
                    let probs = softmax(&logits);
                    for c in 0..num_classes {
                        let diff = probs[c] - if c == target { 1.0 } else { 0.0 };
                        let base = c * dim;
                        for (i, &x) in embedding.iter().enumerate() {
                            grad_w[base + i] += diff * x;
                        }
                        grad_b[c] += diff;
                    }
                }

                let inv = 1.0 / chunk.len() as f32;
                for c in 0..num_classes {
                    let base = c * dim;
                    for i in 0..dim {
                        let idx = base + i;
                        weights[idx] -= lr * (grad_w[idx] * inv + l2 * weights[idx]);
                    }
                    bias[c] -= lr * grad_b[c] * inv;
                }
            }
        }

        Ok(Self {
            classes,
            embedding_dim: dim,
            weights,
            bias,
        })
    }

    /// Class probabilities for a single embedding, in vocabulary order.
    /// Empty when the model is degenerate or the dimension does not match.
    pub fn predict_proba(&self, embedding: &Array1<f32>) -> Vec<f32> {
        if self.classes.is_empty() || embedding.len() != self.embedding_dim {
            return Vec::new();
        }
        let num_classes = self.classes.len();
        let mut logits = vec![0.0f32; num_classes];
        for c in 0..num_classes {
            let base = c * self.embedding_dim;
            let mut sum = self.bias[c];
            for (i, &x) in embedding.iter().enumerate() {
                sum += self.weights[base + i] * x;
            }
            logits[c] = sum;
        }
        softmax(&logits)
    }

    /// Predicted label and its probability. A degenerate model returns
    /// [`UNKNOWN_LABEL`] with probability zero instead of failing.
    pub fn predict(&self, embedding: &Array1<f32>) -> (String, f32) {
        let probs = self.predict_proba(embedding);
        if probs.is_empty() {
            return (UNKNOWN_LABEL.to_string(), 0.0);
        }
        let best = argmax(&probs);
        (self.classes[best].clone(), probs[best])
    }
}

/// Numerically-stable softmax over a set of logits.
pub fn softmax(raw: &[f32]) -> Vec<f32> {
    if raw.is_empty() {
        return Vec::new();
    }
    let max = raw
        .iter()
        .copied()
        .fold(f32::NEG_INFINITY, |a, b| a.max(b));
    let mut exps = Vec::with_capacity(raw.len());
    let mut sum = 0.0f32;
    for &v in raw {
        let e = (v - max).exp();
        exps.push(e);
        sum += e;
    }
    if sum == 0.0 {
        return vec![1.0 / raw.len() as f32; raw.len()];
    }
    for v in &mut exps {
        *v /= sum;
    }
    exps
}

fn argmax(values: &[f32]) -> usize {
    let mut best_idx = 0usize;
    let mut best_val = f32::NEG_INFINITY;
    for (idx, &v) in values.iter().enumerate() {
        if v > best_val {
            best_val = v;
            best_idx = idx;
        }
    }
    best_idx
}

#[cfg(test)]
mod tests {
    use super::*;

    fn onehot(dim: usize, hot: usize) -> Array1<f32> {
        let mut v = Array1::zeros(dim);
        v[hot] = 1.0;
        v
    }

    #[test]
    fn empty_fit_yields_queryable_degenerate_model() {
        let model = HeadModel::fit(&[], &TrainOptions::default()).unwrap();
        assert!(model.is_degenerate());
        let (label, confidence) = model.predict(&Array1::zeros(8));
        assert_eq!(label, UNKNOWN_LABEL);
        assert_eq!(confidence, 0.0);
    }

    #[test]
    fn single_class_predicts_with_full_confidence() {
        let examples = vec![
            (onehot(4, 0), "husky".to_string()),
            (onehot(4, 1), "husky".to_string()),
        ];
        let model = HeadModel::fit(&examples, &TrainOptions::default()).unwrap();
        let (label, confidence) = model.predict(&onehot(4, 2));
        assert_eq!(label, "husky");
        assert!((confidence - 1.0).abs() < 1e-6);
    }

    #[test]
    fn separable_classes_round_trip() {
        let mut examples = Vec::new();
        for _ in 0..3 {
            examples.push((onehot(8, 0), "husky".to_string()));
            examples.push((onehot(8, 1), "poodle".to_string()));
        }
        let options = TrainOptions {
            epochs: 200,
            learning_rate: 0.5,
            ..TrainOptions::default()
        };
        let model = HeadModel::fit(&examples, &options).unwrap();

        let (label, confidence) = model.predict(&onehot(8, 0));
        assert_eq!(label, "husky");
        assert!(confidence > 0.5, "confidence was {confidence}");

        let (label, confidence) = model.predict(&onehot(8, 1));
        assert_eq!(label, "poodle");
        assert!(confidence > 0.5, "confidence was {confidence}");
    }

    #[test]
    fn vocabulary_is_sorted_regardless_of_arrival_order() {
        let examples = vec![
            (onehot(2, 0), "poodle".to_string()),
            (onehot(2, 1), "husky".to_string()),
        ];
        let model = HeadModel::fit(&examples, &TrainOptions::default()).unwrap();
        assert_eq!(model.classes(), ["husky", "poodle"]);
    }

    #[test]
    fn mismatched_dimensions_fail_the_fit() {
        let examples = vec![
            (Array1::zeros(4), "a".to_string()),
            (Array1::zeros(5), "b".to_string()),
        ];
        let result = HeadModel::fit(&examples, &TrainOptions::default());
        assert!(matches!(result, Err(FitError::DimMismatch { .. })));
    }

    #[test]
    fn probabilities_sum_to_one() {
        let examples = vec![
            (onehot(3, 0), "a".to_string()),
            (onehot(3, 1), "b".to_string()),
            (onehot(3, 2), "c".to_string()),
        ];
        let model = HeadModel::fit(&examples, &TrainOptions::default()).unwrap();
        let probs = model.predict_proba(&onehot(3, 1));
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
    }

    #[test]
    fn softmax_is_stable_for_large_logits() {
        let probs = softmax(&[1000.0, 1000.0]);
        assert!((probs[0] - 0.5).abs() < 1e-6);
        assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-6);
    }
}
