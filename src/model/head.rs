//! Linear classifier heads ("weight vectors").
//!
//! One head exists per task boundary; head `i` scores exactly the classes
//! learned through task `i`. Growth copies the previous head's rows into the
//! leading positions so earlier decision boundaries survive as a warm start.

use ndarray::{s, Array2, Axis};
use ndarray_rand::rand_distr::Normal;
use ndarray_rand::RandomExt;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Bias-free linear classifier over embeddings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierHead {
    /// Class weight rows (num_classes x feature_dim).
    weights: Array2<f64>,
}

impl ClassifierHead {
    /// Create a head with Xavier-initialized rows for `num_classes` classes.
    pub fn new<R: Rng + ?Sized>(num_classes: usize, feature_dim: usize, rng: &mut R) -> Self {
        let scale = (2.0 / (feature_dim + num_classes) as f64).sqrt();
        let weights = Array2::random_using(
            (num_classes, feature_dim),
            Normal::new(0.0, scale).unwrap(),
            rng,
        );
        Self { weights }
    }

    /// Create a head covering `previous` classes plus `new_classes` more.
    ///
    /// Rows for already-learned classes are copied verbatim from `previous`;
    /// rows for the new classes are freshly initialized.
    pub fn grown_from<R: Rng + ?Sized>(
        previous: &ClassifierHead,
        new_classes: usize,
        rng: &mut R,
    ) -> Self {
        let feature_dim = previous.feature_dim();
        let total = previous.num_classes() + new_classes;
        let mut head = Self::new(total, feature_dim, rng);
        head.weights
            .slice_mut(s![..previous.num_classes(), ..])
            .assign(&previous.weights);
        head
    }

    /// Number of classes this head scores.
    pub fn num_classes(&self) -> usize {
        self.weights.nrows()
    }

    /// Embedding dimensionality this head expects.
    pub fn feature_dim(&self) -> usize {
        self.weights.ncols()
    }

    /// Score a batch of embeddings: (B x feature_dim) -> (B x num_classes).
    pub fn forward(&self, features: &Array2<f64>) -> Array2<f64> {
        features.dot(&self.weights.t())
    }

    /// Backpropagate logit gradients; returns (weight grads, feature grads).
    pub fn backward(
        &self,
        features: &Array2<f64>,
        grad_logits: &Array2<f64>,
    ) -> (Array2<f64>, Array2<f64>) {
        let dw = grad_logits.t().dot(features);
        let grad_features = grad_logits.dot(&self.weights);
        (dw, grad_features)
    }

    /// Read-only view of the weight rows.
    pub fn weights(&self) -> &Array2<f64> {
        &self.weights
    }

    /// Mutable access to the weight rows for optimizer updates.
    pub fn weights_mut(&mut self) -> &mut Array2<f64> {
        &mut self.weights
    }

    /// Total number of trainable parameters.
    pub fn num_parameters(&self) -> usize {
        self.weights.len()
    }
}

/// Row-wise argmax over a logit batch: top-1 predicted class per example.
pub fn argmax_rows(logits: &Array2<f64>) -> Vec<usize> {
    logits
        .axis_iter(Axis(0))
        .map(|row| {
            let mut best = 0;
            let mut best_val = f64::NEG_INFINITY;
            for (idx, &v) in row.iter().enumerate() {
                if v > best_val {
                    best_val = v;
                    best = idx;
                }
            }
            best
        })
        .collect()
}
