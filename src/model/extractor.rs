//! Trainable feature extractor.
//!
//! A small feedforward backbone mapping a batch of flattened images to
//! fixed-dimensional embeddings: input -> hidden (ReLU) -> embedding
//! (linear). `Clone` produces the independent deep copy used for the frozen
//! "previous model" snapshot at task boundaries.

use ndarray::{Array1, Array2, Axis};
use ndarray_rand::rand_distr::Normal;
use ndarray_rand::RandomExt;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Activations cached during a forward pass, needed for backpropagation.
#[derive(Debug, Clone)]
pub struct ExtractorCache {
    /// Input batch (B x input_dim).
    pub input: Array2<f64>,
    /// Pre-activation of the hidden layer (B x hidden_dim).
    pub z1: Array2<f64>,
    /// Post-ReLU hidden activations (B x hidden_dim).
    pub h1: Array2<f64>,
}

/// Parameter gradients for one backward pass.
#[derive(Debug, Clone)]
pub struct ExtractorGrads {
    pub dw1: Array2<f64>,
    pub db1: Array1<f64>,
    pub dw2: Array2<f64>,
    pub db2: Array1<f64>,
}

/// Feedforward feature extractor: input -> hidden (ReLU) -> embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureExtractor {
    /// Hidden-layer weights (hidden_dim x input_dim).
    w1: Array2<f64>,
    /// Hidden-layer biases.
    b1: Array1<f64>,
    /// Embedding-layer weights (feature_dim x hidden_dim).
    w2: Array2<f64>,
    /// Embedding-layer biases.
    b2: Array1<f64>,
    input_dim: usize,
    hidden_dim: usize,
    feature_dim: usize,
}

impl FeatureExtractor {
    /// Create an extractor with Xavier-initialized weights.
    pub fn new<R: Rng + ?Sized>(
        input_dim: usize,
        hidden_dim: usize,
        feature_dim: usize,
        rng: &mut R,
    ) -> Self {
        let scale1 = (2.0 / (input_dim + hidden_dim) as f64).sqrt();
        let scale2 = (2.0 / (hidden_dim + feature_dim) as f64).sqrt();

        let w1 = Array2::random_using(
            (hidden_dim, input_dim),
            Normal::new(0.0, scale1).unwrap(),
            rng,
        );
        let w2 = Array2::random_using(
            (feature_dim, hidden_dim),
            Normal::new(0.0, scale2).unwrap(),
            rng,
        );

        Self {
            w1,
            b1: Array1::zeros(hidden_dim),
            w2,
            b2: Array1::zeros(feature_dim),
            input_dim,
            hidden_dim,
            feature_dim,
        }
    }

    /// Embedding dimensionality.
    pub fn feature_dim(&self) -> usize {
        self.feature_dim
    }

    /// Expected input dimensionality.
    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    /// Forward pass: batch of flattened images -> batch of embeddings.
    pub fn forward(&self, images: &Array2<f64>) -> Array2<f64> {
        let z1 = images.dot(&self.w1.t()) + &self.b1;
        let h1 = z1.mapv(|v| v.max(0.0));
        h1.dot(&self.w2.t()) + &self.b2
    }

    /// Forward pass that also returns the activations needed for `backward`.
    pub fn forward_cached(&self, images: &Array2<f64>) -> (Array2<f64>, ExtractorCache) {
        let z1 = images.dot(&self.w1.t()) + &self.b1;
        let h1 = z1.mapv(|v| v.max(0.0));
        let features = h1.dot(&self.w2.t()) + &self.b2;
        (
            features,
            ExtractorCache {
                input: images.clone(),
                z1,
                h1,
            },
        )
    }

    /// Backpropagate `grad_features` (B x feature_dim) through the extractor.
    pub fn backward(&self, cache: &ExtractorCache, grad_features: &Array2<f64>) -> ExtractorGrads {
        let dw2 = grad_features.t().dot(&cache.h1);
        let db2 = grad_features.sum_axis(Axis(0));

        let g_h1 = grad_features.dot(&self.w2);
        let relu_mask = cache.z1.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 });
        let g_z1 = g_h1 * relu_mask;

        let dw1 = g_z1.t().dot(&cache.input);
        let db1 = g_z1.sum_axis(Axis(0));

        ExtractorGrads { dw1, db1, dw2, db2 }
    }

    /// Mutable access to the hidden layer parameters.
    pub fn layer1_mut(&mut self) -> (&mut Array2<f64>, &mut Array1<f64>) {
        (&mut self.w1, &mut self.b1)
    }

    /// Mutable access to the embedding layer parameters.
    pub fn layer2_mut(&mut self) -> (&mut Array2<f64>, &mut Array1<f64>) {
        (&mut self.w2, &mut self.b2)
    }

    /// Total number of trainable parameters.
    pub fn num_parameters(&self) -> usize {
        self.w1.len() + self.b1.len() + self.w2.len() + self.b2.len()
    }
}
