//! Optimization Algorithms
//!
//! Implements stochastic gradient descent with momentum, weight decay and
//! dampening for training the feature extractor and classifier heads.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Optimizer trait for weight updates
pub trait Optimizer: Send + Sync {
    /// Update weights given gradients
    fn update_weights(&mut self, weights: &mut Array2<f64>, gradients: &Array2<f64>);

    /// Update biases given gradients
    fn update_biases(&mut self, biases: &mut Array1<f64>, gradients: &Array1<f64>);

    /// Reset optimizer state (for a new training run)
    fn reset(&mut self);

    /// Clone the optimizer for each parameter group
    fn clone_box(&self) -> Box<dyn Optimizer>;
}

/// Stochastic Gradient Descent with momentum, weight decay and dampening.
///
/// The effective gradient is `g + weight_decay * p`; with momentum the
/// velocity accumulates as `v = momentum * v + (1 - dampening) * g_eff` and
/// the parameter moves by `-lr * v`.
#[derive(Clone, Serialize, Deserialize)]
pub struct Sgd {
    pub learning_rate: f64,
    pub momentum: f64,
    pub weight_decay: f64,
    pub dampening: f64,
    #[serde(skip)]
    velocity_w: Option<Array2<f64>>,
    #[serde(skip)]
    velocity_b: Option<Array1<f64>>,
}

impl Sgd {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            momentum: 0.0,
            weight_decay: 0.0,
            dampening: 0.0,
            velocity_w: None,
            velocity_b: None,
        }
    }

    pub fn with_momentum(mut self, momentum: f64) -> Self {
        self.momentum = momentum;
        self
    }

    pub fn with_weight_decay(mut self, weight_decay: f64) -> Self {
        self.weight_decay = weight_decay;
        self
    }

    pub fn with_dampening(mut self, dampening: f64) -> Self {
        self.dampening = dampening;
        self
    }
}

impl Optimizer for Sgd {
    fn update_weights(&mut self, weights: &mut Array2<f64>, gradients: &Array2<f64>) {
        let effective = if self.weight_decay > 0.0 {
            gradients + &(&*weights * self.weight_decay)
        } else {
            gradients.clone()
        };

        if self.momentum > 0.0 {
            let v = self
                .velocity_w
                .get_or_insert_with(|| Array2::zeros(weights.dim()));
            *v = &*v * self.momentum + &effective * (1.0 - self.dampening);
            *weights = &*weights - &(&*v * self.learning_rate);
        } else {
            *weights = &*weights - &(&effective * self.learning_rate);
        }
    }

    fn update_biases(&mut self, biases: &mut Array1<f64>, gradients: &Array1<f64>) {
        let effective = if self.weight_decay > 0.0 {
            gradients + &(&*biases * self.weight_decay)
        } else {
            gradients.clone()
        };

        if self.momentum > 0.0 {
            let v = self
                .velocity_b
                .get_or_insert_with(|| Array1::zeros(biases.len()));
            *v = &*v * self.momentum + &effective * (1.0 - self.dampening);
            *biases = &*biases - &(&*v * self.learning_rate);
        } else {
            *biases = &*biases - &(&effective * self.learning_rate);
        }
    }

    fn reset(&mut self) {
        self.velocity_w = None;
        self.velocity_b = None;
    }

    fn clone_box(&self) -> Box<dyn Optimizer> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_sgd_step() {
        let mut optimizer = Sgd::new(0.01);
        let mut weights = Array2::ones((3, 2));
        let gradients = Array2::ones((3, 2));
        optimizer.update_weights(&mut weights, &gradients);

        assert!((weights[[0, 0]] - 0.99).abs() < 1e-12);
    }

    #[test]
    fn test_momentum_accumulates() {
        let mut optimizer = Sgd::new(0.1).with_momentum(0.9);
        let mut weights = Array2::zeros((1, 1));
        let gradients = Array2::ones((1, 1));

        // First step: v = 1, w = -0.1. Second: v = 1.9, w = -0.29.
        optimizer.update_weights(&mut weights, &gradients);
        assert!((weights[[0, 0]] + 0.1).abs() < 1e-12);
        optimizer.update_weights(&mut weights, &gradients);
        assert!((weights[[0, 0]] + 0.29).abs() < 1e-12);
    }

    #[test]
    fn test_dampening_scales_accumulation() {
        let mut optimizer = Sgd::new(0.1).with_momentum(0.9).with_dampening(0.5);
        let mut weights = Array2::zeros((1, 1));
        let gradients = Array2::ones((1, 1));

        // v = 0.5 after the first step.
        optimizer.update_weights(&mut weights, &gradients);
        assert!((weights[[0, 0]] + 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_weight_decay_shrinks_weights() {
        let mut optimizer = Sgd::new(0.1).with_weight_decay(0.1);
        let mut weights = Array2::ones((1, 1));
        let gradients = Array2::zeros((1, 1));

        // Effective gradient = 0 + 0.1 * 1.0, so w = 1 - 0.1 * 0.1.
        optimizer.update_weights(&mut weights, &gradients);
        assert!((weights[[0, 0]] - 0.99).abs() < 1e-12);
    }

    #[test]
    fn test_reset_clears_velocity() {
        let mut optimizer = Sgd::new(0.1).with_momentum(0.9);
        let mut weights = Array2::zeros((1, 1));
        let gradients = Array2::ones((1, 1));

        optimizer.update_weights(&mut weights, &gradients);
        optimizer.reset();
        let mut fresh = Array2::zeros((1, 1));
        optimizer.update_weights(&mut fresh, &gradients);

        // After reset the first step behaves like a fresh optimizer.
        assert!((fresh[[0, 0]] + 0.1).abs() < 1e-12);
    }
}
