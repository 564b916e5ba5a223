//! Supervised training of one task.
//!
//! Runs the epoch loop for the current task: shuffled mini-batches,
//! cross-entropy over the cumulative logits, SGD with momentum on both the
//! classifier head and the feature extractor. Progress (train loss, held-out
//! top-1 accuracy) is reported at a fixed number of points across the epoch
//! loop and streamed to the metrics sink.

use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::data::TaskData;
use crate::model::incremental::IncrementalModel;
use crate::model::optimizer::{Optimizer, Sgd};
use crate::sink::{emit_scalar, MetricsSink};
use crate::{ExperimentConfig, IncrementalError, Result};

/// Optimizer hyperparameters captured from the first task.
///
/// Written once when the first task finishes training and never overwritten
/// by later tasks, so the run report reflects the settings the sequence
/// started with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HparamRecord {
    pub epochs: usize,
    pub optimizer: String,
    pub learning_rate: f64,
    pub momentum: f64,
    pub weight_decay: f64,
    pub dampening: f64,
}

/// Mean cross-entropy loss and its logit gradient for a labeled batch.
pub fn cross_entropy(logits: &Array2<f64>, labels: &[usize]) -> (f64, Array2<f64>) {
    let batch = logits.nrows();
    debug_assert_eq!(batch, labels.len());

    let mut probs = Array2::zeros(logits.dim());
    for (i, row) in logits.axis_iter(Axis(0)).enumerate() {
        let max = row.fold(f64::NEG_INFINITY, |a, &v| a.max(v));
        let exps: Vec<f64> = row.iter().map(|&v| (v - max).exp()).collect();
        let sum: f64 = exps.iter().sum();
        for (j, e) in exps.iter().enumerate() {
            probs[[i, j]] = e / sum;
        }
    }

    let mut loss = 0.0;
    let mut grad = probs;
    for (i, &label) in labels.iter().enumerate() {
        loss -= grad[[i, label]].max(1e-15).ln();
        grad[[i, label]] -= 1.0;
    }
    (loss / batch as f64, grad / batch as f64)
}

/// Drives per-task supervised training.
///
/// Owns the run-scoped state that the orchestrator threads through the task
/// loop: how many tasks have been learned and the one-time hyperparameter
/// record.
pub struct TaskLearner {
    config: ExperimentConfig,
    hparams: Option<HparamRecord>,
    tasks_learned: usize,
    rng: StdRng,
}

impl TaskLearner {
    pub fn new(config: &ExperimentConfig) -> Self {
        Self {
            config: config.clone(),
            hparams: None,
            tasks_learned: 0,
            rng: StdRng::seed_from_u64(config.seed.wrapping_add(1)),
        }
    }

    /// Hyperparameters recorded from the first task, once available.
    pub fn hparams(&self) -> Option<&HparamRecord> {
        self.hparams.as_ref()
    }

    /// Number of tasks trained so far.
    pub fn tasks_learned(&self) -> usize {
        self.tasks_learned
    }

    /// Train the model on the current task's data; returns the final-epoch
    /// mean training loss.
    ///
    /// `train` and `test` carry labels in the cumulative label space. The
    /// optimizer state is fresh for every task.
    pub fn learn_task(
        &mut self,
        model: &mut IncrementalModel,
        train: &TaskData,
        test: &TaskData,
        task_id: usize,
        sink: &mut dyn MetricsSink,
    ) -> Result<f64> {
        if train.is_empty() {
            return Err(IncrementalError::Data(format!(
                "task {} has no training data",
                task_id
            )));
        }
        let num_classes = model.active_head().num_classes();
        if let Some(&bad) = train.labels.iter().find(|&&l| l >= num_classes) {
            return Err(IncrementalError::Data(format!(
                "label {} outside the {} cumulative classes",
                bad, num_classes
            )));
        }

        let sgd = || {
            Sgd::new(self.config.learning_rate)
                .with_momentum(self.config.momentum)
                .with_weight_decay(self.config.weight_decay)
                .with_dampening(self.config.dampening)
        };
        let mut opt_layer1 = sgd();
        let mut opt_layer2 = sgd();
        let mut opt_head = sgd();

        let epochs = self.config.epochs;
        let log_every = (epochs / self.config.log_times.max(1)).max(1);
        let mut final_loss = 0.0;

        for epoch in 0..epochs {
            let train_loss = self.train_epoch(
                model,
                train,
                &mut opt_layer1,
                &mut opt_layer2,
                &mut opt_head,
            );
            let test_acc = model.top1_accuracy(&test.images, &test.labels);
            final_loss = train_loss;

            let global_step = epoch + task_id * epochs;
            emit_scalar(sink, "task-learning/train-loss", train_loss, global_step);
            emit_scalar(sink, "task-learning/test-top1-acc", test_acc, global_step);

            if (epoch + 1) % log_every == 0 {
                info!(
                    "\tEpoch [{}/{}], train_loss={:.4}, test_acc={:.4}",
                    epochs,
                    epoch + 1,
                    train_loss,
                    test_acc
                );
            }
        }

        if self.tasks_learned == 0 {
            self.hparams = Some(HparamRecord {
                epochs,
                optimizer: "sgd-momentum".to_string(),
                learning_rate: self.config.learning_rate,
                momentum: self.config.momentum,
                weight_decay: self.config.weight_decay,
                dampening: self.config.dampening,
            });
        }
        self.tasks_learned += 1;

        Ok(final_loss)
    }

    /// One pass over the shuffled training data; returns the mean batch loss.
    fn train_epoch(
        &mut self,
        model: &mut IncrementalModel,
        train: &TaskData,
        opt_layer1: &mut Sgd,
        opt_layer2: &mut Sgd,
        opt_head: &mut Sgd,
    ) -> f64 {
        let n = train.len();
        let batch_size = self.config.batch_size.max(1);
        let mut indices: Vec<usize> = (0..n).collect();
        indices.shuffle(&mut self.rng);

        let mut total_loss = 0.0;
        let mut batches = 0;

        for chunk in indices.chunks(batch_size) {
            let images = train.images.select(Axis(0), chunk);
            let labels: Vec<usize> = chunk.iter().map(|&i| train.labels[i]).collect();

            let (features, cache) = model.extractor().forward_cached(&images);
            let logits = model.active_head().forward(&features);
            let (loss, grad_logits) = cross_entropy(&logits, &labels);

            let (dw_head, grad_features) = model.active_head().backward(&features, &grad_logits);
            let grads = model.extractor().backward(&cache, &grad_features);

            let (extractor, head) = model.training_parts_mut();
            opt_head.update_weights(head.weights_mut(), &dw_head);
            let (w1, b1) = extractor.layer1_mut();
            opt_layer1.update_weights(w1, &grads.dw1);
            opt_layer1.update_biases(b1, &grads.db1);
            let (w2, b2) = extractor.layer2_mut();
            opt_layer2.update_weights(w2, &grads.dw2);
            opt_layer2.update_biases(b2, &grads.db2);

            total_loss += loss;
            batches += 1;
        }

        total_loss / batches as f64
    }
}
