//! # Class-Incremental Continual Learning
//!
//! This crate implements class-incremental continual learning experiments for
//! image classification. A feature-extractor-plus-classifier model is trained
//! on a sequence of disjoint class tasks; after each task the system measures
//! how much accuracy on earlier tasks has been retained (catastrophic
//! forgetting).
//!
//! ## Features
//!
//! - Task sequence generation over a class universe (canonical or shuffled)
//! - Incremental model state: per-task classifier heads with warm-start
//!   growth, frozen feature-extractor snapshots, exemplar prototypes
//! - Nearest-mean-of-exemplars inference alongside the learned classifier
//! - A growing task-by-task accuracy matrix with backward transfer,
//!   forgetting rate, last-step accuracy and average incremental accuracy
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use class_incremental_learning::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = ExperimentConfig::default();
//!     let provider = SyntheticImages::new(20, config.input_dim, 40, 10, 7);
//!     let mut sink = TracingSink::new("demo");
//!     let report = run_experiment(&config, &provider, &mut sink)?;
//!     println!("final metrics: {:?}", report.final_metrics);
//!     Ok(())
//! }
//! ```

pub mod continual;
pub mod data;
pub mod experiment;
pub mod model;
pub mod sink;
pub mod tasks;

// Re-exports
pub use continual::evaluator::{ContinualEvaluator, EvaluationOutcome};
pub use continual::learner::{HparamRecord, TaskLearner};
pub use continual::metrics;
pub use data::{DatasetProvider, Split, SyntheticImages, TaskData};
pub use experiment::{run_experiment, ExperimentReport};
pub use model::extractor::FeatureExtractor;
pub use model::head::ClassifierHead;
pub use model::incremental::IncrementalModel;
pub use model::prototypes::ExemplarStore;
pub use sink::{MemorySink, MetricsSink, NullSink, TracingSink};
pub use tasks::{generate_tasks, Task, TaskSplit};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::continual::evaluator::{ContinualEvaluator, EvaluationOutcome};
    pub use crate::continual::learner::{HparamRecord, TaskLearner};
    pub use crate::continual::metrics;
    pub use crate::data::{DatasetProvider, Split, SyntheticImages, TaskData};
    pub use crate::experiment::{run_experiment, ExperimentReport};
    pub use crate::model::extractor::FeatureExtractor;
    pub use crate::model::head::ClassifierHead;
    pub use crate::model::incremental::IncrementalModel;
    pub use crate::model::prototypes::ExemplarStore;
    pub use crate::sink::{MemorySink, MetricsSink, NullSink, TracingSink};
    pub use crate::tasks::{generate_tasks, Task, TaskSplit};
    pub use crate::{ExperimentConfig, IncrementalError};
}

use serde::{Deserialize, Serialize};

/// Configuration for a class-incremental learning run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Flattened input image dimension (e.g. 3072 for 32x32 RGB).
    pub input_dim: usize,
    /// Hidden layer size of the feature extractor.
    pub hidden_dim: usize,
    /// Embedding dimension produced by the feature extractor.
    pub feature_dim: usize,
    /// Number of tasks the class universe is split into.
    pub task_count: usize,
    /// Use the canonical deterministic task partition instead of shuffling.
    pub fixed_tasks: bool,
    /// Training epochs per task.
    pub epochs: usize,
    /// Mini-batch size.
    pub batch_size: usize,
    /// SGD learning rate.
    pub learning_rate: f64,
    /// SGD momentum.
    pub momentum: f64,
    /// SGD weight decay (L2).
    pub weight_decay: f64,
    /// SGD dampening applied to the momentum accumulation.
    pub dampening: f64,
    /// How many progress reports to emit over the epoch loop.
    pub log_times: usize,
    /// RNG seed for shuffled partitions, weight init and batch order.
    pub seed: u64,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            input_dim: 32,
            hidden_dim: 128,
            feature_dim: 64,
            task_count: 5,
            fixed_tasks: false,
            epochs: 20,
            batch_size: 32,
            learning_rate: 1e-3,
            momentum: 0.9,
            weight_decay: 0.0,
            dampening: 0.0,
            log_times: 5,
            seed: 42,
        }
    }
}

/// Error types for the crate
#[derive(thiserror::Error, Debug)]
pub enum IncrementalError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No previous model state: {0}")]
    NoPreviousModel(String),

    #[error("Nearest-prototype inference requested before any exemplar mean was registered")]
    MissingPrototypes,

    #[error("Data error: {0}")]
    Data(String),
}

pub type Result<T> = std::result::Result<T, IncrementalError>;
