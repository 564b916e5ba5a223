//! Continual learning components.
//!
//! This module drives the incremental protocol around the model:
//! - [`learner`] — per-task supervised training
//! - [`evaluator`] — accuracy-matrix bookkeeping after each task
//! - [`metrics`] — pure continual-learning metric functions

pub mod evaluator;
pub mod learner;
pub mod metrics;

pub use evaluator::{ContinualEvaluator, EvaluationOutcome};
pub use learner::{HparamRecord, TaskLearner};
