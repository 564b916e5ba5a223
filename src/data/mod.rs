//! Dataset access.
//!
//! The experiment core only ever sees the [`DatasetProvider`] seam: given a
//! list of class names and a split it receives aligned image and label
//! batches, and the provider owns the class-name universe. Decoding real
//! on-disk datasets lives behind this boundary; the in-crate
//! [`SyntheticImages`] provider generates separable class clusters for
//! experiments and tests.

pub mod synthetic;

pub use synthetic::SyntheticImages;

use ndarray::Array2;

use crate::Result;

/// Which portion of a dataset to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Test,
}

/// An aligned batch of flattened images and labels for one task.
///
/// Labels index into the class list the batch was requested with, in order;
/// callers translate them into the cumulative label space.
#[derive(Debug, Clone)]
pub struct TaskData {
    /// Flattened images, one row per example.
    pub images: Array2<f64>,
    /// Per-example label, local to the requested class list.
    pub labels: Vec<usize>,
}

impl TaskData {
    /// Number of examples in the batch.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether the batch holds no examples.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Source of labeled image data for tasks.
pub trait DatasetProvider {
    /// The full class-name universe this provider can serve.
    fn class_names(&self) -> &[String];

    /// Images and labels for the named classes in the given split.
    fn task_data(&self, classes: &[String], split: Split) -> Result<TaskData>;
}
