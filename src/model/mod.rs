//! Model components.
//!
//! The incremental model couples a trainable feature extractor with a
//! growing family of per-task classifier heads and an exemplar prototype
//! store:
//! - [`extractor`] — the feedforward embedding backbone
//! - [`head`] — bias-free linear classifiers with warm-start growth
//! - [`prototypes`] — insertion-ordered class prototype storage
//! - [`optimizer`] — SGD with momentum for parameter updates
//! - [`incremental`] — the stateful model and its task-boundary scopes

pub mod extractor;
pub mod head;
pub mod incremental;
pub mod optimizer;
pub mod prototypes;

pub use extractor::FeatureExtractor;
pub use head::ClassifierHead;
pub use incremental::{IncrementalModel, ModelStats, PreviousScope, TaskScope};
pub use optimizer::{Optimizer, Sgd};
pub use prototypes::ExemplarStore;
