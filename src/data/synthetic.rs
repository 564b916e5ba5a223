//! Synthetic image provider.
//!
//! Generates one Gaussian cluster of flattened "images" per class around a
//! seeded class mean, split into train and test portions at construction.
//! Deterministic under a fixed seed, which the partition-reproducibility and
//! end-to-end tests rely on.

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use crate::data::{DatasetProvider, Split, TaskData};
use crate::{IncrementalError, Result};

/// Distance of class means from the origin; large relative to the sample
/// noise so classes stay linearly separable.
const MEAN_SCALE: f64 = 2.0;

/// In-memory class-conditional Gaussian dataset.
pub struct SyntheticImages {
    class_names: Vec<String>,
    train: Vec<Vec<Vec<f64>>>,
    test: Vec<Vec<Vec<f64>>>,
    input_dim: usize,
}

impl SyntheticImages {
    /// Generate `num_classes` clusters of `input_dim`-dimensional samples.
    pub fn new(
        num_classes: usize,
        input_dim: usize,
        train_per_class: usize,
        test_per_class: usize,
        seed: u64,
    ) -> Self {
        Self::with_noise_std(
            num_classes,
            input_dim,
            train_per_class,
            test_per_class,
            seed,
            0.3,
        )
    }

    /// Like [`SyntheticImages::new`] with an explicit sample noise level.
    pub fn with_noise_std(
        num_classes: usize,
        input_dim: usize,
        train_per_class: usize,
        test_per_class: usize,
        seed: u64,
        noise_std: f64,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mean_distr = Normal::new(0.0, MEAN_SCALE).unwrap();
        let noise_distr = Normal::new(0.0, noise_std).unwrap();

        let mut class_names = Vec::with_capacity(num_classes);
        let mut train = Vec::with_capacity(num_classes);
        let mut test = Vec::with_capacity(num_classes);

        for cls in 0..num_classes {
            class_names.push(format!("class_{:03}", cls));
            let mean: Vec<f64> = (0..input_dim).map(|_| mean_distr.sample(&mut rng)).collect();

            let sample = |rng: &mut StdRng| -> Vec<f64> {
                mean.iter()
                    .map(|m| m + noise_distr.sample(rng))
                    .collect()
            };

            train.push((0..train_per_class).map(|_| sample(&mut rng)).collect());
            test.push((0..test_per_class).map(|_| sample(&mut rng)).collect());
        }

        Self {
            class_names,
            train,
            test,
            input_dim,
        }
    }

    fn class_index(&self, name: &str) -> Result<usize> {
        self.class_names
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| IncrementalError::Data(format!("unknown class '{}'", name)))
    }
}

impl DatasetProvider for SyntheticImages {
    fn class_names(&self) -> &[String] {
        &self.class_names
    }

    fn task_data(&self, classes: &[String], split: Split) -> Result<TaskData> {
        let pool = match split {
            Split::Train => &self.train,
            Split::Test => &self.test,
        };

        let mut flat = Vec::new();
        let mut labels = Vec::new();
        for (local, name) in classes.iter().enumerate() {
            let cls = self.class_index(name)?;
            for sample in &pool[cls] {
                flat.extend_from_slice(sample);
                labels.push(local);
            }
        }

        let rows = labels.len();
        let images = Array2::from_shape_vec((rows, self.input_dim), flat)
            .map_err(|e| IncrementalError::Data(format!("bad sample shape: {}", e)))?;
        Ok(TaskData { images, labels })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_under_seed() {
        let a = SyntheticImages::new(4, 8, 5, 3, 17);
        let b = SyntheticImages::new(4, 8, 5, 3, 17);

        let classes = a.class_names().to_vec();
        let da = a.task_data(&classes, Split::Train).unwrap();
        let db = b.task_data(&classes, Split::Train).unwrap();
        assert_eq!(da.images, db.images);
        assert_eq!(da.labels, db.labels);
    }

    #[test]
    fn test_split_sizes_and_local_labels() {
        let provider = SyntheticImages::new(3, 4, 6, 2, 1);
        let request = vec!["class_002".to_string(), "class_000".to_string()];

        let train = provider.task_data(&request, Split::Train).unwrap();
        assert_eq!(train.len(), 12);
        assert_eq!(train.images.dim(), (12, 4));
        // Labels are positions in the requested list, not universe indices.
        assert_eq!(&train.labels[..6], &[0; 6]);
        assert_eq!(&train.labels[6..], &[1; 6]);

        let test = provider.task_data(&request, Split::Test).unwrap();
        assert_eq!(test.len(), 4);
    }

    #[test]
    fn test_train_and_test_are_distinct_samples() {
        let provider = SyntheticImages::new(1, 4, 3, 3, 5);
        let request = vec!["class_000".to_string()];
        let train = provider.task_data(&request, Split::Train).unwrap();
        let test = provider.task_data(&request, Split::Test).unwrap();
        assert_ne!(train.images, test.images);
    }

    #[test]
    fn test_unknown_class_is_rejected() {
        let provider = SyntheticImages::new(2, 4, 3, 3, 5);
        let err = provider
            .task_data(&["mystery".to_string()], Split::Train)
            .unwrap_err();
        assert!(matches!(err, IncrementalError::Data(_)));
    }
}
