//! Incremental model state.
//!
//! Owns the trainable feature extractor, the frozen snapshot taken at the
//! last task boundary, the append-only list of per-task classifier heads and
//! the exemplar prototype store. Task-boundary mutations run inside RAII
//! scopes so the bookkeeping invariants hold on every exit path, including
//! early returns and unwinding.

use std::mem;
use std::ops::{Deref, DerefMut};

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::model::extractor::FeatureExtractor;
use crate::model::head::{argmax_rows, ClassifierHead};
use crate::model::prototypes::{normalize, normalize_rows, ExemplarStore};
use crate::tasks::Task;
use crate::{IncrementalError, Result};

/// Snapshot of the model's bookkeeping state.
#[derive(Debug, Clone)]
pub struct ModelStats {
    /// Number of task boundaries crossed so far (heads allocated).
    pub tasks_begun: usize,
    /// Number of classes committed as learned.
    pub classes_learned: usize,
    /// Number of exemplar prototypes registered.
    pub prototypes: usize,
    /// Trainable parameters in the extractor plus the active head.
    pub parameters: usize,
}

/// Feature extractor + growing classifier heads + exemplar prototypes.
pub struct IncrementalModel {
    extractor: FeatureExtractor,
    previous_extractor: Option<FeatureExtractor>,
    heads: Vec<ClassifierHead>,
    active_head: usize,
    exemplars: ExemplarStore,
    learned_classes: Vec<String>,
    current_task: Option<Task>,
    rng: StdRng,
}

impl IncrementalModel {
    /// Create a fresh model with no tasks learned.
    pub fn new(input_dim: usize, hidden_dim: usize, feature_dim: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let extractor = FeatureExtractor::new(input_dim, hidden_dim, feature_dim, &mut rng);
        Self {
            extractor,
            previous_extractor: None,
            heads: Vec::new(),
            active_head: 0,
            exemplars: ExemplarStore::new(),
            learned_classes: Vec::new(),
            current_task: None,
            rng,
        }
    }

    /// Enter a new task: allocate the warm-started head, snapshot the
    /// extractor and set the task context.
    ///
    /// The returned scope guard commits the task's classes to the learned
    /// set exactly once when it goes out of scope, whether the training code
    /// inside the scope succeeds, errors out or unwinds.
    pub fn begin_task(&mut self, task: &Task) -> Result<TaskScope<'_>> {
        if task.is_empty() {
            return Err(IncrementalError::Config(format!(
                "task {} has no classes",
                task.index
            )));
        }
        if let Some(dup) = task
            .classes
            .iter()
            .find(|c| self.learned_classes.contains(*c))
        {
            return Err(IncrementalError::Config(format!(
                "class '{}' was already learned in an earlier task",
                dup
            )));
        }

        let head = match self.heads.last() {
            Some(previous) => ClassifierHead::grown_from(previous, task.len(), &mut self.rng),
            None => ClassifierHead::new(task.len(), self.extractor.feature_dim(), &mut self.rng),
        };
        self.heads.push(head);
        self.active_head = self.heads.len() - 1;

        self.previous_extractor = Some(self.extractor.clone());
        self.current_task = Some(task.clone());

        Ok(TaskScope {
            pending: Some(task.classes.clone()),
            model: self,
        })
    }

    /// Temporarily swap in a past feature extractor and head.
    ///
    /// Defaults to the snapshot taken at the last task boundary and the
    /// immediately-preceding head. The prior active state is restored when
    /// the scope guard drops, on every exit path.
    pub fn use_previous(
        &mut self,
        extractor: Option<FeatureExtractor>,
        head_index: Option<usize>,
    ) -> Result<PreviousScope<'_>> {
        let swapped = match extractor.or_else(|| self.previous_extractor.clone()) {
            Some(e) => e,
            None => {
                return Err(IncrementalError::NoPreviousModel(
                    "no feature-extractor snapshot exists yet".to_string(),
                ))
            }
        };
        let head_idx = match head_index {
            Some(idx) if idx < self.heads.len() => idx,
            Some(idx) => {
                return Err(IncrementalError::Config(format!(
                    "head index {} out of range ({} heads)",
                    idx,
                    self.heads.len()
                )))
            }
            None => match self.heads.len().checked_sub(2) {
                Some(idx) => idx,
                None => {
                    return Err(IncrementalError::NoPreviousModel(
                        "fewer than two classifier heads exist".to_string(),
                    ))
                }
            },
        };

        let saved_extractor = mem::replace(&mut self.extractor, swapped);
        let saved_active = self.active_head;
        self.active_head = head_idx;

        Ok(PreviousScope {
            saved_extractor: Some(saved_extractor),
            saved_active,
            model: self,
        })
    }

    /// Class logits over everything learned so far, for differentiable
    /// training and top-1 evaluation.
    pub fn forward(&self, images: &Array2<f64>) -> Array2<f64> {
        assert!(
            !self.heads.is_empty(),
            "forward called before any task was begun"
        );
        let features = self.extractor.forward(images);
        self.heads[self.active_head].forward(&features)
    }

    /// Nearest-mean-of-exemplars inference.
    ///
    /// Embeds the batch, L2-normalizes each embedding and returns, per
    /// example, the registration index of the prototype with minimal
    /// Euclidean distance (earliest class wins ties). No gradients are
    /// involved on this path.
    pub fn predict_nearest_prototype(&self, images: &Array2<f64>) -> Result<Vec<usize>> {
        if self.exemplars.is_empty() {
            return Err(IncrementalError::MissingPrototypes);
        }
        let features = normalize_rows(&self.extractor.forward(images));
        let mut predictions = Vec::with_capacity(features.nrows());
        for row in features.axis_iter(ndarray::Axis(0)) {
            let idx = self
                .exemplars
                .nearest(&row.to_owned())
                .ok_or(IncrementalError::MissingPrototypes)?;
            predictions.push(idx);
        }
        Ok(predictions)
    }

    /// Compute and register one exemplar-mean prototype per class.
    ///
    /// `labels` index into `classes`. Each prototype is the mean of the
    /// class's L2-normalized embeddings, re-normalized to unit length.
    /// Prototypes for earlier classes are left as computed at their own task;
    /// they are not refreshed when the extractor later moves.
    pub fn record_exemplar_means(
        &mut self,
        classes: &[String],
        images: &Array2<f64>,
        labels: &[usize],
    ) -> Result<()> {
        if images.nrows() != labels.len() {
            return Err(IncrementalError::Data(format!(
                "{} images but {} labels",
                images.nrows(),
                labels.len()
            )));
        }
        let features = normalize_rows(&self.extractor.forward(images));

        for (cls_idx, class) in classes.iter().enumerate() {
            let rows: Vec<usize> = labels
                .iter()
                .enumerate()
                .filter(|(_, &l)| l == cls_idx)
                .map(|(i, _)| i)
                .collect();
            if rows.is_empty() {
                return Err(IncrementalError::Data(format!(
                    "no samples for class '{}'",
                    class
                )));
            }
            let subset = features.select(ndarray::Axis(0), &rows);
            let mean = subset
                .mean_axis(ndarray::Axis(0))
                .ok_or_else(|| IncrementalError::Data("empty class subset".to_string()))?;
            self.exemplars.insert(class, normalize(&mean));
        }
        Ok(())
    }

    /// Top-1 accuracy of the cumulative classifier on a labeled batch.
    pub fn top1_accuracy(&self, images: &Array2<f64>, labels: &[usize]) -> f64 {
        if labels.is_empty() {
            return 0.0;
        }
        let predictions = argmax_rows(&self.forward(images));
        let correct = predictions
            .iter()
            .zip(labels.iter())
            .filter(|(p, l)| p == l)
            .count();
        correct as f64 / labels.len() as f64
    }

    /// The extractor and active head together, for optimizer updates.
    pub fn training_parts_mut(&mut self) -> (&mut FeatureExtractor, &mut ClassifierHead) {
        let idx = self.active_head;
        (&mut self.extractor, &mut self.heads[idx])
    }

    /// Active feature extractor.
    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    /// Mutable access to the active feature extractor.
    pub fn extractor_mut(&mut self) -> &mut FeatureExtractor {
        &mut self.extractor
    }

    /// Frozen snapshot taken at the last task boundary, if any.
    pub fn previous_extractor(&self) -> Option<&FeatureExtractor> {
        self.previous_extractor.as_ref()
    }

    /// All classifier heads, oldest first; the last one is being trained.
    pub fn heads(&self) -> &[ClassifierHead] {
        &self.heads
    }

    /// The head `forward` currently scores with.
    pub fn active_head(&self) -> &ClassifierHead {
        &self.heads[self.active_head]
    }

    /// Classes committed as learned, in learning order.
    pub fn learned_classes(&self) -> &[String] {
        &self.learned_classes
    }

    /// The task most recently entered via `begin_task`.
    pub fn current_task(&self) -> Option<&Task> {
        self.current_task.as_ref()
    }

    /// Exemplar prototype store.
    pub fn exemplars(&self) -> &ExemplarStore {
        &self.exemplars
    }

    /// Bookkeeping snapshot.
    pub fn stats(&self) -> ModelStats {
        let parameters = self.extractor.num_parameters()
            + self
                .heads
                .get(self.active_head)
                .map(|h| h.num_parameters())
                .unwrap_or(0);
        ModelStats {
            tasks_begun: self.heads.len(),
            classes_learned: self.learned_classes.len(),
            prototypes: self.exemplars.len(),
            parameters,
        }
    }
}

/// Scope guard returned by [`IncrementalModel::begin_task`].
///
/// Dereferences to the model so training code operates on it directly. On
/// drop the task's classes are appended to the learned set exactly once.
pub struct TaskScope<'a> {
    pending: Option<Vec<String>>,
    model: &'a mut IncrementalModel,
}

impl std::fmt::Debug for TaskScope<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskScope")
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

impl Deref for TaskScope<'_> {
    type Target = IncrementalModel;

    fn deref(&self) -> &IncrementalModel {
        self.model
    }
}

impl DerefMut for TaskScope<'_> {
    fn deref_mut(&mut self) -> &mut IncrementalModel {
        self.model
    }
}

impl Drop for TaskScope<'_> {
    fn drop(&mut self) {
        if let Some(classes) = self.pending.take() {
            self.model.learned_classes.extend(classes);
        }
    }
}

/// Scope guard returned by [`IncrementalModel::use_previous`].
///
/// Restores the pre-scope extractor and active head when dropped, whether
/// the wrapped computation finished or unwound partway through.
pub struct PreviousScope<'a> {
    saved_extractor: Option<FeatureExtractor>,
    saved_active: usize,
    model: &'a mut IncrementalModel,
}

impl std::fmt::Debug for PreviousScope<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviousScope")
            .field("saved_active", &self.saved_active)
            .finish_non_exhaustive()
    }
}

impl Deref for PreviousScope<'_> {
    type Target = IncrementalModel;

    fn deref(&self) -> &IncrementalModel {
        self.model
    }
}

impl DerefMut for PreviousScope<'_> {
    fn deref_mut(&mut self) -> &mut IncrementalModel {
        self.model
    }
}

impl Drop for PreviousScope<'_> {
    fn drop(&mut self) {
        if let Some(saved) = self.saved_extractor.take() {
            self.model.extractor = saved;
        }
        self.model.active_head = self.saved_active;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::s;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    fn task(index: usize, names: &[&str]) -> Task {
        Task::new(index, names.iter().map(|s| s.to_string()).collect())
    }

    fn model() -> IncrementalModel {
        IncrementalModel::new(6, 12, 4, 99)
    }

    #[test]
    fn test_begin_task_grows_head_with_warm_start() {
        let mut m = model();
        {
            let _scope = m.begin_task(&task(0, &["a", "b", "c"])).unwrap();
        }
        let first = m.heads()[0].clone();

        {
            let _scope = m.begin_task(&task(1, &["d", "e"])).unwrap();
        }
        let second = &m.heads()[1];

        assert_eq!(second.num_classes(), 5);
        assert_eq!(second.weights().slice(s![..3, ..]), first.weights());
    }

    #[test]
    fn test_learned_classes_commit_once_on_normal_exit() {
        let mut m = model();
        {
            let scope = m.begin_task(&task(0, &["a", "b"])).unwrap();
            // Not yet committed while the scope is live.
            assert!(scope.learned_classes().is_empty());
        }
        assert_eq!(m.learned_classes(), ["a", "b"]);

        // Re-learning a class is a configuration error.
        let err = m.begin_task(&task(1, &["b", "c"])).unwrap_err();
        assert!(matches!(err, IncrementalError::Config(_)));
        assert_eq!(m.learned_classes(), ["a", "b"]);
    }

    #[test]
    fn test_learned_classes_commit_on_unwind() {
        let mut m = model();
        let result = catch_unwind(AssertUnwindSafe(|| {
            let _scope = m.begin_task(&task(0, &["a", "b"])).unwrap();
            panic!("training exploded");
        }));
        assert!(result.is_err());
        // The commit must have happened exactly once despite the unwind.
        assert_eq!(m.learned_classes(), ["a", "b"]);
    }

    #[test]
    fn test_use_previous_restores_on_normal_exit() {
        let mut m = model();
        let batch = Array2::ones((2, 6));
        {
            let _scope = m.begin_task(&task(0, &["a", "b"])).unwrap();
        }
        {
            let _scope = m.begin_task(&task(1, &["c", "d"])).unwrap();
        }

        // Move the live extractor away from the snapshot.
        let (w1, _) = m.extractor_mut().layer1_mut();
        *w1 += 0.5;

        let live_logits = m.forward(&batch);
        assert_eq!(live_logits.ncols(), 4);

        {
            let scope = m.use_previous(None, None).unwrap();
            let past_logits = scope.forward(&batch);
            // Previous head only covers the first task's classes.
            assert_eq!(past_logits.ncols(), 2);
        }

        let restored = m.forward(&batch);
        assert_eq!(restored, live_logits);
    }

    #[test]
    fn test_use_previous_restores_on_unwind() {
        let mut m = model();
        let batch = Array2::ones((2, 6));
        {
            let _scope = m.begin_task(&task(0, &["a", "b"])).unwrap();
        }
        {
            let _scope = m.begin_task(&task(1, &["c", "d"])).unwrap();
        }
        let before = m.forward(&batch);

        let result = catch_unwind(AssertUnwindSafe(|| {
            let scope = m.use_previous(None, None).unwrap();
            let _ = scope.forward(&batch);
            panic!("evaluation exploded");
        }));
        assert!(result.is_err());
        assert_eq!(m.forward(&batch), before);
    }

    #[test]
    fn test_use_previous_before_any_task_fails() {
        let mut m = model();
        let err = m.use_previous(None, None).unwrap_err();
        assert!(matches!(err, IncrementalError::NoPreviousModel(_)));

        // One task is still not enough for the default previous head.
        {
            let _scope = m.begin_task(&task(0, &["a", "b"])).unwrap();
        }
        let err = m.use_previous(None, None).unwrap_err();
        assert!(matches!(err, IncrementalError::NoPreviousModel(_)));
    }

    #[test]
    fn test_nearest_prototype_requires_exemplars() {
        let mut m = model();
        {
            let _scope = m.begin_task(&task(0, &["a", "b"])).unwrap();
        }
        let err = m.predict_nearest_prototype(&Array2::ones((1, 6))).unwrap_err();
        assert!(matches!(err, IncrementalError::MissingPrototypes));
    }

    #[test]
    fn test_record_and_predict_exemplar_means() {
        let mut m = model();
        let classes = vec!["a".to_string(), "b".to_string()];
        {
            let _scope = m.begin_task(&task(0, &["a", "b"])).unwrap();
        }

        // Two well-separated clusters in input space.
        let mut images = Array2::zeros((8, 6));
        let mut labels = Vec::new();
        for i in 0..8 {
            let cls = i % 2;
            for j in 0..6 {
                images[[i, j]] = if cls == 0 { 1.0 } else { -1.0 } * (1.0 + 0.01 * j as f64);
            }
            labels.push(cls);
        }
        m.record_exemplar_means(&classes, &images, &labels).unwrap();

        // Every stored prototype has unit norm at computation time.
        for (_, prototype) in m.exemplars().iter() {
            let norm = prototype.mapv(|v| v * v).sum().sqrt();
            assert!((norm - 1.0).abs() < 1e-9);
        }

        let predictions = m.predict_nearest_prototype(&images).unwrap();
        assert_eq!(predictions, labels);
    }

    #[test]
    fn test_stats_tracks_growth() {
        let mut m = model();
        assert_eq!(m.stats().tasks_begun, 0);
        {
            let _scope = m.begin_task(&task(0, &["a", "b"])).unwrap();
        }
        let stats = m.stats();
        assert_eq!(stats.tasks_begun, 1);
        assert_eq!(stats.classes_learned, 2);
        assert_eq!(stats.prototypes, 0);
        assert!(stats.parameters > 0);
    }
}
