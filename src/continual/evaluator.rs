//! Continual-learning evaluation.
//!
//! After each task the evaluator scores the model on every task seen so far,
//! fills one column of the accuracy matrix and derives the scalar
//! continual-learning metrics from the populated submatrix. The matrix
//! rendering and every scalar go out through the metrics sink; sink failures
//! never abort the run.

use std::collections::BTreeMap;

use ndarray::{s, Array2};
use tracing::info;

use crate::continual::metrics;
use crate::data::TaskData;
use crate::model::incremental::IncrementalModel;
use crate::sink::{emit_matrix, emit_scalar, MetricsSink};
use crate::tasks::Task;
use crate::{IncrementalError, Result};

/// Result of one post-task evaluation pass.
#[derive(Debug, Clone)]
pub struct EvaluationOutcome {
    /// Snapshot of the full accuracy matrix.
    pub matrix: Array2<f64>,
    /// Scalar metrics; `None` after the first task (no history yet).
    pub metrics: Option<BTreeMap<String, f64>>,
}

/// Accuracy-matrix state machine, one column filled per completed task.
pub struct ContinualEvaluator {
    matrix: Array2<f64>,
    task_num: usize,
}

impl ContinualEvaluator {
    /// Create an evaluator for a sequence of `task_num` tasks.
    pub fn new(task_num: usize) -> Self {
        Self {
            matrix: Array2::zeros((task_num, task_num)),
            task_num,
        }
    }

    /// The accuracy matrix accumulated so far.
    pub fn matrix(&self) -> &Array2<f64> {
        &self.matrix
    }

    /// Evaluate after task `task_id` finished training.
    ///
    /// Scores the model on each task 0..=task_id with the current cumulative
    /// classifier, writes column `task_id`, and for task_id >= 1 computes the
    /// four continual-learning metrics over the populated submatrix. Always
    /// pushes a rendering of the full matrix through the sink.
    pub fn after_task(
        &mut self,
        task_id: usize,
        learned_tasks: &[Task],
        eval_sets: &[TaskData],
        model: &IncrementalModel,
        sink: &mut dyn MetricsSink,
    ) -> Result<EvaluationOutcome> {
        if task_id >= self.task_num {
            return Err(IncrementalError::Config(format!(
                "task id {} outside the {}-task sequence",
                task_id, self.task_num
            )));
        }
        if learned_tasks.len() != task_id + 1 || eval_sets.len() != task_id + 1 {
            return Err(IncrementalError::Config(format!(
                "expected {} learned tasks with evaluation data, got {} and {}",
                task_id + 1,
                learned_tasks.len(),
                eval_sets.len()
            )));
        }

        for (i, eval) in eval_sets.iter().enumerate() {
            let acc = model.top1_accuracy(&eval.images, &eval.labels);
            self.matrix[[i, task_id]] = acc;
            info!(
                "\ttest on task {}, test_acc={:.2}, {:?}",
                i, acc, learned_tasks[i].classes
            );
        }

        let metric_values = if task_id >= 1 {
            let current = self.matrix.slice(s![..=task_id, ..=task_id]);
            let mut values = BTreeMap::new();
            values.insert(
                "backward_transfer".to_string(),
                metrics::backward_transfer(current),
            );
            values.insert(
                "forgetting_rate".to_string(),
                metrics::forgetting_rate(current),
            );
            values.insert(
                "last_step_accuracy".to_string(),
                metrics::last_step_accuracy(current),
            );
            values.insert(
                "average_incremental_accuracy".to_string(),
                metrics::average_incremental_accuracy(current),
            );

            for (name, value) in &values {
                emit_scalar(
                    sink,
                    &format!("continual-learning-metrics/{}", name),
                    *value,
                    task_id,
                );
            }
            Some(values)
        } else {
            None
        };

        emit_matrix(sink, "cl-matrix", &self.matrix, task_id);

        Ok(EvaluationOutcome {
            matrix: self.matrix.clone(),
            metrics: metric_values,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DatasetProvider, Split, SyntheticImages};
    use crate::sink::MemorySink;

    fn setup(task_count: usize) -> (IncrementalModel, Vec<Task>, Vec<TaskData>) {
        let provider = SyntheticImages::new(task_count * 2, 6, 8, 4, 31);
        let names = provider.class_names().to_vec();
        let tasks: Vec<Task> = names
            .chunks(2)
            .enumerate()
            .map(|(i, chunk)| Task::new(i, chunk.to_vec()))
            .collect();

        let model = IncrementalModel::new(6, 12, 6, 13);
        let mut eval_sets = Vec::new();
        for (i, task) in tasks.iter().enumerate() {
            let mut data = provider.task_data(&task.classes, Split::Test).unwrap();
            for label in &mut data.labels {
                *label += i * 2;
            }
            eval_sets.push(data);
        }
        (model, tasks, eval_sets)
    }

    #[test]
    fn test_first_task_yields_no_metrics() {
        let (mut model, tasks, eval_sets) = setup(3);
        {
            let _scope = model.begin_task(&tasks[0]).unwrap();
        }

        let mut evaluator = ContinualEvaluator::new(3);
        let mut sink = MemorySink::new();
        let outcome = evaluator
            .after_task(0, &tasks[..1], &eval_sets[..1], &model, &mut sink)
            .unwrap();

        assert!(outcome.metrics.is_none());
        // Only the top-left cell may be populated; the rest stays sentinel.
        assert_eq!(outcome.matrix[[0, 1]], 0.0);
        assert_eq!(outcome.matrix[[1, 0]], 0.0);
        // The matrix artifact is rendered even without metrics.
        assert_eq!(sink.matrices.len(), 1);
    }

    #[test]
    fn test_second_task_fills_column_and_metrics() {
        // Scoring always uses the current cumulative head; scoring each past
        // task with its own contemporaneous head would be a different
        // (backward-transfer-oriented) measurement and is intentionally not
        // what happens here.
        let (mut model, tasks, eval_sets) = setup(3);
        {
            let _scope = model.begin_task(&tasks[0]).unwrap();
        }
        {
            let _scope = model.begin_task(&tasks[1]).unwrap();
        }

        let mut evaluator = ContinualEvaluator::new(3);
        let mut sink = MemorySink::new();
        evaluator
            .after_task(0, &tasks[..1], &eval_sets[..1], &model, &mut sink)
            .unwrap();
        let outcome = evaluator
            .after_task(1, &tasks[..2], &eval_sets[..2], &model, &mut sink)
            .unwrap();

        let metrics = outcome.metrics.expect("metrics expected for task 1");
        assert_eq!(metrics.len(), 4);
        assert!(metrics.contains_key("backward_transfer"));
        assert!(metrics.contains_key("average_incremental_accuracy"));
        assert!(sink
            .scalars
            .iter()
            .any(|(n, _, _)| n == "continual-learning-metrics/forgetting_rate"));

        // Upper triangle above the current column stays sentinel.
        assert_eq!(outcome.matrix[[0, 2]], 0.0);
        assert_eq!(outcome.matrix[[2, 2]], 0.0);
    }

    #[test]
    fn test_sink_failure_is_not_fatal() {
        struct Broken;
        impl MetricsSink for Broken {
            fn scalar(&mut self, _: &str, _: f64, _: usize) -> anyhow::Result<()> {
                anyhow::bail!("offline")
            }
            fn matrix(&mut self, _: &str, _: &Array2<f64>, _: usize) -> anyhow::Result<()> {
                anyhow::bail!("offline")
            }
        }

        let (mut model, tasks, eval_sets) = setup(2);
        {
            let _scope = model.begin_task(&tasks[0]).unwrap();
        }

        let mut evaluator = ContinualEvaluator::new(2);
        let outcome = evaluator.after_task(0, &tasks[..1], &eval_sets[..1], &model, &mut Broken);
        assert!(outcome.is_ok());
    }

    #[test]
    fn test_mismatched_history_is_rejected() {
        let (mut model, tasks, eval_sets) = setup(2);
        {
            let _scope = model.begin_task(&tasks[0]).unwrap();
        }

        let mut evaluator = ContinualEvaluator::new(2);
        let mut sink = MemorySink::new();
        let err = evaluator
            .after_task(1, &tasks[..1], &eval_sets[..1], &model, &mut sink)
            .unwrap_err();
        assert!(matches!(err, IncrementalError::Config(_)));

        let err = evaluator
            .after_task(5, &tasks[..1], &eval_sets[..1], &model, &mut sink)
            .unwrap_err();
        assert!(matches!(err, IncrementalError::Config(_)));
    }
}
