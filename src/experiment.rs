//! Experiment orchestration.
//!
//! Runs the whole class-incremental protocol: partition the class universe
//! into tasks, then for each task train inside a task scope, record exemplar
//! prototypes, and evaluate retention on everything learned so far. Strictly
//! sequential: a task never starts before the previous task's evaluation and
//! metrics are done.

use std::collections::BTreeMap;

use ndarray::Array2;
use serde::Serialize;
use tracing::{debug, info};

use crate::continual::evaluator::ContinualEvaluator;
use crate::continual::learner::{HparamRecord, TaskLearner};
use crate::data::{DatasetProvider, Split, TaskData};
use crate::model::incremental::IncrementalModel;
use crate::sink::{emit_scalar, MetricsSink};
use crate::tasks::{generate_tasks, Task, TaskSplit};
use crate::{ExperimentConfig, Result};

/// Everything a finished run reports back.
#[derive(Debug, Clone, Serialize)]
pub struct ExperimentReport {
    /// The task sequence that was learned, in order.
    pub tasks: Vec<Task>,
    /// Full accuracy matrix (rows: evaluated task, columns: training step).
    pub accuracy_matrix: Array2<f64>,
    /// Continual-learning metrics after the final task (empty for a
    /// single-task sequence).
    pub final_metrics: BTreeMap<String, f64>,
    /// Optimizer hyperparameters recorded from the first task.
    pub hparams: Option<HparamRecord>,
    /// Nearest-mean-of-exemplars top-1 accuracy over all held-out data.
    pub nearest_prototype_accuracy: Option<f64>,
}

/// Run the full incremental sequence against a dataset provider.
pub fn run_experiment(
    config: &ExperimentConfig,
    provider: &dyn DatasetProvider,
    sink: &mut dyn MetricsSink,
) -> Result<ExperimentReport> {
    let split = if config.fixed_tasks {
        TaskSplit::Canonical
    } else {
        TaskSplit::Shuffled { seed: config.seed }
    };
    let tasks = generate_tasks(provider.class_names(), config.task_count, split)?;

    info!("Task list:");
    for task in &tasks {
        info!("\tTask {}: {:?}", task.index, task.classes);
    }

    let mut model = IncrementalModel::new(
        config.input_dim,
        config.hidden_dim,
        config.feature_dim,
        config.seed,
    );
    let mut learner = TaskLearner::new(config);
    let mut evaluator = ContinualEvaluator::new(config.task_count);

    let mut learned_tasks: Vec<Task> = Vec::new();
    let mut eval_sets: Vec<TaskData> = Vec::new();
    let mut final_metrics = BTreeMap::new();

    for task in &tasks {
        let offset = model.learned_classes().len();
        let local_train = provider.task_data(&task.classes, Split::Train)?;
        let local_test = provider.task_data(&task.classes, Split::Test)?;
        let train = shift_labels(&local_train, offset);
        let test = shift_labels(&local_test, offset);

        {
            let mut scope = model.begin_task(task)?;
            info!("task_id={}, classes={:?}", task.index, task.classes);
            learner.learn_task(&mut scope, &train, &test, task.index, sink)?;
            scope.record_exemplar_means(&task.classes, &local_train.images, &local_train.labels)?;
        }

        learned_tasks.push(task.clone());
        eval_sets.push(test);

        let outcome =
            evaluator.after_task(task.index, &learned_tasks, &eval_sets, &model, sink)?;
        if let Some(metric_values) = outcome.metrics {
            debug!(
                "\t{}",
                metric_values
                    .iter()
                    .map(|(k, v)| format!("{}={:.2}", k, v))
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            final_metrics = metric_values;
        }
    }

    let nearest_prototype_accuracy = nearest_prototype_accuracy(&model, &eval_sets)?;
    if let Some(acc) = nearest_prototype_accuracy {
        emit_scalar(sink, "final/nme-top1-acc", acc, config.task_count);
    }

    info!("Classes learned: {:?}", model.learned_classes());
    info!("Continual learning performance:");
    for (name, value) in &final_metrics {
        info!("\t{}: {:.4}", name, value);
    }
    info!("Finished training");

    Ok(ExperimentReport {
        tasks,
        accuracy_matrix: evaluator.matrix().clone(),
        final_metrics,
        hparams: learner.hparams().cloned(),
        nearest_prototype_accuracy,
    })
}

/// Translate provider-local labels into the cumulative label space.
fn shift_labels(data: &TaskData, offset: usize) -> TaskData {
    TaskData {
        images: data.images.clone(),
        labels: data.labels.iter().map(|l| l + offset).collect(),
    }
}

/// Nearest-mean-of-exemplars accuracy over every held-out set seen so far.
///
/// Prototype registration order matches the cumulative label space, so the
/// predicted indices compare directly against the shifted labels.
fn nearest_prototype_accuracy(
    model: &IncrementalModel,
    eval_sets: &[TaskData],
) -> Result<Option<f64>> {
    if model.exemplars().is_empty() || eval_sets.is_empty() {
        return Ok(None);
    }
    let mut correct = 0usize;
    let mut total = 0usize;
    for eval in eval_sets {
        let predictions = model.predict_nearest_prototype(&eval.images)?;
        correct += predictions
            .iter()
            .zip(eval.labels.iter())
            .filter(|(p, l)| p == l)
            .count();
        total += eval.labels.len();
    }
    if total == 0 {
        return Ok(None);
    }
    Ok(Some(correct as f64 / total as f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SyntheticImages;
    use crate::sink::MemorySink;

    fn small_config() -> ExperimentConfig {
        ExperimentConfig {
            input_dim: 6,
            hidden_dim: 12,
            feature_dim: 6,
            task_count: 3,
            fixed_tasks: false,
            epochs: 3,
            batch_size: 8,
            learning_rate: 0.02,
            momentum: 0.9,
            weight_decay: 0.0,
            dampening: 0.0,
            log_times: 1,
            seed: 9,
        }
    }

    #[test]
    fn test_end_to_end_run() {
        let config = small_config();
        let provider = SyntheticImages::new(6, config.input_dim, 10, 4, 3);
        let mut sink = MemorySink::new();

        let report = run_experiment(&config, &provider, &mut sink).unwrap();

        assert_eq!(report.tasks.len(), 3);
        assert_eq!(report.accuracy_matrix.dim(), (3, 3));
        // Populated cells are accuracies; cells below the diagonal stay at
        // the zero sentinel.
        for value in report.accuracy_matrix.iter() {
            assert!((0.0..=1.0).contains(value));
        }
        assert_eq!(report.accuracy_matrix[[1, 0]], 0.0);
        assert_eq!(report.accuracy_matrix[[2, 0]], 0.0);
        assert_eq!(report.accuracy_matrix[[2, 1]], 0.0);

        assert_eq!(report.final_metrics.len(), 4);
        assert!(report.hparams.is_some());
        assert!(report.nearest_prototype_accuracy.is_some());

        // One matrix artifact per task, metrics only from the second on.
        assert_eq!(sink.matrices.len(), 3);
        assert!(sink
            .scalars
            .iter()
            .any(|(n, _, _)| n == "continual-learning-metrics/backward_transfer"));
    }

    #[test]
    fn test_run_is_seed_reproducible() {
        let config = small_config();
        let provider = SyntheticImages::new(6, config.input_dim, 10, 4, 3);

        let a = run_experiment(&config, &provider, &mut MemorySink::new()).unwrap();
        let b = run_experiment(&config, &provider, &mut MemorySink::new()).unwrap();
        assert_eq!(a.accuracy_matrix, b.accuracy_matrix);
        assert_eq!(a.tasks, b.tasks);
    }

    #[test]
    fn test_indivisible_universe_fails_fast() {
        let mut config = small_config();
        config.task_count = 4;
        let provider = SyntheticImages::new(6, config.input_dim, 10, 4, 3);

        let err = run_experiment(&config, &provider, &mut MemorySink::new()).unwrap_err();
        assert!(matches!(err, crate::IncrementalError::Config(_)));
    }
}
