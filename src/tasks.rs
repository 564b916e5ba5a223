//! Task sequence generation.
//!
//! A task is an ordered group of class names introduced for training at one
//! stage of the incremental sequence. The generator partitions the full class
//! universe into disjoint tasks of equal size, either in a canonical
//! reproducible order or shuffled once per run.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::{IncrementalError, Result};

/// A disjoint ordered subset of classes learned at one incremental stage.
///
/// Identity is the position in the sequence plus the class-name set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Position of this task in the sequence.
    pub index: usize,
    /// Ordered class names belonging to this task.
    pub classes: Vec<String>,
}

impl Task {
    /// Create a new task.
    pub fn new(index: usize, classes: Vec<String>) -> Self {
        Self { index, classes }
    }

    /// Number of classes in this task.
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Whether the task holds no classes.
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// How the class universe is partitioned into tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskSplit {
    /// Deterministic partition: classes sorted lexicographically, then
    /// chunked. Byte-identical across runs, used for benchmark comparability.
    Canonical,
    /// The universe is shuffled once with the given seed, then chunked.
    Shuffled { seed: u64 },
}

/// Partition `universe` into `task_count` disjoint tasks of equal size.
///
/// Every class appears in exactly one task. Fails with a configuration error
/// when the universe size is not evenly divisible by `task_count`.
pub fn generate_tasks(universe: &[String], task_count: usize, split: TaskSplit) -> Result<Vec<Task>> {
    if task_count == 0 {
        return Err(IncrementalError::Config(
            "task count must be positive".to_string(),
        ));
    }
    if universe.is_empty() {
        return Err(IncrementalError::Config(
            "class universe is empty".to_string(),
        ));
    }
    if universe.len() % task_count != 0 {
        return Err(IncrementalError::Config(format!(
            "{} classes cannot be split into {} equal tasks",
            universe.len(),
            task_count
        )));
    }

    let mut names: Vec<String> = universe.to_vec();
    match split {
        TaskSplit::Canonical => names.sort(),
        TaskSplit::Shuffled { seed } => {
            let mut rng = StdRng::seed_from_u64(seed);
            names.shuffle(&mut rng);
        }
    }

    let per_task = names.len() / task_count;
    Ok(names
        .chunks(per_task)
        .enumerate()
        .map(|(index, chunk)| Task::new(index, chunk.to_vec()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn universe(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("class_{:02}", i)).collect()
    }

    #[test]
    fn test_canonical_is_reproducible() {
        let names = universe(20);
        let a = generate_tasks(&names, 4, TaskSplit::Canonical).unwrap();
        let b = generate_tasks(&names, 4, TaskSplit::Canonical).unwrap();
        assert_eq!(a, b);

        // Order of the input universe must not matter either.
        let mut reversed = names.clone();
        reversed.reverse();
        let c = generate_tasks(&reversed, 4, TaskSplit::Canonical).unwrap();
        assert_eq!(a, c);
    }

    #[test]
    fn test_shuffled_partition_covers_universe() {
        let names = universe(30);
        let tasks = generate_tasks(&names, 5, TaskSplit::Shuffled { seed: 123 }).unwrap();

        assert_eq!(tasks.len(), 5);
        for task in &tasks {
            assert_eq!(task.len(), 6);
        }

        let seen: HashSet<&String> = tasks.iter().flat_map(|t| t.classes.iter()).collect();
        assert_eq!(seen.len(), 30);
        for name in &names {
            assert!(seen.contains(name));
        }
    }

    #[test]
    fn test_shuffled_is_seed_deterministic() {
        let names = universe(12);
        let a = generate_tasks(&names, 3, TaskSplit::Shuffled { seed: 7 }).unwrap();
        let b = generate_tasks(&names, 3, TaskSplit::Shuffled { seed: 7 }).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_indivisible_universe_is_rejected() {
        let names = universe(10);
        let err = generate_tasks(&names, 3, TaskSplit::Canonical).unwrap_err();
        assert!(matches!(err, IncrementalError::Config(_)));

        let err = generate_tasks(&names, 0, TaskSplit::Canonical).unwrap_err();
        assert!(matches!(err, IncrementalError::Config(_)));
    }

    #[test]
    fn test_task_indices_are_sequential() {
        let names = universe(8);
        let tasks = generate_tasks(&names, 4, TaskSplit::Shuffled { seed: 1 }).unwrap();
        for (i, task) in tasks.iter().enumerate() {
            assert_eq!(task.index, i);
        }
    }
}
