//! Basic class-incremental learning example
//!
//! This example demonstrates the incremental protocol on a small synthetic
//! class universe:
//! - Partitioning classes into a task sequence
//! - Learning tasks one by one with warm-started classifier heads
//! - Watching the accuracy matrix and forgetting metrics grow
//!
//! Run with: cargo run --example basic_incremental

use class_incremental_learning::prelude::*;
use class_incremental_learning::sink::render_matrix;

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    println!("=== Class-Incremental Learning Basic Example ===\n");

    let config = ExperimentConfig {
        input_dim: 16,   // Small flattened "images"
        hidden_dim: 32,  // Extractor hidden layer
        feature_dim: 16, // Embedding dimension
        task_count: 4,   // Four tasks of three classes each
        epochs: 15,
        batch_size: 16,
        learning_rate: 0.02,
        ..ExperimentConfig::default()
    };

    println!("Configuration:");
    println!("  Tasks: {}", config.task_count);
    println!("  Epochs per task: {}", config.epochs);
    println!("  Learning rate: {}", config.learning_rate);
    println!("  Momentum: {}\n", config.momentum);

    // Twelve synthetic classes, well separated in input space.
    let provider = SyntheticImages::new(12, config.input_dim, 32, 8, config.seed);
    let mut sink = TracingSink::new("basic-incremental");

    let report = run_experiment(&config, &provider, &mut sink)?;

    println!("\n=== Task Sequence ===\n");
    for task in &report.tasks {
        println!("Task {}: {:?}", task.index, task.classes);
    }

    println!("\n=== Accuracy Matrix ===\n");
    println!("{}", render_matrix(&report.accuracy_matrix));

    println!("=== Continual Learning Metrics ===\n");
    for (name, value) in &report.final_metrics {
        println!("{}: {:.4}", name, value);
    }
    if let Some(acc) = report.nearest_prototype_accuracy {
        println!("nearest-prototype accuracy: {:.4}", acc);
    }

    println!("\nDone!");
    Ok(())
}
