//! Train a class-incremental sequence end to end.
//!
//! Builds a synthetic class universe, partitions it into tasks, then runs
//! the full learn/evaluate loop while streaming metrics through tracing.
//! Optionally writes the final report as JSON.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use class_incremental_learning::prelude::*;
use class_incremental_learning::sink::render_matrix;

#[derive(Parser, Debug)]
#[command(
    name = "train",
    about = "Run a class-incremental continual learning experiment"
)]
struct Args {
    /// Name of this run, used in log lines.
    #[arg(long, default_value = "incremental")]
    run_name: String,

    /// Number of classes in the synthetic universe.
    #[arg(long, default_value_t = 20)]
    num_classes: usize,

    /// Number of tasks the universe is split into.
    #[arg(long, default_value_t = 5)]
    task_count: usize,

    /// Use the canonical deterministic task partition.
    #[arg(long)]
    fixed_tasks: bool,

    /// Training epochs per task.
    #[arg(long, default_value_t = 20)]
    epochs: usize,

    /// Training samples generated per class.
    #[arg(long, default_value_t = 64)]
    train_per_class: usize,

    /// Held-out samples generated per class.
    #[arg(long, default_value_t = 16)]
    test_per_class: usize,

    /// RNG seed for the partition, weight init and batch order.
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Write the final report as JSON to this path.
    #[arg(long)]
    report: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let run_name = format!("{}-{}", args.run_name, Utc::now().format("%m-%d %H.%M"));
    info!("run: {}", run_name);

    let config = ExperimentConfig {
        task_count: args.task_count,
        fixed_tasks: args.fixed_tasks,
        epochs: args.epochs,
        seed: args.seed,
        ..ExperimentConfig::default()
    };

    let provider = SyntheticImages::new(
        args.num_classes,
        config.input_dim,
        args.train_per_class,
        args.test_per_class,
        args.seed,
    );
    let mut sink = TracingSink::new(&run_name);

    let report = run_experiment(&config, &provider, &mut sink)?;

    println!("\nAccuracy matrix (rows: task, columns: step):");
    println!("{}", render_matrix(&report.accuracy_matrix));
    println!("Continual learning performance:");
    for (name, value) in &report.final_metrics {
        println!("  {}: {:.4}", name, value);
    }
    if let Some(acc) = report.nearest_prototype_accuracy {
        println!("  nearest-prototype accuracy: {:.4}", acc);
    }
    if let Some(hparams) = &report.hparams {
        println!(
            "  optimizer: {} (lr={}, momentum={}, weight_decay={}, dampening={})",
            hparams.optimizer,
            hparams.learning_rate,
            hparams.momentum,
            hparams.weight_decay,
            hparams.dampening
        );
    }

    if let Some(path) = &args.report {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, &report)?;
        info!("report written to {}", path.display());
    }

    Ok(())
}
