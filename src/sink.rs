//! Metrics and artifact sinks.
//!
//! Scalar metrics and accuracy-matrix renderings flow out of the training
//! loop through the [`MetricsSink`] seam. Sink failures are always
//! best-effort for callers: the emit helpers log a warning and carry on, so
//! a broken dashboard can never abort a run.

use ndarray::Array2;
use tracing::{info, warn};

/// Destination for scalar metrics and matrix artifacts.
pub trait MetricsSink {
    /// Record a named scalar at a given step.
    fn scalar(&mut self, name: &str, value: f64, step: usize) -> anyhow::Result<()>;

    /// Record a matrix artifact (e.g. the accuracy matrix) at a given step.
    fn matrix(&mut self, tag: &str, matrix: &Array2<f64>, step: usize) -> anyhow::Result<()>;
}

/// Emit a scalar, downgrading sink failures to a warning.
pub fn emit_scalar(sink: &mut dyn MetricsSink, name: &str, value: f64, step: usize) {
    if let Err(err) = sink.scalar(name, value, step) {
        warn!("metrics sink rejected scalar '{}': {:#}", name, err);
    }
}

/// Emit a matrix artifact, downgrading sink failures to a warning.
pub fn emit_matrix(sink: &mut dyn MetricsSink, tag: &str, matrix: &Array2<f64>, step: usize) {
    if let Err(err) = sink.matrix(tag, matrix, step) {
        warn!("metrics sink rejected matrix '{}': {:#}", tag, err);
    }
}

/// Render a matrix as aligned text rows for log output.
pub fn render_matrix(matrix: &Array2<f64>) -> String {
    let mut out = String::new();
    for row in matrix.rows() {
        let cells: Vec<String> = row.iter().map(|v| format!("{:>6.3}", v)).collect();
        out.push_str(&cells.join(" "));
        out.push('\n');
    }
    out
}

/// Sink that writes everything through `tracing` at info level.
pub struct TracingSink {
    run_name: String,
}

impl TracingSink {
    pub fn new(run_name: impl Into<String>) -> Self {
        Self {
            run_name: run_name.into(),
        }
    }
}

impl MetricsSink for TracingSink {
    fn scalar(&mut self, name: &str, value: f64, step: usize) -> anyhow::Result<()> {
        info!("[{}] {} = {:.4} (step {})", self.run_name, name, value, step);
        Ok(())
    }

    fn matrix(&mut self, tag: &str, matrix: &Array2<f64>, step: usize) -> anyhow::Result<()> {
        info!(
            "[{}] {} (step {}):\n{}",
            self.run_name,
            tag,
            step,
            render_matrix(matrix)
        );
        Ok(())
    }
}

/// Sink that retains everything in memory; used by tests and reports.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub scalars: Vec<(String, f64, usize)>,
    pub matrices: Vec<(String, Array2<f64>, usize)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest value recorded under `name`, if any.
    pub fn latest(&self, name: &str) -> Option<f64> {
        self.scalars
            .iter()
            .rev()
            .find(|(n, _, _)| n == name)
            .map(|(_, v, _)| *v)
    }
}

impl MetricsSink for MemorySink {
    fn scalar(&mut self, name: &str, value: f64, step: usize) -> anyhow::Result<()> {
        self.scalars.push((name.to_string(), value, step));
        Ok(())
    }

    fn matrix(&mut self, tag: &str, matrix: &Array2<f64>, step: usize) -> anyhow::Result<()> {
        self.matrices.push((tag.to_string(), matrix.clone(), step));
        Ok(())
    }
}

/// Sink that discards everything.
#[derive(Debug, Default)]
pub struct NullSink;

impl MetricsSink for NullSink {
    fn scalar(&mut self, _name: &str, _value: f64, _step: usize) -> anyhow::Result<()> {
        Ok(())
    }

    fn matrix(&mut self, _tag: &str, _matrix: &Array2<f64>, _step: usize) -> anyhow::Result<()> {
        Ok(())
    }
}
