//! Continual-learning metrics.
//!
//! Pure functions over an n x n accuracy matrix whose lower triangle is
//! populated: rows index the evaluated task, columns the training step after
//! which the evaluation ran. All metrics degrade to a defined value for
//! n = 1, where no backward history exists yet.

use ndarray::ArrayView2;

/// Average change in accuracy on earlier tasks after learning the last one.
///
/// `mean over i < n-1 of (M[i, n-1] - M[i, i])`; negative values mean
/// forgetting. Returns 0 for n = 1.
pub fn backward_transfer(matrix: ArrayView2<f64>) -> f64 {
    let n = matrix.nrows();
    debug_assert_eq!(n, matrix.ncols(), "accuracy matrix must be square");
    if n <= 1 {
        return 0.0;
    }
    let sum: f64 = (0..n - 1)
        .map(|i| matrix[[i, n - 1]] - matrix[[i, i]])
        .sum();
    sum / (n - 1) as f64
}

/// Average drop from each earlier task's peak accuracy to its final one.
///
/// `mean over i < n-1 of (max over j in [i, n-1) of M[i, j] - M[i, n-1])`.
/// Returns 0 for n = 1.
pub fn forgetting_rate(matrix: ArrayView2<f64>) -> f64 {
    let n = matrix.nrows();
    debug_assert_eq!(n, matrix.ncols(), "accuracy matrix must be square");
    if n <= 1 {
        return 0.0;
    }
    let sum: f64 = (0..n - 1)
        .map(|i| {
            let peak = (i..n - 1)
                .map(|j| matrix[[i, j]])
                .fold(f64::NEG_INFINITY, f64::max);
            peak - matrix[[i, n - 1]]
        })
        .sum();
    sum / (n - 1) as f64
}

/// Mean of the final column: accuracy across all tasks right after the most
/// recent one was learned.
pub fn last_step_accuracy(matrix: ArrayView2<f64>) -> f64 {
    let n = matrix.nrows();
    debug_assert_eq!(n, matrix.ncols(), "accuracy matrix must be square");
    if n == 0 {
        return 0.0;
    }
    let sum: f64 = (0..n).map(|i| matrix[[i, n - 1]]).sum();
    sum / n as f64
}

/// Mean over steps of the running average accuracy after each step.
///
/// For each column `j`, averages rows `0..=j`, then averages those values.
pub fn average_incremental_accuracy(matrix: ArrayView2<f64>) -> f64 {
    let n = matrix.nrows();
    debug_assert_eq!(n, matrix.ncols(), "accuracy matrix must be square");
    if n == 0 {
        return 0.0;
    }
    let sum: f64 = (0..n)
        .map(|j| {
            let column: f64 = (0..=j).map(|i| matrix[[i, j]]).sum();
            column / (j + 1) as f64
        })
        .sum();
    sum / n as f64
}
