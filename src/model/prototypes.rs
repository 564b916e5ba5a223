//! Exemplar prototype storage.
//!
//! Maps each learned class to a mean feature vector ("prototype") used for
//! nearest-mean-of-exemplars classification. The store grows monotonically in
//! class registration order and never evicts: classes are not removed in this
//! design. Registration order doubles as the deterministic tie-break order
//! for nearest-prototype lookups.

use ndarray::{Array1, Array2, Axis};

/// Insertion-ordered class-name -> prototype store.
#[derive(Debug, Clone, Default)]
pub struct ExemplarStore {
    entries: Vec<(String, Array1<f64>)>,
}

impl ExemplarStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the prototype for `class`.
    ///
    /// First insertion fixes the class's position in registration order;
    /// replacing an existing prototype keeps that position.
    pub fn insert(&mut self, class: &str, prototype: Array1<f64>) {
        if let Some(entry) = self.entries.iter_mut().find(|(name, _)| name == class) {
            entry.1 = prototype;
        } else {
            self.entries.push((class.to_string(), prototype));
        }
    }

    /// Prototype for `class`, if registered.
    pub fn get(&self, class: &str) -> Option<&Array1<f64>> {
        self.entries
            .iter()
            .find(|(name, _)| name == class)
            .map(|(_, p)| p)
    }

    /// Class names in registration order.
    pub fn classes(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// (class, prototype) pairs in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Array1<f64>)> {
        self.entries.iter().map(|(name, p)| (name.as_str(), p))
    }

    /// Index of the prototype nearest to `query` by Euclidean distance.
    ///
    /// Ties resolve to the earliest-registered class. Returns `None` when the
    /// store is empty.
    pub fn nearest(&self, query: &Array1<f64>) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (idx, (_, prototype)) in self.entries.iter().enumerate() {
            let dist = (query - prototype).mapv(|v| v * v).sum().sqrt();
            match best {
                Some((_, best_dist)) if dist >= best_dist => {}
                _ => best = Some((idx, dist)),
            }
        }
        best.map(|(idx, _)| idx)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// L2-normalize each row of a batch; zero rows are left untouched.
pub fn normalize_rows(batch: &Array2<f64>) -> Array2<f64> {
    let mut out = batch.clone();
    for mut row in out.axis_iter_mut(Axis(0)) {
        let norm = row.mapv(|v| v * v).sum().sqrt();
        if norm > 0.0 {
            row.mapv_inplace(|v| v / norm);
        }
    }
    out
}

/// L2-normalize a single vector; zero vectors are left untouched.
pub fn normalize(vector: &Array1<f64>) -> Array1<f64> {
    let norm = vector.mapv(|v| v * v).sum().sqrt();
    if norm > 0.0 {
        vector / norm
    } else {
        vector.clone()
    }
}
