//! Aggregation structure for a hierarchy of time series.
//!
//! Hierarchical data follows a structural constraint: $y = S \cdot b$, where
//! $b$ are the bottom-level series and $S$ is the summing matrix. Rows cover
//! every series in the hierarchy (aggregates and bottom level); columns cover
//! the bottom level only.

use faer::{Mat, MatRef};
use indexmap::IndexSet;

use crate::error::{Error, Result};

/// A labeled summing matrix for a hierarchy.
///
/// For a hierarchy with $m$ series and $n$ bottom-level series, $S$ is an
/// $m \times n$ binary matrix where $S_{ij} = 1$ if bottom series $j$ sums
/// into series $i$. Row order defines the canonical series ordering; every
/// column label must also appear as a row label.
#[derive(Debug, Clone)]
pub struct SummingMatrix {
    inner: Mat<f64>,
    rows: IndexSet<String>,
    cols: IndexSet<String>,
}

impl SummingMatrix {
    /// Create a summing matrix from a faer matrix and its axis labels.
    pub fn new(inner: Mat<f64>, rows: Vec<String>, cols: Vec<String>) -> Result<Self> {
        if rows.len() != inner.nrows() {
            return Err(Error::ShapeMismatch {
                expected: format!("{} row labels", inner.nrows()),
                actual: format!("{} row labels", rows.len()),
            });
        }
        if cols.len() != inner.ncols() {
            return Err(Error::ShapeMismatch {
                expected: format!("{} column labels", inner.ncols()),
                actual: format!("{} column labels", cols.len()),
            });
        }
        let mut row_set = IndexSet::with_capacity(rows.len());
        for label in rows {
            if !row_set.insert(label) {
                return Err(Error::InvalidParameter {
                    name: "rows",
                    message: "row labels must be unique",
                });
            }
        }
        let mut col_set = IndexSet::with_capacity(cols.len());
        for label in cols {
            if !col_set.insert(label) {
                return Err(Error::InvalidParameter {
                    name: "cols",
                    message: "column labels must be unique",
                });
            }
        }
        for label in &col_set {
            if !row_set.contains(label) {
                return Err(Error::HierarchyMismatch { uid: label.clone() });
            }
        }
        Ok(Self {
            inner,
            rows: row_set,
            cols: col_set,
        })
    }

    /// Number of series (rows).
    pub fn m(&self) -> usize {
        self.inner.nrows()
    }

    /// Number of bottom-level series (columns).
    pub fn n(&self) -> usize {
        self.inner.ncols()
    }

    /// Get the matrix reference.
    pub fn as_ref(&self) -> MatRef<'_, f64> {
        self.inner.as_ref()
    }

    /// Row labels in matrix order.
    pub fn row_labels(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().map(String::as_str)
    }

    /// Column labels in matrix order.
    pub fn column_labels(&self) -> impl Iterator<Item = &str> {
        self.cols.iter().map(String::as_str)
    }

    /// Position of a series in the row ordering.
    pub fn row_index(&self, uid: &str) -> Option<usize> {
        self.rows.get_index_of(uid)
    }

    /// Generate S for a 2-level hierarchy: one total over the given leaves.
    pub fn two_level(total: &str, leaves: &[&str]) -> Result<Self> {
        if leaves.is_empty() {
            return Err(Error::EmptyInput);
        }
        let n = leaves.len();
        let mut mat = Mat::<f64>::zeros(n + 1, n);
        // Total (row 0) is the sum of all leaves
        for j in 0..n {
            mat[(0, j)] = 1.0;
        }
        // Leaves (rows 1..n+1)
        for j in 0..n {
            mat[(j + 1, j)] = 1.0;
        }
        let mut rows = Vec::with_capacity(n + 1);
        rows.push(total.to_string());
        rows.extend(leaves.iter().map(|l| l.to_string()));
        let cols = leaves.iter().map(|l| l.to_string()).collect();
        Self::new(mat, rows, cols)
    }

    /// Restrict and reorder the rows to exactly `uids`.
    ///
    /// Columns are unchanged. Fails if a uid is absent from the row labels,
    /// or if the restriction drops a bottom-level series.
    pub fn restrict(&self, uids: &IndexSet<String>) -> Result<Self> {
        let mut picked = Vec::with_capacity(uids.len());
        for uid in uids {
            let pos = self
                .rows
                .get_index_of(uid.as_str())
                .ok_or_else(|| Error::HierarchyMismatch { uid: uid.clone() })?;
            picked.push(pos);
        }
        for label in &self.cols {
            if !uids.contains(label) {
                return Err(Error::HierarchyMismatch { uid: label.clone() });
            }
        }
        let n = self.n();
        let mut mat = Mat::<f64>::zeros(picked.len(), n);
        for (i, &src) in picked.iter().enumerate() {
            for j in 0..n {
                mat[(i, j)] = self.inner[(src, j)];
            }
        }
        Ok(Self {
            inner: mat,
            rows: uids.clone(),
            cols: self.cols.clone(),
        })
    }

    /// Positions of the bottom-level series within the row ordering.
    pub fn bottom_positions(&self) -> Result<Vec<usize>> {
        let mut idx = Vec::with_capacity(self.cols.len());
        for label in &self.cols {
            let pos = self
                .rows
                .get_index_of(label.as_str())
                .ok_or_else(|| Error::HierarchyMismatch { uid: label.clone() })?;
            idx.push(pos);
        }
        Ok(idx)
    }
}
