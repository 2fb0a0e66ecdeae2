//! Top-down reconciliation: disaggregate the top series by historical shares.

use faer::{Mat, MatRef};

use crate::context::ReconContext;
use crate::error::{Error, Result};

use super::{finish, Capabilities, MethodInputs, Reconciled, ReconciliationMethod};

/// How historical shares are computed from the historical matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disaggregation {
    /// Mean over time of the per-period share `bottom_t / top_t`.
    AverageProportions,
    /// Ratio of the bottom series' mean to the top series' mean.
    ProportionAverages,
}

impl Disaggregation {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Disaggregation::AverageProportions => "average_proportions",
            Disaggregation::ProportionAverages => "proportion_averages",
        }
    }
}

/// Distributes the top aggregate's forecast to the bottom level using
/// historical shares; everything else is rebuilt by aggregation.
#[derive(Debug, Clone)]
pub struct TopDown {
    method: Disaggregation,
}

impl TopDown {
    /// Top-down with the given share computation.
    pub fn new(method: Disaggregation) -> Self {
        Self { method }
    }
}

impl ReconciliationMethod for TopDown {
    fn name(&self) -> &'static str {
        "TopDown"
    }

    fn hyperparams(&self) -> Vec<(String, String)> {
        vec![("method".to_string(), self.method.as_str().to_string())]
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            fitted_residuals: false,
            confidence_level: true,
            bootstrap_samples: true,
        }
    }

    fn reconcile(&self, ctx: &ReconContext, inputs: &MethodInputs) -> Result<Reconciled> {
        let s = ctx.s().as_ref();
        let m = ctx.s().m();
        let n = ctx.s().n();
        let top = top_row(s);
        let y = ctx.y_insample();
        let mut shares = Vec::with_capacity(n);
        for &leaf in ctx.idx_bottom() {
            let p = share_of(y, top, leaf, self.method).ok_or_else(|| {
                Error::Other(format!(
                    "top-down shares undefined: no usable history between rows {top} and {leaf}"
                ))
            })?;
            shares.push(p);
        }
        // P routes everything through the top row, so S*P is nonzero only in
        // the top column
        let mut sp = Mat::<f64>::zeros(m, m);
        for i in 0..m {
            let mut acc = 0.0;
            for j in 0..n {
                acc += s[(i, j)] * shares[j];
            }
            sp[(i, top)] = acc;
        }
        let w = Mat::<f64>::identity(m, m);
        finish(&sp, &w, inputs)
    }
}

/// Row with the largest row sum, ties to the first.
pub(super) fn top_row(s: MatRef<'_, f64>) -> usize {
    let mut best = 0;
    let mut best_sum = f64::NEG_INFINITY;
    for i in 0..s.nrows() {
        let mut sum = 0.0;
        for j in 0..s.ncols() {
            sum += s[(i, j)];
        }
        if sum > best_sum {
            best_sum = sum;
            best = i;
        }
    }
    best
}

/// Historical share of `leaf` within `top`, by the chosen computation.
///
/// Skips time steps without finite values; `None` when no usable step (or a
/// zero denominator) remains.
pub(super) fn share_of(
    y: MatRef<'_, f64>,
    top: usize,
    leaf: usize,
    method: Disaggregation,
) -> Option<f64> {
    let t = y.ncols();
    match method {
        Disaggregation::AverageProportions => {
            let mut acc = 0.0;
            let mut count = 0usize;
            for j in 0..t {
                let num = y[(leaf, j)];
                let den = y[(top, j)];
                if num.is_finite() && den.is_finite() && den != 0.0 {
                    acc += num / den;
                    count += 1;
                }
            }
            if count == 0 {
                None
            } else {
                Some(acc / count as f64)
            }
        }
        Disaggregation::ProportionAverages => {
            let leaf_mean = finite_mean(y, leaf)?;
            let top_mean = finite_mean(y, top)?;
            if top_mean == 0.0 {
                None
            } else {
                Some(leaf_mean / top_mean)
            }
        }
    }
}

fn finite_mean(y: MatRef<'_, f64>, row: usize) -> Option<f64> {
    let mut acc = 0.0;
    let mut count = 0usize;
    for j in 0..y.ncols() {
        if y[(row, j)].is_finite() {
            acc += y[(row, j)];
            count += 1;
        }
    }
    if count == 0 {
        None
    } else {
        Some(acc / count as f64)
    }
}
