//! Minimum-trace reconciliation with selectable base weights.
//!
//! Solves $(S^T W^{-1} S) P = S^T W^{-1}$ for the projection $P$, then maps
//! base forecasts through $S \cdot P$. The weight matrix $W$ ranges from the
//! identity (OLS) to a full residual covariance (MinT).

use faer::prelude::*;
use faer::{Mat, MatRef};

use crate::context::ReconContext;
use crate::error::{Error, Result};

use super::{finish, Capabilities, FittedValues, MethodInputs, Reconciled, ReconciliationMethod};

/// Choice of base-space weight matrix $W$.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinTraceWeights {
    /// Identity weights: ordinary least squares.
    Ols,
    /// Diagonal weights from the summing-matrix row sums.
    WlsStruct,
    /// Diagonal weights from per-series residual variance.
    WlsVar,
    /// Full residual covariance over complete time steps.
    MintCov,
}

impl MinTraceWeights {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            MinTraceWeights::Ols => "ols",
            MinTraceWeights::WlsStruct => "wls_struct",
            MinTraceWeights::WlsVar => "wls_var",
            MinTraceWeights::MintCov => "mint_cov",
        }
    }

    fn needs_residuals(&self) -> bool {
        matches!(self, MinTraceWeights::WlsVar | MinTraceWeights::MintCov)
    }
}

/// Trace-minimizing projection $G = (S^T W^{-1} S)^{-1} S^T W^{-1}$.
#[derive(Debug, Clone)]
pub struct MinTrace {
    method: MinTraceWeights,
}

impl MinTrace {
    /// Minimum trace with the given weight choice.
    pub fn new(method: MinTraceWeights) -> Self {
        Self { method }
    }

    /// In-sample residuals `y - fitted`, series x time.
    ///
    /// Cells stay NaN wherever either side is unavailable; the weight
    /// builders skip them.
    fn residuals(&self, ctx: &ReconContext, inputs: &MethodInputs) -> Result<Mat<f64>> {
        let fitted = match inputs.fitted() {
            FittedValues::Available(f) => f,
            FittedValues::Missing | FittedValues::NotRequested => {
                return Err(Error::MissingResiduals {
                    method: self.label(),
                })
            }
        };
        let y = ctx.y_insample();
        if fitted.nrows() != y.nrows() || fitted.ncols() != y.ncols() {
            return Err(Error::ShapeMismatch {
                expected: format!("{}x{} fitted values", y.nrows(), y.ncols()),
                actual: format!("{}x{} fitted values", fitted.nrows(), fitted.ncols()),
            });
        }
        let mut r = Mat::<f64>::zeros(y.nrows(), y.ncols());
        for i in 0..y.nrows() {
            for j in 0..y.ncols() {
                r[(i, j)] = y[(i, j)] - fitted[(i, j)];
            }
        }
        Ok(r)
    }
}

impl ReconciliationMethod for MinTrace {
    fn name(&self) -> &'static str {
        "MinTrace"
    }

    fn hyperparams(&self) -> Vec<(String, String)> {
        vec![("method".to_string(), self.method.as_str().to_string())]
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            fitted_residuals: self.method.needs_residuals(),
            confidence_level: true,
            bootstrap_samples: true,
        }
    }

    fn reconcile(&self, ctx: &ReconContext, inputs: &MethodInputs) -> Result<Reconciled> {
        let s_mat = ctx.s().as_ref();
        let m = ctx.s().m();
        let w = match self.method {
            MinTraceWeights::Ols => Mat::<f64>::identity(m, m),
            MinTraceWeights::WlsStruct => {
                let mut w = Mat::<f64>::zeros(m, m);
                for i in 0..m {
                    let mut sum = 0.0;
                    for j in 0..ctx.s().n() {
                        sum += s_mat[(i, j)];
                    }
                    w[(i, i)] = sum;
                }
                w
            }
            MinTraceWeights::WlsVar => {
                let r = self.residuals(ctx, inputs)?;
                var_diagonal(r.as_ref())?
            }
            MinTraceWeights::MintCov => {
                let r = self.residuals(ctx, inputs)?;
                complete_case_cov(r.as_ref())?
            }
        };
        // Solve (S^T W^-1 S) P = S^T W^-1, then project through S P.
        let lu = w.full_piv_lu();
        let winv_s = lu.solve(s_mat);
        let st = s_mat.transpose();
        let lhs = &st * &winv_s;
        let p = lhs.full_piv_lu().solve(winv_s.transpose());
        let sp = s_mat * p;
        finish(&sp, &w, inputs)
    }
}

/// Diagonal matrix of per-row residual variance (ddof 1) over finite cells.
fn var_diagonal(r: MatRef<'_, f64>) -> Result<Mat<f64>> {
    let m = r.nrows();
    let mut w = Mat::<f64>::zeros(m, m);
    for i in 0..m {
        let mut cells = Vec::with_capacity(r.ncols());
        for j in 0..r.ncols() {
            if r[(i, j)].is_finite() {
                cells.push(r[(i, j)]);
            }
        }
        if cells.len() < 2 {
            return Err(Error::InsufficientHistory {
                needed: 2,
                found: cells.len(),
            });
        }
        let mean = cells.iter().sum::<f64>() / cells.len() as f64;
        let var = cells.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>()
            / (cells.len() - 1) as f64;
        w[(i, i)] = var;
    }
    Ok(w)
}

/// Residual covariance (ddof 1) over time steps where every series is finite.
fn complete_case_cov(r: MatRef<'_, f64>) -> Result<Mat<f64>> {
    let m = r.nrows();
    let mut cols = Vec::with_capacity(r.ncols());
    'col: for j in 0..r.ncols() {
        for i in 0..m {
            if !r[(i, j)].is_finite() {
                continue 'col;
            }
        }
        cols.push(j);
    }
    let k = cols.len();
    if k < 2 {
        return Err(Error::InsufficientHistory { needed: 2, found: k });
    }
    let mut means = vec![0.0; m];
    for i in 0..m {
        for &j in &cols {
            means[i] += r[(i, j)];
        }
        means[i] /= k as f64;
    }
    let mut w = Mat::<f64>::zeros(m, m);
    for a in 0..m {
        for b in a..m {
            let mut acc = 0.0;
            for &j in &cols {
                acc += (r[(a, j)] - means[a]) * (r[(b, j)] - means[b]);
            }
            let cov = acc / (k - 1) as f64;
            w[(a, b)] = cov;
            w[(b, a)] = cov;
        }
    }
    Ok(w)
}
