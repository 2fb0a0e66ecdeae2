//! Reconciliation methods and their dispatch contract.
//!
//! Every method maps base forecasts to coherent forecasts through a
//! projection: $\tilde{y} = S \cdot P \cdot \hat{y}$, with $P$ chosen by the
//! method. What varies is how $P$ is built and which optional inputs the
//! method consumes:
//!
//! ```text
//! Method               │ fitted residuals │ confidence level │ bootstrap paths
//! ─────────────────────┼──────────────────┼──────────────────┼────────────────
//! BottomUp             │        no        │       yes        │      yes
//! TopDown              │        no        │       yes        │      yes
//! MiddleOut            │        no        │        no        │       no
//! MinTrace (ols,       │        no        │       yes        │      yes
//!   wls_struct)        │                  │                  │
//! MinTrace (wls_var,   │       yes        │       yes        │      yes
//!   mint_cov)          │                  │                  │
//! ```
//!
//! Capabilities are declared statically via [`Capabilities`]; the dispatcher
//! stages only what a method declares, bundled per iteration into
//! [`MethodInputs`]. Interval construction is shared: Gaussian propagation of
//! a staged per-cell scale through $S \cdot P$, or per-cell quantiles over
//! reconciled bootstrap paths.

use faer::{Mat, MatRef};

use crate::context::ReconContext;
use crate::error::{Error, Result};
use crate::intervals::{one_sided_z, validate_level};

mod bottom_up;
mod middle_out;
mod min_trace;
mod top_down;

pub use bottom_up::BottomUp;
pub use middle_out::MiddleOut;
pub use min_trace::{MinTrace, MinTraceWeights};
pub use top_down::{Disaggregation, TopDown};

/// Optional inputs a method declares it can consume.
///
/// Declared once at construction; the dispatcher never offers an input the
/// descriptor does not admit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// The method reads a model's in-sample fitted values.
    pub fitted_residuals: bool,
    /// The method builds prediction intervals at requested levels.
    pub confidence_level: bool,
    /// The method builds empirical intervals from bootstrap paths.
    pub bootstrap_samples: bool,
}

/// In-sample fitted values staged for one dispatch iteration.
#[derive(Debug, Clone, Default)]
pub enum FittedValues {
    /// The method's capabilities did not ask for fitted values.
    #[default]
    NotRequested,
    /// The method asked, but the historical table has no matching column.
    Missing,
    /// Fitted values pivoted to series x time, NaN where unavailable.
    Available(Mat<f64>),
}

/// Per-iteration input bundle for one (method, model) task.
///
/// Built fresh for every invocation and dropped with it; the only thing
/// shared across tasks is the immutable [`ReconContext`].
#[derive(Debug, Clone)]
pub struct MethodInputs {
    y_hat: Mat<f64>,
    fitted: FittedValues,
    levels: Option<Vec<f64>>,
    sigmah: Option<Mat<f64>>,
    bootstrap_paths: Option<Vec<Mat<f64>>>,
}

impl MethodInputs {
    /// Bundle holding only the mandatory point-forecast matrix.
    pub fn new(y_hat: Mat<f64>) -> Self {
        Self {
            y_hat,
            fitted: FittedValues::NotRequested,
            levels: None,
            sigmah: None,
            bootstrap_paths: None,
        }
    }

    /// Stage fitted values (or their explicit absence).
    pub fn with_fitted(mut self, fitted: FittedValues) -> Self {
        self.fitted = fitted;
        self
    }

    /// Stage requested confidence levels.
    pub fn with_levels(mut self, levels: Vec<f64>) -> Self {
        self.levels = Some(levels);
        self
    }

    /// Stage a per-cell Gaussian scale estimate.
    pub fn with_sigmah(mut self, sigmah: Mat<f64>) -> Self {
        self.sigmah = Some(sigmah);
        self
    }

    /// Stage bootstrap sample paths.
    pub fn with_bootstrap_paths(mut self, paths: Vec<Mat<f64>>) -> Self {
        self.bootstrap_paths = Some(paths);
        self
    }

    /// Point-forecast matrix, series x horizon.
    pub fn y_hat(&self) -> MatRef<'_, f64> {
        self.y_hat.as_ref()
    }

    /// Staged fitted values.
    pub fn fitted(&self) -> &FittedValues {
        &self.fitted
    }

    /// Staged confidence levels, if any.
    pub fn levels(&self) -> Option<&[f64]> {
        self.levels.as_deref()
    }

    /// Staged Gaussian scale, if any.
    pub fn sigmah(&self) -> Option<MatRef<'_, f64>> {
        self.sigmah.as_ref().map(Mat::as_ref)
    }

    /// Staged bootstrap paths, if any.
    pub fn bootstrap_paths(&self) -> Option<&[Mat<f64>]> {
        self.bootstrap_paths.as_deref()
    }
}

/// Lower/upper bound pair at one confidence level, series x horizon.
#[derive(Debug, Clone)]
pub struct LevelInterval {
    /// Confidence level in percent.
    pub level: f64,
    /// Lower bounds.
    pub lower: Mat<f64>,
    /// Upper bounds.
    pub upper: Mat<f64>,
}

/// Result of one method invocation.
#[derive(Debug, Clone)]
pub struct Reconciled {
    /// Coherent mean forecasts, series x horizon.
    pub mean: Mat<f64>,
    /// One entry per staged confidence level; empty when none were staged.
    pub intervals: Vec<LevelInterval>,
}

/// A pluggable reconciliation transform.
///
/// Constructed once per run, invoked once per model, stateless across
/// invocations apart from hyperparameters fixed at construction.
pub trait ReconciliationMethod: Send + Sync {
    /// Canonical method name.
    fn name(&self) -> &'static str;

    /// Hyperparameters as name-value pairs; empty when the method has none.
    fn hyperparams(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Statically declared optional-input capabilities.
    fn capabilities(&self) -> Capabilities;

    /// Output label: canonical name plus a stable, order-independent
    /// serialization of the hyperparameters.
    fn label(&self) -> String {
        method_label(self.name(), &self.hyperparams())
    }

    /// Map base forecasts to coherent forecasts.
    fn reconcile(&self, ctx: &ReconContext, inputs: &MethodInputs) -> Result<Reconciled>;
}

/// Join a method name with sorted `name-value` hyperparameter pairs.
pub fn method_label(name: &str, hyperparams: &[(String, String)]) -> String {
    if hyperparams.is_empty() {
        return name.to_string();
    }
    let mut parts: Vec<String> = hyperparams
        .iter()
        .map(|(k, v)| format!("{k}-{v}"))
        .collect();
    parts.sort();
    format!("{name}_{}", parts.join("_"))
}

/// Apply a projection and build whatever intervals the staged inputs allow.
///
/// `sp` is the full projection $S \cdot P$ (series x series); `w` is the
/// method's base-space weight matrix, used only for Gaussian propagation.
pub(crate) fn finish(sp: &Mat<f64>, w: &Mat<f64>, inputs: &MethodInputs) -> Result<Reconciled> {
    let m = sp.nrows();
    if inputs.y_hat().nrows() != sp.ncols() {
        return Err(Error::ShapeMismatch {
            expected: format!("{} forecast rows", sp.ncols()),
            actual: format!("{} forecast rows", inputs.y_hat().nrows()),
        });
    }
    let mean = sp.as_ref() * inputs.y_hat();
    let mut intervals = Vec::new();
    if let Some(levels) = inputs.levels() {
        if let Some(paths) = inputs.bootstrap_paths() {
            intervals = bootstrap_intervals(sp, paths, levels)?;
        } else if let Some(sigmah) = inputs.sigmah() {
            if w.nrows() != m || w.ncols() != m {
                return Err(Error::ShapeMismatch {
                    expected: format!("{m}x{m}"),
                    actual: format!("{}x{}", w.nrows(), w.ncols()),
                });
            }
            intervals = gaussian_intervals(sp, w, sigmah, levels, &mean)?;
        }
    }
    Ok(Reconciled { mean, intervals })
}

/// Propagate a per-cell Gaussian scale through the projection.
///
/// The base-space correlation comes from `w`; at each horizon step the scale
/// vector rebuilds a covariance $D_t R D_t$, and the reconciled variance is
/// its quadratic form under $S \cdot P$.
fn gaussian_intervals(
    sp: &Mat<f64>,
    w: &Mat<f64>,
    sigmah: MatRef<'_, f64>,
    levels: &[f64],
    mean: &Mat<f64>,
) -> Result<Vec<LevelInterval>> {
    let m = sp.nrows();
    let h = sigmah.ncols();
    if sigmah.nrows() != m {
        return Err(Error::ShapeMismatch {
            expected: format!("{m} scale rows"),
            actual: format!("{} scale rows", sigmah.nrows()),
        });
    }
    let mut corr = Mat::<f64>::zeros(m, m);
    for i in 0..m {
        for j in 0..m {
            let d = (w[(i, i)] * w[(j, j)]).sqrt();
            corr[(i, j)] = if d > 0.0 { w[(i, j)] / d } else { 0.0 };
        }
    }
    let mut scale = Mat::<f64>::zeros(m, h);
    for t in 0..h {
        for i in 0..m {
            let mut acc = 0.0;
            for a in 0..m {
                let spa = sp[(i, a)];
                if spa == 0.0 {
                    continue;
                }
                for b in 0..m {
                    acc += spa * sigmah[(a, t)] * corr[(a, b)] * sigmah[(b, t)] * sp[(i, b)];
                }
            }
            scale[(i, t)] = acc.max(0.0).sqrt();
        }
    }
    let mut out = Vec::with_capacity(levels.len());
    for &level in levels {
        let z = one_sided_z(level)?;
        let mut lower = Mat::<f64>::zeros(m, h);
        let mut upper = Mat::<f64>::zeros(m, h);
        for i in 0..m {
            for t in 0..h {
                lower[(i, t)] = mean[(i, t)] - z * scale[(i, t)];
                upper[(i, t)] = mean[(i, t)] + z * scale[(i, t)];
            }
        }
        out.push(LevelInterval {
            level,
            lower,
            upper,
        });
    }
    Ok(out)
}

/// Empirical intervals: reconcile every path, take per-cell quantiles.
fn bootstrap_intervals(
    sp: &Mat<f64>,
    paths: &[Mat<f64>],
    levels: &[f64],
) -> Result<Vec<LevelInterval>> {
    if paths.is_empty() {
        return Err(Error::EmptyInput);
    }
    let m = sp.nrows();
    let h = paths[0].ncols();
    let mut reconciled = Vec::with_capacity(paths.len());
    for path in paths {
        if path.nrows() != sp.ncols() || path.ncols() != h {
            return Err(Error::ShapeMismatch {
                expected: format!("{}x{h}", sp.ncols()),
                actual: format!("{}x{}", path.nrows(), path.ncols()),
            });
        }
        reconciled.push(sp * path);
    }
    let mut bounds: Vec<(f64, Mat<f64>, Mat<f64>)> = Vec::with_capacity(levels.len());
    for &level in levels {
        validate_level(level)?;
        bounds.push((level, Mat::<f64>::zeros(m, h), Mat::<f64>::zeros(m, h)));
    }
    let mut cell = vec![0.0; paths.len()];
    for i in 0..m {
        for t in 0..h {
            for (k, path) in reconciled.iter().enumerate() {
                cell[k] = path[(i, t)];
            }
            cell.sort_by(f64::total_cmp);
            for (level, lower, upper) in bounds.iter_mut() {
                let lo_q = (100.0 - *level) / 200.0;
                lower[(i, t)] = quantile_sorted(&cell, lo_q);
                upper[(i, t)] = quantile_sorted(&cell, lo_q + *level / 100.0);
            }
        }
    }
    Ok(bounds
        .into_iter()
        .map(|(level, lower, upper)| LevelInterval {
            level,
            lower,
            upper,
        })
        .collect())
}

/// Linear-interpolation quantile over an ascending slice.
fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_label_no_hyperparams() {
        assert_eq!(method_label("BottomUp", &[]), "BottomUp");
    }

    #[test]
    fn test_method_label_sorted_pairs() {
        let a = method_label(
            "MiddleOut",
            &[
                ("method".to_string(), "average_proportions".to_string()),
                ("level".to_string(), "State".to_string()),
            ],
        );
        let b = method_label(
            "MiddleOut",
            &[
                ("level".to_string(), "State".to_string()),
                ("method".to_string(), "average_proportions".to_string()),
            ],
        );
        assert_eq!(a, b);
        assert_eq!(a, "MiddleOut_level-State_method-average_proportions");
    }

    #[test]
    fn test_quantile_sorted_interpolates() {
        let vals = [1.0, 2.0, 3.0, 4.0];
        assert!((quantile_sorted(&vals, 0.0) - 1.0).abs() < 1e-12);
        assert!((quantile_sorted(&vals, 1.0) - 4.0).abs() < 1e-12);
        assert!((quantile_sorted(&vals, 0.5) - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_gaussian_intervals_identity_projection() -> Result<()> {
        // SP = I, W = I: reconciled scale equals the staged scale
        let m = 2;
        let sp = Mat::<f64>::identity(m, m);
        let w = Mat::<f64>::identity(m, m);
        let mut sigmah = Mat::<f64>::zeros(m, 1);
        sigmah[(0, 0)] = 2.0;
        sigmah[(1, 0)] = 0.5;
        let mean = Mat::<f64>::zeros(m, 1);
        let out = gaussian_intervals(&sp, &w, sigmah.as_ref(), &[80.0], &mean)?;
        let z = one_sided_z(80.0)?;
        assert_eq!(out.len(), 1);
        assert!((out[0].lower[(0, 0)] + 2.0 * z).abs() < 1e-10);
        assert!((out[0].upper[(0, 0)] - 2.0 * z).abs() < 1e-10);
        assert!((out[0].upper[(1, 0)] - 0.5 * z).abs() < 1e-10);
        Ok(())
    }

    #[test]
    fn test_bootstrap_intervals_from_known_paths() -> Result<()> {
        // single series, identity projection, paths 1..=5
        let sp = Mat::<f64>::identity(1, 1);
        let mut paths = Vec::new();
        for v in 1..=5 {
            let mut p = Mat::<f64>::zeros(1, 1);
            p[(0, 0)] = v as f64;
            paths.push(p);
        }
        let out = bootstrap_intervals(&sp, &paths, &[80.0])?;
        // quantiles at 0.1 and 0.9 over [1,2,3,4,5]
        assert!((out[0].lower[(0, 0)] - 1.4).abs() < 1e-12);
        assert!((out[0].upper[(0, 0)] - 4.6).abs() < 1e-12);
        Ok(())
    }
}
