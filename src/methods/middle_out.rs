//! Middle-out reconciliation anchored at a named hierarchy level.

use faer::Mat;

use crate::context::ReconContext;
use crate::error::{Error, Result};

use super::top_down::share_of;
use super::{Capabilities, Disaggregation, MethodInputs, Reconciled, ReconciliationMethod};

/// Keeps forecasts at a chosen tag level, disaggregates below it by
/// historical shares, and rebuilds everything above it by aggregation.
///
/// Only defined for strictly hierarchical structures: the chosen level's
/// series must partition the bottom level.
#[derive(Debug, Clone)]
pub struct MiddleOut {
    level: String,
    method: Disaggregation,
}

impl MiddleOut {
    /// Middle-out anchored at `level` (a tag label) with the given share
    /// computation.
    pub fn new(level: impl Into<String>, method: Disaggregation) -> Self {
        Self {
            level: level.into(),
            method,
        }
    }
}

impl ReconciliationMethod for MiddleOut {
    fn name(&self) -> &'static str {
        "MiddleOut"
    }

    fn hyperparams(&self) -> Vec<(String, String)> {
        vec![
            ("level".to_string(), self.level.clone()),
            ("method".to_string(), self.method.as_str().to_string()),
        ]
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            fitted_residuals: false,
            confidence_level: false,
            bootstrap_samples: false,
        }
    }

    fn reconcile(&self, ctx: &ReconContext, inputs: &MethodInputs) -> Result<Reconciled> {
        let s = ctx.s().as_ref();
        let m = ctx.s().m();
        let n = ctx.s().n();
        let y_hat = inputs.y_hat();
        if y_hat.nrows() != m {
            return Err(Error::ShapeMismatch {
                expected: format!("{m} forecast rows"),
                actual: format!("{} forecast rows", y_hat.nrows()),
            });
        }
        let cut = ctx
            .tag(&self.level)
            .ok_or_else(|| Error::Other(format!("unknown hierarchy level '{}'", self.level)))?;

        // each bottom series must belong to exactly one cut node
        let mut owner: Vec<Option<usize>> = vec![None; n];
        for &node in cut {
            for j in 0..n {
                if s[(node, j)] != 0.0 {
                    if owner[j].is_some() {
                        return Err(Error::Other(format!(
                            "level '{}' does not partition the bottom series",
                            self.level
                        )));
                    }
                    owner[j] = Some(node);
                }
            }
        }
        let h = y_hat.ncols();
        let y = ctx.y_insample();
        let mut bottom = Mat::<f64>::zeros(n, h);
        for j in 0..n {
            let node = owner[j].ok_or_else(|| {
                Error::Other(format!(
                    "level '{}' does not partition the bottom series",
                    self.level
                ))
            })?;
            let leaf = ctx.idx_bottom()[j];
            let p = share_of(y, node, leaf, self.method).ok_or_else(|| {
                Error::Other(format!(
                    "middle-out shares undefined: no usable history between rows {node} and {leaf}"
                ))
            })?;
            for t in 0..h {
                bottom[(j, t)] = p * y_hat[(node, t)];
            }
        }
        let mean = s * bottom;
        Ok(Reconciled {
            mean,
            intervals: Vec::new(),
        })
    }
}
