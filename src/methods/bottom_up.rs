//! Bottom-up reconciliation.

use faer::Mat;

use crate::context::ReconContext;
use crate::error::Result;

use super::{finish, Capabilities, MethodInputs, Reconciled, ReconciliationMethod};

/// Replaces every aggregate forecast with the sum of its bottom-level
/// forecasts; bottom-level forecasts pass through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct BottomUp;

impl BottomUp {
    /// Bottom-up method.
    pub fn new() -> Self {
        Self
    }
}

impl ReconciliationMethod for BottomUp {
    fn name(&self) -> &'static str {
        "BottomUp"
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
        // P picks bottom rows, so S*P keeps only the bottom columns of S
        let mut sp = Mat::<f64>::zeros(m, m);
        for (j, &pos) in ctx.idx_bottom().iter().enumerate() {
            for i in 0..m {
                sp[(i, pos)] = s[(i, j)];
            }
        }
        let w = Mat::<f64>::identity(m, m);
        finish(&sp, &w, inputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::SummingMatrix;
    use crate::context::{ReconContext, TagMap};
    use crate::frame::PanelFrame;
    use crate::intervals::one_sided_z;
    use crate::Result;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn stamps(n: usize) -> Vec<DateTime<Utc>> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..n).map(|i| start + Duration::hours(i as i64)).collect()
    }

    fn frame(ids: &[&str], n_stamps: usize, col: (&str, Vec<f64>)) -> Result<PanelFrame> {
        let ts = stamps(n_stamps);
        let mut uid = Vec::new();
        let mut ds = Vec::new();
        for id in ids {
            for t in &ts {
                uid.push(id.to_string());
                ds.push(*t);
            }
        }
        PanelFrame::new(uid, ds)?.with_column(col.0, col.1)
    }

    fn star_context() -> Result<ReconContext> {
        let s = SummingMatrix::two_level("total", &["l1", "l2"])?;
        let forecasts = frame(&["total", "l1", "l2"], 1, ("naive", vec![3.0, 1.0, 1.0]))?;
        let history = frame(&["total", "l1", "l2"], 2, ("y", vec![2.0; 6]))?;
        ReconContext::build(&forecasts, &history, &s, &TagMap::new())
    }

    #[test]
    fn test_bottom_up_reaggregates() -> Result<()> {
        let ctx = star_context()?;
        let mut y_hat = Mat::<f64>::zeros(3, 1);
        y_hat[(0, 0)] = 3.0;
        y_hat[(1, 0)] = 1.0;
        y_hat[(2, 0)] = 1.0;
        let out = BottomUp::new().reconcile(&ctx, &MethodInputs::new(y_hat))?;
        assert!((out.mean[(0, 0)] - 2.0).abs() < 1e-10);
        assert!((out.mean[(1, 0)] - 1.0).abs() < 1e-10);
        assert!((out.mean[(2, 0)] - 1.0).abs() < 1e-10);
        assert!(out.intervals.is_empty());
        Ok(())
    }

    #[test]
    fn test_bottom_up_gaussian_intervals() -> Result<()> {
        let ctx = star_context()?;
        let mut y_hat = Mat::<f64>::zeros(3, 1);
        y_hat[(0, 0)] = 3.0;
        y_hat[(1, 0)] = 1.0;
        y_hat[(2, 0)] = 1.0;
        // independent bottom scales 3 and 4 give sqrt(9 + 16) = 5 at the total
        let mut sigmah = Mat::<f64>::zeros(3, 1);
        sigmah[(0, 0)] = 9.9;
        sigmah[(1, 0)] = 3.0;
        sigmah[(2, 0)] = 4.0;
        let inputs = MethodInputs::new(y_hat)
            .with_sigmah(sigmah)
            .with_levels(vec![80.0]);
        let out = BottomUp::new().reconcile(&ctx, &inputs)?;
        let z = one_sided_z(80.0)?;
        assert_eq!(out.intervals.len(), 1);
        let li = &out.intervals[0];
        assert!((li.upper[(0, 0)] - (2.0 + z * 5.0)).abs() < 1e-10);
        assert!((li.lower[(0, 0)] - (2.0 - z * 5.0)).abs() < 1e-10);
        assert!((li.upper[(1, 0)] - (1.0 + z * 3.0)).abs() < 1e-10);
        Ok(())
    }

    #[test]
    fn test_bottom_up_label() {
        assert_eq!(BottomUp::new().label(), "BottomUp");
    }
}
