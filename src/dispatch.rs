//! Reconciliation dispatcher.
//!
//! Runs every configured method against every model column of the
//! base-forecast table and appends the coherent outputs as new columns.
//!
//! Optional inputs are staged per (method, model) task, strictly from the
//! method's declared [`Capabilities`]:
//!
//! | staged input    | condition                                            |
//! |-----------------|------------------------------------------------------|
//! | sigmah          | levels requested, method builds Gaussian intervals,  |
//! |                 | bootstrap off, an interval column exists for model   |
//! | fitted values   | method reads fitted residuals, or bootstrap is on    |
//! | bootstrap paths | bootstrap on, method admits samples, levels requested|
//!
//! Every task gets a fresh [`MethodInputs`] bundle; the shared
//! [`ReconContext`] is immutable, so tasks are independent and can run in
//! parallel.

use log::warn;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::aggregation::SummingMatrix;
use crate::bootstrap::{BootstrapSampler, ResidualBootstrap};
use crate::context::{ReconContext, TagMap};
use crate::error::Result;
use crate::frame::PanelFrame;
use crate::intervals::{format_level, sigma_from_interval, validate_level};
use crate::methods::{Capabilities, FittedValues, MethodInputs, ReconciliationMethod};

/// Call-level options for [`HierarchicalReconciler::reconcile`].
#[derive(Debug, Clone, Default)]
pub struct ReconcileOptions {
    levels: Option<Vec<f64>>,
    bootstrap: bool,
}

impl ReconcileOptions {
    /// Point forecasts only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request prediction intervals at the given confidence levels (percent).
    pub fn with_levels(mut self, levels: Vec<f64>) -> Self {
        self.levels = Some(levels);
        self
    }

    /// Build intervals from bootstrap sample paths instead of Gaussian scales.
    pub fn with_bootstrap(mut self, bootstrap: bool) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    /// Requested confidence levels, if any.
    pub fn levels(&self) -> Option<&[f64]> {
        self.levels.as_deref()
    }

    /// Whether bootstrap intervals were requested.
    pub fn bootstrap(&self) -> bool {
        self.bootstrap
    }
}

/// Applies a set of reconciliation methods to a table of base forecasts.
pub struct HierarchicalReconciler {
    methods: Vec<Box<dyn ReconciliationMethod>>,
    sampler: Box<dyn BootstrapSampler>,
}

impl HierarchicalReconciler {
    /// Reconciler over the given methods, with the default residual-window
    /// bootstrap sampler.
    pub fn new(methods: Vec<Box<dyn ReconciliationMethod>>) -> Self {
        Self {
            methods,
            sampler: Box::new(ResidualBootstrap::new()),
        }
    }

    /// Replace the bootstrap sampler.
    pub fn with_sampler(mut self, sampler: Box<dyn BootstrapSampler>) -> Self {
        self.sampler = sampler;
        self
    }

    /// Reconcile every model column of `forecasts` with every method.
    ///
    /// `history` must hold the observed target for each forecast series and
    /// may hold per-model fitted-value columns under the model's name.
    /// Returns the input table with one `{model}/{label}` column per task,
    /// plus `-lo-{level}` and `-hi-{level}` columns where intervals were
    /// produced. Row order is preserved.
    pub fn reconcile(
        &self,
        forecasts: &PanelFrame,
        history: &PanelFrame,
        s: &SummingMatrix,
        tags: &TagMap,
        options: &ReconcileOptions,
    ) -> Result<PanelFrame> {
        if let Some(levels) = options.levels() {
            for &level in levels {
                validate_level(level)?;
            }
        }
        let ctx = ReconContext::build(forecasts, history, s, tags)?;
        let models = forecasts.model_columns();
        let mut tasks = Vec::with_capacity(self.methods.len() * models.len());
        for method in &self.methods {
            for model in &models {
                tasks.push((method.as_ref(), model.as_str()));
            }
        }

        #[cfg(feature = "parallel")]
        let produced = tasks
            .par_iter()
            .map(|(method, model)| self.run_task(*method, model, &ctx, forecasts, history, options))
            .collect::<Result<Vec<_>>>()?;

        #[cfg(not(feature = "parallel"))]
        let produced = tasks
            .iter()
            .map(|(method, model)| self.run_task(*method, model, &ctx, forecasts, history, options))
            .collect::<Result<Vec<_>>>()?;

        let mut out = forecasts.clone();
        for columns in produced {
            for (name, values) in columns {
                out.push_column(name, values)?;
            }
        }
        Ok(out)
    }

    /// One (method, model) iteration: stage inputs, reconcile, name columns.
    fn run_task(
        &self,
        method: &dyn ReconciliationMethod,
        model: &str,
        ctx: &ReconContext,
        forecasts: &PanelFrame,
        history: &PanelFrame,
        options: &ReconcileOptions,
    ) -> Result<Vec<(String, Vec<f64>)>> {
        let y_hat = forecasts.pivot_strict(model, ctx.uids())?;
        let caps: Capabilities = method.capabilities();
        let levels = options.levels().filter(|ls| !ls.is_empty());

        let mut sigmah = None;
        if levels.is_some() && caps.confidence_level && !options.bootstrap() {
            let interval_cols = forecasts.interval_columns(model);
            if let Some(first) = interval_cols.first() {
                if interval_cols.len() > 1 {
                    warn!(
                        "model '{model}' carries {} interval columns; scale taken from '{}'",
                        interval_cols.len(),
                        first.name
                    );
                }
                let bound = forecasts.pivot_strict(&first.name, ctx.uids())?;
                sigmah = Some(sigma_from_interval(&y_hat, &bound, first.side, first.level)?);
            }
        }

        let wants_paths = options.bootstrap()
            && caps.confidence_level
            && caps.bootstrap_samples
            && levels.is_some();
        let mut fitted = FittedValues::NotRequested;
        let mut paths = None;
        if caps.fitted_residuals || wants_paths {
            if history.column(model).is_some() {
                let f = history.pivot(model, ctx.uids())?;
                if wants_paths {
                    paths = Some(self.sampler.sample_paths(
                        ctx.y_insample(),
                        f.as_ref(),
                        y_hat.as_ref(),
                    )?);
                }
                if caps.fitted_residuals {
                    fitted = FittedValues::Available(f);
                }
            } else {
                if wants_paths {
                    warn!("no '{model}' fitted column in history; bootstrap intervals skipped");
                }
                if caps.fitted_residuals {
                    fitted = FittedValues::Missing;
                }
            }
        }

        let mut inputs = MethodInputs::new(y_hat).with_fitted(fitted);
        if let Some(ls) = levels {
            inputs = inputs.with_levels(ls.to_vec());
        }
        if let Some(sigma) = sigmah {
            inputs = inputs.with_sigmah(sigma);
        }
        if let Some(p) = paths {
            inputs = inputs.with_bootstrap_paths(p);
        }

        let reconciled = method.reconcile(ctx, &inputs)?;
        let label = method.label();
        let mut columns = Vec::with_capacity(1 + 2 * reconciled.intervals.len());
        columns.push((
            format!("{model}/{label}"),
            forecasts.scatter_wide(ctx.uids(), reconciled.mean.as_ref())?,
        ));
        for interval in &reconciled.intervals {
            let tag = format_level(interval.level);
            columns.push((
                format!("{model}/{label}-lo-{tag}"),
                forecasts.scatter_wide(ctx.uids(), interval.lower.as_ref())?,
            ));
            columns.push((
                format!("{model}/{label}-hi-{tag}"),
                forecasts.scatter_wide(ctx.uids(), interval.upper.as_ref())?,
            ));
        }
        Ok(columns)
    }
}
