//! # coherent
//!
//! Hierarchical forecast reconciliation: adjusts independently produced
//! forecasts so aggregates and their children agree, $\tilde{y} = S \cdot P \cdot \hat{y}$.
//!
//! The dispatcher runs every configured method against every model column of
//! a long-format forecast table, staging per-method optional inputs (fitted
//! residuals, Gaussian scales recovered from stated prediction intervals,
//! bootstrap sample paths) from each method's statically declared
//! capabilities.

pub mod aggregation;
pub mod bootstrap;
pub mod context;
pub mod dispatch;
/// Error types used across `coherent`.
pub mod error;
pub mod frame;
pub mod intervals;
pub mod methods;


pub use aggregation::SummingMatrix;
pub use bootstrap::{BootstrapSampler, ResidualBootstrap};
pub use context::{ReconContext, TagMap};
pub use dispatch::{HierarchicalReconciler, ReconcileOptions};
pub use error::{Error, Result};
pub use frame::{IntervalColumn, PanelFrame, TARGET_COLUMN};
pub use intervals::BoundSide;
pub use methods::{
    BottomUp, Capabilities, Disaggregation, FittedValues, LevelInterval, MethodInputs, MiddleOut,
    MinTrace, MinTraceWeights, Reconciled, ReconciliationMethod, TopDown,
};
