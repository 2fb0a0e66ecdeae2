//! Shared numeric context assembled once per reconciliation call.

use faer::{Mat, MatRef};
use indexmap::{IndexMap, IndexSet};

use crate::aggregation::SummingMatrix;
use crate::error::{Error, Result};
use crate::frame::{PanelFrame, TARGET_COLUMN};

/// Hierarchy levels: tag label to member series identifiers.
pub type TagMap = IndexMap<String, Vec<String>>;

/// Immutable context shared by every (method, model) dispatch task.
///
/// Holds the aggregation matrix restricted to the series present in the
/// base-forecast table, the historical matrix in the same row order, the
/// bottom-level row positions, and the tag mapping resolved to positions.
/// Built once per call; per-iteration inputs live in
/// [`crate::methods::MethodInputs`], never here.
#[derive(Debug, Clone)]
pub struct ReconContext {
    uids: IndexSet<String>,
    s: SummingMatrix,
    y_insample: Mat<f64>,
    idx_bottom: Vec<usize>,
    tags: IndexMap<String, Vec<usize>>,
}

impl ReconContext {
    /// Assemble the context from the call inputs.
    ///
    /// The uid ordering is the first-occurrence order of identifiers in the
    /// base-forecast table; everything else is restricted and reordered to it.
    pub fn build(
        forecasts: &PanelFrame,
        history: &PanelFrame,
        s: &SummingMatrix,
        tags: &TagMap,
    ) -> Result<Self> {
        let uids = forecasts.unique_ids();
        if uids.is_empty() {
            return Err(Error::EmptyInput);
        }
        let s = s.restrict(&uids)?;
        let y_insample = history.pivot(TARGET_COLUMN, &uids)?;
        let idx_bottom = s.bottom_positions()?;
        let mut resolved = IndexMap::with_capacity(tags.len());
        for (label, members) in tags {
            let mut positions = Vec::with_capacity(members.len());
            for member in members {
                let pos = uids
                    .get_index_of(member.as_str())
                    .ok_or_else(|| Error::HierarchyMismatch {
                        uid: member.clone(),
                    })?;
                positions.push(pos);
            }
            resolved.insert(label.clone(), positions);
        }
        Ok(Self {
            uids,
            s,
            y_insample,
            idx_bottom,
            tags: resolved,
        })
    }

    /// Series identifiers in canonical order.
    pub fn uids(&self) -> &IndexSet<String> {
        &self.uids
    }

    /// Aggregation matrix restricted to the uid ordering.
    pub fn s(&self) -> &SummingMatrix {
        &self.s
    }

    /// Historical observations, series x time, NaN where unobserved.
    pub fn y_insample(&self) -> MatRef<'_, f64> {
        self.y_insample.as_ref()
    }

    /// Positions of the bottom-level series within the uid ordering.
    pub fn idx_bottom(&self) -> &[usize] {
        &self.idx_bottom
    }

    /// Tag labels resolved to positions within the uid ordering.
    pub fn tags(&self) -> &IndexMap<String, Vec<usize>> {
        &self.tags
    }

    /// Positions of one tag's members, if the label exists.
    pub fn tag(&self, label: &str) -> Option<&[usize]> {
        self.tags.get(label).map(Vec::as_slice)
    }
}
