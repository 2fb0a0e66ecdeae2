//! Long-format tables of time-stamped values keyed by series identifier.
//!
//! Both the base-forecast table and the historical table use the same shape:
//! one row per (series, timestamp), any number of named value columns. Model
//! columns may carry companion interval bounds following the naming
//! convention `"{model}-lo-{level}"` / `"{model}-hi-{level}"`.

use chrono::{DateTime, Utc};
use faer::{Mat, MatRef};
use indexmap::{IndexMap, IndexSet};

use crate::error::{Error, Result};
use crate::intervals::BoundSide;

/// Conventional name of the observed-value column in historical tables.
pub const TARGET_COLUMN: &str = "y";

const LO_MARKER: &str = "-lo-";
const HI_MARKER: &str = "-hi-";

/// An interval-bound column discovered for a model.
#[derive(Debug, Clone)]
pub struct IntervalColumn {
    /// Full column name as it appears in the table.
    pub name: String,
    /// Which side of the interval the column carries.
    pub side: BoundSide,
    /// Confidence level parsed from the name.
    pub level: f64,
}

/// A long-format panel of time series values.
#[derive(Debug, Clone)]
pub struct PanelFrame {
    uid: Vec<String>,
    ds: Vec<DateTime<Utc>>,
    columns: IndexMap<String, Vec<f64>>,
}

impl PanelFrame {
    /// Create a frame from its key vectors. Columns are added afterwards.
    pub fn new(uid: Vec<String>, ds: Vec<DateTime<Utc>>) -> Result<Self> {
        if uid.is_empty() {
            return Err(Error::EmptyInput);
        }
        if uid.len() != ds.len() {
            return Err(Error::DimensionMismatch {
                expected: uid.len(),
                found: ds.len(),
            });
        }
        Ok(Self {
            uid,
            ds,
            columns: IndexMap::new(),
        })
    }

    /// Add a value column, consuming and returning the frame.
    pub fn with_column(mut self, name: impl Into<String>, values: Vec<f64>) -> Result<Self> {
        self.push_column(name, values)?;
        Ok(self)
    }

    /// Add a value column in place.
    pub fn push_column(&mut self, name: impl Into<String>, values: Vec<f64>) -> Result<()> {
        let name = name.into();
        if values.len() != self.uid.len() {
            return Err(Error::DimensionMismatch {
                expected: self.uid.len(),
                found: values.len(),
            });
        }
        if self.columns.contains_key(&name) {
            return Err(Error::Other(format!("column '{name}' already exists")));
        }
        self.columns.insert(name, values);
        Ok(())
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.uid.len()
    }

    /// True when the frame has no rows.
    pub fn is_empty(&self) -> bool {
        self.uid.is_empty()
    }

    /// Series identifiers, one per row.
    pub fn uid(&self) -> &[String] {
        &self.uid
    }

    /// Timestamps, one per row.
    pub fn ds(&self) -> &[DateTime<Utc>] {
        &self.ds
    }

    /// Column names in insertion order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Values of a named column.
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    /// Distinct series identifiers in first-occurrence order.
    pub fn unique_ids(&self) -> IndexSet<String> {
        let mut ids = IndexSet::new();
        for id in &self.uid {
            if !ids.contains(id.as_str()) {
                ids.insert(id.clone());
            }
        }
        ids
    }

    /// Sorted union of all observed timestamps.
    pub fn timeline(&self) -> Vec<DateTime<Utc>> {
        let mut timeline: Vec<DateTime<Utc>> = self.ds.clone();
        timeline.sort_unstable();
        timeline.dedup();
        timeline
    }

    /// Model columns: everything that is neither an interval bound nor the
    /// observed-value column.
    pub fn model_columns(&self) -> Vec<String> {
        self.columns
            .keys()
            .filter(|name| name.as_str() != TARGET_COLUMN && !is_interval_column(name))
            .cloned()
            .collect()
    }

    /// Interval-bound columns belonging to `model`, in table order.
    pub fn interval_columns(&self, model: &str) -> Vec<IntervalColumn> {
        self.columns
            .keys()
            .filter_map(|name| {
                parse_bound(name, model).map(|(side, level)| IntervalColumn {
                    name: name.clone(),
                    side,
                    level,
                })
            })
            .collect()
    }

    /// Pivot a column to wide (series x time) in `uids` order, leaving NaN
    /// where a (series, timestamp) pair has no row.
    pub fn pivot(&self, column: &str, uids: &IndexSet<String>) -> Result<Mat<f64>> {
        self.pivot_impl(column, uids, false)
    }

    /// Pivot a column to wide (series x time) in `uids` order, requiring
    /// every series to cover the full timeline.
    pub fn pivot_strict(&self, column: &str, uids: &IndexSet<String>) -> Result<Mat<f64>> {
        self.pivot_impl(column, uids, true)
    }

    fn pivot_impl(&self, column: &str, uids: &IndexSet<String>, strict: bool) -> Result<Mat<f64>> {
        let values = self.columns.get(column).ok_or_else(|| Error::MissingColumn {
            column: column.to_string(),
        })?;
        let timeline = self.timeline();
        let width = timeline.len();
        let mut out = Mat::<f64>::zeros(uids.len(), width);
        for i in 0..uids.len() {
            for j in 0..width {
                out[(i, j)] = f64::NAN;
            }
        }
        let mut filled = vec![0usize; uids.len()];
        let mut seen = vec![false; uids.len() * width];
        for (r, id) in self.uid.iter().enumerate() {
            let i = match uids.get_index_of(id.as_str()) {
                Some(i) => i,
                None => continue,
            };
            let j = match timeline.binary_search(&self.ds[r]) {
                Ok(j) => j,
                Err(_) => continue,
            };
            if seen[i * width + j] {
                return Err(Error::DuplicateEntry { uid: id.clone() });
            }
            seen[i * width + j] = true;
            out[(i, j)] = values[r];
            filled[i] += 1;
        }
        for (i, id) in uids.iter().enumerate() {
            if filled[i] == 0 {
                return Err(Error::MissingSeries { uid: id.clone() });
            }
            if strict && filled[i] != width {
                return Err(Error::RaggedHorizon {
                    uid: id.clone(),
                    expected: width,
                    found: filled[i],
                });
            }
        }
        Ok(out)
    }

    /// Scatter a wide (series x time) matrix back to per-row values,
    /// preserving this frame's row order.
    pub fn scatter_wide(&self, uids: &IndexSet<String>, values: MatRef<'_, f64>) -> Result<Vec<f64>> {
        let timeline = self.timeline();
        if values.nrows() != uids.len() || values.ncols() != timeline.len() {
            return Err(Error::ShapeMismatch {
                expected: format!("{}x{}", uids.len(), timeline.len()),
                actual: format!("{}x{}", values.nrows(), values.ncols()),
            });
        }
        let mut out = Vec::with_capacity(self.len());
        for r in 0..self.len() {
            let i = uids
                .get_index_of(self.uid[r].as_str())
                .ok_or_else(|| Error::HierarchyMismatch {
                    uid: self.uid[r].clone(),
                })?;
            let j = match timeline.binary_search(&self.ds[r]) {
                Ok(j) => j,
                Err(_) => {
                    return Err(Error::Other(format!(
                        "timestamp {} missing from timeline",
                        self.ds[r]
                    )))
                }
            };
            out.push(values[(i, j)]);
        }
        Ok(out)
    }
}

/// True when a column name follows the interval-bound convention for any model.
pub fn is_interval_column(name: &str) -> bool {
    for marker in [LO_MARKER, HI_MARKER] {
        if let Some(pos) = name.rfind(marker) {
            if name[pos + marker.len()..].parse::<f64>().is_ok() {
                return true;
            }
        }
    }
    false
}

fn parse_bound(name: &str, model: &str) -> Option<(BoundSide, f64)> {
    let rest = name.strip_prefix(model)?;
    let (side, suffix) = if let Some(suffix) = rest.strip_prefix(LO_MARKER) {
        (BoundSide::Lower, suffix)
    } else if let Some(suffix) = rest.strip_prefix(HI_MARKER) {
        (BoundSide::Upper, suffix)
    } else {
        return None;
    };
    suffix
        .parse::<f64>()
        .ok()
        .filter(|level| level.is_finite())
        .map(|level| (side, level))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Result;
    use chrono::{Duration, TimeZone};

    fn stamps(n: usize) -> Vec<DateTime<Utc>> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..n).map(|i| start + Duration::hours(i as i64)).collect()
    }

    fn two_series_frame() -> Result<PanelFrame> {
        // rows: total@t0, total@t1, a@t0, a@t1
        let ts = stamps(2);
        let uid = vec![
            "total".to_string(),
            "total".to_string(),
            "a".to_string(),
            "a".to_string(),
        ];
        let ds = vec![ts[0], ts[1], ts[0], ts[1]];
        PanelFrame::new(uid, ds)?.with_column("naive", vec![10.0, 11.0, 4.0, 5.0])
    }

    #[test]
    fn test_column_length_validated() -> Result<()> {
        let frame = two_series_frame()?;
        assert!(matches!(
            frame.with_column("bad", vec![1.0]),
            Err(Error::DimensionMismatch { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_duplicate_column_rejected() -> Result<()> {
        let frame = two_series_frame()?;
        assert!(frame.with_column("naive", vec![0.0; 4]).is_err());
        Ok(())
    }

    #[test]
    fn test_unique_ids_first_occurrence_order() -> Result<()> {
        let ts = stamps(1);
        let uid = vec!["b".to_string(), "a".to_string(), "b".to_string()];
        let ds = vec![ts[0], ts[0], ts[0] + Duration::hours(1)];
        let frame = PanelFrame::new(uid, ds)?;
        let unique = frame.unique_ids();
        let ids: Vec<&str> = unique.iter().map(String::as_str).collect();
        assert_eq!(ids, vec!["b", "a"]);
        Ok(())
    }

    #[test]
    fn test_pivot_strict_values() -> Result<()> {
        let frame = two_series_frame()?;
        let uids = frame.unique_ids();
        let wide = frame.pivot_strict("naive", &uids)?;
        assert_eq!(wide.nrows(), 2);
        assert_eq!(wide.ncols(), 2);
        assert_eq!(wide[(0, 0)], 10.0);
        assert_eq!(wide[(0, 1)], 11.0);
        assert_eq!(wide[(1, 0)], 4.0);
        assert_eq!(wide[(1, 1)], 5.0);
        Ok(())
    }

    #[test]
    fn test_pivot_strict_rejects_ragged() -> Result<()> {
        let ts = stamps(2);
        let uid = vec!["total".to_string(), "total".to_string(), "a".to_string()];
        let ds = vec![ts[0], ts[1], ts[0]];
        let frame = PanelFrame::new(uid, ds)?.with_column("naive", vec![1.0, 2.0, 3.0])?;
        let uids = frame.unique_ids();
        assert!(matches!(
            frame.pivot_strict("naive", &uids),
            Err(Error::RaggedHorizon { uid, expected: 2, found: 1 }) if uid == "a"
        ));
        Ok(())
    }

    #[test]
    fn test_pivot_pads_with_nan() -> Result<()> {
        let ts = stamps(2);
        let uid = vec!["total".to_string(), "total".to_string(), "a".to_string()];
        let ds = vec![ts[0], ts[1], ts[0]];
        let frame = PanelFrame::new(uid, ds)?.with_column("y", vec![1.0, 2.0, 3.0])?;
        let uids = frame.unique_ids();
        let wide = frame.pivot("y", &uids)?;
        assert_eq!(wide[(1, 0)], 3.0);
        assert!(wide[(1, 1)].is_nan());
        Ok(())
    }

    #[test]
    fn test_pivot_missing_series() -> Result<()> {
        let frame = two_series_frame()?;
        let mut uids = frame.unique_ids();
        uids.insert("ghost".to_string());
        assert!(matches!(
            frame.pivot("naive", &uids),
            Err(Error::MissingSeries { uid }) if uid == "ghost"
        ));
        Ok(())
    }

    #[test]
    fn test_pivot_duplicate_entry() -> Result<()> {
        let ts = stamps(1);
        let uid = vec!["a".to_string(), "a".to_string()];
        let ds = vec![ts[0], ts[0]];
        let frame = PanelFrame::new(uid, ds)?.with_column("y", vec![1.0, 2.0])?;
        let uids = frame.unique_ids();
        assert!(matches!(
            frame.pivot("y", &uids),
            Err(Error::DuplicateEntry { uid }) if uid == "a"
        ));
        Ok(())
    }

    #[test]
    fn test_interval_column_discovery() -> Result<()> {
        let frame = two_series_frame()?
            .with_column("naive-lo-80", vec![0.0; 4])?
            .with_column("naive-hi-80", vec![0.0; 4])?
            .with_column("other-lo-95", vec![0.0; 4])?
            .with_column("naive-lo-x", vec![0.0; 4])?;
        let found = frame.interval_columns("naive");
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].name, "naive-lo-80");
        assert_eq!(found[0].side, BoundSide::Lower);
        assert_eq!(found[0].level, 80.0);
        assert_eq!(found[1].name, "naive-hi-80");
        assert_eq!(found[1].side, BoundSide::Upper);
        Ok(())
    }

    #[test]
    fn test_model_columns_exclude_bounds_and_target() -> Result<()> {
        let frame = two_series_frame()?
            .with_column("y", vec![0.0; 4])?
            .with_column("naive-lo-80", vec![0.0; 4])?
            .with_column("arima", vec![0.0; 4])?;
        assert_eq!(frame.model_columns(), vec!["naive", "arima"]);
        Ok(())
    }

    #[test]
    fn test_scatter_preserves_row_order() -> Result<()> {
        // interleaved rows: a@t0, total@t0, a@t1, total@t1
        let ts = stamps(2);
        let uid = vec![
            "a".to_string(),
            "total".to_string(),
            "a".to_string(),
            "total".to_string(),
        ];
        let ds = vec![ts[0], ts[0], ts[1], ts[1]];
        let frame = PanelFrame::new(uid, ds)?.with_column("naive", vec![1.0, 2.0, 3.0, 4.0])?;
        let uids = frame.unique_ids();
        let wide = frame.pivot_strict("naive", &uids)?;
        let flat = frame.scatter_wide(&uids, wide.as_ref())?;
        assert_eq!(flat, vec![1.0, 2.0, 3.0, 4.0]);
        Ok(())
    }
}
