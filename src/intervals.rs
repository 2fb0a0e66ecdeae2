//! Gaussian scale recovery from observed prediction intervals.
//!
//! A symmetric Gaussian interval around a point forecast has one free
//! parameter, the scale. A single observed bound at a known confidence level
//! is therefore enough to recover it: $\sigma = \pm(b - \hat{y}) / z$ with
//! $z = \Phi^{-1}(0.5 + \text{level}/200)$. The recovered scale can then be
//! reused to build intervals at any other level.

use faer::Mat;
use statrs::distribution::{ContinuousCDF, Normal};

use crate::error::{Error, Result};

/// Which side of a prediction interval a bound column carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundSide {
    /// Lower bound (point forecast minus z times scale).
    Lower,
    /// Upper bound (point forecast plus z times scale).
    Upper,
}

impl BoundSide {
    /// Sign applied to the deviation `bound - point` for this side.
    pub fn sign(&self) -> f64 {
        match self {
            BoundSide::Lower => -1.0,
            BoundSide::Upper => 1.0,
        }
    }
}

/// Reject confidence levels outside the open interval (0, 100).
pub fn validate_level(level: f64) -> Result<()> {
    if !(level > 0.0 && level < 100.0) {
        return Err(Error::InvalidLevel { level });
    }
    Ok(())
}

/// One-sided z-score for a central interval at `level` percent coverage.
pub fn one_sided_z(level: f64) -> Result<f64> {
    validate_level(level)?;
    let normal = Normal::new(0.0, 1.0).map_err(|e| Error::Other(e.to_string()))?;
    Ok(normal.inverse_cdf(0.5 + level / 200.0))
}

/// Estimate a per-cell Gaussian scale from one observed interval bound.
///
/// `point` and `bound` are series x horizon matrices; `level` is the
/// confidence level the bound was stated at.
pub fn sigma_from_interval(
    point: &Mat<f64>,
    bound: &Mat<f64>,
    side: BoundSide,
    level: f64,
) -> Result<Mat<f64>> {
    if point.nrows() != bound.nrows() || point.ncols() != bound.ncols() {
        return Err(Error::ShapeMismatch {
            expected: format!("{}x{}", point.nrows(), point.ncols()),
            actual: format!("{}x{}", bound.nrows(), bound.ncols()),
        });
    }
    let z = one_sided_z(level)?;
    let sign = side.sign();
    let mut sigma = Mat::<f64>::zeros(point.nrows(), point.ncols());
    for i in 0..point.nrows() {
        for j in 0..point.ncols() {
            sigma[(i, j)] = sign * (bound[(i, j)] - point[(i, j)]) / z;
        }
    }
    Ok(sigma)
}

/// Render a level for a column name, trimming a trailing `.0`.
pub fn format_level(level: f64) -> String {
    if level.fract() == 0.0 {
        format!("{}", level as i64)
    } else {
        format!("{level}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Result;

    #[test]
    fn test_one_sided_z_known_values() -> Result<()> {
        assert!((one_sided_z(80.0)? - 1.2815515655446004).abs() < 1e-6);
        assert!((one_sided_z(95.0)? - 1.959963984540054).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_level_bounds_rejected() {
        for level in [0.0, 100.0, -1.0, 150.0, f64::NAN] {
            assert!(matches!(
                one_sided_z(level),
                Err(Error::InvalidLevel { .. })
            ));
        }
    }

    #[test]
    fn test_sigma_round_trip_lower() -> Result<()> {
        // bound = point - s * z(level) must recover s
        let s_true = 1.7;
        for level in [80.0, 95.0] {
            let z = one_sided_z(level)?;
            let mut point = Mat::<f64>::zeros(2, 3);
            let mut bound = Mat::<f64>::zeros(2, 3);
            for i in 0..2 {
                for j in 0..3 {
                    point[(i, j)] = 10.0 + (i * 3 + j) as f64;
                    bound[(i, j)] = point[(i, j)] - s_true * z;
                }
            }
            let sigma = sigma_from_interval(&point, &bound, BoundSide::Lower, level)?;
            for i in 0..2 {
                for j in 0..3 {
                    assert!((sigma[(i, j)] - s_true).abs() < 1e-9);
                }
            }
        }
        Ok(())
    }

    #[test]
    fn test_sigma_round_trip_upper() -> Result<()> {
        let s_true = 0.4;
        let z = one_sided_z(95.0)?;
        let mut point = Mat::<f64>::zeros(1, 2);
        let mut bound = Mat::<f64>::zeros(1, 2);
        for j in 0..2 {
            point[(0, j)] = 5.0;
            bound[(0, j)] = 5.0 + s_true * z;
        }
        let sigma = sigma_from_interval(&point, &bound, BoundSide::Upper, 95.0)?;
        for j in 0..2 {
            assert!((sigma[(0, j)] - s_true).abs() < 1e-9);
        }
        Ok(())
    }

    #[test]
    fn test_sigma_shape_mismatch() {
        let point = Mat::<f64>::zeros(2, 3);
        let bound = Mat::<f64>::zeros(2, 2);
        assert!(matches!(
            sigma_from_interval(&point, &bound, BoundSide::Lower, 80.0),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_format_level() {
        assert_eq!(format_level(80.0), "80");
        assert_eq!(format_level(99.5), "99.5");
        assert_eq!(format_level(5.0), "5");
    }
}
