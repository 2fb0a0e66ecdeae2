//! Residual-based uncertainty sampling for empirical prediction intervals.

use faer::{Mat, MatRef};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

use crate::error::{Error, Result};

/// Produces sampled forecast paths for empirical interval construction.
///
/// Consumed by the dispatcher when bootstrap mode is on; implementations
/// receive the historical matrix, a model's in-sample fitted values, and its
/// point forecast, all series x time in the same row order.
pub trait BootstrapSampler: Send + Sync {
    /// Sample forecast paths, each series x horizon.
    fn sample_paths(
        &self,
        y_insample: MatRef<'_, f64>,
        y_hat_insample: MatRef<'_, f64>,
        y_hat: MatRef<'_, f64>,
    ) -> Result<Vec<Mat<f64>>>;
}

/// Default sampler: adds contiguous windows of joint in-sample residuals to
/// the point forecast.
///
/// Keeping residuals joint across series preserves their cross-sectional
/// dependence in every sampled path. Time columns where any series lacks a
/// residual are dropped before windowing.
#[derive(Debug, Clone)]
pub struct ResidualBootstrap {
    n_samples: usize,
    seed: Option<u64>,
}

impl Default for ResidualBootstrap {
    fn default() -> Self {
        Self {
            n_samples: 1000,
            seed: None,
        }
    }
}

impl ResidualBootstrap {
    /// Sampler with the default 1000 paths and OS-seeded randomness.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of sampled paths.
    pub fn with_samples(mut self, n_samples: usize) -> Self {
        self.n_samples = n_samples;
        self
    }

    /// Fix the RNG seed for reproducible paths.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

impl BootstrapSampler for ResidualBootstrap {
    fn sample_paths(
        &self,
        y_insample: MatRef<'_, f64>,
        y_hat_insample: MatRef<'_, f64>,
        y_hat: MatRef<'_, f64>,
    ) -> Result<Vec<Mat<f64>>> {
        if self.n_samples == 0 {
            return Err(Error::InvalidParameter {
                name: "n_samples",
                message: "must be positive",
            });
        }
        let m = y_insample.nrows();
        let t = y_insample.ncols();
        let h = y_hat.ncols();
        if y_hat_insample.nrows() != m || y_hat_insample.ncols() != t {
            return Err(Error::ShapeMismatch {
                expected: format!("{m}x{t}"),
                actual: format!("{}x{}", y_hat_insample.nrows(), y_hat_insample.ncols()),
            });
        }
        if y_hat.nrows() != m {
            return Err(Error::ShapeMismatch {
                expected: format!("{m} rows"),
                actual: format!("{} rows", y_hat.nrows()),
            });
        }
        if h == 0 {
            return Err(Error::EmptyInput);
        }

        // residual columns where every series is observed
        let mut cols = Vec::with_capacity(t);
        for j in 0..t {
            let mut usable = true;
            for i in 0..m {
                if !(y_insample[(i, j)] - y_hat_insample[(i, j)]).is_finite() {
                    usable = false;
                    break;
                }
            }
            if usable {
                cols.push(j);
            }
        }
        if cols.len() < h {
            return Err(Error::InsufficientHistory {
                needed: h,
                found: cols.len(),
            });
        }
        let mut residuals = Mat::<f64>::zeros(m, cols.len());
        for (k, &j) in cols.iter().enumerate() {
            for i in 0..m {
                residuals[(i, k)] = y_insample[(i, j)] - y_hat_insample[(i, j)];
            }
        }

        let n_starts = cols.len() - h + 1;
        let mut rng: Box<dyn RngCore> = match self.seed {
            Some(seed) => Box::new(StdRng::seed_from_u64(seed)),
            None => Box::new(rand::rng()),
        };
        let mut paths = Vec::with_capacity(self.n_samples);
        for _ in 0..self.n_samples {
            let start = rng.random_range(0..n_starts);
            let mut path = Mat::<f64>::zeros(m, h);
            for i in 0..m {
                for k in 0..h {
                    path[(i, k)] = y_hat[(i, k)] + residuals[(i, start + k)];
                }
            }
            paths.push(path);
        }
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Result;

    fn constant_inputs(m: usize, t: usize, h: usize) -> (Mat<f64>, Mat<f64>, Mat<f64>) {
        // residuals are exactly 1.0 everywhere
        let mut y = Mat::<f64>::zeros(m, t);
        let fitted = Mat::<f64>::zeros(m, t);
        for i in 0..m {
            for j in 0..t {
                y[(i, j)] = 1.0;
            }
        }
        let mut y_hat = Mat::<f64>::zeros(m, h);
        for i in 0..m {
            for k in 0..h {
                y_hat[(i, k)] = 10.0;
            }
        }
        (y, fitted, y_hat)
    }

    #[test]
    fn test_path_count_and_shape() -> Result<()> {
        let (y, fitted, y_hat) = constant_inputs(3, 8, 2);
        let sampler = ResidualBootstrap::new().with_samples(25).with_seed(1);
        let paths = sampler.sample_paths(y.as_ref(), fitted.as_ref(), y_hat.as_ref())?;
        assert_eq!(paths.len(), 25);
        for path in &paths {
            assert_eq!(path.nrows(), 3);
            assert_eq!(path.ncols(), 2);
            for i in 0..3 {
                for k in 0..2 {
                    assert!((path[(i, k)] - 11.0).abs() < 1e-12);
                }
            }
        }
        Ok(())
    }

    #[test]
    fn test_seed_reproducibility() -> Result<()> {
        let m = 2;
        let t = 12;
        let mut y = Mat::<f64>::zeros(m, t);
        let fitted = Mat::<f64>::zeros(m, t);
        for i in 0..m {
            for j in 0..t {
                y[(i, j)] = (i + 1) as f64 * j as f64;
            }
        }
        let y_hat = Mat::<f64>::zeros(m, 3);
        let a = ResidualBootstrap::new().with_samples(10).with_seed(42);
        let b = ResidualBootstrap::new().with_samples(10).with_seed(42);
        let pa = a.sample_paths(y.as_ref(), fitted.as_ref(), y_hat.as_ref())?;
        let pb = b.sample_paths(y.as_ref(), fitted.as_ref(), y_hat.as_ref())?;
        for (x, y) in pa.iter().zip(pb.iter()) {
            for i in 0..m {
                for k in 0..3 {
                    assert_eq!(x[(i, k)], y[(i, k)]);
                }
            }
        }
        Ok(())
    }

    #[test]
    fn test_nan_columns_dropped() -> Result<()> {
        let (mut y, fitted, y_hat) = constant_inputs(2, 6, 2);
        // one unobserved cell must drop its whole time column
        y[(0, 3)] = f64::NAN;
        let sampler = ResidualBootstrap::new().with_samples(50).with_seed(9);
        let paths = sampler.sample_paths(y.as_ref(), fitted.as_ref(), y_hat.as_ref())?;
        // every surviving residual equals 1.0, so no path can deviate
        for path in &paths {
            for i in 0..2 {
                for k in 0..2 {
                    assert!((path[(i, k)] - 11.0).abs() < 1e-12);
                }
            }
        }
        Ok(())
    }

    #[test]
    fn test_insufficient_history() {
        let (mut y, fitted, y_hat) = constant_inputs(2, 3, 2);
        y[(0, 0)] = f64::NAN;
        y[(1, 1)] = f64::NAN;
        let sampler = ResidualBootstrap::new().with_samples(5).with_seed(0);
        assert!(matches!(
            sampler.sample_paths(y.as_ref(), fitted.as_ref(), y_hat.as_ref()),
            Err(Error::InsufficientHistory { needed: 2, found: 1 })
        ));
    }

    #[test]
    fn test_zero_samples_rejected() {
        let (y, fitted, y_hat) = constant_inputs(1, 4, 1);
        let sampler = ResidualBootstrap::new().with_samples(0);
        assert!(matches!(
            sampler.sample_paths(y.as_ref(), fitted.as_ref(), y_hat.as_ref()),
            Err(Error::InvalidParameter { .. })
        ));
    }
}
