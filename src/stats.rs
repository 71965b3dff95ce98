//! Normalization helpers and statistics over an ensemble of sampled networks.

use ndarray::prelude::*;
use std::f64::consts::PI;

use crate::error::{BnnError, Result};

/// Replaces degenerate (zero or non-finite) standard deviations by one so that constant
/// features pass through normalization unchanged instead of producing NaNs.
fn sanitize_std(std: f64) -> f64 {
    if std > 0.0 && std.is_finite() {
        std
    } else {
        1.0
    }
}

/// Per-column zero-mean/unit-variance transform for input matrices.
#[derive(Debug, Clone, PartialEq)]
pub struct InputNormalizer {
    pub mean: Array1<f64>,
    pub std: Array1<f64>,
}

impl InputNormalizer {
    /// Computes column means and (population) standard deviations of `x`.
    pub fn fit(x: &Array2<f64>) -> Result<Self> {
        let mean = x.mean_axis(Axis(0)).ok_or_else(|| BnnError::ShapeMismatch {
            expected: vec![1, x.ncols()],
            got: vec![x.nrows(), x.ncols()],
        })?;
        let std = x.std_axis(Axis(0), 0.0).mapv(sanitize_std);
        Ok(Self { mean, std })
    }

    pub fn dimensionality(&self) -> usize {
        self.mean.len()
    }

    /// `(x - mean) / std`, column-wise.
    pub fn normalize(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.check(x.ncols())?;
        Ok((x - &self.mean) / &self.std)
    }

    /// Inverse of [`InputNormalizer::normalize`].
    pub fn unnormalize(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.check(x.ncols())?;
        Ok(x * &self.std + &self.mean)
    }

    fn check(&self, ncols: usize) -> Result<()> {
        if ncols != self.dimensionality() {
            return Err(BnnError::DimensionMismatch {
                expected: self.dimensionality(),
                got: ncols,
            });
        }
        Ok(())
    }
}

/// Zero-mean/unit-variance transform for scalar regression targets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputNormalizer {
    pub mean: f64,
    pub std: f64,
}

impl OutputNormalizer {
    /// Computes the mean and (population) standard deviation of `y`.
    pub fn fit(y: &Array1<f64>) -> Result<Self> {
        let mean = y.mean().ok_or_else(|| BnnError::ShapeMismatch {
            expected: vec![1],
            got: vec![0],
        })?;
        Ok(Self {
            mean,
            std: sanitize_std(y.std(0.0)),
        })
    }

    pub fn normalize<D: Dimension>(&self, y: &Array<f64, D>) -> Array<f64, D> {
        y.mapv(|v| (v - self.mean) / self.std)
    }

    pub fn unnormalize<D: Dimension>(&self, y: &Array<f64, D>) -> Array<f64, D> {
        y.mapv(|v| v * self.std + self.mean)
    }
}

/// Which predictive variance an ensemble reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarianceKind {
    /// Spread of the sampled networks' means only.
    #[default]
    Epistemic,
    /// Spread of the means plus the average predicted noise variance.
    Total,
}

/// Mean and variance over the sample axis (axis 0) of `means`, shaped `[K, n]`.
///
/// `log_variances` must have the same shape and is only read for [`VarianceKind::Total`].
pub fn ensemble_moments(
    means: &Array2<f64>,
    log_variances: &Array2<f64>,
    kind: VarianceKind,
) -> Result<(Array1<f64>, Array1<f64>)> {
    let mean = means.mean_axis(Axis(0)).ok_or(BnnError::EmptyEnsemble)?;
    let variance = match kind {
        VarianceKind::Epistemic => (means - &mean)
            .mapv(|d| d * d)
            .mean_axis(Axis(0))
            .ok_or(BnnError::EmptyEnsemble)?,
        VarianceKind::Total => {
            let second_moment = (means.mapv(|m| m * m) + log_variances.mapv(f64::exp))
                .mean_axis(Axis(0))
                .ok_or(BnnError::EmptyEnsemble)?;
            second_moment - mean.mapv(|m| m * m)
        }
    };
    Ok((mean, variance))
}

/// Log-density of `N(mean, variance)` at `y`.
pub fn gaussian_log_pdf(y: f64, mean: f64, variance: f64) -> f64 {
    let diff = y - mean;
    -0.5 * (2.0 * PI * variance).ln() - diff * diff / (2.0 * variance)
}

/// Average Gaussian log-likelihood of `y` under per-point predictive means and variances.
pub fn mean_log_likelihood(y: &Array1<f64>, mean: &Array1<f64>, variance: &Array1<f64>) -> f64 {
    let total: f64 = y
        .iter()
        .zip(mean.iter())
        .zip(variance.iter())
        .map(|((&y, &m), &v)| gaussian_log_pdf(y, m, v))
        .sum();
    total / y.len() as f64
}

/// Mean squared error between `y` and `prediction`.
pub fn mean_squared_error(y: &Array1<f64>, prediction: &Array1<f64>) -> f64 {
    (y - prediction).mapv(|d| d * d).mean().unwrap_or(f64::NAN)
}
