//! RBF kernel PCA for pathway submatrices.
//!
//! Follows the usual kernel PCA recipe: build the training kernel, double-centre
//! it, keep the leading eigenvectors scaled by 1/√λ, and centre new kernels with
//! the training statistics. Eigenvector signs are fixed so that the entry of
//! largest magnitude in each component is positive.

use crate::linalg::leading_eigenpairs;
use crate::method::{ScoringError, check_width};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelPcaOptions {
    pub n_components: usize,
    /// RBF bandwidth; `None` means 1 / n_entities.
    pub gamma: Option<f64>,
}

impl Default for KernelPcaOptions {
    fn default() -> Self {
        Self {
            n_components: 2,
            gamma: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KernelPcaModel {
    training: Array2<f64>,
    gamma: f64,
    fit_column_means: Array1<f64>,
    fit_mean: f64,
    /// Eigenvectors divided by √λ, one column per component; zero where λ = 0.
    scaled_alphas: Array2<f64>,
    eigenvalues: Array1<f64>,
}

const SMALL_EIGEN_RATIO: f64 = 1e-12;

/// First entry of largest magnitude.
fn pivot(values: impl Iterator<Item = f64>) -> f64 {
    values.fold(0.0, |best, v| if v.abs() > best.abs() { v } else { best })
}

fn rbf_kernel(a: &Array2<f64>, b: &Array2<f64>, gamma: f64) -> Array2<f64> {
    Array2::from_shape_fn((a.nrows(), b.nrows()), |(i, j)| {
        let sq: f64 = a
            .row(i)
            .iter()
            .zip(b.row(j).iter())
            .map(|(x, y)| (x - y) * (x - y))
            .sum();
        (-gamma * sq).exp()
    })
}

impl KernelPcaModel {
    pub fn fit(x: &Array2<f64>, options: &KernelPcaOptions) -> Result<Self, ScoringError> {
        let (n, p) = x.dim();
        if n == 0 || p == 0 {
            return Err(ScoringError::EmptySubmatrix(x.dim()));
        }
        if options.n_components == 0 {
            return Err(ScoringError::InvalidOption(
                "kernel PCA needs at least one component".to_string(),
            ));
        }
        let gamma = options.gamma.unwrap_or(1.0 / p as f64);
        if !(gamma > 0.0 && gamma.is_finite()) {
            return Err(ScoringError::InvalidOption(format!(
                "kernel PCA gamma must be positive, got {gamma}"
            )));
        }

        let kernel = rbf_kernel(x, x, gamma);
        let fit_column_means = kernel.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(n));
        let fit_mean = fit_column_means.mean().unwrap_or(0.0);
        let centered = Array2::from_shape_fn((n, n), |(i, j)| {
            kernel[(i, j)] - fit_column_means[j] - fit_column_means[i] + fit_mean
        });

        let (mut eigenvalues, mut alphas) = leading_eigenpairs(&centered, options.n_components)?;
        let floor = eigenvalues.first().copied().unwrap_or(0.0) * SMALL_EIGEN_RATIO;
        eigenvalues.mapv_inplace(|l| if l < floor { 0.0 } else { l });

        for mut column in alphas.columns_mut() {
            if pivot(column.iter().copied()) < 0.0 {
                column.mapv_inplace(|v| -v);
            }
        }

        let mut scaled_alphas = alphas;
        for (mut column, &lambda) in scaled_alphas.columns_mut().into_iter().zip(eigenvalues.iter()) {
            if lambda > 0.0 {
                let root = lambda.sqrt();
                column.mapv_inplace(|v| v / root);
            } else {
                column.fill(0.0);
            }
        }

        Ok(Self {
            training: x.clone(),
            gamma,
            fit_column_means,
            fit_mean,
            scaled_alphas,
            eigenvalues,
        })
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    pub fn eigenvalues(&self) -> &Array1<f64> {
        &self.eigenvalues
    }

    /// Projections of `x` onto every retained component.
    pub fn project(&self, x: &Array2<f64>) -> Result<Array2<f64>, ScoringError> {
        check_width(self.training.ncols(), x)?;
        let kernel = rbf_kernel(x, &self.training, self.gamma);
        let row_means = kernel
            .mean_axis(Axis(1))
            .unwrap_or_else(|| Array1::zeros(kernel.nrows()));
        let centered = Array2::from_shape_fn(kernel.dim(), |(i, j)| {
            kernel[(i, j)] - self.fit_column_means[j] - row_means[i] + self.fit_mean
        });
        Ok(centered.dot(&self.scaled_alphas))
    }

    /// First-component projection.
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array1<f64>, ScoringError> {
        Ok(self.project(x)?.column(0).to_owned())
    }
}
