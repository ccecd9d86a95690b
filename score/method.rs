// ========================================================================================
//                         Scoring method selection and dispatch
// ========================================================================================

use crate::cluster::{KMeansModel, KMeansOptions};
use crate::kpca::{KernelPcaModel, KernelPcaOptions};
use crate::linalg::LinalgError;
use crate::pathways::DEFAULT_MIN_ENTITY;
use crate::plage::PlageModel;
use crate::zscore::ZScoreModel;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("Linear algebra failure: {0}")]
    Linalg(#[from] LinalgError),
    #[error("{method} needs at least {needed} samples, got {found}.")]
    TooFewSamples {
        method: &'static str,
        needed: usize,
        found: usize,
    },
    #[error("Submatrix has shape {0:?}; at least one sample and one entity are required.")]
    EmptySubmatrix((usize, usize)),
    #[error("Submatrix has {found} entity columns but the model was fitted on {expected}.")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("Invalid scoring option: {0}")]
    InvalidOption(String),
}

pub(crate) fn check_width(expected: usize, x: &Array2<f64>) -> Result<(), ScoringError> {
    if x.ncols() == expected {
        Ok(())
    } else {
        Err(ScoringError::DimensionMismatch {
            expected,
            found: x.ncols(),
        })
    }
}

/// The projection-style single-sample scoring engines.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScoringMethod {
    /// Lee et al. z-score aggregation.
    #[default]
    ZScore,
    /// PLAGE: leading singular vector.
    Svd,
    /// First RBF kernel principal component.
    KernelPca,
    /// Distance to the first of two k-means centroids (ssClustPA).
    Cluster,
    /// Projection onto the axis joining the two k-means centroids.
    ClusterProjected,
}

impl ScoringMethod {
    pub const ALL: [ScoringMethod; 5] = [
        ScoringMethod::ZScore,
        ScoringMethod::Svd,
        ScoringMethod::KernelPca,
        ScoringMethod::Cluster,
        ScoringMethod::ClusterProjected,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::ZScore => "zscore",
            Self::Svd => "svd",
            Self::KernelPca => "kpca",
            Self::Cluster => "cluster",
            Self::ClusterProjected => "cluster-proj",
        }
    }

    /// Whether the score sign may flip between otherwise identical fits.
    pub fn sign_ambiguous(self) -> bool {
        matches!(self, Self::Svd | Self::KernelPca)
    }
}

impl fmt::Display for ScoringMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ScoringMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "zscore" | "z-score" => Ok(Self::ZScore),
            "svd" | "plage" => Ok(Self::Svd),
            "kpca" | "kernel-pca" => Ok(Self::KernelPca),
            "cluster" | "ssclustpa" => Ok(Self::Cluster),
            "cluster-proj" | "cluster-projected" => Ok(Self::ClusterProjected),
            other => Err(format!(
                "unknown scoring method '{other}' (expected one of: zscore, svd, kpca, cluster, cluster-proj)"
            )),
        }
    }
}

/// Knobs shared by every projection engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringOptions {
    pub min_entity: usize,
    pub seed: u64,
    pub kernel_pca: KernelPcaOptions,
    pub kmeans: KMeansOptions,
}

impl Default for ScoringOptions {
    fn default() -> Self {
        Self {
            min_entity: DEFAULT_MIN_ENTITY,
            seed: 0,
            kernel_pca: KernelPcaOptions::default(),
            kmeans: KMeansOptions::default(),
        }
    }
}

/// Parameters learned for one pathway by one engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "kebab-case")]
pub enum PathwayModel {
    ZScore(ZScoreModel),
    Svd(PlageModel),
    KernelPca(KernelPcaModel),
    Cluster(KMeansModel),
    ClusterProjected(KMeansModel),
}

impl PathwayModel {
    /// `seed` drives the stochastic engines only; callers derive it per pathway.
    pub fn fit(
        method: ScoringMethod,
        x: &Array2<f64>,
        options: &ScoringOptions,
        seed: u64,
    ) -> Result<Self, ScoringError> {
        Ok(match method {
            ScoringMethod::ZScore => Self::ZScore(ZScoreModel::fit(x)?),
            ScoringMethod::Svd => Self::Svd(PlageModel::fit(x)?),
            ScoringMethod::KernelPca => Self::KernelPca(KernelPcaModel::fit(x, &options.kernel_pca)?),
            ScoringMethod::Cluster => Self::Cluster(KMeansModel::fit(x, &options.kmeans, seed)?),
            ScoringMethod::ClusterProjected => {
                Self::ClusterProjected(KMeansModel::fit(x, &options.kmeans, seed)?)
            }
        })
    }

    pub fn transform(&self, x: &Array2<f64>) -> Result<Array1<f64>, ScoringError> {
        match self {
            Self::ZScore(model) => model.transform(x),
            Self::Svd(model) => model.transform(x),
            Self::KernelPca(model) => model.transform(x),
            Self::Cluster(model) => model.transform(x),
            Self::ClusterProjected(model) => model.transform_projected(x),
        }
    }

    pub fn method(&self) -> ScoringMethod {
        match self {
            Self::ZScore(_) => ScoringMethod::ZScore,
            Self::Svd(_) => ScoringMethod::Svd,
            Self::KernelPca(_) => ScoringMethod::KernelPca,
            Self::Cluster(_) => ScoringMethod::Cluster,
            Self::ClusterProjected(_) => ScoringMethod::ClusterProjected,
        }
    }
}

/// One-shot score for a single pathway submatrix: fit, then transform the same rows.
pub fn score_submatrix(
    method: ScoringMethod,
    x: &Array2<f64>,
    options: &ScoringOptions,
    seed: u64,
) -> Result<Array1<f64>, ScoringError> {
    PathwayModel::fit(method, x, options, seed)?.transform(x)
}
