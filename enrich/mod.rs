//! Two-class statistics on top of the pathway layer: per-entity differential
//! tests, over-representation analysis and phenotype-permutation GSEA.

pub mod correction;
pub mod differential;
pub mod gsea;
pub mod ora;

pub use correction::benjamini_hochberg;
pub use differential::{
    ClassLabels, DifferentialRecord, DifferentialTest, differential_test, factorize,
};
pub use gsea::{GseaOptions, GseaRecord, gsea};
pub use ora::{DEFAULT_DA_CUTOFF, OraAnalysis, OraRecord, ora};

use crate::types::MatrixError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("Exactly two phenotype classes are required, found {found}.")]
    ClassCardinality { found: usize },
    #[error("Got {labels} class labels for {samples} samples.")]
    LabelLength { labels: usize, samples: usize },
    #[error("Class '{class}' has {found} samples; at least {needed} are required.")]
    GroupTooSmall {
        class: String,
        needed: usize,
        found: usize,
    },
    #[error("Invalid enrichment option: {0}")]
    InvalidOption(String),
    #[error("Matrix error: {0}")]
    Matrix(#[from] MatrixError),
}
