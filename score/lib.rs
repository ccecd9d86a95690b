#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

pub mod cluster;
pub mod config;
pub mod gsva;
pub mod io;
pub mod kpca;
pub mod method;
pub mod model;
pub mod pipeline;
pub mod plage;
pub mod progress;
pub mod rank;
pub mod ssgsea;
pub mod types;
pub mod zscore;

#[path = "../shared/linalg.rs"]
pub mod linalg;

#[path = "../pathways/mod.rs"]
pub mod pathways;

#[path = "../enrich/mod.rs"]
pub mod enrich;

pub use config::{AnalysisConfig, ConfigError};
pub use method::{PathwayModel, ScoringError, ScoringMethod, ScoringOptions, score_submatrix};
pub use model::{FittedPathway, FittedSspa, ModelError, SspaEstimator, SspaModel};
pub use pathways::{CoverageFilter, PathwayDict, PathwayEntry, PathwayError, PathwayTable, to_dict};
pub use pipeline::{AnalysisMethod, run_analysis, run_analysis_with_progress, score_pathways};
pub use rank::{RankMethod, RankOptions, rank_scores};
pub use types::{AbundanceMatrix, MatrixError, ScoreMatrix, SubMatrix, assemble};
