// ========================================================================================
//                   Pathway scoring pipeline: filter, subset, score, assemble
// ========================================================================================

use crate::method::{ScoringMethod, ScoringOptions};
use crate::model::{ModelError, SspaModel, coverage_filtered};
use crate::pathways::PathwayDict;
use crate::progress::{NoopProgress, ScoringProgress};
use crate::rank::{RankMethod, RankOptions, rank_scores_with_progress};
use crate::types::{AbundanceMatrix, ScoreMatrix};
use log::info;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Any single-sample method the pipeline can run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AnalysisMethod {
    Projection(ScoringMethod),
    Rank(RankMethod),
}

impl AnalysisMethod {
    pub fn name(self) -> &'static str {
        match self {
            Self::Projection(method) => method.name(),
            Self::Rank(method) => method.name(),
        }
    }
}

impl Default for AnalysisMethod {
    fn default() -> Self {
        Self::Projection(ScoringMethod::default())
    }
}

impl fmt::Display for AnalysisMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AnalysisMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(method) = s.parse::<ScoringMethod>() {
            return Ok(Self::Projection(method));
        }
        s.parse::<RankMethod>().map(Self::Rank).map_err(|_| {
            format!(
                "unknown method '{}' (expected one of: zscore, svd, kpca, cluster, cluster-proj, ssgsea, gsva)",
                s.trim()
            )
        })
    }
}

impl TryFrom<String> for AnalysisMethod {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AnalysisMethod> for String {
    fn from(method: AnalysisMethod) -> Self {
        method.name().to_string()
    }
}

/// One-shot projection scoring: `fit` then `transform` on the same matrix.
pub fn score_pathways(
    matrix: &AbundanceMatrix,
    pathways: &PathwayDict,
    method: ScoringMethod,
    options: &ScoringOptions,
) -> Result<ScoreMatrix, ModelError> {
    let (_, scores) = SspaModel::with_options(method, options.clone()).fit_transform(matrix, pathways)?;
    Ok(scores)
}

/// Runs any method over the coverage-filtered pathway set. Rows of the result
/// follow the matrix sample order, columns the filtered pathway order.
pub fn run_analysis(
    matrix: &AbundanceMatrix,
    pathways: &PathwayDict,
    method: AnalysisMethod,
    scoring: &ScoringOptions,
    rank: &RankOptions,
) -> Result<ScoreMatrix, ModelError> {
    run_analysis_with_progress(matrix, pathways, method, scoring, rank, &NoopProgress)
}

pub fn run_analysis_with_progress(
    matrix: &AbundanceMatrix,
    pathways: &PathwayDict,
    method: AnalysisMethod,
    scoring: &ScoringOptions,
    rank: &RankOptions,
    progress: &dyn ScoringProgress,
) -> Result<ScoreMatrix, ModelError> {
    info!(
        "Running {method} on {} samples x {} entities with {} pathways",
        matrix.n_samples(),
        matrix.n_entities(),
        pathways.len()
    );
    match method {
        AnalysisMethod::Projection(method) => {
            let fitted = SspaModel::with_options(method, scoring.clone())
                .fit_with_progress(matrix, pathways, progress)?;
            fitted.transform_with_progress(matrix, progress)
        }
        AnalysisMethod::Rank(method) => {
            let kept = coverage_filtered(matrix, pathways, scoring.min_entity);
            info!("{} pathways pass the coverage filter", kept.len());
            Ok(rank_scores_with_progress(matrix, &kept, method, rank, progress)?)
        }
    }
}
