//! GSVA: per-entity kernel CDF estimates turned into log-odds, a symmetric rank
//! statistic per sample, and a KS-like random walk per pathway.

use crate::pathways::PathwayDict;
use crate::progress::{ScoringProgress, ScoringStage};
use crate::rank::{argsort_descending, pathway_columns, running_sum, walk_extremes};
use crate::types::{AbundanceMatrix, MatrixError, ScoreMatrix, assemble};
use log::info;
use ndarray::{Array1, Array2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::function::erf::erf;

const SIGMA_FACTOR: f64 = 4.0;
const MIN_BANDWIDTH: f64 = 0.001;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GsvaOptions {
    /// Exponent on the rank statistic during the walk.
    pub tau: f64,
    /// Score is the sum of the positive and negative peaks rather than the larger one.
    pub max_diff: bool,
    /// With `max_diff`, use peak minus trough instead.
    pub abs_rank: bool,
    /// Gaussian kernel CDF; `false` uses the empirical CDF.
    pub kernel: bool,
}

impl Default for GsvaOptions {
    fn default() -> Self {
        Self {
            tau: 1.0,
            max_diff: true,
            abs_rank: false,
            kernel: true,
        }
    }
}

fn normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z / std::f64::consts::SQRT_2))
}

fn sample_sd(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let ss: f64 = values.iter().map(|v| (v - mean) * (v - mean)).sum();
    (ss / (n - 1.0)).sqrt()
}

/// Log-odds of each value under a Gaussian kernel CDF fitted on the same values.
/// ln(p / (1 - p)) with `p` held inside `[floor, 1 - floor]`.
fn log_odds(p: f64, floor: f64) -> f64 {
    let p = p.clamp(floor, 1.0 - floor);
    (p / (1.0 - p)).ln()
}

fn kernel_log_odds(values: &[f64]) -> Vec<f64> {
    let bandwidth = (sample_sd(values) / SIGMA_FACTOR).max(MIN_BANDWIDTH);
    let n = values.len() as f64;
    values
        .iter()
        .map(|&y| {
            let left_tail = values
                .iter()
                .map(|&x| normal_cdf((y - x) / bandwidth))
                .sum::<f64>()
                / n;
            log_odds(left_tail, f64::EPSILON)
        })
        .collect()
}

fn ecdf_log_odds(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let n = values.len() as f64;
    values
        .iter()
        .map(|v| {
            // the maximum has ECDF 1; half a step below keeps it finite and still on top
            let frac = sorted.partition_point(|x| x <= v) as f64 / n;
            log_odds(frac, 0.5 / n)
        })
        .collect()
}

/// Samples × entities matrix of per-entity log-odds.
fn density_matrix(matrix: &AbundanceMatrix, kernel: bool) -> Array2<f64> {
    let values = matrix.values();
    let columns: Vec<Vec<f64>> = (0..matrix.n_entities())
        .into_par_iter()
        .map(|j| {
            let column = values.column(j).to_vec();
            if kernel {
                kernel_log_odds(&column)
            } else {
                ecdf_log_odds(&column)
            }
        })
        .collect();
    Array2::from_shape_fn((matrix.n_samples(), matrix.n_entities()), |(i, j)| {
        columns[j][i]
    })
}

fn combine(pos: f64, neg: f64, options: &GsvaOptions) -> f64 {
    if options.max_diff {
        if options.abs_rank { pos - neg } else { pos + neg }
    } else if pos > neg.abs() {
        pos
    } else {
        neg
    }
}

pub fn gsva(
    matrix: &AbundanceMatrix,
    pathways: &PathwayDict,
    options: &GsvaOptions,
    progress: &dyn ScoringProgress,
) -> Result<ScoreMatrix, MatrixError> {
    let columns = pathway_columns(matrix, pathways);
    let n_entities = matrix.n_entities();
    let density = density_matrix(matrix, options.kernel);

    progress.on_stage_start(ScoringStage::RankScoring, matrix.n_samples());
    let per_sample: Vec<Vec<f64>> = (0..matrix.n_samples())
        .into_par_iter()
        .map(|s| {
            let row = density.row(s).to_vec();
            let order = argsort_descending(&row);
            let half = n_entities as f64 / 2.0;
            let weights: Vec<f64> = (0..n_entities)
                .map(|i| ((n_entities - i) as f64 - half).abs().powf(options.tau))
                .collect();
            let mut position = vec![0usize; n_entities];
            for (pos, &col) in order.iter().enumerate() {
                position[col] = pos;
            }

            let scores = columns
                .iter()
                .map(|cols| {
                    let mut hits = vec![false; n_entities];
                    for &c in cols {
                        hits[position[c]] = true;
                    }
                    let walk = running_sum(&weights, &hits);
                    if walk.iter().any(|v| v.is_nan()) {
                        return f64::NAN;
                    }
                    let (pos, neg) = walk_extremes(&walk);
                    combine(pos, neg, options)
                })
                .collect();
            progress.on_item_done(ScoringStage::RankScoring);
            scores
        })
        .collect();
    progress.on_stage_finish(ScoringStage::RankScoring);

    let vectors = (0..columns.len())
        .map(|j| per_sample.iter().map(|scores| scores[j]).collect::<Array1<f64>>())
        .collect();
    let result = assemble(
        vectors,
        pathways.ids().map(str::to_string).collect(),
        matrix.sample_ids().to_vec(),
    )?;
    info!(
        "GSVA scored {} samples across {} pathways",
        result.shape().0,
        result.shape().1
    );
    Ok(result)
}
