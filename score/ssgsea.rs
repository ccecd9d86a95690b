use crate::pathways::PathwayDict;
use crate::progress::{ScoringProgress, ScoringStage};
use crate::rank::{argsort_descending, average_ranks, pathway_columns, running_sum};
use crate::types::{AbundanceMatrix, MatrixError, ScoreMatrix, assemble};
use log::{info, warn};
use ndarray::Array1;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

const RANK_SCALE: f64 = 10_000.0;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SsgseaOptions {
    /// Exponent applied to the rank-normalised values.
    pub weight: f64,
    /// Divide every score by the range of all scores.
    pub normalize: bool,
}

impl Default for SsgseaOptions {
    fn default() -> Self {
        Self {
            weight: 0.25,
            normalize: true,
        }
    }
}

/// Sample-wise ssGSEA: each sample's entities are rank-normalised, sorted in
/// decreasing order and walked; the enrichment score is the sum of the walk.
pub fn ssgsea(
    matrix: &AbundanceMatrix,
    pathways: &PathwayDict,
    options: &SsgseaOptions,
    progress: &dyn ScoringProgress,
) -> Result<ScoreMatrix, MatrixError> {
    let columns = pathway_columns(matrix, pathways);
    let n_entities = matrix.n_entities();
    let values = matrix.values();

    progress.on_stage_start(ScoringStage::RankScoring, matrix.n_samples());
    let per_sample: Vec<Vec<f64>> = (0..matrix.n_samples())
        .into_par_iter()
        .map(|s| {
            let row: Vec<f64> = values.row(s).to_vec();
            let normalized: Vec<f64> = average_ranks(&row)
                .into_iter()
                .map(|r| RANK_SCALE * r / n_entities as f64)
                .collect();
            let order = argsort_descending(&normalized);
            let weights: Vec<f64> = order
                .iter()
                .map(|&i| normalized[i].abs().powf(options.weight))
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
                    running_sum(&weights, &hits).iter().sum::<f64>()
                })
                .collect();
            progress.on_item_done(ScoringStage::RankScoring);
            scores
        })
        .collect();
    progress.on_stage_finish(ScoringStage::RankScoring);

    let range = if options.normalize {
        let (lo, hi) = per_sample
            .iter()
            .flatten()
            .filter(|v| v.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        let range = hi - lo;
        if range > 0.0 && range.is_finite() {
            Some(range)
        } else {
            warn!("ssGSEA scores have no spread; reporting raw enrichment scores");
            None
        }
    } else {
        None
    };

    let vectors = (0..columns.len())
        .map(|j| {
            per_sample
                .iter()
                .map(|scores| range.map_or(scores[j], |r| scores[j] / r))
                .collect::<Array1<f64>>()
        })
        .collect();
    let result = assemble(
        vectors,
        pathways.ids().map(str::to_string).collect(),
        matrix.sample_ids().to_vec(),
    )?;
    info!(
        "ssGSEA scored {} samples across {} pathways",
        result.shape().0,
        result.shape().1
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pathways::PathwayEntry;
    use crate::progress::NoopProgress;
    use ndarray::array;

    fn fixture() -> (AbundanceMatrix, PathwayDict) {
        let matrix = AbundanceMatrix::new(
            vec!["s1".into(), "s2".into(), "s3".into()],
            ["a", "b", "c", "d", "e", "f"].iter().map(|s| s.to_string()).collect(),
            array![
                [9.0, 8.0, 1.0, 2.0, 3.0, 4.0],
                [1.0, 2.0, 9.0, 8.0, 3.0, 4.0],
                [5.0, 5.0, 5.0, 5.0, 5.0, 5.1]
            ],
        )
        .unwrap();
        let pathways = PathwayDict::from_entries([
            PathwayEntry::new("up", None, ["a", "b"]),
            PathwayEntry::new("down", None, ["c", "d"]),
        ]);
        (matrix, pathways)
    }

    #[test]
    fn top_ranked_sets_score_higher() {
        let (matrix, pathways) = fixture();
        let scores = ssgsea(&matrix, &pathways, &SsgseaOptions::default(), &NoopProgress).unwrap();
        assert_eq!(scores.pathway_ids(), ["up".to_string(), "down".to_string()]);
        let up = scores.column("up").unwrap();
        let down = scores.column("down").unwrap();
        assert!(up[0] > down[0]);
        assert!(up[1] < down[1]);
    }

    #[test]
    fn normalised_scores_span_at_most_one() {
        let (matrix, pathways) = fixture();
        let scores = ssgsea(&matrix, &pathways, &SsgseaOptions::default(), &NoopProgress).unwrap();
        let lo = scores.values().iter().copied().fold(f64::INFINITY, f64::min);
        let hi = scores.values().iter().copied().fold(f64::NEG_INFINITY, f64::max);
        approx::assert_abs_diff_eq!(hi - lo, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn repeated_runs_are_identical() {
        let (matrix, pathways) = fixture();
        let options = SsgseaOptions {
            weight: 1.0,
            normalize: false,
        };
        let a = ssgsea(&matrix, &pathways, &options, &NoopProgress).unwrap();
        let b = ssgsea(&matrix, &pathways, &options, &NoopProgress).unwrap();
        assert_eq!(a, b);
    }
}
