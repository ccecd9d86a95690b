//! Rank-based single-sample methods (ssGSEA, GSVA) and the running-sum
//! enrichment walk they share with phenotype-permutation GSEA.

use crate::gsva::{GsvaOptions, gsva};
use crate::pathways::PathwayDict;
use crate::progress::{NoopProgress, ScoringProgress};
use crate::ssgsea::{SsgseaOptions, ssgsea};
use crate::types::{AbundanceMatrix, MatrixError, ScoreMatrix};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RankMethod {
    Ssgsea,
    Gsva,
}

impl RankMethod {
    pub fn name(self) -> &'static str {
        match self {
            Self::Ssgsea => "ssgsea",
            Self::Gsva => "gsva",
        }
    }
}

impl fmt::Display for RankMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RankMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ssgsea" => Ok(Self::Ssgsea),
            "gsva" => Ok(Self::Gsva),
            other => Err(format!(
                "unknown rank method '{other}' (expected ssgsea or gsva)"
            )),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankOptions {
    pub ssgsea: SsgseaOptions,
    pub gsva: GsvaOptions,
}

/// Scores every pathway in `pathways` for every sample. The pathway set is
/// expected to be coverage-filtered already; its order becomes the column order.
pub fn rank_scores(
    matrix: &AbundanceMatrix,
    pathways: &PathwayDict,
    method: RankMethod,
    options: &RankOptions,
) -> Result<ScoreMatrix, MatrixError> {
    rank_scores_with_progress(matrix, pathways, method, options, &NoopProgress)
}

pub fn rank_scores_with_progress(
    matrix: &AbundanceMatrix,
    pathways: &PathwayDict,
    method: RankMethod,
    options: &RankOptions,
    progress: &dyn ScoringProgress,
) -> Result<ScoreMatrix, MatrixError> {
    match method {
        RankMethod::Ssgsea => ssgsea(matrix, pathways, &options.ssgsea, progress),
        RankMethod::Gsva => gsva(matrix, pathways, &options.gsva, progress),
    }
}

/// Column positions of each pathway's measured entities, in pathway order.
pub(crate) fn pathway_columns(matrix: &AbundanceMatrix, pathways: &PathwayDict) -> Vec<Vec<usize>> {
    pathways
        .iter()
        .map(|entry| {
            entry
                .entities
                .iter()
                .filter_map(|e| matrix.entity_index(e))
                .collect()
        })
        .collect()
}

/// Indices that sort `values` in decreasing order; ties keep their input order.
pub fn argsort_descending(values: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[b].total_cmp(&values[a]));
    order
}

/// 1-based ranks in increasing order, ties receiving their average rank.
pub fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
    let mut ranks = vec![0.0; values.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && values[order[end]] == values[order[start]] {
            end += 1;
        }
        let rank = (start + end + 1) as f64 / 2.0;
        for &idx in &order[start..end] {
            ranks[idx] = rank;
        }
        start = end;
    }
    ranks
}

/// Running enrichment statistic along a ranked list.
///
/// `weights[i]` is the step taken when position `i` is a hit, before
/// normalisation; misses step down by `1 / n_misses`. Returns the walk, one value
/// per position. Every value is NaN when the hits carry no weight.
pub fn running_sum(weights: &[f64], hits: &[bool]) -> Vec<f64> {
    let hit_total: f64 = weights
        .iter()
        .zip(hits)
        .filter(|&(_, &hit)| hit)
        .map(|(w, _)| *w)
        .sum();
    let n_miss = hits.iter().filter(|&&hit| !hit).count();
    if hit_total <= 0.0 {
        return vec![f64::NAN; hits.len()];
    }
    let miss_step = if n_miss > 0 { 1.0 / n_miss as f64 } else { 0.0 };

    let mut walk = Vec::with_capacity(hits.len());
    let mut current = 0.0;
    for (w, &hit) in weights.iter().zip(hits) {
        if hit {
            current += w / hit_total;
        } else {
            current -= miss_step;
        }
        walk.push(current);
    }
    walk
}

/// Largest positive and most negative excursions of a walk.
pub fn walk_extremes(walk: &[f64]) -> (f64, f64) {
    walk.iter().fold((0.0_f64, 0.0_f64), |(pos, neg), &v| {
        (pos.max(v), neg.min(v))
    })
}

/// Classic enrichment score: the excursion farthest from zero.
pub fn max_deviation(walk: &[f64]) -> f64 {
    if walk.iter().any(|v| v.is_nan()) {
        return f64::NAN;
    }
    let (pos, neg) = walk_extremes(walk);
    if pos >= neg.abs() { pos } else { neg }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn average_ranks_split_ties() {
        assert_eq!(average_ranks(&[3.0, 1.0, 3.0, 2.0]), vec![3.5, 1.0, 3.5, 2.0]);
    }

    #[test]
    fn argsort_is_stable_for_ties() {
        assert_eq!(argsort_descending(&[1.0, 5.0, 1.0, 7.0]), vec![3, 1, 0, 2]);
    }

    #[test]
    fn running_sum_ends_at_zero() {
        let walk = running_sum(&[4.0, 3.0, 2.0, 1.0], &[true, false, true, false]);
        assert_abs_diff_eq!(walk[0], 4.0 / 6.0, epsilon = 1e-12);
        assert_abs_diff_eq!(walk[1], 4.0 / 6.0 - 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(*walk.last().unwrap(), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(max_deviation(&walk), 4.0 / 6.0, epsilon = 1e-12);
    }

    #[test]
    fn weightless_hits_give_nan() {
        let walk = running_sum(&[0.0, 1.0], &[true, false]);
        assert!(walk.iter().all(|v| v.is_nan()));
        assert!(max_deviation(&walk).is_nan());
    }

    #[test]
    fn rank_method_parses() {
        assert_eq!("GSVA".parse::<RankMethod>().unwrap(), RankMethod::Gsva);
        assert!("plage".parse::<RankMethod>().is_err());
    }
}
