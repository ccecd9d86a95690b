//! Phenotype-permutation GSEA.
//!
//! Entities are ranked by the signal-to-noise ratio between the two classes,
//! each pathway gets the weighted Kolmogorov-Smirnov enrichment score, and the
//! null distribution comes from re-running the ranking on shuffled class labels.

use super::EnrichmentError;
use super::differential::ClassLabels;
use crate::pathways::{PathwayDict, filter_by_coverage};
use crate::progress::{NoopProgress, ScoringProgress, ScoringStage};
use crate::rank::{argsort_descending, max_deviation, pathway_columns, running_sum};
use crate::types::AbundanceMatrix;
use log::{debug, info};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

const MIN_SIGMA_FRACTION: f64 = 0.2;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GseaOptions {
    pub permutations: usize,
    /// Exponent on the ranking metric during the walk.
    pub weight: f64,
    pub min_entity: usize,
    pub seed: u64,
}

impl Default for GseaOptions {
    fn default() -> Self {
        Self {
            permutations: 1000,
            weight: 1.0,
            min_entity: crate::pathways::DEFAULT_MIN_ENTITY,
            seed: 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GseaRecord {
    pub id: String,
    pub name: Option<String>,
    pub es: f64,
    pub nes: f64,
    pub p_value: f64,
    pub fdr: f64,
    pub size: usize,
    pub leading_edge: Vec<String>,
}

fn group_stats(values: &[f64], codes: &[usize], class: usize) -> (f64, f64) {
    let group: Vec<f64> = values
        .iter()
        .zip(codes)
        .filter(|&(_, &c)| c == class)
        .map(|(v, _)| *v)
        .collect();
    let n = group.len() as f64;
    let mean = group.iter().sum::<f64>() / n;
    let var = group.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let floor = if mean == 0.0 {
        MIN_SIGMA_FRACTION
    } else {
        MIN_SIGMA_FRACTION * mean.abs()
    };
    (mean, var.sqrt().max(floor))
}

/// Signal-to-noise ratio of class 0 over class 1 for every entity.
pub fn signal_to_noise(matrix: &AbundanceMatrix, codes: &[usize]) -> Vec<f64> {
    let values = matrix.values();
    (0..matrix.n_entities())
        .map(|j| {
            let column = values.column(j).to_vec();
            let (m0, s0) = group_stats(&column, codes, 0);
            let (m1, s1) = group_stats(&column, codes, 1);
            (m0 - m1) / (s0 + s1)
        })
        .collect()
}

struct RankedWalks {
    order: Vec<usize>,
    walks: Vec<Vec<f64>>,
}

fn walks(metric: &[f64], columns: &[Vec<usize>], weight: f64) -> RankedWalks {
    let order = argsort_descending(metric);
    let weights: Vec<f64> = order.iter().map(|&i| metric[i].abs().powf(weight)).collect();
    let mut position = vec![0usize; metric.len()];
    for (pos, &col) in order.iter().enumerate() {
        position[col] = pos;
    }
    let walks = columns
        .iter()
        .map(|cols| {
            let mut hits = vec![false; metric.len()];
            for &c in cols {
                hits[position[c]] = true;
            }
            running_sum(&weights, &hits)
        })
        .collect();
    RankedWalks { order, walks }
}

fn enrichment_scores(metric: &[f64], columns: &[Vec<usize>], weight: f64) -> Vec<f64> {
    walks(metric, columns, weight)
        .walks
        .iter()
        .map(|w| max_deviation(w))
        .collect()
}

/// Mean magnitude of the null scores on the same side as `es`.
fn normalizer(es: f64, null: &[f64]) -> f64 {
    let same: Vec<f64> = if es >= 0.0 {
        null.iter().copied().filter(|v| *v >= 0.0).collect()
    } else {
        null.iter().copied().filter(|v| *v < 0.0).collect()
    };
    if same.is_empty() {
        return f64::NAN;
    }
    (same.iter().sum::<f64>() / same.len() as f64).abs()
}

fn nominal_p(es: f64, null: &[f64]) -> f64 {
    let (extreme, same) = if es >= 0.0 {
        (
            null.iter().filter(|&&v| v >= es).count(),
            null.iter().filter(|&&v| v >= 0.0).count(),
        )
    } else {
        (
            null.iter().filter(|&&v| v <= es).count(),
            null.iter().filter(|&&v| v < 0.0).count(),
        )
    };
    if same == 0 {
        f64::NAN
    } else {
        extreme as f64 / same as f64
    }
}

/// FDR q-value: tail fraction of the pooled null NES over the tail fraction of
/// the observed NES, on the side of `nes`.
fn fdr(nes: f64, observed: &[f64], null: &[f64]) -> f64 {
    let tail = |values: &[f64]| -> f64 {
        let (hit, same) = if nes >= 0.0 {
            (
                values.iter().filter(|&&v| v >= nes).count(),
                values.iter().filter(|&&v| v >= 0.0).count(),
            )
        } else {
            (
                values.iter().filter(|&&v| v <= nes).count(),
                values.iter().filter(|&&v| v < 0.0).count(),
            )
        };
        if same == 0 { f64::NAN } else { hit as f64 / same as f64 }
    };
    let null_tail = tail(null);
    let observed_tail = tail(observed);
    if observed_tail.is_nan() || null_tail.is_nan() || observed_tail == 0.0 {
        return f64::NAN;
    }
    (null_tail / observed_tail).min(1.0)
}

fn leading_edge(walk: &[f64], order: &[usize], hits: &[usize], es: f64) -> Vec<usize> {
    if es.is_nan() {
        return Vec::new();
    }
    let peak = walk.iter().position(|&v| v == es).unwrap_or(0);
    let hit_positions: Vec<usize> = order
        .iter()
        .enumerate()
        .filter(|&(_, col)| hits.contains(col))
        .map(|(pos, _)| pos)
        .collect();
    hit_positions
        .into_iter()
        .filter(|&pos| if es >= 0.0 { pos <= peak } else { pos >= peak })
        .map(|pos| order[pos])
        .collect()
}

pub fn gsea<S: AsRef<str>>(
    matrix: &AbundanceMatrix,
    labels: &[S],
    pathways: &PathwayDict,
    options: &GseaOptions,
) -> Result<Vec<GseaRecord>, EnrichmentError> {
    gsea_with_progress(matrix, labels, pathways, options, &NoopProgress)
}

pub fn gsea_with_progress<S: AsRef<str>>(
    matrix: &AbundanceMatrix,
    labels: &[S],
    pathways: &PathwayDict,
    options: &GseaOptions,
    progress: &dyn ScoringProgress,
) -> Result<Vec<GseaRecord>, EnrichmentError> {
    if options.permutations == 0 {
        return Err(EnrichmentError::InvalidOption(
            "GSEA needs at least one permutation".to_string(),
        ));
    }
    let classes = ClassLabels::for_samples(labels, matrix.n_samples())?;
    classes.require_group_size(2)?;
    let kept = filter_by_coverage(pathways, matrix, options.min_entity.max(1));
    if kept.is_empty() {
        info!("GSEA has no pathways left after the coverage filter");
        return Ok(Vec::new());
    }
    let columns = pathway_columns(matrix, &kept);

    let metric = signal_to_noise(matrix, classes.codes());
    let observed = walks(&metric, &columns, options.weight);
    let es: Vec<f64> = observed.walks.iter().map(|w| max_deviation(w)).collect();

    progress.on_stage_start(ScoringStage::Permutations, options.permutations);
    let null: Vec<Vec<f64>> = (0..options.permutations)
        .into_par_iter()
        .map(|k| {
            let mut rng = StdRng::seed_from_u64(options.seed.wrapping_add(k as u64));
            let mut codes = classes.codes().to_vec();
            codes.shuffle(&mut rng);
            let scores = enrichment_scores(&signal_to_noise(matrix, &codes), &columns, options.weight);
            progress.on_item_done(ScoringStage::Permutations);
            scores
        })
        .collect();
    progress.on_stage_finish(ScoringStage::Permutations);

    let per_pathway_null: Vec<Vec<f64>> = (0..columns.len())
        .map(|j| null.iter().map(|scores| scores[j]).filter(|v| !v.is_nan()).collect())
        .collect();
    let nes: Vec<f64> = es
        .iter()
        .zip(&per_pathway_null)
        .map(|(&e, n)| e / normalizer(e, n))
        .collect();
    let null_nes: Vec<f64> = per_pathway_null
        .iter()
        .flat_map(|n| {
            let pos = normalizer(1.0, n);
            let neg = normalizer(-1.0, n);
            n.iter()
                .map(move |&v| if v >= 0.0 { v / pos } else { v / neg })
        })
        .filter(|v| v.is_finite())
        .collect();
    let observed_nes: Vec<f64> = nes.iter().copied().filter(|v| v.is_finite()).collect();

    let records: Vec<GseaRecord> = kept
        .iter()
        .enumerate()
        .map(|(j, entry)| {
            let edge = leading_edge(&observed.walks[j], &observed.order, &columns[j], es[j]);
            debug!(
                "GSEA pathway '{}': ES {:.4}, NES {:.4}, leading edge {}",
                entry.id,
                es[j],
                nes[j],
                edge.len()
            );
            GseaRecord {
                id: entry.id.clone(),
                name: entry.name.clone(),
                es: es[j],
                nes: nes[j],
                p_value: nominal_p(es[j], &per_pathway_null[j]),
                fdr: fdr(nes[j], &observed_nes, &null_nes),
                size: columns[j].len(),
                leading_edge: edge
                    .into_iter()
                    .map(|col| matrix.entity_ids()[col].clone())
                    .collect(),
            }
        })
        .collect();
    info!(
        "GSEA scored {} pathways with {} permutations ({} vs {})",
        records.len(),
        options.permutations,
        classes.classes()[0],
        classes.classes()[1]
    );
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pathways::PathwayEntry;
    use approx::assert_abs_diff_eq;
    use ndarray::Array2;

    fn fixture() -> (AbundanceMatrix, Vec<&'static str>, PathwayDict) {
        let n_entities = 12;
        let values = Array2::from_shape_fn((8, n_entities), |(i, j)| {
            let case = i < 4;
            let shift = match (case, j) {
                (true, 0..=2) => 3.0,
                (false, 3..=5) => 3.0,
                _ => 0.0,
            };
            shift + ((i * 7 + j * 3) % 5) as f64 * 0.3
        });
        let matrix = AbundanceMatrix::new(
            (0..8).map(|i| format!("s{i}")).collect(),
            (0..n_entities).map(|j| format!("e{j}")).collect(),
            values,
        )
        .unwrap();
        let labels = vec!["case", "case", "case", "case", "ctrl", "ctrl", "ctrl", "ctrl"];
        let pathways = PathwayDict::from_entries([
            PathwayEntry::new("up", None, ["e0", "e1", "e2"]),
            PathwayEntry::new("down", None, ["e3", "e4", "e5"]),
            PathwayEntry::new("absent", None, ["z1", "z2"]),
        ]);
        (matrix, labels, pathways)
    }

    #[test]
    fn signal_to_noise_uses_sigma_floor() {
        let matrix = AbundanceMatrix::new(
            (0..4).map(|i| format!("s{i}")).collect(),
            vec!["e".into()],
            Array2::from_shape_vec((4, 1), vec![2.0, 2.0, 1.0, 1.0]).unwrap(),
        )
        .unwrap();
        let snr = signal_to_noise(&matrix, &[0, 0, 1, 1]);
        // sigmas floor to 0.4 and 0.2
        assert_abs_diff_eq!(snr[0], 1.0 / 0.6, epsilon = 1e-12);
    }

    #[test]
    fn separated_sets_get_signed_scores() {
        let (matrix, labels, pathways) = fixture();
        let options = GseaOptions {
            permutations: 50,
            ..GseaOptions::default()
        };
        let records = gsea(&matrix, &labels, &pathways, &options).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "up");
        assert!(records[0].es > 0.0 && records[0].nes > 0.0);
        assert!(records[1].es < 0.0 && records[1].nes < 0.0);
        assert_eq!(records[0].size, 3);
        assert!(!records[0].leading_edge.is_empty());
        assert!(records.iter().all(|r| (0.0..=1.0).contains(&r.p_value)));
    }

    #[test]
    fn fixed_seed_is_reproducible() {
        let (matrix, labels, pathways) = fixture();
        let options = GseaOptions {
            permutations: 30,
            seed: 11,
            ..GseaOptions::default()
        };
        let a = gsea(&matrix, &labels, &pathways, &options).unwrap();
        let b = gsea(&matrix, &labels, &pathways, &options).unwrap();
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.es.to_bits(), y.es.to_bits());
            assert_eq!(x.nes.to_bits(), y.nes.to_bits());
            assert_eq!(x.p_value.to_bits(), y.p_value.to_bits());
            assert_eq!(x.fdr.to_bits(), y.fdr.to_bits());
            assert_eq!(x.leading_edge, y.leading_edge);
        }
    }

    #[test]
    fn zero_permutations_is_rejected() {
        let (matrix, labels, pathways) = fixture();
        let options = GseaOptions {
            permutations: 0,
            ..GseaOptions::default()
        };
        assert!(matches!(
            gsea(&matrix, &labels, &pathways, &options),
            Err(EnrichmentError::InvalidOption(_))
        ));
    }
}
