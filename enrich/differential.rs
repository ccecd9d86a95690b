use super::EnrichmentError;
use super::correction::benjamini_hochberg;
use crate::rank::average_ranks;
use crate::types::AbundanceMatrix;
use ahash::AHashMap;
use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal, StudentsT};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DifferentialTest {
    /// Student's two-sample t-test with pooled variance.
    #[default]
    TTest,
    /// Mann-Whitney U, normal approximation with tie and continuity correction.
    MannWhitney,
}

impl DifferentialTest {
    pub fn name(self) -> &'static str {
        match self {
            Self::TTest => "ttest",
            Self::MannWhitney => "mwu",
        }
    }

    fn min_group_size(self) -> usize {
        match self {
            Self::TTest => 2,
            Self::MannWhitney => 1,
        }
    }
}

impl fmt::Display for DifferentialTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DifferentialTest {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ttest" | "t-test" => Ok(Self::TTest),
            "mwu" | "mann-whitney" => Ok(Self::MannWhitney),
            other => Err(format!("unknown test '{other}' (expected ttest or mwu)")),
        }
    }
}

/// Distinct labels in order of first appearance and the code of every label.
pub fn factorize<S: AsRef<str>>(labels: &[S]) -> (Vec<String>, Vec<usize>) {
    let mut seen: AHashMap<&str, usize> = AHashMap::new();
    let mut classes = Vec::new();
    let codes = labels
        .iter()
        .map(|label| {
            let label = label.as_ref();
            *seen.entry(label).or_insert_with(|| {
                classes.push(label.to_string());
                classes.len() - 1
            })
        })
        .collect();
    (classes, codes)
}

/// Two-class sample labelling. The first class seen is class 0.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassLabels {
    classes: [String; 2],
    codes: Vec<usize>,
}

impl ClassLabels {
    pub fn new<S: AsRef<str>>(labels: &[S]) -> Result<Self, EnrichmentError> {
        let (classes, codes) = factorize(labels);
        match <[String; 2]>::try_from(classes) {
            Ok(classes) => Ok(Self { classes, codes }),
            Err(classes) => Err(EnrichmentError::ClassCardinality {
                found: classes.len(),
            }),
        }
    }

    /// Labels checked against the number of rows they describe.
    pub fn for_samples<S: AsRef<str>>(labels: &[S], n_samples: usize) -> Result<Self, EnrichmentError> {
        if labels.len() != n_samples {
            return Err(EnrichmentError::LabelLength {
                labels: labels.len(),
                samples: n_samples,
            });
        }
        Self::new(labels)
    }

    pub fn classes(&self) -> &[String; 2] {
        &self.classes
    }

    pub fn codes(&self) -> &[usize] {
        &self.codes
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Row indices of class `class` (0 or 1).
    pub fn group(&self, class: usize) -> Vec<usize> {
        self.codes
            .iter()
            .enumerate()
            .filter(|&(_, &code)| code == class)
            .map(|(i, _)| i)
            .collect()
    }

    pub(crate) fn require_group_size(&self, needed: usize) -> Result<(), EnrichmentError> {
        for (class, name) in self.classes.iter().enumerate() {
            let found = self.group(class).len();
            if found < needed {
                return Err(EnrichmentError::GroupTooSmall {
                    class: name.clone(),
                    needed,
                    found,
                });
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DifferentialRecord {
    pub entity: String,
    pub p_value: f64,
    pub p_adjust: f64,
}

fn mean_var(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, var)
}

/// Two-sided pooled-variance t-test. NaN when both groups are constant.
pub fn student_t_test(a: &[f64], b: &[f64]) -> f64 {
    let (n1, n2) = (a.len() as f64, b.len() as f64);
    let df = n1 + n2 - 2.0;
    let (m1, v1) = mean_var(a);
    let (m2, v2) = mean_var(b);
    let pooled = ((n1 - 1.0) * v1 + (n2 - 1.0) * v2) / df;
    let se = (pooled * (1.0 / n1 + 1.0 / n2)).sqrt();
    if se.is_nan() || se <= 0.0 || df <= 0.0 {
        return f64::NAN;
    }
    let t = (m1 - m2) / se;
    match StudentsT::new(0.0, 1.0, df) {
        Ok(dist) => (2.0 * dist.sf(t.abs())).min(1.0),
        Err(_) => f64::NAN,
    }
}

const EXACT_MWU_MAX_GROUP: usize = 8;

/// P(U >= u) under the null for groups of size `m` and `n`, counted exactly.
///
/// Walks the pooled ranks in order; placing the `k`-th member of the first
/// group at position `t` adds `t - k` pairs won against the second group.
fn exact_u_sf(u: usize, m: usize, n: usize) -> f64 {
    let max_u = m * n;
    if u > max_u {
        return 0.0;
    }
    // counts[k][w]: ways to place k members of the first group so far with w wins
    let mut counts = vec![vec![0.0_f64; max_u + 1]; m + 1];
    counts[0][0] = 1.0;
    for t in 0..m + n {
        for k in (0..m.min(t + 1)).rev() {
            let gain = t - k;
            if gain > n {
                continue;
            }
            for w in (0..=max_u - gain).rev() {
                let ways = counts[k][w];
                if ways > 0.0 {
                    counts[k + 1][w + gain] += ways;
                }
            }
        }
    }
    let total: f64 = counts[m].iter().sum();
    counts[m][u..].iter().sum::<f64>() / total
}

/// Two-sided Mann-Whitney U p-value.
///
/// Uses the exact null distribution of U when either group has at most eight
/// samples and there are no ties, otherwise the tie-corrected normal
/// approximation with continuity correction.
pub fn mann_whitney_u(a: &[f64], b: &[f64]) -> f64 {
    let (n1, n2) = (a.len() as f64, b.len() as f64);
    let n = n1 + n2;
    let combined: Vec<f64> = a.iter().chain(b).copied().collect();
    let ranks = average_ranks(&combined);
    let r1: f64 = ranks[..a.len()].iter().sum();
    let u1 = r1 - n1 * (n1 + 1.0) / 2.0;
    let u = u1.max(n1 * n2 - u1);

    let mut sorted = ranks.clone();
    sorted.sort_by(f64::total_cmp);
    let mut tie_term = 0.0;
    for run in sorted.chunk_by(|x, y| x == y) {
        let t = run.len() as f64;
        tie_term += t * t * t - t;
    }

    let small = a.len().min(b.len()) <= EXACT_MWU_MAX_GROUP;
    if small && tie_term == 0.0 && !a.is_empty() && !b.is_empty() {
        let tail = exact_u_sf(u.round() as usize, a.len(), b.len());
        return (2.0 * tail).min(1.0);
    }

    let sigma = (n1 * n2 / 12.0 * ((n + 1.0) - tie_term / (n * (n - 1.0)))).sqrt();
    if sigma.is_nan() || sigma <= 0.0 {
        return f64::NAN;
    }
    let z = (u - n1 * n2 / 2.0 - 0.5) / sigma;
    match Normal::new(0.0, 1.0) {
        Ok(dist) => (2.0 * dist.sf(z)).min(1.0),
        Err(_) => f64::NAN,
    }
}

/// Per-entity two-class test with Benjamini-Hochberg adjustment across all
/// entities. Records follow the matrix column order.
pub fn differential_test<S: AsRef<str>>(
    matrix: &AbundanceMatrix,
    labels: &[S],
    test: DifferentialTest,
) -> Result<Vec<DifferentialRecord>, EnrichmentError> {
    let classes = ClassLabels::for_samples(labels, matrix.n_samples())?;
    classes.require_group_size(test.min_group_size())?;
    let (first, second) = (classes.group(0), classes.group(1));
    debug!(
        "Differential {test}: '{}' ({} samples) vs '{}' ({} samples)",
        classes.classes()[0],
        first.len(),
        classes.classes()[1],
        second.len()
    );

    let values = matrix.values();
    let p_values: Vec<f64> = (0..matrix.n_entities())
        .into_par_iter()
        .map(|j| {
            let column = values.column(j);
            let a: Vec<f64> = first.iter().map(|&i| column[i]).collect();
            let b: Vec<f64> = second.iter().map(|&i| column[i]).collect();
            match test {
                DifferentialTest::TTest => student_t_test(&a, &b),
                DifferentialTest::MannWhitney => mann_whitney_u(&a, &b),
            }
        })
        .collect();
    let adjusted = benjamini_hochberg(&p_values);

    info!("Tested {} entities with {test}", matrix.n_entities());
    Ok(matrix
        .entity_ids()
        .iter()
        .zip(p_values.into_iter().zip(adjusted))
        .map(|(entity, (p_value, p_adjust))| DifferentialRecord {
            entity: entity.clone(),
            p_value,
            p_adjust,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn factorize_keeps_first_appearance() {
        let (classes, codes) = factorize(&["CTRL", "CASE", "CASE", "CTRL", "CTRL"]);
        assert_eq!(classes, vec!["CTRL", "CASE"]);
        assert_eq!(codes, vec![0, 1, 1, 0, 0]);
    }

    #[test]
    fn more_than_two_classes_is_rejected() {
        let err = ClassLabels::new(&["a", "b", "c"]).unwrap_err();
        assert!(matches!(err, EnrichmentError::ClassCardinality { found: 3 }));
        let err = ClassLabels::new(&["a", "a"]).unwrap_err();
        assert!(matches!(err, EnrichmentError::ClassCardinality { found: 1 }));
    }

    #[test]
    fn t_test_matches_reference() {
        let p = student_t_test(&[1.0, 2.0, 3.0, 4.0, 5.0], &[2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_abs_diff_eq!(p, 0.346_593_507_087_334_2, epsilon = 1e-9);
    }

    #[test]
    fn constant_groups_give_nan() {
        assert!(student_t_test(&[1.0, 1.0], &[1.0, 1.0]).is_nan());
    }

    #[test]
    fn small_untied_groups_use_exact_distribution() {
        // one arrangement in C(6,3) = 20 is this extreme, doubled for two sides
        let p = mann_whitney_u(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]);
        assert_abs_diff_eq!(p, 0.1, epsilon = 1e-12);
        let p = mann_whitney_u(&[4.0, 5.0, 6.0], &[1.0, 2.0, 3.0]);
        assert_abs_diff_eq!(p, 0.1, epsilon = 1e-12);
    }

    #[test]
    fn exact_tail_matches_enumeration() {
        // U for m = 2, n = 2 takes 0,1,2,2,3,4 over the six arrangements
        assert_abs_diff_eq!(exact_u_sf(0, 2, 2), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(exact_u_sf(2, 2, 2), 4.0 / 6.0, epsilon = 1e-12);
        assert_abs_diff_eq!(exact_u_sf(4, 2, 2), 1.0 / 6.0, epsilon = 1e-12);
        assert_abs_diff_eq!(exact_u_sf(5, 2, 2), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn ties_fall_back_to_normal_approximation() {
        let p = mann_whitney_u(&[1.0, 2.0, 2.0], &[4.0, 5.0, 6.0]);
        // U = 9, tie term 6: sigma = sqrt(9/12 * (7 - 6/30)), continuity 0.5
        let sigma = (9.0_f64 / 12.0 * (7.0 - 6.0 / 30.0)).sqrt();
        let z = (9.0 - 4.5 - 0.5) / sigma;
        let expected = 2.0 * Normal::new(0.0, 1.0).unwrap().sf(z);
        assert_abs_diff_eq!(p, expected, epsilon = 1e-12);
    }

    #[test]
    fn large_groups_use_normal_approximation() {
        let a: Vec<f64> = (0..10).map(f64::from).collect();
        let b: Vec<f64> = (10..20).map(f64::from).collect();
        let sigma = (100.0_f64 / 12.0 * 21.0).sqrt();
        let z = (100.0 - 50.0 - 0.5) / sigma;
        let expected = 2.0 * Normal::new(0.0, 1.0).unwrap().sf(z);
        assert_abs_diff_eq!(mann_whitney_u(&a, &b), expected, epsilon = 1e-12);
    }

    #[test]
    fn table_follows_column_order() {
        let matrix = AbundanceMatrix::new(
            ["s1", "s2", "s3", "s4"].iter().map(|s| s.to_string()).collect(),
            vec!["up".into(), "flat".into()],
            array![[10.0, 1.0], [11.0, 2.0], [1.0, 1.5], [2.0, 1.4]],
        )
        .unwrap();
        let records =
            differential_test(&matrix, &["A", "A", "B", "B"], DifferentialTest::TTest).unwrap();
        assert_eq!(records[0].entity, "up");
        assert!(records[0].p_value < records[1].p_value);
        assert!(records.iter().all(|r| r.p_adjust >= r.p_value));
    }

    #[test]
    fn label_length_is_checked() {
        let matrix =
            AbundanceMatrix::new(vec!["s1".into()], vec!["e".into()], array![[1.0]]).unwrap();
        let err = differential_test(&matrix, &["A", "B"], DifferentialTest::TTest).unwrap_err();
        assert!(matches!(err, EnrichmentError::LabelLength { labels: 2, samples: 1 }));
    }
}
