use crate::method::{ScoringError, check_width};
use log::{debug, warn};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

const N_CLUSTERS: usize = 2;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KMeansOptions {
    pub n_init: usize,
    pub max_iter: usize,
    /// Relative to the mean per-entity variance of the data.
    pub tolerance: f64,
}

impl Default for KMeansOptions {
    fn default() -> Self {
        Self {
            n_init: 10,
            max_iter: 300,
            tolerance: 1e-4,
        }
    }
}

/// Two-cluster k-means fitted on one pathway submatrix.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KMeansModel {
    /// One row per cluster.
    pub centroids: Array2<f64>,
    pub inertia: f64,
}

fn sq_euclidean(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn nearest(point: ArrayView1<'_, f64>, centroids: &Array2<f64>) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (c, centroid) in centroids.rows().into_iter().enumerate() {
        let d = sq_euclidean(point, centroid);
        if d < best.1 {
            best = (c, d);
        }
    }
    best
}

/// k-means++ seeding: first centre uniform, the rest proportional to squared distance.
fn plus_plus_init(x: &Array2<f64>, rng: &mut StdRng) -> Array2<f64> {
    let n = x.nrows();
    let mut centroids = Array2::zeros((N_CLUSTERS, x.ncols()));
    centroids.row_mut(0).assign(&x.row(rng.gen_range(0..n)));

    for c in 1..N_CLUSTERS {
        let dists: Vec<f64> = x
            .rows()
            .into_iter()
            .map(|row| {
                (0..c)
                    .map(|prev| sq_euclidean(row, centroids.row(prev)))
                    .fold(f64::INFINITY, f64::min)
            })
            .collect();
        let total: f64 = dists.iter().sum();
        let chosen = if total > 0.0 {
            let threshold = rng.gen_range(0.0..1.0) * total;
            let mut cumulative = 0.0;
            dists
                .iter()
                .position(|&d| {
                    cumulative += d;
                    cumulative >= threshold
                })
                .unwrap_or(n - 1)
        } else {
            c % n
        };
        centroids.row_mut(c).assign(&x.row(chosen));
    }
    centroids
}

fn lloyd(x: &Array2<f64>, mut centroids: Array2<f64>, max_iter: usize, tol: f64) -> KMeansModel {
    let n = x.nrows();
    let mut labels = vec![0usize; n];
    for iter in 0..max_iter {
        for (i, row) in x.rows().into_iter().enumerate() {
            labels[i] = nearest(row, &centroids).0;
        }

        let mut updated = Array2::<f64>::zeros(centroids.dim());
        let mut counts = [0usize; N_CLUSTERS];
        for (i, row) in x.rows().into_iter().enumerate() {
            counts[labels[i]] += 1;
            let mut target = updated.row_mut(labels[i]);
            target += &row;
        }
        for c in 0..N_CLUSTERS {
            if counts[c] > 0 {
                let count = counts[c] as f64;
                updated.row_mut(c).mapv_inplace(|v| v / count);
            } else {
                // empty cluster takes the point farthest from its current centre
                let far = x
                    .rows()
                    .into_iter()
                    .enumerate()
                    .map(|(i, row)| (i, sq_euclidean(row, centroids.row(labels[i]))))
                    .max_by(|a, b| a.1.total_cmp(&b.1))
                    .map_or(0, |(i, _)| i);
                updated.row_mut(c).assign(&x.row(far));
            }
        }

        let shift: f64 = (0..N_CLUSTERS)
            .map(|c| sq_euclidean(centroids.row(c), updated.row(c)))
            .sum();
        centroids = updated;
        if shift <= tol {
            debug!("k-means converged after {} iterations", iter + 1);
            break;
        }
    }

    let inertia = x.rows().into_iter().map(|row| nearest(row, &centroids).1).sum();
    KMeansModel { centroids, inertia }
}

impl KMeansModel {
    /// Best of `n_init` seeded k-means++ runs by inertia.
    pub fn fit(x: &Array2<f64>, options: &KMeansOptions, seed: u64) -> Result<Self, ScoringError> {
        if x.nrows() < N_CLUSTERS {
            return Err(ScoringError::TooFewSamples {
                method: "k-means",
                needed: N_CLUSTERS,
                found: x.nrows(),
            });
        }
        if x.ncols() == 0 {
            return Err(ScoringError::EmptySubmatrix(x.dim()));
        }
        if options.n_init == 0 || options.max_iter == 0 {
            return Err(ScoringError::InvalidOption(
                "k-means needs n_init and max_iter of at least 1".to_string(),
            ));
        }

        let mean_variance = x.var_axis(Axis(0), 0.0).mean().unwrap_or(0.0);
        let tol = options.tolerance * mean_variance;

        let mut best: Option<KMeansModel> = None;
        for init in 0..options.n_init {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(init as u64));
            let start = plus_plus_init(x, &mut rng);
            let run = lloyd(x, start, options.max_iter, tol);
            if best.as_ref().is_none_or(|b| run.inertia < b.inertia) {
                best = Some(run);
            }
        }
        best.ok_or_else(|| ScoringError::InvalidOption("k-means produced no run".to_string()))
    }

    /// Euclidean distance from every sample to centroid 0.
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array1<f64>, ScoringError> {
        check_width(self.centroids.ncols(), x)?;
        let c0 = self.centroids.row(0);
        Ok(x.rows()
            .into_iter()
            .map(|row| sq_euclidean(row, c0).sqrt())
            .collect())
    }

    /// Projection of every sample onto the unit vector from centroid 1 to centroid 0.
    pub fn transform_projected(&self, x: &Array2<f64>) -> Result<Array1<f64>, ScoringError> {
        check_width(self.centroids.ncols(), x)?;
        let direction = &self.centroids.row(0) - &self.centroids.row(1);
        let norm = direction.dot(&direction).sqrt();
        if norm == 0.0 {
            warn!("k-means centroids coincide; projected cluster scores are undefined");
            return Ok(Array1::from_elem(x.nrows(), f64::NAN));
        }
        Ok(x.dot(&(direction / norm)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn two_blobs() -> Array2<f64> {
        array![
            [0.0, 0.0],
            [0.2, 0.1],
            [0.1, 0.3],
            [5.0, 5.0],
            [5.2, 4.9],
            [4.9, 5.1]
        ]
    }

    #[test]
    fn separates_two_blobs() {
        let model = KMeansModel::fit(&two_blobs(), &KMeansOptions::default(), 7).unwrap();
        let mut centres: Vec<f64> = model.centroids.column(0).to_vec();
        centres.sort_by(f64::total_cmp);
        assert_abs_diff_eq!(centres[0], 0.1, epsilon = 1e-9);
        assert_abs_diff_eq!(centres[1], 5.033333333333333, epsilon = 1e-9);
    }

    #[test]
    fn distance_scores_split_by_cluster() {
        let x = two_blobs();
        let model = KMeansModel::fit(&x, &KMeansOptions::default(), 3).unwrap();
        let scores = model.transform(&x).unwrap();
        let near: Vec<bool> = scores.iter().map(|d| *d < 1.0).collect();
        assert_eq!(near[0], near[1]);
        assert_eq!(near[3], near[4]);
        assert_ne!(near[0], near[3]);
    }

    #[test]
    fn projection_runs_along_centroid_axis() {
        let model = KMeansModel {
            centroids: array![[2.0, 0.0], [0.0, 0.0]],
            inertia: 0.0,
        };
        let scores = model
            .transform_projected(&array![[1.0, 7.0], [-3.0, 2.0]])
            .unwrap();
        assert_abs_diff_eq!(scores[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(scores[1], -3.0, epsilon = 1e-12);
    }

    #[test]
    fn coincident_centroids_give_nan_projection() {
        let model = KMeansModel {
            centroids: array![[1.0, 1.0], [1.0, 1.0]],
            inertia: 0.0,
        };
        let scores = model.transform_projected(&array![[0.0, 0.0]]).unwrap();
        assert!(scores[0].is_nan());
    }

    #[test]
    fn same_seed_same_model() {
        let x = two_blobs();
        let a = KMeansModel::fit(&x, &KMeansOptions::default(), 11).unwrap();
        let b = KMeansModel::fit(&x, &KMeansOptions::default(), 11).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn single_sample_is_rejected() {
        let err = KMeansModel::fit(&array![[1.0, 2.0]], &KMeansOptions::default(), 0).unwrap_err();
        assert!(matches!(err, ScoringError::TooFewSamples { needed: 2, found: 1, .. }));
    }
}
