use crate::linalg::RightSvd;
use crate::method::{ScoringError, check_width};
use log::warn;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Leading singular direction of a pathway submatrix (samples × entities).
///
/// On the training data the transform returns the first right singular vector of
/// the entities × samples matrix. The sign of that vector is whatever the SVD
/// produced; only its magnitude is stable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlageModel {
    /// First right singular vector of the samples × entities matrix.
    pub axis: Array1<f64>,
    pub singular_value: f64,
}

impl PlageModel {
    pub fn fit(x: &Array2<f64>) -> Result<Self, ScoringError> {
        if x.nrows() == 0 || x.ncols() == 0 {
            return Err(ScoringError::EmptySubmatrix(x.dim()));
        }
        let (singular, vt) = x.right_svd()?;
        Ok(Self {
            axis: vt.row(0).to_owned(),
            singular_value: singular[0],
        })
    }

    pub fn transform(&self, x: &Array2<f64>) -> Result<Array1<f64>, ScoringError> {
        check_width(self.axis.len(), x)?;
        // s₁ bounds every entry of the training data, so it only vanishes for an all-zero pathway
        if !(self.singular_value.is_finite() && self.singular_value > 0.0) {
            warn!("Leading singular value is zero; PLAGE scores are undefined");
            return Ok(Array1::from_elem(x.nrows(), f64::NAN));
        }
        Ok(x.dot(&self.axis) / self.singular_value)
    }
}
