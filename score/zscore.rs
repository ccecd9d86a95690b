use crate::method::{ScoringError, check_width};
use log::warn;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Per-entity location and scale learned from the training samples.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZScoreModel {
    pub mean: Array1<f64>,
    /// Population standard deviation (ddof = 0).
    pub std: Array1<f64>,
}

impl ZScoreModel {
    pub fn fit(x: &Array2<f64>) -> Result<Self, ScoringError> {
        let mean = x.mean_axis(Axis(0)).ok_or(ScoringError::TooFewSamples {
            method: "z-score",
            needed: 1,
            found: 0,
        })?;
        let std = x.std_axis(Axis(0), 0.0);
        let flat = std.iter().filter(|&&s| s == 0.0).count();
        if flat > 0 {
            warn!("{flat} entities have zero variance; their z-scores are undefined");
        }
        Ok(Self { mean, std })
    }

    /// Sum of entity z-scores per sample, divided by √(entity count).
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array1<f64>, ScoringError> {
        check_width(self.mean.len(), x)?;
        let z = (x - &self.mean) / &self.std;
        let scale = (self.mean.len() as f64).sqrt();
        Ok(z.sum_axis(Axis(1)) / scale)
    }
}
