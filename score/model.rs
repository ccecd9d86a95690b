// ========================================================================================
//                       Fit/transform models over a pathway set
// ========================================================================================

use crate::method::{PathwayModel, ScoringError, ScoringMethod, ScoringOptions};
use crate::pathways::{PathwayDict, filter_by_coverage};
use crate::progress::{NoopProgress, ScoringProgress, ScoringStage};
use crate::types::{AbundanceMatrix, MatrixError, ScoreMatrix, assemble};
use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("The model has not been fitted; call fit before transform.")]
    NotFitted,
    #[error("Pathway '{pathway}' was fitted on entity '{entity}', which the data does not contain.")]
    MissingEntity { pathway: String, entity: String },
    #[error("Scoring pathway '{pathway}' failed: {source}")]
    Scoring {
        pathway: String,
        #[source]
        source: ScoringError,
    },
    #[error("Matrix error: {0}")]
    Matrix(#[from] MatrixError),
    #[error("Model file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Model (de)serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Seed for the pathway at `position` in the filtered set.
pub fn pathway_seed(base: u64, position: usize) -> u64 {
    base.wrapping_add((position as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

/// Pathways below `min_entity` overlap are dropped; pathways with no overlap at
/// all are always dropped since they would give an empty submatrix.
pub(crate) fn coverage_filtered(
    matrix: &AbundanceMatrix,
    pathways: &PathwayDict,
    min_entity: usize,
) -> PathwayDict {
    filter_by_coverage(pathways, matrix, min_entity.max(1))
}

/// One pathway's fitted state, tied to the entity columns it was fitted on.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FittedPathway {
    pub id: String,
    pub entities: Vec<String>,
    pub model: PathwayModel,
}

/// Unfitted configuration: which engine, with which options.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SspaModel {
    pub method: ScoringMethod,
    pub options: ScoringOptions,
}

impl SspaModel {
    pub fn new(method: ScoringMethod) -> Self {
        Self {
            method,
            options: ScoringOptions::default(),
        }
    }

    pub fn with_options(method: ScoringMethod, options: ScoringOptions) -> Self {
        Self { method, options }
    }

    pub fn fit(
        &self,
        matrix: &AbundanceMatrix,
        pathways: &PathwayDict,
    ) -> Result<FittedSspa, ModelError> {
        self.fit_with_progress(matrix, pathways, &NoopProgress)
    }

    /// Fits one sub-model per pathway passing the coverage filter. Pathways are
    /// fitted in parallel; the result keeps the filtered-set order.
    pub fn fit_with_progress(
        &self,
        matrix: &AbundanceMatrix,
        pathways: &PathwayDict,
        progress: &dyn ScoringProgress,
    ) -> Result<FittedSspa, ModelError> {
        let kept = coverage_filtered(matrix, pathways, self.options.min_entity);
        info!(
            "Fitting {} models for {} pathways on {} samples",
            self.method,
            kept.len(),
            matrix.n_samples()
        );

        progress.on_stage_start(ScoringStage::Fit, kept.len());
        let fitted = kept
            .entries()
            .par_iter()
            .enumerate()
            .map(|(position, entry)| {
                let sub = matrix.subset(&entry.entities);
                debug!(
                    "Fitting pathway '{}' on {} entities",
                    entry.id,
                    sub.n_entities()
                );
                let seed = pathway_seed(self.options.seed, position);
                let model = PathwayModel::fit(self.method, &sub.values, &self.options, seed)
                    .map_err(|source| ModelError::Scoring {
                        pathway: entry.id.clone(),
                        source,
                    })?;
                progress.on_item_done(ScoringStage::Fit);
                Ok(FittedPathway {
                    id: entry.id.clone(),
                    entities: sub.entity_ids,
                    model,
                })
            })
            .collect::<Result<Vec<_>, ModelError>>()?;
        progress.on_stage_finish(ScoringStage::Fit);

        Ok(FittedSspa {
            method: self.method,
            options: self.options.clone(),
            pathways: fitted,
        })
    }

    /// `fit` followed by `transform` on the same matrix.
    pub fn fit_transform(
        &self,
        matrix: &AbundanceMatrix,
        pathways: &PathwayDict,
    ) -> Result<(FittedSspa, ScoreMatrix), ModelError> {
        let fitted = self.fit(matrix, pathways)?;
        let scores = fitted.transform(matrix)?;
        Ok((fitted, scores))
    }
}

/// Immutable fitted state. Serialises to JSON.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FittedSspa {
    method: ScoringMethod,
    options: ScoringOptions,
    pathways: Vec<FittedPathway>,
}

impl FittedSspa {
    pub fn method(&self) -> ScoringMethod {
        self.method
    }

    pub fn options(&self) -> &ScoringOptions {
        &self.options
    }

    pub fn pathways(&self) -> &[FittedPathway] {
        &self.pathways
    }

    pub fn pathway_ids(&self) -> Vec<String> {
        self.pathways.iter().map(|p| p.id.clone()).collect()
    }

    pub fn n_pathways(&self) -> usize {
        self.pathways.len()
    }

    pub fn transform(&self, matrix: &AbundanceMatrix) -> Result<ScoreMatrix, ModelError> {
        self.transform_with_progress(matrix, &NoopProgress)
    }

    /// Scores every sample of `matrix` with the stored per-pathway models.
    /// The matrix must contain every entity a pathway was fitted on.
    pub fn transform_with_progress(
        &self,
        matrix: &AbundanceMatrix,
        progress: &dyn ScoringProgress,
    ) -> Result<ScoreMatrix, ModelError> {
        progress.on_stage_start(ScoringStage::Transform, self.pathways.len());
        let vectors = self
            .pathways
            .par_iter()
            .map(|pathway| {
                let sub = matrix.select(&pathway.entities).map_err(|err| match err {
                    MatrixError::MissingEntity(entity) => ModelError::MissingEntity {
                        pathway: pathway.id.clone(),
                        entity,
                    },
                    other => ModelError::Matrix(other),
                })?;
                let scores = pathway
                    .model
                    .transform(&sub.values)
                    .map_err(|source| ModelError::Scoring {
                        pathway: pathway.id.clone(),
                        source,
                    })?;
                progress.on_item_done(ScoringStage::Transform);
                Ok(scores)
            })
            .collect::<Result<Vec<_>, ModelError>>()?;
        progress.on_stage_finish(ScoringStage::Transform);

        let scores = assemble(vectors, self.pathway_ids(), matrix.sample_ids().to_vec())?;
        info!(
            "Scored {} samples across {} pathways with {}",
            scores.shape().0,
            scores.shape().1,
            self.method
        );
        Ok(scores)
    }

    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let reader = BufReader::new(File::open(path)?);
        let model = serde_json::from_reader(reader)?;
        Ok(model)
    }
}

/// Unfit/fitted state machine around an `SspaModel`.
#[derive(Clone, Debug, Default)]
pub struct SspaEstimator {
    config: SspaModel,
    fitted: Option<FittedSspa>,
}

impl SspaEstimator {
    pub fn new(config: SspaModel) -> Self {
        Self {
            config,
            fitted: None,
        }
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    pub fn fitted(&self) -> Option<&FittedSspa> {
        self.fitted.as_ref()
    }

    /// Replaces any previous fit.
    pub fn fit(
        &mut self,
        matrix: &AbundanceMatrix,
        pathways: &PathwayDict,
    ) -> Result<&FittedSspa, ModelError> {
        let fitted = self.config.fit(matrix, pathways)?;
        Ok(self.fitted.insert(fitted))
    }

    pub fn transform(&self, matrix: &AbundanceMatrix) -> Result<ScoreMatrix, ModelError> {
        self.fitted
            .as_ref()
            .ok_or(ModelError::NotFitted)?
            .transform(matrix)
    }

    pub fn fit_transform(
        &mut self,
        matrix: &AbundanceMatrix,
        pathways: &PathwayDict,
    ) -> Result<ScoreMatrix, ModelError> {
        self.fit(matrix, pathways)?.transform(matrix)
    }
}
