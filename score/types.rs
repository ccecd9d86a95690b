// ========================================================================================
//                             High-Level Data Contracts
// ========================================================================================

// Matrices shared by the subsetter, the scoring engines and the result assembler.

use crate::pathways::EntityUniverse;
use ahash::{AHashMap, AHashSet};
use log::debug;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MatrixError {
    #[error("Sample ID '{0}' appears more than once.")]
    DuplicateSample(String),
    #[error("Entity ID '{0}' appears more than once.")]
    DuplicateEntity(String),
    #[error(
        "Matrix has shape {found:?} but {expected:?} was implied by the sample and entity IDs."
    )]
    Shape {
        expected: (usize, usize),
        found: (usize, usize),
    },
    #[error("Score vector for pathway '{pathway}' has length {found}, expected {expected}.")]
    VectorLength {
        pathway: String,
        expected: usize,
        found: usize,
    },
    #[error("Got {vectors} score vectors for {ids} pathway IDs.")]
    PathwayCount { vectors: usize, ids: usize },
    #[error("Entity '{0}' is not a column of the abundance matrix.")]
    MissingEntity(String),
}

fn index_unique(
    ids: &[String],
    on_duplicate: fn(String) -> MatrixError,
) -> Result<AHashMap<String, usize>, MatrixError> {
    let mut index = AHashMap::with_capacity(ids.len());
    for (pos, id) in ids.iter().enumerate() {
        if index.insert(id.clone(), pos).is_some() {
            return Err(on_duplicate(id.clone()));
        }
    }
    Ok(index)
}

/// Samples × entities abundance table. Never mutated once built.
#[derive(Clone, Debug)]
pub struct AbundanceMatrix {
    sample_ids: Vec<String>,
    entity_ids: Vec<String>,
    values: Array2<f64>,
    entity_index: AHashMap<String, usize>,
}

impl AbundanceMatrix {
    pub fn new(
        sample_ids: Vec<String>,
        entity_ids: Vec<String>,
        values: Array2<f64>,
    ) -> Result<Self, MatrixError> {
        let expected = (sample_ids.len(), entity_ids.len());
        if values.dim() != expected {
            return Err(MatrixError::Shape {
                expected,
                found: values.dim(),
            });
        }
        index_unique(&sample_ids, MatrixError::DuplicateSample)?;
        let entity_index = index_unique(&entity_ids, MatrixError::DuplicateEntity)?;
        Ok(Self {
            sample_ids,
            entity_ids,
            values,
            entity_index,
        })
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    pub fn entity_ids(&self) -> &[String] {
        &self.entity_ids
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    pub fn n_entities(&self) -> usize {
        self.entity_ids.len()
    }

    pub fn entity_index(&self, entity: &str) -> Option<usize> {
        self.entity_index.get(entity).copied()
    }

    pub fn entity_column(&self, entity: &str) -> Option<ArrayView1<'_, f64>> {
        self.entity_index(entity)
            .map(|col| self.values.column(col))
    }

    /// Columns restricted to `entities ∩ columns`, in matrix column order.
    /// Entities the matrix does not measure are ignored.
    pub fn subset(&self, entities: &BTreeSet<String>) -> SubMatrix {
        let cols: Vec<usize> = (0..self.entity_ids.len())
            .filter(|&c| entities.contains(&self.entity_ids[c]))
            .collect();
        self.take_columns(&cols)
    }

    /// Columns in exactly the order given. Every entity must be present.
    pub fn select(&self, entities: &[String]) -> Result<SubMatrix, MatrixError> {
        let cols = entities
            .iter()
            .map(|e| {
                self.entity_index(e)
                    .ok_or_else(|| MatrixError::MissingEntity(e.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.take_columns(&cols))
    }

    fn take_columns(&self, cols: &[usize]) -> SubMatrix {
        SubMatrix {
            entity_ids: cols.iter().map(|&c| self.entity_ids[c].clone()).collect(),
            values: self.values.select(Axis(1), cols),
        }
    }

    /// Keeps only columns listed in `mapping` and renames them to their target.
    /// When two columns map to the same target, the first one wins.
    pub fn rename_entities(&self, mapping: &AHashMap<String, String>) -> Result<Self, MatrixError> {
        let mut used: AHashSet<&str> = AHashSet::new();
        let mut cols = Vec::new();
        let mut renamed = Vec::new();
        for (col, entity) in self.entity_ids.iter().enumerate() {
            let Some(target) = mapping.get(entity) else {
                continue;
            };
            if !used.insert(target.as_str()) {
                debug!("Dropping column '{entity}': '{target}' is already mapped");
                continue;
            }
            cols.push(col);
            renamed.push(target.clone());
        }
        Self::new(
            self.sample_ids.clone(),
            renamed,
            self.values.select(Axis(1), &cols),
        )
    }

    /// Rows at the given positions, in the order given.
    pub fn select_samples(&self, rows: &[usize]) -> Result<Self, MatrixError> {
        Self::new(
            rows.iter().map(|&r| self.sample_ids[r].clone()).collect(),
            self.entity_ids.clone(),
            self.values.select(Axis(0), rows),
        )
    }
}

impl EntityUniverse for AbundanceMatrix {
    fn contains_entity(&self, entity: &str) -> bool {
        self.entity_index.contains_key(entity)
    }
}

/// One pathway's slice of an abundance matrix; rows keep the parent's sample order.
#[derive(Clone, Debug)]
pub struct SubMatrix {
    pub entity_ids: Vec<String>,
    pub values: Array2<f64>,
}

impl SubMatrix {
    pub fn n_samples(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_entities(&self) -> usize {
        self.values.ncols()
    }
}

/// Samples × pathways score table.
#[derive(Clone, Debug, PartialEq)]
pub struct ScoreMatrix {
    sample_ids: Vec<String>,
    pathway_ids: Vec<String>,
    values: Array2<f64>,
}

impl ScoreMatrix {
    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    pub fn pathway_ids(&self) -> &[String] {
        &self.pathway_ids
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn shape(&self) -> (usize, usize) {
        self.values.dim()
    }

    pub fn column(&self, pathway_id: &str) -> Option<ArrayView1<'_, f64>> {
        self.pathway_ids
            .iter()
            .position(|p| p == pathway_id)
            .map(|c| self.values.column(c))
    }

    pub fn row(&self, sample_id: &str) -> Option<ArrayView1<'_, f64>> {
        self.sample_ids
            .iter()
            .position(|s| s == sample_id)
            .map(|r| self.values.row(r))
    }
}

/// Stacks per-pathway score vectors into a samples × pathways matrix.
///
/// Column `j` is `vectors[j]` labelled `pathway_ids[j]`; rows follow `sample_ids`.
pub fn assemble(
    vectors: Vec<Array1<f64>>,
    pathway_ids: Vec<String>,
    sample_ids: Vec<String>,
) -> Result<ScoreMatrix, MatrixError> {
    if vectors.len() != pathway_ids.len() {
        return Err(MatrixError::PathwayCount {
            vectors: vectors.len(),
            ids: pathway_ids.len(),
        });
    }
    let n = sample_ids.len();
    let mut values = Array2::<f64>::zeros((n, vectors.len()));
    for (col, (vector, id)) in vectors.iter().zip(&pathway_ids).enumerate() {
        if vector.len() != n {
            return Err(MatrixError::VectorLength {
                pathway: id.clone(),
                expected: n,
                found: vector.len(),
            });
        }
        values.column_mut(col).assign(vector);
    }
    Ok(ScoreMatrix {
        sample_ids,
        pathway_ids,
        values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn matrix() -> AbundanceMatrix {
        AbundanceMatrix::new(
            ids(&["s1", "s2", "s3"]),
            ids(&["a", "b", "c"]),
            array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]],
        )
        .unwrap()
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let err = AbundanceMatrix::new(ids(&["s1", "s1"]), ids(&["a"]), Array2::zeros((2, 1)))
            .unwrap_err();
        assert!(matches!(err, MatrixError::DuplicateSample(s) if s == "s1"));
        let err = AbundanceMatrix::new(ids(&["s1"]), ids(&["a", "a"]), Array2::zeros((1, 2)))
            .unwrap_err();
        assert!(matches!(err, MatrixError::DuplicateEntity(_)));
    }

    #[test]
    fn shape_must_match_ids() {
        let err = AbundanceMatrix::new(ids(&["s1"]), ids(&["a"]), Array2::zeros((2, 1)))
            .unwrap_err();
        assert!(matches!(err, MatrixError::Shape { expected: (1, 1), found: (2, 1) }));
    }

    #[test]
    fn subset_keeps_column_order_and_tolerates_absent_entities() {
        let wanted: BTreeSet<String> = ids(&["c", "a", "zzz"]).into_iter().collect();
        let sub = matrix().subset(&wanted);
        assert_eq!(sub.entity_ids, ids(&["a", "c"]));
        assert_eq!(sub.values, array![[1.0, 3.0], [4.0, 6.0], [7.0, 9.0]]);
    }

    #[test]
    fn select_requires_every_entity() {
        let m = matrix();
        let sub = m.select(&ids(&["c", "a"])).unwrap();
        assert_eq!(sub.values.column(0), array![3.0, 6.0, 9.0]);
        assert!(matches!(
            m.select(&ids(&["a", "q"])),
            Err(MatrixError::MissingEntity(e)) if e == "q"
        ));
    }

    #[test]
    fn rename_keeps_first_of_colliding_targets() {
        let mapping: AHashMap<String, String> = [
            ("a".to_string(), "X".to_string()),
            ("b".to_string(), "X".to_string()),
            ("c".to_string(), "Y".to_string()),
        ]
        .into_iter()
        .collect();
        let renamed = matrix().rename_entities(&mapping).unwrap();
        assert_eq!(renamed.entity_ids(), ids(&["X", "Y"]).as_slice());
        assert_eq!(renamed.entity_column("X").unwrap(), array![1.0, 4.0, 7.0]);
    }

    #[test]
    fn assemble_orders_columns_by_pathway_ids() {
        let scores = assemble(
            vec![array![1.0, 2.0], array![3.0, 4.0]],
            ids(&["P2", "P1"]),
            ids(&["s1", "s2"]),
        )
        .unwrap();
        assert_eq!(scores.shape(), (2, 2));
        assert_eq!(scores.column("P1").unwrap(), array![3.0, 4.0]);
        assert_eq!(scores.row("s2").unwrap(), array![2.0, 4.0]);
    }

    #[test]
    fn assemble_rejects_short_vectors() {
        let err = assemble(vec![array![1.0]], ids(&["P1"]), ids(&["s1", "s2"])).unwrap_err();
        assert!(matches!(err, MatrixError::VectorLength { expected: 2, found: 1, .. }));
    }
}
