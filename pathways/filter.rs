use super::table::PathwayDict;
use ahash::AHashSet;
use log::{debug, info};
use std::collections::{BTreeSet, HashSet};

pub const DEFAULT_MIN_ENTITY: usize = 2;

/// Anything that can answer "is this entity measured?".
pub trait EntityUniverse {
    fn contains_entity(&self, entity: &str) -> bool;
}

impl EntityUniverse for AHashSet<String> {
    fn contains_entity(&self, entity: &str) -> bool {
        self.contains(entity)
    }
}

impl EntityUniverse for HashSet<String> {
    fn contains_entity(&self, entity: &str) -> bool {
        self.contains(entity)
    }
}

impl EntityUniverse for BTreeSet<String> {
    fn contains_entity(&self, entity: &str) -> bool {
        self.contains(entity)
    }
}

impl EntityUniverse for [String] {
    fn contains_entity(&self, entity: &str) -> bool {
        self.iter().any(|e| e == entity)
    }
}

/// Keeps pathways whose overlap with the universe reaches a threshold.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CoverageFilter {
    pub min_entity: usize,
}

impl Default for CoverageFilter {
    fn default() -> Self {
        Self {
            min_entity: DEFAULT_MIN_ENTITY,
        }
    }
}

impl CoverageFilter {
    pub fn new(min_entity: usize) -> Self {
        Self { min_entity }
    }

    /// Number of pathway entities present in `universe`.
    pub fn overlap<U: EntityUniverse + ?Sized>(entities: &BTreeSet<String>, universe: &U) -> usize {
        entities
            .iter()
            .filter(|e| universe.contains_entity(e))
            .count()
    }

    pub fn apply<U: EntityUniverse + ?Sized>(&self, dict: &PathwayDict, universe: &U) -> PathwayDict {
        let mut kept = PathwayDict::new();
        for entry in dict {
            let overlap = Self::overlap(&entry.entities, universe);
            if overlap >= self.min_entity {
                kept.insert(entry.clone());
            } else {
                debug!(
                    "Pathway '{}' covers {overlap} of {} entities, below min_entity={}",
                    entry.id,
                    entry.len(),
                    self.min_entity
                );
            }
        }
        info!(
            "{} of {} pathways pass the coverage filter (min_entity={})",
            kept.len(),
            dict.len(),
            self.min_entity
        );
        kept
    }
}

/// Restricts `dict` to pathways with at least `min_entity` entities in `universe`.
///
/// The stored entity sets are left whole; the per-pathway subsetter intersects
/// them with the matrix columns later.
pub fn filter_by_coverage<U: EntityUniverse + ?Sized>(
    dict: &PathwayDict,
    universe: &U,
    min_entity: usize,
) -> PathwayDict {
    CoverageFilter::new(min_entity).apply(dict, universe)
}
