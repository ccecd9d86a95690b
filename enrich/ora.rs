use super::EnrichmentError;
use super::correction::benjamini_hochberg;
use super::differential::{DifferentialRecord, DifferentialTest, differential_test};
use crate::pathways::PathwayDict;
use crate::types::AbundanceMatrix;
use ahash::AHashSet;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use statrs::distribution::{DiscreteCDF, Hypergeometric};

/// Default adjusted p-value cutoff for calling an entity differential.
pub const DEFAULT_DA_CUTOFF: f64 = 0.05;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OraRecord {
    pub id: String,
    pub name: Option<String>,
    /// `a/(a+b)`: differential members over measured members.
    pub hits: String,
    /// `(a+b)/|pathway|`: measured members over all members.
    pub coverage: String,
    pub p_value: f64,
    pub p_adjust: f64,
}

/// One-sided (greater) Fisher exact test on `[[a, b], [c, d]]`.
pub fn fisher_greater(a: u64, b: u64, c: u64, d: u64) -> f64 {
    if a == 0 {
        return 1.0;
    }
    let population = a + b + c + d;
    match Hypergeometric::new(population, a + c, a + b) {
        // sf is P(X > x), so step back one to include `a` itself.
        Ok(dist) => dist.sf(a - 1).clamp(0.0, 1.0),
        Err(_) => f64::NAN,
    }
}

/// Over-representation of `differential` entities in each pathway against
/// `background`. Pathways with no differential member, or fewer than two
/// measured members, produce no record. An empty batch gives an empty table.
pub fn ora<S: AsRef<str>, T: AsRef<str>>(
    differential: &[S],
    background: &[T],
    pathways: &PathwayDict,
) -> Vec<OraRecord> {
    let selected: AHashSet<&str> = differential.iter().map(AsRef::as_ref).collect();
    let unselected: AHashSet<&str> = background
        .iter()
        .map(AsRef::as_ref)
        .filter(|e| !selected.contains(e))
        .collect();

    let mut records = Vec::new();
    let mut p_values = Vec::new();
    for entry in pathways {
        let a = selected.iter().filter(|e| entry.entities.contains(**e)).count() as u64;
        let b = unselected.iter().filter(|e| entry.entities.contains(**e)).count() as u64;
        if a == 0 || a + b < 2 {
            debug!("ORA skips pathway '{}' (a = {a}, a + b = {})", entry.id, a + b);
            continue;
        }
        let c = selected.len() as u64 - a;
        let d = unselected.len() as u64 - b;
        let p_value = fisher_greater(a, b, c, d);
        p_values.push(p_value);
        records.push(OraRecord {
            id: entry.id.clone(),
            name: entry.name.clone(),
            hits: format!("{a}/{}", a + b),
            coverage: format!("{}/{}", a + b, entry.len()),
            p_value,
            p_adjust: f64::NAN,
        });
    }

    if records.is_empty() {
        info!("ORA found no informative pathways; returning an empty table");
        return records;
    }
    for (record, adjusted) in records.iter_mut().zip(benjamini_hochberg(&p_values)) {
        record.p_adjust = adjusted;
    }
    info!(
        "ORA tested {} pathways with {} differential entities",
        records.len(),
        selected.len()
    );
    records
}

/// Differential test, cutoff selection and ORA in one call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OraAnalysis {
    pub cutoff: f64,
    pub test: DifferentialTest,
    /// Custom background; all matrix entities when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background: Option<Vec<String>>,
}

impl Default for OraAnalysis {
    fn default() -> Self {
        Self {
            cutoff: DEFAULT_DA_CUTOFF,
            test: DifferentialTest::default(),
            background: None,
        }
    }
}

impl OraAnalysis {
    pub fn new(cutoff: f64, test: DifferentialTest) -> Self {
        Self {
            cutoff,
            test,
            background: None,
        }
    }

    pub fn with_background(mut self, background: Vec<String>) -> Self {
        self.background = Some(background);
        self
    }

    /// Entities whose adjusted p-value is at or below the cutoff.
    pub fn select(&self, table: &[DifferentialRecord]) -> Vec<String> {
        table
            .iter()
            .filter(|r| r.p_adjust <= self.cutoff)
            .map(|r| r.entity.clone())
            .collect()
    }

    pub fn run<S: AsRef<str>>(
        &self,
        matrix: &AbundanceMatrix,
        labels: &[S],
        pathways: &PathwayDict,
    ) -> Result<Vec<OraRecord>, EnrichmentError> {
        if !(0.0..=1.0).contains(&self.cutoff) {
            return Err(EnrichmentError::InvalidOption(format!(
                "ORA cutoff must lie in [0, 1], got {}",
                self.cutoff
            )));
        }
        let table = differential_test(matrix, labels, self.test)?;
        let differential = self.select(&table);
        info!(
            "{} of {} entities pass P-adjust <= {}",
            differential.len(),
            table.len(),
            self.cutoff
        );
        let background = self
            .background
            .as_deref()
            .unwrap_or_else(|| matrix.entity_ids());
        Ok(ora(&differential, background, pathways))
    }
}
