//! # Pathway tables and the cleaned pathway dictionary
//!
//! A `PathwayTable` is the raw, GMT-like form of a pathway database: one row per
//! pathway keyed by its ID, one designated name column, and any number of member
//! columns whose cells may be padding. `to_dict` turns it into a `PathwayDict`,
//! the only form the scoring and enrichment code consumes.
//!
//! Cleaning rules:
//! - Every member cell is trimmed and compared against the padding markers
//!   (`None`, `nan`, `NaN`, empty); markers are never treated as entities.
//! - Members are deduplicated with set semantics. Member order carries no meaning.
//! - Pathways left with fewer than two members are dropped, not reported.

use ahash::AHashMap;
use log::debug;
use std::collections::BTreeSet;
use thiserror::Error;

/// Column that holds the human-readable pathway name.
pub const DEFAULT_NAME_COLUMN: &str = "Pathway_name";

const MISSING_MARKERS: [&str; 4] = ["", "None", "nan", "NaN"];

#[derive(Debug, Error)]
pub enum PathwayError {
    #[error(
        "The pathway table has no '{0}' column. A name column is required to tell pathway names apart from member identifiers."
    )]
    Schema(String),
    #[error("Pathway ID '{0}' appears more than once in the pathway table.")]
    DuplicatePathway(String),
    #[error("Row for pathway '{id}' has {found} cells, but the table only declares {expected} columns.")]
    RowTooWide {
        id: String,
        found: usize,
        expected: usize,
    },
    #[error("Malformed pathway record at line {line}: {message}")]
    MalformedRecord { line: usize, message: String },
    #[error("Pathway source '{0}' contains no pathway rows.")]
    EmptyTable(String),
    #[error("CSV error while reading pathways: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Returns true for cell values that only pad a ragged pathway row.
pub fn is_missing_marker(value: &str) -> bool {
    MISSING_MARKERS.contains(&value.trim())
}

#[derive(Clone, Debug, PartialEq)]
pub struct PathwayRow {
    pub id: String,
    /// One cell per table column; `None` marks a null cell.
    pub cells: Vec<Option<String>>,
}

/// Raw pathway table: rows keyed by pathway ID, columns = name column + members.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PathwayTable {
    columns: Vec<String>,
    rows: Vec<PathwayRow>,
    ids: AHashMap<String, usize>,
}

impl PathwayTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
            ids: AHashMap::new(),
        }
    }

    /// Builds a table with a `Pathway_name` column followed by numbered member columns.
    pub fn from_sets<I, S>(sets: I) -> Result<Self, PathwayError>
    where
        I: IntoIterator<Item = (S, S, Vec<S>)>,
        S: Into<String>,
    {
        let mut staged = Vec::new();
        let mut width = 0;
        for (id, name, members) in sets {
            let mut cells = Vec::with_capacity(members.len() + 1);
            cells.push(Some(name.into()));
            cells.extend(members.into_iter().map(|m| Some(m.into())));
            width = width.max(cells.len());
            staged.push((id.into(), cells));
        }

        let mut columns = Vec::with_capacity(width.max(1));
        columns.push(DEFAULT_NAME_COLUMN.to_string());
        columns.extend((0..width.saturating_sub(1)).map(|i| i.to_string()));

        let mut table = Self::new(columns);
        for (id, cells) in staged {
            table.push_row(id, cells)?;
        }
        Ok(table)
    }

    /// Appends a row, padding short rows with nulls.
    pub fn push_row(
        &mut self,
        id: impl Into<String>,
        mut cells: Vec<Option<String>>,
    ) -> Result<(), PathwayError> {
        let id = id.into();
        if cells.len() > self.columns.len() {
            return Err(PathwayError::RowTooWide {
                id,
                found: cells.len(),
                expected: self.columns.len(),
            });
        }
        if self.ids.contains_key(&id) {
            return Err(PathwayError::DuplicatePathway(id));
        }
        cells.resize(self.columns.len(), None);
        self.ids.insert(id.clone(), self.rows.len());
        self.rows.push(PathwayRow { id, cells });
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[PathwayRow] {
        &self.rows
    }

    pub fn row(&self, id: &str) -> Option<&PathwayRow> {
        self.ids.get(id).map(|&i| &self.rows[i])
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A cleaned pathway: deduplicated member entities, at least two of them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathwayEntry {
    pub id: String,
    pub name: Option<String>,
    pub entities: BTreeSet<String>,
}

impl PathwayEntry {
    pub fn new<I, S>(id: impl Into<String>, name: Option<String>, entities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            name,
            entities: entities.into_iter().map(Into::into).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Pathway ID → entity set, iterated in insertion order.
///
/// Entries with fewer than two entities are never stored.
#[derive(Clone, Debug, Default)]
pub struct PathwayDict {
    entries: Vec<PathwayEntry>,
    index: AHashMap<String, usize>,
}

impl PathwayDict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<I: IntoIterator<Item = PathwayEntry>>(entries: I) -> Self {
        let mut dict = Self::new();
        for entry in entries {
            dict.insert(entry);
        }
        dict
    }

    /// Stores `entry`, replacing an existing entry with the same ID in place.
    /// Returns false when the entry was degenerate and therefore skipped; a
    /// degenerate entry also evicts any earlier entry under its ID.
    pub fn insert(&mut self, entry: PathwayEntry) -> bool {
        if entry.len() < 2 {
            debug!(
                "Dropping pathway '{}' with {} usable member(s)",
                entry.id,
                entry.len()
            );
            self.remove(&entry.id);
            return false;
        }
        match self.index.get(&entry.id) {
            Some(&pos) => self.entries[pos] = entry,
            None => {
                self.index.insert(entry.id.clone(), self.entries.len());
                self.entries.push(entry);
            }
        }
        true
    }

    /// Removes the entry for `id`, keeping the order of the rest.
    pub fn remove(&mut self, id: &str) -> Option<PathwayEntry> {
        let pos = self.index.remove(id)?;
        let removed = self.entries.remove(pos);
        for slot in self.index.values_mut() {
            if *slot > pos {
                *slot -= 1;
            }
        }
        Some(removed)
    }

    pub fn get(&self, id: &str) -> Option<&PathwayEntry> {
        self.index.get(id).map(|&i| &self.entries[i])
    }

    pub fn name(&self, id: &str) -> Option<&str> {
        self.get(id).and_then(|e| e.name.as_deref())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.id.as_str())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PathwayEntry> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &[PathwayEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a PathwayDict {
    type Item = &'a PathwayEntry;
    type IntoIter = std::slice::Iter<'a, PathwayEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Cleans a raw pathway table into a `PathwayDict`.
///
/// Fails only when `name_column` is absent from the table.
pub fn to_dict(table: &PathwayTable, name_column: &str) -> Result<PathwayDict, PathwayError> {
    let name_idx = table
        .column_index(name_column)
        .ok_or_else(|| PathwayError::Schema(name_column.to_string()))?;

    let mut dict = PathwayDict::new();
    for row in table.rows() {
        let entities: BTreeSet<String> = row
            .cells
            .iter()
            .enumerate()
            .filter(|(col, _)| *col != name_idx)
            .filter_map(|(_, cell)| cell.as_deref())
            .filter(|value| !is_missing_marker(value))
            .map(|value| value.trim().to_string())
            .collect();

        let name = row
            .cells
            .get(name_idx)
            .and_then(|cell| cell.as_deref())
            .filter(|value| !is_missing_marker(value))
            .map(|value| value.trim().to_string());

        dict.insert(PathwayEntry {
            id: row.id.clone(),
            name,
            entities,
        });
    }

    debug!(
        "Cleaned {} pathway rows into {} usable pathways",
        table.len(),
        dict.len()
    );
    Ok(dict)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(values: &[Option<&str>]) -> Vec<Option<String>> {
        values.iter().map(|v| v.map(str::to_string)).collect()
    }

    fn ragged_table() -> PathwayTable {
        let columns = vec![
            DEFAULT_NAME_COLUMN.to_string(),
            "0".to_string(),
            "1".to_string(),
            "2".to_string(),
            "3".to_string(),
        ];
        let mut table = PathwayTable::new(columns);
        table
            .push_row(
                "R-HSA-X",
                cells(&[Some("name"), Some("A"), Some("A"), Some("B"), None]),
            )
            .unwrap();
        table
            .push_row("R-HSA-Y", cells(&[Some("single"), Some("A"), Some("None")]))
            .unwrap();
        table
            .push_row(
                "R-HSA-Z",
                cells(&[Some("padded"), Some("nan"), Some("C"), Some(""), Some("D")]),
            )
            .unwrap();
        table
    }

    #[test]
    fn duplicates_and_padding_are_removed() {
        let dict = to_dict(&ragged_table(), DEFAULT_NAME_COLUMN).unwrap();
        let x = dict.get("R-HSA-X").unwrap();
        let expected: BTreeSet<String> = ["A", "B"].iter().map(|s| s.to_string()).collect();
        assert_eq!(x.entities, expected);
        assert_eq!(x.name.as_deref(), Some("name"));

        let z = dict.get("R-HSA-Z").unwrap();
        assert!(z.entities.contains("C") && z.entities.contains("D"));
        assert_eq!(z.len(), 2);
    }

    #[test]
    fn pathways_below_two_members_are_dropped() {
        let dict = to_dict(&ragged_table(), DEFAULT_NAME_COLUMN).unwrap();
        assert!(!dict.contains("R-HSA-Y"));
        assert_eq!(dict.len(), 2);
    }

    #[test]
    fn insertion_order_is_kept() {
        let dict = to_dict(&ragged_table(), DEFAULT_NAME_COLUMN).unwrap();
        let ids: Vec<&str> = dict.ids().collect();
        assert_eq!(ids, vec!["R-HSA-X", "R-HSA-Z"]);
    }

    #[test]
    fn missing_name_column_is_a_schema_error() {
        let err = to_dict(&ragged_table(), "Description").unwrap_err();
        assert!(matches!(err, PathwayError::Schema(col) if col == "Description"));
    }

    #[test]
    fn name_cell_is_never_a_member() {
        let table = PathwayTable::from_sets(vec![("P1", "A", vec!["A", "B"])]).unwrap();
        let dict = to_dict(&table, DEFAULT_NAME_COLUMN).unwrap();
        assert_eq!(dict.get("P1").unwrap().len(), 2);

        let table = PathwayTable::from_sets(vec![("P2", "A", vec!["A"])]).unwrap();
        let dict = to_dict(&table, DEFAULT_NAME_COLUMN).unwrap();
        assert!(dict.is_empty());
    }

    #[test]
    fn duplicate_pathway_ids_are_rejected() {
        let err = PathwayTable::from_sets(vec![
            ("P1", "first", vec!["A", "B"]),
            ("P1", "second", vec!["C", "D"]),
        ])
        .unwrap_err();
        assert!(matches!(err, PathwayError::DuplicatePathway(id) if id == "P1"));
    }

    #[test]
    fn overly_wide_rows_are_rejected() {
        let mut table = PathwayTable::new(vec![DEFAULT_NAME_COLUMN.to_string()]);
        let err = table
            .push_row("P1", cells(&[Some("n"), Some("A")]))
            .unwrap_err();
        assert!(matches!(err, PathwayError::RowTooWide { found: 2, expected: 1, .. }));
    }

    #[test]
    fn dict_insert_replaces_in_place() {
        let mut dict = PathwayDict::new();
        assert!(dict.insert(PathwayEntry::new("P1", None, ["A", "B"])));
        assert!(dict.insert(PathwayEntry::new("P2", None, ["C", "D"])));
        assert!(dict.insert(PathwayEntry::new("P1", Some("renamed".into()), ["E", "F"])));
        assert!(!dict.insert(PathwayEntry::new("P3", None, ["G"])));
        let ids: Vec<&str> = dict.ids().collect();
        assert_eq!(ids, vec!["P1", "P2"]);
        assert_eq!(dict.name("P1"), Some("renamed"));
    }

    #[test]
    fn degenerate_reinsert_evicts_existing_entry() {
        let mut dict = PathwayDict::new();
        dict.insert(PathwayEntry::new("P1", None, ["A", "B"]));
        dict.insert(PathwayEntry::new("P2", None, ["C", "D"]));
        dict.insert(PathwayEntry::new("P3", None, ["E", "F"]));

        assert!(!dict.insert(PathwayEntry::new("P1", None, ["A"])));
        assert!(!dict.contains("P1"));
        assert_eq!(dict.ids().collect::<Vec<_>>(), vec!["P2", "P3"]);
        assert_eq!(dict.get("P3").map(|e| e.len()), Some(2));
        assert!(dict.remove("P1").is_none());
    }
}
