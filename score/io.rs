//! # Tabular file input and output
//!
//! Abundance matrices are read with the `polars` CSV reader: the first column
//! holds sample IDs, every other column is one entity. An optional labels
//! column is split off as class metadata before the numeric conversion.
//! Results are written as TSV through `CsvWriter`.
//!
//! Cells must be numeric and complete. Missing or non-numeric cells in an
//! entity column are reported with the column name rather than silently
//! dropped, since the scoring engines have no notion of missing data.

use crate::enrich::{DifferentialRecord, GseaRecord, OraRecord};
use crate::types::{AbundanceMatrix, MatrixError, ScoreMatrix};
use log::info;
use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("The column '{0}' was not found in the input file. Please check spelling and case.")]
    ColumnNotFound(String),
    #[error(
        "The entity column '{column_name}' could not be converted to numbers (found type: {found_type})."
    )]
    ColumnWrongType {
        column_name: String,
        found_type: String,
    },
    #[error("Missing values were found in column '{0}'. Abundance data must be complete.")]
    MissingValuesFound(String),
    #[error("Non-finite values (NaN or Infinity) were found in column '{0}'.")]
    NonFiniteValuesFound(String),
    #[error("The input file has no entity columns after the sample ID column.")]
    NoEntityColumns,
    #[error("Invalid abundance matrix: {0}")]
    Matrix(#[from] MatrixError),
}

/// An abundance matrix plus the class labels split off from it, if requested.
#[derive(Debug, Clone)]
pub struct LoadedAbundance {
    pub matrix: AbundanceMatrix,
    pub labels: Option<Vec<String>>,
}

/// Comma for `.csv`, tab for everything else.
pub fn separator_for(path: &Path) -> u8 {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("csv") => b',',
        _ => b'\t',
    }
}

fn string_column(df: &DataFrame, name: &str) -> Result<Vec<String>, DataError> {
    let column = df.column(name)?;
    if column.null_count() > 0 {
        return Err(DataError::MissingValuesFound(name.to_string()));
    }
    let cast = column.cast(&DataType::String)?;
    Ok(cast
        .str()?
        .into_iter()
        .map(|value| value.unwrap_or_default().to_string())
        .collect())
}

fn numeric_column(df: &DataFrame, name: &str) -> Result<Vec<f64>, DataError> {
    let column = df.column(name)?;
    if column.null_count() > 0 {
        return Err(DataError::MissingValuesFound(name.to_string()));
    }
    let wrong_type = || DataError::ColumnWrongType {
        column_name: name.to_string(),
        found_type: format!("{:?}", column.dtype()),
    };
    let cast = column.cast(&DataType::Float64).map_err(|_| wrong_type())?;
    if cast.null_count() > 0 {
        return Err(wrong_type());
    }
    let values: Vec<f64> = cast.f64()?.into_no_null_iter().collect();
    if values.iter().any(|v| !v.is_finite()) {
        return Err(DataError::NonFiniteValuesFound(name.to_string()));
    }
    Ok(values)
}

/// Reads a samples × entities table. `labels_column`, when given, must exist
/// and is returned separately instead of being treated as an entity.
pub fn read_abundance(path: &Path, labels_column: Option<&str>) -> Result<LoadedAbundance, DataError> {
    let df = CsvReader::new(File::open(path)?)
        .with_options(
            CsvReadOptions::default()
                .with_has_header(true)
                .with_parse_options(CsvParseOptions::default().with_separator(separator_for(path))),
        )
        .finish()?;

    let names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();
    let Some((id_column, rest)) = names.split_first() else {
        return Err(DataError::NoEntityColumns);
    };
    if let Some(label) = labels_column {
        if !rest.iter().any(|name| name == label) {
            return Err(DataError::ColumnNotFound(label.to_string()));
        }
    }
    let entity_ids: Vec<String> = rest
        .iter()
        .filter(|name| Some(name.as_str()) != labels_column)
        .cloned()
        .collect();
    if entity_ids.is_empty() {
        return Err(DataError::NoEntityColumns);
    }

    let sample_ids = string_column(&df, id_column)?;
    let labels = labels_column
        .map(|label| string_column(&df, label))
        .transpose()?;

    let mut values = ndarray::Array2::<f64>::zeros((df.height(), entity_ids.len()));
    for (j, entity) in entity_ids.iter().enumerate() {
        let column = numeric_column(&df, entity)?;
        values.column_mut(j).assign(&ndarray::Array1::from(column));
    }

    let matrix = AbundanceMatrix::new(sample_ids, entity_ids, values)?;
    info!(
        "Loaded {} samples x {} entities from '{}'",
        matrix.n_samples(),
        matrix.n_entities(),
        path.display()
    );
    Ok(LoadedAbundance { matrix, labels })
}

/// Reads one identifier per line, skipping blank lines.
pub fn read_id_list(path: &Path) -> Result<Vec<String>, DataError> {
    Ok(std::fs::read_to_string(path)?
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

pub fn write_tsv(path: &Path, df: &mut DataFrame) -> Result<(), DataError> {
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file)
        .with_separator(b'\t')
        .finish(df)?;
    info!(
        "Wrote {} rows x {} columns to '{}'",
        df.height(),
        df.width(),
        path.display()
    );
    Ok(())
}

/// Samples as rows, first column `sample_id`, then one column per pathway.
pub fn score_frame(scores: &ScoreMatrix) -> Result<DataFrame, DataError> {
    let mut columns: Vec<Column> = Vec::with_capacity(scores.shape().1 + 1);
    columns.push(Series::new("sample_id".into(), scores.sample_ids().to_vec()).into());
    for (j, pathway) in scores.pathway_ids().iter().enumerate() {
        let values: Vec<f64> = scores.values().column(j).to_vec();
        columns.push(Series::new(pathway.as_str().into(), values).into());
    }
    Ok(DataFrame::new(columns)?)
}

pub fn ora_frame(records: &[OraRecord]) -> Result<DataFrame, DataError> {
    Ok(DataFrame::new(vec![
        Series::new("ID".into(), records.iter().map(|r| r.id.clone()).collect::<Vec<_>>()).into(),
        Series::new(
            "Pathway_name".into(),
            records.iter().map(|r| r.name.clone()).collect::<Vec<_>>(),
        )
        .into(),
        Series::new("Hits".into(), records.iter().map(|r| r.hits.clone()).collect::<Vec<_>>()).into(),
        Series::new(
            "Coverage".into(),
            records.iter().map(|r| r.coverage.clone()).collect::<Vec<_>>(),
        )
        .into(),
        Series::new("P-value".into(), records.iter().map(|r| r.p_value).collect::<Vec<_>>()).into(),
        Series::new("P-adjust".into(), records.iter().map(|r| r.p_adjust).collect::<Vec<_>>()).into(),
    ])?)
}

pub fn differential_frame(records: &[DifferentialRecord]) -> Result<DataFrame, DataError> {
    Ok(DataFrame::new(vec![
        Series::new("Entity".into(), records.iter().map(|r| r.entity.clone()).collect::<Vec<_>>()).into(),
        Series::new("P-value".into(), records.iter().map(|r| r.p_value).collect::<Vec<_>>()).into(),
        Series::new("P-adjust".into(), records.iter().map(|r| r.p_adjust).collect::<Vec<_>>()).into(),
    ])?)
}

pub fn gsea_frame(records: &[GseaRecord]) -> Result<DataFrame, DataError> {
    Ok(DataFrame::new(vec![
        Series::new("ID".into(), records.iter().map(|r| r.id.clone()).collect::<Vec<_>>()).into(),
        Series::new(
            "Pathway_name".into(),
            records.iter().map(|r| r.name.clone()).collect::<Vec<_>>(),
        )
        .into(),
        Series::new("ES".into(), records.iter().map(|r| r.es).collect::<Vec<_>>()).into(),
        Series::new("NES".into(), records.iter().map(|r| r.nes).collect::<Vec<_>>()).into(),
        Series::new("P-value".into(), records.iter().map(|r| r.p_value).collect::<Vec<_>>()).into(),
        Series::new("FDR".into(), records.iter().map(|r| r.fdr).collect::<Vec<_>>()).into(),
        Series::new("Size".into(), records.iter().map(|r| r.size as u64).collect::<Vec<_>>()).into(),
        Series::new(
            "Leading_edge".into(),
            records
                .iter()
                .map(|r| r.leading_edge.join(";"))
                .collect::<Vec<_>>(),
        )
        .into(),
    ])?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::assemble;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use std::io::Write;
    use tempfile::Builder;

    fn write_file(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut file = Builder::new().suffix(suffix).tempfile().expect("tempfile");
        file.write_all(contents.as_bytes()).expect("write");
        file
    }

    #[test]
    fn reads_csv_with_labels_column() {
        let file = write_file(
            ".csv",
            "sample,1372,16610,Group\nA,1.0,2.5,CTRL\nB,2.0,3.5,CASE\nC,3.0,1.5,CTRL\n",
        );
        let loaded = read_abundance(file.path(), Some("Group")).unwrap();
        assert_eq!(loaded.matrix.sample_ids(), ["A", "B", "C"]);
        assert_eq!(loaded.matrix.entity_ids(), ["1372", "16610"]);
        assert_eq!(loaded.labels.unwrap(), vec!["CTRL", "CASE", "CTRL"]);
        assert_abs_diff_eq!(loaded.matrix.values()[[1, 1]], 3.5);
    }

    #[test]
    fn integer_sample_ids_become_strings() {
        let file = write_file(".tsv", "id\tx\ty\n10\t1\t2\n20\t3\t4\n");
        let loaded = read_abundance(file.path(), None).unwrap();
        assert_eq!(loaded.matrix.sample_ids(), ["10", "20"]);
        assert!(loaded.labels.is_none());
    }

    #[test]
    fn text_in_entity_column_is_rejected() {
        let file = write_file(".tsv", "id\tx\ty\nA\t1\tfoo\nB\t3\tbar\n");
        let err = read_abundance(file.path(), None).unwrap_err();
        assert!(matches!(err, DataError::ColumnWrongType { column_name, .. } if column_name == "y"));
    }

    #[test]
    fn missing_labels_column_is_reported() {
        let file = write_file(".tsv", "id\tx\nA\t1\nB\t2\n");
        let err = read_abundance(file.path(), Some("Group")).unwrap_err();
        assert!(matches!(err, DataError::ColumnNotFound(c) if c == "Group"));
    }

    #[test]
    fn score_matrix_written_as_tsv() {
        let scores = assemble(
            vec![array![0.5, -0.5], array![1.0, 2.0]],
            vec!["P1".into(), "P2".into()],
            vec!["A".into(), "B".into()],
        )
        .unwrap();
        let out = Builder::new().suffix(".tsv").tempfile().expect("tempfile");
        let mut df = score_frame(&scores).unwrap();
        write_tsv(out.path(), &mut df).unwrap();
        let text = std::fs::read_to_string(out.path()).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("sample_id\tP1\tP2"));
        assert_eq!(lines.next(), Some("A\t0.5\t1.0"));
    }

    #[test]
    fn id_list_skips_blanks() {
        let file = write_file(".txt", "a\n\n b \nc\n");
        assert_eq!(read_id_list(file.path()).unwrap(), vec!["a", "b", "c"]);
    }
}
