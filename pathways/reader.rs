use super::table::{DEFAULT_NAME_COLUMN, PathwayError, PathwayTable};
use csv::{ReaderBuilder, StringRecord, Trim};
use log::info;
use std::io::Read;
use std::path::Path;

/// On-disk layouts a pathway database can come in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathwayFormat {
    /// Header row, ID column first, then a name column and member columns.
    Table { delimiter: u8 },
    /// Tab-separated `ID  description  member...`, no header.
    Gmt,
}

impl PathwayFormat {
    /// Guesses the layout from the file extension. Unknown extensions read as TSV tables.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("gmt") => PathwayFormat::Gmt,
            Some("csv") => PathwayFormat::Table { delimiter: b',' },
            _ => PathwayFormat::Table { delimiter: b'\t' },
        }
    }
}

pub fn read_pathway_file(path: &Path, format: PathwayFormat) -> Result<PathwayTable, PathwayError> {
    let file = std::fs::File::open(path)?;
    let table = match format {
        PathwayFormat::Table { delimiter } => read_pathway_table(file, delimiter)?,
        PathwayFormat::Gmt => read_gmt(file)?,
    };
    if table.is_empty() {
        return Err(PathwayError::EmptyTable(path.display().to_string()));
    }
    info!(
        "Loaded {} pathway rows from '{}'",
        table.len(),
        path.display()
    );
    Ok(table)
}

fn cell(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn collect_records<R: Read>(
    reader: &mut csv::Reader<R>,
) -> Result<Vec<(usize, StringRecord)>, PathwayError> {
    let mut out = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record?;
        if record.iter().all(|f| f.is_empty()) {
            continue;
        }
        let line = record.position().map_or(idx + 1, |p| p.line() as usize);
        out.push((line, record));
    }
    Ok(out)
}

/// Reads the header-plus-rows layout. The first column holds pathway IDs; rows
/// may be ragged, and cells beyond the header get positional column names.
pub fn read_pathway_table<R: Read>(source: R, delimiter: u8) -> Result<PathwayTable, PathwayError> {
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(source);

    let header: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let records = collect_records(&mut reader)?;

    let width = records
        .iter()
        .map(|(_, r)| r.len())
        .chain(std::iter::once(header.len()))
        .max()
        .unwrap_or(0);
    if width == 0 {
        return Ok(PathwayTable::new(Vec::new()));
    }

    let mut columns: Vec<String> = header.into_iter().skip(1).collect();
    let named = columns.len();
    columns.extend((named..width - 1).map(|i| format!("member_{i}")));

    let mut table = PathwayTable::new(columns);
    for (line, record) in records {
        let mut fields = record.iter();
        let id = match fields.next().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                return Err(PathwayError::MalformedRecord {
                    line,
                    message: "missing pathway ID in first column".to_string(),
                });
            }
        };
        table.push_row(id, fields.map(cell).collect())?;
    }
    Ok(table)
}

/// Reads a GMT file: `ID<TAB>description<TAB>member<TAB>member...`.
/// The description becomes the `Pathway_name` column.
pub fn read_gmt<R: Read>(source: R) -> Result<PathwayTable, PathwayError> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .trim(Trim::All)
        .from_reader(source);

    let records = collect_records(&mut reader)?;
    let width = records.iter().map(|(_, r)| r.len()).max().unwrap_or(0);

    let mut columns = vec![DEFAULT_NAME_COLUMN.to_string()];
    columns.extend((0..width.saturating_sub(2)).map(|i| i.to_string()));

    let mut table = PathwayTable::new(columns);
    for (line, record) in records {
        if record.len() < 2 {
            return Err(PathwayError::MalformedRecord {
                line,
                message: format!("expected ID and description, found {} field(s)", record.len()),
            });
        }
        let mut fields = record.iter();
        let id = fields.next().unwrap_or_default().to_string();
        table.push_row(id, fields.map(cell).collect())?;
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pathways::table::to_dict;

    #[test]
    fn ragged_table_rows_are_padded() {
        let text = "ID,Pathway_name,0,1\n\
                    R-HSA-1,Glycolysis,C00031,C00022,C00186\n\
                    R-HSA-2,TCA,C00036,None\n";
        let table = read_pathway_table(text.as_bytes(), b',').unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.columns().len(), 4);
        assert_eq!(table.columns()[3], "member_3");

        let dict = to_dict(&table, DEFAULT_NAME_COLUMN).unwrap();
        assert_eq!(dict.get("R-HSA-1").unwrap().len(), 3);
        assert!(!dict.contains("R-HSA-2"));
        assert_eq!(dict.name("R-HSA-1"), Some("Glycolysis"));
    }

    #[test]
    fn gmt_description_is_the_name() {
        let text = "P1\tFirst pathway\tA\tB\tB\n\nP2\tSecond\tC\tD\tE\tF\n";
        let table = read_gmt(text.as_bytes()).unwrap();
        assert_eq!(table.len(), 2);
        let dict = to_dict(&table, DEFAULT_NAME_COLUMN).unwrap();
        assert_eq!(dict.name("P1"), Some("First pathway"));
        assert_eq!(dict.get("P1").unwrap().len(), 2);
        assert_eq!(dict.get("P2").unwrap().len(), 4);
    }

    #[test]
    fn gmt_line_without_description_is_rejected() {
        let err = read_gmt("P1\n".as_bytes()).unwrap_err();
        assert!(matches!(err, PathwayError::MalformedRecord { line: 1, .. }));
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(PathwayFormat::from_path(Path::new("kegg.GMT")), PathwayFormat::Gmt);
        assert_eq!(
            PathwayFormat::from_path(Path::new("reactome.csv")),
            PathwayFormat::Table { delimiter: b',' }
        );
        assert_eq!(
            PathwayFormat::from_path(Path::new("reactome.tsv")),
            PathwayFormat::Table { delimiter: b'\t' }
        );
    }
}
