//! Pathway repository: raw pathway tables, their cleaned dictionary form and
//! the coverage filter that restricts a dictionary to one data matrix.

pub mod filter;
pub mod reader;
pub mod table;

pub use filter::{CoverageFilter, DEFAULT_MIN_ENTITY, EntityUniverse, filter_by_coverage};
pub use reader::{PathwayFormat, read_gmt, read_pathway_file, read_pathway_table};
pub use table::{
    DEFAULT_NAME_COLUMN, PathwayDict, PathwayEntry, PathwayError, PathwayRow, PathwayTable,
    is_missing_marker, to_dict,
};
