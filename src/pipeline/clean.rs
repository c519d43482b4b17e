use std::collections::HashSet;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use tracing::{debug, info, warn};

use crate::constants::{COLUMNS_TO_REMOVE, INDIVIDUAL_COUNT_COL};
use crate::error::Result;
use crate::table::Table;
use crate::types::parse_integer;

static REMOVAL_SET: Lazy<HashSet<&'static str>> =
    Lazy::new(|| COLUMNS_TO_REMOVE.iter().copied().collect());

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanSummary {
    pub rows: usize,
    pub dropped_columns: Vec<String>,
    /// Counts that were empty and became 1.
    pub defaulted_counts: usize,
    /// Counts that could not be read as a non-negative integer and became 1.
    pub rejected_counts: usize,
}

/// Drops the fixed noise columns and normalizes `individualCount` to a non-null integer.
pub fn clean(mut table: Table) -> (Table, CleanSummary) {
    let dropped_columns = table.drop_columns(&REMOVAL_SET);
    let mut summary = CleanSummary {
        rows: table.len(),
        dropped_columns,
        ..Default::default()
    };

    let Some(count_idx) = table.column_index(INDIVIDUAL_COUNT_COL) else {
        warn!("No '{}' column; counts left as-is", INDIVIDUAL_COUNT_COL);
        return (table, summary);
    };

    for row in 0..table.len() {
        let raw = table.cell(row, count_idx);
        let normalized = if raw.trim().is_empty() {
            summary.defaulted_counts += 1;
            1
        } else {
            match parse_integer(raw) {
                Some(count) if count >= 0 => count,
                _ => {
                    debug!(row, value = raw, "Unreadable individual count, using 1");
                    summary.rejected_counts += 1;
                    1
                }
            }
        };
        table.set_cell(row, count_idx, normalized.to_string());
    }

    if summary.rejected_counts > 0 {
        warn!("{} individual counts were not integers and were set to 1", summary.rejected_counts);
    }
    (table, summary)
}

pub fn run_clean(raw_path: &Path, cleaned_path: &Path, delimiter: u8) -> Result<(PathBuf, CleanSummary)> {
    let raw = Table::read_delimited(raw_path, delimiter)?;
    let (cleaned, summary) = clean(raw);
    cleaned.write_delimited(cleaned_path, delimiter)?;

    info!(
        "Cleaned {} rows, dropped {} columns -> {}",
        summary.rows,
        summary.dropped_columns.len(),
        cleaned_path.display()
    );
    Ok((cleaned_path.to_path_buf(), summary))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drops_listed_columns_and_keeps_the_rest() {
        let table = Table::from_rows(
            ["occurrenceId", "validScientificNameId", "hasErrors", "locality", "individualCount"],
            [vec!["urn:1", "42", "false", "Sortland", "3"]],
        );

        let (cleaned, summary) = clean(table);

        assert_eq!(cleaned.headers(), &["validScientificNameId", "locality", "individualCount"]);
        assert_eq!(cleaned.rows()[0], vec!["42", "Sortland", "3"]);
        assert_eq!(summary.dropped_columns, vec!["occurrenceId", "hasErrors"]);
    }

    #[test]
    fn test_missing_count_becomes_one() {
        let table = Table::from_rows(
            ["validScientificNameId", "individualCount"],
            [vec!["42", ""], vec!["43", "2.0"], vec!["44", "mange"], vec!["45", "-3"]],
        );

        let (cleaned, summary) = clean(table);

        assert_eq!(cleaned.column_values("individualCount").unwrap(), vec!["1", "2", "1", "1"]);
        assert_eq!(summary.defaulted_counts, 1);
        assert_eq!(summary.rejected_counts, 2);
    }

    #[test]
    fn test_row_count_preserved_and_columns_subset() {
        let headers = ["east", "north", "scientificNameRank", "dateLastModified"];
        let table = Table::from_rows(headers, [vec!["1", "2", "species", "x"], vec!["3", "4", "genus", "y"]]);
        let original_headers: Vec<String> = table.headers().to_vec();

        let (cleaned, _) = clean(table);

        assert_eq!(cleaned.len(), 2);
        assert!(cleaned.headers().iter().all(|h| original_headers.contains(h)));
        assert_eq!(cleaned.headers(), &["scientificNameRank"]);
    }
}
