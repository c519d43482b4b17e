//! Criteria merge against the national species list.
//!
//! The reference spreadsheet marks each species with an `X` under zero or more
//! `Kriterium_*` columns. Those markers become Yes/No columns on every observation
//! row; rows that cannot be classified are copied to a sibling log file.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Reader};
use tracing::{info, warn};

use crate::config::CriteriaConfig;
use crate::constants::{CSV_ID_COL, CSV_RANK_COL, LOG_REASON_COL, NO, UNMATCHED_LOG_SUFFIX, YES};
use crate::error::{PipelineError, Result};
use crate::metrics::CriteriaMetrics;
use crate::table::Table;
use crate::types::{parse_integer, MatchOutcome, TaxonId};

/// Expected layout of the reference spreadsheet, checked once at load time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CriteriaSchema {
    pub id_column: String,
    pub prefix: String,
    pub start_column: usize,
    pub marked_token: String,
    pub sheet: Option<String>,
    pub expected: Vec<String>,
}

impl Default for CriteriaSchema {
    fn default() -> Self {
        Self::from(&CriteriaConfig::default())
    }
}

impl From<&CriteriaConfig> for CriteriaSchema {
    fn from(config: &CriteriaConfig) -> Self {
        Self {
            id_column: config.id_column.clone(),
            prefix: config.prefix.clone(),
            start_column: config.start_column,
            marked_token: config.marked_token.trim().to_uppercase(),
            sheet: config.sheet.clone(),
            expected: config.expected.clone(),
        }
    }
}

impl CriteriaSchema {
    /// `Kriterium_Ansvarsart_Norge` -> `Ansvarsart Norge`.
    pub fn display_name(&self, key: &str) -> String {
        let separated_prefix = format!("{}_", self.prefix);
        key.strip_prefix(separated_prefix.as_str())
            .unwrap_or(key)
            .replace('_', " ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Criterion {
    /// Column name in the reference file.
    pub key: String,
    /// Column name written to the output.
    pub display_name: String,
    column: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceEntry {
    /// One flag per criterion, in `ReferenceTable::criteria` order.
    pub flags: Vec<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceTable {
    criteria: Vec<Criterion>,
    entries: HashMap<TaxonId, ReferenceEntry>,
}

impl ReferenceTable {
    /// Loads a spreadsheet (xlsx/xls/ods) or, for `.csv`/`.txt`, a delimited file.
    pub fn load(path: &Path, schema: &CriteriaSchema, delimiter: u8) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        let (headers, rows) = if matches!(extension.as_str(), "csv" | "txt") {
            let table = Table::read_delimited(path, delimiter)?;
            (table.headers().to_vec(), table.rows().to_vec())
        } else {
            read_spreadsheet(path, schema.sheet.as_deref())?
        };

        let reference = Self::from_grid(&headers, &rows, schema)?;
        info!(
            "Loaded {} reference entries with {} criteria from {}",
            reference.entries.len(),
            reference.criteria.len(),
            path.display()
        );
        Ok(reference)
    }

    pub fn from_grid(headers: &[String], rows: &[Vec<String>], schema: &CriteriaSchema) -> Result<Self> {
        let id_idx = headers
            .iter()
            .position(|h| h.trim() == schema.id_column)
            .ok_or_else(|| PipelineError::missing_column(&schema.id_column, "reference file"))?;

        let discovered: Vec<(usize, &str)> = headers
            .iter()
            .enumerate()
            .skip(schema.start_column)
            .map(|(i, h)| (i, h.trim()))
            .filter(|(_, h)| h.starts_with(schema.prefix.as_str()))
            .collect();

        let selected: Vec<(usize, &str)> = if schema.expected.is_empty() {
            discovered
        } else {
            let missing: Vec<&str> = schema
                .expected
                .iter()
                .map(String::as_str)
                .filter(|key| !discovered.iter().any(|(_, h)| h == key))
                .collect();
            if !missing.is_empty() {
                return Err(PipelineError::SchemaMismatch(format!(
                    "criterion columns not found from column {} onward: {}",
                    schema.start_column,
                    missing.join(", ")
                )));
            }
            schema
                .expected
                .iter()
                .filter_map(|key| discovered.iter().find(|(_, h)| h == key).copied())
                .collect()
        };

        let criteria: Vec<Criterion> = selected
            .into_iter()
            .map(|(column, key)| Criterion {
                key: key.to_string(),
                display_name: schema.display_name(key),
                column,
            })
            .collect();

        let mut entries = HashMap::new();
        let mut skipped = 0usize;
        let mut duplicates = 0usize;
        for row in rows {
            let Some(id) = row.get(id_idx).and_then(|raw| parse_integer(raw)) else {
                skipped += 1;
                continue;
            };
            let flags = criteria
                .iter()
                .map(|c| {
                    row.get(c.column)
                        .map(|v| v.trim().to_uppercase() == schema.marked_token)
                        .unwrap_or(false)
                })
                .collect();
            if entries.contains_key(&id) {
                duplicates += 1;
                continue;
            }
            entries.insert(id, ReferenceEntry { flags });
        }

        if skipped > 0 {
            warn!("Skipped {} reference rows without a numeric identifier", skipped);
        }
        if duplicates > 0 {
            warn!("Ignored {} duplicate reference identifiers (first row wins)", duplicates);
        }

        Ok(Self { criteria, entries })
    }

    pub fn criteria(&self) -> &[Criterion] {
        &self.criteria
    }

    pub fn get(&self, id: TaxonId) -> Option<&ReferenceEntry> {
        self.entries.get(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn read_spreadsheet(path: &Path, sheet: Option<&str>) -> Result<(Vec<String>, Vec<Vec<String>>)> {
    let mut workbook = open_workbook_auto(path)?;
    let range = match sheet {
        Some(name) => workbook.worksheet_range(name)?,
        None => workbook.worksheet_range_at(0).ok_or_else(|| {
            PipelineError::Config(format!("'{}' contains no worksheets", path.display()))
        })??,
    };

    // The range starts at the first used cell; pad so column offsets match the sheet.
    let (_, start_col) = range.start().unwrap_or((0, 0));
    let pad = start_col as usize;
    let to_row = |cells: &[Data]| -> Vec<String> {
        std::iter::repeat(String::new())
            .take(pad)
            .chain(cells.iter().map(cell_to_string))
            .collect()
    };

    let mut rows = range.rows();
    let headers = rows.next().map(to_row).unwrap_or_default();
    let body = rows.map(to_row).collect();
    Ok((headers, body))
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => (*f as i64).to_string(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub rows: usize,
    pub matched: usize,
    pub rank_excluded: usize,
    pub unmatched: usize,
    pub logged: usize,
}

#[derive(Debug, Clone)]
pub struct MergeOutput {
    /// Every input row, with one Yes/No column per criterion.
    pub table: Table,
    /// Rows that need a human look, with a `log_reason` column.
    pub log: Table,
    pub outcomes: Vec<MatchOutcome>,
    pub summary: MergeSummary,
}

/// Left-joins `table` to the reference entries by identifier.
pub fn merge(mut table: Table, reference: &ReferenceTable) -> Result<MergeOutput> {
    let id_idx = table.require_column(CSV_ID_COL, "cleaned table")?;
    let rank_idx = table.require_column(CSV_RANK_COL, "cleaned table")?;

    let mut outcomes = Vec::with_capacity(table.len());
    let mut columns: Vec<Vec<String>> = vec![Vec::with_capacity(table.len()); reference.criteria.len()];
    for row in table.rows() {
        let entry = parse_integer(&row[id_idx]).and_then(|id| reference.get(id));
        outcomes.push(MatchOutcome::classify(&row[rank_idx], entry.is_some()));
        for (i, column) in columns.iter_mut().enumerate() {
            let marked = entry.map(|e| e.flags[i]).unwrap_or(false);
            column.push(if marked { YES } else { NO }.to_string());
        }
    }

    for (criterion, values) in reference.criteria.iter().zip(columns) {
        table.set_column(&criterion.display_name, values);
    }

    let mut summary = MergeSummary {
        rows: table.len(),
        ..Default::default()
    };
    let mut log_rows = Vec::new();
    let mut reasons = Vec::new();
    for (i, outcome) in outcomes.iter().enumerate() {
        match outcome {
            MatchOutcome::Matched => summary.matched += 1,
            MatchOutcome::RankExcluded => summary.rank_excluded += 1,
            MatchOutcome::Unmatched => summary.unmatched += 1,
        }
        if let Some(reason) = outcome.log_reason() {
            log_rows.push(i);
            reasons.push(reason.as_str().to_string());
        }
    }
    summary.logged = log_rows.len();

    let mut log = table.select_rows(&log_rows);
    log.set_column(LOG_REASON_COL, reasons);

    CriteriaMetrics::record_outcomes(summary.matched, summary.rank_excluded, summary.unmatched);
    Ok(MergeOutput {
        table,
        log,
        outcomes,
        summary,
    })
}

/// `out/fugl_forvaltning.csv` -> `out/fugl_forvaltning_unmatched_log.csv`.
pub fn unmatched_log_path(output_path: &Path) -> PathBuf {
    let stem = output_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = match output_path.extension() {
        Some(ext) => format!("{}{}.{}", stem, UNMATCHED_LOG_SUFFIX, ext.to_string_lossy()),
        None => format!("{}{}", stem, UNMATCHED_LOG_SUFFIX),
    };
    output_path.with_file_name(file_name)
}

#[derive(Debug, Clone)]
pub struct MergeArtifacts {
    pub output: PathBuf,
    /// Only set when at least one row was logged.
    pub unmatched_log: Option<PathBuf>,
    pub summary: MergeSummary,
}

pub fn run_criteria_merge(
    cleaned_path: &Path,
    reference_path: &Path,
    output_path: &Path,
    schema: &CriteriaSchema,
    delimiter: u8,
) -> Result<MergeArtifacts> {
    let reference = ReferenceTable::load(reference_path, schema, delimiter)?;
    let cleaned = Table::read_delimited(cleaned_path, delimiter)?;

    let output = merge(cleaned, &reference)?;
    output.table.write_delimited(output_path, delimiter)?;
    info!("Processed data (all rows) saved to: {}", output_path.display());

    let log_path = unmatched_log_path(output_path);
    let unmatched_log = if output.log.is_empty() {
        // A log left over from an earlier run would describe rows that are now fine.
        if log_path.exists() {
            fs::remove_file(&log_path)?;
        }
        info!("No rows needed to be logged for unmatched/higher-rank status");
        None
    } else {
        output.log.write_delimited(&log_path, delimiter)?;
        info!(
            "Log of {} unmatched/higher-rank rows saved to: {}",
            output.log.len(),
            log_path.display()
        );
        Some(log_path)
    };

    Ok(MergeArtifacts {
        output: output_path.to_path_buf(),
        unmatched_log,
        summary: output.summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn reference_grid() -> (Vec<String>, Vec<Vec<String>>) {
        let headers = strings(&[
            "ValidScientificNameId",
            "Vitenskapelig_Navn",
            "Norsk_Navn",
            "Kriterium_Ikke_I_Bruk",
            "Kriterium_A",
            "Merknad",
            "Kriterium_Ansvarsart_Norge",
        ]);
        let rows = vec![
            strings(&["42", "Corvus cornix", "kråke", "X", " x ", "", ""]),
            strings(&["7.0", "Corvus", "", "", "X", "", "X"]),
            strings(&["", "uten id", "", "", "X", "", ""]),
            strings(&["42", "duplikat", "", "", "", "", "X"]),
        ];
        (headers, rows)
    }

    fn reference() -> ReferenceTable {
        let (headers, rows) = reference_grid();
        ReferenceTable::from_grid(&headers, &rows, &CriteriaSchema::default()).unwrap()
    }

    #[test]
    fn test_criteria_discovered_from_offset_and_renamed() {
        let reference = reference();
        let names: Vec<&str> = reference.criteria().iter().map(|c| c.display_name.as_str()).collect();

        // Kriterium_Ikke_I_Bruk sits before the offset and is ignored
        assert_eq!(names, vec!["A", "Ansvarsart Norge"]);
        assert_eq!(reference.len(), 2);
        assert_eq!(reference.get(42).unwrap().flags, vec![true, false]);
        assert_eq!(reference.get(7).unwrap().flags, vec![true, true]);
    }

    #[test]
    fn test_expected_schema_fails_fast_on_missing_column() {
        let (headers, rows) = reference_grid();
        let schema = CriteriaSchema {
            expected: strings(&["Kriterium_A", "Kriterium_B"]),
            ..CriteriaSchema::default()
        };

        let err = ReferenceTable::from_grid(&headers, &rows, &schema).unwrap_err();
        match err {
            PipelineError::SchemaMismatch(message) => assert!(message.contains("Kriterium_B")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_expected_schema_restricts_columns() {
        let (headers, rows) = reference_grid();
        let schema = CriteriaSchema {
            expected: strings(&["Kriterium_Ansvarsart_Norge"]),
            ..CriteriaSchema::default()
        };

        let reference = ReferenceTable::from_grid(&headers, &rows, &schema).unwrap();
        assert_eq!(reference.criteria().len(), 1);
        assert_eq!(reference.get(7).unwrap().flags, vec![true]);
    }

    #[test]
    fn test_missing_reference_id_column_is_config_error() {
        let headers = strings(&["Id", "a", "b", "c", "Kriterium_A"]);
        let err = ReferenceTable::from_grid(&headers, &[], &CriteriaSchema::default()).unwrap_err();
        assert!(matches!(err, PipelineError::MissingColumn { .. }));
    }

    #[test]
    fn test_clean_merge_scenario() {
        let table = Table::from_rows(
            ["validScientificNameId", "scientificNameRank", "individualCount"],
            [vec!["42", "species", "1"]],
        );

        let output = merge(table, &reference()).unwrap();

        assert_eq!(output.table.column_values("A").unwrap(), vec!["Yes"]);
        assert_eq!(output.table.column_values("Ansvarsart Norge").unwrap(), vec!["No"]);
        assert_eq!(output.outcomes, vec![MatchOutcome::Matched]);
        assert!(output.log.is_empty());
    }

    #[test]
    fn test_unmatched_species_and_higher_rank_are_logged() {
        let table = Table::from_rows(
            ["validScientificNameId", "scientificNameRank"],
            [
                vec!["99", "species"],
                vec!["7", "genus"],
                vec!["8", "family"],
                vec!["", "subspecies"],
                vec!["42", "species"],
            ],
        );

        let output = merge(table, &reference()).unwrap();

        assert_eq!(output.table.len(), 5);
        // Unmatched rows get No everywhere; a matched higher rank keeps its markers
        assert_eq!(output.table.column_values("A").unwrap(), vec!["No", "Yes", "No", "No", "Yes"]);
        assert_eq!(output.log.len(), 4);
        assert_eq!(
            output.log.column_values("log_reason").unwrap(),
            vec![
                "Species/subspecies ID not found in reference",
                "Higher taxonomic rank",
                "Higher taxonomic rank",
                "Species/subspecies ID not found in reference",
            ]
        );
        assert_eq!(output.summary.matched, 1);
        assert_eq!(output.summary.rank_excluded, 2);
        assert_eq!(output.summary.unmatched, 2);
        assert!(output.table.column_index("log_reason").is_none());
    }

    #[test]
    fn test_merge_requires_rank_column() {
        let table = Table::from_rows(["validScientificNameId"], [vec!["42"]]);
        let err = merge(table, &reference()).unwrap_err();
        assert!(matches!(err, PipelineError::MissingColumn { ref column, .. } if column == "scientificNameRank"));
    }

    #[test]
    fn test_remerge_leaves_criteria_unchanged() {
        let table = Table::from_rows(
            ["validScientificNameId", "scientificNameRank"],
            [vec!["42", "species"], vec!["7", "genus"], vec!["99", "species"]],
        );
        let reference = reference();

        let first = merge(table, &reference).unwrap();
        let second = merge(first.table.clone(), &reference).unwrap();

        assert_eq!(second.table, first.table);
    }

    #[test]
    fn test_unmatched_log_path_inserts_suffix_before_extension() {
        assert_eq!(
            unmatched_log_path(Path::new("out/fugl_forvaltning.csv")),
            PathBuf::from("out/fugl_forvaltning_unmatched_log.csv")
        );
        assert_eq!(
            unmatched_log_path(Path::new("out/fugl")),
            PathBuf::from("out/fugl_unmatched_log")
        );
    }

    #[test]
    fn test_cell_to_string_formats_integral_floats() {
        assert_eq!(cell_to_string(&Data::Float(42.0)), "42");
        assert_eq!(cell_to_string(&Data::Float(1.5)), "1.5");
        assert_eq!(cell_to_string(&Data::String("X".into())), "X");
        assert_eq!(cell_to_string(&Data::Empty), "");
    }

    fn workbook() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/reference.xlsx")
    }

    #[test]
    fn test_load_xlsx_reads_first_sheet() {
        let reference = ReferenceTable::load(&workbook(), &CriteriaSchema::default(), b';').unwrap();
        let names: Vec<&str> = reference.criteria().iter().map(|c| c.display_name.as_str()).collect();

        assert_eq!(names, vec!["A", "Ansvars art"]);
        assert_eq!(reference.len(), 2);
        assert_eq!(reference.get(42).unwrap().flags, vec![true, false]);
        assert_eq!(reference.get(7).unwrap().flags, vec![false, true]);
    }

    #[test]
    fn test_load_xlsx_keeps_sheet_column_offsets() {
        let schema = CriteriaSchema {
            sheet: Some("Forskjovet".to_string()),
            ..CriteriaSchema::default()
        };

        let reference = ReferenceTable::load(&workbook(), &schema, b';').unwrap();
        let names: Vec<&str> = reference.criteria().iter().map(|c| c.display_name.as_str()).collect();

        // The table starts in column B, so Kriterium_Gammel lands on the offset
        assert_eq!(names, vec!["Gammel", "A", "Ansvars art"]);
        assert_eq!(reference.get(42).unwrap().flags, vec![true, true, false]);
        assert_eq!(reference.get(7).unwrap().flags, vec![false, false, true]);
    }

    #[test]
    fn test_load_xlsx_unknown_sheet_fails() {
        let schema = CriteriaSchema {
            sheet: Some("Mangler".to_string()),
            ..CriteriaSchema::default()
        };
        assert!(ReferenceTable::load(&workbook(), &schema, b';').is_err());
    }
}
