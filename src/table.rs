//! Delimited-text working table.
//!
//! Every stage reads one of these from disk and writes one back. Cells are kept as
//! strings so columns the pipeline does not understand pass through untouched.

use std::collections::HashSet;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use csv::{ReaderBuilder, WriterBuilder};
use tracing::debug;

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    /// Builds a table from string-ish headers and rows; short rows are padded with empty cells.
    pub fn from_rows<H, R, C>(headers: H, rows: R) -> Self
    where
        H: IntoIterator,
        H::Item: Into<String>,
        R: IntoIterator<Item = C>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        let mut table = Self::new(headers.into_iter().map(Into::into).collect());
        for row in rows {
            table.push_row(row.into_iter().map(Into::into).collect());
        }
        table
    }

    pub fn read_delimited(path: &Path, delimiter: u8) -> Result<Self> {
        let file = File::open(path)?;
        let table = Self::from_reader(file, delimiter)?;
        debug!(
            "Read {} rows x {} columns from {}",
            table.len(),
            table.headers.len(),
            path.display()
        );
        Ok(table)
    }

    pub fn from_reader<R: Read>(reader: R, delimiter: u8) -> Result<Self> {
        let mut rdr = ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .from_reader(reader);

        let headers: Vec<String> = rdr
            .headers()?
            .iter()
            .enumerate()
            .map(|(i, h)| {
                let h = if i == 0 { h.trim_start_matches('\u{feff}') } else { h };
                h.trim().to_string()
            })
            .collect();

        let mut table = Self::new(headers);
        for record in rdr.records() {
            let record = record?;
            if record.len() > table.headers.len() {
                return Err(PipelineError::MalformedRow {
                    line: record.position().map(|p| p.line()).unwrap_or(0),
                    expected: table.headers.len(),
                    found: record.len(),
                });
            }
            table.push_row(record.iter().map(str::to_string).collect());
        }
        Ok(table)
    }

    /// Writes the table without any index column.
    pub fn write_delimited(&self, path: &Path, delimiter: u8) -> Result<()> {
        let file = File::create(path)?;
        self.to_writer(file, delimiter)?;
        debug!("Wrote {} rows to {}", self.len(), path.display());
        Ok(())
    }

    pub fn to_writer<W: Write>(&self, writer: W, delimiter: u8) -> Result<()> {
        let mut wtr = WriterBuilder::new().delimiter(delimiter).from_writer(writer);
        wtr.write_record(&self.headers)?;
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Index of a column the caller cannot do without.
    pub fn require_column(&self, name: &str, context: &str) -> Result<usize> {
        self.column_index(name)
            .ok_or_else(|| PipelineError::missing_column(name, context))
    }

    pub fn cell(&self, row: usize, column: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn column_values(&self, name: &str) -> Option<Vec<&str>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|r| r[idx].as_str()).collect())
    }

    pub fn push_row(&mut self, mut row: Vec<String>) {
        row.resize(self.headers.len(), String::new());
        self.rows.push(row);
    }

    /// Removes every listed column that is present and returns the names that were dropped.
    pub fn drop_columns(&mut self, names: &HashSet<&str>) -> Vec<String> {
        let keep: Vec<bool> = self
            .headers
            .iter()
            .map(|h| !names.contains(h.as_str()))
            .collect();
        if keep.iter().all(|k| *k) {
            return Vec::new();
        }

        let dropped = self
            .headers
            .iter()
            .zip(&keep)
            .filter(|(_, k)| !**k)
            .map(|(h, _)| h.clone())
            .collect();

        self.headers = retain_by_mask(std::mem::take(&mut self.headers), &keep);
        for row in &mut self.rows {
            *row = retain_by_mask(std::mem::take(row), &keep);
        }
        dropped
    }

    /// Replaces the column's values when it exists, appends it otherwise.
    pub fn set_column(&mut self, name: &str, values: Vec<String>) {
        debug_assert_eq!(values.len(), self.rows.len());
        match self.column_index(name) {
            Some(idx) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row[idx] = value;
                }
            }
            None => {
                self.headers.push(name.to_string());
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }
    }

    pub fn set_cell(&mut self, row: usize, column: usize, value: String) {
        if let Some(cell) = self.rows.get_mut(row).and_then(|r| r.get_mut(column)) {
            *cell = value;
        }
    }

    /// Copies the selected rows (in the given order) into a new table with the same headers.
    pub fn select_rows(&self, indices: &[usize]) -> Table {
        Table {
            headers: self.headers.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }
}

fn retain_by_mask(values: Vec<String>, keep: &[bool]) -> Vec<String> {
    values
        .into_iter()
        .zip(keep)
        .filter(|(_, k)| **k)
        .map(|(v, _)| v)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_semicolon_file_and_pads_short_rows() {
        let data = "\u{feff}a;b;c\n1;2;3\n4;5\n";
        let table = Table::from_reader(data.as_bytes(), b';').unwrap();

        assert_eq!(table.headers(), &["a", "b", "c"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.cell(1, 2), "");
    }

    #[test]
    fn test_rejects_rows_with_extra_fields() {
        let data = "a;b\n1;2;3\n";
        let err = Table::from_reader(data.as_bytes(), b';').unwrap_err();
        assert!(matches!(err, PipelineError::MalformedRow { expected: 2, found: 3, .. }));
    }

    #[test]
    fn test_writes_without_index_and_keeps_quoting() {
        let table = Table::from_rows(["name", "note"], [vec!["Kråke", "a;b"]]);
        let mut out = Vec::new();
        table.to_writer(&mut out, b';').unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), "name;note\nKråke;\"a;b\"\n");
    }

    #[test]
    fn test_drop_columns_ignores_absent_names() {
        let mut table = Table::from_rows(["keep", "drop", "also"], [vec!["1", "2", "3"]]);
        let names: HashSet<&str> = ["drop", "missing"].into_iter().collect();

        let dropped = table.drop_columns(&names);

        assert_eq!(dropped, vec!["drop".to_string()]);
        assert_eq!(table.headers(), &["keep", "also"]);
        assert_eq!(table.rows()[0], vec!["1", "3"]);
    }

    #[test]
    fn test_set_column_overwrites_existing() {
        let mut table = Table::from_rows(["a"], [vec!["1"], vec!["2"]]);
        table.set_column("b", vec!["x".into(), "y".into()]);
        table.set_column("b", vec!["z".into(), "w".into()]);

        assert_eq!(table.headers(), &["a", "b"]);
        assert_eq!(table.column_values("b").unwrap(), vec!["z", "w"]);
    }
}
