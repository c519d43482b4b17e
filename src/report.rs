//! Markdown listing of the distinct values in every column of an output file.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::Result;
use crate::table::Table;

pub fn unique_values_report(table: &Table) -> String {
    let mut out = String::from("# Possible Values per Column\n\n");
    for (col, name) in table.headers().iter().enumerate() {
        let values: BTreeSet<&str> = table.rows().iter().map(|row| row[col].trim()).collect();
        let _ = writeln!(out, "## {}\n", name);
        for value in values {
            let _ = writeln!(out, "- `{}`", value);
        }
        out.push('\n');
    }
    out
}

/// `out/fugl_taxonomy.csv` -> `out/fugl_taxonomy_values.md`.
pub fn default_report_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    input.with_file_name(format!("{}_values.md", stem))
}

pub fn write_report(input: &Path, output: &Path, delimiter: u8) -> Result<PathBuf> {
    let table = Table::read_delimited(input, delimiter)?;
    fs::write(output, unique_values_report(&table))?;
    info!(
        "Wrote distinct values of {} columns to {}",
        table.headers().len(),
        output.display()
    );
    Ok(output.to_path_buf())
}
