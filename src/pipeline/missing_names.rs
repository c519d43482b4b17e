//! Missing-Value Resolver: fills empty `preferredPopularName` cells before cleaning.
//!
//! Resolution is delegated to a [`NameResolver`], so batch runs can use a preset or a
//! skip-everything resolver instead of blocking on the terminal.

use std::collections::HashMap;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

use tracing::{info, warn};

use crate::constants::{POPULAR_NAME_COL, SCIENTIFIC_NAME_COL};
use crate::error::{PipelineError, Result};
use crate::table::Table;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Provided(String),
    Skip,
    Abort,
}

pub trait NameResolver {
    /// Asked once per distinct scientific name; `row_count` is how many rows lack a name.
    fn resolve(&mut self, scientific_name: &str, row_count: usize) -> Result<Resolution>;
}

/// Prompts on a terminal: a name, `s` to skip, `q` to quit.
pub struct TerminalResolver<R, W> {
    input: R,
    output: W,
}

impl TerminalResolver<BufReader<io::Stdin>, io::Stderr> {
    /// Reads answers from stdin; prompts go to stderr so stdout keeps only the output paths.
    pub fn stdin() -> Self {
        Self::new(BufReader::new(io::stdin()), io::stderr())
    }
}

impl<R: BufRead, W: Write> TerminalResolver<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead, W: Write> NameResolver for TerminalResolver<R, W> {
    fn resolve(&mut self, scientific_name: &str, row_count: usize) -> Result<Resolution> {
        loop {
            write!(
                self.output,
                "Scientific name: '{}' ({} rows) - Enter popular name (or 's'/'q'): ",
                scientific_name, row_count
            )?;
            self.output.flush()?;

            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                warn!("Input closed while resolving '{}'", scientific_name);
                return Ok(Resolution::Abort);
            }
            let answer = line.trim();
            match answer.to_lowercase().as_str() {
                "q" => return Ok(Resolution::Abort),
                "s" => return Ok(Resolution::Skip),
                "" => writeln!(self.output, "Please enter a valid name, 's' to skip, or 'q' to quit.")?,
                _ => return Ok(Resolution::Provided(answer.to_string())),
            }
        }
    }
}

/// Answers from a fixed map; names not in the map are skipped.
#[derive(Debug, Clone, Default)]
pub struct PresetResolver {
    names: HashMap<String, String>,
}

impl PresetResolver {
    pub fn new<I, K, V>(names: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            names: names.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl NameResolver for PresetResolver {
    fn resolve(&mut self, scientific_name: &str, _row_count: usize) -> Result<Resolution> {
        Ok(match self.names.get(scientific_name) {
            Some(name) => Resolution::Provided(name.clone()),
            None => Resolution::Skip,
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SkipResolver;

impl NameResolver for SkipResolver {
    fn resolve(&mut self, _scientific_name: &str, _row_count: usize) -> Result<Resolution> {
        Ok(Resolution::Skip)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveSummary {
    pub missing_rows: usize,
    pub distinct_names: usize,
    pub filled_rows: usize,
    pub skipped_names: usize,
}

/// Rows whose popular name is empty or whitespace.
pub fn missing_name_rows(table: &Table) -> Result<Vec<usize>> {
    let name_idx = table.require_column(POPULAR_NAME_COL, "observation table")?;
    Ok((0..table.len())
        .filter(|&row| table.cell(row, name_idx).trim().is_empty())
        .collect())
}

/// Asks `resolver` once per distinct scientific name among rows without a popular name.
///
/// Answers are collected first and applied afterwards, so an abort leaves `table` untouched.
pub fn resolve_missing_names(table: &mut Table, resolver: &mut dyn NameResolver) -> Result<ResolveSummary> {
    let name_idx = table.require_column(POPULAR_NAME_COL, "observation table")?;
    let scientific_idx = table.require_column(SCIENTIFIC_NAME_COL, "observation table")?;

    let missing = missing_name_rows(table)?;
    let mut summary = ResolveSummary {
        missing_rows: missing.len(),
        ..Default::default()
    };
    if missing.is_empty() {
        info!("No missing {} values found", POPULAR_NAME_COL);
        return Ok(summary);
    }

    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, usize> = HashMap::new();
    for &row in &missing {
        let scientific = table.cell(row, scientific_idx).to_string();
        let count = counts.entry(scientific.clone()).or_insert(0);
        if *count == 0 {
            order.push(scientific);
        }
        *count += 1;
    }
    summary.distinct_names = order.len();
    info!(
        "Found {} rows with missing {} across {} species",
        missing.len(),
        POPULAR_NAME_COL,
        order.len()
    );

    let mut answers: HashMap<String, String> = HashMap::new();
    for scientific in &order {
        let row_count = counts.get(scientific).copied().unwrap_or(0);
        match resolver.resolve(scientific, row_count)? {
            Resolution::Provided(name) => {
                info!("Will apply '{}' to {} rows", name, row_count);
                answers.insert(scientific.clone(), name);
            }
            Resolution::Skip => summary.skipped_names += 1,
            Resolution::Abort => {
                warn!("Missing-name resolution cancelled by user");
                return Err(PipelineError::Cancelled);
            }
        }
    }

    for row in missing {
        if let Some(name) = answers.get(table.cell(row, scientific_idx)).cloned() {
            table.set_cell(row, name_idx, name);
            summary.filled_rows += 1;
        }
    }
    Ok(summary)
}

/// Resolves missing names in `table` and always writes it to `output_path`,
/// even when nothing was missing.
pub fn run_resolve_missing_names(
    table: &mut Table,
    output_path: &Path,
    delimiter: u8,
    resolver: &mut dyn NameResolver,
) -> Result<ResolveSummary> {
    let summary = resolve_missing_names(table, resolver)?;
    table.write_delimited(output_path, delimiter)?;
    info!(
        "Saved {} popular-name changes to {}",
        summary.filled_rows,
        output_path.display()
    );
    Ok(summary)
}
