use std::fmt;
use thiserror::Error;

/// Pipeline stage names, used to tag stage failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ResolveMissingNames,
    Clean,
    CriteriaMerge,
    TaxonomyEnrich,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::ResolveMissingNames => "resolve_missing_names",
            Stage::Clean => "clean",
            Stage::CriteriaMerge => "criteria_merge",
            Stage::TaxonomyEnrich => "taxonomy_enrich",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing required column '{column}' in {file}")]
    MissingColumn { column: String, file: String },

    #[error("Reference schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Malformed row at line {line}: expected {expected} fields, found {found}")]
    MalformedRow {
        line: u64,
        expected: usize,
        found: usize,
    },

    #[error("Cancelled by user")]
    Cancelled,

    #[error("Stage '{stage}' failed: {reason}")]
    StageFailed {
        stage: Stage,
        #[source]
        reason: Box<PipelineError>,
    },
}

impl PipelineError {
    pub fn missing_column(column: &str, file: impl Into<String>) -> Self {
        PipelineError::MissingColumn {
            column: column.to_string(),
            file: file.into(),
        }
    }

    pub fn in_stage(self, stage: Stage) -> Self {
        PipelineError::StageFailed {
            stage,
            reason: Box::new(self),
        }
    }

    /// True when the innermost cause is a user cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            PipelineError::Cancelled => true,
            PipelineError::StageFailed { reason, .. } => reason.is_cancelled(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
