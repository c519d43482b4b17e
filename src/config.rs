use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::*;
use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub io: IoConfig,
    pub criteria: CriteriaConfig,
    pub taxonomy: ServiceConfig,
    pub artskart: ServiceConfig,
    pub resolver: ResolverConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IoConfig {
    pub delimiter: char,
    pub reference_path: PathBuf,
    pub intermediate_dir: PathBuf,
    pub final_dir: PathBuf,
    pub log_dir: PathBuf,
    pub discard_intermediate: bool,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER,
            reference_path: PathBuf::from(DEFAULT_REFERENCE_PATH),
            intermediate_dir: PathBuf::from(DEFAULT_INTERMEDIATE_DIR),
            final_dir: PathBuf::from(DEFAULT_FINAL_DIR),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            discard_intermediate: false,
        }
    }
}

impl IoConfig {
    pub fn delimiter_byte(&self) -> Result<u8> {
        u8::try_from(self.delimiter)
            .ok()
            .filter(|b| b.is_ascii())
            .ok_or_else(|| {
                PipelineError::Config(format!("delimiter '{}' must be a single ASCII character", self.delimiter))
            })
    }
}

/// Layout of the criteria spreadsheet.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CriteriaConfig {
    pub id_column: String,
    pub prefix: String,
    pub start_column: usize,
    pub marked_token: String,
    /// Sheet to read; the first sheet when unset.
    pub sheet: Option<String>,
    /// Criterion column names that must be present. Empty means "whatever the prefix finds".
    pub expected: Vec<String>,
}

impl Default for CriteriaConfig {
    fn default() -> Self {
        Self {
            id_column: REFERENCE_ID_COL.to_string(),
            prefix: CRITERIA_PREFIX.to_string(),
            start_column: CRITERIA_START_COLUMN,
            marked_token: MARKED_TOKEN.to_string(),
            sheet: None,
            expected: Vec::new(),
        }
    }
}

/// A remote lookup service. `base_url` is required once the section is written out.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub base_url: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_timeout_seconds() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

impl ServiceConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Do not prompt for missing names. The remote fill still runs when enabled.
    pub skip: bool,
    /// Try the Artskart API before prompting.
    pub remote_fill: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            io: IoConfig::default(),
            criteria: CriteriaConfig::default(),
            taxonomy: ServiceConfig::new(NORTAXA_API_BASE_URL),
            artskart: ServiceConfig::new(ARTSKART_API_BASE_URL),
            resolver: ResolverConfig::default(),
        }
    }
}

impl Config {
    /// Loads `path`, or `artsdata.toml` when present, or the built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("NORTAXA_BASE_URL") {
            self.taxonomy.base_url = url;
        }
        if let Ok(url) = std::env::var("ARTSKART_BASE_URL") {
            self.artskart.base_url = url;
        }
    }
}
