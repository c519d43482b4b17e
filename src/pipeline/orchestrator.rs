//! Runs the stages in order over files:
//! raw -> names filled -> cleaned -> criteria merged -> taxonomy enriched.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, info_span, instrument, warn, Instrument};

use crate::app::ports::{PopularNameSource, TaxonSource};
use crate::config::Config;
use crate::constants::{CLEANED_SUFFIX, ENRICHED_SUFFIX, MERGED_SUFFIX, NAMES_FILLED_SUFFIX};
use crate::error::{PipelineError, Result, Stage};
use crate::metrics::{time_stage, StageMetrics};
use crate::pipeline::clean::{run_clean, CleanSummary};
use crate::pipeline::criteria::{run_criteria_merge, CriteriaSchema, MergeSummary};
use crate::pipeline::missing_names::{run_resolve_missing_names, NameResolver, ResolveSummary};
use crate::pipeline::popular_names::fill_missing_popular_names;
use crate::pipeline::taxonomy::{run_taxonomy_enrich, EnrichSummary};
use crate::table::Table;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    MissingValuesResolved,
    Start,
    Cleaned,
    CriteriaMerged,
    TaxonomyEnriched,
    Done,
    Aborted,
}

#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub final_path: PathBuf,
    pub merged_path: PathBuf,
    pub unmatched_log: Option<PathBuf>,
    /// `None` once discarded.
    pub cleaned_path: Option<PathBuf>,
    pub names_filled_path: Option<PathBuf>,
    pub resolve: Option<ResolveSummary>,
    pub clean: CleanSummary,
    pub merge: MergeSummary,
    pub enrich: EnrichSummary,
    pub history: Vec<PipelineState>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

pub struct Orchestrator {
    config: Config,
    taxon_source: Arc<dyn TaxonSource>,
    popular_names: Option<Arc<dyn PopularNameSource>>,
    resolver: Option<Box<dyn NameResolver>>,
    history: Vec<PipelineState>,
}

impl Orchestrator {
    /// Without [`Orchestrator::with_resolver`] nobody is asked for missing names and the
    /// resolve stage only runs for a remote popular-name fill.
    pub fn new(config: Config, taxon_source: Arc<dyn TaxonSource>) -> Self {
        Self {
            config,
            taxon_source,
            popular_names: None,
            resolver: None,
            history: Vec::new(),
        }
    }

    pub fn with_resolver(mut self, resolver: Box<dyn NameResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Only consulted when `[resolver] remote_fill` is set, even if prompting is skipped.
    pub fn with_popular_names(mut self, source: Arc<dyn PopularNameSource>) -> Self {
        self.popular_names = Some(source);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// States entered during the last run, ending in `Done` or `Aborted`.
    pub fn history(&self) -> &[PipelineState] {
        &self.history
    }

    #[instrument(skip(self, input), fields(input = %input.display()))]
    pub async fn run(&mut self, input: &Path) -> Result<PipelineReport> {
        self.history.clear();
        let started_at = Utc::now();
        let (delimiter, stem) = match self.prepare(input) {
            Ok(prepared) => prepared,
            Err(e) => {
                error!("❌ Pipeline could not start: {}", e);
                self.history.push(PipelineState::Aborted);
                return Err(e);
            }
        };

        let intermediate_dir = self.config.io.intermediate_dir.clone();
        let final_dir = self.config.io.final_dir.clone();
        let artefact = |dir: &Path, suffix: &str| dir.join(format!("{}{}.csv", stem, suffix));

        info!("🚀 Starting pipeline for {}", input.display());

        let mut source_path = input.to_path_buf();
        let mut names_filled_path = None;
        let mut resolve = None;
        let prompt = !self.config.resolver.skip && self.resolver.is_some();
        let remote_fill = self.config.resolver.remote_fill;
        if remote_fill && self.popular_names.is_none() {
            warn!("Remote popular-name fill requested but no source configured");
        }
        if prompt || (remote_fill && self.popular_names.is_some()) {
            let output = artefact(&intermediate_dir, NAMES_FILLED_SUFFIX);
            let timer = time_stage(Stage::ResolveMissingNames);
            let result = self
                .resolve_names(input, &output, delimiter)
                .instrument(info_span!("stage", name = %Stage::ResolveMissingNames))
                .await;
            timer.finish();
            match result {
                Ok(summary) => {
                    resolve = Some(summary);
                    source_path = output.clone();
                    names_filled_path = Some(output);
                    self.advance(PipelineState::MissingValuesResolved);
                }
                Err(e) => return Err(self.abort(Stage::ResolveMissingNames, e)),
            }
        }
        self.advance(PipelineState::Start);

        let cleaned_path = artefact(&intermediate_dir, CLEANED_SUFFIX);
        let clean = {
            let _span = info_span!("stage", name = %Stage::Clean).entered();
            let _timer = time_stage(Stage::Clean);
            match run_clean(&source_path, &cleaned_path, delimiter) {
                Ok((_, summary)) => summary,
                Err(e) => return Err(self.abort(Stage::Clean, e)),
            }
        };
        StageMetrics::record_rows(Stage::Clean, clean.rows);
        self.advance(PipelineState::Cleaned);

        let merged_path = artefact(&intermediate_dir, MERGED_SUFFIX);
        let schema = CriteriaSchema::from(&self.config.criteria);
        let merge = {
            let _span = info_span!("stage", name = %Stage::CriteriaMerge).entered();
            let _timer = time_stage(Stage::CriteriaMerge);
            match run_criteria_merge(&cleaned_path, &self.config.io.reference_path, &merged_path, &schema, delimiter) {
                Ok(artifacts) => artifacts,
                Err(e) => return Err(self.abort(Stage::CriteriaMerge, e)),
            }
        };
        StageMetrics::record_rows(Stage::CriteriaMerge, merge.summary.rows);
        self.advance(PipelineState::CriteriaMerged);

        let final_path = artefact(&final_dir, ENRICHED_SUFFIX);
        let timer = time_stage(Stage::TaxonomyEnrich);
        let result = run_taxonomy_enrich(&merged_path, &final_path, delimiter, self.taxon_source.as_ref())
            .instrument(info_span!("stage", name = %Stage::TaxonomyEnrich))
            .await;
        timer.finish();
        let enrich = match result {
            Ok((_, summary)) => summary,
            Err(e) => return Err(self.abort(Stage::TaxonomyEnrich, e)),
        };
        StageMetrics::record_rows(Stage::TaxonomyEnrich, enrich.rows);
        self.advance(PipelineState::TaxonomyEnriched);

        let mut report = PipelineReport {
            final_path,
            merged_path,
            unmatched_log: merge.unmatched_log,
            cleaned_path: Some(cleaned_path),
            names_filled_path,
            resolve,
            clean,
            merge: merge.summary,
            enrich,
            history: Vec::new(),
            started_at,
            finished_at: started_at,
        };
        if self.config.io.discard_intermediate {
            discard_intermediate(&mut report);
        }

        self.advance(PipelineState::Done);
        report.history = self.history.clone();
        report.finished_at = Utc::now();
        info!("✅ Pipeline finished: {}", report.final_path.display());
        Ok(report)
    }

    /// Checks that fail before any stage has run.
    fn prepare(&self, input: &Path) -> Result<(u8, String)> {
        let delimiter = self.config.io.delimiter_byte()?;
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| PipelineError::Config(format!("'{}' has no file name", input.display())))?;
        fs::create_dir_all(&self.config.io.intermediate_dir)?;
        fs::create_dir_all(&self.config.io.final_dir)?;
        Ok((delimiter, stem))
    }

    async fn resolve_names(&mut self, input: &Path, output: &Path, delimiter: u8) -> Result<ResolveSummary> {
        let mut table = Table::read_delimited(input, delimiter)?;
        if self.config.resolver.remote_fill {
            if let Some(source) = &self.popular_names {
                fill_missing_popular_names(&mut table, source.as_ref()).await?;
            }
        }

        let skip_prompt = self.config.resolver.skip;
        match self.resolver.as_deref_mut() {
            Some(resolver) if !skip_prompt => run_resolve_missing_names(&mut table, output, delimiter, resolver),
            _ => {
                table.write_delimited(output, delimiter)?;
                info!("Saved remotely filled popular names to {}", output.display());
                Ok(ResolveSummary::default())
            }
        }
    }

    fn advance(&mut self, state: PipelineState) {
        info!(?state, "Pipeline state");
        self.history.push(state);
    }

    fn abort(&mut self, stage: Stage, err: PipelineError) -> PipelineError {
        StageMetrics::record_failure(stage);
        self.history.push(PipelineState::Aborted);
        if err.is_cancelled() {
            warn!("Pipeline cancelled during {}", stage);
        } else {
            error!("❌ Stage {} failed: {}", stage, err);
        }
        err.in_stage(stage)
    }
}

fn discard_intermediate(report: &mut PipelineReport) {
    for slot in [&mut report.names_filled_path, &mut report.cleaned_path] {
        if let Some(path) = slot.take() {
            match fs::remove_file(&path) {
                Ok(()) => info!("Removed intermediate file {}", path.display()),
                Err(e) => {
                    warn!("Could not remove {}: {}", path.display(), e);
                    *slot = Some(path);
                }
            }
        }
    }
}
