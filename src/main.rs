use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};

use artsdata_pipeline::config::Config;
use artsdata_pipeline::error::PipelineError;
use artsdata_pipeline::infra::http_client::{ArtskartHttp, NorTaxaHttp};
use artsdata_pipeline::logging::init_logging;
use artsdata_pipeline::pipeline::missing_names::TerminalResolver;
use artsdata_pipeline::pipeline::{Orchestrator, PipelineReport};
use artsdata_pipeline::report::{default_report_path, write_report};

#[derive(Parser)]
#[command(name = "artsdata")]
#[command(about = "Criteria merge and taxonomy enrichment for species-observation exports")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline on a raw export
    Run(RunArgs),
    /// List the distinct values of every column in a CSV file as Markdown
    Report {
        /// Semicolon-separated file to inspect
        input: PathBuf,
        /// Markdown file to write (default: <stem>_values.md beside the input)
        #[arg(long)]
        output: Option<PathBuf>,
        /// Config file (default: artsdata.toml if present)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Raw observation export (semicolon-separated)
    input: PathBuf,
    /// Criteria reference spreadsheet
    #[arg(long)]
    reference: Option<PathBuf>,
    /// Directory for cleaned and merged files
    #[arg(long)]
    intermediate_dir: Option<PathBuf>,
    /// Directory for the enriched output
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Do not prompt for missing popular names
    #[arg(long)]
    skip_missing_names: bool,
    /// Fill missing popular names from Artskart before prompting
    #[arg(long)]
    fill_names_remote: bool,
    /// Delete the cleaned and names-filled files after a successful run
    #[arg(long)]
    discard_intermediate: bool,
    /// Config file (default: artsdata.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,
    /// NorTaxa TaxonName base URL
    #[arg(long)]
    taxonomy_url: Option<String>,
}

impl RunArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(reference) = &self.reference {
            config.io.reference_path = reference.clone();
        }
        if let Some(dir) = &self.intermediate_dir {
            config.io.intermediate_dir = dir.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.io.final_dir = dir.clone();
        }
        if let Some(url) = &self.taxonomy_url {
            config.taxonomy.base_url = url.clone();
        }
        config.resolver.skip |= self.skip_missing_names;
        config.resolver.remote_fill |= self.fill_names_remote;
        config.io.discard_intermediate |= self.discard_intermediate;
    }
}

async fn run_pipeline(args: &RunArgs, config: Config) -> Result<PipelineReport, PipelineError> {
    if !args.input.exists() {
        return Err(PipelineError::Config(format!(
            "input file '{}' does not exist",
            args.input.display()
        )));
    }

    let taxa = Arc::new(NorTaxaHttp::new(&config.taxonomy)?);
    let artskart = Arc::new(ArtskartHttp::new(&config.artskart)?);
    let mut orchestrator = Orchestrator::new(config, taxa)
        .with_popular_names(artskart)
        .with_resolver(Box::new(TerminalResolver::stdin()));

    orchestrator.run(&args.input).await
}

fn print_report(report: &PipelineReport) {
    let elapsed = report.finished_at - report.started_at;
    eprintln!("\n📊 Pipeline results:");
    if let Some(resolve) = &report.resolve {
        eprintln!("   Popular names filled: {} of {}", resolve.filled_rows, resolve.missing_rows);
    }
    eprintln!("   Rows: {}", report.clean.rows);
    eprintln!("   Columns dropped: {}", report.clean.dropped_columns.len());
    eprintln!(
        "   Criteria: {} matched, {} higher rank, {} unmatched",
        report.merge.matched, report.merge.rank_excluded, report.merge.unmatched
    );
    eprintln!(
        "   Taxa resolved: {} of {} ({} requests)",
        report.enrich.resolved_ids, report.enrich.distinct_ids, report.enrich.requests
    );
    if let Some(log) = &report.unmatched_log {
        eprintln!("   Unmatched log: {}", log.display());
    }
    eprintln!("   Elapsed: {:.1}s", elapsed.num_milliseconds() as f64 / 1000.0);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => {
            let mut config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
            args.apply(&mut config);
            let guard = init_logging(&config.io.log_dir);

            let code = match run_pipeline(&args, config).await {
                Ok(report) => {
                    print_report(&report);
                    println!("{}", report.final_path.display());
                    0
                }
                Err(e) if e.is_cancelled() => {
                    eprintln!("⚠️  {}", e);
                    130
                }
                Err(e) => {
                    error!("Pipeline failed: {}", e);
                    eprintln!("❌ {}", e);
                    1
                }
            };
            // Flush the file log before exiting.
            drop(guard);
            if code != 0 {
                process::exit(code);
            }
        }
        Commands::Report { input, output, config } => {
            let config = Config::load(config.as_deref()).context("Failed to load configuration")?;
            let _guard = init_logging(&config.io.log_dir);
            let delimiter = config.io.delimiter_byte()?;
            let output = output.unwrap_or_else(|| default_report_path(&input));
            let written = write_report(&input, &output, delimiter)
                .with_context(|| format!("Failed to write report for {}", input.display()))?;
            info!("Report complete");
            println!("{}", written.display());
        }
    }
    Ok(())
}
