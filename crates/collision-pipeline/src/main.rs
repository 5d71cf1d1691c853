//! CLI entry point for the collision pipeline.

use anyhow::{Result, anyhow};
use chrono::NaiveDate;
use clap::{Parser, ValueEnum};
use collision_pipeline::{
    DataFormat, NormalizeOutcome, Pipeline, PipelineConfig, PipelineRunReport, StageSelection,
};
use dotenv::dotenv;
use std::env;
use std::path::PathBuf;
use tracing::{info, warn};

/// Environment variable holding the Socrata application token.
const APP_TOKEN_VAR: &str = "SOCRATA_APP_TOKEN";

/// CLI-compatible data format enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliFormat {
    /// JSON array per batch
    Json,
    /// CSV with a header row per batch
    Csv,
}

impl From<CliFormat> for DataFormat {
    fn from(cli: CliFormat) -> Self {
        match cli {
            CliFormat::Json => DataFormat::Json,
            CliFormat::Csv => DataFormat::Csv,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    version,
    about = "NYC motor vehicle collisions: download, normalize and clean",
    long_about = "Downloads the NYC Open Data motor vehicle collisions dataset in parallel \
                  batches, merges the batches into one Parquet table and cleans it.\n\n\
                  ENVIRONMENT VARIABLES:\n  \
                  SOCRATA_APP_TOKEN    Application token sent with every request (optional)\n  \
                  RUST_LOG             Log filter; overrides --log-level\n\n\
                  EXAMPLES:\n  \
                  # Full run with defaults\n  \
                  collision-pipeline\n\n  \
                  # Re-process what is already on disk\n  \
                  collision-pipeline --skip-download\n\n  \
                  # Small smoke test\n  \
                  collision-pipeline --total-records 1000 --batch-size 250 --data-dir /tmp/nyc"
)]
struct Args {
    /// Format requested from the source
    #[arg(long, value_enum, default_value = "json")]
    format: CliFormat,

    /// Records per batch
    #[arg(long, default_value_t = collision_pipeline::config::DEFAULT_BATCH_SIZE)]
    batch_size: u64,

    /// Batches downloaded in parallel
    #[arg(long, default_value_t = collision_pipeline::config::DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// Data root; raw/, parsed/ and cleaned/ are created below it
    #[arg(long, default_value = collision_pipeline::config::DEFAULT_DATA_DIR)]
    data_dir: PathBuf,

    /// Directory for raw batches (cleared on every download)
    #[arg(long)]
    raw_dir: Option<PathBuf>,

    /// Directory for the normalized table
    #[arg(long)]
    parsed_dir: Option<PathBuf>,

    /// Directory for the cleaned table
    #[arg(long)]
    cleaned_dir: Option<PathBuf>,

    /// Use this record count instead of querying the source
    #[arg(long)]
    total_records: Option<u64>,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = collision_pipeline::config::DEFAULT_TIMEOUT_SECS)]
    timeout_secs: u64,

    /// Extra attempts per failed batch
    #[arg(long, default_value = "0")]
    max_retries: u32,

    /// Alternative Socrata resource (without extension)
    #[arg(long)]
    base_url: Option<String>,

    /// First crash date kept by the cleaner (YYYY-MM-DD)
    #[arg(long)]
    start_date: Option<NaiveDate>,

    /// Last crash date kept by the cleaner (YYYY-MM-DD)
    #[arg(long)]
    end_date: Option<NaiveDate>,

    /// Skip the download step
    #[arg(long)]
    skip_download: bool,

    /// Skip the normalization step
    #[arg(long)]
    skip_parse: bool,

    /// Skip the cleaning step
    #[arg(long)]
    skip_clean: bool,

    /// Verbose logging (same as --log-level debug)
    #[arg(long)]
    debug: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Only show warnings and errors
    #[arg(short, long)]
    quiet: bool,

    /// Print the run report as JSON instead of a summary
    ///
    /// Disables all logs so stdout only contains the report.
    #[arg(long)]
    json: bool,
}

/// Initialize the tracing subscriber for logging.
///
/// When `json_output` is true, logging is completely disabled to ensure
/// only JSON is written to stdout.
fn init_logging(level: &str, debug: bool, quiet: bool, json_output: bool) {
    if json_output {
        return;
    }

    use tracing_subscriber::EnvFilter;

    let effective_level = if debug {
        "debug"
    } else if quiet {
        "warn"
    } else {
        level
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Load environment variables from .env file
    dotenv().ok();

    let config = build_config(&args)?;
    init_logging(&args.log_level, config.debug_mode, args.quiet, args.json);
    let stages = StageSelection {
        fetch: !args.skip_download,
        normalize: !args.skip_parse,
        clean: !args.skip_clean,
    };

    info!(
        "Pipeline initialized with raw_dir={}, parsed_dir={}, cleaned_dir={}",
        config.raw_dir.display(),
        config.parsed_dir.display(),
        config.cleaned_dir.display()
    );

    let report = Pipeline::builder().config(config).build()?.run(stages)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }

    Ok(())
}

fn build_config(args: &Args) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .data_format(args.format.into())
        .batch_size(args.batch_size)
        .concurrency(args.concurrency)
        .debug_mode(args.debug)
        .request_timeout_secs(args.timeout_secs)
        .max_retries(args.max_retries)
        .data_dir(&args.data_dir);

    if let Some(ref dir) = args.raw_dir {
        builder = builder.raw_dir(dir);
    }
    if let Some(ref dir) = args.parsed_dir {
        builder = builder.parsed_dir(dir);
    }
    if let Some(ref dir) = args.cleaned_dir {
        builder = builder.cleaned_dir(dir);
    }
    if let Some(total) = args.total_records {
        builder = builder.total_records(total);
    }
    if let Some(ref url) = args.base_url {
        builder = builder.base_url(url);
    }

    match (args.start_date, args.end_date) {
        (None, None) => {}
        (start, end) => {
            let default = collision_pipeline::config::DateWindow::default();
            builder = builder.date_window(
                start.unwrap_or(default.start),
                end.unwrap_or(default.end),
            );
        }
    }

    match env::var(APP_TOKEN_VAR) {
        Ok(token) if !token.trim().is_empty() => builder = builder.app_token(token.trim()),
        _ => {}
    }

    builder.build().map_err(|e| anyhow!("Invalid configuration: {}", e))
}

/// Print a short human-readable summary of the run.
fn print_summary(report: &PipelineRunReport) {
    if let Some(fetch) = &report.fetch {
        println!(
            "Downloaded {}/{} batches ({} records) in {:.2}s",
            fetch.manifest.successful_batches,
            fetch.windows_total,
            fetch.manifest.total_records,
            report.download_secs.unwrap_or_default()
        );
        if !fetch.is_complete() {
            warn!(
                "{} batches failed; re-run the download to fetch them",
                fetch.failures.len()
            );
        }
    }

    match &report.normalize {
        Some(NormalizeOutcome::Written(n)) => println!(
            "Normalized {} rows x {} columns into {}",
            n.rows,
            n.columns,
            n.output_path.display()
        ),
        Some(NormalizeOutcome::NoData { files_seen, .. }) => {
            println!("No records decoded from {} batch files", files_seen)
        }
        None => {}
    }

    if let Some(clean) = &report.clean {
        println!(
            "Cleaned table has {} rows ({} removed)",
            clean.rows_after,
            clean.rows_removed()
        );
    }

    println!("Pipeline ran in {:.2} seconds", report.total_secs);
}
