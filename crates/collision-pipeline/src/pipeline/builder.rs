//! Pipeline orchestration: fetch, normalize and clean in sequence.
//!
//! This module provides the `Pipeline` struct and its builder. Each stage
//! can be skipped; the stages that run are timed and their reports are
//! collected in a [`PipelineRunReport`].

use crate::cleaner::Cleaner;
use crate::config::{ConfigValidationError, PipelineConfig};
use crate::context::RunContext;
use crate::error::Result;
use crate::fetcher::{BatchFetcher, RecordSource};
use crate::normalizer::Normalizer;
use crate::pipeline::progress::{
    ClosureProgressReporter, PipelineStage, ProgressReporter, ProgressUpdate,
};
use crate::types::{NormalizeOutcome, PipelineRunReport};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Which stages a run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSelection {
    pub fetch: bool,
    pub normalize: bool,
    pub clean: bool,
}

impl StageSelection {
    pub fn all() -> Self {
        Self {
            fetch: true,
            normalize: true,
            clean: true,
        }
    }

    /// Normalize and clean what is already on disk.
    pub fn offline() -> Self {
        Self {
            fetch: false,
            ..Self::all()
        }
    }
}

impl Default for StageSelection {
    fn default() -> Self {
        Self::all()
    }
}

/// The collision data pipeline.
///
/// Use [`Pipeline::builder()`] to create a new pipeline with custom configuration.
///
/// # Example
///
/// ```rust,ignore
/// use collision_pipeline::{Pipeline, PipelineConfig, StageSelection};
///
/// let report = Pipeline::builder()
///     .config(PipelineConfig::builder().batch_size(10_000).build()?)
///     .on_progress(|update| {
///         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
///     })
///     .build()?
///     .run(StageSelection::all())?;
///
/// println!("Pipeline ran in {} seconds", report.total_secs);
/// ```
pub struct Pipeline {
    config: PipelineConfig,
    source: Option<Arc<dyn RecordSource>>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
    run_context: Option<RunContext>,
}

// Runs are often driven from a background thread.
static_assertions::assert_impl_all!(Pipeline: Send, Sync);

impl Pipeline {
    /// Create a new pipeline builder.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the selected stages in order.
    ///
    /// When normalization runs and finds no data, cleaning is skipped for
    /// this run.
    ///
    /// # Errors
    ///
    /// Returns the first stage-aborting error. Window and decode failures
    /// are reported in the stage reports instead.
    pub fn run(&self, stages: StageSelection) -> Result<PipelineRunReport> {
        match self.run_internal(stages) {
            Ok(report) => {
                self.report_progress(ProgressUpdate::complete(format!(
                    "Pipeline completed in {:.2} seconds",
                    report.total_secs
                )));
                Ok(report)
            }
            Err(e) => {
                self.report_progress(ProgressUpdate::failed(e.to_string()));
                error!("Pipeline error: {}", e);
                Err(e)
            }
        }
    }

    fn report_progress(&self, update: ProgressUpdate) {
        if let Some(reporter) = &self.progress_reporter {
            reporter.report(update);
        }
    }

    fn run_internal(&self, stages: StageSelection) -> Result<PipelineRunReport> {
        let start_time = Instant::now();
        let ctx = self
            .run_context
            .clone()
            .unwrap_or_else(|| RunContext::from_config(&self.config));

        info!(
            "Starting pipeline run {} (raw: {}, parsed: {}, cleaned: {})",
            ctx.stamp(),
            ctx.raw_dir().display(),
            ctx.parsed_dir().display(),
            ctx.cleaned_dir().display()
        );
        self.report_progress(ProgressUpdate::new(
            PipelineStage::Initializing,
            1.0,
            "Run context resolved",
        ));

        let mut report = PipelineRunReport {
            started_at: ctx.started_at().to_rfc3339(),
            download_secs: None,
            parse_secs: None,
            clean_secs: None,
            total_secs: 0.0,
            fetch: None,
            normalize: None,
            clean: None,
        };

        // Step 1: Download
        if stages.fetch {
            info!("Starting download step");
            self.report_progress(ProgressUpdate::new(
                PipelineStage::Fetching,
                0.0,
                "Downloading batches...",
            ));
            let step_start = Instant::now();

            let mut fetcher = BatchFetcher::new(self.resolve_source()?, &self.config);
            if let Some(reporter) = &self.progress_reporter {
                fetcher = fetcher.with_progress_reporter(reporter.clone());
            }
            let fetch = fetcher.fetch_all(&ctx)?;

            let secs = step_start.elapsed().as_secs_f64();
            info!("Download completed in {:.2} seconds", secs);
            report.download_secs = Some(secs);
            report.fetch = Some(fetch);
        }

        // Step 2: Normalize
        let mut has_data = true;
        if stages.normalize {
            info!("Starting parsing step");
            self.report_progress(ProgressUpdate::new(
                PipelineStage::Normalizing,
                0.0,
                "Normalizing raw batches...",
            ));
            let step_start = Instant::now();

            let outcome = Normalizer::new(self.config.data_format).run(&ctx)?;
            has_data = outcome.is_written();

            let secs = step_start.elapsed().as_secs_f64();
            info!("Parsing completed in {:.2} seconds", secs);
            self.report_progress(ProgressUpdate::new(
                PipelineStage::Normalizing,
                1.0,
                match &outcome {
                    NormalizeOutcome::Written(r) => format!("Normalized {} rows", r.rows),
                    NormalizeOutcome::NoData { .. } => "No records to normalize".to_string(),
                },
            ));
            report.parse_secs = Some(secs);
            report.normalize = Some(outcome);
        }

        // Step 3: Clean
        if stages.clean {
            if has_data {
                info!("Starting cleaning step");
                self.report_progress(ProgressUpdate::new(
                    PipelineStage::Cleaning,
                    0.0,
                    "Cleaning normalized table...",
                ));
                let step_start = Instant::now();

                let clean = Cleaner::from_config(&self.config).run(&ctx)?;

                let secs = step_start.elapsed().as_secs_f64();
                info!("Cleaning completed in {:.2} seconds", secs);
                self.report_progress(ProgressUpdate::new(
                    PipelineStage::Cleaning,
                    1.0,
                    format!("Kept {} of {} rows", clean.rows_after, clean.rows_before),
                ));
                report.clean_secs = Some(secs);
                report.clean = Some(clean);
            } else {
                warn!("Skipping cleaning step: no normalized data in this run");
            }
        }

        report.total_secs = start_time.elapsed().as_secs_f64();
        info!("Pipeline completed in {:.2} seconds", report.total_secs);
        Ok(report)
    }

    fn resolve_source(&self) -> Result<Arc<dyn RecordSource>> {
        if let Some(source) = &self.source {
            return Ok(source.clone());
        }
        default_source(&self.config)
    }
}

#[cfg(feature = "http")]
fn default_source(config: &PipelineConfig) -> Result<Arc<dyn RecordSource>> {
    Ok(Arc::new(crate::fetcher::HttpRecordSource::new(config)?))
}

#[cfg(not(feature = "http"))]
fn default_source(_config: &PipelineConfig) -> Result<Arc<dyn RecordSource>> {
    Err(crate::error::PipelineError::InvalidConfig(
        "no record source configured and the `http` feature is disabled".to_string(),
    ))
}

/// Builder for creating a [`Pipeline`] with custom configuration.
#[derive(Default)]
pub struct PipelineBuilder {
    config: Option<PipelineConfig>,
    source: Option<Arc<dyn RecordSource>>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
    run_context: Option<RunContext>,
}

static_assertions::assert_impl_all!(PipelineBuilder: Send);

impl PipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the record source used by the fetch stage.
    ///
    /// Without one, the fetch stage talks to the configured Socrata
    /// endpoints over HTTP.
    pub fn source(mut self, source: Arc<dyn RecordSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Set a progress reporter for receiving updates during the run.
    pub fn progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress_reporter = Some(reporter);
        self
    }

    /// Set a progress callback closure.
    ///
    /// This is a convenience method for simple progress handling.
    /// For more complex scenarios, use [`progress_reporter`](Self::progress_reporter).
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        self.progress_reporter = Some(Arc::new(ClosureProgressReporter::new(callback)));
        self
    }

    /// Use a fixed run context (timestamp and directories) instead of one
    /// derived from the configuration at run time.
    pub fn run_context(mut self, ctx: RunContext) -> Self {
        self.run_context = Some(ctx);
        self
    }

    /// Build the pipeline.
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> std::result::Result<Pipeline, ConfigValidationError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        Ok(Pipeline {
            config,
            source: self.source,
            progress_reporter: self.progress_reporter,
            run_context: self.run_context,
        })
    }
}
