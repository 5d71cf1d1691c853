//! Batch fetcher: concurrent download of the source in offset windows.
//!
//! A fetch run:
//! 1. Resets the raw directory (everything in it is deleted)
//! 2. Discovers the record count, unless one was supplied
//! 3. Partitions the count into windows of `batch_size`
//! 4. Streams every window to its own file on a bounded worker pool
//! 5. Writes a manifest listing the windows that succeeded
//!
//! A failed window is logged and left out of the manifest; it never fails
//! the run. Re-run the fetcher to fill the gaps.

mod pool;
mod source;
mod window;

pub use source::{RecordSource, parse_count_body};
pub use window::{BatchWindow, partition};

#[cfg(feature = "http")]
pub use source::HttpRecordSource;

use crate::config::{DataFormat, PipelineConfig};
use crate::context::RunContext;
use crate::error::{PipelineError, Result, ResultExt};
use crate::pipeline::progress::{PipelineStage, ProgressReporter, ProgressUpdate};
use crate::types::{FetchReport, Manifest, WindowFailure};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Base delay between retry attempts of a window; grows linearly.
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Downloads the source into raw batch files.
pub struct BatchFetcher {
    source: Arc<dyn RecordSource>,
    format: DataFormat,
    batch_size: u64,
    concurrency: usize,
    total_records: Option<u64>,
    max_retries: u32,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
}

impl BatchFetcher {
    pub fn new(source: Arc<dyn RecordSource>, config: &PipelineConfig) -> Self {
        Self {
            source,
            format: config.data_format,
            batch_size: config.batch_size,
            concurrency: config.concurrency,
            total_records: config.total_records,
            max_retries: config.max_retries,
            progress_reporter: None,
        }
    }

    /// Receive a progress update each time a window completes.
    pub fn with_progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress_reporter = Some(reporter);
        self
    }

    /// Run the fetch.
    ///
    /// **Destructive:** the raw directory of `ctx` is deleted and recreated
    /// before anything is downloaded.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Discovery`] if the record count cannot be
    /// obtained, or an I/O error if the raw directory or the manifest cannot
    /// be written. Window failures are reported in [`FetchReport::failures`].
    pub fn fetch_all(&self, ctx: &RunContext) -> Result<FetchReport> {
        if self.batch_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "batch size must be at least 1".to_string(),
            ));
        }

        reset_dir(ctx.raw_dir())?;

        let total_records = match self.total_records {
            Some(total) => {
                debug!("Using supplied record count: {}", total);
                total
            }
            None => self.source.count_records()?,
        };
        info!("Total records to download: {}", total_records);

        let windows = partition(total_records, self.batch_size);
        let windows_total = windows.len();
        info!(
            "Fetching {} windows of up to {} records with {} workers",
            windows_total, self.batch_size, self.concurrency
        );

        let mut written: Vec<(usize, PathBuf)> = Vec::with_capacity(windows_total);
        let mut failures: Vec<WindowFailure> = Vec::new();
        let mut completed = 0usize;

        pool::run_pool(
            windows,
            self.concurrency,
            |window| {
                let outcome = self.fetch_window_with_retries(&window, ctx);
                (window, outcome)
            },
            |(window, outcome)| {
                completed += 1;
                match outcome {
                    Ok(path) => {
                        debug!("Saved window {} to {}", window.index, path.display());
                        written.push((window.index, path));
                    }
                    Err(e) => {
                        let reason = match e {
                            PipelineError::WindowFetch { reason, .. } => reason,
                            other => other.to_string(),
                        };
                        let failure = WindowFailure {
                            index: window.index,
                            offset: window.offset,
                            reason,
                        };
                        warn!("{}", PipelineError::from(&failure));
                        failures.push(failure);
                    }
                }
                self.report_progress(
                    ProgressUpdate::counted(
                        PipelineStage::Fetching,
                        completed,
                        windows_total,
                        format!("Downloaded {completed}/{windows_total} batches"),
                    )
                    .with_detail(format!("Window {}", window.index)),
                );
            },
        );

        written.sort_by_key(|(index, _)| *index);
        failures.sort_by_key(|f| f.index);

        let manifest = Manifest {
            source_url: self.source.source_url().to_string(),
            download_date: ctx.stamp(),
            format: self.format.extension().to_string(),
            total_records,
            batch_size: self.batch_size,
            batch_files: written
                .iter()
                .map(|(_, path)| path.to_string_lossy().into_owned())
                .collect(),
            successful_batches: written.len(),
        };

        let manifest_path = ctx.manifest_path();
        write_manifest(&manifest, &manifest_path)?;

        info!(
            "Download complete: {} of {} batches. Metadata saved to {}",
            manifest.successful_batches,
            windows_total,
            manifest_path.display()
        );
        if !failures.is_empty() {
            warn!(
                "{} windows failed; re-run the fetch to retrieve them",
                failures.len()
            );
        }

        Ok(FetchReport {
            manifest,
            manifest_path,
            windows_total,
            failures,
        })
    }

    fn fetch_window_with_retries(&self, window: &BatchWindow, ctx: &RunContext) -> Result<PathBuf> {
        let mut attempt = 0u32;
        loop {
            match self.fetch_window(window, ctx) {
                Ok(path) => return Ok(path),
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        "Window {} attempt {} failed: {}; retrying",
                        window.index, attempt, e
                    );
                    thread::sleep(RETRY_BACKOFF * attempt);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Stream one window to its batch file. A partial file is removed on error.
    fn fetch_window(&self, window: &BatchWindow, ctx: &RunContext) -> Result<PathBuf> {
        let path = ctx.batch_path(window.index, self.format.extension());

        let result = self
            .source
            .open_window(window)
            .and_then(|mut body| stream_to_file(&mut body, &path));

        match result {
            Ok(bytes) => {
                debug!("Window {}: {} bytes", window.index, bytes);
                Ok(path)
            }
            Err(e) => {
                if path.exists() {
                    let _ = fs::remove_file(&path);
                }
                Err(e)
            }
        }
    }

    fn report_progress(&self, update: ProgressUpdate) {
        if let Some(reporter) = &self.progress_reporter {
            reporter.report(update);
        }
    }
}

/// Delete and recreate a directory.
fn reset_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir).context(format!("Clearing {}", dir.display()))?;
    }
    fs::create_dir_all(dir).context(format!("Creating {}", dir.display()))?;
    Ok(())
}

/// Copy a body to `path` in chunks, without holding it in memory.
fn stream_to_file(body: &mut dyn std::io::Read, path: &Path) -> Result<u64> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    let bytes = std::io::copy(body, &mut writer)?;
    writer.flush()?;
    Ok(bytes)
}

fn write_manifest(manifest: &Manifest, path: &Path) -> Result<()> {
    let file = File::create(path).context(format!("Writing {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, manifest)?;
    writer.flush()?;
    Ok(())
}
