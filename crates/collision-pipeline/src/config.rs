//! Configuration types for the collision pipeline.
//!
//! This module provides configuration options using the builder pattern
//! for flexible and ergonomic pipeline setup. Defaults point at the NYC Open
//! Data "Motor Vehicle Collisions - Crashes" resource.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Base resource of the NYC motor vehicle collisions dataset.
pub const DEFAULT_BASE_URL: &str = "https://data.cityofnewyork.us/resource/h9gi-nx95";

/// Default number of records requested per window.
pub const DEFAULT_BATCH_SIZE: u64 = 50_000;

/// Default number of windows fetched in parallel.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Default per-request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Default data root; raw, parsed and cleaned directories live below it.
pub const DEFAULT_DATA_DIR: &str = "data";

/// Format of the raw batch payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DataFormat {
    /// JSON array of objects
    #[default]
    Json,
    /// CSV with a header row
    Csv,
}

impl DataFormat {
    /// File extension (and endpoint suffix) for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }
}

impl std::fmt::Display for DataFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// Endpoint URL per data format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEndpoints {
    pub json: String,
    pub csv: String,
}

impl Default for SourceEndpoints {
    fn default() -> Self {
        Self::from_base(DEFAULT_BASE_URL)
    }
}

impl SourceEndpoints {
    /// Derive both endpoints from a Socrata resource base URL.
    pub fn from_base(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            json: format!("{base}.json"),
            csv: format!("{base}.csv"),
        }
    }

    /// Endpoint for the given format.
    pub fn for_format(&self, format: DataFormat) -> &str {
        match format {
            DataFormat::Json => &self.json,
            DataFormat::Csv => &self.csv,
        }
    }
}

/// Inclusive range of crash dates kept by the cleaner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Default for DateWindow {
    fn default() -> Self {
        Self {
            start: NaiveDate::from_ymd_opt(2021, 1, 1).unwrap_or(NaiveDate::MIN),
            end: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap_or(NaiveDate::MAX),
        }
    }
}

impl DateWindow {
    /// Check whether `date` falls inside the window (both ends inclusive).
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Configuration for the collision pipeline.
///
/// Use [`PipelineConfig::builder()`] to create a new configuration
/// with fluent API.
///
/// # Example
///
/// ```rust,ignore
/// use collision_pipeline::config::{DataFormat, PipelineConfig};
///
/// let config = PipelineConfig::builder()
///     .data_format(DataFormat::Json)
///     .batch_size(10_000)
///     .concurrency(8)
///     .build()?;
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Format requested from the source and expected by the normalizer.
    /// Default: Json
    pub data_format: DataFormat,

    /// Number of records per window.
    /// Default: 50000
    pub batch_size: u64,

    /// Number of windows fetched in parallel.
    /// Default: 4
    pub concurrency: usize,

    /// Enables verbose logging in the CLI.
    /// Default: false
    pub debug_mode: bool,

    /// Source endpoints per format.
    pub endpoints: SourceEndpoints,

    /// Skip count discovery and use this total instead.
    /// Default: None
    pub total_records: Option<u64>,

    /// Per-request timeout in seconds. Expiry counts as a window failure.
    /// Default: 300
    pub request_timeout_secs: u64,

    /// Extra attempts for a failed window. Zero keeps the single-attempt
    /// behavior where gaps are only filled by re-running the fetcher.
    /// Default: 0
    pub max_retries: u32,

    /// Optional Socrata application token sent as `X-App-Token`.
    /// Default: None
    pub app_token: Option<String>,

    /// Directory for raw batch files and the manifest. Cleared on every fetch.
    /// Default: "data/raw"
    pub raw_dir: PathBuf,

    /// Directory for the normalized table.
    /// Default: "data/parsed"
    pub parsed_dir: PathBuf,

    /// Directory for the cleaned table.
    /// Default: "data/cleaned"
    pub cleaned_dir: PathBuf,

    /// Crash dates kept by the cleaner.
    /// Default: 2021-01-01 ..= 2024-12-31
    pub date_window: DateWindow,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let data_dir = PathBuf::from(DEFAULT_DATA_DIR);
        Self {
            data_format: DataFormat::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            debug_mode: false,
            endpoints: SourceEndpoints::default(),
            total_records: None,
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_retries: 0,
            app_token: None,
            raw_dir: data_dir.join("raw"),
            parsed_dir: data_dir.join("parsed"),
            cleaned_dir: data_dir.join("cleaned"),
            date_window: DateWindow::default(),
        }
    }
}

impl PipelineConfig {
    /// Create a new configuration builder.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Endpoint used for paginated window requests.
    pub fn data_url(&self) -> &str {
        self.endpoints.for_format(self.data_format)
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.batch_size == 0 {
            return Err(ConfigValidationError::InvalidBatchSize);
        }

        if self.concurrency == 0 {
            return Err(ConfigValidationError::InvalidConcurrency);
        }

        if self.request_timeout_secs == 0 {
            return Err(ConfigValidationError::InvalidTimeout);
        }

        if self.date_window.start > self.date_window.end {
            return Err(ConfigValidationError::InvalidDateWindow {
                start: self.date_window.start,
                end: self.date_window.end,
            });
        }

        Ok(())
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid batch size: must be at least 1")]
    InvalidBatchSize,

    #[error("Invalid concurrency: must be at least 1")]
    InvalidConcurrency,

    #[error("Invalid request timeout: must be at least 1 second")]
    InvalidTimeout,

    #[error("Invalid date window: {start} is after {end}")]
    InvalidDateWindow { start: NaiveDate, end: NaiveDate },
}

impl From<ConfigValidationError> for crate::error::PipelineError {
    fn from(err: ConfigValidationError) -> Self {
        crate::error::PipelineError::InvalidConfig(err.to_string())
    }
}

/// Builder for [`PipelineConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    data_format: Option<DataFormat>,
    batch_size: Option<u64>,
    concurrency: Option<usize>,
    debug_mode: Option<bool>,
    endpoints: Option<SourceEndpoints>,
    total_records: Option<u64>,
    request_timeout_secs: Option<u64>,
    max_retries: Option<u32>,
    app_token: Option<String>,
    data_dir: Option<PathBuf>,
    raw_dir: Option<PathBuf>,
    parsed_dir: Option<PathBuf>,
    cleaned_dir: Option<PathBuf>,
    date_window: Option<DateWindow>,
}

impl PipelineConfigBuilder {
    /// Set the raw data format.
    pub fn data_format(mut self, format: DataFormat) -> Self {
        self.data_format = Some(format);
        self
    }

    /// Set the number of records per window.
    pub fn batch_size(mut self, size: u64) -> Self {
        self.batch_size = Some(size);
        self
    }

    /// Set the number of parallel window downloads.
    pub fn concurrency(mut self, workers: usize) -> Self {
        self.concurrency = Some(workers);
        self
    }

    /// Enable or disable debug mode.
    pub fn debug_mode(mut self, debug: bool) -> Self {
        self.debug_mode = Some(debug);
        self
    }

    /// Use a different Socrata resource (e.g. a mirror or a test server).
    pub fn base_url(mut self, base_url: impl AsRef<str>) -> Self {
        self.endpoints = Some(SourceEndpoints::from_base(base_url.as_ref()));
        self
    }

    /// Set both endpoints explicitly.
    pub fn endpoints(mut self, endpoints: SourceEndpoints) -> Self {
        self.endpoints = Some(endpoints);
        self
    }

    /// Supply the total record count instead of querying the source.
    pub fn total_records(mut self, total: u64) -> Self {
        self.total_records = Some(total);
        self
    }

    /// Set the per-request timeout in seconds.
    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = Some(secs);
        self
    }

    /// Set the number of extra attempts for a failed window.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    /// Set the Socrata application token.
    pub fn app_token(mut self, token: impl Into<String>) -> Self {
        self.app_token = Some(token.into());
        self
    }

    /// Set the data root. Directories not set explicitly are derived from it
    /// as `raw/`, `parsed/` and `cleaned/`.
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(path.into());
        self
    }

    /// Set the raw batch directory.
    pub fn raw_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.raw_dir = Some(path.into());
        self
    }

    /// Set the normalized table directory.
    pub fn parsed_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.parsed_dir = Some(path.into());
        self
    }

    /// Set the cleaned table directory.
    pub fn cleaned_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.cleaned_dir = Some(path.into());
        self
    }

    /// Set the inclusive crash date window kept by the cleaner.
    pub fn date_window(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.date_window = Some(DateWindow { start, end });
        self
    }

    /// Build the configuration.
    ///
    /// Returns a validated `PipelineConfig` or an error if validation fails.
    pub fn build(self) -> Result<PipelineConfig, ConfigValidationError> {
        let data_dir = self
            .data_dir
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));

        let config = PipelineConfig {
            data_format: self.data_format.unwrap_or_default(),
            batch_size: self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
            concurrency: self.concurrency.unwrap_or(DEFAULT_CONCURRENCY),
            debug_mode: self.debug_mode.unwrap_or(false),
            endpoints: self.endpoints.unwrap_or_default(),
            total_records: self.total_records,
            request_timeout_secs: self.request_timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
            max_retries: self.max_retries.unwrap_or(0),
            app_token: self.app_token,
            raw_dir: self.raw_dir.unwrap_or_else(|| data_dir.join("raw")),
            parsed_dir: self.parsed_dir.unwrap_or_else(|| data_dir.join("parsed")),
            cleaned_dir: self.cleaned_dir.unwrap_or_else(|| data_dir.join("cleaned")),
            date_window: self.date_window.unwrap_or_default(),
        };

        config.validate()?;
        Ok(config)
    }
}
