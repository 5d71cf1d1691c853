//! NYC Motor Vehicle Collisions Pipeline Library
//!
//! Downloads the NYC Open Data collisions dataset, merges the raw batches into
//! one columnar table and cleans it for analysis. Built on Polars.
//!
//! # Overview
//!
//! The pipeline has three stages that share a [`RunContext`]:
//!
//! - **Batch Fetcher** ([`fetcher`]): partitions the source into offset
//!   windows and streams them to disk on a bounded worker pool, then writes a
//!   manifest of the windows that succeeded
//! - **Normalizer** ([`normalizer`]): decodes every raw batch, infers one
//!   schema for all records and writes `combined.parquet`
//! - **Cleaner** ([`cleaner`]): prunes, coerces, filters and canonicalizes
//!   the normalized table and writes `clean.parquet`
//!
//! Per-window and per-file failures never abort a stage; they are reported
//! in the stage reports so a run can finish with partial data.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use collision_pipeline::{Pipeline, PipelineConfig, StageSelection};
//!
//! let config = PipelineConfig::builder()
//!     .batch_size(50_000)
//!     .concurrency(4)
//!     .data_dir("data")
//!     .build()?;
//!
//! let report = Pipeline::builder()
//!     .config(config)
//!     .on_progress(|update| {
//!         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
//!     })
//!     .build()?
//!     .run(StageSelection::all())?;
//!
//! println!("Pipeline ran in {} seconds", report.total_secs);
//! ```
//!
//! # Custom Sources
//!
//! The fetcher reads through the [`RecordSource`] trait. The default is
//! [`fetcher::HttpRecordSource`] (feature `http`); tests and offline runs can
//! pass their own source to [`PipelineBuilder::source`].
//!
//! # Reading Results
//!
//! ```rust,ignore
//! use collision_pipeline::loader::TableLoader;
//!
//! let loader = TableLoader::preprocessed("data/parsed")?;
//! let sample = loader.sample(1_000, Some(42))?;
//! ```

pub mod cleaner;
pub mod config;
pub mod context;
pub mod error;
pub mod fetcher;
pub mod loader;
pub mod normalizer;
pub mod pipeline;
pub mod types;
pub mod utils;

// Re-exports for convenient access
pub use cleaner::{Cleaner, CleaningStep};
pub use config::{
    ConfigValidationError, DataFormat, DateWindow, PipelineConfig, PipelineConfigBuilder,
    SourceEndpoints,
};
pub use context::RunContext;
pub use error::{PipelineError, Result, ResultExt};
pub use fetcher::{BatchFetcher, BatchWindow, RecordSource};
pub use loader::TableLoader;
pub use normalizer::{ColumnType, Normalizer, UnifiedSchema};
pub use pipeline::{
    ClosureProgressReporter, Pipeline, PipelineBuilder, PipelineStage, ProgressReporter,
    ProgressUpdate, StageSelection,
};
pub use types::{
    CleanReport, DecodeFailure, FetchReport, Manifest, NormalizeOutcome, NormalizeReport,
    PipelineRunReport, Record, WindowFailure,
};
