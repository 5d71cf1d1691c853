//! Normalizer: raw batch files to one columnar table.
//!
//! Every batch file in the raw directory is decoded on its own. The records
//! of all files that decoded are pooled, a [`UnifiedSchema`] is inferred over
//! the pool, and each record is projected onto it. The result is written to
//! `combined.parquet` in the parsed directory.
//!
//! Files that fail to decode are logged and skipped. When no record decodes
//! at all, or every decoded record is an empty object, the run reports
//! [`NormalizeOutcome::NoData`] and writes nothing.

mod decode;
mod projection;
mod schema;

pub use schema::{ColumnType, UnifiedSchema};

use crate::config::DataFormat;
use crate::context::RunContext;
use crate::error::{PipelineError, Result, ResultExt};
use crate::types::{DecodeFailure, NormalizeOutcome, NormalizeReport, Record};
use polars::prelude::*;
use std::fs::{self, File};
use std::path::Path;
use tracing::{debug, info, warn};

/// Builds the normalized table from raw batch files.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    format: DataFormat,
}

impl Normalizer {
    pub fn new(format: DataFormat) -> Self {
        Self { format }
    }

    /// Normalize every batch file in the raw directory of `ctx`.
    ///
    /// # Errors
    ///
    /// Returns an error if the raw directory cannot be listed or the table
    /// cannot be written. Undecodable files are reported in the outcome.
    pub fn run(&self, ctx: &RunContext) -> Result<NormalizeOutcome> {
        let files = decode::list_batch_files(ctx.raw_dir(), self.format)
            .context(format!("Listing {}", ctx.raw_dir().display()))?;
        info!(
            "Found {} {} batch files in {}",
            files.len(),
            self.format,
            ctx.raw_dir().display()
        );

        let mut records: Vec<Record> = Vec::new();
        let mut failures: Vec<DecodeFailure> = Vec::new();
        let mut files_decoded = 0usize;

        for path in &files {
            match decode::decode_file(path, self.format) {
                Ok(batch) => {
                    debug!("Decoded {} records from {}", batch.len(), path.display());
                    files_decoded += 1;
                    records.extend(batch);
                }
                Err(e) => {
                    let failure = DecodeFailure {
                        path: path.clone(),
                        reason: format!("{e:#}"),
                    };
                    warn!("{}", PipelineError::from(&failure));
                    failures.push(failure);
                }
            }
        }

        if records.iter().all(Record::is_empty) {
            warn!(
                "No records with fields decoded from {} files ({} empty); nothing written",
                files.len(),
                records.len()
            );
            return Ok(NormalizeOutcome::NoData {
                files_seen: files.len(),
                failures,
            });
        }

        let (mut df, mismatched_cells) = build_table(&records)?;
        drop(records);

        if mismatched_cells > 0 {
            warn!(
                "{} cells did not match their column type and were set to null",
                mismatched_cells
            );
        }

        fs::create_dir_all(ctx.parsed_dir())
            .context(format!("Creating {}", ctx.parsed_dir().display()))?;
        let output_path = ctx.normalized_path();
        write_parquet(&mut df, &output_path)?;

        info!(
            "Normalized table written to {} ({} rows, {} columns)",
            output_path.display(),
            df.height(),
            df.width()
        );

        Ok(NormalizeOutcome::Written(NormalizeReport {
            output_path,
            rows: df.height(),
            columns: df.width(),
            files_decoded,
            failures,
            mismatched_cells,
        }))
    }
}

/// Infer the unified schema of `records` and project them into a table.
///
/// Returns the table and the number of cells nulled for a type mismatch.
pub fn build_table(records: &[Record]) -> Result<(DataFrame, usize)> {
    let schema = UnifiedSchema::infer(records);
    debug!("Unified schema has {} columns", schema.len());
    Ok(projection::project(records, &schema)?)
}

pub(crate) fn write_parquet(df: &mut DataFrame, path: &Path) -> Result<()> {
    let file = File::create(path).context(format!("Writing {}", path.display()))?;
    ParquetWriter::new(file)
        .finish(df)
        .context(format!("Writing {}", path.display()))?;
    Ok(())
}
