//! Read access to the tables written by the pipeline.
//!
//! ```rust,ignore
//! use collision_pipeline::loader::TableLoader;
//!
//! let loader = TableLoader::preprocessed("data/parsed")?;
//! let first_rows = loader.batch(1_000, 0);
//! let sample = loader.sample(500, Some(42))?;
//! ```

use crate::context::NORMALIZED_FILE_NAME;
use crate::error::{PipelineError, Result, ResultExt};
use polars::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A Parquet table loaded into memory.
#[derive(Debug, Clone)]
pub struct TableLoader {
    path: PathBuf,
    df: DataFrame,
}

impl TableLoader {
    /// Load the table at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::MissingInput`] if the file does not exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(PipelineError::MissingInput(path));
        }

        let file = File::open(&path).context(format!("Opening {}", path.display()))?;
        let df = ParquetReader::new(file)
            .finish()
            .context(format!("Reading {}", path.display()))?;
        debug!("Loaded {} rows from {}", df.height(), path.display());

        Ok(Self { path, df })
    }

    /// Load the normalized table from a parsed directory.
    pub fn preprocessed(parsed_dir: impl AsRef<Path>) -> Result<Self> {
        Self::open(parsed_dir.as_ref().join(NORMALIZED_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn height(&self) -> usize {
        self.df.height()
    }

    /// The whole table.
    pub fn all(&self) -> DataFrame {
        self.df.clone()
    }

    /// Up to `size` rows starting after the first `skip` rows.
    pub fn batch(&self, size: usize, skip: usize) -> DataFrame {
        let offset = i64::try_from(skip).unwrap_or(i64::MAX);
        self.df.slice(offset, size)
    }

    /// `n` distinct rows chosen at random, in table order.
    ///
    /// `n` is clamped to the table height. The same `seed` always selects
    /// the same rows; `None` draws a fresh seed.
    pub fn sample(&self, n: usize, seed: Option<u64>) -> Result<DataFrame> {
        let height = self.df.height();
        let amount = n.min(height);

        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut indices: Vec<IdxSize> = rand::seq::index::sample(&mut rng, height, amount)
            .into_iter()
            .map(|i| i as IdxSize)
            .collect();
        indices.sort_unstable();

        let idx = IdxCa::from_vec("idx".into(), indices);
        Ok(self.df.take(&idx)?)
    }
}
