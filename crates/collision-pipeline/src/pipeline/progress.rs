//! Progress reporting for the collision pipeline.
//!
//! Progress is observability only: nothing in the data contract depends on
//! it. The fetcher reports windows completed out of windows total, and the
//! orchestrator reports stage transitions.
//!
//! # Example
//!
//! ```rust,ignore
//! use collision_pipeline::{Pipeline, StageSelection};
//!
//! let report = Pipeline::builder()
//!     .on_progress(|update| {
//!         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
//!     })
//!     .build()?
//!     .run(StageSelection::all())?;
//! ```

use serde::{Deserialize, Serialize};

/// Stages of the collision pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Resolving configuration and run context
    Initializing,
    /// Downloading raw batches
    Fetching,
    /// Building the normalized table
    Normalizing,
    /// Cleaning the normalized table
    Cleaning,
    Complete,
    Failed,
}

/// Stages that carry work, in execution order.
const RUN_ORDER: [PipelineStage; 4] = [
    PipelineStage::Initializing,
    PipelineStage::Fetching,
    PipelineStage::Normalizing,
    PipelineStage::Cleaning,
];

impl PipelineStage {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Initializing => "Initializing",
            Self::Fetching => "Downloading batches",
            Self::Normalizing => "Normalizing records",
            Self::Cleaning => "Cleaning table",
            Self::Complete => "Complete",
            Self::Failed => "Failed",
        }
    }

    /// Share of a full run spent in this stage. Downloading dominates.
    pub fn weight(&self) -> f32 {
        match self {
            Self::Initializing => 0.02,
            Self::Fetching => 0.68,
            Self::Normalizing => 0.18,
            Self::Cleaning => 0.12,
            Self::Complete | Self::Failed => 0.0,
        }
    }

    /// Overall progress at the moment this stage starts.
    pub fn start_progress(&self) -> f32 {
        match self {
            Self::Complete => 1.0,
            Self::Failed => 0.0,
            stage => RUN_ORDER
                .iter()
                .take_while(|s| *s != stage)
                .map(PipelineStage::weight)
                .sum(),
        }
    }
}

/// Progress update emitted by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub stage: PipelineStage,

    /// What the stage is working on, e.g. "Window 3"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// Overall progress (0.0 - 1.0)
    pub progress: f32,

    /// Progress within `stage` (0.0 - 1.0)
    pub stage_progress: f32,

    pub message: String,

    /// Units of work finished in this stage (windows for the fetcher)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
}

impl ProgressUpdate {
    /// Update for `stage` with `stage_progress` of it done.
    pub fn new(stage: PipelineStage, stage_progress: f32, message: impl Into<String>) -> Self {
        let stage_progress = stage_progress.clamp(0.0, 1.0);
        let progress = match stage {
            PipelineStage::Complete => 1.0,
            PipelineStage::Failed => 0.0,
            _ => (stage.start_progress() + stage.weight() * stage_progress).clamp(0.0, 1.0),
        };
        Self {
            stage,
            detail: None,
            progress,
            stage_progress,
            message: message.into(),
            completed: None,
            total: None,
        }
    }

    /// Update for `stage` with `completed` of `total` units done.
    ///
    /// An empty stage (`total == 0`) counts as finished.
    pub fn counted(
        stage: PipelineStage,
        completed: usize,
        total: usize,
        message: impl Into<String>,
    ) -> Self {
        let fraction = if total == 0 {
            1.0
        } else {
            completed as f32 / total as f32
        };
        Self {
            completed: Some(completed),
            total: Some(total),
            ..Self::new(stage, fraction, message)
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn complete(message: impl Into<String>) -> Self {
        Self::new(PipelineStage::Complete, 1.0, message)
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(PipelineStage::Failed, 0.0, message)
    }
}

/// Receiver of progress updates.
///
/// Implementations must be `Send + Sync`; the fetcher's collector calls
/// [`report`](Self::report) while worker threads are still running.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, update: ProgressUpdate);
}

/// [`ProgressReporter`] backed by a closure.
pub struct ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    callback: F,
}

impl<F> ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ProgressReporter for ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn report(&self, update: ProgressUpdate) {
        (self.callback)(update);
    }
}

static_assertions::assert_impl_all!(ProgressUpdate: Send, Sync);
