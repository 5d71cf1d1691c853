//! Custom error types for the collision pipeline.
//!
//! This module provides the error hierarchy using `thiserror`. Only a few
//! variants abort a stage (discovery failure, configuration and I/O errors);
//! per-window and per-file failures are carried as values inside the stage
//! reports so a run can finish with partial results.
//!
//! Errors are serializable so they can be emitted in the JSON run report.

use serde::Serialize;
use serde::ser::SerializeStruct;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the collision pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The total record count could not be obtained from the source.
    #[error("Failed to discover record count: {0}")]
    Discovery(String),

    /// A single window could not be fetched or written.
    #[error("Failed to fetch window {index} (offset {offset}): {reason}")]
    WindowFetch {
        index: usize,
        offset: u64,
        reason: String,
    },

    /// A raw batch file could not be decoded.
    #[error("Failed to decode '{}': {}", .path.display(), .reason)]
    Decode { path: PathBuf, reason: String },

    /// A cleaning step could not be applied to the table.
    #[error("Cleaning step '{step}' failed: {reason}")]
    Cleaning { step: &'static str, reason: String },

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A stage expected an input artifact that does not exist.
    #[error("Input not found: {}", .0.display())]
    MissingInput(PathBuf),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request error (only with the "http" feature).
    #[cfg(feature = "http")]
    #[error("HTTP request error: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        PipelineError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Stable error code for machine consumers of the run report.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Discovery(_) => "DISCOVERY_FAILED",
            Self::WindowFetch { .. } => "WINDOW_FETCH_FAILED",
            Self::Decode { .. } => "DECODE_FAILED",
            Self::Cleaning { .. } => "CLEANING_FAILED",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::MissingInput(_) => "MISSING_INPUT",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
            #[cfg(feature = "http")]
            Self::HttpRequest(_) => "HTTP_REQUEST_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }
}

impl Serialize for PipelineError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("PipelineError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| PipelineError::Polars(e).with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| PipelineError::Io(e).with_context(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        assert_eq!(
            PipelineError::Discovery("boom".to_string()).error_code(),
            "DISCOVERY_FAILED"
        );
        assert_eq!(
            PipelineError::WindowFetch {
                index: 3,
                offset: 150,
                reason: "HTTP 500".to_string()
            }
            .error_code(),
            "WINDOW_FETCH_FAILED"
        );
    }

    #[test]
    fn test_error_serialization() {
        let error = PipelineError::WindowFetch {
            index: 2,
            offset: 100,
            reason: "timed out".to_string(),
        };
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("WINDOW_FETCH_FAILED"));
        assert!(json.contains("offset 100"));
    }

    #[test]
    fn test_with_context() {
        let error = PipelineError::Discovery("HTTP 503".to_string()).with_context("Fetch stage");
        assert!(error.to_string().contains("Fetch stage"));
        assert_eq!(error.error_code(), "DISCOVERY_FAILED");
    }

    #[test]
    fn test_io_result_context() {
        let result: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        let error = result.context("Creating raw directory").unwrap_err();
        assert_eq!(error.error_code(), "IO_ERROR");
        assert!(error.to_string().starts_with("Creating raw directory"));
    }
}
