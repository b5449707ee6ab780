//! Error types for csv2db pipelines

use thiserror::Error;

use crate::summary::ProduceSummary;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Pipeline-level failures.
///
/// Per-item problems (a bad row, an undecodable payload, a failed insert)
/// never surface here; workers log them and move on.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Worker count must be greater than 0")]
    InvalidWorkerCount,

    /// Reading stopped on an error. `summary` holds the totals of the rows
    /// dispatched before it, all of which were processed.
    #[error("Input source failed after {} published records: {message}", .summary.published)]
    Source {
        summary: ProduceSummary,
        message: String,
    },

    #[error("Worker task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl PipelineError {
    /// Create a source error
    pub fn source_failed(summary: ProduceSummary, message: impl Into<String>) -> Self {
        Self::Source {
            summary,
            message: message.into(),
        }
    }
}
