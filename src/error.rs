//! Per-document error types.
//!
//! Artifact-level problems (unreadable files, bad config) travel as `anyhow::Error`
//! and stop the run. The types here describe failures that only cost one document.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A failure reported by a generation backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerateError {
    /// The backend ran out of device memory for this batch. Smaller batches may succeed.
    #[error("generation ran out of memory for a batch of {batch}")]
    ResourceExhausted { batch: usize },

    #[error("generation timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("generation returned {got} outputs for {expected} prompts")]
    CountMismatch { expected: usize, got: usize },

    #[error("generation returned an empty summary")]
    Empty,

    #[error("generation failed: {0}")]
    Failed(String),
}

impl GenerateError {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }
}

/// Why a single document dropped out of a stage.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DocumentError {
    #[error("document {id} is empty after trimming")]
    EmptyDocument { id: u64 },

    #[error("record {index} is malformed: {reason}")]
    MalformedInput { index: usize, reason: String },

    #[error("document {id}: {source}")]
    Generation { id: u64, source: GenerateError },
}

impl DocumentError {
    pub fn kind(&self) -> FailureKind {
        match self {
            DocumentError::EmptyDocument { .. } => FailureKind::EmptyDocument,
            DocumentError::MalformedInput { .. } => FailureKind::MalformedInput,
            DocumentError::Generation { .. } => FailureKind::GenerationFailure,
        }
    }

    /// The document id, when the record got far enough to have one.
    pub fn id(&self) -> Option<u64> {
        match self {
            DocumentError::EmptyDocument { id } | DocumentError::Generation { id, .. } => Some(*id),
            DocumentError::MalformedInput { .. } => None,
        }
    }

    /// Skips are expected data conditions; everything else counts as a failure.
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            DocumentError::EmptyDocument { .. } | DocumentError::MalformedInput { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    EmptyDocument,
    MalformedInput,
    GenerationFailure,
}
