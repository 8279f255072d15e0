//! Operation model for tracked processing jobs.
//!
//! An [`Operation`] is one unit of asynchronous work (a transcription or a
//! summarization attempt) with a stable identity and a status that observers
//! can render directly. `Completed`, `Failed` and `Cancelled` are terminal:
//! once set, the only further transition is removal by cleanup.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// What kind of work an operation performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Transcription,
    Summarization,
}

/// Domain error surfaced on a failed operation.
///
/// Cancellation is deliberately *not* part of this taxonomy — a cancelled
/// operation ends as [`OperationStatus::Cancelled`], never as a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(rename_all = "snake_case", tag = "code", content = "detail")]
pub enum ErrorKind {
    #[error("No API key configured for the provider")]
    ApiKeyMissing,

    #[error("Model not available: {0}")]
    ModelNotAvailable(String),

    #[error("Audio file not found: {0}")]
    FileNotFound(String),

    #[error("Audio file is empty: {0}")]
    EmptyFile(String),

    #[error("Text is too long to summarize")]
    TextTooLong,

    #[error("Text is empty")]
    EmptyText,

    #[error("Provider quota exceeded")]
    QuotaExceeded,

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Audio conversion failed: {0}")]
    ConversionFailed(String),
}

/// Successful output of an operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum OperationResult {
    Transcript {
        text: String,
    },
    Summary {
        /// Post-processed summary text, ready for display.
        clean: String,
        /// Unprocessed model output (e.g. including thinking tags), when it
        /// differs from `clean`.
        raw: Option<String>,
    },
}

/// Lifecycle status of an operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum OperationStatus {
    /// The job is in flight. `progress` is in `[0.0, 1.0]` and never
    /// decreases; it reaches 1.0 before a successful completion.
    Running { progress: f32 },
    Completed { result: OperationResult },
    Failed { error: ErrorKind },
    Cancelled,
}

impl OperationStatus {
    /// Whether no further status transition can occur.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OperationStatus::Running { .. })
    }

    pub fn is_running(&self) -> bool {
        matches!(self, OperationStatus::Running { .. })
    }

    /// Current progress, if the operation is still running.
    pub fn progress(&self) -> Option<f32> {
        match self {
            OperationStatus::Running { progress } => Some(*progress),
            _ => None,
        }
    }
}

/// A consistent snapshot of one tracked operation.
///
/// Identity fields are immutable for the lifetime of the operation; only
/// `status` changes, and only through the coordinator.
#[derive(Debug, Clone, Serialize)]
pub struct Operation {
    pub id: Uuid,
    pub recording_id: String,
    pub kind: OperationKind,
    pub status: OperationStatus,
    pub created_at: DateTime<Utc>,
}

impl Operation {
    pub(crate) fn new(recording_id: String, kind: OperationKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            recording_id,
            kind,
            status: OperationStatus::Running { progress: 0.0 },
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_operation_starts_running_at_zero() {
        let op = Operation::new("rec-1".to_string(), OperationKind::Transcription);
        assert_eq!(op.status, OperationStatus::Running { progress: 0.0 });
        assert!(!op.status.is_terminal());
        assert_eq!(op.status.progress(), Some(0.0));
    }

    #[test]
    fn test_terminal_statuses() {
        let completed = OperationStatus::Completed {
            result: OperationResult::Transcript {
                text: "hi".to_string(),
            },
        };
        let failed = OperationStatus::Failed {
            error: ErrorKind::EmptyText,
        };

        assert!(completed.is_terminal());
        assert!(failed.is_terminal());
        assert!(OperationStatus::Cancelled.is_terminal());
        assert_eq!(completed.progress(), None);
    }

    #[test]
    fn test_status_serializes_with_snake_case_tag() {
        let status = OperationStatus::Running { progress: 0.5 };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "running");
        assert_eq!(json["progress"], 0.5);

        let json = serde_json::to_value(&OperationStatus::Cancelled).unwrap();
        assert_eq!(json["state"], "cancelled");
    }

    #[test]
    fn test_error_kind_display() {
        let err = ErrorKind::FileNotFound("/tmp/missing.wav".to_string());
        assert_eq!(err.to_string(), "Audio file not found: /tmp/missing.wav");
    }
}
