//! Processing core for AI-powered voice notes.
//!
//! The [`Coordinator`] turns transcription and summarization requests into
//! tracked, cancellable, deduplicated asynchronous operations, backed by
//! interchangeable providers:
//!
//! - Transcription: OpenAI, or local Whisper behind the `local-whisper`
//!   feature
//! - Summarization: OpenAI, or a local Ollama instance
//!
//! The surrounding application owns recording, persistence and all UI; it
//! constructs one coordinator, calls `start_*`, renders operation snapshots
//! (or subscribes to change events), and periodically reclaims terminal
//! operations with `cleanup_completed_operations`.

mod config;
mod coordinator;
mod operations;
mod progress;
pub mod stt;
pub mod summarize;
mod usage;

#[cfg(test)]
mod tests;

pub use config::{
    build_summarizer, build_transcriber, build_usage_ledger, ConfigError, CoordinatorConfig,
};
pub use coordinator::{Coordinator, OperationEvent};
pub use operations::{ErrorKind, Operation, OperationKind, OperationResult, OperationStatus};
pub use progress::{ProgressGate, ProgressHandle};
pub use summarize::SummaryLength;
pub use usage::{HttpUsageLedger, NoopUsageLedger, UsageError, UsageLedger};
