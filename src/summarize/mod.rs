//! Summarizer capability abstraction and implementations.
//!
//! A [`Summarizer`] turns a transcript into a summary. Implementations are
//! interchangeable: a remote chat-completions provider or a local Ollama
//! instance. Providers return both the post-processed (`clean`) text and,
//! when it differs, the raw model output — reasoning models wrap their
//! working in thinking tags that must not reach the user.

mod ollama;
mod openai;

pub use ollama::OllamaSummarizer;
pub use openai::OpenAiSummarizer;

use crate::operations::ErrorKind;
use crate::progress::ProgressHandle;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Upper bound on transcript size accepted for summarization.
///
/// Keeps requests well inside common context windows; longer transcripts
/// surface as [`SummarizeError::TextTooLong`] rather than a provider 400.
pub const MAX_TRANSCRIPT_CHARS: usize = 48_000;

/// Requested summary verbosity, folded into the provider prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SummaryLength {
    Short,
    #[default]
    Medium,
    Detailed,
}

/// Successful summarization output.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryOutput {
    /// Post-processed summary, ready for display.
    pub clean: String,
    /// Unprocessed model output, populated when post-processing changed it.
    pub raw: Option<String>,
}

/// Errors that can occur during summarization.
#[derive(Debug, thiserror::Error)]
pub enum SummarizeError {
    #[error("No API key configured")]
    ApiKeyMissing,

    #[error("Provider quota exceeded")]
    QuotaExceeded,

    #[error("Transcript too long: {chars} chars (limit {limit})")]
    TextTooLong { chars: usize, limit: usize },

    #[error("Transcript is empty")]
    EmptyText,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Summarization cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for SummarizeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SummarizeError::Network("request timed out".to_string())
        } else {
            SummarizeError::Network(err.to_string())
        }
    }
}

impl SummarizeError {
    /// The failure taxonomy entry for this error, or `None` for
    /// [`SummarizeError::Cancelled`]: a cancelled operation ends as a
    /// `Cancelled` status, never as a failure.
    pub fn failure_kind(&self) -> Option<ErrorKind> {
        match self {
            SummarizeError::ApiKeyMissing => Some(ErrorKind::ApiKeyMissing),
            SummarizeError::QuotaExceeded => Some(ErrorKind::QuotaExceeded),
            SummarizeError::TextTooLong { .. } => Some(ErrorKind::TextTooLong),
            SummarizeError::EmptyText => Some(ErrorKind::EmptyText),
            SummarizeError::InvalidResponse(detail) => {
                Some(ErrorKind::InvalidResponse(detail.clone()))
            }
            SummarizeError::Network(detail) => Some(ErrorKind::Network(detail.clone())),
            SummarizeError::Cancelled => None,
        }
    }
}

/// Trait for summarization providers.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarize a transcript.
    async fn summarize(
        &self,
        transcript: &str,
        length: SummaryLength,
        progress: ProgressHandle,
        cancel: &CancellationToken,
    ) -> Result<SummaryOutput, SummarizeError>;

    /// Check whether an API key is accepted by the provider.
    ///
    /// Returns `Ok(false)` for a rejected key; errors are reserved for
    /// quota/network problems. Used by configuration flows, not by jobs.
    async fn validate_api_key(&self, key: &str) -> Result<bool, SummarizeError>;

    /// Get the name of this provider
    fn name(&self) -> &'static str;
}

/// Validate transcript input shared by all providers.
pub(crate) fn check_transcript(transcript: &str) -> Result<(), SummarizeError> {
    if transcript.trim().is_empty() {
        return Err(SummarizeError::EmptyText);
    }
    if transcript.chars().count() > MAX_TRANSCRIPT_CHARS {
        return Err(SummarizeError::TextTooLong {
            chars: transcript.chars().count(),
            limit: MAX_TRANSCRIPT_CHARS,
        });
    }
    Ok(())
}

/// System prompt for the summarization request.
pub(crate) fn summary_instruction(length: SummaryLength) -> &'static str {
    match length {
        SummaryLength::Short => {
            "Summarize the following voice note transcript in 1-2 sentences. \
             Output only the summary, nothing else."
        }
        SummaryLength::Medium => {
            "Summarize the following voice note transcript in a short paragraph, \
             keeping the key points and any action items. Output only the summary."
        }
        SummaryLength::Detailed => {
            "Write a detailed summary of the following voice note transcript as \
             bullet points, covering every topic mentioned and listing action \
             items separately. Output only the summary."
        }
    }
}

/// Post-process raw model output into displayable summary text.
///
/// Reasoning models wrap their working in `<think>`/`<thinking>` blocks and
/// some wrap the whole answer in a markdown code fence; both are stripped.
pub(crate) fn clean_model_output(raw: &str) -> String {
    let without_thinking = strip_tag_blocks(strip_tag_blocks(raw.into(), "think"), "thinking");
    let trimmed = without_thinking.trim();

    // Unwrap a single surrounding ``` fence (optionally ```markdown).
    if let Some(rest) = trimmed.strip_prefix("```") {
        if let Some(inner) = rest.strip_suffix("```") {
            let inner = inner
                .strip_prefix("markdown")
                .unwrap_or(inner)
                .trim_matches('\n');
            return inner.trim().to_string();
        }
    }

    trimmed.to_string()
}

/// Remove every `<tag>...</tag>` block from the text.
fn strip_tag_blocks(text: String, tag: &str) -> String {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let mut out = text;

    while let Some(start) = out.find(&open) {
        match out[start..].find(&close) {
            Some(offset) => {
                out.replace_range(start..start + offset + close.len(), "");
            }
            // Unterminated block: drop everything from the opening tag.
            None => {
                out.truncate(start);
                break;
            }
        }
    }

    out
}
