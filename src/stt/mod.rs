//! Transcriber capability abstraction and implementations.
//!
//! A [`Transcriber`] turns a recorded audio file into text. Implementations
//! are interchangeable: a remote HTTP provider or an on-device model behind
//! the `local-whisper` feature. Each call is atomic from the coordinator's
//! point of view — it succeeds, fails, or observes cancellation; retry
//! policy (if any) lives outside this seam.

mod openai;

#[cfg(feature = "local-whisper")]
mod whisper;

pub use openai::OpenAiTranscriber;

#[cfg(feature = "local-whisper")]
pub use whisper::LocalWhisperTranscriber;

use crate::operations::ErrorKind;
use crate::progress::ProgressHandle;
use async_trait::async_trait;
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// Successful transcription output.
#[derive(Debug, Clone)]
pub struct Transcription {
    /// Transcribed text, exactly as the provider returned it.
    pub text: String,
    /// Audio duration in seconds, when the provider can determine it.
    /// Used for usage booking after a successful transcription.
    pub duration_secs: Option<f32>,
}

/// Errors that can occur during transcription.
#[derive(Debug, thiserror::Error)]
pub enum TranscribeError {
    #[error("Audio file not found: {0}")]
    FileNotFound(String),

    #[error("Audio file is empty: {0}")]
    EmptyFile(String),

    #[error("Model not available: {0}")]
    ModelNotAvailable(String),

    #[error("Audio conversion failed: {0}")]
    ConversionFailed(String),

    #[error("Transcription cancelled")]
    Cancelled,

    #[error("Network error: {0}")]
    Network(String),
}

impl From<reqwest::Error> for TranscribeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TranscribeError::Network("request timed out".to_string())
        } else {
            TranscribeError::Network(err.to_string())
        }
    }
}

impl TranscribeError {
    /// The failure taxonomy entry for this error, or `None` for
    /// [`TranscribeError::Cancelled`]: a cancelled operation ends as a
    /// `Cancelled` status, never as a failure.
    pub fn failure_kind(&self) -> Option<ErrorKind> {
        match self {
            TranscribeError::FileNotFound(path) => Some(ErrorKind::FileNotFound(path.clone())),
            TranscribeError::EmptyFile(path) => Some(ErrorKind::EmptyFile(path.clone())),
            TranscribeError::ModelNotAvailable(detail) => {
                Some(ErrorKind::ModelNotAvailable(detail.clone()))
            }
            TranscribeError::ConversionFailed(detail) => {
                Some(ErrorKind::ConversionFailed(detail.clone()))
            }
            TranscribeError::Network(detail) => Some(ErrorKind::Network(detail.clone())),
            TranscribeError::Cancelled => None,
        }
    }
}

/// Trait for transcription providers.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe the audio file at `audio_ref`.
    ///
    /// # Arguments
    /// * `audio_ref` - Path to the recorded audio (WAV)
    /// * `language_hint` - Optional language code (e.g. "en", "de")
    /// * `progress` - Fractional progress reports in `[0.0, 1.0]`
    /// * `cancel` - Cooperative cancellation; implementations observe it at
    ///   bounded intervals and return [`TranscribeError::Cancelled`]
    async fn transcribe(
        &self,
        audio_ref: &Path,
        language_hint: Option<&str>,
        progress: ProgressHandle,
        cancel: &CancellationToken,
    ) -> Result<Transcription, TranscribeError>;

    /// Get the name of this provider
    fn name(&self) -> &'static str;
}

/// Read the audio file for a remote upload, mapping filesystem problems to
/// the transcriber error taxonomy.
pub(crate) async fn read_audio_file(audio_ref: &Path) -> Result<Vec<u8>, TranscribeError> {
    let display = audio_ref.display().to_string();

    let bytes = tokio::fs::read(audio_ref).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            TranscribeError::FileNotFound(display.clone())
        } else {
            TranscribeError::ConversionFailed(format!("failed to read {}: {}", display, e))
        }
    })?;

    if bytes.is_empty() {
        return Err(TranscribeError::EmptyFile(display));
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockTranscriber;

    #[async_trait]
    impl Transcriber for MockTranscriber {
        async fn transcribe(
            &self,
            _audio_ref: &Path,
            _language_hint: Option<&str>,
            _progress: ProgressHandle,
            _cancel: &CancellationToken,
        ) -> Result<Transcription, TranscribeError> {
            Ok(Transcription {
                text: "test transcript".to_string(),
                duration_secs: Some(1.0),
            })
        }

        fn name(&self) -> &'static str {
            "mock"
        }
    }

    #[tokio::test]
    async fn test_mock_transcriber_implements_trait() {
        let provider = MockTranscriber;
        let result = provider
            .transcribe(
                Path::new("test.wav"),
                None,
                ProgressHandle::noop(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(result.text, "test transcript");
        assert_eq!(provider.name(), "mock");
    }

    #[tokio::test]
    async fn test_read_audio_file_missing() {
        let err = read_audio_file(Path::new("/nonexistent/missing.wav"))
            .await
            .unwrap_err();
        assert!(matches!(err, TranscribeError::FileNotFound(_)));
        assert!(matches!(
            err.failure_kind(),
            Some(ErrorKind::FileNotFound(_))
        ));
    }

    #[test]
    fn test_cancellation_is_not_a_failure() {
        assert_eq!(TranscribeError::Cancelled.failure_kind(), None);
        assert!(matches!(
            TranscribeError::Network("down".to_string()).failure_kind(),
            Some(ErrorKind::Network(_))
        ));
    }

    #[tokio::test]
    async fn test_read_audio_file_empty() {
        let path = std::env::temp_dir().join("echonote_empty_test.wav");
        tokio::fs::write(&path, b"").await.unwrap();

        let err = read_audio_file(&path).await.unwrap_err();
        assert!(matches!(err, TranscribeError::EmptyFile(_)));

        let _ = tokio::fs::remove_file(&path).await;
    }
}
