//! OpenAI transcription provider.
//!
//! Uses the dedicated transcription endpoint (`/v1/audio/transcriptions`)
//! with `whisper-1` or the newer `*-transcribe` models.

use super::{read_audio_file, TranscribeError, Transcriber, Transcription};
use crate::progress::ProgressHandle;
use async_trait::async_trait;
use reqwest::multipart;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const OPENAI_TRANSCRIPTIONS_URL: &str = "https://api.openai.com/v1/audio/transcriptions";
const DEFAULT_MODEL: &str = "whisper-1";

/// Default timeout for transcription requests. Remote transcription of long
/// recordings can be slow; the provider owns this bound, not the coordinator.
const DEFAULT_TRANSCRIPTION_TIMEOUT: Duration = Duration::from_secs(120);

/// OpenAI speech-to-text provider
pub struct OpenAiTranscriber {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiTranscriber {
    /// Create a new OpenAI transcriber
    ///
    /// # Arguments
    /// * `api_key` - OpenAI API key
    /// * `model` - Model to use, defaults to "whisper-1". The `*-transcribe`
    ///   models are also supported but do not report audio duration.
    pub fn new(api_key: String, model: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TRANSCRIPTION_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        }
    }

    /// Create a new provider with a custom HTTP client
    #[cfg_attr(not(test), allow(dead_code))]
    pub fn with_client(client: reqwest::Client, api_key: String, model: Option<String>) -> Self {
        Self {
            client,
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        }
    }

    /// Whether the selected model supports `verbose_json` (which carries the
    /// audio duration). Per OpenAI docs this is `whisper-1` only.
    fn supports_verbose_json(&self) -> bool {
        self.model == DEFAULT_MODEL
    }

    async fn request_transcription(
        &self,
        audio: Vec<u8>,
        language_hint: Option<&str>,
    ) -> Result<Transcription, TranscribeError> {
        let part = multipart::Part::bytes(audio)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| {
                TranscribeError::ConversionFailed(format!("failed to create multipart: {}", e))
            })?;

        let response_format = if self.supports_verbose_json() {
            "verbose_json"
        } else {
            "json"
        };

        let mut form = multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("response_format", response_format);

        if let Some(language) = language_hint {
            form = form.text("language", language.to_string());
        }

        let response = self
            .client
            .post(OPENAI_TRANSCRIPTIONS_URL)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(TranscribeError::Network(format!(
                "OpenAI transcription API error ({}): {}",
                status, error_text
            )));
        }

        let result: serde_json::Value = response.json().await?;

        let text = result["text"].as_str().unwrap_or("").to_string();
        let duration_secs = result["duration"].as_f64().map(|d| d as f32);

        Ok(Transcription {
            text,
            duration_secs,
        })
    }
}

#[async_trait]
impl Transcriber for OpenAiTranscriber {
    async fn transcribe(
        &self,
        audio_ref: &Path,
        language_hint: Option<&str>,
        progress: ProgressHandle,
        cancel: &CancellationToken,
    ) -> Result<Transcription, TranscribeError> {
        let audio = read_audio_file(audio_ref).await?;
        progress.report(0.1);

        log::debug!(
            "OpenAI transcriber: uploading {} bytes (model {})",
            audio.len(),
            self.model
        );
        progress.report(0.25);

        // The HTTP request is not natively cancellable; racing it against the
        // token drops the in-flight request on cancellation.
        let transcription = tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                return Err(TranscribeError::Cancelled);
            }

            result = self.request_transcription(audio, language_hint) => result?,
        };

        progress.report(0.95);
        Ok(transcription)
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}
