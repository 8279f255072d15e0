//! Ollama summarization provider for local inference.

use super::{
    check_transcript, clean_model_output, summary_instruction, SummarizeError, Summarizer,
    SummaryLength, SummaryOutput,
};
use crate::progress::ProgressHandle;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "llama3.2";
/// Longer timeout for local models which may be slower
const DEFAULT_OLLAMA_TIMEOUT: Duration = Duration::from_secs(120);

/// Ollama summarizer for local inference.
///
/// Reasoning models (e.g. the deepseek-r1 family) emit their working in
/// thinking tags; the raw output is preserved on [`SummaryOutput::raw`] while
/// `clean` has them stripped.
pub struct OllamaSummarizer {
    client: Client,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl OllamaSummarizer {
    /// Create a new Ollama summarizer with default settings
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: DEFAULT_OLLAMA_TIMEOUT,
        }
    }

    /// Create with custom URL and model
    pub fn with_url(base_url: String, model: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            timeout: DEFAULT_OLLAMA_TIMEOUT,
        }
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Check if Ollama is available at the configured URL
    pub async fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        self.client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .is_ok()
    }

    /// List available models
    pub async fn list_models(&self) -> Result<Vec<String>, SummarizeError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| SummarizeError::Network(format!("Ollama not reachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(SummarizeError::Network(
                "Failed to list Ollama models".to_string(),
            ));
        }

        let result: serde_json::Value = response.json().await?;
        let models = result["models"]
            .as_array()
            .map(|models| {
                models
                    .iter()
                    .filter_map(|m| m["name"].as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        Ok(models)
    }

    async fn request_summary(
        &self,
        transcript: &str,
        length: SummaryLength,
    ) -> Result<String, SummarizeError> {
        let url = format!("{}/api/generate", self.base_url);
        let prompt = format!("{}\n\n{}", summary_instruction(length), transcript);

        let request_body = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SummarizeError::Network("request timed out".to_string())
                } else {
                    SummarizeError::Network(format!("Ollama not reachable: {}", e))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(SummarizeError::Network(format!(
                "Ollama API error ({}): {}",
                status, error_text
            )));
        }

        let result: serde_json::Value = response.json().await?;

        result["response"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| {
                SummarizeError::InvalidResponse("Ollama returned no response field".to_string())
            })
    }
}

impl Default for OllamaSummarizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Summarizer for OllamaSummarizer {
    async fn summarize(
        &self,
        transcript: &str,
        length: SummaryLength,
        progress: ProgressHandle,
        cancel: &CancellationToken,
    ) -> Result<SummaryOutput, SummarizeError> {
        check_transcript(transcript)?;
        progress.report(0.1);

        let raw = tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                return Err(SummarizeError::Cancelled);
            }

            result = self.request_summary(transcript, length) => result?,
        };
        progress.report(0.9);

        let clean = clean_model_output(&raw);
        if clean.is_empty() {
            return Err(SummarizeError::InvalidResponse(
                "model returned an empty summary".to_string(),
            ));
        }

        let raw = (raw.trim() != clean).then(|| raw.trim().to_string());
        Ok(SummaryOutput { clean, raw })
    }

    /// Ollama is keyless; any key (including none) is accepted.
    async fn validate_api_key(&self, _key: &str) -> Result<bool, SummarizeError> {
        Ok(true)
    }

    fn name(&self) -> &'static str {
        "ollama"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_creation() {
        let provider = OllamaSummarizer::new();
        assert_eq!(provider.name(), "ollama");
        assert_eq!(provider.base_url, DEFAULT_OLLAMA_URL);
        assert_eq!(provider.model, DEFAULT_MODEL);
    }

    #[test]
    fn test_provider_with_custom_url() {
        let provider = OllamaSummarizer::with_url(
            "http://192.168.1.5:11434".to_string(),
            Some("deepseek-r1:8b".to_string()),
        );
        assert_eq!(provider.base_url, "http://192.168.1.5:11434");
        assert_eq!(provider.model, "deepseek-r1:8b");
    }

    #[tokio::test]
    async fn test_keyless_validation_accepts_anything() {
        let provider = OllamaSummarizer::new();
        assert!(provider.validate_api_key("").await.unwrap());
    }

    #[tokio::test]
    async fn test_pre_cancelled_token_short_circuits() {
        let provider = OllamaSummarizer::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = provider
            .summarize("transcript", SummaryLength::Medium, ProgressHandle::noop(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, SummarizeError::Cancelled));
    }
}
