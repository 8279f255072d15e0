//! OpenAI summarization provider.

use super::{
    check_transcript, clean_model_output, summary_instruction, SummarizeError, Summarizer,
    SummaryLength, SummaryOutput,
};
use crate::progress::ProgressHandle;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::json;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const OPENAI_MODELS_URL: &str = "https://api.openai.com/v1/models";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Default timeout for summarization requests
const DEFAULT_SUMMARY_TIMEOUT: Duration = Duration::from_secs(60);

/// OpenAI summarizer using the Chat Completions API
pub struct OpenAiSummarizer {
    client: Client,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl OpenAiSummarizer {
    /// Create a new OpenAI summarizer with the given API key
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model: DEFAULT_MODEL.to_string(),
            timeout: DEFAULT_SUMMARY_TIMEOUT,
        }
    }

    /// Create with a specific model
    pub fn with_model(api_key: String, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model,
            timeout: DEFAULT_SUMMARY_TIMEOUT,
        }
    }

    /// Create with custom client and settings
    #[cfg_attr(not(test), allow(dead_code))]
    pub fn with_client(client: Client, api_key: String, model: Option<String>) -> Self {
        Self {
            client,
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            timeout: DEFAULT_SUMMARY_TIMEOUT,
        }
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn map_error_status(status: StatusCode, body: &str) -> SummarizeError {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SummarizeError::ApiKeyMissing,
            StatusCode::TOO_MANY_REQUESTS | StatusCode::PAYMENT_REQUIRED => {
                SummarizeError::QuotaExceeded
            }
            _ => SummarizeError::Network(format!("OpenAI API error ({}): {}", status, body)),
        }
    }

    async fn request_summary(
        &self,
        transcript: &str,
        length: SummaryLength,
    ) -> Result<String, SummarizeError> {
        let request_body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": summary_instruction(length)},
                {"role": "user", "content": transcript}
            ],
        });

        let response = self
            .client
            .post(OPENAI_CHAT_URL)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Self::map_error_status(status, &error_text));
        }

        let result: serde_json::Value = response.json().await?;

        result["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| {
                SummarizeError::InvalidResponse(
                    "chat completion returned no message content".to_string(),
                )
            })
    }
}

#[async_trait]
impl Summarizer for OpenAiSummarizer {
    async fn summarize(
        &self,
        transcript: &str,
        length: SummaryLength,
        progress: ProgressHandle,
        cancel: &CancellationToken,
    ) -> Result<SummaryOutput, SummarizeError> {
        if self.api_key.is_empty() {
            return Err(SummarizeError::ApiKeyMissing);
        }
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

    async fn validate_api_key(&self, key: &str) -> Result<bool, SummarizeError> {
        if key.is_empty() {
            return Ok(false);
        }

        let response = self
            .client
            .get(OPENAI_MODELS_URL)
            .bearer_auth(key)
            .timeout(Duration::from_secs(10))
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(false),
            StatusCode::TOO_MANY_REQUESTS => Err(SummarizeError::QuotaExceeded),
            status => Err(SummarizeError::Network(format!(
                "OpenAI API error ({})",
                status
            ))),
        }
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}
