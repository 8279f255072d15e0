//! Configuration for the processing coordinator and provider factories.

use crate::coordinator::Coordinator;
use crate::stt::{OpenAiTranscriber, Transcriber};
use crate::summarize::{OllamaSummarizer, OpenAiSummarizer, Summarizer, SummaryLength};
use crate::usage::{HttpUsageLedger, NoopUsageLedger, UsageLedger};
use std::collections::HashMap;
use std::sync::Arc;

/// Errors that prevent building providers from configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Unknown transcription provider: {0}")]
    UnknownTranscriber(String),

    #[error("Unknown summarization provider: {0}")]
    UnknownSummarizer(String),

    #[error("Provider '{0}' requires an API key")]
    MissingApiKey(String),

    #[error("Provider not available: {0}")]
    ProviderNotAvailable(String),
}

/// Configuration for the coordinator and its providers.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Transcription provider id ("openai", or "local-whisper" with the
    /// feature enabled).
    pub stt_provider: String,
    /// API keys for all configured STT providers (provider id -> key)
    pub stt_api_keys: HashMap<String, String>,
    /// Optional model override for STT
    pub stt_model: Option<String>,

    /// Summarization provider id ("openai" or "ollama").
    pub summary_provider: String,
    /// API keys for all configured summarization providers
    pub summary_api_keys: HashMap<String, String>,
    /// Optional model override for summarization
    pub summary_model: Option<String>,
    /// Requested summary verbosity
    pub summary_length: SummaryLength,
    /// Base URL for Ollama (default: http://localhost:11434)
    pub ollama_url: Option<String>,

    /// Usage ledger endpoint; bookings are skipped when unset.
    pub usage_endpoint: Option<String>,
    /// User key reported with usage bookings.
    pub user_key: Option<String>,

    /// Path to the local Whisper model (for the local-whisper feature)
    #[cfg(feature = "local-whisper")]
    pub whisper_model_path: Option<std::path::PathBuf>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            stt_provider: "openai".to_string(),
            stt_api_keys: HashMap::new(),
            stt_model: None,
            summary_provider: "openai".to_string(),
            summary_api_keys: HashMap::new(),
            summary_model: None,
            summary_length: SummaryLength::default(),
            ollama_url: None,
            usage_endpoint: None,
            user_key: None,
            #[cfg(feature = "local-whisper")]
            whisper_model_path: None,
        }
    }
}

impl CoordinatorConfig {
    fn api_key_for(
        keys: &HashMap<String, String>,
        provider_id: &str,
    ) -> Result<String, ConfigError> {
        match keys.get(provider_id) {
            Some(key) if !key.is_empty() => Ok(key.clone()),
            _ => Err(ConfigError::MissingApiKey(provider_id.to_string())),
        }
    }
}

/// Create a transcriber based on configuration
pub fn build_transcriber(config: &CoordinatorConfig) -> Result<Arc<dyn Transcriber>, ConfigError> {
    match config.stt_provider.as_str() {
        "openai" => {
            let api_key = CoordinatorConfig::api_key_for(&config.stt_api_keys, "openai")?;
            Ok(Arc::new(OpenAiTranscriber::new(
                api_key,
                config.stt_model.clone(),
            )))
        }

        #[cfg(feature = "local-whisper")]
        "local-whisper" => {
            let provider =
                crate::stt::LocalWhisperTranscriber::new(config.whisper_model_path.clone())
                    .map_err(|e| ConfigError::ProviderNotAvailable(e.to_string()))?;
            Ok(Arc::new(provider))
        }

        other => Err(ConfigError::UnknownTranscriber(other.to_string())),
    }
}

/// Create a summarizer based on configuration
pub fn build_summarizer(config: &CoordinatorConfig) -> Result<Arc<dyn Summarizer>, ConfigError> {
    match config.summary_provider.as_str() {
        "openai" => {
            let api_key = CoordinatorConfig::api_key_for(&config.summary_api_keys, "openai")?;
            let provider = match &config.summary_model {
                Some(model) => OpenAiSummarizer::with_model(api_key, model.clone()),
                None => OpenAiSummarizer::new(api_key),
            };
            Ok(Arc::new(provider))
        }

        "ollama" => {
            let provider = OllamaSummarizer::with_url(
                config
                    .ollama_url
                    .clone()
                    .unwrap_or_else(|| "http://localhost:11434".to_string()),
                config.summary_model.clone(),
            );
            Ok(Arc::new(provider))
        }

        other => Err(ConfigError::UnknownSummarizer(other.to_string())),
    }
}

/// Create the usage ledger; a no-op sink when no endpoint is configured.
pub fn build_usage_ledger(config: &CoordinatorConfig) -> Arc<dyn UsageLedger> {
    match &config.usage_endpoint {
        Some(endpoint) => Arc::new(HttpUsageLedger::new(endpoint.clone())),
        None => Arc::new(NoopUsageLedger),
    }
}

impl Coordinator {
    /// Build a coordinator with providers resolved from configuration.
    pub fn from_config(config: &CoordinatorConfig) -> Result<Self, ConfigError> {
        let transcriber = build_transcriber(config)?;
        let summarizer = build_summarizer(config)?;
        let usage = build_usage_ledger(config);

        Ok(Coordinator::new(transcriber, summarizer, usage)
            .with_user_key(config.user_key.clone())
            .with_summary_length(config.summary_length))
    }
}
