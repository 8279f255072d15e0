//! Usage booking collaborator.
//!
//! After a successful transcription the coordinator reports the consumed
//! audio seconds to a server-authoritative ledger. The booking is
//! best-effort and fire-and-forget: a failure is logged and never changes
//! the operation's terminal status. The ledger's internal arithmetic
//! (top-up balance vs subscription allowance) is the server's concern.

use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

/// Errors that can occur while booking usage.
#[derive(Debug, thiserror::Error)]
pub enum UsageError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Usage API error: {0}")]
    Api(String),
}

/// Trait for the usage ledger sink.
#[async_trait]
pub trait UsageLedger: Send + Sync {
    /// Book `seconds` of consumed transcription time for `user_key`.
    async fn book_usage(&self, user_key: &str, seconds: f32) -> Result<(), UsageError>;
}

/// HTTP usage ledger posting to a configured endpoint.
pub struct HttpUsageLedger {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpUsageLedger {
    pub fn new(endpoint: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }

    /// Create with a custom HTTP client
    #[cfg_attr(not(test), allow(dead_code))]
    pub fn with_client(client: reqwest::Client, endpoint: String) -> Self {
        Self { client, endpoint }
    }
}

#[async_trait]
impl UsageLedger for HttpUsageLedger {
    async fn book_usage(&self, user_key: &str, seconds: f32) -> Result<(), UsageError> {
        let response = self
            .client
            .post(&self.endpoint)
            .timeout(Duration::from_secs(15))
            .json(&json!({
                "user_key": user_key,
                "seconds": seconds,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(UsageError::Api(format!(
                "booking failed ({}): {}",
                status, error_text
            )));
        }

        Ok(())
    }
}

/// Usage ledger that discards all bookings. Used when no endpoint is
/// configured and in tests.
#[derive(Debug, Default)]
pub struct NoopUsageLedger;

#[async_trait]
impl UsageLedger for NoopUsageLedger {
    async fn book_usage(&self, user_key: &str, seconds: f32) -> Result<(), UsageError> {
        log::debug!(
            "Usage booking skipped (no ledger configured): {} / {:.1}s",
            user_key,
            seconds
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_ledger_accepts_bookings() {
        let ledger = NoopUsageLedger;
        assert!(ledger.book_usage("user-1", 12.5).await.is_ok());
    }

    #[test]
    fn test_http_ledger_creation() {
        let ledger = HttpUsageLedger::new("https://api.example.com/usage".to_string());
        assert_eq!(ledger.endpoint, "https://api.example.com/usage");
    }
}
