//! Guess provider trait and configuration.
//!
//! Defines the interface that guessing backends must implement.

use crate::{GapContext, GapfillError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Configuration for a remote guess provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API key for authentication.
    pub api_key: String,

    /// Model identifier.
    pub model: String,

    /// Base URL for the API.
    pub base_url: Option<String>,

    /// Maximum tokens to generate.
    pub max_tokens: Option<u32>,

    /// Temperature for generation (0.0 - 2.0).
    pub temperature: Option<f32>,

    /// Request timeout in seconds.
    pub timeout_seconds: Option<u64>,
}

impl ProviderConfig {
    /// Create a new provider config with API key and model.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: None,
            max_tokens: None,
            temperature: None,
            timeout_seconds: None,
        }
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set max tokens.
    pub fn with_max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = Some(tokens);
        self
    }

    /// Set temperature.
    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp.clamp(0.0, 2.0));
        self
    }

    /// Set timeout.
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    /// Load config from environment variables.
    ///
    /// Expected variables:
    /// - `GAPFILL_API_KEY` or `OPENAI_API_KEY`
    /// - `GAPFILL_MODEL` (defaults to "gpt-4o-mini")
    /// - `GAPFILL_BASE_URL` (optional)
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GAPFILL_API_KEY")
            .or_else(|_| std::env::var("OPENAI_API_KEY"))
            .map_err(|_| {
                GapfillError::ConfigError("GAPFILL_API_KEY or OPENAI_API_KEY must be set".to_string())
            })?;

        let model = std::env::var("GAPFILL_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());

        let mut config = Self::new(api_key, model);

        if let Ok(url) = std::env::var("GAPFILL_BASE_URL") {
            config = config.with_base_url(url);
        }

        Ok(config)
    }
}

/// Request for a guess.
#[derive(Debug, Clone)]
pub struct GuessRequest {
    /// Full document text at the time of the request.
    pub document_text: String,

    /// The gap and its surrounding window.
    pub context: GapContext,
}

/// A candidate replacement for a gap.
#[derive(Debug, Clone, Default)]
pub struct Guess {
    /// The candidate text.
    pub text: String,

    /// Tokens used for the request.
    pub tokens_used: Option<u32>,

    /// Provider-specific metadata.
    pub metadata: Option<serde_json::Value>,
}

impl Guess {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

/// Trait that guess providers must implement.
///
/// Implementations must be safe to call concurrently for independent gaps.
#[async_trait]
pub trait GuessProvider: Send + Sync {
    /// Get the provider name.
    fn name(&self) -> &str;

    /// Propose replacement text for the gap described by `request`.
    async fn guess(&self, request: GuessRequest) -> Result<Guess>;

    /// Check if the provider is available and configured correctly.
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

#[async_trait]
impl<P: GuessProvider + ?Sized> GuessProvider for std::sync::Arc<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn guess(&self, request: GuessRequest) -> Result<Guess> {
        (**self).guess(request).await
    }

    async fn health_check(&self) -> Result<bool> {
        (**self).health_check().await
    }
}

/// A mock provider for testing.
#[derive(Debug, Default)]
pub struct MockProvider {
    /// Responses to return (gap id -> text).
    pub responses: HashMap<String, String>,

    /// Gaps for which the provider reports an error.
    pub failures: HashMap<String, String>,

    /// Artificial latency per gap.
    pub delays: HashMap<String, Duration>,
}

impl MockProvider {
    /// Create a new mock provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mock response.
    pub fn with_response(mut self, gap: impl Into<String>, text: impl Into<String>) -> Self {
        self.responses.insert(gap.into(), text.into());
        self
    }

    /// Make guesses for `gap` fail.
    pub fn with_failure(mut self, gap: impl Into<String>, message: impl Into<String>) -> Self {
        self.failures.insert(gap.into(), message.into());
        self
    }

    /// Delay the response for `gap`.
    pub fn with_delay(mut self, gap: impl Into<String>, delay: Duration) -> Self {
        self.delays.insert(gap.into(), delay);
        self
    }
}

#[async_trait]
impl GuessProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn guess(&self, request: GuessRequest) -> Result<Guess> {
        let gap = request.context.gap.as_str();

        if let Some(delay) = self.delays.get(gap) {
            tokio::time::sleep(*delay).await;
        }

        if let Some(message) = self.failures.get(gap) {
            return Err(GapfillError::ProviderError(message.clone()));
        }

        let text = self
            .responses
            .get(gap)
            .cloned()
            .unwrap_or_else(|| format!("<{}>", gap));

        Ok(Guess {
            text,
            tokens_used: Some(1),
            metadata: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GapId;

    fn request(gap: &str) -> GuessRequest {
        let text = format!("Hello |_{}_|!", gap);
        GuessRequest {
            context: GapContext::around(&text, GapId::new(gap), 6..10 + gap.len(), 20),
            document_text: text,
        }
    }

    #[tokio::test]
    async fn test_mock_provider() {
        let provider = MockProvider::new().with_response("A", "world");
        let guess = provider.guess(request("A")).await.unwrap();
        assert_eq!(guess.text, "world");

        let fallback = provider.guess(request("B")).await.unwrap();
        assert_eq!(fallback.text, "<B>");
    }

    #[tokio::test]
    async fn test_mock_provider_failure() {
        let provider = MockProvider::new().with_failure("A", "boom");
        let result = provider.guess(request("A")).await;
        assert!(matches!(result, Err(GapfillError::ProviderError(m)) if m == "boom"));
    }

    #[tokio::test]
    async fn test_shared_provider() {
        let provider = std::sync::Arc::new(MockProvider::new().with_response("A", "hi"));
        assert_eq!(provider.name(), "mock");
        assert_eq!(provider.guess(request("A")).await.unwrap().text, "hi");
    }

    #[test]
    fn test_default_health_check() {
        let provider = MockProvider::new();
        assert!(tokio_test::block_on(provider.health_check()).unwrap());
    }

    #[test]
    fn test_config_builder() {
        let config = ProviderConfig::new("key", "model")
            .with_temperature(5.0)
            .with_timeout(10);
        assert_eq!(config.temperature, Some(2.0));
        assert_eq!(config.timeout_seconds, Some(10));
    }
}
