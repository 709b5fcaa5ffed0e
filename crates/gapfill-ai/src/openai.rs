//! OpenAI provider implementation.
//!
//! Talks to the chat-completions endpoint. Any compatible server can be used
//! through [`ProviderConfig::with_base_url`].

use crate::prompt::{strip_code_blocks, user_prompt, SYSTEM_PROMPT};
use async_trait::async_trait;
use gapfill_core::{GapfillError, Guess, GuessProvider, GuessRequest, ProviderConfig, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// OpenAI provider for gap guesses.
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    client: Client,
    config: ProviderConfig,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: u32,
}

impl OpenAiProvider {
    /// Create a new OpenAI provider with the given configuration.
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let timeout = config.timeout_seconds.unwrap_or(60);
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout))
            .build()
            .map_err(|e| GapfillError::NetworkError(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Create a provider from environment variables.
    ///
    /// See [`ProviderConfig::from_env`].
    pub fn from_env() -> Result<Self> {
        Self::new(ProviderConfig::from_env()?)
    }

    /// Create a provider from environment with a specific model.
    pub fn from_env_with_model(model: &str) -> Result<Self> {
        let mut config = ProviderConfig::from_env()?;
        config.model = model.to_string();
        Self::new(config)
    }

    /// The model requests are sent to.
    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn endpoint(&self) -> &str {
        self.config.base_url.as_deref().unwrap_or(OPENAI_API_URL)
    }

    /// Model listing next to the configured chat endpoint.
    fn models_url(&self) -> String {
        let endpoint = self.endpoint();
        match endpoint.strip_suffix("/chat/completions") {
            Some(root) => format!("{}/models", root),
            None => format!("{}/models", endpoint.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl GuessProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    #[instrument(skip(self, request), fields(gap = %request.context.gap))]
    async fn guess(&self, request: GuessRequest) -> Result<Guess> {
        debug!("Requesting guess from OpenAI model {}", self.config.model);

        let api_request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user_prompt(&request),
                },
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&api_request)
            .send()
            .await
            .map_err(|e| GapfillError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GapfillError::ProviderError(format!(
                "API error {}: {}",
                status, body
            )));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| GapfillError::ProviderError(e.to_string()))?;

        let text = chat_response
            .choices
            .first()
            .map(|c| strip_code_blocks(&c.message.content))
            .unwrap_or_default();

        Ok(Guess {
            text,
            tokens_used: chat_response.usage.map(|u| u.total_tokens),
            metadata: None,
        })
    }

    async fn health_check(&self) -> Result<bool> {
        let response = self
            .client
            .get(self.models_url())
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .send()
            .await
            .map_err(|e| GapfillError::NetworkError(e.to_string()))?;

        Ok(response.status().is_success())
    }
}
