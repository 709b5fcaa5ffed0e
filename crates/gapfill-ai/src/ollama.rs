//! Ollama local provider implementation.

use crate::prompt::{strip_code_blocks, user_prompt, SYSTEM_PROMPT};
use async_trait::async_trait;
use gapfill_core::{GapfillError, Guess, GuessProvider, GuessRequest, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434/api/generate";

/// Ollama provider for local guesses.
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    client: Client,
    model: String,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    system: Option<String>,
    stream: bool,
    options: Option<GenerateOptions>,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
    #[serde(default)]
    eval_count: Option<u32>,
}

impl OllamaProvider {
    /// Create a new Ollama provider with the given model.
    pub fn new(model: impl Into<String>) -> Result<Self> {
        Self::with_options(model, DEFAULT_OLLAMA_URL)
    }

    /// Create a provider with a custom URL.
    pub fn with_options(model: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        // Local models can be slow to load.
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .map_err(|e| GapfillError::NetworkError(e.to_string()))?;

        Ok(Self {
            client,
            model: model.into(),
            base_url: base_url.into(),
        })
    }

    /// Create from environment variables.
    ///
    /// Reads `OLLAMA_MODEL` and optionally `OLLAMA_URL`.
    pub fn from_env() -> Result<Self> {
        let model = std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama3".to_string());
        let url = std::env::var("OLLAMA_URL").unwrap_or_else(|_| DEFAULT_OLLAMA_URL.to_string());
        Self::with_options(model, url)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn tags_url(&self) -> String {
        match self.base_url.strip_suffix("/api/generate") {
            Some(root) => format!("{}/api/tags", root),
            None => format!("{}/api/tags", self.base_url.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl GuessProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    #[instrument(skip(self, request), fields(gap = %request.context.gap))]
    async fn guess(&self, request: GuessRequest) -> Result<Guess> {
        debug!("Requesting guess from Ollama model {}", self.model);

        let api_request = GenerateRequest {
            model: self.model.clone(),
            prompt: user_prompt(&request),
            system: Some(SYSTEM_PROMPT.to_string()),
            stream: false,
            options: Some(GenerateOptions {
                temperature: Some(0.7),
                num_predict: Some(512),
            }),
        };

        let response = self
            .client
            .post(&self.base_url)
            .json(&api_request)
            .send()
            .await
            .map_err(|e| GapfillError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GapfillError::ProviderError(format!(
                "Ollama error {}: {}",
                status, body
            )));
        }

        let gen_response: GenerateResponse = response
            .json()
            .await
            .map_err(|e| GapfillError::ProviderError(e.to_string()))?;

        Ok(Guess {
            text: strip_code_blocks(&gen_response.response),
            tokens_used: gen_response.eval_count,
            metadata: None,
        })
    }

    async fn health_check(&self) -> Result<bool> {
        let response = self
            .client
            .get(self.tags_url())
            .send()
            .await
            .map_err(|e| GapfillError::NetworkError(e.to_string()))?;

        Ok(response.status().is_success())
    }
}
