//! # Gapfill AI
//!
//! Model-backed [`GuessProvider`] implementations for the gap-fill engine.
//!
//! - **OpenAI**: any chat-completions compatible endpoint
//! - **Local**: Ollama
//!
//! ## Example
//!
//! ```rust,ignore
//! use gapfill_core::{DocumentRegistry, GapResolutionEngine};
//!
//! let provider = gapfill_ai::openai("gpt-4o-mini")?;
//! let engine = GapResolutionEngine::new(provider, DocumentRegistry::global());
//! ```

pub mod ollama;
pub mod openai;
mod prompt;

pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

/// Re-export core types for convenience.
pub use gapfill_core::{GapfillError, GuessProvider, ProviderConfig, Result};

/// Create an OpenAI provider with a single line.
///
/// # Example
///
/// ```rust,ignore
/// let provider = gapfill_ai::openai("gpt-4o-mini")?;
/// ```
pub fn openai(model: &str) -> Result<OpenAiProvider> {
    OpenAiProvider::from_env_with_model(model)
}

/// Create an Ollama provider with a single line.
///
/// # Example
///
/// ```rust,ignore
/// let provider = gapfill_ai::ollama("llama3")?;
/// ```
pub fn ollama(model: &str) -> Result<OllamaProvider> {
    OllamaProvider::new(model)
}
