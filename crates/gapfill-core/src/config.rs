//! # Engine Configuration
//!
//! Central configuration for the gap resolution engine.
//! Supports loading from environment variables and programmatic defaults.

use crate::MergePolicy;
use std::env;
use std::time::Duration;

/// Configuration for [`GapResolutionEngine`](crate::GapResolutionEngine).
///
/// # Example
/// ```rust
/// use gapfill_core::{EngineConfig, MergePolicy};
///
/// // Load from environment
/// let config = EngineConfig::from_env();
///
/// // Or customize
/// let config = EngineConfig::default()
///     .with_policy(MergePolicy::Merge)
///     .with_max_retries(0);
/// assert_eq!(config.policy, MergePolicy::Merge);
/// ```
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How candidates are combined into committed text.
    /// Default: Single, Env: GAPFILL_POLICY=merge
    pub policy: MergePolicy,

    /// Upper bound on one guess request, retries included.
    /// Default: 30s, Env: GAPFILL_GUESS_TIMEOUT_MS=30000
    pub guess_timeout: Duration,

    /// Maximum retries after a provider error.
    /// Default: 2, Env: GAPFILL_MAX_RETRIES=3
    pub max_retries: u32,

    /// Base delay for retry backoff in milliseconds.
    /// Default: 100, Env: GAPFILL_RETRY_BACKOFF=100
    pub retry_backoff_ms: u64,

    /// Characters of text on each side of a marker sent to the provider.
    /// Default: 80, Env: GAPFILL_CONTEXT_CHARS=80
    pub context_chars: usize,

    /// Bytes added on each side of a marker when testing whether two gaps
    /// overlap under the `Merge` policy.
    /// Default: 8, Env: GAPFILL_MERGE_WINDOW=8
    pub merge_window: usize,

    /// Resolution rounds per document. Markers introduced by committed text
    /// are picked up in the next round; 1 disables follow-ups.
    /// Default: 1, Env: GAPFILL_MAX_ROUNDS=3
    pub max_rounds: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            policy: MergePolicy::Single,
            guess_timeout: Duration::from_secs(30),
            max_retries: 2,
            retry_backoff_ms: 100,
            context_chars: 80,
            merge_window: 8,
            max_rounds: 1,
        }
    }
}

impl EngineConfig {
    /// Create a new config from environment variables.
    /// Falls back to defaults for missing or unparsable variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = env::var("GAPFILL_POLICY") {
            if let Ok(policy) = v.parse() {
                config.policy = policy;
            }
        }
        if let Ok(v) = env::var("GAPFILL_GUESS_TIMEOUT_MS") {
            if let Ok(n) = v.parse() {
                config.guess_timeout = Duration::from_millis(n);
            }
        }
        if let Ok(v) = env::var("GAPFILL_MAX_RETRIES") {
            if let Ok(n) = v.parse() {
                config.max_retries = n;
            }
        }
        if let Ok(v) = env::var("GAPFILL_RETRY_BACKOFF") {
            if let Ok(n) = v.parse() {
                config.retry_backoff_ms = n;
            }
        }
        if let Ok(v) = env::var("GAPFILL_CONTEXT_CHARS") {
            if let Ok(n) = v.parse() {
                config.context_chars = n;
            }
        }
        if let Ok(v) = env::var("GAPFILL_MERGE_WINDOW") {
            if let Ok(n) = v.parse() {
                config.merge_window = n;
            }
        }
        if let Ok(v) = env::var("GAPFILL_MAX_ROUNDS") {
            if let Ok(n) = v.parse::<u32>() {
                config.max_rounds = n.max(1);
            }
        }

        config
    }

    /// Builder: Set the merge policy.
    pub fn with_policy(mut self, policy: MergePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Builder: Set the guess timeout.
    pub fn with_guess_timeout(mut self, timeout: Duration) -> Self {
        self.guess_timeout = timeout;
        self
    }

    /// Builder: Set maximum retries.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Builder: Set retry backoff base in milliseconds.
    pub fn with_retry_backoff_ms(mut self, ms: u64) -> Self {
        self.retry_backoff_ms = ms;
        self
    }

    /// Builder: Set the context window sent to providers.
    pub fn with_context_chars(mut self, chars: usize) -> Self {
        self.context_chars = chars;
        self
    }

    /// Builder: Set the overlap window for the `Merge` policy.
    pub fn with_merge_window(mut self, window: usize) -> Self {
        self.merge_window = window;
        self
    }

    /// Builder: Set the number of resolution rounds (at least 1).
    pub fn with_max_rounds(mut self, rounds: u32) -> Self {
        self.max_rounds = rounds.max(1);
        self
    }

    /// Backoff before retry number `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(attempt as u64 + 1))
    }
}
