//! Error types for Gapfill Core.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for gapfill operations.
pub type Result<T> = std::result::Result<T, GapfillError>;

/// Main error type for the gapfill engine.
#[derive(Debug, Error)]
pub enum GapfillError {
    /// Marker is malformed, ambiguous, or already tracked.
    #[error("Invalid marker '{marker}': {reason}")]
    InvalidMarker { marker: String, reason: String },

    /// Gap is not open in the document.
    #[error("Gap '{0}' is not open in this document")]
    UnknownGap(String),

    /// The marker text for a gap is no longer present in the document.
    #[error("Marker for gap '{0}' not found in document text")]
    MarkerNotFound(String),

    /// The provider produced no usable candidate.
    #[error("No guess available for gap '{gap}': {reason}")]
    GuessUnavailable { gap: String, reason: String },

    /// Resolution was cancelled.
    #[error("Resolution of gap '{0}' was cancelled")]
    Cancelled(String),

    /// A raw text edit targeted an invalid byte range.
    #[error("Invalid edit: {0}")]
    InvalidEdit(String),

    /// Document not registered.
    #[error("Document '{0}' not found")]
    NotFound(String),

    /// Guess provider returned an error.
    #[error("Guess provider error: {0}")]
    ProviderError(String),

    /// Network request failed.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A resolution task panicked or was aborted.
    #[error("Task error: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// IO operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GapfillError {
    pub(crate) fn invalid_marker(marker: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidMarker {
            marker: marker.into(),
            reason: reason.into(),
        }
    }

    /// The failure reason a gap records when this error ends its resolution.
    pub fn failure_reason(&self) -> FailureReason {
        match self {
            Self::UnknownGap(_) => FailureReason::UnknownGap,
            Self::MarkerNotFound(_) => FailureReason::MarkerNotFound,
            Self::InvalidMarker { .. } => FailureReason::InvalidMarker,
            Self::Cancelled(_) => FailureReason::Cancelled,
            _ => FailureReason::GuessUnavailable,
        }
    }
}

/// Why a gap ended in the `Failed` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Provider error, timeout, or empty candidate.
    GuessUnavailable,
    /// The gap was no longer open when the engine tried to commit it.
    UnknownGap,
    /// The marker disappeared before commit.
    MarkerNotFound,
    /// The marker was no longer unique, or committing would have broken
    /// another gap's marker.
    InvalidMarker,
    /// The owning document was cancelled.
    Cancelled,
}

impl FailureReason {
    /// Build the error surfaced to the caller for a gap that failed this way.
    pub fn into_error(self, gap: &str) -> GapfillError {
        match self {
            Self::GuessUnavailable => GapfillError::GuessUnavailable {
                gap: gap.to_string(),
                reason: "provider gave no candidate".to_string(),
            },
            Self::UnknownGap => GapfillError::UnknownGap(gap.to_string()),
            Self::MarkerNotFound => GapfillError::MarkerNotFound(gap.to_string()),
            Self::InvalidMarker => GapfillError::InvalidMarker {
                marker: crate::marker::format_marker(&crate::GapId::new(gap)),
                reason: "marker could not be committed".to_string(),
            },
            Self::Cancelled => GapfillError::Cancelled(gap.to_string()),
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::GuessUnavailable => "guess unavailable",
            Self::UnknownGap => "unknown gap",
            Self::MarkerNotFound => "marker not found",
            Self::InvalidMarker => "invalid marker",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_reason_matches_error() {
        let err = GapfillError::invalid_marker("|_A_|", "occurs more than once in the document");
        assert_eq!(err.failure_reason(), FailureReason::InvalidMarker);
        assert!(matches!(
            FailureReason::InvalidMarker.into_error("A"),
            GapfillError::InvalidMarker { marker, .. } if marker == "|_A_|"
        ));

        let err = GapfillError::MarkerNotFound("A".to_string());
        assert_eq!(err.failure_reason(), FailureReason::MarkerNotFound);
    }

    #[test]
    fn test_provider_errors_are_guess_unavailable() {
        let err = GapfillError::ProviderError("down".to_string());
        assert_eq!(err.failure_reason(), FailureReason::GuessUnavailable);
    }
}
