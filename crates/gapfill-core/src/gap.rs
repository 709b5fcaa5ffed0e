//! Gap tokens and their resolution states.
//!
//! A gap is a marked region of template text awaiting substitution. Each gap
//! moves through `Created → Guessed → Merged → Filled`; any non-terminal
//! state may drop to `Failed`. States never move backwards except through an
//! explicit [`GapToken::reset`].

use crate::{DocumentId, FailureReason, GapfillError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a gap, the text between the marker delimiters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GapId(String);

impl GapId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A fresh UUID-based identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GapId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Resolution state of a gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "reason")]
pub enum GapState {
    /// Registered, waiting for a guess.
    Created,
    /// A candidate was received from the provider.
    Guessed,
    /// The merge policy decided the final replacement text.
    Merged,
    /// Replacement committed into the document.
    Filled,
    /// Resolution stopped.
    Failed(FailureReason),
}

impl GapState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Filled | Self::Failed(_))
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Created => 0,
            Self::Guessed => 1,
            Self::Merged => 2,
            Self::Filled | Self::Failed(_) => 3,
        }
    }

    /// Whether `next` is a legal successor of this state.
    ///
    /// Forward moves are monotonic: a manual commit may jump straight to
    /// `Filled`, but nothing moves back and terminal states are final.
    pub fn can_advance_to(&self, next: &GapState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            GapState::Failed(_) => true,
            _ => next.rank() > self.rank(),
        }
    }
}

impl fmt::Display for GapState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => f.write_str("created"),
            Self::Guessed => f.write_str("guessed"),
            Self::Merged => f.write_str("merged"),
            Self::Filled => f.write_str("filled"),
            Self::Failed(reason) => write!(f, "failed ({})", reason),
        }
    }
}

/// One substitutable region of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapToken {
    /// Unique identifier of this gap.
    pub id: GapId,

    /// Document that owns the gap.
    pub document: DocumentId,

    state: GapState,

    /// Candidate text received from the provider.
    candidate: Option<String>,

    /// Text the merge policy settled on.
    replacement: Option<String>,
}

impl GapToken {
    pub(crate) fn new(id: GapId, document: DocumentId) -> Self {
        Self {
            id,
            document,
            state: GapState::Created,
            candidate: None,
            replacement: None,
        }
    }

    pub fn state(&self) -> GapState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        !self.state.is_terminal()
    }

    pub fn candidate(&self) -> Option<&str> {
        self.candidate.as_deref()
    }

    /// Accepted replacement text, present once the gap is merged.
    pub fn replacement(&self) -> Option<&str> {
        self.replacement.as_deref()
    }

    /// The marker text this gap occupies in its document.
    pub fn marker(&self) -> String {
        crate::marker::format_marker(&self.id)
    }

    pub fn failure(&self) -> Option<FailureReason> {
        match self.state {
            GapState::Failed(reason) => Some(reason),
            _ => None,
        }
    }

    fn advance(&mut self, next: GapState) -> Result<()> {
        if !self.state.can_advance_to(&next) {
            return Err(GapfillError::UnknownGap(format!(
                "{} (cannot move from {} to {})",
                self.id, self.state, next
            )));
        }
        self.state = next;
        Ok(())
    }

    pub(crate) fn record_guess(&mut self, candidate: String) -> Result<()> {
        if self.state != GapState::Created {
            return Err(GapfillError::UnknownGap(self.id.to_string()));
        }
        self.advance(GapState::Guessed)?;
        self.candidate = Some(candidate);
        Ok(())
    }

    pub(crate) fn mark_merged(&mut self, replacement: String) -> Result<()> {
        if self.state != GapState::Guessed {
            return Err(GapfillError::UnknownGap(self.id.to_string()));
        }
        self.advance(GapState::Merged)?;
        self.replacement = Some(replacement);
        Ok(())
    }

    pub(crate) fn mark_filled(&mut self, replacement: String) -> Result<()> {
        self.advance(GapState::Filled)?;
        self.replacement = Some(replacement);
        Ok(())
    }

    pub(crate) fn fail(&mut self, reason: FailureReason) -> Result<()> {
        self.advance(GapState::Failed(reason))
    }

    /// Return a failed gap to `Created`, dropping its candidate.
    pub(crate) fn reset(&mut self) -> Result<()> {
        if self.failure().is_none() {
            return Err(GapfillError::UnknownGap(format!(
                "{} (only failed gaps can be reset, state is {})",
                self.id, self.state
            )));
        }
        self.state = GapState::Created;
        self.candidate = None;
        self.replacement = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> GapToken {
        GapToken::new(GapId::new("A"), DocumentId::new())
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut gap = token();
        assert_eq!(gap.state(), GapState::Created);
        gap.record_guess("world".into()).unwrap();
        assert_eq!(gap.candidate(), Some("world"));
        gap.mark_merged("world".into()).unwrap();
        gap.mark_filled("world".into()).unwrap();
        assert_eq!(gap.state(), GapState::Filled);
        assert!(!gap.is_open());
    }

    #[test]
    fn test_no_state_is_revisited() {
        let mut gap = token();
        gap.record_guess("x".into()).unwrap();
        assert!(gap.record_guess("y".into()).is_err());
        gap.mark_merged("x".into()).unwrap();
        assert!(gap.mark_merged("x".into()).is_err());
        assert!(!GapState::Merged.can_advance_to(&GapState::Guessed));
    }

    #[test]
    fn test_merge_requires_guess() {
        let mut gap = token();
        assert!(gap.mark_merged("x".into()).is_err());
        assert_eq!(gap.state(), GapState::Created);
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut gap = token();
        gap.fail(FailureReason::Cancelled).unwrap();
        assert!(gap.fail(FailureReason::GuessUnavailable).is_err());
        assert!(gap.mark_filled("late".into()).is_err());
        assert_eq!(gap.failure(), Some(FailureReason::Cancelled));
    }

    #[test]
    fn test_reset_only_from_failed() {
        let mut gap = token();
        assert!(gap.reset().is_err());
        gap.record_guess("x".into()).unwrap();
        gap.fail(FailureReason::MarkerNotFound).unwrap();
        gap.reset().unwrap();
        assert_eq!(gap.state(), GapState::Created);
        assert_eq!(gap.candidate(), None);
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_string(&GapState::Failed(FailureReason::Cancelled)).unwrap();
        assert_eq!(json, r#"{"state":"failed","reason":"cancelled"}"#);
    }
}
