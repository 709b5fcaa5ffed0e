//! Gap context handed to guess providers.
//!
//! The context is the text window around a gap's marker, plus any hints the
//! caller wants the provider to see.

use crate::GapId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Range;

/// Context for guessing one gap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapContext {
    /// Gap being guessed.
    pub gap: GapId,

    /// Marker text of the gap.
    pub marker: String,

    /// Text immediately before the marker.
    pub before: String,

    /// Text immediately after the marker.
    pub after: String,

    /// Free-form hints (tone, language, expected length, ...).
    pub hints: BTreeMap<String, String>,
}

impl GapContext {
    /// Build the context for the marker at `span`, keeping at most `chars`
    /// characters on each side.
    pub fn around(text: &str, gap: GapId, span: Range<usize>, chars: usize) -> Self {
        let before = &text[..span.start];
        let after = &text[span.end..];

        let before_start = before
            .char_indices()
            .rev()
            .nth(chars.saturating_sub(1))
            .map(|(i, _)| i)
            .unwrap_or(0);
        let before = if chars == 0 { "" } else { &before[before_start..] };

        let after_end = after
            .char_indices()
            .nth(chars)
            .map(|(i, _)| i)
            .unwrap_or(after.len());

        Self {
            gap,
            marker: text[span].to_string(),
            before: before.to_string(),
            after: after[..after_end].to_string(),
            hints: BTreeMap::new(),
        }
    }

    /// Add a hint.
    pub fn with_hint(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.hints.insert(key.into(), value.into());
        self
    }

    /// The window with the marker in place.
    pub fn window(&self) -> String {
        format!("{}{}{}", self.before, self.marker, self.after)
    }

    /// Convert context to a prompt fragment for a text model.
    pub fn to_prompt(&self) -> String {
        let mut parts = vec![format!("Gap: {}", self.marker)];

        for (key, value) in &self.hints {
            parts.push(format!("{}: {}", key, value));
        }

        parts.push(format!("Surrounding text:\n```\n{}\n```", self.window()));
        parts.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_is_clipped() {
        let text = "abcdefgh|_A_|ijklmnop";
        let ctx = GapContext::around(text, GapId::new("A"), 8..13, 3);
        assert_eq!(ctx.before, "fgh");
        assert_eq!(ctx.after, "ijk");
        assert_eq!(ctx.window(), "fgh|_A_|ijk");
    }

    #[test]
    fn test_window_at_edges() {
        let text = "|_A_|!";
        let ctx = GapContext::around(text, GapId::new("A"), 0..5, 10);
        assert_eq!(ctx.before, "");
        assert_eq!(ctx.after, "!");
    }

    #[test]
    fn test_window_respects_char_boundaries() {
        let text = "héllo |_A_| wörld";
        let start = text.find("|_A_|").unwrap();
        let ctx = GapContext::around(text, GapId::new("A"), start..start + 5, 4);
        assert_eq!(ctx.before, "llo ");
        assert_eq!(ctx.after, " wör");
    }

    #[test]
    fn test_context_to_prompt() {
        let ctx = GapContext::around("Hello |_A_|!", GapId::new("A"), 6..11, 80)
            .with_hint("tone", "friendly");
        let prompt = ctx.to_prompt();
        assert!(prompt.contains("Gap: |_A_|"));
        assert!(prompt.contains("tone: friendly"));
        assert!(prompt.contains("Hello |_A_|!"));
    }
}
