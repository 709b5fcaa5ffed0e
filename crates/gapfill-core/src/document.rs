//! Text documents and the gaps they own.
//!
//! A [`TextDocument`] holds mutable template text and the gaps registered in
//! it. Every open gap corresponds to exactly one marker in the text; commits
//! replace that marker and retire the gap.

use crate::{
    marker::{self, MarkerMatch},
    FailureReason, GapContext, GapId, GapToken, GapfillError, Result,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use tracing::{debug, warn};
use uuid::Uuid;

/// Unique identifier of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(Uuid);

impl DocumentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for DocumentId {
    type Err = GapfillError;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| GapfillError::NotFound(s.to_string()))
    }
}

/// A template document with tracked gaps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextDocument {
    id: DocumentId,

    text: String,

    /// Tracked gaps in registration order. Filled gaps are removed; failed
    /// gaps stay until re-registered so callers can inspect them.
    gaps: Vec<GapToken>,
}

impl TextDocument {
    /// Create a document. No gaps are tracked until registered.
    ///
    /// # Example
    ///
    /// ```
    /// use gapfill_core::TextDocument;
    ///
    /// let mut doc = TextDocument::new("Hello |_A_|!");
    /// let gap = doc.register_gap("|_A_|").unwrap();
    /// doc.commit(&gap.id, "world").unwrap();
    /// assert_eq!(doc.text(), "Hello world!");
    /// ```
    pub fn new(text: impl Into<String>) -> Self {
        Self::with_id(DocumentId::new(), text)
    }

    pub(crate) fn with_id(id: DocumentId, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
            gaps: Vec::new(),
        }
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Start tracking a marker that is already present in the text.
    ///
    /// Re-registering the marker of a failed gap replaces the failed record
    /// with a fresh one at the end of the registration order.
    pub fn register_gap(&mut self, marker_text: &str) -> Result<GapToken> {
        let id = marker::parse_marker(marker_text)?;

        let existing = self.position(&id);
        if existing.is_some_and(|pos| self.gaps[pos].is_open()) {
            return Err(GapfillError::invalid_marker(marker_text, "already registered"));
        }

        let span = match marker::locate_unique(&self.text, &id) {
            MarkerMatch::Unique(span) => span,
            MarkerMatch::Missing => return Err(GapfillError::MarkerNotFound(id.to_string())),
            MarkerMatch::Ambiguous => {
                return Err(GapfillError::invalid_marker(
                    marker_text,
                    "occurs more than once in the document",
                ))
            }
        };

        if let Some(other) = self.overlapping_gap(&id, &span) {
            return Err(GapfillError::invalid_marker(
                marker_text,
                format!("overlaps the marker of gap {}", other),
            ));
        }

        if let Some(pos) = existing {
            debug!(gap = %id, "replacing failed gap registration");
            self.gaps.remove(pos);
        }

        let token = GapToken::new(id, self.id);
        self.gaps.push(token.clone());
        Ok(token)
    }

    /// Insert a marker for a freshly generated gap at byte `offset` and register it.
    pub fn insert_gap(&mut self, offset: usize) -> Result<GapToken> {
        let id = GapId::generate();
        let marker_text = marker::format_marker(&id);

        if !self.text.is_char_boundary(offset) {
            return Err(GapfillError::invalid_marker(
                marker_text,
                format!("offset {} is not a character boundary", offset),
            ));
        }

        self.text.insert_str(offset, &marker_text);
        self.register_gap(&marker_text)
    }

    /// Register every well-formed marker not yet tracked, in text order.
    ///
    /// Markers that occur more than once are skipped.
    pub fn discover_gaps(&mut self) -> Vec<GapToken> {
        let mut registered = Vec::new();

        for location in marker::find_markers(&self.text) {
            if self.position(&location.id).is_some()
                || registered.iter().any(|g: &GapToken| g.id == location.id)
            {
                continue;
            }
            match self.register_gap(&marker::format_marker(&location.id)) {
                Ok(token) => registered.push(token),
                Err(e) => warn!(gap = %location.id, "skipping marker: {}", e),
            }
        }

        registered
    }

    /// Replace the marker of an open gap with `replacement` and retire the gap.
    ///
    /// Returns the filled token. A second commit of the same gap fails with
    /// `UnknownGap`.
    pub fn commit(&mut self, gap_id: &GapId, replacement: &str) -> Result<GapToken> {
        let pos = self
            .position(gap_id)
            .filter(|&p| self.gaps[p].is_open())
            .ok_or_else(|| GapfillError::UnknownGap(gap_id.to_string()))?;

        for found in marker::find_markers(replacement) {
            if self.position(&found.id).is_some() {
                return Err(GapfillError::invalid_marker(
                    marker::format_marker(&found.id),
                    "replacement would duplicate a tracked marker",
                ));
            }
        }

        let span = self.marker_span(gap_id)?;
        let intact = self.intact_markers(gap_id);
        let marker_text = self.text[span.clone()].to_string();
        self.text.replace_range(span.clone(), replacement);

        // every other open gap must still have exactly one marker
        if let Some(broken) = intact
            .into_iter()
            .find(|id| !matches!(marker::locate_unique(&self.text, id), MarkerMatch::Unique(_)))
        {
            self.text
                .replace_range(span.start..span.start + replacement.len(), &marker_text);
            return Err(GapfillError::invalid_marker(
                marker::format_marker(&broken),
                format!("committing gap {} would break this marker", gap_id),
            ));
        }

        let mut token = self.gaps.remove(pos);
        token.mark_filled(replacement.to_string())?;
        debug!(gap = %gap_id, document = %self.id, "gap filled");
        Ok(token)
    }

    /// Open gaps in registration order.
    pub fn open_gaps(&self) -> Vec<GapToken> {
        self.gaps.iter().filter(|g| g.is_open()).cloned().collect()
    }

    /// All tracked gaps (open and failed) in registration order.
    pub fn gaps(&self) -> &[GapToken] {
        &self.gaps
    }

    pub fn gap(&self, gap_id: &GapId) -> Option<&GapToken> {
        self.gaps.iter().find(|g| &g.id == gap_id)
    }

    /// Byte span of a gap's marker in the current text.
    pub fn marker_span(&self, gap_id: &GapId) -> Result<Range<usize>> {
        match marker::locate_unique(&self.text, gap_id) {
            MarkerMatch::Unique(span) => Ok(span),
            MarkerMatch::Missing => Err(GapfillError::MarkerNotFound(gap_id.to_string())),
            MarkerMatch::Ambiguous => Err(GapfillError::invalid_marker(
                marker::format_marker(gap_id),
                "occurs more than once in the document",
            )),
        }
    }

    /// The text window around a gap, at most `chars` characters each side.
    pub fn context_for(&self, gap_id: &GapId, chars: usize) -> Result<GapContext> {
        if self.gap(gap_id).is_none() {
            return Err(GapfillError::UnknownGap(gap_id.to_string()));
        }
        let span = self.marker_span(gap_id)?;
        Ok(GapContext::around(&self.text, gap_id.clone(), span, chars))
    }

    /// Replace a byte range of the text verbatim.
    ///
    /// Markers destroyed by the edit are not untracked; committing their gaps
    /// later fails with `MarkerNotFound`.
    pub fn edit(&mut self, range: Range<usize>, replacement: &str) -> Result<()> {
        if range.start > range.end || range.end > self.text.len() {
            return Err(GapfillError::InvalidEdit(format!(
                "range {:?} out of bounds for length {}",
                range,
                self.text.len()
            )));
        }
        if !self.text.is_char_boundary(range.start) || !self.text.is_char_boundary(range.end) {
            return Err(GapfillError::InvalidEdit(format!(
                "range {:?} splits a character",
                range
            )));
        }
        self.text.replace_range(range, replacement);
        Ok(())
    }

    /// Mark an open gap as failed.
    pub fn fail(&mut self, gap_id: &GapId, reason: FailureReason) -> Result<()> {
        self.open_gap_mut(gap_id)?.fail(reason)
    }

    /// Return a failed gap to `Created`. Its marker must still be present.
    pub fn reset(&mut self, gap_id: &GapId) -> Result<()> {
        self.marker_span(gap_id)?;
        self.gaps
            .iter_mut()
            .find(|g| &g.id == gap_id)
            .ok_or_else(|| GapfillError::UnknownGap(gap_id.to_string()))?
            .reset()
    }

    /// Fail every open gap with `reason`, returning how many were affected.
    pub fn fail_open(&mut self, reason: FailureReason) -> usize {
        let mut count = 0;
        for gap in self.gaps.iter_mut().filter(|g| g.is_open()) {
            if gap.fail(reason).is_ok() {
                count += 1;
            }
        }
        count
    }

    pub(crate) fn record_guess(&mut self, gap_id: &GapId, candidate: String) -> Result<()> {
        self.open_gap_mut(gap_id)?.record_guess(candidate)
    }

    pub(crate) fn mark_merged(&mut self, gap_id: &GapId, replacement: String) -> Result<()> {
        self.open_gap_mut(gap_id)?.mark_merged(replacement)
    }

    /// Another open gap whose marker span overlaps `span`.
    fn overlapping_gap(&self, gap_id: &GapId, span: &Range<usize>) -> Option<GapId> {
        self.gaps
            .iter()
            .filter(|g| g.is_open() && &g.id != gap_id)
            .find(|g| {
                self.marker_span(&g.id)
                    .is_ok_and(|other| other.start < span.end && span.start < other.end)
            })
            .map(|g| g.id.clone())
    }

    /// Open gaps other than `gap_id` whose marker currently occurs exactly once.
    fn intact_markers(&self, gap_id: &GapId) -> Vec<GapId> {
        self.gaps
            .iter()
            .filter(|g| g.is_open() && &g.id != gap_id)
            .filter(|g| matches!(marker::locate_unique(&self.text, &g.id), MarkerMatch::Unique(_)))
            .map(|g| g.id.clone())
            .collect()
    }

    fn position(&self, gap_id: &GapId) -> Option<usize> {
        self.gaps.iter().position(|g| &g.id == gap_id)
    }

    fn open_gap_mut(&mut self, gap_id: &GapId) -> Result<&mut GapToken> {
        self.gaps
            .iter_mut()
            .find(|g| &g.id == gap_id && g.is_open())
            .ok_or_else(|| GapfillError::UnknownGap(gap_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GapState;

    #[test]
    fn test_register_and_commit() {
        let mut doc = TextDocument::new("Hello |_A_|!");
        let gap = doc.register_gap("|_A_|").unwrap();
        assert_eq!(gap.state(), GapState::Created);
        assert_eq!(doc.open_gaps().len(), 1);

        let filled = doc.commit(&gap.id, "world").unwrap();
        assert_eq!(filled.state(), GapState::Filled);
        assert_eq!(filled.replacement(), Some("world"));
        assert_eq!(doc.text(), "Hello world!");
        assert!(doc.open_gaps().is_empty());
    }

    #[test]
    fn test_commit_succeeds_exactly_once() {
        let mut doc = TextDocument::new("Hello |_A_|!");
        let gap = doc.register_gap("|_A_|").unwrap();
        doc.commit(&gap.id, "world").unwrap();

        let second = doc.commit(&gap.id, "again");
        assert!(matches!(second, Err(GapfillError::UnknownGap(_))));
        assert_eq!(doc.text(), "Hello world!");
    }

    #[test]
    fn test_register_rejects_bad_markers() {
        let mut doc = TextDocument::new("a |_A_| b |_B_| |_B_|");
        assert!(matches!(doc.register_gap("A"), Err(GapfillError::InvalidMarker { .. })));
        assert!(matches!(doc.register_gap("|_C_|"), Err(GapfillError::MarkerNotFound(_))));
        assert!(matches!(doc.register_gap("|_B_|"), Err(GapfillError::InvalidMarker { .. })));

        doc.register_gap("|_A_|").unwrap();
        assert!(matches!(doc.register_gap("|_A_|"), Err(GapfillError::InvalidMarker { .. })));
    }

    #[test]
    fn test_failed_gap_can_be_registered_again() {
        let mut doc = TextDocument::new("|_A_| |_B_|");
        let a = doc.register_gap("|_A_|").unwrap();
        doc.register_gap("|_B_|").unwrap();
        doc.fail(&a.id, FailureReason::GuessUnavailable).unwrap();
        assert_eq!(doc.open_gaps().len(), 1);

        doc.register_gap("|_A_|").unwrap();
        let order: Vec<_> = doc.open_gaps().into_iter().map(|g| g.id.to_string()).collect();
        assert_eq!(order, vec!["B", "A"]);
    }

    #[test]
    fn test_commit_unknown_gap() {
        let mut doc = TextDocument::new("Hello |_A_|!");
        let result = doc.commit(&GapId::new("A"), "world");
        assert!(matches!(result, Err(GapfillError::UnknownGap(_))));
    }

    #[test]
    fn test_commit_after_marker_edited_away() {
        let mut doc = TextDocument::new("Hello |_A_|!");
        let gap = doc.register_gap("|_A_|").unwrap();
        doc.edit(6..11, "there").unwrap();

        let result = doc.commit(&gap.id, "world");
        assert!(matches!(result, Err(GapfillError::MarkerNotFound(_))));
        assert_eq!(doc.text(), "Hello there!");
        assert!(doc.gap(&gap.id).unwrap().is_open());
    }

    #[test]
    fn test_commit_rejects_duplicate_tracked_marker() {
        let mut doc = TextDocument::new("|_A_| |_B_|");
        let a = doc.register_gap("|_A_|").unwrap();
        doc.register_gap("|_B_|").unwrap();
        let result = doc.commit(&a.id, "x |_B_|");
        assert!(matches!(result, Err(GapfillError::InvalidMarker { .. })));
        assert_eq!(doc.text(), "|_A_| |_B_|");
    }

    #[test]
    fn test_register_rejects_overlapping_marker() {
        let mut doc = TextDocument::new("|_A_|_B_|");
        doc.register_gap("|_A_|").unwrap();
        let result = doc.register_gap("|_B_|");
        assert!(matches!(result, Err(GapfillError::InvalidMarker { .. })));
        assert_eq!(doc.open_gaps().len(), 1);

        let mut doc = TextDocument::new("|_A_|_B_|");
        doc.register_gap("|_B_|").unwrap();
        assert!(matches!(doc.register_gap("|_A_|"), Err(GapfillError::InvalidMarker { .. })));
    }

    #[test]
    fn test_rejected_registration_keeps_failed_record() {
        let mut doc = TextDocument::new("|_A_| |_A_|");
        doc.edit(6..11, "").unwrap();
        let a = doc.register_gap("|_A_|").unwrap();
        doc.fail(&a.id, FailureReason::GuessUnavailable).unwrap();
        doc.edit(5..5, " |_A_|").unwrap();

        assert!(doc.register_gap("|_A_|").is_err());
        assert_eq!(doc.gap(&a.id).unwrap().failure(), Some(FailureReason::GuessUnavailable));
    }

    #[test]
    fn test_commit_cannot_duplicate_another_marker() {
        let mut doc = TextDocument::new("|_B_| |_|_A_|");
        doc.register_gap("|_B_|").unwrap();
        let a = doc.register_gap("|_A_|").unwrap();

        let result = doc.commit(&a.id, "B_|");
        assert!(matches!(result, Err(GapfillError::InvalidMarker { .. })));
        assert_eq!(doc.text(), "|_B_| |_|_A_|");
        assert!(doc.gap(&a.id).unwrap().is_open());

        doc.commit(&a.id, "C").unwrap();
        assert_eq!(doc.text(), "|_B_| |_C");
    }

    #[test]
    fn test_commit_ignores_markers_already_missing() {
        let mut doc = TextDocument::new("|_A_| |_B_|");
        let a = doc.register_gap("|_A_|").unwrap();
        doc.register_gap("|_B_|").unwrap();
        doc.edit(6..11, "gone").unwrap();

        doc.commit(&a.id, "x").unwrap();
        assert_eq!(doc.text(), "x gone");
    }

    #[test]
    fn test_open_gaps_in_registration_order() {
        let mut doc = TextDocument::new("|_C_| |_A_| |_B_|");
        doc.register_gap("|_B_|").unwrap();
        doc.register_gap("|_C_|").unwrap();
        doc.register_gap("|_A_|").unwrap();
        let ids: Vec<_> = doc.open_gaps().into_iter().map(|g| g.id.to_string()).collect();
        assert_eq!(ids, vec!["B", "C", "A"]);
    }

    #[test]
    fn test_open_gaps_empty_iff_all_terminal() {
        let mut doc = TextDocument::new("|_A_| |_B_|");
        let a = doc.register_gap("|_A_|").unwrap();
        let b = doc.register_gap("|_B_|").unwrap();
        doc.commit(&a.id, "x").unwrap();
        assert!(!doc.open_gaps().is_empty());
        doc.fail(&b.id, FailureReason::Cancelled).unwrap();
        assert!(doc.open_gaps().is_empty());
        assert_eq!(doc.gaps().len(), 1);
    }

    #[test]
    fn test_insert_gap() {
        let mut doc = TextDocument::new("Hello !");
        let gap = doc.insert_gap(6).unwrap();
        assert_eq!(doc.text(), format!("Hello {}!", gap.marker()));
        doc.commit(&gap.id, "world").unwrap();
        assert_eq!(doc.text(), "Hello world!");

        let mut doc = TextDocument::new("é");
        assert!(matches!(doc.insert_gap(1), Err(GapfillError::InvalidMarker { .. })));
    }

    #[test]
    fn test_discover_gaps() {
        let mut doc = TextDocument::new("|_A_| |_B_| |_A_| |_C_|");
        doc.register_gap("|_C_|").unwrap();
        let found: Vec<_> = doc.discover_gaps().into_iter().map(|g| g.id.to_string()).collect();
        assert_eq!(found, vec!["B"]);
        assert_eq!(doc.open_gaps().len(), 2);
    }

    #[test]
    fn test_reset_failed_gap() {
        let mut doc = TextDocument::new("x |_A_|");
        let a = doc.register_gap("|_A_|").unwrap();
        doc.fail(&a.id, FailureReason::GuessUnavailable).unwrap();
        doc.reset(&a.id).unwrap();
        assert_eq!(doc.gap(&a.id).unwrap().state(), GapState::Created);

        doc.fail(&a.id, FailureReason::GuessUnavailable).unwrap();
        doc.edit(2..7, "").unwrap();
        assert!(matches!(doc.reset(&a.id), Err(GapfillError::MarkerNotFound(_))));
    }

    #[test]
    fn test_context_for() {
        let mut doc = TextDocument::new("The quick |_A_| fox");
        let a = doc.register_gap("|_A_|").unwrap();
        let ctx = doc.context_for(&a.id, 6).unwrap();
        assert_eq!(ctx.before, "quick ");
        assert_eq!(ctx.after, " fox");
    }

    #[test]
    fn test_edit_bounds() {
        let mut doc = TextDocument::new("abc");
        assert!(matches!(doc.edit(2..5, "x"), Err(GapfillError::InvalidEdit(_))));
        doc.edit(1..2, "B").unwrap();
        assert_eq!(doc.text(), "aBc");
    }
}
