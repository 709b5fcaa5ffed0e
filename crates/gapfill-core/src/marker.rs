//! Marker syntax and scanning.
//!
//! Gaps are marked in template text as `|_<id>_|`. The identifier is one or
//! more segments of ASCII letters, digits and `-`, joined by single
//! underscores, so a hyphenated UUID is a valid identifier.

use crate::{GapId, GapfillError, Result};
use regex::Regex;
use std::sync::OnceLock;

/// Opening delimiter of a marker.
pub const MARKER_OPEN: &str = "|_";

/// Closing delimiter of a marker.
pub const MARKER_CLOSE: &str = "_|";

/// Pattern for matching gap markers in text.
const MARKER_PATTERN: &str = r"\|_([A-Za-z0-9-]+(?:_[A-Za-z0-9-]+)*)_\|";

static MARKER_REGEX: OnceLock<Regex> = OnceLock::new();

fn get_marker_regex() -> &'static Regex {
    MARKER_REGEX.get_or_init(|| Regex::new(MARKER_PATTERN).expect("Invalid marker pattern regex"))
}

/// A marker found in text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerLocation {
    /// Identifier between the delimiters.
    pub id: GapId,

    /// Byte offset of the opening delimiter.
    pub start: usize,

    /// Byte offset just past the closing delimiter.
    pub end: usize,
}

impl MarkerLocation {
    pub fn span(&self) -> std::ops::Range<usize> {
        self.start..self.end
    }
}

/// Render the marker text for a gap identifier.
pub fn format_marker(id: &GapId) -> String {
    format!("{}{}{}", MARKER_OPEN, id.as_str(), MARKER_CLOSE)
}

/// Parse a complete marker (`|_A_|`) into its gap identifier.
pub fn parse_marker(marker: &str) -> Result<GapId> {
    let re = get_marker_regex();
    match re.captures(marker) {
        Some(cap) if cap.get(0).map(|m| m.as_str().len()) == Some(marker.len()) => {
            Ok(GapId::new(&cap[1]))
        }
        _ => Err(GapfillError::invalid_marker(
            marker,
            "expected |_<id>_| with an id of letters, digits, '-' and single '_'",
        )),
    }
}

/// Check whether a bare identifier is valid inside a marker.
pub fn is_valid_id(id: &str) -> bool {
    parse_marker(&format!("{}{}{}", MARKER_OPEN, id, MARKER_CLOSE)).is_ok()
}

/// Find all markers in text, in order of appearance.
pub fn find_markers(text: &str) -> Vec<MarkerLocation> {
    get_marker_regex()
        .captures_iter(text)
        .filter_map(|cap| {
            let whole = cap.get(0)?;
            Some(MarkerLocation {
                id: GapId::new(&cap[1]),
                start: whole.start(),
                end: whole.end(),
            })
        })
        .collect()
}

/// Locate the marker for `id`, returning its span only when it occurs exactly once.
pub fn locate_unique(text: &str, id: &GapId) -> MarkerMatch {
    let marker = format_marker(id);
    let mut hits = text.match_indices(&marker);
    match (hits.next(), hits.next()) {
        (None, _) => MarkerMatch::Missing,
        (Some((start, _)), None) => MarkerMatch::Unique(start..start + marker.len()),
        (Some(_), Some(_)) => MarkerMatch::Ambiguous,
    }
}

/// Outcome of looking up a marker in text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerMatch {
    Missing,
    Unique(std::ops::Range<usize>),
    Ambiguous,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_marker() {
        assert_eq!(parse_marker("|_A_|").unwrap().as_str(), "A");
        assert_eq!(parse_marker("|_my_gap_|").unwrap().as_str(), "my_gap");
        assert_eq!(
            parse_marker("|_3f2c1a9e-0b7d-4c1e-9a55-1d2e3f4a5b6c_|").unwrap().as_str(),
            "3f2c1a9e-0b7d-4c1e-9a55-1d2e3f4a5b6c"
        );
    }

    #[test]
    fn test_malformed_markers() {
        for bad in ["", "A", "|_|", "|__|", "|__A_|", "|_A__|", "|_a__b_|", "|_A_| ", "x|_A_|", "|_A B_|"] {
            assert!(
                matches!(parse_marker(bad), Err(GapfillError::InvalidMarker { .. })),
                "accepted {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_find_markers() {
        let found = find_markers("Hello |_A_| and |_b-2_|! |_ not a marker _|");
        let ids: Vec<_> = found.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["A", "b-2"]);
        assert_eq!(found[0].span(), 6..11);
    }

    #[test]
    fn test_locate_unique() {
        let id = GapId::new("A");
        assert_eq!(locate_unique("x |_A_| y", &id), MarkerMatch::Unique(2..7));
        assert_eq!(locate_unique("x y", &id), MarkerMatch::Missing);
        assert_eq!(locate_unique("|_A_||_A_|", &id), MarkerMatch::Ambiguous);
    }

    #[test]
    fn test_valid_id() {
        assert!(is_valid_id("gap_1"));
        assert!(!is_valid_id("gap_"));
        assert!(!is_valid_id(""));
    }
}
