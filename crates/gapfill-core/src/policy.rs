//! Merge policies.
//!
//! A merge policy partitions a document's open gaps into groups and decides
//! the text committed for each group once its guesses are in.

use crate::{GapId, GapState, GapfillError, Result, TextDocument};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Rule used to combine candidate guesses into committed text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// Each gap takes its own candidate verbatim.
    #[default]
    Single,

    /// Gaps whose context windows overlap are merged.
    Merge,

    /// All unresolved gaps of the document are merged.
    MergeAll,
}

impl FromStr for MergePolicy {
    type Err = GapfillError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "single" => Ok(Self::Single),
            "merge" => Ok(Self::Merge),
            "merge_all" | "merge-all" | "mergeall" => Ok(Self::MergeAll),
            other => Err(GapfillError::ConfigError(format!("Unknown merge policy: {}", other))),
        }
    }
}

impl fmt::Display for MergePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Single => "single",
            Self::Merge => "merge",
            Self::MergeAll => "merge_all",
        };
        f.write_str(s)
    }
}

/// Final replacement decided for one group of gaps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    /// Gap receiving the merged text.
    pub leader: GapId,

    /// Every guessed member with its replacement, in registration order.
    /// The leader carries the merged text, the rest the empty string.
    pub members: Vec<(GapId, String)>,
}

impl Settlement {
    pub fn merged_text(&self) -> &str {
        self.members
            .iter()
            .find(|(id, _)| id == &self.leader)
            .map(|(_, text)| text.as_str())
            .unwrap_or_default()
    }
}

impl MergePolicy {
    /// Partition the open gaps of `doc` into groups, each in registration order.
    ///
    /// `window` widens each marker span on both sides before testing overlap;
    /// it only matters for [`MergePolicy::Merge`].
    pub fn group(&self, doc: &TextDocument, window: usize) -> Vec<Vec<GapId>> {
        let open = doc.open_gaps();
        match self {
            Self::Single => open.into_iter().map(|g| vec![g.id]).collect(),
            Self::MergeAll => {
                if open.is_empty() {
                    Vec::new()
                } else {
                    vec![open.into_iter().map(|g| g.id).collect()]
                }
            }
            Self::Merge => group_overlapping(doc, open.into_iter().map(|g| g.id).collect(), window),
        }
    }

    /// Groups that are ready to merge: no member is still waiting for a guess
    /// and at least one member holds a candidate.
    pub fn settle(&self, doc: &TextDocument, window: usize) -> Vec<Settlement> {
        self.group(doc, window)
            .into_iter()
            .filter_map(|group| settle_group(doc, &group))
            .collect()
    }
}

fn settle_group(doc: &TextDocument, group: &[GapId]) -> Option<Settlement> {
    let mut guessed = Vec::new();

    for id in group {
        let gap = doc.gap(id)?;
        match gap.state() {
            GapState::Created => return None,
            GapState::Guessed => guessed.push((id.clone(), gap.candidate().unwrap_or_default())),
            _ => {}
        }
    }

    let (leader, _) = guessed.first()?.clone();
    let merged = guessed
        .iter()
        .map(|(_, text)| *text)
        .collect::<Vec<_>>()
        .join(" ");

    let members = guessed
        .iter()
        .map(|(id, _)| {
            let text = if id == &leader { merged.clone() } else { String::new() };
            (id.clone(), text)
        })
        .collect();

    Some(Settlement { leader, members })
}

/// Connected components of gaps whose widened marker spans overlap.
fn group_overlapping(doc: &TextDocument, open: Vec<GapId>, window: usize) -> Vec<Vec<GapId>> {
    // (registration index, widened span); gaps without a locatable marker stand alone
    let mut spans = Vec::new();
    let mut groups: Vec<Vec<usize>> = Vec::new();

    for (index, id) in open.iter().enumerate() {
        match doc.marker_span(id) {
            Ok(span) => spans.push((index, span.start.saturating_sub(window), span.end + window)),
            Err(_) => groups.push(vec![index]),
        }
    }

    spans.sort_by_key(|&(_, start, _)| start);

    let mut current: Vec<usize> = Vec::new();
    let mut current_end = 0;
    for (index, start, end) in spans {
        if !current.is_empty() && start >= current_end {
            groups.push(std::mem::take(&mut current));
        }
        current.push(index);
        current_end = current_end.max(end);
    }
    if !current.is_empty() {
        groups.push(current);
    }

    let mut groups: Vec<Vec<GapId>> = groups
        .into_iter()
        .map(|mut members| {
            members.sort_unstable();
            members.into_iter().map(|i| open[i].clone()).collect()
        })
        .collect();
    groups.sort_by_key(|g| open.iter().position(|id| Some(id) == g.first()));
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FailureReason;

    fn doc_with(text: &str, markers: &[&str]) -> TextDocument {
        let mut doc = TextDocument::new(text);
        for m in markers {
            doc.register_gap(m).unwrap();
        }
        doc
    }

    fn ids(groups: Vec<Vec<GapId>>) -> Vec<Vec<String>> {
        groups
            .into_iter()
            .map(|g| g.into_iter().map(|id| id.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_parse_policy() {
        assert_eq!("single".parse::<MergePolicy>().unwrap(), MergePolicy::Single);
        assert_eq!("Merge".parse::<MergePolicy>().unwrap(), MergePolicy::Merge);
        assert_eq!("merge-all".parse::<MergePolicy>().unwrap(), MergePolicy::MergeAll);
        assert!("sometimes".parse::<MergePolicy>().is_err());
    }

    #[test]
    fn test_single_groups() {
        let doc = doc_with("|_A_||_B_|", &["|_A_|", "|_B_|"]);
        assert_eq!(ids(MergePolicy::Single.group(&doc, 8)), vec![vec!["A"], vec!["B"]]);
    }

    #[test]
    fn test_merge_groups_by_window() {
        let text = "a |_A_| |_B_| ........................ |_C_|";
        let doc = doc_with(text, &["|_C_|", "|_B_|", "|_A_|"]);
        let groups = ids(MergePolicy::Merge.group(&doc, 4));
        assert_eq!(groups, vec![vec!["C"], vec!["B", "A"]]);

        let groups = ids(MergePolicy::Merge.group(&doc, 0));
        assert_eq!(groups, vec![vec!["C"], vec!["B"], vec!["A"]]);
    }

    #[test]
    fn test_merge_is_transitive() {
        let doc = doc_with("|_A_| |_B_| |_C_|", &["|_A_|", "|_B_|", "|_C_|"]);
        assert_eq!(ids(MergePolicy::Merge.group(&doc, 1)), vec![vec!["A", "B", "C"]]);
    }

    #[test]
    fn test_merge_all_groups_everything_open() {
        let mut doc = doc_with("|_A_| far away |_B_| |_C_|", &["|_A_|", "|_B_|", "|_C_|"]);
        doc.fail(&GapId::new("B"), FailureReason::GuessUnavailable).unwrap();
        assert_eq!(ids(MergePolicy::MergeAll.group(&doc, 0)), vec![vec!["A", "C"]]);
    }

    #[test]
    fn test_settle_waits_for_pending_members() {
        let mut doc = doc_with("Park the |_A_||_B_| here.", &["|_A_|", "|_B_|"]);
        doc.record_guess(&GapId::new("A"), "red".into()).unwrap();
        assert!(MergePolicy::Merge.settle(&doc, 8).is_empty());

        doc.record_guess(&GapId::new("B"), "car".into()).unwrap();
        let settled = MergePolicy::Merge.settle(&doc, 8);
        assert_eq!(settled.len(), 1);
        assert_eq!(settled[0].leader.as_str(), "A");
        assert_eq!(settled[0].merged_text(), "red car");
        assert_eq!(settled[0].members[1], (GapId::new("B"), String::new()));
    }

    #[test]
    fn test_settle_skips_failed_members() {
        let mut doc = doc_with("|_A_||_B_|", &["|_A_|", "|_B_|"]);
        doc.record_guess(&GapId::new("B"), "car".into()).unwrap();
        doc.fail(&GapId::new("A"), FailureReason::GuessUnavailable).unwrap();
        let settled = MergePolicy::MergeAll.settle(&doc, 0);
        assert_eq!(settled[0].leader.as_str(), "B");
        assert_eq!(settled[0].merged_text(), "car");
    }

    #[test]
    fn test_single_settles_independently() {
        let mut doc = doc_with("|_A_||_B_|", &["|_A_|", "|_B_|"]);
        doc.record_guess(&GapId::new("B"), "car".into()).unwrap();
        let settled = MergePolicy::Single.settle(&doc, 8);
        assert_eq!(settled.len(), 1);
        assert_eq!(settled[0].merged_text(), "car");
    }
}
