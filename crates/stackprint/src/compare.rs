//! Chain comparison
//!
//! Walks two normalized chains innermost-first in lock-step and reports the
//! first divergence. Exact line and column values never take part; only
//! their presence does.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::StackprintConfig;
use crate::frame::InvocationKind;
use crate::normalize::{ChainEntry, NormalizedChain, NormalizedFrame};

/// What differed at the divergence point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DivergenceReason {
    /// Invocation kinds differ
    Kind,
    /// Labels differ and are not both anonymous
    Label,
    /// Files differ, or line/column presence differs
    Site,
    /// An async boundary sits on one side only
    Boundary,
    /// One chain is a strict prefix of the other
    Length,
}

impl fmt::Display for DivergenceReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DivergenceReason::Kind => "kind",
            DivergenceReason::Label => "label",
            DivergenceReason::Site => "site",
            DivergenceReason::Boundary => "async boundary",
            DivergenceReason::Length => "length",
        };
        f.write_str(s)
    }
}

/// Outcome of comparing two normalized chains
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ComparisonResult {
    /// Structurally equivalent
    Equal,
    /// First mismatch, at frame `index` (markers are not counted)
    DivergesAt {
        index: usize,
        expected: Option<ChainEntry>,
        actual: Option<ChainEntry>,
        reason: DivergenceReason,
    },
}

impl ComparisonResult {
    /// Whether the chains matched
    pub fn is_equal(&self) -> bool {
        matches!(self, ComparisonResult::Equal)
    }

    /// Divergence index, if any
    pub fn divergence_index(&self) -> Option<usize> {
        match self {
            ComparisonResult::Equal => None,
            ComparisonResult::DivergesAt { index, .. } => Some(*index),
        }
    }
}

fn fmt_side(entry: &Option<ChainEntry>) -> String {
    match entry {
        Some(entry) => entry.to_string(),
        None => "<end of chain>".to_string(),
    }
}

impl fmt::Display for ComparisonResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComparisonResult::Equal => f.write_str("equal"),
            ComparisonResult::DivergesAt {
                index,
                expected,
                actual,
                reason,
            } => write!(
                f,
                "diverges at frame #{} ({}): expected {}, actual {}",
                index,
                reason,
                fmt_side(expected),
                fmt_side(actual)
            ),
        }
    }
}

fn labels_match(expected: &NormalizedFrame, actual: &NormalizedFrame) -> bool {
    if expected.label == actual.label {
        return true;
    }
    let both_unknown =
        expected.kind == InvocationKind::Unknown && actual.kind == InvocationKind::Unknown;
    both_unknown || (expected.is_anonymous() && actual.is_anonymous())
}

/// Why two frames differ, or `None` when they are equal.
pub fn frame_mismatch(
    expected: &NormalizedFrame,
    actual: &NormalizedFrame,
) -> Option<DivergenceReason> {
    if expected.kind != actual.kind {
        return Some(DivergenceReason::Kind);
    }
    if !labels_match(expected, actual) {
        return Some(DivergenceReason::Label);
    }
    if let (Some(a), Some(b)) = (&expected.file, &actual.file)
        && a != b
    {
        return Some(DivergenceReason::Site);
    }
    if expected.line.is_some() != actual.line.is_some() || expected.has_column != actual.has_column
    {
        return Some(DivergenceReason::Site);
    }
    None
}

/// The entry to report for the longer side once the shorter one ran out.
fn first_remaining(entries: &[ChainEntry]) -> Option<ChainEntry> {
    entries
        .iter()
        .find(|e| !e.is_boundary())
        .or_else(|| entries.first())
        .cloned()
}

/// Compare `actual` against `expected`.
pub fn compare(
    expected: &NormalizedChain,
    actual: &NormalizedChain,
    config: &StackprintConfig,
) -> ComparisonResult {
    let lenient = config.lenient_async_boundaries;
    let expected = expected.entries();
    let actual = actual.entries();
    let (mut i, mut j, mut index) = (0, 0, 0);

    loop {
        match (expected.get(i), actual.get(j)) {
            (None, None) => return ComparisonResult::Equal,
            (Some(ChainEntry::AsyncBoundary), Some(ChainEntry::AsyncBoundary)) => {
                i += 1;
                j += 1;
            }
            (Some(ChainEntry::AsyncBoundary), _) if lenient => i += 1,
            (_, Some(ChainEntry::AsyncBoundary)) if lenient => j += 1,
            (Some(ChainEntry::Frame(e)), Some(ChainEntry::Frame(a))) => {
                if let Some(reason) = frame_mismatch(e, a) {
                    return ComparisonResult::DivergesAt {
                        index,
                        expected: Some(ChainEntry::Frame(e.clone())),
                        actual: Some(ChainEntry::Frame(a.clone())),
                        reason,
                    };
                }
                i += 1;
                j += 1;
                index += 1;
            }
            (None, Some(_)) => {
                return ComparisonResult::DivergesAt {
                    index,
                    expected: None,
                    actual: first_remaining(&actual[j..]),
                    reason: DivergenceReason::Length,
                };
            }
            (Some(_), None) => {
                return ComparisonResult::DivergesAt {
                    index,
                    expected: first_remaining(&expected[i..]),
                    actual: None,
                    reason: DivergenceReason::Length,
                };
            }
            (Some(e), Some(a)) => {
                return ComparisonResult::DivergesAt {
                    index,
                    expected: Some(e.clone()),
                    actual: Some(a.clone()),
                    reason: DivergenceReason::Boundary,
                };
            }
        }
    }
}
