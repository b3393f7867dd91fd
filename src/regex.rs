//! Thin wrapper around the byte-oriented regex engine.
//!
//! Everything above this module treats the engine as opaque: compile an
//! expression at grammar-load time, probe whether a slot holds the empty
//! sentinel, and find the earliest match at or after a byte offset. Group
//! spans come back as byte ranges with absent groups reported as `None`.
//!
//! # Invariants
//! - `MatchSpans` always carries a span for group 0 (the whole match).
//! - All offsets are byte offsets into the haystack the match was run
//!   against; the driver owns the byte->rune rewrite.
//! - `^` and `$` are compiled in multi-line mode. Grammar authors write them
//!   with per-line semantics, and the driver's newline fast-path depends on
//!   anchors re-firing after each line break.

use std::fmt;
use std::ops::Range;

use regex::bytes::{Regex as ByteRegex, RegexBuilder};

/// Byte spans for one match: index 0 is the whole match, later entries are
/// capture groups in declaration order. Groups that did not participate in
/// the match are `None`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchSpans {
    groups: Vec<Option<Range<usize>>>,
}

impl MatchSpans {
    pub(crate) fn from_groups(groups: Vec<Option<Range<usize>>>) -> Self {
        debug_assert!(matches!(groups.first(), Some(Some(_))));
        MatchSpans { groups }
    }

    /// Start of the whole match.
    #[inline]
    pub fn start(&self) -> usize {
        self.groups[0].as_ref().map_or(0, |r| r.start)
    }

    /// End of the whole match.
    #[inline]
    pub fn end(&self) -> usize {
        self.groups[0].as_ref().map_or(0, |r| r.end)
    }

    /// Number of groups, counting group 0.
    #[inline]
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Span of group `i`, or `None` when the group is absent or out of range.
    #[inline]
    pub fn group(&self, i: usize) -> Option<Range<usize>> {
        self.groups.get(i).cloned().flatten()
    }
}

/// A compiled pattern regex, or the empty sentinel used for absent grammar
/// fields (`is_empty` returns true and `find` never matches).
#[derive(Clone, Default)]
pub struct Regex {
    inner: Option<ByteRegex>,
    source: String,
}

impl Regex {
    /// The sentinel for a regex field the grammar left empty.
    pub fn empty() -> Self {
        Regex::default()
    }

    /// Compiles `expr` with per-line `^`/`$` anchoring.
    pub fn compile(expr: &str) -> Result<Self, regex::Error> {
        let inner = RegexBuilder::new(expr).multi_line(true).build()?;
        Ok(Regex {
            inner: Some(inner),
            source: expr.to_owned(),
        })
    }

    /// True for the uncompiled sentinel.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_none()
    }

    /// The expression this regex was compiled from; empty for the sentinel.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Earliest match whose start is at or after `start`. The sentinel never
    /// matches. `start` past the end of the haystack never matches.
    pub fn find(&self, haystack: &[u8], start: usize) -> Option<MatchSpans> {
        let re = self.inner.as_ref()?;
        if start > haystack.len() {
            return None;
        }
        let caps = re.captures_at(haystack, start)?;
        let groups = (0..caps.len())
            .map(|i| caps.get(i).map(|m| m.start()..m.end()))
            .collect();
        Some(MatchSpans::from_groups(groups))
    }
}

impl fmt::Debug for Regex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("Regex(<empty>)")
        } else {
            write!(f, "Regex({:?})", self.source)
        }
    }
}
