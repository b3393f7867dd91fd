//! The pattern matcher: per-pass memoization, live-candidate pruning, and
//! include resolution.
//!
//! All scratch state for one tokenization pass lives in [`MatchCtx`]; the
//! grammar itself is never mutated, so one grammar can serve concurrent
//! passes over different texts.
//!
//! # Invariants
//! - One `MatchCtx` serves exactly one pass over one haystack. Entries are
//!   never reused across passes.
//! - A populated cache entry is reusable iff its match starts at or after
//!   the query position; a cached miss is final for the pass (a regex that
//!   failed from position p cannot match from any later position).
//! - Live-candidate lists only shrink. A child dropped from the list cannot
//!   match anywhere later in the pass.
//! - Scan positions handed to the matcher are monotonically non-decreasing
//!   within a pass; the cache reuse rule depends on this.

use std::ops::Deref;
use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use tracing::{debug, warn};

use crate::grammar::{Grammar, Include, PatternId, PatternKind};
use crate::regex::MatchSpans;
use crate::registry::GrammarRegistry;

/// Slot 0 is the grammar being tokenized; later slots are grammars pulled
/// in by include-by-scope, one per distinct scope per pass.
const LOCAL_SLOT: usize = 0;

/// Include dereferences nested deeper than this are degenerate (a pure
/// include cycle) and degrade to no-match instead of overflowing the stack.
const MAX_INCLUDE_DEPTH: u32 = 128;

/// A winning match: the concrete pattern that produced it (include and
/// group patterns always resolve to a concrete producer) plus its byte
/// spans.
#[derive(Clone, Debug)]
pub(crate) struct Hit {
    pub slot: usize,
    pub pattern: PatternId,
    pub spans: MatchSpans,
}

impl Hit {
    #[inline]
    pub fn start(&self) -> usize {
        self.spans.start()
    }
}

/// Per-pattern scratch memoization for one pass.
#[derive(Clone, Default)]
struct CacheEntry {
    /// Whether this pattern has been consulted this pass.
    probed: bool,
    /// Last result; `None` after probing means the pattern can never match
    /// again this pass.
    hit: Option<Hit>,
    /// Positions into `children` still capable of matching; lazily built on
    /// first consult.
    live: Option<Vec<u32>>,
}

/// A grammar taking part in the pass, by slot.
pub(crate) enum GrammarHandle<'a> {
    Local(&'a Grammar),
    Foreign(Arc<Grammar>),
}

impl Deref for GrammarHandle<'_> {
    type Target = Grammar;

    fn deref(&self) -> &Grammar {
        match self {
            GrammarHandle::Local(grammar) => grammar,
            GrammarHandle::Foreign(grammar) => grammar,
        }
    }
}

enum Step {
    Spans(Option<MatchSpans>),
    Deref(Include),
    Children,
}

/// All mutable state of one tokenization pass.
pub(crate) struct MatchCtx<'a> {
    hay: &'a [u8],
    local: &'a Grammar,
    registry: &'a GrammarRegistry,
    /// One cache lane per grammar slot, indexed by `PatternId`.
    caches: Vec<Vec<CacheEntry>>,
    /// Foreign grammars by slot - 1.
    foreign: Vec<Arc<Grammar>>,
    /// Scope -> slot; `None` records an unresolvable scope for this pass.
    foreign_slots: AHashMap<String, Option<usize>>,
    warned: AHashSet<String>,
    include_depth: u32,
    budget: u32,
    exhausted: bool,
}

impl<'a> MatchCtx<'a> {
    pub fn new(
        local: &'a Grammar,
        registry: &'a GrammarRegistry,
        hay: &'a [u8],
        budget: u32,
    ) -> Self {
        MatchCtx {
            hay,
            local,
            registry,
            caches: vec![vec![CacheEntry::default(); local.pattern_count()]],
            foreign: Vec::new(),
            foreign_slots: AHashMap::new(),
            warned: AHashSet::new(),
            include_depth: 0,
            budget,
            exhausted: false,
        }
    }

    #[inline]
    pub fn haystack(&self) -> &'a [u8] {
        self.hay
    }

    /// Consumes one unit of the shared iteration budget; false once
    /// exhausted.
    pub fn consume_budget(&mut self) -> bool {
        if self.budget == 0 {
            self.exhausted = true;
            return false;
        }
        self.budget -= 1;
        true
    }

    #[inline]
    pub fn exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn grammar(&self, slot: usize) -> GrammarHandle<'a> {
        if slot == LOCAL_SLOT {
            GrammarHandle::Local(self.local)
        } else {
            GrammarHandle::Foreign(self.foreign[slot - 1].clone())
        }
    }

    /// Earliest match of the root pattern at or after `pos`.
    pub fn match_root(&mut self, pos: usize) -> Option<Hit> {
        self.lookup(LOCAL_SLOT, self.local.root(), pos)
    }

    /// The matcher's resolution order: cache, own regex (match or begin),
    /// include dereference, else first-match selection over children.
    pub(crate) fn lookup(&mut self, slot: usize, id: PatternId, pos: usize) -> Option<Hit> {
        let entry = &self.caches[slot][id.idx()];
        if entry.probed {
            match &entry.hit {
                None => return None,
                Some(hit) if hit.start() >= pos => return Some(hit.clone()),
                Some(_) => {}
            }
        }
        self.ensure_live(slot, id);

        let hay = self.hay;
        let step = {
            let grammar = self.grammar(slot);
            match &grammar.pattern(id).kind {
                PatternKind::Match { regex } => Step::Spans(regex.find(hay, pos)),
                PatternKind::Range { begin, .. } => Step::Spans(begin.find(hay, pos)),
                PatternKind::Include { target } => Step::Deref(target.clone()),
                PatternKind::Group => Step::Children,
            }
        };

        // Foreign-scope includes are resolved in the foreign grammar's own
        // cache lane and not memoized on the include node.
        let (result, memoize) = match step {
            Step::Spans(spans) => (
                spans.map(|spans| Hit {
                    slot,
                    pattern: id,
                    spans,
                }),
                true,
            ),
            Step::Deref(Include::Repository(key)) => {
                (self.match_repository(slot, &key, pos), true)
            }
            Step::Deref(Include::Scope(scope)) => return self.match_foreign(&scope, pos),
            Step::Deref(Include::SelfDirective(raw)) => {
                if self.warned.insert(raw.clone()) {
                    warn!(include = %raw, "unhandled include directive");
                }
                (None, true)
            }
            Step::Children => (self.first_match(slot, id, pos), true),
        };

        if memoize {
            let entry = &mut self.caches[slot][id.idx()];
            entry.probed = true;
            entry.hit = result.clone();
        }
        result
    }

    /// First-match selection over the live candidates: earliest start wins,
    /// declaration order breaks ties, and a child that reports no match is
    /// dropped for the remainder of the pass.
    pub(crate) fn first_match(&mut self, slot: usize, id: PatternId, pos: usize) -> Option<Hit> {
        self.ensure_live(slot, id);
        let mut best: Option<Hit> = None;
        let mut i = 0;
        loop {
            // Re-read the live list every turn: recursing into a child can
            // reach this entry again through an include.
            let child_pos = match self.caches[slot][id.idx()].live.as_ref() {
                Some(live) if i < live.len() => live[i] as usize,
                _ => break,
            };
            let child_id = self.grammar(slot).pattern(id).children[child_pos];
            match self.lookup(slot, child_id, pos) {
                Some(hit) => {
                    let better = best.as_ref().map_or(true, |b| hit.start() < b.start());
                    if better {
                        let at_pos = hit.start() == pos;
                        best = Some(hit);
                        // A match right at the scan position cannot be beaten.
                        if at_pos {
                            break;
                        }
                    }
                    i += 1;
                }
                None => {
                    if let Some(live) = self.caches[slot][id.idx()].live.as_mut() {
                        if i < live.len() {
                            live.remove(i);
                        }
                    }
                }
            }
        }
        best
    }

    /// True when the pattern still has live sub-pattern candidates.
    pub(crate) fn has_live_children(&mut self, slot: usize, id: PatternId) -> bool {
        self.ensure_live(slot, id);
        self.caches[slot][id.idx()]
            .live
            .as_ref()
            .is_some_and(|live| !live.is_empty())
    }

    fn ensure_live(&mut self, slot: usize, id: PatternId) {
        if self.caches[slot][id.idx()].live.is_some() {
            return;
        }
        let count = self.grammar(slot).pattern(id).children.len() as u32;
        self.caches[slot][id.idx()].live = Some((0..count).collect());
    }

    fn match_repository(&mut self, slot: usize, key: &str, pos: usize) -> Option<Hit> {
        match self.grammar(slot).repository_get(key) {
            Some(target) => self.deref_guarded(key, |ctx| ctx.lookup(slot, target, pos)),
            None => {
                debug!(key, "include key not found in repository");
                None
            }
        }
    }

    fn match_foreign(&mut self, scope: &str, pos: usize) -> Option<Hit> {
        let slot = self.foreign_slot(scope)?;
        let root = self.foreign[slot - 1].root();
        self.deref_guarded(scope, |ctx| ctx.lookup(slot, root, pos))
    }

    /// Loads (at most once per pass) the grammar behind an include-by-scope
    /// and assigns it a cache lane.
    fn foreign_slot(&mut self, scope: &str) -> Option<usize> {
        if let Some(known) = self.foreign_slots.get(scope) {
            return *known;
        }
        let resolved = self.registry.load_for_include(scope).map(|grammar| {
            self.caches
                .push(vec![CacheEntry::default(); grammar.pattern_count()]);
            self.foreign.push(grammar);
            self.foreign.len()
        });
        self.foreign_slots.insert(scope.to_owned(), resolved);
        resolved
    }

    fn deref_guarded<F>(&mut self, what: &str, deref: F) -> Option<Hit>
    where
        F: FnOnce(&mut Self) -> Option<Hit>,
    {
        if self.include_depth >= MAX_INCLUDE_DEPTH {
            if self.warned.insert(format!("depth:{what}")) {
                warn!(include = what, "include recursion depth exceeded");
            }
            return None;
        }
        self.include_depth += 1;
        let result = deref(self);
        self.include_depth -= 1;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::Grammar;

    fn grammar(body: &str) -> Grammar {
        let doc = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<plist version="1.0">
<dict>
<key>scopeName</key><string>source.test</string>
{body}
</dict>
</plist>"#
        );
        Grammar::parse(doc.as_bytes()).unwrap()
    }

    fn two_child_grammar() -> Grammar {
        grammar(
            r"<key>patterns</key><array>
                <dict><key>name</key><string>a</string><key>match</key><string>zz</string></dict>
                <dict><key>name</key><string>b</string><key>match</key><string>\d+</string></dict>
              </array>",
        )
    }

    #[test]
    fn failed_children_are_pruned() {
        let g = two_child_grammar();
        let registry = GrammarRegistry::new();
        let mut ctx = MatchCtx::new(&g, &registry, b"a 1 z 2", 100);
        let hit = ctx.match_root(0).unwrap();
        assert_eq!(hit.start(), 2);
        // `zz` failed from position 0 and can never match again.
        let live = ctx.caches[LOCAL_SLOT][g.root().idx()].live.clone().unwrap();
        assert_eq!(live, vec![1]);
    }

    #[test]
    fn cached_result_is_reused_for_earlier_or_equal_positions() {
        let g = two_child_grammar();
        let registry = GrammarRegistry::new();
        let mut ctx = MatchCtx::new(&g, &registry, b"ab 42", 100);
        let first = ctx.match_root(0).unwrap();
        assert_eq!(first.start(), 3);
        let second = ctx.match_root(1).unwrap();
        assert_eq!(second.start(), 3);
        assert_eq!(second.spans, first.spans);
    }

    #[test]
    fn cached_miss_is_final_for_the_pass() {
        let g = grammar(
            r"<key>patterns</key><array>
                <dict><key>match</key><string>q</string></dict>
              </array>",
        );
        let registry = GrammarRegistry::new();
        let mut ctx = MatchCtx::new(&g, &registry, b"abc", 100);
        assert!(ctx.match_root(0).is_none());
        assert!(ctx.match_root(2).is_none());
    }

    #[test]
    fn declaration_order_breaks_ties() {
        let g = grammar(
            r"<key>patterns</key><array>
                <dict><key>name</key><string>first</string><key>match</key><string>ab</string></dict>
                <dict><key>name</key><string>second</string><key>match</key><string>abc</string></dict>
              </array>",
        );
        let registry = GrammarRegistry::new();
        let mut ctx = MatchCtx::new(&g, &registry, b"abc", 100);
        let hit = ctx.match_root(0).unwrap();
        let winner = g.pattern(hit.pattern).name.clone();
        assert_eq!(winner, "first");
    }

    #[test]
    fn repository_include_resolves() {
        let g = grammar(
            r"<key>patterns</key><array>
                <dict><key>include</key><string>#num</string></dict>
              </array>
              <key>repository</key><dict>
                <key>num</key>
                <dict><key>name</key><string>n</string><key>match</key><string>\d+</string></dict>
              </dict>",
        );
        let registry = GrammarRegistry::new();
        let mut ctx = MatchCtx::new(&g, &registry, b"x 7", 100);
        let hit = ctx.match_root(0).unwrap();
        assert_eq!(hit.start(), 2);
        assert_eq!(g.pattern(hit.pattern).name, "n");
    }

    #[test]
    fn missing_repository_key_degrades_to_no_match() {
        let g = grammar(
            r"<key>patterns</key><array>
                <dict><key>include</key><string>#nope</string></dict>
              </array>",
        );
        let registry = GrammarRegistry::new();
        let mut ctx = MatchCtx::new(&g, &registry, b"anything", 100);
        assert!(ctx.match_root(0).is_none());
    }

    #[test]
    fn self_directive_is_skipped() {
        let g = grammar(
            r"<key>patterns</key><array>
                <dict><key>include</key><string>$self</string></dict>
                <dict><key>name</key><string>n</string><key>match</key><string>\d+</string></dict>
              </array>",
        );
        let registry = GrammarRegistry::new();
        let mut ctx = MatchCtx::new(&g, &registry, b"4", 100);
        let hit = ctx.match_root(0).unwrap();
        assert_eq!(g.pattern(hit.pattern).name, "n");
    }

    #[test]
    fn pure_include_cycle_degrades_instead_of_overflowing() {
        let g = grammar(
            r"<key>patterns</key><array>
                <dict><key>include</key><string>#loop</string></dict>
              </array>
              <key>repository</key><dict>
                <key>loop</key>
                <dict><key>patterns</key><array>
                  <dict><key>include</key><string>#loop</string></dict>
                </array></dict>
              </dict>",
        );
        let registry = GrammarRegistry::new();
        let mut ctx = MatchCtx::new(&g, &registry, b"text", 100);
        assert!(ctx.match_root(0).is_none());
    }
}
