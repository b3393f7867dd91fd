//! Grammar data model: the pattern arena, the keyed repository, plist
//! decoding, and the post-decode normalization pass.
//!
//! Purpose: turn a TextMate-style grammar file into an immutable,
//! id-indexed pattern set the matcher can walk without ever chasing owned
//! cycles.
//!
//! # Invariants
//! - Patterns live in a flat arena owned by the [`Grammar`]; children and
//!   repository entries refer to them by [`PatternId`]. Includes store the
//!   include *string* and are dereferenced at match time, so the ownership
//!   graph is always acyclic even when the reference graph is not.
//! - A `PatternId` is only valid for the `Grammar` that produced it.
//! - After normalization the grammar is structurally read-only: pattern
//!   names are trimmed, capture lists are sorted ascending by group index,
//!   and every regex field is either compiled or the empty sentinel.
//! - Arena ids are deterministic for a given file: the root subtree is
//!   lowered first, then repository entries in sorted key order.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use ahash::AHashMap;
use serde::Deserialize;

use crate::errors::GrammarLoadError;
use crate::regex::Regex;

/// Opaque index into a grammar's pattern arena.
///
/// # Invariants
/// - Only valid for the `Grammar` that created it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PatternId(pub(crate) u32);

impl PatternId {
    #[inline]
    pub(crate) fn idx(self) -> usize {
        self.0 as usize
    }
}

/// One capture assignment: regex group index to scope name. Group 0 is the
/// whole match.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Capture {
    pub group: usize,
    pub name: String,
}

/// Capture list sorted ascending by group index.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Captures(Vec<Capture>);

impl Captures {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[Capture] {
        &self.0
    }

    /// Builds the sorted list from the keyed plist object. Keys that do not
    /// parse as decimal group indices are dropped.
    fn from_raw(raw: BTreeMap<String, RawNamed>) -> Self {
        let mut caps: Vec<Capture> = raw
            .into_iter()
            .filter_map(|(key, named)| {
                key.trim().parse::<usize>().ok().map(|group| Capture {
                    group,
                    name: named.name,
                })
            })
            .collect();
        caps.sort_by_key(|c| c.group);
        Captures(caps)
    }
}

/// An include reference, classified at load time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Include {
    /// `#key` into the owning grammar's repository.
    Repository(String),
    /// A bare scope name resolved through the registry.
    Scope(String),
    /// `$self`/`$base` directives; unimplemented, warn-and-skip.
    SelfDirective(String),
}

impl Include {
    fn classify(raw: String) -> Self {
        if let Some(key) = raw.strip_prefix('#') {
            Include::Repository(key.to_owned())
        } else if raw.starts_with('$') {
            Include::SelfDirective(raw)
        } else {
            Include::Scope(raw)
        }
    }
}

/// Variant data for the mutually exclusive pattern shapes. Classification
/// priority on decode is match, then begin/end, then include; a pattern with
/// none of those is a bare group over its children (the root pattern and
/// plain `patterns` arrays).
#[derive(Clone, Debug)]
pub enum PatternKind {
    /// A single-regex pattern.
    Match { regex: Regex },
    /// A begin/end region; sub-patterns apply between the anchors.
    Range {
        begin: Regex,
        begin_captures: Captures,
        end: Regex,
        end_captures: Captures,
    },
    /// A reference to another pattern, dereferenced at match time.
    Include { target: Include },
    /// No regex of its own; delegates to its children.
    Group,
}

/// One node of the grammar's pattern tree.
#[derive(Clone, Debug)]
pub struct Pattern {
    /// Scope name assigned to regions this pattern produces; may be empty.
    pub name: String,
    pub kind: PatternKind,
    /// Capture-to-scope assignments for the pattern's own match.
    pub captures: Captures,
    /// Sub-patterns, in declaration order.
    pub children: Vec<PatternId>,
}

/// An immutable-after-load grammar: identity fields, the pattern arena, and
/// the `#key` repository.
#[derive(Clone, Debug)]
pub struct Grammar {
    pub name: String,
    /// Root scope, e.g. `source.python`. Doubles as the root node name of
    /// every tree this grammar produces.
    pub scope_name: String,
    /// File extensions this grammar claims, in declaration order.
    pub file_types: Vec<String>,
    /// Informational regex string used by editors for shebang sniffing.
    pub first_line_match: String,
    patterns: Vec<Pattern>,
    root: PatternId,
    repository: AHashMap<String, PatternId>,
}

impl Grammar {
    /// Reads and decodes a grammar file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, GrammarLoadError> {
        let path = path.as_ref();
        let data = fs::read(path).map_err(|source| GrammarLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&data).map_err(|err| match err {
            GrammarLoadError::Decode { path: None, source } => GrammarLoadError::Decode {
                path: Some(path.to_path_buf()),
                source,
            },
            other => other,
        })
    }

    /// Decodes a grammar from property-list bytes and runs the
    /// normalization pass.
    pub fn parse(data: &[u8]) -> Result<Self, GrammarLoadError> {
        let raw: RawGrammar = plist::from_bytes(data)
            .map_err(|source| GrammarLoadError::Decode { path: None, source })?;
        lower(raw)
    }

    /// The pattern behind `id`.
    ///
    /// # Panics
    /// Panics if `id` came from a different grammar and is out of range.
    pub fn pattern(&self, id: PatternId) -> &Pattern {
        &self.patterns[id.idx()]
    }

    /// The root pseudo-pattern: a bare group over the top-level patterns.
    pub fn root(&self) -> PatternId {
        self.root
    }

    pub(crate) fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    /// Repository lookup for `#key` includes.
    pub fn repository_get(&self, key: &str) -> Option<PatternId> {
        self.repository.get(key).copied()
    }
}

impl fmt::Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}): {} patterns, {} repository keys",
            self.scope_name,
            if self.name.is_empty() { "unnamed" } else { &self.name },
            self.patterns.len(),
            self.repository.len()
        )
    }
}

// --------------------------
// Raw decode model
// --------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawGrammar {
    #[serde(default)]
    name: String,
    scope_name: String,
    #[serde(default)]
    file_types: Vec<String>,
    #[serde(default)]
    first_line_match: String,
    #[serde(default)]
    patterns: Vec<RawPattern>,
    #[serde(default)]
    repository: BTreeMap<String, RawPattern>,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawPattern {
    name: String,
    include: String,
    #[serde(rename = "match")]
    match_expr: String,
    begin: String,
    end: String,
    captures: BTreeMap<String, RawNamed>,
    begin_captures: BTreeMap<String, RawNamed>,
    end_captures: BTreeMap<String, RawNamed>,
    patterns: Vec<RawPattern>,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct RawNamed {
    name: String,
}

// --------------------------
// Normalization
// --------------------------

fn lower(raw: RawGrammar) -> Result<Grammar, GrammarLoadError> {
    let mut arena = Vec::new();
    let root_children = raw
        .patterns
        .into_iter()
        .map(|p| lower_pattern(p, &mut arena))
        .collect::<Result<Vec<_>, _>>()?;
    arena.push(Pattern {
        name: String::new(),
        kind: PatternKind::Group,
        captures: Captures::default(),
        children: root_children,
    });
    let root = PatternId((arena.len() - 1) as u32);

    let mut repository = AHashMap::with_capacity(raw.repository.len());
    // BTreeMap iteration keeps repository ids deterministic across loads.
    for (key, entry) in raw.repository {
        let id = lower_pattern(entry, &mut arena)?;
        repository.insert(key, id);
    }

    Ok(Grammar {
        name: raw.name,
        scope_name: raw.scope_name,
        file_types: raw.file_types,
        first_line_match: raw.first_line_match,
        patterns: arena,
        root,
        repository,
    })
}

fn lower_pattern(
    raw: RawPattern,
    arena: &mut Vec<Pattern>,
) -> Result<PatternId, GrammarLoadError> {
    let children = raw
        .patterns
        .into_iter()
        .map(|p| lower_pattern(p, arena))
        .collect::<Result<Vec<_>, _>>()?;

    let kind = if !raw.match_expr.is_empty() {
        PatternKind::Match {
            regex: compile(&raw.match_expr)?,
        }
    } else if !raw.begin.is_empty() {
        PatternKind::Range {
            begin: compile(&raw.begin)?,
            begin_captures: Captures::from_raw(raw.begin_captures),
            end: compile_or_sentinel(&raw.end)?,
            end_captures: Captures::from_raw(raw.end_captures),
        }
    } else if !raw.include.is_empty() {
        PatternKind::Include {
            target: Include::classify(raw.include),
        }
    } else {
        PatternKind::Group
    };

    arena.push(Pattern {
        name: raw.name.trim().to_owned(),
        kind,
        captures: Captures::from_raw(raw.captures),
        children,
    });
    Ok(PatternId((arena.len() - 1) as u32))
}

fn compile(expr: &str) -> Result<Regex, GrammarLoadError> {
    Regex::compile(expr).map_err(|source| GrammarLoadError::RegexCompile {
        expr: expr.to_owned(),
        source,
    })
}

fn compile_or_sentinel(expr: &str) -> Result<Regex, GrammarLoadError> {
    if expr.is_empty() {
        Ok(Regex::empty())
    } else {
        compile(expr)
    }
}
