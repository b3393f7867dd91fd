//! Scope-tree output model.
//!
//! # Invariants
//! - Ranges are half-open. During construction they are byte offsets; the
//!   driver rewrites them to rune offsets before the tree reaches the
//!   caller.
//! - A child's range is contained in its parent's; siblings are
//!   non-overlapping and appear in input order.
//! - Range maintenance only ever expands a node over its children, never
//!   shrinks it below its declared anchors.

use std::fmt;
use std::ops::Range;

/// One scoped region of the input.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Node {
    /// Scope name, e.g. `keyword.control`. May be empty for unnamed
    /// patterns.
    pub name: String,
    /// Half-open range in runes of the original input.
    pub range: Range<usize>,
    pub children: Vec<Node>,
}

impl Node {
    pub(crate) fn new(name: impl Into<String>, range: Range<usize>) -> Self {
        Node {
            name: name.into(),
            range,
            children: Vec::new(),
        }
    }

    pub(crate) fn append(&mut self, child: Node) {
        self.children.push(child);
    }

    /// Expands this node (recursively) to cover all descendants.
    pub(crate) fn update_range(&mut self) -> Range<usize> {
        for i in 0..self.children.len() {
            let child = self.children[i].update_range();
            if child.start < self.range.start {
                self.range.start = child.start;
            }
            if child.end > self.range.end {
                self.range.end = child.end;
            }
        }
        self.range.clone()
    }

    /// Rewrites every range in the subtree through `lut` (byte offset ->
    /// rune offset).
    pub(crate) fn rewrite_offsets(&mut self, lut: &[usize]) {
        self.range = lut[self.range.start]..lut[self.range.end];
        for child in &mut self.children {
            child.rewrite_offsets(lut);
        }
    }

    fn fmt_at(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        writeln!(
            f,
            "{:indent$}{}..{}: {}",
            "",
            self.range.start,
            self.range.end,
            if self.name.is_empty() { "<unnamed>" } else { &self.name },
            indent = depth * 2
        )?;
        for child in &self.children {
            child.fmt_at(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_at(f, 0)
    }
}

/// Output of one tokenization pass: the input text plus the root of the
/// scope tree. The root node carries the grammar's scope name and spans the
/// union of its children.
#[derive(Clone, Debug)]
pub struct ScopeTree {
    text: String,
    pub root: Node,
}

impl ScopeTree {
    pub(crate) fn new(text: String, root: Node) -> Self {
        ScopeTree { text, root }
    }

    /// The input this tree was built from.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The slice of input covered by `node`. Out-of-range offsets clamp to
    /// the text bounds.
    pub fn lexeme(&self, node: &Node) -> &str {
        let start = node.range.start;
        let end = node.range.end.max(start);
        let mut byte_start = self.text.len();
        let mut byte_end = self.text.len();
        for (rune, (byte, _)) in self.text.char_indices().enumerate() {
            if rune == start {
                byte_start = byte;
            }
            if rune == end {
                byte_end = byte;
                break;
            }
        }
        &self.text[byte_start.min(byte_end)..byte_end]
    }
}

impl fmt::Display for ScopeTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.root.fmt_at(f, 0)
    }
}
