//! The tokenizer driver: the main scan loop, the iteration ceiling, the
//! newline fast-path, and the byte->rune offset rewrite.
//!
//! # Algorithm
//! 1. Ask the root pattern for its earliest match at the cursor.
//! 2. When the match starts past the next line break, jump the cursor over
//!    the newline run instead; per-line anchors need the fresh line
//!    context, and the jump avoids quadratic re-scans.
//! 3. Otherwise build the node (recursing through regions), append it to
//!    the root, and advance the cursor to its end.
//! 4. After the loop, rewrite every byte offset in the tree to a rune
//!    offset through a lookup table built in one sweep.
//!
//! # Invariants
//! - The iteration budget is shared between this loop and region expansion;
//!   exhausting it fails the pass and discards the partial tree.
//! - No component other than this driver ever sees both byte and rune
//!   offsets.
//! - Panics from the regex engine are caught here, logged with the partial
//!   tree, and surfaced as an error.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use memchr::memchr2;
use tracing::error;

use crate::builder::build_node;
use crate::errors::TokenizeError;
use crate::grammar::Grammar;
use crate::matcher::MatchCtx;
use crate::registry::GrammarRegistry;
use crate::tree::{Node, ScopeTree};

/// Default bound on scan-loop turns in one pass.
pub const MAX_ITERATIONS: u32 = 10_000;

/// Driver limits.
#[derive(Clone, Debug)]
pub struct TokenizerOptions {
    /// Total scan-loop turns (driver plus region expansion) permitted in
    /// one pass. Must be positive.
    pub max_iterations: u32,
}

impl Default for TokenizerOptions {
    fn default() -> Self {
        TokenizerOptions {
            max_iterations: MAX_ITERATIONS,
        }
    }
}

/// Walks an input text with a grammar's root pattern and produces a
/// [`ScopeTree`].
///
/// The registry is consulted when patterns include other grammars by scope
/// name. Tokenization never mutates the grammar, so one grammar may be
/// shared across concurrent `tokenize` calls on different texts.
pub struct Tokenizer {
    registry: Arc<GrammarRegistry>,
    options: TokenizerOptions,
}

impl Tokenizer {
    pub fn new(registry: Arc<GrammarRegistry>) -> Self {
        Self::with_options(registry, TokenizerOptions::default())
    }

    pub fn with_options(registry: Arc<GrammarRegistry>, options: TokenizerOptions) -> Self {
        Tokenizer { registry, options }
    }

    pub fn registry(&self) -> &Arc<GrammarRegistry> {
        &self.registry
    }

    /// Tokenizes `text`, producing a tree whose ranges are rune offsets.
    pub fn tokenize(&self, grammar: &Grammar, text: &str) -> Result<ScopeTree, TokenizeError> {
        let hay = text.as_bytes();
        let mut ctx = MatchCtx::new(grammar, &self.registry, hay, self.options.max_iterations);
        let mut root = Node::new(grammar.scope_name.clone(), 0..0);

        let scan = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut pos = 0usize;
            while pos < hay.len() {
                if !ctx.consume_budget() {
                    break;
                }
                let Some(hit) = ctx.match_root(pos) else { break };
                let next_nl = memchr2(b'\n', b'\r', &hay[pos..]).map(|off| pos + off);
                match next_nl {
                    Some(nl) if nl > 0 && nl <= hit.start() => {
                        // The match lives on a later line: jump there.
                        pos = nl;
                        while pos < hay.len() && (hay[pos] == b'\n' || hay[pos] == b'\r') {
                            pos += 1;
                        }
                    }
                    _ => {
                        let node = build_node(&mut ctx, &hit);
                        pos = node.range.end;
                        root.append(node);
                    }
                }
            }
        }));

        root.update_range();
        if let Err(payload) = scan {
            let detail = panic_detail(payload.as_ref());
            error!(%detail, partial_tree = %root, "panic during tokenization");
            return Err(TokenizeError::EnginePanic { detail });
        }
        if ctx.exhausted() {
            error!(partial_tree = %root, "tokenization hit its iteration ceiling");
            return Err(TokenizeError::IterationLimitExceeded {
                limit: self.options.max_iterations,
            });
        }

        let lut = byte_to_rune_lut(text);
        root.rewrite_offsets(&lut);
        Ok(ScopeTree::new(text.to_owned(), root))
    }
}

fn panic_detail(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_owned()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

/// One linear sweep: `lut[byte] -> rune`, with the terminal entry mapping
/// `len(bytes)` to `len(runes)`.
fn byte_to_rune_lut(text: &str) -> Vec<usize> {
    let mut lut = vec![0usize; text.len() + 1];
    let mut rune_count = 0;
    for (rune, (byte, ch)) in text.char_indices().enumerate() {
        for entry in &mut lut[byte..byte + ch.len_utf8()] {
            *entry = rune;
        }
        rune_count = rune + 1;
    }
    lut[text.len()] = rune_count;
    lut
}
