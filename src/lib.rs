//! TextMate-grammar tokenizer producing scoped syntax trees.
//!
//! The engine consumes a declarative grammar (named, nested
//! regular-expression patterns with begin/end regions, capture sub-scoping,
//! and cross-grammar includes) and assigns a hierarchical scope name to
//! every recognized region of an input text.
//!
//! High-level flow (one pass):
//! 1) Load and normalize a grammar: plist -> id-indexed pattern arena.
//! 2) Walk the input with the root pattern's matcher, memoizing per-pattern
//!    matches and pruning alternatives that can never match again.
//! 3) Expand begin/end regions, interleaving nested pattern matches with
//!    the end anchor.
//! 4) Map capture groups to sub-scoped child nodes by span containment.
//! 5) Rewrite byte offsets to rune offsets at the driver boundary.
//!
//! ```no_run
//! use std::sync::Arc;
//! use tmscope::{GrammarRegistry, Tokenizer};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(GrammarRegistry::new());
//! let grammar = registry.load_by_path("grammars/python.tmLanguage")?;
//! let tokenizer = Tokenizer::new(registry.clone());
//! let tree = tokenizer.tokenize(&grammar, "def f():\n    return 42\n")?;
//! print!("{tree}");
//! # Ok(())
//! # }
//! ```
//!
//! # Concurrency
//! Grammars are immutable after load; all per-pass scratch state lives
//! inside the tokenizer call, so one grammar can serve concurrent passes
//! over different texts. `Grammar` is `Clone` for callers that want fully
//! independent instances.
//!
//! # Limits
//! `$`-prefixed include directives (`$self`/`$base`) are not implemented;
//! they are logged once and treated as matching nothing.

mod builder;
pub mod errors;
pub mod grammar;
mod matcher;
pub mod regex;
pub mod registry;
pub mod tokenizer;
pub mod tree;

pub use errors::{GrammarLoadError, TokenizeError};
pub use grammar::{Capture, Captures, Grammar, Include, Pattern, PatternId, PatternKind};
pub use registry::GrammarRegistry;
pub use tokenizer::{Tokenizer, TokenizerOptions, MAX_ITERATIONS};
pub use tree::{Node, ScopeTree};
