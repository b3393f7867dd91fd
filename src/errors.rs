//! Error types for grammar loading and tokenization.
//!
//! Errors are stage-specific: loading a grammar file and running the
//! tokenizer fail in unrelated ways and callers handle them at different
//! layers. Both enums are `#[non_exhaustive]` so variants can be added
//! without breaking callers; consumers should include a fallback match arm.
//!
//! Include failures that occur mid-pass are deliberately not represented
//! here: they are logged once per target and then degrade to "no match" so a
//! broken include cannot take down tokenization of an otherwise valid
//! buffer.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Errors from reading, decoding, or normalizing a grammar definition.
#[derive(Debug)]
#[non_exhaustive]
pub enum GrammarLoadError {
    /// The grammar file could not be read.
    Io { path: PathBuf, source: io::Error },
    /// The property list was malformed or failed schema validation.
    Decode {
        path: Option<PathBuf>,
        source: plist::Error,
    },
    /// A pattern regex failed to compile.
    RegexCompile {
        expr: String,
        source: regex::Error,
    },
    /// Include-by-scope with no registered grammar.
    UnregisteredScope { scope: String },
}

impl fmt::Display for GrammarLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "couldn't load file {}: {source}", path.display())
            }
            Self::Decode { path: Some(path), source } => {
                write!(f, "couldn't decode grammar {}: {source}", path.display())
            }
            Self::Decode { path: None, source } => {
                write!(f, "couldn't decode grammar: {source}")
            }
            Self::RegexCompile { expr, source } => {
                write!(f, "couldn't compile pattern regex {expr:?}: {source}")
            }
            Self::UnregisteredScope { scope } => {
                write!(f, "no grammar registered for scope {scope}")
            }
        }
    }
}

impl std::error::Error for GrammarLoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Decode { source, .. } => Some(source),
            Self::RegexCompile { source, .. } => Some(source),
            Self::UnregisteredScope { .. } => None,
        }
    }
}

/// Errors from one tokenization pass.
#[derive(Debug)]
#[non_exhaustive]
pub enum TokenizeError {
    /// The scan loop exhausted its iteration budget; the partial tree is
    /// discarded.
    IterationLimitExceeded { limit: u32 },
    /// The regex engine panicked mid-pass; caught at the driver boundary.
    EnginePanic { detail: String },
}

impl fmt::Display for TokenizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IterationLimitExceeded { limit } => {
                write!(f, "tokenization exceeded {limit} iterations")
            }
            Self::EnginePanic { detail } => {
                write!(f, "panic during tokenization: {detail}")
            }
        }
    }
}

impl std::error::Error for TokenizeError {}
