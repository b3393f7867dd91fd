//! Scope-name -> grammar registry with on-demand loading and failure
//! memoization.
//!
//! # Concurrency
//! One mutex guards the scope map, the load memo, and the failed set.
//! Parsing happens outside the lock; two racing loads of the same grammar
//! both succeed and the memo keeps the last one.
//!
//! # Invariants
//! - The failed set only grows. Once an include target fails it stays
//!   failed for the lifetime of the registry, and only the first failure is
//!   logged.
//! - Loaded grammars are shared immutably (`Arc`); tokenization never needs
//!   to mutate them.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use ahash::{AHashMap, AHashSet};
use tracing::warn;

use crate::errors::GrammarLoadError;
use crate::grammar::Grammar;

/// Maps scope names to grammar files and hands out loaded grammars.
#[derive(Default)]
pub struct GrammarRegistry {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    scopes: AHashMap<String, PathBuf>,
    loaded: AHashMap<String, Arc<Grammar>>,
    failed: AHashSet<String>,
}

impl GrammarRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps `scope` to `path`. Re-registering is allowed; the last mapping
    /// wins.
    pub fn register(&self, scope: impl Into<String>, path: impl Into<PathBuf>) {
        self.lock().scopes.insert(scope.into(), path.into());
    }

    /// The file path registered for `scope`, if any.
    pub fn resolve(&self, scope: &str) -> Option<PathBuf> {
        self.lock().scopes.get(scope).cloned()
    }

    /// Loads the grammar registered for `scope`, parsing on first use.
    pub fn load_by_scope(&self, scope: &str) -> Result<Arc<Grammar>, GrammarLoadError> {
        if let Some(grammar) = self.lock().loaded.get(scope) {
            return Ok(grammar.clone());
        }
        let path = self
            .resolve(scope)
            .ok_or_else(|| GrammarLoadError::UnregisteredScope {
                scope: scope.to_owned(),
            })?;
        self.load_by_path(path)
    }

    /// Reads and decodes the grammar at `path`, then registers its scope
    /// name so later includes find it.
    pub fn load_by_path(&self, path: impl AsRef<Path>) -> Result<Arc<Grammar>, GrammarLoadError> {
        let path = path.as_ref();
        let grammar = Arc::new(Grammar::load(path)?);
        let mut state = self.lock();
        state
            .scopes
            .insert(grammar.scope_name.clone(), path.to_path_buf());
        state
            .loaded
            .insert(grammar.scope_name.clone(), grammar.clone());
        Ok(grammar)
    }

    /// Resolution for include directives: the scope map first, then the raw
    /// target as a literal file path. The first failure per target is
    /// logged; after that the target is dead for this registry and requests
    /// are silent.
    pub(crate) fn load_for_include(&self, target: &str) -> Option<Arc<Grammar>> {
        if self.lock().failed.contains(target) {
            return None;
        }
        let result = match self.load_by_scope(target) {
            Err(GrammarLoadError::UnregisteredScope { .. }) => self.load_by_path(target),
            other => other,
        };
        match result {
            Ok(grammar) => Some(grammar),
            Err(err) => {
                if self.lock().failed.insert(target.to_owned()) {
                    warn!(include = target, error = %err, "include directive failed");
                }
                None
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
