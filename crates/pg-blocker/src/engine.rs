//! Filtering engine boundary.
//!
//! The engine owns the matching algorithm and the persisted form of compiled
//! rule lists. PinGuard only asks it to look up, compile, remove and list
//! rule lists; it never inspects what a compiled list contains.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

/// Failure reported by the filtering engine.
///
/// Cloneable so a single compile outcome can be handed to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid rule list identifier: {0:?}")]
    InvalidIdentifier(String),
    #[error("Rule list '{identifier}' failed to compile: {reason}")]
    InvalidRuleList { identifier: String, reason: String },
    #[error("Rule list '{0}' not found")]
    NotFound(String),
    #[error("Rule list store failure for '{identifier}': {message}")]
    Store { identifier: String, message: String },
}

struct RuleListInner {
    identifier: String,
    rule_count: usize,
    encoded: String,
}

/// Handle to an engine-compiled rule list.
///
/// Clones share the same underlying list; use [`CompiledRuleList::ptr_eq`]
/// to check whether two handles came from the same compilation.
#[derive(Clone)]
pub struct CompiledRuleList {
    inner: Arc<RuleListInner>,
}

impl CompiledRuleList {
    pub fn new(identifier: impl Into<String>, rule_count: usize, encoded: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RuleListInner {
                identifier: identifier.into(),
                rule_count,
                encoded: encoded.into(),
            }),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.inner.identifier
    }

    pub fn rule_count(&self) -> usize {
        self.inner.rule_count
    }

    /// Engine-side encoded form.
    pub fn encoded(&self) -> &str {
        &self.inner.encoded
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for CompiledRuleList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledRuleList")
            .field("identifier", &self.inner.identifier)
            .field("rule_count", &self.inner.rule_count)
            .finish()
    }
}

/// Operations PinGuard needs from a filtering engine.
#[async_trait]
pub trait FilterEngine: Send + Sync {
    /// Fetch a previously compiled list, if the engine still holds one.
    async fn lookup(&self, identifier: &str) -> Result<Option<CompiledRuleList>, EngineError>;

    /// Compile an encoded rule document.
    ///
    /// `Ok(None)` means the engine reported neither a list nor an error.
    async fn compile(
        &self,
        identifier: &str,
        encoded: String,
    ) -> Result<Option<CompiledRuleList>, EngineError>;

    /// Drop a compiled list from the engine's persisted store.
    async fn remove(&self, identifier: &str) -> Result<(), EngineError>;

    /// Identifiers of every persisted list.
    async fn identifiers(&self) -> BTreeSet<String>;
}
