//! Rendering contexts that compiled rule lists are attached to.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::engine::CompiledRuleList;

/// A live rendering surface's set of active rule lists.
///
/// All operations are synchronous and must be safe to call from any task.
pub trait RenderingContext: Send + Sync {
    fn register(&self, list: &CompiledRuleList);

    /// No-op if nothing is registered under `identifier`.
    fn unregister(&self, identifier: &str);

    fn unregister_all(&self);
}

/// In-process rendering context keeping its active lists in registration order.
///
/// Lists are keyed by identifier: registering an identifier that is
/// already active replaces the previous list in place.
#[derive(Debug, Default)]
pub struct ContentController {
    active: Mutex<Vec<CompiledRuleList>>,
}

impl ContentController {
    pub fn new() -> Self {
        Self::default()
    }

    fn active_lists(&self) -> MutexGuard<'_, Vec<CompiledRuleList>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn active_identifiers(&self) -> Vec<String> {
        self.active_lists()
            .iter()
            .map(|list| list.identifier().to_string())
            .collect()
    }

    pub fn active(&self) -> Vec<CompiledRuleList> {
        self.active_lists().clone()
    }

    pub fn is_active(&self, identifier: &str) -> bool {
        self.active_lists()
            .iter()
            .any(|list| list.identifier() == identifier)
    }

    pub fn len(&self) -> usize {
        self.active_lists().len()
    }

    pub fn is_empty(&self) -> bool {
        self.active_lists().is_empty()
    }
}

impl RenderingContext for ContentController {
    fn register(&self, list: &CompiledRuleList) {
        let mut active = self.active_lists();
        match active.iter_mut().find(|l| l.identifier() == list.identifier()) {
            Some(existing) => *existing = list.clone(),
            None => active.push(list.clone()),
        }
    }

    fn unregister(&self, identifier: &str) {
        self.active_lists().retain(|list| list.identifier() != identifier);
    }

    fn unregister_all(&self) {
        self.active_lists().clear();
    }
}
