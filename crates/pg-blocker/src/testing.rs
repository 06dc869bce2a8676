//! In-memory engine double for unit tests.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use pg_rules::RuleDocument;

use crate::engine::{CompiledRuleList, EngineError, FilterEngine};

#[derive(Default)]
pub struct MockEngine {
    persisted: Mutex<HashMap<String, CompiledRuleList>>,
    failing: Mutex<HashSet<String>>,
    failing_lookups: Mutex<HashSet<String>>,
    silent: Mutex<HashSet<String>>,
    delay: Option<Duration>,
    compiles: AtomicUsize,
    lookups: AtomicUsize,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every compile takes `delay` before answering.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn fail(&self, identifier: &str) {
        self.failing.lock().unwrap().insert(identifier.to_string());
    }

    pub fn recover(&self, identifier: &str) {
        self.failing.lock().unwrap().remove(identifier);
    }

    pub fn fail_lookup(&self, identifier: &str) {
        self.failing_lookups.lock().unwrap().insert(identifier.to_string());
    }

    /// Answer compiles for `identifier` with neither a list nor an error.
    pub fn stay_silent(&self, identifier: &str) {
        self.silent.lock().unwrap().insert(identifier.to_string());
    }

    /// Pretend a previous process already compiled `identifier`.
    pub fn preload(&self, identifier: &str, rule_count: usize) -> CompiledRuleList {
        let list = CompiledRuleList::new(identifier, rule_count, "[]");
        self.persisted
            .lock()
            .unwrap()
            .insert(identifier.to_string(), list.clone());
        list
    }

    /// Drop a persisted list behind the cache's back.
    pub fn forget(&self, identifier: &str) {
        self.persisted.lock().unwrap().remove(identifier);
    }

    pub fn compile_count(&self) -> usize {
        self.compiles.load(Ordering::SeqCst)
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FilterEngine for MockEngine {
    async fn lookup(&self, identifier: &str) -> Result<Option<CompiledRuleList>, EngineError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.failing_lookups.lock().unwrap().contains(identifier) {
            return Err(EngineError::Store {
                identifier: identifier.to_string(),
                message: "corrupt".to_string(),
            });
        }
        Ok(self.persisted.lock().unwrap().get(identifier).cloned())
    }

    async fn compile(
        &self,
        identifier: &str,
        encoded: String,
    ) -> Result<Option<CompiledRuleList>, EngineError> {
        self.compiles.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.lock().unwrap().contains(identifier) {
            return Err(EngineError::InvalidRuleList {
                identifier: identifier.to_string(),
                reason: "rejected".to_string(),
            });
        }
        if self.silent.lock().unwrap().contains(identifier) {
            return Ok(None);
        }

        let rule_count = RuleDocument::from_json(&encoded).map(|doc| doc.len()).unwrap_or(0);
        let list = CompiledRuleList::new(identifier, rule_count, encoded);
        self.persisted
            .lock()
            .unwrap()
            .insert(identifier.to_string(), list.clone());
        Ok(Some(list))
    }

    async fn remove(&self, identifier: &str) -> Result<(), EngineError> {
        self.persisted
            .lock()
            .unwrap()
            .remove(identifier)
            .map(|_| ())
            .ok_or_else(|| EngineError::NotFound(identifier.to_string()))
    }

    async fn identifiers(&self) -> BTreeSet<String> {
        self.persisted.lock().unwrap().keys().cloned().collect()
    }
}
