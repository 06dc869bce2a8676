//! Compile cache with per-identifier single flight.
//!
//! The cache maps an identifier to its compiled rule list. A miss consults
//! the engine's persisted store first and only then asks the engine to
//! compile. While that work is outstanding every other request for the same
//! identifier attaches to it instead of submitting a second compile;
//! requests for different identifiers proceed in parallel.
//!
//! # Invariants
//!
//! - At most one engine lookup/compile is in flight per identifier.
//! - A successful outcome is stored in `entries` (and its pending slot
//!   cleared) under the state lock before any waiter observes it.
//! - Failures are never cached; the next request retries.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, info, warn};
use pg_rules::RuleDocument;
use tokio::sync::watch;

use crate::engine::{CompiledRuleList, EngineError, FilterEngine};

/// Error delivered to every caller waiting on a compilation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("Unknown compilation error for '{0}'")]
    Unknown(String),
    #[error("Failed to encode rules for '{identifier}': {message}")]
    Serialization { identifier: String, message: String },
    #[error("Compilation of '{0}' was interrupted")]
    Interrupted(String),
}

pub type CompileResult = Result<CompiledRuleList, CompileError>;

type OutcomeSlot = watch::Receiver<Option<CompileResult>>;

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CompiledRuleList>,
    pending: HashMap<String, OutcomeSlot>,
}

enum Attached {
    Hit(CompiledRuleList),
    InFlight(OutcomeSlot),
    Vacant,
}

fn lock(state: &Mutex<CacheState>) -> MutexGuard<'_, CacheState> {
    // Critical sections never panic midway, so a poisoned map is still consistent.
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A pending slot whose task ended without publishing an outcome.
fn is_abandoned(slot: &OutcomeSlot) -> bool {
    slot.has_changed().is_err() && slot.borrow().is_none()
}

/// Identifier-keyed cache of compiled rule lists.
pub struct CompileCache {
    engine: Arc<dyn FilterEngine>,
    state: Arc<Mutex<CacheState>>,
}

impl CompileCache {
    pub fn new(engine: Arc<dyn FilterEngine>) -> Self {
        Self {
            engine,
            state: Arc::new(Mutex::new(CacheState::default())),
        }
    }

    pub fn engine(&self) -> &Arc<dyn FilterEngine> {
        &self.engine
    }

    /// Cached list for `identifier`, without touching the engine.
    pub fn cached(&self, identifier: &str) -> Option<CompiledRuleList> {
        lock(&self.state).entries.get(identifier).cloned()
    }

    pub fn contains(&self, identifier: &str) -> bool {
        lock(&self.state).entries.contains_key(identifier)
    }

    pub fn is_compiling(&self, identifier: &str) -> bool {
        lock(&self.state).pending.contains_key(identifier)
    }

    pub fn len(&self) -> usize {
        lock(&self.state).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.state).entries.is_empty()
    }

    /// Return the compiled list for `identifier`, compiling `document` on a miss.
    ///
    /// The document is only encoded on a miss, and never while the cache
    /// state is locked.
    pub async fn compile(&self, identifier: &str, document: &RuleDocument) -> CompileResult {
        self.compile_with(identifier, || {
            document.to_json().map_err(|e| CompileError::Serialization {
                identifier: identifier.to_string(),
                message: e.to_string(),
            })
        })
        .await
    }

    /// Like [`CompileCache::compile`] for an already encoded document.
    pub async fn compile_encoded(&self, identifier: &str, encoded: String) -> CompileResult {
        self.compile_with(identifier, move || Ok(encoded)).await
    }

    async fn compile_with<F>(&self, identifier: &str, encode: F) -> CompileResult
    where
        F: FnOnce() -> Result<String, CompileError>,
    {
        let attached = match self.attach(identifier) {
            Attached::Vacant => {
                // Encoding can be slow for large documents; keep it off the lock.
                let encoded = encode()?;
                self.attach_or_start(identifier, encoded)
            }
            attached => attached,
        };

        let mut slot = match attached {
            Attached::Hit(list) => return Ok(list),
            Attached::InFlight(slot) => slot,
            // attach_or_start never leaves the identifier vacant.
            Attached::Vacant => return Err(CompileError::Interrupted(identifier.to_string())),
        };

        let outcome = match slot.wait_for(Option::is_some).await {
            Ok(published) => (*published).clone(),
            Err(_) => None,
        };
        outcome.unwrap_or_else(|| Err(CompileError::Interrupted(identifier.to_string())))
    }

    fn attach_locked(state: &CacheState, identifier: &str) -> Attached {
        if let Some(list) = state.entries.get(identifier) {
            debug!("Cache hit for '{}'", identifier);
            return Attached::Hit(list.clone());
        }
        match state.pending.get(identifier).filter(|slot| !is_abandoned(slot)) {
            Some(slot) => {
                debug!("Joining in-flight compilation of '{}'", identifier);
                Attached::InFlight(slot.clone())
            }
            None => Attached::Vacant,
        }
    }

    fn attach(&self, identifier: &str) -> Attached {
        Self::attach_locked(&lock(&self.state), identifier)
    }

    /// Second check after encoding: another requester may have started or
    /// finished the same identifier while the lock was released.
    fn attach_or_start(&self, identifier: &str, encoded: String) -> Attached {
        let mut state = lock(&self.state);
        match Self::attach_locked(&state, identifier) {
            Attached::Vacant => {
                let (sender, slot) = watch::channel(None);
                state.pending.insert(identifier.to_string(), slot.clone());

                // Detached, so dropping this caller's future never strands other waiters.
                tokio::spawn(run_compilation(
                    Arc::clone(&self.engine),
                    Arc::clone(&self.state),
                    identifier.to_string(),
                    encoded,
                    sender,
                ));
                Attached::InFlight(slot)
            }
            attached => attached,
        }
    }

    /// Drop `identifier` from the cache and from the engine's persisted store.
    ///
    /// The in-memory entry is removed even when the engine reports an error.
    /// Handles already given out stay valid; the next compile goes back to
    /// the engine.
    pub async fn delete(&self, identifier: &str) -> Result<(), EngineError> {
        lock(&self.state).entries.remove(identifier);

        let result = self.engine.remove(identifier).await;
        match &result {
            Ok(()) => info!("Deleted rule list '{}'", identifier),
            Err(e) => warn!("Failed to delete '{}': {}", identifier, e),
        }
        result
    }

    /// Identifiers the engine has persisted.
    pub async fn list_available(&self) -> BTreeSet<String> {
        self.engine.identifiers().await
    }
}

async fn run_compilation(
    engine: Arc<dyn FilterEngine>,
    state: Arc<Mutex<CacheState>>,
    identifier: String,
    encoded: String,
    sender: watch::Sender<Option<CompileResult>>,
) {
    let outcome = lookup_or_compile(engine.as_ref(), &identifier, encoded).await;

    {
        let mut state = lock(&state);
        if let Ok(list) = &outcome {
            state.entries.insert(identifier.clone(), list.clone());
        }
        state.pending.remove(&identifier);
    }

    // Every waiter may already be gone; the cache entry is in place regardless.
    let _ = sender.send(Some(outcome));
}

async fn lookup_or_compile(
    engine: &dyn FilterEngine,
    identifier: &str,
    encoded: String,
) -> CompileResult {
    if let Some(list) = engine.lookup(identifier).await? {
        debug!("Reusing persisted rule list '{}'", identifier);
        return Ok(list);
    }

    match engine.compile(identifier, encoded).await {
        Ok(Some(list)) => {
            info!("Compiled rule list '{}' ({} rules)", identifier, list.rule_count());
            Ok(list)
        }
        Ok(None) => {
            warn!("Engine returned neither a rule list nor an error for '{}'", identifier);
            Err(CompileError::Unknown(identifier.to_string()))
        }
        Err(e) => {
            warn!("Failed to compile '{}': {}", identifier, e);
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pg_rules::RuleBuilder;

    use super::*;
    use crate::testing::MockEngine;

    fn document() -> RuleDocument {
        RuleBuilder::new().block_url(r".*\.ads\.js").into_document()
    }

    #[tokio::test]
    async fn test_compile_is_idempotent() {
        let engine = Arc::new(MockEngine::new());
        let cache = CompileCache::new(engine.clone());

        let first = cache.compile("ads", &document()).await.unwrap();
        let second = cache.compile("ads", &document()).await.unwrap();

        assert!(first.ptr_eq(&second));
        assert_eq!(engine.compile_count(), 1);
        assert_eq!(engine.lookup_count(), 1);
        assert!(cache.contains("ads"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_compiles_share_one_engine_call() {
        let engine = Arc::new(MockEngine::with_delay(Duration::from_millis(50)));
        let cache = Arc::new(CompileCache::new(engine.clone()));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.compile("ads", &document()).await })
            })
            .collect();

        let mut lists = Vec::new();
        for handle in handles {
            lists.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(engine.compile_count(), 1);
        assert!(lists.iter().all(|list| list.ptr_eq(&lists[0])));
        assert!(!cache.is_compiling("ads"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_failures_share_one_error() {
        let engine = Arc::new(MockEngine::with_delay(Duration::from_millis(30)));
        engine.fail("broken");
        let cache = Arc::new(CompileCache::new(engine.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.compile("broken", &document()).await })
            })
            .collect();

        let mut errors = Vec::new();
        for handle in handles {
            errors.push(handle.await.unwrap().unwrap_err());
        }

        assert_eq!(engine.compile_count(), 1);
        assert!(errors.iter().all(|err| *err == errors[0]));
        assert!(matches!(errors[0], CompileError::Engine(EngineError::InvalidRuleList { .. })));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_distinct_identifiers_compile_in_parallel() {
        let engine = Arc::new(MockEngine::with_delay(Duration::from_millis(300)));
        let cache = Arc::new(CompileCache::new(engine.clone()));

        let started = std::time::Instant::now();
        let (doc_a, doc_b) = (document(), document());
        let (a, b) = tokio::join!(cache.compile("a", &doc_a), cache.compile("b", &doc_b));
        a.unwrap();
        b.unwrap();

        assert_eq!(engine.compile_count(), 2);
        assert!(started.elapsed() < Duration::from_millis(550));
    }

    #[tokio::test]
    async fn test_failure_is_not_cached() {
        let engine = Arc::new(MockEngine::new());
        engine.fail("flaky");
        let cache = CompileCache::new(engine.clone());

        assert!(cache.compile("flaky", &document()).await.is_err());
        assert!(!cache.contains("flaky"));

        engine.recover("flaky");
        assert!(cache.compile("flaky", &document()).await.is_ok());
        assert_eq!(engine.compile_count(), 2);
    }

    #[tokio::test]
    async fn test_silent_engine_yields_unknown_error() {
        let engine = Arc::new(MockEngine::new());
        engine.stay_silent("quiet");
        let cache = CompileCache::new(engine.clone());

        let err = cache.compile("quiet", &document()).await.unwrap_err();
        assert_eq!(err, CompileError::Unknown("quiet".to_string()));
    }

    #[tokio::test]
    async fn test_persisted_list_skips_compile() {
        let engine = Arc::new(MockEngine::new());
        let persisted = engine.preload("warm", 3);
        let cache = CompileCache::new(engine.clone());

        let list = cache.compile("warm", &document()).await.unwrap();

        assert!(list.ptr_eq(&persisted));
        assert_eq!(engine.compile_count(), 0);
        assert!(cache.contains("warm"));
    }

    #[tokio::test]
    async fn test_lookup_error_propagates() {
        let engine = Arc::new(MockEngine::new());
        engine.fail_lookup("corrupt");
        let cache = CompileCache::new(engine.clone());

        let err = cache.compile("corrupt", &document()).await.unwrap_err();
        assert!(matches!(err, CompileError::Engine(EngineError::Store { .. })));
        assert_eq!(engine.compile_count(), 0);
    }

    #[tokio::test]
    async fn test_delete_forces_recompile() {
        let engine = Arc::new(MockEngine::new());
        let cache = CompileCache::new(engine.clone());

        let held = cache.compile("ads", &document()).await.unwrap();
        cache.delete("ads").await.unwrap();
        assert!(!cache.contains("ads"));

        let fresh = cache.compile("ads", &document()).await.unwrap();
        assert_eq!(engine.compile_count(), 2);
        assert!(!fresh.ptr_eq(&held));
        assert_eq!(held.identifier(), "ads");
    }

    #[tokio::test]
    async fn test_delete_clears_entry_when_engine_fails() {
        let engine = Arc::new(MockEngine::new());
        let cache = CompileCache::new(engine.clone());

        cache.compile("ads", &document()).await.unwrap();
        engine.forget("ads");

        let err = cache.delete("ads").await.unwrap_err();
        assert_eq!(err, EngineError::NotFound("ads".to_string()));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_list_available_delegates_to_engine() {
        let engine = Arc::new(MockEngine::new());
        let cache = CompileCache::new(engine.clone());

        cache.compile("b", &document()).await.unwrap();
        cache.compile("a", &document()).await.unwrap();

        let available: Vec<_> = cache.list_available().await.into_iter().collect();
        assert_eq!(available, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_compile_encoded() {
        let engine = Arc::new(MockEngine::new());
        let cache = CompileCache::new(engine.clone());

        let encoded = RuleBuilder::new().whitelist("safe").block_url("x").build().unwrap();
        let list = cache.compile_encoded("bundle", encoded).await.unwrap();
        assert_eq!(list.rule_count(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_encoding_runs_outside_the_state_lock() {
        let engine = Arc::new(MockEngine::new());
        let cache = CompileCache::new(engine.clone());

        let list = cache
            .compile_with("a", || {
                // Re-entering the cache would deadlock if the lock were held here.
                assert!(!cache.contains("b"));
                assert!(!cache.is_compiling("a"));
                Ok("[]".to_string())
            })
            .await
            .unwrap();
        assert_eq!(list.identifier(), "a");
    }

    #[tokio::test]
    async fn test_entry_filled_during_encoding_is_reused() {
        let engine = Arc::new(MockEngine::new());
        let cache = CompileCache::new(engine.clone());
        let raced = CompiledRuleList::new("a", 1, "[]");

        let list = cache
            .compile_with("a", || {
                lock(&cache.state)
                    .entries
                    .insert("a".to_string(), raced.clone());
                Ok("[]".to_string())
            })
            .await
            .unwrap();

        assert!(list.ptr_eq(&raced));
        assert_eq!(engine.compile_count(), 0);
        assert_eq!(engine.lookup_count(), 0);
    }

    #[tokio::test]
    async fn test_dropped_caller_does_not_strand_waiters() {
        let engine = Arc::new(MockEngine::with_delay(Duration::from_millis(50)));
        let cache = CompileCache::new(engine.clone());

        let doc = document();
        let abandoned = tokio::time::timeout(Duration::from_millis(5), cache.compile("slow", &doc)).await;
        assert!(abandoned.is_err());

        let list = cache.compile("slow", &doc).await.unwrap();
        assert_eq!(list.identifier(), "slow");
        assert_eq!(engine.compile_count(), 1);
    }
}
