//! Applying named policies to rendering contexts.
//!
//! `ContentBlocker` resolves a policy identifier to a rule document, gets
//! the compiled list from the [`CompileCache`] and registers it with a
//! [`RenderingContext`]. Batches fan out one task per policy and fan the
//! outcomes back in over a channel; a failing policy never aborts the batch.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use pg_rules::{RuleCatalog, RuleDocument, RuleSet};
use tokio::sync::mpsc;

use crate::cache::{CompileCache, CompileError};
use crate::config::BlockerConfig;
use crate::context::RenderingContext;
use crate::engine::{CompiledRuleList, EngineError};
use crate::resources::{DirectoryResources, ResourceLoader};
use crate::store::RuleListStore;

const BUNDLE_EXTENSION: &str = "json";

#[derive(Debug, thiserror::Error)]
pub enum BlockerError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error("Unknown policy '{0}'")]
    UnknownPolicy(String),
    #[error("'{0}' names a built-in policy and cannot be reused")]
    ReservedIdentifier(String),
    #[error("Could not find {0} in bundle")]
    ResourceNotFound(String),
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Applying '{identifier}' timed out after {after:?}")]
    Timeout { identifier: String, after: Duration },
}

/// Per-policy outcome of a batch apply, keyed by the requested identifier.
pub type ApplyReport = BTreeMap<String, bool>;

/// Applies catalog, ad hoc and bundled policies to rendering contexts.
///
/// Cloning is cheap and clones share the same cache.
#[derive(Clone)]
pub struct ContentBlocker {
    cache: Arc<CompileCache>,
    catalog: Arc<RuleCatalog>,
    resources: Option<Arc<dyn ResourceLoader>>,
    compile_timeout: Option<Duration>,
}

impl ContentBlocker {
    pub fn new(cache: Arc<CompileCache>, catalog: Arc<RuleCatalog>) -> Self {
        Self {
            cache,
            catalog,
            resources: None,
            compile_timeout: None,
        }
    }

    /// Blocker over a [`RuleListStore`] and the built-in catalog.
    pub fn from_config(config: &BlockerConfig) -> Self {
        let store = RuleListStore::new(config.store_dir.clone());
        let mut blocker = Self::new(
            Arc::new(CompileCache::new(Arc::new(store))),
            Arc::new(RuleCatalog::new()),
        );
        if let Some(dir) = &config.resource_dir {
            blocker = blocker.with_resources(Arc::new(DirectoryResources::new(dir.clone())));
        }
        if let Some(after) = config.compile_timeout() {
            blocker = blocker.with_compile_timeout(after);
        }
        blocker
    }

    pub fn with_resources(mut self, resources: Arc<dyn ResourceLoader>) -> Self {
        self.resources = Some(resources);
        self
    }

    /// Bound how long a single apply waits for its compilation.
    ///
    /// The compilation itself keeps running and still fills the cache.
    pub fn with_compile_timeout(mut self, after: Duration) -> Self {
        self.compile_timeout = Some(after);
        self
    }

    pub fn cache(&self) -> &Arc<CompileCache> {
        &self.cache
    }

    pub fn catalog(&self) -> &Arc<RuleCatalog> {
        &self.catalog
    }

    /// Catalog short names map to their full identifier; anything else is kept.
    fn canonical(&self, identifier: &str) -> String {
        match self.catalog.rule_set(identifier) {
            Some(set) => set.identifier().to_string(),
            None => identifier.to_string(),
        }
    }

    /// Ad hoc and bundled lists may not shadow a catalog policy, so every
    /// operation resolves an identifier to the same cache key.
    fn ensure_not_reserved(&self, identifier: &str) -> Result<(), BlockerError> {
        if self.catalog.contains(identifier) {
            return Err(BlockerError::ReservedIdentifier(identifier.to_string()));
        }
        Ok(())
    }

    fn register_cached(&self, identifier: &str, context: &dyn RenderingContext) -> Option<CompiledRuleList> {
        let list = self.cache.cached(identifier)?;
        debug!("Registering cached rule list '{}'", identifier);
        context.register(&list);
        Some(list)
    }

    async fn within_deadline<F>(&self, identifier: &str, compile: F) -> Result<CompiledRuleList, BlockerError>
    where
        F: Future<Output = Result<CompiledRuleList, CompileError>>,
    {
        match self.compile_timeout {
            Some(after) => match tokio::time::timeout(after, compile).await {
                Ok(outcome) => Ok(outcome?),
                Err(_) => Err(BlockerError::Timeout {
                    identifier: identifier.to_string(),
                    after,
                }),
            },
            None => Ok(compile.await?),
        }
    }

    /// Apply a policy known to the catalog, or one already in the cache.
    pub async fn try_apply(
        &self,
        identifier: &str,
        context: &dyn RenderingContext,
    ) -> Result<CompiledRuleList, BlockerError> {
        let identifier = self.canonical(identifier);
        if let Some(list) = self.register_cached(&identifier, context) {
            return Ok(list);
        }

        let document = self
            .catalog
            .document(&identifier)
            .ok_or_else(|| BlockerError::UnknownPolicy(identifier.clone()))?;
        let list = self
            .within_deadline(&identifier, self.cache.compile(&identifier, document))
            .await?;
        context.register(&list);
        Ok(list)
    }

    /// [`ContentBlocker::try_apply`], reporting only whether it worked.
    pub async fn apply(&self, identifier: &str, context: &dyn RenderingContext) -> bool {
        match self.try_apply(identifier, context).await {
            Ok(_) => true,
            Err(e) => {
                warn!("Failed to apply '{}': {}", identifier, e);
                false
            }
        }
    }

    /// Apply a caller-supplied document under `identifier`.
    ///
    /// If `identifier` is already cached the cached list wins and `document`
    /// is ignored; delete it first to replace it. Catalog identifiers and
    /// short names are rejected.
    pub async fn apply_document(
        &self,
        identifier: &str,
        document: &RuleDocument,
        context: &dyn RenderingContext,
    ) -> Result<CompiledRuleList, BlockerError> {
        self.ensure_not_reserved(identifier)?;
        if let Some(list) = self.register_cached(identifier, context) {
            return Ok(list);
        }
        let list = self
            .within_deadline(identifier, self.cache.compile(identifier, document))
            .await?;
        context.register(&list);
        Ok(list)
    }

    /// Apply the bundled `<basename>.json` document, cached under `basename`.
    pub async fn apply_bundled(
        &self,
        basename: &str,
        context: &dyn RenderingContext,
    ) -> Result<CompiledRuleList, BlockerError> {
        self.ensure_not_reserved(basename)?;
        if let Some(list) = self.register_cached(basename, context) {
            return Ok(list);
        }

        let not_found = || BlockerError::ResourceNotFound(format!("{}.{}", basename, BUNDLE_EXTENSION));
        let resources = self.resources.as_ref().ok_or_else(not_found)?;
        let path = resources
            .locate(basename, BUNDLE_EXTENSION)
            .ok_or_else(not_found)?;
        let encoded = resources
            .read_text(&path)
            .map_err(|source| BlockerError::Io { path, source })?;

        let list = self
            .within_deadline(basename, self.cache.compile_encoded(basename, encoded))
            .await?;
        context.register(&list);
        Ok(list)
    }

    /// Apply every policy concurrently and report each outcome.
    ///
    /// Completes only once every policy has finished. The report has one
    /// entry per distinct requested identifier.
    pub async fn apply_many<I, S>(&self, identifiers: I, context: Arc<dyn RenderingContext>) -> ApplyReport
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let requested: BTreeSet<String> = identifiers.into_iter().map(Into::into).collect();
        let (sender, mut receiver) = mpsc::channel(requested.len().max(1));

        for identifier in &requested {
            let blocker = self.clone();
            let context = Arc::clone(&context);
            let sender = sender.clone();
            let identifier = identifier.clone();
            tokio::spawn(async move {
                let applied = blocker.apply(&identifier, context.as_ref()).await;
                let _ = sender.send((identifier, applied)).await;
            });
        }
        drop(sender);

        let mut report = ApplyReport::new();
        while let Some((identifier, applied)) = receiver.recv().await {
            report.insert(identifier, applied);
        }

        // A task that died before reporting counts as a failure.
        for identifier in requested {
            report.entry(identifier).or_insert(false);
        }
        report
    }

    async fn apply_all(&self, sets: &[RuleSet], context: Arc<dyn RenderingContext>) -> bool {
        let report = self
            .apply_many(sets.iter().map(RuleSet::identifier), context)
            .await;
        report.values().all(|applied| *applied)
    }

    /// Ads and trackers; true only if both applied.
    pub async fn enable_default_blocking(&self, context: Arc<dyn RenderingContext>) -> bool {
        self.apply_all(&RuleSet::DEFAULT_BLOCKING, context).await
    }

    /// Ads, trackers, cookies and social widgets; true only if all applied.
    pub async fn enable_privacy_mode(&self, context: Arc<dyn RenderingContext>) -> bool {
        self.apply_all(&RuleSet::PRIVACY, context).await
    }

    /// Detach a policy from `context`. The cache is left untouched.
    pub fn remove(&self, identifier: &str, context: &dyn RenderingContext) {
        context.unregister(&self.canonical(identifier));
    }

    pub fn remove_all(&self, context: &dyn RenderingContext) {
        context.unregister_all();
    }

    /// Delete a compiled policy from the cache and the engine's store.
    pub async fn delete(&self, identifier: &str) -> Result<(), EngineError> {
        self.cache.delete(&self.canonical(identifier)).await
    }

    pub async fn list_available(&self) -> BTreeSet<String> {
        self.cache.list_available().await
    }
}
