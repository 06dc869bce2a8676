//! Disk-backed filtering engine.
//!
//! Compiled lists are kept as canonical JSON files, one per identifier, so a
//! restarted process finds its lists again through `lookup` instead of
//! recompiling them.

use std::collections::BTreeSet;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{debug, warn};
use pg_rules::{Action, RuleDocument};
use regex::Regex;

use crate::engine::{CompiledRuleList, EngineError, FilterEngine};

const LIST_EXTENSION: &str = "json";

/// Rule list store rooted at a directory.
#[derive(Debug, Clone)]
pub struct RuleListStore {
    root: PathBuf,
}

impl RuleListStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, identifier: &str) -> Result<PathBuf, EngineError> {
        validate_identifier(identifier)?;
        Ok(self.root.join(format!("{}.{}", identifier, LIST_EXTENSION)))
    }
}

/// Identifiers become file names, so they must not escape the store root.
pub fn validate_identifier(identifier: &str) -> Result<(), EngineError> {
    let invalid = identifier.is_empty()
        || identifier.starts_with('.')
        || identifier.contains(['/', '\\', '\0']);
    if invalid {
        return Err(EngineError::InvalidIdentifier(identifier.to_string()));
    }
    Ok(())
}

/// Decode and validate a document, returning its canonical form.
pub fn compile_document(identifier: &str, encoded: &str) -> Result<CompiledRuleList, EngineError> {
    let invalid = |reason: String| EngineError::InvalidRuleList {
        identifier: identifier.to_string(),
        reason,
    };

    let document = RuleDocument::from_json(encoded).map_err(|e| invalid(e.to_string()))?;

    for (index, rule) in document.iter().enumerate() {
        Regex::new(&rule.trigger.url_filter)
            .map_err(|e| invalid(format!("rule {}: bad url-filter: {}", index, e)))?;

        if let Some(domains) = &rule.trigger.if_domain {
            if domains.is_empty() {
                return Err(invalid(format!("rule {}: empty if-domain", index)));
            }
        }

        if let Action::HideElement { selector } = &rule.action {
            if selector.trim().is_empty() {
                return Err(invalid(format!("rule {}: empty selector", index)));
            }
        }
    }

    let canonical = document.to_json().map_err(|e| invalid(e.to_string()))?;
    Ok(CompiledRuleList::new(identifier, document.len(), canonical))
}

/// Stage into a uniquely named file, then rename over `target`.
///
/// Readers see either the old list or the new one, and concurrent writers of
/// the same identifier never share a staging file.
fn write_atomically(root: &Path, target: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut staging = tempfile::NamedTempFile::new_in(root)?;
    staging.write_all(contents)?;
    staging.as_file().sync_all()?;
    staging.persist(target).map_err(|e| e.error)?;
    Ok(())
}

fn store_error(identifier: &str, err: std::io::Error) -> EngineError {
    EngineError::Store {
        identifier: identifier.to_string(),
        message: err.to_string(),
    }
}

#[async_trait]
impl FilterEngine for RuleListStore {
    async fn lookup(&self, identifier: &str) -> Result<Option<CompiledRuleList>, EngineError> {
        let path = self.path_for(identifier)?;
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(store_error(identifier, e)),
        };
        compile_document(identifier, &text).map(Some)
    }

    async fn compile(
        &self,
        identifier: &str,
        encoded: String,
    ) -> Result<Option<CompiledRuleList>, EngineError> {
        let path = self.path_for(identifier)?;
        let list = compile_document(identifier, &encoded)?;

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| store_error(identifier, e))?;

        let root = self.root.clone();
        let target = path.clone();
        let contents = list.encoded().to_string();
        tokio::task::spawn_blocking(move || write_atomically(&root, &target, contents.as_bytes()))
            .await
            .map_err(|e| EngineError::Store {
                identifier: identifier.to_string(),
                message: e.to_string(),
            })?
            .map_err(|e| store_error(identifier, e))?;

        debug!("Stored rule list '{}' at {}", identifier, path.display());
        Ok(Some(list))
    }

    async fn remove(&self, identifier: &str) -> Result<(), EngineError> {
        let path = self.path_for(identifier)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(EngineError::NotFound(identifier.to_string()))
            }
            Err(e) => Err(store_error(identifier, e)),
        }
    }

    async fn identifiers(&self) -> BTreeSet<String> {
        let mut identifiers = BTreeSet::new();
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != ErrorKind::NotFound {
                    warn!("Failed to list rule lists in {}: {}", self.root.display(), e);
                }
                return identifiers;
            }
        };

        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => {
                    let path = entry.path();
                    if path.extension().and_then(|ext| ext.to_str()) != Some(LIST_EXTENSION) {
                        continue;
                    }
                    if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                        identifiers.insert(stem.to_string());
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Failed to read entry in {}: {}", self.root.display(), e);
                    break;
                }
            }
        }

        identifiers
    }
}
