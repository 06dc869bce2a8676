//! PinGuard Blocker
//!
//! This crate turns rule documents into engine-compiled rule lists, caches
//! them by identifier and applies them to rendering contexts.
//!
//! # Architecture
//!
//! The filtering engine is opaque and sits behind the [`FilterEngine`]
//! trait. [`CompileCache`] guarantees at most one compilation in flight per
//! identifier and shares its outcome with every concurrent requester.
//! [`ContentBlocker`] resolves policies through the catalog, compiles or
//! fetches them from the cache and registers them with a
//! [`RenderingContext`].
//!
//! # Modules
//!
//! - `engine`: Engine boundary and compiled list handle
//! - `store`: Disk-backed engine
//! - `cache`: Single-flight compile cache
//! - `context`: Rendering contexts
//! - `resources`: Bundled rule documents
//! - `coordinator`: Policy application
//! - `config`: Configuration file

pub mod cache;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod engine;
pub mod resources;
pub mod store;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use cache::{CompileCache, CompileError, CompileResult};
pub use config::{BlockerConfig, ConfigError};
pub use context::{ContentController, RenderingContext};
pub use coordinator::{ApplyReport, BlockerError, ContentBlocker};
pub use engine::{CompiledRuleList, EngineError, FilterEngine};
pub use resources::{DirectoryResources, ResourceLoader};
pub use store::RuleListStore;
