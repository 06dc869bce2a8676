//! PinGuard Rule Library
//!
//! This crate provides the declarative side of PinGuard content blocking: the
//! typed rule model, a fluent builder, and the catalog of built-in policies.
//! Everything here is synchronous and allocation-light; compilation and
//! caching live in `pg-blocker`.
//!
//! # Modules
//!
//! - `types`: Trigger / action model and its wire encoding
//! - `document`: Ordered rule documents and the JSON exchange format
//! - `builder`: Fluent `RuleBuilder`
//! - `catalog`: Built-in named policies
//! - `error`: Shared error type

pub mod builder;
pub mod catalog;
pub mod document;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use builder::RuleBuilder;
pub use catalog::{RuleCatalog, RuleSet};
pub use document::RuleDocument;
pub use error::RuleError;
pub use types::{Action, LoadType, ResourceType, Rule, Trigger};
