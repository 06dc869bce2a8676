//! Error type for rule encoding and decoding.

/// Error raised while moving a rule document across the exchange format.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("Failed to encode rules: {0}")]
    Serialization(#[source] serde_json::Error),
    #[error("Malformed rule document: {0}")]
    Malformed(#[source] serde_json::Error),
}
