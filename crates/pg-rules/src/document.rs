//! Rule documents and the JSON exchange format.
//!
//! A document is an ordered list of rules. Order is significant: the engine
//! evaluates rules top to bottom and an `ignore-previous-rules` action only
//! cancels matches from rules that precede it.

use serde::{Deserialize, Serialize};

use crate::error::RuleError;
use crate::types::Rule;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleDocument {
    rules: Vec<Rule>,
}

impl RuleDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rules(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// Decode a document from its exchange format.
    pub fn from_json(text: &str) -> Result<Self, RuleError> {
        serde_json::from_str(text).map_err(RuleError::Malformed)
    }

    /// Encode the document in the canonical exchange format.
    ///
    /// An empty document encodes to `[]`, which the engine compiles to a
    /// list that matches nothing.
    pub fn to_json(&self) -> Result<String, RuleError> {
        serde_json::to_string_pretty(&self.rules).map_err(RuleError::Serialization)
    }

    pub fn push(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Rule> {
        self.rules.iter()
    }
}

impl From<Vec<Rule>> for RuleDocument {
    fn from(rules: Vec<Rule>) -> Self {
        Self::from_rules(rules)
    }
}

impl IntoIterator for RuleDocument {
    type Item = Rule;
    type IntoIter = std::vec::IntoIter<Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.into_iter()
    }
}

impl<'a> IntoIterator for &'a RuleDocument {
    type Item = &'a Rule;
    type IntoIter = std::slice::Iter<'a, Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Action, Trigger};

    #[test]
    fn test_empty_document_encodes_to_empty_array() {
        let doc = RuleDocument::new();
        assert!(doc.is_empty());
        assert_eq!(doc.to_json().unwrap(), "[]");
    }

    #[test]
    fn test_decode_preserves_order() {
        let text = r#"[
            {"trigger": {"url-filter": ".*"}, "action": {"type": "block"}},
            {"trigger": {"url-filter": "safe"}, "action": {"type": "ignore-previous-rules"}}
        ]"#;
        let doc = RuleDocument::from_json(text).unwrap();
        assert_eq!(doc.len(), 2);
        assert_eq!(doc.rules()[0].action, Action::Block);
        assert_eq!(doc.rules()[1].action, Action::IgnorePreviousRules);
        assert_eq!(doc.rules()[1].trigger, Trigger::url("safe"));
    }

    #[test]
    fn test_decode_rejects_non_array() {
        let err = RuleDocument::from_json(r#"{"trigger": {}}"#).unwrap_err();
        assert!(matches!(err, RuleError::Malformed(_)));
    }

    #[test]
    fn test_decode_rejects_unknown_action() {
        let text = r#"[{"trigger": {"url-filter": ".*"}, "action": {"type": "explode"}}]"#;
        assert!(RuleDocument::from_json(text).is_err());
    }

    #[test]
    fn test_encoding_is_stable() {
        let mut doc = RuleDocument::new();
        doc.push(Rule::new(Trigger::url("a"), Action::MakeHttps));
        let encoded = doc.to_json().unwrap();
        let decoded = RuleDocument::from_json(&encoded).unwrap();
        assert_eq!(decoded, doc);
        assert_eq!(decoded.to_json().unwrap(), encoded);
    }
}
