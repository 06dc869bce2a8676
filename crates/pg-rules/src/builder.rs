//! Fluent construction of rule documents.

use crate::document::RuleDocument;
use crate::error::RuleError;
use crate::types::{Action, LoadType, Rule, Trigger};

/// Incrementally assembles a [`RuleDocument`].
///
/// Every method appends exactly one rule, so the order of calls is the
/// evaluation order of the resulting document.
///
/// ```
/// use pg_rules::RuleBuilder;
///
/// let json = RuleBuilder::new()
///     .block_url(r".*\.ads\.js")
///     .whitelist(r"cdn\.example\.com/safe")
///     .build()
///     .unwrap();
/// assert!(json.contains("ignore-previous-rules"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct RuleBuilder {
    document: RuleDocument,
}

impl RuleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block URLs matching a pattern.
    pub fn block_url(self, pattern: impl Into<String>) -> Self {
        self.rule(Rule::new(Trigger::url(pattern), Action::Block))
    }

    /// Block every load from the given domains.
    pub fn block_domains<I, S>(self, domains: I, third_party_only: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let trigger = Trigger::any_url()
            .with_domains(domains)
            .with_load_type(party(third_party_only));
        self.rule(Rule::new(trigger, Action::Block))
    }

    /// Hide elements matching a CSS selector, optionally only on some domains.
    pub fn hide_elements(self, selector: impl Into<String>, domains: Option<Vec<String>>) -> Self {
        let trigger = scoped(domains);
        self.rule(Rule::new(
            trigger,
            Action::HideElement { selector: selector.into() },
        ))
    }

    /// Block cookies, optionally only from some domains.
    pub fn block_cookies(self, domains: Option<Vec<String>>, third_party_only: bool) -> Self {
        let trigger = scoped(domains).with_load_type(party(third_party_only));
        self.rule(Rule::new(trigger, Action::BlockCookies))
    }

    /// Carve an exception out of the rules added so far.
    pub fn whitelist(self, pattern: impl Into<String>) -> Self {
        self.rule(Rule::new(Trigger::url(pattern), Action::IgnorePreviousRules))
    }

    /// Append an arbitrary rule.
    pub fn rule(mut self, rule: Rule) -> Self {
        self.document.push(rule);
        self
    }

    pub fn len(&self) -> usize {
        self.document.len()
    }

    pub fn is_empty(&self) -> bool {
        self.document.is_empty()
    }

    pub fn into_document(self) -> RuleDocument {
        self.document
    }

    /// Encode the accumulated rules in the exchange format.
    pub fn build(&self) -> Result<String, RuleError> {
        self.document.to_json()
    }
}

fn party(third_party_only: bool) -> LoadType {
    if third_party_only {
        LoadType::ThirdParty
    } else {
        LoadType::Any
    }
}

fn scoped(domains: Option<Vec<String>>) -> Trigger {
    match domains {
        Some(domains) => Trigger::any_url().with_domains(domains),
        None => Trigger::any_url(),
    }
}
