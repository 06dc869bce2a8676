//! Built-in named policies.
//!
//! The catalog is built once and never mutated. Policies are expressed as
//! typed documents rather than embedded JSON so they go through the same
//! encoder as user rules.

use std::collections::BTreeMap;

use crate::builder::RuleBuilder;
use crate::document::RuleDocument;
use crate::types::{Action, ResourceType, Rule, Trigger};

/// Identifier of a built-in policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RuleSet {
    Ads,
    Trackers,
    Cookies,
    HttpsUpgrade,
    Social,
}

impl RuleSet {
    pub const ALL: [RuleSet; 5] = [
        Self::Ads,
        Self::Trackers,
        Self::Cookies,
        Self::HttpsUpgrade,
        Self::Social,
    ];

    /// Policies enabled by default blocking.
    pub const DEFAULT_BLOCKING: [RuleSet; 2] = [Self::Ads, Self::Trackers];

    /// Policies enabled by privacy mode.
    pub const PRIVACY: [RuleSet; 4] = [Self::Ads, Self::Trackers, Self::Cookies, Self::Social];

    pub fn identifier(&self) -> &'static str {
        match self {
            Self::Ads => "pinguard.rules.ads",
            Self::Trackers => "pinguard.rules.trackers",
            Self::Cookies => "pinguard.rules.cookies",
            Self::HttpsUpgrade => "pinguard.rules.https",
            Self::Social => "pinguard.rules.social",
        }
    }

    pub fn short_name(&self) -> &'static str {
        match self {
            Self::Ads => "ads",
            Self::Trackers => "trackers",
            Self::Cookies => "cookies",
            Self::HttpsUpgrade => "https",
            Self::Social => "social",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Ads => "Block Ads",
            Self::Trackers => "Block Trackers",
            Self::Cookies => "Block Third-Party Cookies",
            Self::HttpsUpgrade => "Upgrade to HTTPS",
            Self::Social => "Block Social Widgets",
        }
    }

    /// Accepts the full identifier or the short name.
    pub fn from_identifier(identifier: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|set| set.identifier() == identifier || set.short_name() == identifier)
    }

    pub fn document(&self) -> RuleDocument {
        match self {
            Self::Ads => ads(),
            Self::Trackers => trackers(),
            Self::Cookies => cookies(),
            Self::HttpsUpgrade => https_upgrade(),
            Self::Social => social(),
        }
    }
}

fn ads() -> RuleDocument {
    RuleBuilder::new()
        .block_domains(
            [
                "*doubleclick.net",
                "*googlesyndication.com",
                "*googleadservices.com",
                "*google-analytics.com",
                "*adsserver.*",
                "*adservice.*",
            ],
            false,
        )
        .block_url(r".*ads.*\.js")
        .block_url(".*/ad[sx]?/.*")
        .rule(Rule::new(
            Trigger::url(r".*\.gif\?.*tracking").with_resource_types(ResourceType::IMAGE),
            Action::Block,
        ))
        .into_document()
}

fn trackers() -> RuleDocument {
    RuleBuilder::new()
        .block_domains(["*facebook.com", "*fbcdn.net"], true)
        .block_domains(["*analytics.*", "*tracker.*", "*tracking.*", "*telemetry.*"], true)
        .rule(Rule::new(
            Trigger::url(".*beacon.*")
                .with_resource_types(ResourceType::IMAGE | ResourceType::SCRIPT),
            Action::Block,
        ))
        .rule(Rule::new(
            Trigger::url(r".*pixel\..*").with_resource_types(ResourceType::IMAGE),
            Action::Block,
        ))
        .into_document()
}

fn cookies() -> RuleDocument {
    RuleBuilder::new().block_cookies(None, true).into_document()
}

fn https_upgrade() -> RuleDocument {
    RuleBuilder::new()
        .rule(Rule::new(
            Trigger::any_url().with_resource_types(ResourceType::DOCUMENT),
            Action::MakeHttps,
        ))
        .into_document()
}

fn social() -> RuleDocument {
    RuleBuilder::new()
        .rule(Rule::new(
            Trigger::any_url()
                .with_domains(["*facebook.com", "*twitter.com", "*linkedin.com", "*pinterest.com"])
                .third_party()
                .with_resource_types(ResourceType::SCRIPT | ResourceType::IMAGE),
            Action::Block,
        ))
        .rule(Rule::new(Trigger::url(".*share.*button.*").third_party(), Action::Block))
        .into_document()
}

/// Read-only registry of the built-in policies, keyed by identifier.
#[derive(Debug, Clone)]
pub struct RuleCatalog {
    documents: BTreeMap<&'static str, (RuleSet, RuleDocument)>,
}

impl RuleCatalog {
    pub fn new() -> Self {
        let documents = RuleSet::ALL
            .into_iter()
            .map(|set| (set.identifier(), (set, set.document())))
            .collect();
        Self { documents }
    }

    fn entry(&self, identifier: &str) -> Option<&(RuleSet, RuleDocument)> {
        let set = RuleSet::from_identifier(identifier)?;
        self.documents.get(set.identifier())
    }

    pub fn document(&self, identifier: &str) -> Option<&RuleDocument> {
        self.entry(identifier).map(|(_, doc)| doc)
    }

    pub fn rule_set(&self, identifier: &str) -> Option<RuleSet> {
        self.entry(identifier).map(|(set, _)| *set)
    }

    /// Human readable name; unknown identifiers are returned unchanged.
    pub fn display_name(&self, identifier: &str) -> String {
        match self.entry(identifier) {
            Some((set, _)) => set.display_name().to_string(),
            None => identifier.to_string(),
        }
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.entry(identifier).is_some()
    }

    pub fn identifiers(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.documents.keys().copied()
    }
}

impl Default for RuleCatalog {
    fn default() -> Self {
        Self::new()
    }
}
