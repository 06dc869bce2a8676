//! Core rule type definitions for PinGuard
//!
//! These types map directly to the JSON content blocking format consumed by
//! the filtering engine. Every field is strongly typed and goes through a
//! single serde encoder, so a rule can never carry a malformed key.

use serde::de::Error as _;
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// URL filter matching every request.
pub const MATCH_ALL: &str = ".*";

// =============================================================================
// Load Type
// =============================================================================

/// Party restriction of a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LoadType {
    /// Matches first-party and third-party loads
    #[default]
    Any,
    /// Only loads from the same site as the page
    FirstParty,
    /// Only loads from a different site than the page
    ThirdParty,
}

const LOAD_TYPE_NAMES: &[&str] = &["first-party", "third-party"];

impl LoadType {
    pub fn is_any(&self) -> bool {
        matches!(self, Self::Any)
    }

    fn wire_names(&self) -> &'static [&'static str] {
        match self {
            Self::Any => &[],
            Self::FirstParty => &LOAD_TYPE_NAMES[..1],
            Self::ThirdParty => &LOAD_TYPE_NAMES[1..],
        }
    }
}

impl Serialize for LoadType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.wire_names().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for LoadType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let names = Vec::<String>::deserialize(deserializer)?;
        let mut first_party = false;
        let mut third_party = false;
        for name in &names {
            match name.as_str() {
                "first-party" => first_party = true,
                "third-party" => third_party = true,
                other => return Err(D::Error::unknown_variant(other, LOAD_TYPE_NAMES)),
            }
        }
        Ok(match (first_party, third_party) {
            (true, false) => Self::FirstParty,
            (false, true) => Self::ThirdParty,
            // Both (or neither) means no party restriction.
            _ => Self::Any,
        })
    }
}

// =============================================================================
// Resource Types (bit mask for type filtering)
// =============================================================================

bitflags::bitflags! {
    /// Resource type bit mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ResourceType: u16 {
        const DOCUMENT = 1 << 0;
        const IMAGE = 1 << 1;
        const STYLE_SHEET = 1 << 2;
        const SCRIPT = 1 << 3;
        const FONT = 1 << 4;
        const RAW = 1 << 5;  // fetch/xhr in older engines
        const SVG_DOCUMENT = 1 << 6;
        const MEDIA = 1 << 7;
        const POPUP = 1 << 8;
        const PING = 1 << 9;
        const FETCH = 1 << 10;
        const WEBSOCKET = 1 << 11;
        const OTHER = 1 << 12;
    }
}

const RESOURCE_TYPE_NAMES: &[&str] = &[
    "document",
    "image",
    "style-sheet",
    "script",
    "font",
    "raw",
    "svg-document",
    "media",
    "popup",
    "ping",
    "fetch",
    "websocket",
    "other",
];

impl ResourceType {
    /// Parse a single wire name.
    pub fn from_wire_name(name: &str) -> Option<Self> {
        let index = RESOURCE_TYPE_NAMES.iter().position(|n| *n == name)?;
        Self::from_bits(1 << index)
    }

    /// Wire names of the set flags, in bit order.
    pub fn names(&self) -> Vec<&'static str> {
        RESOURCE_TYPE_NAMES
            .iter()
            .enumerate()
            .filter(|(bit, _)| self.bits() & (1 << bit) != 0)
            .map(|(_, name)| *name)
            .collect()
    }
}

impl Serialize for ResourceType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let names = self.names();
        let mut seq = serializer.serialize_seq(Some(names.len()))?;
        for name in names {
            seq.serialize_element(name)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for ResourceType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let names = Vec::<String>::deserialize(deserializer)?;
        names.iter().try_fold(Self::empty(), |mask, name| {
            Self::from_wire_name(name)
                .map(|flag| mask | flag)
                .ok_or_else(|| D::Error::unknown_variant(name, RESOURCE_TYPE_NAMES))
        })
    }
}

// =============================================================================
// Trigger
// =============================================================================

/// Match condition of a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    /// Regular expression matched against the request URL
    #[serde(rename = "url-filter")]
    pub url_filter: String,
    /// Restrict the rule to these domains (`*` prefix matches subdomains)
    #[serde(rename = "if-domain", default, skip_serializing_if = "Option::is_none")]
    pub if_domain: Option<Vec<String>>,
    #[serde(rename = "load-type", default, skip_serializing_if = "LoadType::is_any")]
    pub load_type: LoadType,
    #[serde(rename = "resource-type", default, skip_serializing_if = "ResourceType::is_empty")]
    pub resource_type: ResourceType,
}

impl Trigger {
    pub fn url(pattern: impl Into<String>) -> Self {
        Self {
            url_filter: pattern.into(),
            if_domain: None,
            load_type: LoadType::Any,
            resource_type: ResourceType::empty(),
        }
    }

    /// Trigger matching every URL; narrow it with the `with_*` methods.
    pub fn any_url() -> Self {
        Self::url(MATCH_ALL)
    }

    pub fn with_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.if_domain = Some(domains.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_load_type(mut self, load_type: LoadType) -> Self {
        self.load_type = load_type;
        self
    }

    pub fn third_party(self) -> Self {
        self.with_load_type(LoadType::ThirdParty)
    }

    pub fn with_resource_types(mut self, types: ResourceType) -> Self {
        self.resource_type = types;
        self
    }
}

// =============================================================================
// Action
// =============================================================================

/// Effect applied when a trigger matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Action {
    /// Cancel the load
    Block,
    /// Strip cookies from the request and ignore Set-Cookie on the response
    BlockCookies,
    /// Rewrite http:// to https://
    MakeHttps,
    /// Hide elements matching a CSS selector
    #[serde(rename = "css-display-none")]
    HideElement { selector: String },
    /// Cancel matches from earlier rules in the same document
    IgnorePreviousRules,
}

impl Action {
    /// Wire name of the action's `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Block => "block",
            Self::BlockCookies => "block-cookies",
            Self::MakeHttps => "make-https",
            Self::HideElement { .. } => "css-display-none",
            Self::IgnorePreviousRules => "ignore-previous-rules",
        }
    }
}

// =============================================================================
// Rule
// =============================================================================

/// One trigger/action pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub trigger: Trigger,
    pub action: Action,
}

impl Rule {
    pub fn new(trigger: Trigger, action: Action) -> Self {
        Self { trigger, action }
    }
}
