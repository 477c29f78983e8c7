//! Character card model
//!
//! Untrusted JSON stays a [`serde_json::Value`] until it passes
//! [`validate`](crate::validate::validate); only then is it materialized as a
//! [`CharacterCard`].

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Spec tag for V2 cards
pub const SPEC_V2: &str = "chara_card_v2";

/// Spec tag for V3 cards
pub const SPEC_V3: &str = "chara_card_v3";

/// Card format version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CardVersion {
    /// `chara_card_v2`, stored under the `chara` keyword
    V2,
    /// `chara_card_v3`, stored under the `ccv3` keyword
    V3,
}

impl CardVersion {
    /// Parse a `spec` tag
    pub fn from_spec(spec: &str) -> Option<Self> {
        match spec {
            SPEC_V2 => Some(Self::V2),
            SPEC_V3 => Some(Self::V3),
            _ => None,
        }
    }

    /// The `spec` tag
    pub fn spec(&self) -> &'static str {
        match self {
            Self::V2 => SPEC_V2,
            Self::V3 => SPEC_V3,
        }
    }

    /// The `spec_version` written by conforming producers
    pub fn default_spec_version(&self) -> &'static str {
        match self {
            Self::V2 => "2.0",
            Self::V3 => "3.0",
        }
    }

    /// PNG text keyword conventionally used for this version
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::V2 => "chara",
            Self::V3 => "ccv3",
        }
    }
}

impl std::fmt::Display for CardVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.spec())
    }
}

/// A validated character card
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "spec")]
pub enum CharacterCard {
    /// `chara_card_v2`
    #[serde(rename = "chara_card_v2")]
    V2 {
        #[serde(default = "spec_version_v2", deserialize_with = "de::spec_version_v2")]
        spec_version: String,
        data: CharacterData,
    },
    /// `chara_card_v3`
    #[serde(rename = "chara_card_v3")]
    V3 {
        #[serde(default = "spec_version_v3", deserialize_with = "de::spec_version_v3")]
        spec_version: String,
        data: CharacterData,
    },
}

fn spec_version_v2() -> String {
    CardVersion::V2.default_spec_version().to_string()
}

fn spec_version_v3() -> String {
    CardVersion::V3.default_spec_version().to_string()
}

impl CharacterCard {
    /// Build a card with the conventional `spec_version`
    pub fn new(version: CardVersion, data: CharacterData) -> Self {
        let spec_version = version.default_spec_version().to_string();
        match version {
            CardVersion::V2 => Self::V2 { spec_version, data },
            CardVersion::V3 => Self::V3 { spec_version, data },
        }
    }

    /// Validate an untrusted JSON value and materialize it
    ///
    /// Succeeds for every value [`validate`](crate::validate()) accepts: fields
    /// outside the required six never fail deserialization.
    pub fn from_value(value: Value) -> Result<Self> {
        crate::validate::validate(&value)?;
        serde_json::from_value(value).map_err(|e| Error::InvalidCard(e.to_string()))
    }

    /// Card format version
    pub fn version(&self) -> CardVersion {
        match self {
            Self::V2 { .. } => CardVersion::V2,
            Self::V3 { .. } => CardVersion::V3,
        }
    }

    /// The `spec` tag
    pub fn spec(&self) -> &'static str {
        self.version().spec()
    }

    /// The `spec_version` as found in the card
    pub fn spec_version(&self) -> &str {
        match self {
            Self::V2 { spec_version, .. } | Self::V3 { spec_version, .. } => spec_version,
        }
    }

    /// Character fields
    pub fn data(&self) -> &CharacterData {
        match self {
            Self::V2 { data, .. } | Self::V3 { data, .. } => data,
        }
    }

    /// Take the character fields
    pub fn into_data(self) -> CharacterData {
        match self {
            Self::V2 { data, .. } | Self::V3 { data, .. } => data,
        }
    }

    /// Character name
    pub fn name(&self) -> &str {
        &self.data().name
    }

    /// Serialize back to a JSON value
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Serialize to a compact JSON string
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Character fields shared by V2 and V3 cards
///
/// Fields this crate doesn't model (`character_book`, `extensions`,
/// `post_history_instructions`, V3 assets, ...) are kept verbatim in
/// [`extra`](Self::extra).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CharacterData {
    pub name: String,
    pub description: String,
    pub personality: String,
    pub scenario: String,
    pub first_mes: String,
    pub mes_example: String,

    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "de::opt_string")]
    pub creator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "de::opt_string")]
    pub character_version: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "de::string_list")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "de::opt_string")]
    pub creator_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "de::opt_string")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "de::string_list")]
    pub alternate_greetings: Vec<String>,
    /// Usually a number, some producers write a numeric string
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "de::opt_number")]
    pub talkativeness: Option<f64>,

    /// Everything else found in `data`
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Deserializers tolerant of the type drift seen in the wild
mod de {
    use super::CardVersion;
    use serde::de::Deserializer;
    use serde::Deserialize;
    use serde_json::Value;

    fn spec_version<'de, D: Deserializer<'de>>(
        d: D,
        version: CardVersion,
    ) -> Result<String, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            _ => version.default_spec_version().to_string(),
        })
    }

    /// `spec_version` of a V2 card; unusable values fall back to `"2.0"`
    pub(super) fn spec_version_v2<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        spec_version(d, CardVersion::V2)
    }

    pub(super) fn spec_version_v3<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        spec_version(d, CardVersion::V3)
    }

    pub(super) fn opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        })
    }

    pub(super) fn string_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect(),
            Value::String(s) if !s.is_empty() => vec![s],
            _ => Vec::new(),
        })
    }

    pub(super) fn opt_number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
    }
}
