//! Structural character card check
//!
//! A value qualifies iff it is an object, `spec` is one of the two known
//! tags, `data` is an object, and every required field in `data` is a
//! non-empty string. Nothing deeper is checked.

use crate::card::CardVersion;
use crate::error::{Error, Result};
use serde_json::Value;

/// Fields every card must carry in `data`
pub const REQUIRED_FIELDS: [&str; 6] = [
    "name",
    "description",
    "personality",
    "scenario",
    "first_mes",
    "mes_example",
];

/// Check whether a JSON value is a character card
///
/// Usable on its own for values that did not come from a PNG, e.g. cards
/// fetched from a remote listing.
pub fn is_character_card(value: &Value) -> bool {
    validate(value).is_ok()
}

/// Check a JSON value and report why it was rejected
pub fn validate(value: &Value) -> Result<CardVersion> {
    let card = value
        .as_object()
        .ok_or_else(|| Error::InvalidCard("not a JSON object".into()))?;

    let spec = card
        .get("spec")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::InvalidCard("missing spec".into()))?;
    let version = CardVersion::from_spec(spec)
        .ok_or_else(|| Error::InvalidCard(format!("unknown spec {spec:?}")))?;

    let data = card
        .get("data")
        .and_then(Value::as_object)
        .ok_or_else(|| Error::InvalidCard("data is not an object".into()))?;

    for field in REQUIRED_FIELDS {
        match data.get(field) {
            Some(Value::String(s)) if !s.is_empty() => {}
            Some(Value::String(_)) => {
                return Err(Error::InvalidCard(format!("data.{field} is empty")));
            }
            Some(_) => {
                return Err(Error::InvalidCard(format!("data.{field} is not a string")));
            }
            None => return Err(Error::InvalidCard(format!("missing data.{field}"))),
        }
    }

    Ok(version)
}

/// Loose pre-filter used on EXIF payloads: `spec` mentions a card and
/// `data` is an object
#[cfg_attr(not(feature = "exif"), allow(dead_code))]
pub(crate) fn looks_like_card(value: &Value) -> bool {
    let spec_matches = value
        .get("spec")
        .and_then(Value::as_str)
        .is_some_and(|spec| spec.contains("chara_card"));
    spec_matches && value.get("data").is_some_and(Value::is_object)
}
