//! Base64 / JSON payload decoding shared by every strategy

use crate::error::{Error, Result};
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;
use serde_json::Value;

// Producers disagree on padding; accept both
const LENIENT: GeneralPurposeConfig = GeneralPurposeConfig::new()
    .with_decode_padding_mode(DecodePaddingMode::Indifferent)
    .with_decode_allow_trailing_bits(true);

const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT);
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT);

/// Whether a byte belongs to the standard base64 alphabet (padding included)
#[cfg_attr(not(feature = "exif"), allow(dead_code))]
pub(crate) fn is_base64_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'+' || b == b'/' || b == b'='
}

/// Whether a whole string is made of base64 characters (whitespace allowed)
#[cfg_attr(not(feature = "exif"), allow(dead_code))]
pub(crate) fn is_base64_text(text: &str) -> bool {
    text.bytes()
        .all(|b| is_base64_byte(b) || b.is_ascii_whitespace())
}

/// Decode base64, ignoring whitespace and missing padding
///
/// The standard alphabet is tried first, then the URL-safe one.
pub fn decode_base64(text: &str) -> Result<Vec<u8>> {
    let cleaned: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    match STANDARD_LENIENT.decode(&cleaned) {
        Ok(bytes) => Ok(bytes),
        Err(e) => URL_SAFE_LENIENT.decode(&cleaned).map_err(|_| Error::Base64(e)),
    }
}

/// Decode a text payload into JSON
///
/// Accepts base64-encoded JSON (the normal case) or a bare JSON object.
pub fn decode_payload(text: &str) -> Result<Value> {
    let trimmed = text.trim();
    if trimmed.starts_with('{') {
        return Ok(serde_json::from_str(trimmed)?);
    }
    let json = String::from_utf8(decode_base64(trimmed)?)?;
    Ok(serde_json::from_str(json.trim_start_matches('\u{feff}'))?)
}

/// Parse the first JSON value in a buffer, ignoring whatever follows it
#[cfg_attr(not(feature = "exif"), allow(dead_code))]
pub(crate) fn parse_json_prefix(bytes: &[u8]) -> Result<Value> {
    let mut values = serde_json::Deserializer::from_slice(bytes).into_iter::<Value>();
    match values.next() {
        Some(value) => Ok(value?),
        None => Err(Error::InvalidCard("empty payload".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};

    #[test]
    fn test_base64_variants() {
        let json = r#"{"a":"b?>"}"#;
        let padded = STANDARD.encode(json);
        let unpadded = padded.trim_end_matches('=');
        let wrapped: String = padded
            .as_bytes()
            .chunks(8)
            .map(|c| format!("{}\r\n", std::str::from_utf8(c).unwrap()))
            .collect();

        for encoded in [padded.as_str(), unpadded, wrapped.as_str()] {
            assert_eq!(decode_base64(encoded).unwrap(), json.as_bytes());
        }

        let url_safe = URL_SAFE_NO_PAD.encode(json);
        assert_eq!(decode_base64(&url_safe).unwrap(), json.as_bytes());
    }

    #[test]
    fn test_decode_payload() {
        let encoded = STANDARD.encode(r#"{"spec":"chara_card_v2"}"#);
        assert_eq!(decode_payload(&encoded).unwrap()["spec"], "chara_card_v2");

        let raw = decode_payload("  {\"spec\":\"x\"}\n").unwrap();
        assert_eq!(raw["spec"], "x");

        let bom = STANDARD.encode("\u{feff}{\"k\":1}");
        assert_eq!(decode_payload(&bom).unwrap()["k"], 1);
    }

    #[test]
    fn test_decode_payload_errors() {
        assert!(matches!(decode_payload("%%% not base64 %%%"), Err(Error::Base64(_))));
        assert!(matches!(
            decode_payload(&STANDARD.encode([0xff, 0xfe, 0xfd])),
            Err(Error::Utf8(_))
        ));
        assert!(matches!(
            decode_payload(&STANDARD.encode("not json")),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn test_parse_json_prefix() {
        let value = parse_json_prefix(b"{\"k\":[1,2]}\0\0garbage").unwrap();
        assert_eq!(value["k"][1], 2);
        assert!(parse_json_prefix(b"").is_err());
        assert!(parse_json_prefix(b"   ").is_err());
        assert!(parse_json_prefix(b"garbage").is_err());
    }

    #[test]
    fn test_base64_class() {
        assert!(is_base64_text("QUJD\nREVG=="));
        assert!(!is_base64_text("QUJD-REVG"));
        assert!(is_base64_byte(b'+'));
        assert!(!is_base64_byte(0));
    }
}
