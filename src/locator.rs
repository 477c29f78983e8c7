//! Card lookup among decoded text pairs

use crate::payload::decode_payload;
use crate::text::TextPair;
use crate::validate::validate;
use serde_json::Value;

/// Keyword for V3 cards
pub const KEYWORD_V3: &str = "ccv3";

/// Keyword for V2 cards
pub const KEYWORD_V2: &str = "chara";

/// Order in which the card keywords are searched
///
/// V3 cards are documented to take precedence over the V2 copy that most
/// producers write alongside them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum KeywordOrder {
    /// `ccv3`, then `chara`
    #[default]
    V3First,
    /// `chara`, then `ccv3`
    V2First,
}

impl KeywordOrder {
    /// Keywords in search order
    pub fn keywords(&self) -> [&'static str; 2] {
        match self {
            Self::V3First => [KEYWORD_V3, KEYWORD_V2],
            Self::V2First => [KEYWORD_V2, KEYWORD_V3],
        }
    }
}

/// Find the first usable card among text pairs, V3 first
///
/// Returns the card as untyped JSON that has already passed validation.
/// `None` is the normal result when no pair carries a card.
pub fn locate_card(pairs: &[TextPair]) -> Option<Value> {
    locate_card_with_order(pairs, KeywordOrder::default())
}

/// Find the first usable card among text pairs in the given keyword order
pub fn locate_card_with_order(pairs: &[TextPair], order: KeywordOrder) -> Option<Value> {
    order.keywords().into_iter().find_map(|keyword| {
        pairs
            .iter()
            .filter(|pair| pair.has_keyword(keyword))
            .find_map(decode_candidate)
    })
}

fn decode_candidate(pair: &TextPair) -> Option<Value> {
    let value = match decode_payload(&pair.text) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!(
                keyword = %pair.keyword,
                chunk = %pair.kind,
                error = %e,
                "text payload could not be decoded"
            );
            return None;
        }
    };

    match validate(&value) {
        Ok(version) => {
            tracing::debug!(keyword = %pair.keyword, %version, "card found in text chunk");
            Some(value)
        }
        Err(e) => {
            tracing::debug!(keyword = %pair.keyword, error = %e, "text payload is not a card");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::CardVersion;
    use crate::test_utils::{encode_card, sample_card};
    use crate::text::TextChunkKind;

    fn pair(keyword: &str, text: &str) -> TextPair {
        TextPair {
            keyword: keyword.into(),
            text: text.into(),
            kind: TextChunkKind::Text,
        }
    }

    #[test]
    fn test_v3_takes_precedence() {
        let v2 = sample_card(CardVersion::V2, "Old");
        let v3 = sample_card(CardVersion::V3, "New");
        let pairs = vec![
            pair("chara", &encode_card(&v2)),
            pair("ccv3", &encode_card(&v3)),
        ];

        assert_eq!(locate_card(&pairs), Some(v3));
        assert_eq!(locate_card_with_order(&pairs, KeywordOrder::V2First), Some(v2));
    }

    #[test]
    fn test_keyword_case_insensitive() {
        let v2 = sample_card(CardVersion::V2, "Alice");
        let pairs = vec![pair("Chara", &encode_card(&v2))];
        assert_eq!(locate_card(&pairs), Some(v2));
    }

    #[test]
    fn test_invalid_v3_falls_back_to_v2() {
        let v2 = sample_card(CardVersion::V2, "Alice");
        let mut broken = sample_card(CardVersion::V3, "Alice");
        broken["data"].as_object_mut().unwrap().remove("mes_example");

        let pairs = vec![
            pair("ccv3", "definitely not base64!"),
            pair("ccv3", &encode_card(&broken)),
            pair("chara", &encode_card(&v2)),
        ];
        assert_eq!(locate_card(&pairs), Some(v2));
    }

    #[test]
    fn test_duplicate_keyword_uses_first_valid() {
        let first = sample_card(CardVersion::V2, "First");
        let second = sample_card(CardVersion::V2, "Second");
        let pairs = vec![
            pair("chara", "garbage"),
            pair("chara", &encode_card(&first)),
            pair("chara", &encode_card(&second)),
        ];
        assert_eq!(locate_card(&pairs), Some(first));
    }

    #[test]
    fn test_nothing_usable() {
        assert_eq!(locate_card(&[]), None);
        let pairs = vec![
            pair("Comment", &encode_card(&sample_card(CardVersion::V2, "Alice"))),
            pair("chara", "bm90IGpzb24="),
        ];
        assert_eq!(locate_card(&pairs), None);
    }

    #[test]
    fn test_raw_json_payload() {
        let v2 = sample_card(CardVersion::V2, "Alice");
        let pairs = vec![pair("chara", &v2.to_string())];
        assert_eq!(locate_card(&pairs), Some(v2));
    }
}
