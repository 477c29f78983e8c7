//! Defensive extraction of character cards embedded in PNG images.
//!
//! Character cards are JSON records (`chara_card_v2` / `chara_card_v3`)
//! describing a persona. Producers hide them in PNG ancillary chunks, and
//! they do not agree on where. This crate tries, in order:
//!
//! - `tEXt` chunks keyed `ccv3` or `chara` holding base64 JSON
//!   (`zTXt` / `iTXt` too, with the `compressed-text` feature)
//! - the `eXIf` chunk, as a TIFF directory and as raw bytes scanned for
//!   `Chara\0` / `Ccv 3\0` markers (`exif` feature)
//! - a regex and brace-matching scan for card JSON anywhere in the file
//!   (`heuristic` feature)
//!
//! Every candidate must pass [`is_character_card`] before it is returned.
//!
//! # Design Principles
//!
//! - **Never panics, never throws**: the `extract_*` entry points return
//!   `Option`; the reason for a failure goes to `tracing`
//! - **Bounded**: chunk lengths, IFD sizes and input sizes are capped
//! - **Stateless**: no global state, extraction is safe from any thread
//! - **Read-only**: the PNG is never modified
//!
//! # Quick Start
//!
//! ```no_run
//! // From a file on disk
//! if let Some(card) = chara_io::extract_character_card_from_path("alice.png") {
//!     println!("{} ({})", card.name(), card.spec());
//! }
//! ```
//!
//! ```
//! use chara_io::{extract_character_card, test_utils::PngBuilder, test_utils::V2_ALICE};
//! use base64::Engine as _;
//!
//! let payload = base64::engine::general_purpose::STANDARD.encode(V2_ALICE);
//! let png = PngBuilder::new().text("chara", &payload).build();
//!
//! let card = extract_character_card(&png).unwrap();
//! assert_eq!(card.name(), "Alice");
//! assert_eq!(card.data().first_mes, "hi");
//! ```
//!
//! # Configuration
//!
//! ```
//! use chara_io::{CardExtractor, ExtractOptions, KeywordOrder, Strategy};
//!
//! let extractor = CardExtractor::new(
//!     ExtractOptions::new()
//!         .keyword_order(KeywordOrder::V2First)
//!         .heuristic_search(false),
//! );
//! assert!(!extractor.strategies().contains(&Strategy::Heuristic));
//! ```
//!
//! # Validating JSON from elsewhere
//!
//! ```
//! let value = serde_json::json!({ "spec": "chara_card_v2", "data": { "name": "Alice" } });
//! assert!(!chara_io::is_character_card(&value));
//! ```

mod card;
mod error;
mod extract;
#[cfg(feature = "heuristic")]
mod heuristic;
mod locator;
mod options;
mod payload;
mod png_io;
mod source;
mod text;
#[cfg(feature = "exif")]
mod tiff;
mod validate;

pub use card::{CardVersion, CharacterCard, CharacterData, SPEC_V2, SPEC_V3};
pub use error::{Error, Result};
pub use extract::{CardExtractor, Extraction, Strategy};
#[cfg(feature = "heuristic")]
pub use heuristic::search_patterns;
pub use locator::{locate_card, locate_card_with_order, KeywordOrder, KEYWORD_V2, KEYWORD_V3};
pub use options::ExtractOptions;
pub use payload::{decode_base64, decode_payload};
pub use png_io::{
    read_chunks, read_chunks_with_limit, ChunkReader, RawChunk, DEFAULT_MAX_CHUNK_LEN,
    PNG_SIGNATURE,
};
pub use source::{decode_base64_source, read_path, read_source, SourceBytes, MAX_SOURCE_SIZE};
pub use text::{decode_all_text_chunks, decode_text_chunks, TextChunkKind, TextPair};
#[cfg(feature = "exif")]
pub use tiff::{parse_exif, MAX_IFD_TAGS};
pub use validate::{is_character_card, validate, REQUIRED_FIELDS};

// Test utilities - only compiled for tests or when explicitly enabled
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

/// Extract a character card from PNG bytes with the default options
///
/// Returns `None` when the input is not a PNG or holds no valid card.
pub fn extract_character_card(data: &[u8]) -> Option<CharacterCard> {
    CardExtractor::default().extract(data)
}

/// Extract a character card from a PNG file with the default options
pub fn extract_character_card_from_path<P: AsRef<std::path::Path>>(
    path: P,
) -> Option<CharacterCard> {
    CardExtractor::default().extract_path(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{card_png, sample_card};

    #[test]
    fn test_top_level_extract() {
        let card = sample_card(CardVersion::V2, "Alice");
        let extracted = extract_character_card(&card_png("chara", &card)).unwrap();
        assert_eq!(extracted.version(), CardVersion::V2);
        assert_eq!(extracted.to_value().unwrap(), card);
    }

    #[test]
    fn test_top_level_rejects_non_png() {
        assert!(extract_character_card(&[]).is_none());
        assert!(extract_character_card(b"\x89PNG").is_none());
    }
}
