//! Extraction pipeline
//!
//! The chunk stream is walked once; each strategy then looks at the result
//! (or the raw bytes) and the first one producing a valid card wins:
//!
//! 1. [`Strategy::TextChunks`]: `ccv3` / `chara` text chunks
//! 2. [`Strategy::Exif`]: TIFF values and markers in `eXIf` chunks
//! 3. [`Strategy::Heuristic`]: JSON fragments anywhere in the file
//!
//! A structural error in the chunk stream only shortens the list of chunks
//! the first two strategies see. A missing signature ends extraction
//! immediately.

use crate::card::CharacterCard;
use crate::error::{Error, Result};
use crate::locator::locate_card_with_order;
use crate::options::ExtractOptions;
use crate::png_io::{read_chunks_partial, RawChunk};
use crate::source::{decode_base64_source, read_path, read_source};
use crate::text::{decode_all_text_chunks, decode_text_chunks};
use serde_json::Value;
use std::io::Read;
use std::path::Path;

/// One way of finding a card in a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Keyword lookup in PNG text chunks
    TextChunks,
    /// TIFF walk and marker scan inside `eXIf` chunks
    Exif,
    /// Regex and brace matching over the whole file
    Heuristic,
}

impl Strategy {
    /// Get the strategy name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TextChunks => "text-chunks",
            Self::Exif => "exif",
            Self::Heuristic => "heuristic",
        }
    }

    fn run(&self, scan: &Scan<'_>, options: &ExtractOptions) -> Option<Value> {
        match self {
            Self::TextChunks => {
                let pairs = if options.compressed_text {
                    decode_all_text_chunks(&scan.chunks)
                } else {
                    decode_text_chunks(&scan.chunks)
                };
                tracing::trace!(pairs = pairs.len(), "decoded text chunks");
                locate_card_with_order(&pairs, options.keyword_order)
            }
            #[cfg(feature = "exif")]
            Self::Exif => scan
                .chunks
                .iter()
                .filter(|c| c.is_type(crate::png_io::EXIF))
                .find_map(|c| crate::tiff::parse_exif(c.data)),
            #[cfg(feature = "heuristic")]
            Self::Heuristic => crate::heuristic::search_patterns(scan.bytes),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A card together with the strategy that found it
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub card: CharacterCard,
    pub strategy: Strategy,
}

/// Everything the strategies share for one input
struct Scan<'a> {
    #[cfg_attr(not(feature = "heuristic"), allow(dead_code))]
    bytes: &'a [u8],
    chunks: Vec<RawChunk<'a>>,
}

/// Character card extractor
///
/// Holds no state besides its options; one extractor can serve any number of
/// concurrent calls.
///
/// # Example
///
/// ```no_run
/// use chara_io::{CardExtractor, ExtractOptions};
///
/// let extractor = CardExtractor::new(ExtractOptions::default());
/// match extractor.extract_path("avatar.png") {
///     Some(card) => println!("{} ({})", card.name(), card.spec()),
///     None => println!("file does not contain valid character data"),
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct CardExtractor {
    options: ExtractOptions,
}

impl CardExtractor {
    /// Create an extractor with the given options
    pub fn new(options: ExtractOptions) -> Self {
        Self { options }
    }

    /// Options in effect
    pub fn options(&self) -> &ExtractOptions {
        &self.options
    }

    /// Strategies that will run, in order
    pub fn strategies(&self) -> Vec<Strategy> {
        let mut strategies = vec![Strategy::TextChunks];
        if cfg!(feature = "exif") && self.options.exif_fallback {
            strategies.push(Strategy::Exif);
        }
        if cfg!(feature = "heuristic") && self.options.heuristic_search {
            strategies.push(Strategy::Heuristic);
        }
        strategies
    }

    /// Extract a card and report which strategy found it
    ///
    /// Fails with [`Error::NotAPng`] for a bad signature and
    /// [`Error::NoCardFound`] once every strategy is exhausted.
    #[tracing::instrument(skip_all, fields(len = data.len()))]
    pub fn extract_detailed(&self, data: &[u8]) -> Result<Extraction> {
        let chunks = read_chunks_partial(data, self.options.max_chunk_len)?;
        tracing::trace!(chunks = chunks.len(), "chunk walk finished");
        let scan = Scan { bytes: data, chunks };

        self.strategies()
            .into_iter()
            .find_map(|strategy| {
                let value = strategy.run(&scan, &self.options)?;
                match CharacterCard::from_value(value) {
                    Ok(card) => {
                        tracing::debug!(%strategy, name = card.name(), "character card extracted");
                        Some(Extraction { card, strategy })
                    }
                    Err(e) => {
                        tracing::debug!(%strategy, error = %e, "candidate could not be materialized");
                        None
                    }
                }
            })
            .ok_or(Error::NoCardFound)
    }

    /// Extract a card from PNG bytes
    ///
    /// Never fails: every error becomes `None` and a log line.
    pub fn extract(&self, data: &[u8]) -> Option<CharacterCard> {
        self.finish(self.extract_detailed(data))
    }

    /// Extract a card from a file on disk
    pub fn extract_path<P: AsRef<Path>>(&self, path: P) -> Option<CharacterCard> {
        let bytes = read_path(path, self.options.max_source_size);
        self.finish(bytes.and_then(|bytes| self.extract_detailed(&bytes)))
    }

    /// Extract a card from a stream (read to the end first)
    pub fn extract_reader<R: Read>(&self, reader: R) -> Option<CharacterCard> {
        let bytes = read_source(reader, self.options.max_source_size);
        self.finish(bytes.and_then(|bytes| self.extract_detailed(&bytes)))
    }

    /// Extract a card from a file delivered as base64 text (optionally a
    /// `data:` URL)
    pub fn extract_base64(&self, text: &str) -> Option<CharacterCard> {
        let bytes = decode_base64_source(text, self.options.max_source_size);
        self.finish(bytes.and_then(|bytes| self.extract_detailed(&bytes)))
    }

    fn finish(&self, result: Result<Extraction>) -> Option<CharacterCard> {
        match result {
            Ok(extraction) => Some(extraction.card),
            Err(Error::NoCardFound) => {
                tracing::debug!("file does not contain a character card");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "character card extraction failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::CardVersion;
    use crate::locator::KeywordOrder;
    use crate::test_utils::{card_png, encode_card, sample_card, PngBuilder};

    #[test]
    fn test_text_chunk_strategy() {
        let card = sample_card(CardVersion::V3, "Alice");
        let png = card_png("ccv3", &card);

        let extraction = CardExtractor::default().extract_detailed(&png).unwrap();
        assert_eq!(extraction.strategy, Strategy::TextChunks);
        assert_eq!(extraction.card.to_value().unwrap(), card);
    }

    #[test]
    fn test_keyword_order_option() {
        let v2 = sample_card(CardVersion::V2, "Old");
        let v3 = sample_card(CardVersion::V3, "New");
        let png = PngBuilder::new()
            .text("chara", &encode_card(&v2))
            .text("ccv3", &encode_card(&v3))
            .build();

        let default = CardExtractor::default().extract(&png).unwrap();
        assert_eq!(default.name(), "New");

        let v2_first =
            CardExtractor::new(ExtractOptions::new().keyword_order(KeywordOrder::V2First));
        assert_eq!(v2_first.extract(&png).unwrap().name(), "Old");
    }

    #[cfg(feature = "exif")]
    #[test]
    fn test_exif_strategy() {
        let card = sample_card(CardVersion::V2, "Alice");
        let png = PngBuilder::new()
            .exif(crate::test_utils::exif_with_marker(b"Chara\0", &encode_card(&card)))
            .build();

        let extraction = CardExtractor::default().extract_detailed(&png).unwrap();
        assert_eq!(extraction.strategy, Strategy::Exif);

        let text_only = CardExtractor::new(
            ExtractOptions::new().exif_fallback(false).heuristic_search(false),
        );
        assert!(text_only.extract(&png).is_none());
    }

    #[cfg(feature = "heuristic")]
    #[test]
    fn test_heuristic_strategy() {
        let card = sample_card(CardVersion::V2, "Alice");
        let png = PngBuilder::new()
            .chunk(b"prVt", card.to_string().into_bytes())
            .build();

        let extraction = CardExtractor::default().extract_detailed(&png).unwrap();
        assert_eq!(extraction.strategy, Strategy::Heuristic);
        assert_eq!(extraction.card.name(), "Alice");
    }

    #[test]
    fn test_text_only_ignores_compressed_when_disabled() {
        let card = sample_card(CardVersion::V3, "Alice");
        let png = PngBuilder::new()
            .itxt("ccv3", &encode_card(&card))
            .build();
        let options = ExtractOptions::new()
            .exif_fallback(false)
            .heuristic_search(false);

        assert!(CardExtractor::new(options.clone()).extract(&png).is_some());
        assert!(CardExtractor::new(options.compressed_text(false))
            .extract(&png)
            .is_none());
    }

    #[test]
    fn test_errors() {
        let extractor = CardExtractor::default();
        assert!(matches!(extractor.extract_detailed(b"GIF89a"), Err(Error::NotAPng)));
        assert!(matches!(
            extractor.extract_detailed(&PngBuilder::new().build()),
            Err(Error::NoCardFound)
        ));
    }

    #[test]
    fn test_strategies_follow_options() {
        let all = CardExtractor::default().strategies();
        assert_eq!(all[0], Strategy::TextChunks);
        assert_eq!(all.contains(&Strategy::Exif), cfg!(feature = "exif"));
        assert_eq!(all.contains(&Strategy::Heuristic), cfg!(feature = "heuristic"));

        let none = CardExtractor::new(
            ExtractOptions::new().exif_fallback(false).heuristic_search(false),
        );
        assert_eq!(none.strategies(), vec![Strategy::TextChunks]);
    }

    #[test]
    fn test_extract_base64_and_reader() {
        use base64::Engine as _;

        let card = sample_card(CardVersion::V2, "Alice");
        let png = card_png("chara", &card);
        let extractor = CardExtractor::default();

        let encoded = base64::engine::general_purpose::STANDARD.encode(&png);
        assert_eq!(extractor.extract_base64(&encoded).unwrap().name(), "Alice");
        assert_eq!(
            extractor.extract_reader(std::io::Cursor::new(&png)).unwrap().name(),
            "Alice"
        );

        let tiny = CardExtractor::new(ExtractOptions::new().max_source_size(16));
        assert!(tiny.extract_reader(std::io::Cursor::new(&png)).is_none());
    }
}
