//! Extraction options

use crate::locator::KeywordOrder;
use crate::png_io::DEFAULT_MAX_CHUNK_LEN;
use crate::source::MAX_SOURCE_SIZE;

/// Options controlling which strategies run and how much input is accepted
///
/// This struct uses a builder pattern. The default searches `ccv3` before
/// `chara` and enables every strategy compiled into the crate.
///
/// # Example
///
/// ```
/// use chara_io::{CardExtractor, ExtractOptions, KeywordOrder};
///
/// // Text chunks only, V2 keyword first
/// let options = ExtractOptions::new()
///     .keyword_order(KeywordOrder::V2First)
///     .exif_fallback(false)
///     .heuristic_search(false);
/// let extractor = CardExtractor::new(options);
/// assert!(extractor.extract(b"not a png").is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractOptions {
    pub(crate) keyword_order: KeywordOrder,
    pub(crate) max_chunk_len: u32,
    pub(crate) max_source_size: u64,
    pub(crate) compressed_text: bool,
    pub(crate) exif_fallback: bool,
    pub(crate) heuristic_search: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            keyword_order: KeywordOrder::default(),
            max_chunk_len: DEFAULT_MAX_CHUNK_LEN,
            max_source_size: MAX_SOURCE_SIZE,
            compressed_text: cfg!(feature = "compressed-text"),
            exif_fallback: cfg!(feature = "exif"),
            heuristic_search: cfg!(feature = "heuristic"),
        }
    }
}

impl ExtractOptions {
    /// Create options with the defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the keyword search order
    pub fn keyword_order(mut self, order: KeywordOrder) -> Self {
        self.keyword_order = order;
        self
    }

    /// Set the largest chunk length accepted before the walk stops
    pub fn max_chunk_len(mut self, max: u32) -> Self {
        self.max_chunk_len = max;
        self
    }

    /// Set the largest input accepted by the path, reader and base64 entry
    /// points (default: 256 MiB)
    pub fn max_source_size(mut self, max: u64) -> Self {
        self.max_source_size = max;
        self
    }

    /// Also decode `zTXt` and compressed `iTXt` chunks
    ///
    /// Has no effect without the `compressed-text` feature; uncompressed
    /// `iTXt` is decoded either way when this is on.
    pub fn compressed_text(mut self, enabled: bool) -> Self {
        self.compressed_text = enabled;
        self
    }

    /// Run the EXIF fallback when text chunks yield nothing
    ///
    /// Has no effect without the `exif` feature.
    pub fn exif_fallback(mut self, enabled: bool) -> Self {
        self.exif_fallback = enabled;
        self
    }

    /// Run the pattern search when every structured strategy fails
    ///
    /// Has no effect without the `heuristic` feature.
    pub fn heuristic_search(mut self, enabled: bool) -> Self {
        self.heuristic_search = enabled;
        self
    }

    /// Keyword search order
    pub fn get_keyword_order(&self) -> KeywordOrder {
        self.keyword_order
    }

    /// Largest chunk length accepted
    pub fn get_max_chunk_len(&self) -> u32 {
        self.max_chunk_len
    }

    /// Largest input accepted
    pub fn get_max_source_size(&self) -> u64 {
        self.max_source_size
    }
}
