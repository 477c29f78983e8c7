//! PNG text chunk decoding
//!
//! Layouts:
//! - tEXt: keyword\0 + text (Latin-1)
//! - zTXt: keyword\0 + compression_method(1) + zlib stream
//! - iTXt: keyword\0 + compression_flag(1) + compression_method(1)
//!   + language_tag\0 + translated_keyword\0 + text (UTF-8)
//!
//! Card producers write base64 into tEXt and are not strict about the
//! Latin-1 rule, so text is decoded as lossy UTF-8 everywhere.

use crate::png_io::{RawChunk, ITXT, TEXT, ZTXT};

/// Upper bound for a decompressed text payload
#[cfg(feature = "compressed-text")]
const MAX_INFLATED_LEN: u64 = 16 * 1024 * 1024;

/// Which chunk type a text pair came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextChunkKind {
    /// Uncompressed Latin-1 text
    Text,
    /// zlib-compressed text
    Compressed,
    /// International (UTF-8) text, optionally compressed
    International,
}

impl TextChunkKind {
    /// Get the chunk type name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "tEXt",
            Self::Compressed => "zTXt",
            Self::International => "iTXt",
        }
    }
}

impl std::fmt::Display for TextChunkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A decoded keyword/text pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextPair {
    /// Keyword, never empty
    pub keyword: String,
    /// Text payload, may be empty
    pub text: String,
    /// Source chunk type
    pub kind: TextChunkKind,
}

impl TextPair {
    /// Case-insensitive keyword comparison
    pub fn has_keyword(&self, keyword: &str) -> bool {
        self.keyword.eq_ignore_ascii_case(keyword)
    }
}

/// Decode every `tEXt` chunk in stream order
///
/// Other chunk types are ignored. An empty result is the normal outcome for
/// a PNG without text metadata.
pub fn decode_text_chunks(chunks: &[RawChunk<'_>]) -> Vec<TextPair> {
    chunks
        .iter()
        .filter(|c| c.is_type(TEXT))
        .filter_map(|c| decode_text(c.data))
        .collect()
}

/// Decode `tEXt`, `zTXt` and `iTXt` chunks in stream order
///
/// Without the `compressed-text` feature, compressed payloads are skipped.
pub fn decode_all_text_chunks(chunks: &[RawChunk<'_>]) -> Vec<TextPair> {
    chunks
        .iter()
        .filter_map(|c| match &c.chunk_type {
            t if t == TEXT => decode_text(c.data),
            t if t == ZTXT => decode_ztxt(c.data),
            t if t == ITXT => decode_itxt(c.data),
            _ => None,
        })
        .collect()
}

/// Split at the first null byte; the keyword must be non-empty
fn split_keyword(data: &[u8]) -> Option<(String, &[u8])> {
    let null_pos = memchr::memchr(0, data)?;
    if null_pos == 0 {
        return None;
    }
    // Latin-1 maps each byte to the code point of the same value
    let keyword = data[..null_pos].iter().map(|&b| b as char).collect();
    Some((keyword, &data[null_pos + 1..]))
}

fn decode_text(data: &[u8]) -> Option<TextPair> {
    let Some((keyword, text)) = split_keyword(data) else {
        tracing::trace!("tEXt chunk without keyword separator");
        return None;
    };
    Some(TextPair {
        keyword,
        text: String::from_utf8_lossy(text).into_owned(),
        kind: TextChunkKind::Text,
    })
}

fn decode_ztxt(data: &[u8]) -> Option<TextPair> {
    let (keyword, rest) = split_keyword(data)?;
    // compression_method(1), only 0 (zlib) is defined
    let (&method, compressed) = rest.split_first()?;
    if method != 0 {
        tracing::debug!(keyword = %keyword, method, "zTXt with unknown compression method");
        return None;
    }
    let text = inflate(compressed)?;
    Some(TextPair {
        keyword,
        text: String::from_utf8_lossy(&text).into_owned(),
        kind: TextChunkKind::Compressed,
    })
}

fn decode_itxt(data: &[u8]) -> Option<TextPair> {
    let (keyword, rest) = split_keyword(data)?;
    if rest.len() < 2 {
        return None;
    }
    let compression_flag = rest[0];
    let rest = &rest[2..];

    // Skip language tag
    let lang_null = memchr::memchr(0, rest)?;
    let rest = &rest[lang_null + 1..];

    // Skip translated keyword
    let trans_null = memchr::memchr(0, rest)?;
    let text = &rest[trans_null + 1..];

    let text = if compression_flag == 1 {
        String::from_utf8_lossy(&inflate(text)?).into_owned()
    } else {
        String::from_utf8_lossy(text).into_owned()
    };

    Some(TextPair {
        keyword,
        text,
        kind: TextChunkKind::International,
    })
}

#[cfg(feature = "compressed-text")]
fn inflate(compressed: &[u8]) -> Option<Vec<u8>> {
    use flate2::read::ZlibDecoder;
    use std::io::Read;

    let mut out = Vec::new();
    match ZlibDecoder::new(compressed)
        .take(MAX_INFLATED_LEN)
        .read_to_end(&mut out)
    {
        Ok(_) => Some(out),
        Err(e) => {
            tracing::debug!(error = %e, "failed to inflate text chunk");
            None
        }
    }
}

#[cfg(not(feature = "compressed-text"))]
fn inflate(_compressed: &[u8]) -> Option<Vec<u8>> {
    tracing::trace!("compressed text chunk skipped (compressed-text feature disabled)");
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::png_io::read_chunks;
    use crate::test_utils::PngBuilder;

    #[test]
    fn test_decode_text_pairs() {
        let png = PngBuilder::new()
            .text("Title", "hello")
            .text("chara", "")
            .build();
        let chunks = read_chunks(&png).unwrap();
        let pairs = decode_text_chunks(&chunks);

        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].keyword, "Title");
        assert_eq!(pairs[0].text, "hello");
        assert_eq!(pairs[1].keyword, "chara");
        assert_eq!(pairs[1].text, "");
        assert!(pairs.iter().all(|p| p.kind == TextChunkKind::Text));
    }

    #[test]
    fn test_no_text_chunks_is_empty() {
        let png = PngBuilder::new().build();
        let chunks = read_chunks(&png).unwrap();
        assert!(decode_text_chunks(&chunks).is_empty());
        assert!(decode_all_text_chunks(&chunks).is_empty());
    }

    #[test]
    fn test_malformed_text_chunks_are_dropped() {
        let png = PngBuilder::new()
            .chunk(b"tEXt", b"no separator".to_vec())
            .chunk(b"tEXt", b"\0empty keyword".to_vec())
            .text("ok", "1")
            .build();
        let chunks = read_chunks(&png).unwrap();
        let pairs = decode_text_chunks(&chunks);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].keyword, "ok");
    }

    #[test]
    fn test_text_splits_at_first_null_only() {
        let png = PngBuilder::new()
            .chunk(b"tEXt", b"key\0a\0b".to_vec())
            .build();
        let chunks = read_chunks(&png).unwrap();
        let pairs = decode_text_chunks(&chunks);
        assert_eq!(pairs[0].text, "a\0b");
    }

    #[test]
    fn test_keyword_is_latin1_and_text_is_lossy() {
        let png = PngBuilder::new()
            .chunk(b"tEXt", b"caf\xe9\0ok \xff".to_vec())
            .build();
        let chunks = read_chunks(&png).unwrap();
        let pairs = decode_text_chunks(&chunks);
        assert_eq!(pairs[0].keyword, "caf\u{e9}");
        assert_eq!(pairs[0].text, "ok \u{fffd}");
    }

    #[test]
    fn test_uncompressed_itxt() {
        let png = PngBuilder::new().itxt("ccv3", "payload").build();
        let chunks = read_chunks(&png).unwrap();

        assert!(decode_text_chunks(&chunks).is_empty());
        let pairs = decode_all_text_chunks(&chunks);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].keyword, "ccv3");
        assert_eq!(pairs[0].text, "payload");
        assert_eq!(pairs[0].kind, TextChunkKind::International);
    }

    #[cfg(feature = "compressed-text")]
    #[test]
    fn test_compressed_chunks() {
        let png = PngBuilder::new()
            .ztxt("chara", "zipped")
            .itxt_compressed("ccv3", "zipped too")
            .build();
        let chunks = read_chunks(&png).unwrap();
        let pairs = decode_all_text_chunks(&chunks);

        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].text, "zipped");
        assert_eq!(pairs[0].kind, TextChunkKind::Compressed);
        assert_eq!(pairs[1].text, "zipped too");
    }

    #[test]
    fn test_corrupt_ztxt_is_dropped() {
        let png = PngBuilder::new()
            .chunk(b"zTXt", b"chara\0\0not zlib".to_vec())
            .build();
        let chunks = read_chunks(&png).unwrap();
        assert!(decode_all_text_chunks(&chunks).is_empty());
    }

    #[test]
    fn test_has_keyword_ignores_case() {
        let pair = TextPair {
            keyword: "CCV3".into(),
            text: String::new(),
            kind: TextChunkKind::Text,
        };
        assert!(pair.has_keyword("ccv3"));
        assert!(!pair.has_keyword("chara"));
    }
}
