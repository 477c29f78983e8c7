//! Test utilities for building synthetic card files.
//!
//! Real card PNGs are large and carry personal artwork, so tests build their
//! inputs instead:
//! - [`PngBuilder`] writes a minimal PNG with correct CRCs and any ancillary
//!   chunks (text, compressed text, eXIf, raw)
//! - [`sample_card`] / [`encode_card`] produce valid card JSON and its
//!   base64 form
//! - `tiff_*` / [`exif_with_marker`] produce eXIf payloads in the layouts
//!   producers use
//!
//! # Usage
//!
//! ```
//! use chara_io::test_utils::*;
//! use chara_io::CardVersion;
//!
//! let card = sample_card(CardVersion::V2, "Alice");
//! let png = PngBuilder::new()
//!     .text("chara", &encode_card(&card))
//!     .build();
//! assert_eq!(chara_io::extract_character_card(&png).unwrap().name(), "Alice");
//! ```

use crate::card::CardVersion;
use crate::png_io::{calculate_crc, EXIF, ITXT, PNG_SIGNATURE, TEXT};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use byteorder::{BigEndian, ByteOrder, LittleEndian, WriteBytesExt};
use serde_json::{json, Value};

/// The minimal V2 card used in documentation and scenarios
pub const V2_ALICE: &str = r#"{"spec":"chara_card_v2","spec_version":"2.0","data":{"name":"Alice","description":"d","personality":"p","scenario":"s","first_mes":"hi","mes_example":"ex"}}"#;

// 1x1 RGBA, 8 bits per channel
const IHDR_DATA: [u8; 13] = [0, 0, 0, 1, 0, 0, 0, 1, 8, 6, 0, 0, 0];

/// Builder for minimal PNG files
///
/// Always writes the signature, an IHDR chunk, the added chunks in order and
/// IEND. No image data is written; nothing in this crate looks at it.
#[derive(Debug, Clone, Default)]
pub struct PngBuilder {
    chunks: Vec<([u8; 4], Vec<u8>)>,
}

impl PngBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a chunk with arbitrary type and payload
    pub fn chunk(mut self, chunk_type: &[u8; 4], data: Vec<u8>) -> Self {
        self.chunks.push((*chunk_type, data));
        self
    }

    /// Add a `tEXt` chunk
    pub fn text(self, keyword: &str, text: &str) -> Self {
        let mut data = keyword.as_bytes().to_vec();
        data.push(0);
        data.extend_from_slice(text.as_bytes());
        self.chunk(TEXT, data)
    }

    /// Add a `zTXt` chunk
    #[cfg(feature = "compressed-text")]
    pub fn ztxt(self, keyword: &str, text: &str) -> Self {
        let mut data = keyword.as_bytes().to_vec();
        data.extend_from_slice(&[0, 0]);
        data.extend(deflate(text.as_bytes()));
        self.chunk(crate::png_io::ZTXT, data)
    }

    /// Add an uncompressed `iTXt` chunk with empty language tag and
    /// translated keyword
    pub fn itxt(self, keyword: &str, text: &str) -> Self {
        self.chunk(ITXT, itxt_data(keyword, false, text.as_bytes()))
    }

    /// Add a compressed `iTXt` chunk
    #[cfg(feature = "compressed-text")]
    pub fn itxt_compressed(self, keyword: &str, text: &str) -> Self {
        self.chunk(ITXT, itxt_data(keyword, true, &deflate(text.as_bytes())))
    }

    /// Add an `eXIf` chunk
    pub fn exif(self, data: Vec<u8>) -> Self {
        self.chunk(EXIF, data)
    }

    /// Write the file
    pub fn build(&self) -> Vec<u8> {
        let mut out = PNG_SIGNATURE.to_vec();
        write_chunk(&mut out, b"IHDR", &IHDR_DATA);
        for (chunk_type, data) in &self.chunks {
            write_chunk(&mut out, chunk_type, data);
        }
        write_chunk(&mut out, b"IEND", &[]);
        out
    }
}

fn write_chunk(out: &mut Vec<u8>, chunk_type: &[u8; 4], data: &[u8]) {
    let mut len = [0u8; 4];
    BigEndian::write_u32(&mut len, data.len() as u32);
    out.extend_from_slice(&len);
    out.extend_from_slice(chunk_type);
    out.extend_from_slice(data);
    let mut crc = [0u8; 4];
    BigEndian::write_u32(&mut crc, calculate_crc(chunk_type, data));
    out.extend_from_slice(&crc);
}

#[cfg(feature = "compressed-text")]
fn deflate(data: &[u8]) -> Vec<u8> {
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).expect("write to Vec");
    encoder.finish().expect("write to Vec")
}

fn itxt_data(keyword: &str, compressed: bool, payload: &[u8]) -> Vec<u8> {
    let mut data = keyword.as_bytes().to_vec();
    data.extend_from_slice(&[0, compressed as u8, 0, 0, 0]);
    data.extend_from_slice(payload);
    data
}

/// A valid card of the given version
pub fn sample_card(version: CardVersion, name: &str) -> Value {
    json!({
        "spec": version.spec(),
        "spec_version": version.default_spec_version(),
        "data": {
            "name": name,
            "description": format!("{name} keeps the village library."),
            "personality": "curious, patient",
            "scenario": "A rainy afternoon among the shelves.",
            "first_mes": format!("Hello, I'm {name}. Looking for something?"),
            "mes_example": "<START>\nUser: Any good books?\nChar: Always.",
            "creator": "chara-io tests",
            "tags": ["test", "library"]
        }
    })
}

/// Base64 of the card's compact JSON, as producers write it
pub fn encode_card(card: &Value) -> String {
    STANDARD.encode(card.to_string())
}

/// A PNG carrying the card in one `tEXt` chunk
pub fn card_png(keyword: &str, card: &Value) -> Vec<u8> {
    PngBuilder::new().text(keyword, &encode_card(card)).build()
}

/// A TIFF block with one ImageDescription (ASCII) entry in IFD0
pub fn tiff_with_ascii(value: &[u8], little_endian: bool) -> Vec<u8> {
    // header (8) + count (2) + entry (12) + next IFD (4)
    let value_offset = 26;
    let mut out = Vec::new();
    if little_endian {
        write_tiff::<LittleEndian>(&mut out, b"II", 0x010E, 2, value, value_offset);
    } else {
        write_tiff::<BigEndian>(&mut out, b"MM", 0x010E, 2, value, value_offset);
    }
    out.extend_from_slice(value);
    out.push(0);
    out
}

fn write_tiff<B: ByteOrder>(
    out: &mut Vec<u8>,
    mark: &[u8; 2],
    tag: u16,
    field_type: u16,
    value: &[u8],
    value_offset: u32,
) {
    out.extend_from_slice(mark);
    out.write_u16::<B>(42).expect("write to Vec");
    out.write_u32::<B>(8).expect("write to Vec");
    out.write_u16::<B>(1).expect("write to Vec");
    out.write_u16::<B>(tag).expect("write to Vec");
    out.write_u16::<B>(field_type).expect("write to Vec");
    out.write_u32::<B>(value.len() as u32 + 1).expect("write to Vec");
    out.write_u32::<B>(value_offset).expect("write to Vec");
    out.write_u32::<B>(0).expect("write to Vec");
}

/// A big-endian TIFF block whose IFD0 points to an Exif sub-IFD holding a
/// UserComment with an `ASCII\0\0\0` character code
pub fn tiff_with_user_comment(value: &[u8]) -> Vec<u8> {
    let mut comment = b"ASCII\0\0\0".to_vec();
    comment.extend_from_slice(value);

    let mut out = b"MM\0\x2a\0\0\0\x08".to_vec();
    // IFD0 at 8: Exif IFD pointer (LONG) to 26
    out.extend_from_slice(&[0, 1, 0x87, 0x69, 0, 4, 0, 0, 0, 1, 0, 0, 0, 26, 0, 0, 0, 0]);
    // Exif IFD at 26: UserComment (UNDEFINED), value at 44
    out.extend_from_slice(&[0, 1, 0x92, 0x86, 0, 7]);
    out.write_u32::<BigEndian>(comment.len() as u32).expect("write to Vec");
    out.extend_from_slice(&[0, 0, 0, 44, 0, 0, 0, 0]);
    out.extend_from_slice(&comment);
    out
}

/// An eXIf payload that is a TIFF header followed by a raw marker and payload,
/// the layout most card tools actually write
pub fn exif_with_marker(marker: &[u8], payload: &str) -> Vec<u8> {
    let mut out = b"MM\0\x2a\0\0\0\x08".to_vec();
    out.extend_from_slice(marker);
    out.extend_from_slice(payload.as_bytes());
    out.extend_from_slice(b"\0\0");
    out
}
