//! Character card recovery from eXIf chunks
//!
//! TIFF Structure:
//! - Header: byte order (II/MM), magic (0x002A), IFD offset
//! - IFD (Image File Directory): tag count, tags (12 bytes each), next IFD offset
//! - Tags: tag ID (2), type (2), count (4), value/offset (4)
//!
//! Tools that stash cards in EXIF rarely produce a well-formed TIFF, so two
//! independent strategies run over the chunk:
//! 1. An IFD walk that collects long ASCII (and UserComment) values and tries
//!    each as base64 JSON.
//! 2. A raw scan for the `Ccv 3\0` / `Chara\0` markers followed by a run of
//!    base64 characters. This is the one that usually succeeds.

use crate::card::CardVersion;
use crate::payload::{
    decode_base64, decode_payload, is_base64_byte, is_base64_text, parse_json_prefix,
};
use crate::validate::{looks_like_card, validate};
use byteorder::{BigEndian, ByteOrder as _, LittleEndian};
use serde_json::Value;

/// TIFF/EXIF tag IDs
mod tags {
    pub const EXIF_IFD_POINTER: u16 = 0x8769;
    pub const USER_COMMENT: u16 = 0x9286;
}

/// TIFF data types
mod types {
    pub const ASCII: u16 = 2;
    pub const LONG: u16 = 4;
    pub const UNDEFINED: u16 = 7;
}

/// Maximum number of tags in an IFD (prevents DOS attacks)
pub const MAX_IFD_TAGS: u16 = 1000;

/// Maximum number of IFDs visited per chunk (IFD0 plus the Exif sub-IFD)
const MAX_IFDS: usize = 2;

/// How far into the chunk to look for the byte order mark
const BYTE_ORDER_SCAN_LEN: usize = 20;

/// Header offset assumed when no byte order mark is found
const DEFAULT_TIFF_OFFSET: usize = 0;

/// ASCII values this short cannot hold a card
const MIN_ASCII_COUNT: u32 = 20;

/// Minimum base64 payload length worth decoding
pub const MIN_PAYLOAD_LEN: usize = 50;

/// UserComment values start with an 8-byte character code
const USER_COMMENT_PREFIX_LEN: usize = 8;

/// Markers searched in raw chunk bytes, V3 first
const MARKERS: [(&[u8], CardVersion); 4] = [
    (b"Ccv 3\0", CardVersion::V3),
    (b"ccv3\0", CardVersion::V3),
    (b"Chara\0", CardVersion::V2),
    (b"chara\0", CardVersion::V2),
];

/// Byte order for reading multi-byte values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endian {
    Little,
    Big,
}

impl Endian {
    fn read_u16(&self, data: &[u8]) -> u16 {
        match self {
            Endian::Little => LittleEndian::read_u16(data),
            Endian::Big => BigEndian::read_u16(data),
        }
    }

    fn read_u32(&self, data: &[u8]) -> u32 {
        match self {
            Endian::Little => LittleEndian::read_u32(data),
            Endian::Big => BigEndian::read_u32(data),
        }
    }
}

/// One 12-byte IFD entry
#[derive(Debug, Clone, Copy)]
struct IfdEntry {
    tag: u16,
    field_type: u16,
    count: u32,
    value_or_offset: u32,
    /// The value field as stored, for values of four bytes or fewer
    inline: [u8; 4],
}

/// A TIFF block located somewhere inside the chunk
#[derive(Debug, Clone, Copy)]
struct Tiff<'a> {
    data: &'a [u8],
    /// Offset of the TIFF header; IFD offsets are relative to it
    base: usize,
    endian: Endian,
}

impl<'a> Tiff<'a> {
    /// Locate the header by scanning the first bytes for `II` or `MM`
    ///
    /// PNG eXIf chunks should start with the header directly, but some
    /// producers keep JPEG's `Exif\0\0` prefix or other junk in front.
    fn detect(data: &'a [u8]) -> Self {
        let window = &data[..data.len().min(BYTE_ORDER_SCAN_LEN)];
        let little = memchr::memmem::find(window, b"II");
        let big = memchr::memmem::find(window, b"MM");

        let (base, endian) = match (little, big) {
            (Some(l), Some(b)) if b < l => (b, Endian::Big),
            (Some(l), _) => (l, Endian::Little),
            (None, Some(b)) => (b, Endian::Big),
            (None, None) => (DEFAULT_TIFF_OFFSET, Endian::Big),
        };
        Self { data, base, endian }
    }

    fn slice(&self, offset: u32, len: usize) -> Option<&'a [u8]> {
        let start = self.base.checked_add(offset as usize)?;
        let end = start.checked_add(len)?;
        self.data.get(start..end)
    }

    /// Like `slice`, but clamps to the end of the chunk
    fn slice_clamped(&self, offset: u32, len: usize) -> Option<&'a [u8]> {
        let start = self.base.checked_add(offset as usize)?;
        let rest = self.data.get(start..)?;
        Some(&rest[..rest.len().min(len)])
    }

    fn first_ifd_offset(&self) -> Option<u32> {
        self.slice(4, 4).map(|b| self.endian.read_u32(b))
    }

    /// Read the entries of one IFD, stopping at the end of the chunk
    fn read_ifd(&self, offset: u32) -> Vec<IfdEntry> {
        let Some(count) = self.slice(offset, 2).map(|b| self.endian.read_u16(b)) else {
            return Vec::new();
        };
        if count > MAX_IFD_TAGS {
            tracing::trace!(count, "implausible IFD tag count");
            return Vec::new();
        }

        let mut entries = Vec::with_capacity(count as usize);
        for i in 0..count as u32 {
            let Some(bytes) = offset
                .checked_add(2 + i * 12)
                .and_then(|entry_offset| self.slice(entry_offset, 12))
            else {
                break;
            };
            let mut inline = [0u8; 4];
            inline.copy_from_slice(&bytes[8..12]);
            entries.push(IfdEntry {
                tag: self.endian.read_u16(&bytes[0..2]),
                field_type: self.endian.read_u16(&bytes[2..4]),
                count: self.endian.read_u32(&bytes[4..8]),
                value_or_offset: self.endian.read_u32(&bytes[8..12]),
                inline,
            });
        }
        entries
    }

    /// Resolve an entry's value bytes (inline if four bytes or fewer)
    fn value<'e>(&self, entry: &'e IfdEntry) -> Option<&'e [u8]>
    where
        'a: 'e,
    {
        if entry.count <= 4 {
            Some(&entry.inline[..entry.count as usize])
        } else {
            self.slice_clamped(entry.value_or_offset, entry.count as usize)
        }
    }
}

/// Collect string values from IFD0 and the Exif sub-IFD that may hold a card
fn ifd_strings(tiff: &Tiff<'_>) -> Vec<String> {
    let mut strings = Vec::new();
    let Some(ifd0) = tiff.first_ifd_offset() else {
        return strings;
    };

    let mut pending = vec![ifd0];
    let mut visited = Vec::new();
    while let Some(offset) = pending.pop() {
        if visited.contains(&offset) || visited.len() >= MAX_IFDS {
            continue;
        }
        visited.push(offset);

        for entry in tiff.read_ifd(offset) {
            match (entry.tag, entry.field_type) {
                (tags::EXIF_IFD_POINTER, types::LONG) => pending.push(entry.value_or_offset),
                (_, types::ASCII) if entry.count > MIN_ASCII_COUNT => {
                    if let Some(bytes) = tiff.value(&entry) {
                        strings.push(clean_string(bytes));
                    }
                }
                (tags::USER_COMMENT, types::UNDEFINED)
                    if entry.count as usize > USER_COMMENT_PREFIX_LEN + MIN_ASCII_COUNT as usize =>
                {
                    if let Some(bytes) = tiff.value(&entry) {
                        strings.push(clean_string(&bytes[USER_COMMENT_PREFIX_LEN.min(bytes.len())..]));
                    }
                }
                _ => {}
            }
        }
    }
    strings
}

fn clean_string(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_matches('\0')
        .trim()
        .to_string()
}

/// Accept a candidate only if it both looks like a card and validates
fn accept(value: Value, source: &str) -> Option<Value> {
    if !looks_like_card(&value) {
        tracing::trace!(source, "EXIF payload is JSON but not a card");
        return None;
    }
    match validate(&value) {
        Ok(version) => {
            tracing::debug!(source, %version, "card found in eXIf chunk");
            Some(value)
        }
        Err(e) => {
            tracing::debug!(source, error = %e, "EXIF card rejected");
            None
        }
    }
}

/// Try every IFD string value as a card payload
pub fn parse_ifd_values(data: &[u8]) -> Option<Value> {
    let tiff = Tiff::detect(data);
    ifd_strings(&tiff).into_iter().find_map(|s| {
        let looks_encoded = s.len() > MIN_PAYLOAD_LEN && is_base64_text(&s);
        if !looks_encoded && !s.starts_with('{') {
            return None;
        }
        match decode_payload(&s) {
            Ok(value) => accept(value, "ifd"),
            Err(e) => {
                tracing::trace!(error = %e, "IFD value is not a card payload");
                None
            }
        }
    })
}

/// Scan raw bytes for card markers followed by base64
pub fn scan_markers(data: &[u8]) -> Option<Value> {
    MARKERS.iter().find_map(|&(marker, version)| {
        memchr::memmem::find_iter(data, marker).find_map(|pos| {
            let run = base64_run(&data[pos + marker.len()..]);
            if run.len() < MIN_PAYLOAD_LEN {
                return None;
            }
            tracing::trace!(%version, pos, len = run.len(), "decoding marker payload");
            decode_run(&run).and_then(|value| accept(value, "marker"))
        })
    })
}

/// Collect base64 characters following a marker
///
/// Stray bytes are skipped until at least `MIN_PAYLOAD_LEN` characters have
/// been gathered; after that the first non-base64 byte ends the run, as
/// does anything following `=` padding.
fn base64_run(data: &[u8]) -> Vec<u8> {
    let mut run = Vec::new();
    let mut padded = false;

    for &b in data {
        if b == b'=' {
            if !run.is_empty() {
                padded = true;
                run.push(b);
            }
            continue;
        }
        if is_base64_byte(b) && !padded {
            run.push(b);
            continue;
        }
        if padded || run.len() >= MIN_PAYLOAD_LEN {
            break;
        }
    }
    run
}

fn decode_run(run: &[u8]) -> Option<Value> {
    // The run is pure ASCII by construction
    let text = std::str::from_utf8(run).ok()?;
    let bytes = decode_base64(text)
        .or_else(|_| {
            let body = text.trim_end_matches('=');
            decode_base64(&body[..body.len() - body.len() % 4])
        })
        .ok()?;
    match parse_json_prefix(&bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::trace!(error = %e, "marker payload is not JSON");
            None
        }
    }
}

/// Recover a card from an eXIf chunk payload
///
/// Tries the IFD walk, then the marker scan. Returns JSON that has passed
/// validation, or `None`.
pub fn parse_exif(data: &[u8]) -> Option<Value> {
    parse_ifd_values(data).or_else(|| scan_markers(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{
        encode_card, exif_with_marker, sample_card, tiff_with_ascii, tiff_with_user_comment,
    };

    #[test]
    fn test_byte_order() {
        let be = Endian::Big;
        let le = Endian::Little;

        assert_eq!(be.read_u16(&[0x12, 0x34]), 0x1234);
        assert_eq!(le.read_u16(&[0x34, 0x12]), 0x1234);

        assert_eq!(be.read_u32(&[0x12, 0x34, 0x56, 0x78]), 0x12345678);
        assert_eq!(le.read_u32(&[0x78, 0x56, 0x34, 0x12]), 0x12345678);
    }

    #[test]
    fn test_detect_header() {
        let tiff = Tiff::detect(b"II*\0\x08\0\0\0");
        assert_eq!((tiff.base, tiff.endian), (0, Endian::Little));
        assert_eq!(tiff.first_ifd_offset(), Some(8));

        let tiff = Tiff::detect(b"Exif\0\0MM\0*\0\0\0\x08");
        assert_eq!((tiff.base, tiff.endian), (6, Endian::Big));
        assert_eq!(tiff.first_ifd_offset(), Some(8));

        let tiff = Tiff::detect(b"no marker here");
        assert_eq!((tiff.base, tiff.endian), (DEFAULT_TIFF_OFFSET, Endian::Big));
    }

    #[test]
    fn test_ifd_ascii_value() {
        for little_endian in [true, false] {
            let card = sample_card(CardVersion::V2, "Alice");
            let tiff = tiff_with_ascii(encode_card(&card).as_bytes(), little_endian);
            assert_eq!(parse_ifd_values(&tiff), Some(card.clone()));
            assert_eq!(parse_exif(&tiff), Some(card));
        }
    }

    #[test]
    fn test_ifd_value_behind_exif_prefix() {
        let card = sample_card(CardVersion::V3, "Alice");
        let mut data = b"Exif\0\0".to_vec();
        data.extend(tiff_with_ascii(encode_card(&card).as_bytes(), true));
        assert_eq!(parse_exif(&data), Some(card));
    }

    #[test]
    fn test_ifd_user_comment() {
        let card = sample_card(CardVersion::V2, "Alice");
        let tiff = tiff_with_user_comment(encode_card(&card).as_bytes());
        assert_eq!(parse_ifd_values(&tiff), Some(card));
    }

    #[test]
    fn test_ifd_short_and_non_card_values_ignored() {
        let tiff = tiff_with_ascii(b"Canon EOS R5 with a long enough model string", false);
        assert_eq!(parse_ifd_values(&tiff), None);

        let not_card = encode_card(&serde_json::json!({ "spec": "something_else", "data": {} }));
        let tiff = tiff_with_ascii(not_card.as_bytes(), false);
        assert_eq!(parse_exif(&tiff), None);
    }

    #[test]
    fn test_marker_scan() {
        let card = sample_card(CardVersion::V2, "Alice");
        let data = exif_with_marker(b"Chara\0", &encode_card(&card));
        assert_eq!(scan_markers(&data), Some(card.clone()));
        assert_eq!(parse_exif(&data), Some(card));
    }

    #[test]
    fn test_marker_scan_prefers_v3() {
        let v2 = sample_card(CardVersion::V2, "Old");
        let v3 = sample_card(CardVersion::V3, "New");
        let mut data = exif_with_marker(b"Chara\0", &encode_card(&v2));
        data.extend(exif_with_marker(b"Ccv 3\0", &encode_card(&v3)));
        assert_eq!(scan_markers(&data), Some(v3));
    }

    #[test]
    fn test_marker_with_stray_bytes_and_trailing_data() {
        let card = sample_card(CardVersion::V2, "Alice");
        let mut data = b"junk Chara\0\0\0\x01".to_vec();
        data.extend_from_slice(encode_card(&card).as_bytes());
        data.extend_from_slice(b"\0\0\xffABCD more bytes");
        assert_eq!(scan_markers(&data), Some(card));
    }

    #[test]
    fn test_marker_payload_with_glued_characters() {
        // Unpadded payload followed directly by more alphabet characters
        let card = sample_card(CardVersion::V2, "Alice");
        let encoded = encode_card(&card);
        let mut data = b"Chara\0".to_vec();
        data.extend_from_slice(encoded.trim_end_matches('=').as_bytes());
        data.extend_from_slice(b"QUJD\0");
        assert_eq!(scan_markers(&data), Some(card));
    }

    #[test]
    fn test_marker_too_short_or_invalid() {
        assert_eq!(scan_markers(b"Chara\0QUJD"), None);
        let bogus = "A".repeat(120);
        assert_eq!(scan_markers(&exif_with_marker(b"Chara\0", &bogus)), None);
        assert_eq!(parse_exif(&[]), None);
        assert_eq!(parse_exif(b"MM"), None);
    }

    #[test]
    fn test_base64_run() {
        let mut data = b"\0\0".to_vec();
        data.extend(std::iter::repeat(b'Q').take(60));
        data.extend_from_slice(b"==");
        data.extend_from_slice(b"QUJD");
        let run = base64_run(&data);
        assert_eq!(run.len(), 62);
        assert!(run.ends_with(b"=="));

        let run = base64_run(b"QUJD\0REVG\0");
        assert_eq!(run, b"QUJDREVG");
    }

    #[test]
    fn test_ifd_tag_count_limit() {
        // IFD claiming 0xFFFF entries
        let data = b"MM\0*\0\0\0\x08\xff\xff";
        let tiff = Tiff::detect(data);
        assert!(tiff.read_ifd(8).is_empty());
    }

    #[test]
    fn test_ifd_offsets_out_of_bounds() {
        let data = b"II*\0\xff\xff\xff\xff";
        let tiff = Tiff::detect(data);
        assert_eq!(tiff.first_ifd_offset(), Some(u32::MAX));
        assert!(tiff.read_ifd(u32::MAX).is_empty());
        assert!(ifd_strings(&tiff).is_empty());
    }
}
