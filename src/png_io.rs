//! PNG chunk stream reader
//!
//! Walks the chunk stream that follows the 8-byte signature:
//! length (4, big endian) + type (4) + data (length) + CRC (4).
//!
//! CRCs are read but never enforced. Tools that rewrite ancillary chunks
//! frequently leave stale CRCs behind while the payload still decodes fine.

use crate::error::{Error, Result};
use byteorder::{BigEndian, ByteOrder};
use std::iter::FusedIterator;

/// PNG signature
pub const PNG_SIGNATURE: &[u8; 8] = b"\x89PNG\r\n\x1a\n";

/// Default upper bound for a single chunk's declared length
///
/// Character cards are rarely above a few hundred KB. Anything larger is
/// treated as pathological input rather than a format violation.
pub const DEFAULT_MAX_CHUNK_LEN: u32 = 1_000_000;

// Metadata chunk types
pub(crate) const TEXT: &[u8; 4] = b"tEXt";
pub(crate) const ZTXT: &[u8; 4] = b"zTXt";
pub(crate) const ITXT: &[u8; 4] = b"iTXt";
pub(crate) const EXIF: &[u8; 4] = b"eXIf";

// Length (4) + type (4)
const CHUNK_HEADER_LEN: usize = 8;
const CRC_LEN: usize = 4;

/// Get human-readable label for a PNG chunk type
fn chunk_label(chunk_type: &[u8; 4]) -> &'static str {
    match chunk_type {
        b"IHDR" => "IHDR",
        b"PLTE" => "PLTE",
        b"IDAT" => "IDAT",
        b"IEND" => "IEND",
        b"iTXt" => "iTXt",
        b"tEXt" => "tEXt",
        b"zTXt" => "zTXt",
        b"eXIf" => "eXIf",
        b"pHYs" => "pHYs",
        b"tIME" => "tIME",
        _ => "OTHER",
    }
}

/// A single chunk as found in the stream
///
/// The payload borrows from the input buffer; chunks never outlive the
/// extraction call that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawChunk<'a> {
    /// Four-byte ASCII chunk type
    pub chunk_type: [u8; 4],
    /// Offset of the chunk's length field from the start of the file
    pub offset: u64,
    /// Chunk payload (`length` bytes)
    pub data: &'a [u8],
    /// CRC as stored in the file
    pub crc: u32,
}

impl<'a> RawChunk<'a> {
    /// Declared payload length
    pub fn length(&self) -> u32 {
        self.data.len() as u32
    }

    /// Check the chunk type
    pub fn is_type(&self, chunk_type: &[u8; 4]) -> bool {
        &self.chunk_type == chunk_type
    }

    /// Label for logging; unknown types map to "OTHER"
    pub fn label(&self) -> &'static str {
        chunk_label(&self.chunk_type)
    }

    /// CRC-32 over type + data, as the PNG format defines it
    pub fn computed_crc(&self) -> u32 {
        calculate_crc(&self.chunk_type, self.data)
    }

    /// Whether the stored CRC matches the computed one (diagnostics only)
    pub fn crc_matches(&self) -> bool {
        self.crc == self.computed_crc()
    }
}

/// Check for the PNG signature
pub fn is_png(data: &[u8]) -> bool {
    data.len() >= PNG_SIGNATURE.len() && &data[..PNG_SIGNATURE.len()] == PNG_SIGNATURE
}

/// Iterator over the chunks of an in-memory PNG
///
/// Yields chunks strictly in file order. After the first structural error
/// the iterator is exhausted.
#[derive(Debug, Clone)]
pub struct ChunkReader<'a> {
    data: &'a [u8],
    pos: usize,
    max_chunk_len: u32,
    done: bool,
}

impl<'a> ChunkReader<'a> {
    /// Create a reader with the default chunk length bound
    pub fn new(data: &'a [u8]) -> Result<Self> {
        Self::with_limit(data, DEFAULT_MAX_CHUNK_LEN)
    }

    /// Create a reader with a custom chunk length bound
    pub fn with_limit(data: &'a [u8], max_chunk_len: u32) -> Result<Self> {
        if !is_png(data) {
            return Err(Error::NotAPng);
        }
        Ok(Self {
            data,
            pos: PNG_SIGNATURE.len(),
            max_chunk_len,
            done: false,
        })
    }

    /// Current offset into the buffer
    pub fn offset(&self) -> u64 {
        self.pos as u64
    }

    fn fail(&mut self, err: Error) -> Option<Result<RawChunk<'a>>> {
        self.done = true;
        Some(Err(err))
    }
}

impl<'a> Iterator for ChunkReader<'a> {
    type Item = Result<RawChunk<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.pos >= self.data.len() {
            self.done = true;
            return None;
        }

        let offset = self.pos as u64;
        let remaining = &self.data[self.pos..];
        if remaining.len() < CHUNK_HEADER_LEN {
            return self.fail(Error::Truncated { offset });
        }

        let length = BigEndian::read_u32(&remaining[0..4]);
        let mut chunk_type = [0u8; 4];
        chunk_type.copy_from_slice(&remaining[4..8]);

        if length > self.max_chunk_len {
            return self.fail(Error::ChunkTooLarge {
                offset,
                length,
                max: self.max_chunk_len,
            });
        }

        let data_end = CHUNK_HEADER_LEN + length as usize;
        let chunk_end = data_end + CRC_LEN;
        if chunk_end > remaining.len() {
            return self.fail(Error::Truncated { offset });
        }

        let chunk = RawChunk {
            chunk_type,
            offset,
            data: &remaining[CHUNK_HEADER_LEN..data_end],
            crc: BigEndian::read_u32(&remaining[data_end..chunk_end]),
        };
        self.pos += chunk_end;
        Some(Ok(chunk))
    }
}

impl FusedIterator for ChunkReader<'_> {}

/// Read every chunk, failing on the first structural error
pub fn read_chunks(data: &[u8]) -> Result<Vec<RawChunk<'_>>> {
    read_chunks_with_limit(data, DEFAULT_MAX_CHUNK_LEN)
}

/// Read every chunk with a custom chunk length bound
pub fn read_chunks_with_limit(data: &[u8], max_chunk_len: u32) -> Result<Vec<RawChunk<'_>>> {
    ChunkReader::with_limit(data, max_chunk_len)?.collect()
}

/// Read chunks up to the first structural error
///
/// A bad signature is still an error. Truncation and oversized chunks end
/// the walk, and whatever was read before them is returned.
pub(crate) fn read_chunks_partial(data: &[u8], max_chunk_len: u32) -> Result<Vec<RawChunk<'_>>> {
    let mut chunks = Vec::new();
    for item in ChunkReader::with_limit(data, max_chunk_len)? {
        match item {
            Ok(chunk) => {
                // CRC is reported, never enforced
                if tracing::enabled!(tracing::Level::TRACE) && !chunk.crc_matches() {
                    tracing::trace!(
                        chunk = chunk.label(),
                        offset = chunk.offset,
                        "stored CRC does not match chunk contents"
                    );
                }
                chunks.push(chunk);
            }
            Err(e) => {
                tracing::debug!(error = %e, read = chunks.len(), "chunk walk stopped early");
                break;
            }
        }
    }
    Ok(chunks)
}

/// Calculate CRC32 for PNG chunk
pub(crate) fn calculate_crc(chunk_type: &[u8], data: &[u8]) -> u32 {
    let mut crc = 0xFFFFFFFF_u32;

    for &byte in chunk_type.iter().chain(data) {
        crc ^= byte as u32;
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xEDB88320;
            } else {
                crc >>= 1;
            }
        }
    }

    crc ^ 0xFFFFFFFF
}
