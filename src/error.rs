//! Error types for chara-io

use std::io;

/// Result type for chara-io operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while locating and decoding an embedded card
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Input does not start with the 8-byte PNG signature
    #[error("Not a PNG file")]
    NotAPng,

    /// Chunk stream ends in the middle of a chunk
    #[error("Truncated chunk at offset {offset}")]
    Truncated { offset: u64 },

    /// Chunk declares a length above the configured safety bound
    #[error("Chunk at offset {offset} declares {length} bytes (max: {max})")]
    ChunkTooLarge { offset: u64, length: u32, max: u32 },

    /// Data size exceeds maximum allowed
    #[error("Data too large: {size} bytes (max: {max})")]
    DataTooLarge { size: u64, max: u64 },

    /// Payload is not valid base64
    #[error("Base64 decode failed: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Decoded payload is not valid UTF-8
    #[error("UTF-8 decode failed: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// Payload is not valid JSON
    #[error("JSON parse failed: {0}")]
    Json(#[from] serde_json::Error),

    /// JSON parsed but does not satisfy the character card contract
    #[error("Invalid character card: {0}")]
    InvalidCard(String),

    /// Every extraction strategy was exhausted
    #[error("No character card found")]
    NoCardFound,
}
