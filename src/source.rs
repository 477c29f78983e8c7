//! Byte source adapter
//!
//! Turns a path, a reader or a base64 string into one flat buffer. Every
//! entry point enforces a size bound before allocating.

use crate::error::{Error, Result};
use crate::payload::decode_base64;
use std::fs::File;
use std::io::Read;
use std::ops::Deref;
use std::path::Path;

/// Maximum input size to prevent DOS attacks (256 MB)
///
/// Character card PNGs are typically well under 10 MB.
pub const MAX_SOURCE_SIZE: u64 = 256 * 1024 * 1024;

/// Bytes of a whole input file
#[derive(Debug)]
pub enum SourceBytes {
    /// Read into memory
    Owned(Vec<u8>),
    /// Memory-mapped read-only (zero-copy)
    #[cfg(feature = "memory-mapped")]
    Mapped(memmap2::Mmap),
}

impl SourceBytes {
    /// Wrap a caller-made memory map (zero-copy), refusing maps larger than
    /// `max` bytes
    ///
    /// Mapping is `unsafe` and stays with the caller: a file truncated by
    /// another process while mapped faults on access (SIGBUS on Unix).
    ///
    /// ```no_run
    /// # fn main() -> chara_io::Result<()> {
    /// let file = std::fs::File::open("alice.png")?;
    /// // SAFETY: nothing else writes to the file while it is mapped
    /// let mmap = unsafe { memmap2::Mmap::map(&file)? };
    /// let bytes = chara_io::SourceBytes::with_mmap(mmap, chara_io::MAX_SOURCE_SIZE)?;
    /// let _card = chara_io::extract_character_card(&bytes);
    /// # Ok(())
    /// # }
    /// ```
    #[cfg(feature = "memory-mapped")]
    pub fn with_mmap(mmap: memmap2::Mmap, max: u64) -> Result<Self> {
        check_size(mmap.len() as u64, max)?;
        Ok(Self::Mapped(mmap))
    }

    /// Take the bytes as an owned buffer (copies a mapping)
    pub fn into_vec(self) -> Vec<u8> {
        match self {
            Self::Owned(data) => data,
            #[cfg(feature = "memory-mapped")]
            Self::Mapped(mmap) => mmap.to_vec(),
        }
    }
}

impl Deref for SourceBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Self::Owned(data) => data,
            #[cfg(feature = "memory-mapped")]
            Self::Mapped(mmap) => mmap,
        }
    }
}

impl AsRef<[u8]> for SourceBytes {
    fn as_ref(&self) -> &[u8] {
        self
    }
}

impl From<Vec<u8>> for SourceBytes {
    fn from(data: Vec<u8>) -> Self {
        Self::Owned(data)
    }
}

fn check_size(size: u64, max: u64) -> Result<()> {
    if size > max {
        return Err(Error::DataTooLarge { size, max });
    }
    Ok(())
}

/// Read a file, refusing anything larger than `max` bytes
///
/// The file is always read into memory, so later changes to it cannot
/// affect extraction. To work on a memory map instead, map the file yourself
/// and use [`SourceBytes::with_mmap`] (feature `memory-mapped`).
pub fn read_path<P: AsRef<Path>>(path: P, max: u64) -> Result<SourceBytes> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let size = file.metadata()?.len();
    check_size(size, max)?;
    tracing::trace!(path = %path.display(), size, "reading source file");

    read_source(file, max)
}

/// Read a stream to the end, refusing anything larger than `max` bytes
pub fn read_source<R: Read>(reader: R, max: u64) -> Result<SourceBytes> {
    let mut data = Vec::new();
    // One extra byte tells "exactly max" from "more than max"
    reader.take(max.saturating_add(1)).read_to_end(&mut data)?;
    check_size(data.len() as u64, max)?;
    Ok(SourceBytes::Owned(data))
}

/// Decode a file delivered as base64 text
///
/// A `data:` URL prefix (`data:image/png;base64,`) is stripped first. The
/// size bound applies to the decoded bytes, estimated before decoding.
pub fn decode_base64_source(text: &str, max: u64) -> Result<SourceBytes> {
    let text = text.trim();
    let body = match text.strip_prefix("data:") {
        Some(url) => url.split_once(',').map_or(url, |(_, body)| body),
        None => text,
    };
    let estimated = (body.len() as u64 / 4) * 3;
    check_size(estimated, max)?;

    let data = decode_base64(body)?;
    check_size(data.len() as u64, max)?;
    Ok(SourceBytes::Owned(data))
}
