// Copyright 2026 Cairn Project Authors. Licensed under Apache-2.0.

//! The framing compressor stage of the write pipeline.
//!
//! Serialized values accumulate in an uncompressed frame buffer bounded by
//! `max_frame_bytes`. Closing a frame compresses the buffer and emits it to
//! the raw file behind a fixed header:
//!
//! ```plain
//! | method (1B) | compressed_len (4B LE) | uncompressed_len (4B LE)
//! | payload_crc32 (4B LE) | payload |
//! ```
//!
//! The stage exposes the two observations mark emission depends on: how many
//! bytes are buffered in the current frame, and how many bytes have reached
//! the raw file so far.

use std::borrow::Cow;
use std::fmt;
use std::io::{self, Write};
use std::path::Path;
use std::str::FromStr;

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

use super::hashing::HashingWriter;
use crate::error::{IoResultExt, PartError, PartResult};

pub const FRAME_HEADER_SIZE: usize = 13;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionMethod {
    None,
    #[default]
    Lz4,
}

impl CompressionMethod {
    fn as_byte(self) -> u8 {
        match self {
            CompressionMethod::None => 0,
            CompressionMethod::Lz4 => 1,
        }
    }

    fn from_byte(byte: u8) -> PartResult<Self> {
        match byte {
            0 => Ok(CompressionMethod::None),
            1 => Ok(CompressionMethod::Lz4),
            other => Err(PartError::corrupted(format!(
                "unknown compression method byte: {other}"
            ))),
        }
    }
}

impl fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompressionMethod::None => write!(f, "none"),
            CompressionMethod::Lz4 => write!(f, "lz4"),
        }
    }
}

impl FromStr for CompressionMethod {
    type Err = PartError;

    fn from_str(s: &str) -> PartResult<Self> {
        match s {
            "none" => Ok(CompressionMethod::None),
            "lz4" => Ok(CompressionMethod::Lz4),
            other => Err(PartError::bad_arguments(format!(
                "unknown compression method: {other}"
            ))),
        }
    }
}

/// Framing compressor over a raw-file writer.
///
/// The wrapped sink is hashed and counted ([`HashingWriter`], hash A of the
/// manifest); bytes entering the frame buffer are hashed and counted
/// independently (hash B, the uncompressed side).
pub struct FramedWriter<W: Write> {
    sink: HashingWriter<W>,
    frame: Vec<u8>,
    max_frame_bytes: usize,
    method: CompressionMethod,
    uncompressed_count: u64,
    uncompressed_hasher: crc32fast::Hasher,
}

impl<W: Write> FramedWriter<W> {
    pub fn new(sink: W, method: CompressionMethod, max_frame_bytes: usize) -> Self {
        assert!(max_frame_bytes > 0, "max_frame_bytes must be positive");
        Self {
            sink: HashingWriter::new(sink),
            frame: Vec::with_capacity(max_frame_bytes),
            max_frame_bytes,
            method,
            uncompressed_count: 0,
            uncompressed_hasher: crc32fast::Hasher::new(),
        }
    }

    /// Bytes buffered in the current (open) frame.
    pub fn frame_offset(&self) -> u64 {
        self.frame.len() as u64
    }

    /// Bytes flushed to the raw file so far. While a frame is open this is
    /// the raw-file offset at which that frame will begin.
    pub fn raw_count(&self) -> u64 {
        self.sink.count()
    }

    /// The `(raw_offset, frame_offset)` pair recorded for a mark.
    pub fn mark_cursor(&self) -> (u64, u64) {
        (self.sink.count(), self.frame.len() as u64)
    }

    pub fn uncompressed_count(&self) -> u64 {
        self.uncompressed_count
    }

    pub fn uncompressed_digest(&self) -> u64 {
        self.uncompressed_hasher.clone().finalize() as u64
    }

    pub fn raw_digest(&self) -> u64 {
        self.sink.digest()
    }

    /// Compresses and emits the buffered frame. No-op on an empty buffer.
    pub fn finish_frame(&mut self) -> io::Result<()> {
        if self.frame.is_empty() {
            return Ok(());
        }
        let payload: Cow<'_, [u8]> = match self.method {
            CompressionMethod::None => Cow::Borrowed(self.frame.as_slice()),
            CompressionMethod::Lz4 => Cow::Owned(lz4_flex::compress(&self.frame)),
        };
        let mut header = [0u8; FRAME_HEADER_SIZE];
        {
            let mut slot = &mut header[..];
            slot.put_u8(self.method.as_byte());
            slot.put_u32_le(payload.len() as u32);
            slot.put_u32_le(self.frame.len() as u32);
            slot.put_u32_le(crc32fast::hash(&payload));
        }
        self.sink.write_all(&header)?;
        self.sink.write_all(&payload)?;
        drop(payload);
        self.frame.clear();
        Ok(())
    }

    /// Closes the frame when the buffer is exactly full, so that no recorded
    /// mark can point one-past-the-end of a frame.
    pub fn finish_frame_if_full(&mut self) -> io::Result<()> {
        if self.frame.len() == self.max_frame_bytes {
            self.finish_frame()?;
        }
        Ok(())
    }

    /// Closes the frame once it holds at least `min_frame_bytes`, called at
    /// mark boundaries.
    pub fn finish_frame_if_at_least(&mut self, min_frame_bytes: usize) -> io::Result<()> {
        if self.frame.len() >= min_frame_bytes {
            self.finish_frame()?;
        }
        Ok(())
    }

    /// Flushes the in-flight frame and the sink. Idempotent.
    pub fn finalize(&mut self) -> io::Result<()> {
        self.finish_frame()?;
        self.sink.flush()
    }

    pub fn get_mut(&mut self) -> &mut W {
        self.sink.get_mut()
    }

    #[cfg(test)]
    fn get_ref(&self) -> &W {
        self.sink.get_ref()
    }
}

impl<W: Write> Write for FramedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut rest = buf;
        while !rest.is_empty() {
            if self.frame.len() == self.max_frame_bytes {
                self.finish_frame()?;
            }
            let take = rest.len().min(self.max_frame_bytes - self.frame.len());
            let (chunk, tail) = rest.split_at(take);
            self.frame.extend_from_slice(chunk);
            self.uncompressed_hasher.update(chunk);
            self.uncompressed_count += take as u64;
            rest = tail;
        }
        Ok(buf.len())
    }

    /// Flushes the sink only; frames are closed at mark boundaries or by
    /// [`FramedWriter::finalize`].
    fn flush(&mut self) -> io::Result<()> {
        self.sink.flush()
    }
}

/// Decodes the frame starting at `offset`, returning its uncompressed bytes
/// and the encoded frame length.
pub fn decompress_frame_at(data: &[u8], offset: usize) -> PartResult<(Vec<u8>, usize)> {
    let mut buf = data
        .get(offset..)
        .ok_or_else(|| PartError::corrupted(format!("frame offset {offset} is out of bounds")))?;
    if buf.len() < FRAME_HEADER_SIZE {
        return Err(PartError::corrupted("truncated frame header"));
    }
    let method = CompressionMethod::from_byte(buf.get_u8())?;
    let compressed_len = buf.get_u32_le() as usize;
    let uncompressed_len = buf.get_u32_le() as usize;
    let checksum = buf.get_u32_le();
    let payload = buf
        .get(..compressed_len)
        .ok_or_else(|| PartError::corrupted("truncated frame payload"))?;
    if crc32fast::hash(payload) != checksum {
        return Err(PartError::corrupted(format!(
            "frame at offset {offset} fails its checksum"
        )));
    }
    let values = match method {
        CompressionMethod::None => payload.to_vec(),
        CompressionMethod::Lz4 => lz4_flex::decompress(payload, uncompressed_len)
            .map_err(|e| PartError::corrupted(format!("frame at offset {offset}: {e}")))?,
    };
    if values.len() != uncompressed_len {
        return Err(PartError::corrupted(format!(
            "frame at offset {offset} declares {uncompressed_len} bytes, got {}",
            values.len()
        )));
    }
    Ok((values, FRAME_HEADER_SIZE + compressed_len))
}

/// Reads a whole data file back into its uncompressed bytes.
pub fn read_data_file(path: impl AsRef<Path>) -> PartResult<Vec<u8>> {
    let path = path.as_ref();
    let data = std::fs::read(path).path_context(path)?;
    let mut values = vec![];
    let mut offset = 0;
    while offset < data.len() {
        let (frame, consumed) = decompress_frame_at(&data, offset)?;
        values.extend_from_slice(&frame);
        offset += consumed;
    }
    Ok(values)
}
