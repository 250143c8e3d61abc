//! Counting CRC32 pass-through stage of the write pipeline.

use std::io::{self, Write};

/// Wraps a writer, tracking how many bytes went through and their CRC32.
///
/// Sits directly above the buffered raw file (hash of on-disk bytes) and
/// under the mark log and primary index (hash of their entries).
pub struct HashingWriter<W: Write> {
    inner: W,
    count: u64,
    hasher: crc32fast::Hasher,
}

impl<W: Write> HashingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            count: 0,
            hasher: crc32fast::Hasher::new(),
        }
    }

    /// Bytes written so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// CRC32 of the bytes written so far, widened for the manifest.
    pub fn digest(&self) -> u64 {
        self.hasher.clone().finalize() as u64
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.hasher.update(&buf[..written]);
        self.count += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
