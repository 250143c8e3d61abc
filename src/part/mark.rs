// Copyright 2026 Cairn Project Authors. Licensed under Apache-2.0.

//! The mark file: one `(raw_offset, frame_offset)` locator per granule.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use byteorder::{LittleEndian, WriteBytesExt};

use super::hashing::HashingWriter;
use crate::error::{IoResultExt, PartResult};

pub const MARK_ENTRY_SIZE: u64 = 16;

const MARKS_BUFFER_SIZE: usize = 4096;

/// Append-only log of marks, opened with truncate+create semantics.
pub struct MarkLog {
    out: HashingWriter<BufWriter<File>>,
    path: PathBuf,
}

impl MarkLog {
    pub fn create(path: PathBuf) -> PartResult<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .path_context(&path)?;
        Ok(Self {
            out: HashingWriter::new(BufWriter::with_capacity(MARKS_BUFFER_SIZE, file)),
            path,
        })
    }

    /// Appends one mark: two little-endian u64, 16 bytes exactly.
    pub fn append(&mut self, raw_offset: u64, frame_offset: u64) -> PartResult<()> {
        self.out
            .write_u64::<LittleEndian>(raw_offset)
            .and_then(|()| self.out.write_u64::<LittleEndian>(frame_offset))
            .path_context(&self.path)
    }

    /// Bytes emitted so far.
    pub fn count(&self) -> u64 {
        self.out.count()
    }

    pub fn digest(&self) -> u64 {
        self.out.digest()
    }

    pub fn finalize(&mut self) -> PartResult<()> {
        self.out.flush().path_context(&self.path)
    }

    pub fn sync(&mut self) -> PartResult<()> {
        self.out.flush().path_context(&self.path)?;
        self.out
            .get_ref()
            .get_ref()
            .sync_data()
            .path_context(&self.path)
    }
}
