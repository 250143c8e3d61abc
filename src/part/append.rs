// Copyright 2026 Cairn Project Authors. Licensed under Apache-2.0.

//! The append-only column writer used by merges that add columns to an
//! existing part.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::checksums::PartChecksums;
use super::escape::escape_for_file_name;
use super::options::PartOptions;
use super::writer::{next_index_offset, PartStreams};
use crate::block::Block;
use crate::error::{PartError, PartResult};

/// Writes a subset of columns into an existing part directory.
///
/// Unlike [`super::PartWriter`] it emits no primary index, no column
/// descriptor and no manifest file: the caller merges the returned checksums
/// into the part's existing manifest. Streams are initialized lazily from the
/// first block's own columns and torn down by
/// [`ColumnAppendWriter::finish`], so one instance can be reused
/// block-at-a-time.
pub struct ColumnAppendWriter {
    streams: PartStreams,
    sync: bool,
    initialized: bool,
}

impl ColumnAppendWriter {
    /// `part_path` must be an existing part directory. With `sync`, every
    /// stream is fsynced before the checksums are returned.
    pub fn new(part_path: impl Into<PathBuf>, options: PartOptions, sync: bool) -> PartResult<Self> {
        options.validate()?;
        Ok(Self {
            streams: PartStreams::new(part_path.into(), options),
            sync,
            initialized: false,
        })
    }

    pub fn write(&mut self, block: &Block) -> PartResult<()> {
        if !self.initialized {
            self.streams.column_streams.clear();
            self.streams.null_streams.clear();
            for column in block.columns() {
                column.data_type.validate_for_write()?;
                // the logical name doubles as the escape input so the new
                // files slot into the existing part without collision
                self.streams.add_stream(
                    &column.name,
                    &column.data_type,
                    0,
                    0,
                    Some(&column.name),
                )?;
            }
            debug!(
                part = %self.streams.part_path.display(),
                columns = block.columns().len(),
                "initialized append streams"
            );
            self.initialized = true;
        }

        let rows = block.rows();
        let mut offset_columns = HashSet::new();
        for column in block.columns() {
            self.streams.write_column(
                &column.name,
                &column.data_type,
                &column.column,
                &mut offset_columns,
                0,
            )?;
        }

        self.streams.index_offset = next_index_offset(
            self.streams.options.granularity,
            self.streams.index_offset,
            rows,
        );
        Ok(())
    }

    /// Finalizes every stream and returns their checksums, keyed by the
    /// escaped stream name. Tears the stream table down; the next `write`
    /// re-initializes it.
    pub fn finish(&mut self) -> PartResult<PartChecksums> {
        let mut checksums = PartChecksums::default();

        for (name, stream) in self.streams.null_streams.iter_mut() {
            stream.finalize()?;
            if self.sync {
                stream.sync()?;
            }
            stream.add_to_checksums(&mut checksums, Some(&escape_for_file_name(name)));
        }
        self.streams.null_streams.clear();

        for (name, stream) in self.streams.column_streams.iter_mut() {
            stream.finalize()?;
            if self.sync {
                stream.sync()?;
            }
            stream.add_to_checksums(&mut checksums, Some(&escape_for_file_name(name)));
        }
        self.streams.column_streams.clear();

        self.initialized = false;
        Ok(checksums)
    }

    /// Not a supported commit surface; [`ColumnAppendWriter::finish`] is the
    /// only way to complete an append.
    pub fn write_suffix(&mut self) -> PartResult<()> {
        Err(PartError::NotImplemented("ColumnAppendWriter::write_suffix"))
    }

    pub fn part_path(&self) -> &Path {
        &self.streams.part_path
    }
}
