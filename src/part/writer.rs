// Copyright 2026 Cairn Project Authors. Licensed under Apache-2.0.

//! Part assembly: the shared stream-table engine and the full-part writer.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, WriteBytesExt};
use itertools::Itertools;
use tracing::{debug, info};

use super::checksums::{FileChecksum, PartChecksums};
use super::columns_file::save_columns;
use super::escape::escape_for_file_name;
use super::hashing::HashingWriter;
use super::options::PartOptions;
use super::stream::{ColumnStream, DataWriter};
use super::{
    ARRAY_SIZES_SUFFIX, DATA_FILE_EXTENSION, MARKS_FILE_EXTENSION, NULL_MAP_EXTENSION,
    NULL_MARKS_FILE_EXTENSION, PRIMARY_INDEX_FILE_NAME,
};
use crate::block::Block;
use crate::column::{ArrayColumn, Column};
use crate::error::{IoResultExt, PartError, PartResult};
use crate::types::{nested_root, ColumnDesc, DataType};

const INDEX_BUFFER_SIZE: usize = 1 << 20;

/// The stream table and write loops shared by [`PartWriter`] and
/// [`super::ColumnAppendWriter`].
///
/// Physical streams are keyed by their logical stream name: the column name
/// for value streams, `<nested_root>%size<level>` for array-sizes streams.
/// Null-map streams live in their own table because they share the logical
/// column's name.
pub(crate) struct PartStreams {
    pub(crate) part_path: PathBuf,
    pub(crate) options: PartOptions,
    pub(crate) column_streams: BTreeMap<String, ColumnStream>,
    pub(crate) null_streams: BTreeMap<String, ColumnStream>,
    /// Rows still owed to the granule left open by the previous block.
    pub(crate) index_offset: usize,
}

fn size_stream_key(name: &str, level: usize) -> String {
    format!("{}{ARRAY_SIZES_SUFFIX}{level}", nested_root(name))
}

impl PartStreams {
    pub(crate) fn new(part_path: PathBuf, options: PartOptions) -> Self {
        Self {
            part_path,
            options,
            column_streams: BTreeMap::new(),
            null_streams: BTreeMap::new(),
            index_offset: 0,
        }
    }

    /// Creates every physical stream one logical column needs.
    ///
    /// `filename` overrides the escape input for the column's own streams
    /// (append mode); array-sizes streams always derive their file name from
    /// the nested root so that siblings land on the shared file.
    pub(crate) fn add_stream(
        &mut self,
        name: &str,
        data_type: &DataType,
        estimated_size: u64,
        level: usize,
        filename: Option<&str>,
    ) -> PartResult<()> {
        match data_type {
            DataType::Nullable(inner) => {
                let escaped = escape_for_file_name(filename.unwrap_or(name));
                let stream = ColumnStream::new(
                    &self.part_path,
                    escaped,
                    NULL_MAP_EXTENSION,
                    NULL_MARKS_FILE_EXTENSION,
                    &self.options,
                    estimated_size,
                )?;
                self.null_streams.insert(name.to_string(), stream);
                self.add_stream(name, inner, estimated_size, level, filename)
            }
            DataType::Array(inner) => {
                let size_key = size_stream_key(name, level);
                if !self.column_streams.contains_key(&size_key) {
                    let escaped = format!(
                        "{}{ARRAY_SIZES_SUFFIX}{level}",
                        escape_for_file_name(nested_root(name))
                    );
                    let stream = ColumnStream::new(
                        &self.part_path,
                        escaped,
                        DATA_FILE_EXTENSION,
                        MARKS_FILE_EXTENSION,
                        &self.options,
                        estimated_size,
                    )?;
                    self.column_streams.insert(size_key, stream);
                }
                self.add_stream(name, inner, estimated_size, level + 1, None)
            }
            DataType::Nested(_) => Err(PartError::bad_arguments(
                "Nested columns must be flattened before writing",
            )),
            _ => {
                let escaped = escape_for_file_name(filename.unwrap_or(name));
                let stream = ColumnStream::new(
                    &self.part_path,
                    escaped,
                    DATA_FILE_EXTENSION,
                    MARKS_FILE_EXTENSION,
                    &self.options,
                    estimated_size,
                )?;
                self.column_streams.insert(name.to_string(), stream);
                Ok(())
            }
        }
    }

    /// Writes one block's worth of one logical column into its streams.
    ///
    /// Every substream (null map, per-level sizes, leaf values) runs the same
    /// granularity loop over top-level rows, so all streams of the part emit
    /// the same mark count. `offset_columns` tracks the sizes streams already
    /// written by a sibling column during this block.
    pub(crate) fn write_column(
        &mut self,
        name: &str,
        data_type: &DataType,
        column: &Column,
        offset_columns: &mut HashSet<String>,
        level: usize,
    ) -> PartResult<()> {
        let rows = column.len();
        let granularity = self.options.granularity;
        let min_frame_bytes = self.options.min_frame_bytes;
        let index_offset = self.index_offset;

        match data_type {
            DataType::Nullable(inner) => {
                let nullable = match column {
                    Column::Nullable(c) => c,
                    _ => panic!("column does not match type Nullable"),
                };
                let stream = self
                    .null_streams
                    .get_mut(name)
                    .expect("null stream missing from stream table");
                write_substream(
                    stream,
                    granularity,
                    index_offset,
                    min_frame_bytes,
                    rows,
                    |out, from, count| out.write_all(&nullable.nulls()[from..from + count]),
                )?;
                self.write_column(name, inner, nullable.values(), offset_columns, level)
            }
            DataType::Array(_) => {
                let mut levels: Vec<&ArrayColumn> = vec![];
                let mut leaf_type = data_type;
                let mut leaf = column;
                while let DataType::Array(inner) = leaf_type {
                    let array = match leaf {
                        Column::Array(c) => c,
                        _ => panic!("column does not match type Array"),
                    };
                    levels.push(array);
                    leaf_type = inner;
                    leaf = array.values();
                }

                for depth in 0..levels.len() {
                    let size_key = size_stream_key(name, level + depth);
                    if !offset_columns.insert(size_key.clone()) {
                        // a sibling under the same nested root already wrote it
                        continue;
                    }
                    let array = levels[depth];
                    let outer = &levels[..depth];
                    let stream = self
                        .column_streams
                        .get_mut(&size_key)
                        .expect("sizes stream missing from stream table");
                    write_substream(
                        stream,
                        granularity,
                        index_offset,
                        min_frame_bytes,
                        rows,
                        |out, from, count| {
                            let (start, end) = map_rows(outer, from, from + count);
                            for row in start..end {
                                out.write_u64::<LittleEndian>(array.size_at(row))?;
                            }
                            Ok(())
                        },
                    )?;
                }

                let stream = self
                    .column_streams
                    .get_mut(name)
                    .expect("value stream missing from stream table");
                write_substream(
                    stream,
                    granularity,
                    index_offset,
                    min_frame_bytes,
                    rows,
                    |out, from, count| column.serialize_slice(from, count, out),
                )
            }
            DataType::Nested(_) => Err(PartError::bad_arguments(
                "Nested columns must be flattened before writing",
            )),
            _ => {
                let stream = self
                    .column_streams
                    .get_mut(name)
                    .expect("value stream missing from stream table");
                write_substream(
                    stream,
                    granularity,
                    index_offset,
                    min_frame_bytes,
                    rows,
                    |out, from, count| column.serialize_slice(from, count, out),
                )
            }
        }
    }
}

/// Maps a top-level row range through enclosing array levels down to the
/// element range of the next level.
fn map_rows(levels: &[&ArrayColumn], from: usize, to: usize) -> (usize, usize) {
    levels.iter().fold((from, to), |(start, end), array| {
        (array.offset_at(start), array.offset_at(end))
    })
}

/// The granularity loop of one substream.
///
/// A mark is recorded every `granularity` rows; the first `index_offset`
/// rows of the block finish the granule left open by the previous block and
/// get no mark. At each mark boundary the frame is closed if it already
/// buffers `min_frame_bytes`. After each range the frame is closed if it is
/// exactly full, so a mark never points one-past-the-end of a frame.
fn write_substream(
    stream: &mut ColumnStream,
    granularity: usize,
    index_offset: usize,
    min_frame_bytes: usize,
    rows: usize,
    mut serialize: impl FnMut(&mut DataWriter, usize, usize) -> io::Result<()>,
) -> PartResult<()> {
    let mut cursor = 0;
    while cursor < rows {
        let limit = if cursor == 0 && index_offset != 0 {
            index_offset
        } else {
            stream
                .data
                .finish_frame_if_at_least(min_frame_bytes)
                .path_context(&stream.data_path)?;
            let (raw_offset, frame_offset) = stream.data.mark_cursor();
            stream.marks.append(raw_offset, frame_offset)?;
            granularity
        };
        let count = limit.min(rows - cursor);
        serialize(&mut stream.data, cursor, count).path_context(&stream.data_path)?;
        stream
            .data
            .finish_frame_if_full()
            .path_context(&stream.data_path)?;
        cursor += limit;
    }
    Ok(())
}

/// The carry between successive blocks: how many rows of the next block
/// belong to the granule its predecessor left open.
pub(crate) fn next_index_offset(granularity: usize, index_offset: usize, rows: usize) -> usize {
    let written_for_last_mark = (granularity - index_offset + rows) % granularity;
    (granularity - written_for_last_mark) % granularity
}

enum PartState {
    Open,
    Committed,
    Empty,
}

/// Writes one complete part: every declared column, the primary-key index,
/// the column descriptor and the checksum manifest.
///
/// Blocks must arrive pre-sorted, or accompanied by a sorting permutation
/// ([`PartWriter::write_with_permutation`]). [`PartWriter::finish`] is the
/// only commit; it returns the manifest it persisted.
pub struct PartWriter {
    streams: PartStreams,
    columns: Vec<ColumnDesc>,
    sort_key: Vec<String>,
    index_path: PathBuf,
    index_file: Option<HashingWriter<BufWriter<File>>>,
    index_rows: Vec<Column>,
    marks_count: u64,
    state: PartState,
}

impl PartWriter {
    pub fn new(
        part_path: impl Into<PathBuf>,
        columns: Vec<ColumnDesc>,
        sort_key: Vec<String>,
        options: PartOptions,
    ) -> PartResult<Self> {
        Self::with_size_hints(part_path, columns, sort_key, options, &HashMap::new())
    }

    /// As [`PartWriter::new`], with per-column byte estimates consulted by
    /// the direct-I/O buffer policy when `aio_threshold` is set.
    pub fn with_size_hints(
        part_path: impl Into<PathBuf>,
        columns: Vec<ColumnDesc>,
        sort_key: Vec<String>,
        options: PartOptions,
        size_hints: &HashMap<String, u64>,
    ) -> PartResult<Self> {
        options.validate()?;
        for column in &columns {
            column.data_type.validate_for_write()?;
        }

        let part_path = part_path.into();
        fs::create_dir_all(&part_path).path_context(&part_path)?;
        debug!(part = %part_path.display(), columns = columns.len(), "creating part directory");

        let index_path = part_path.join(PRIMARY_INDEX_FILE_NAME);
        let index_file = if sort_key.is_empty() {
            None
        } else {
            let file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&index_path)
                .path_context(&index_path)?;
            Some(HashingWriter::new(BufWriter::with_capacity(
                INDEX_BUFFER_SIZE,
                file,
            )))
        };

        let mut streams = PartStreams::new(part_path, options);
        for column in &columns {
            let estimated_size = if streams.options.aio_threshold > 0 {
                size_hints.get(&column.name).copied().unwrap_or(0)
            } else {
                0
            };
            streams.add_stream(&column.name, &column.data_type, estimated_size, 0, None)?;
        }

        Ok(Self {
            streams,
            columns,
            sort_key,
            index_path,
            index_file,
            index_rows: vec![],
            marks_count: 0,
            state: PartState::Open,
        })
    }

    /// Writes a block whose rows are already in sort-key order.
    pub fn write(&mut self, block: &Block) -> PartResult<()> {
        self.write_impl(block, None)
    }

    /// Writes an unsorted block together with the permutation that sorts it.
    /// Sort-key columns are permuted up front; every other column is permuted
    /// lazily and dropped right after its streams are fed, so only one
    /// permuted column is alive at a time.
    pub fn write_with_permutation(
        &mut self,
        block: &Block,
        permutation: &[u32],
    ) -> PartResult<()> {
        self.write_impl(block, Some(permutation))
    }

    fn write_impl(&mut self, block: &Block, permutation: Option<&[u32]>) -> PartResult<()> {
        if !matches!(self.state, PartState::Open) {
            return Err(PartError::AlreadyFinished);
        }
        let rows = block.rows();
        if let Some(permutation) = permutation {
            if permutation.len() != rows {
                return Err(PartError::bad_arguments(format!(
                    "permutation covers {} rows, block has {rows}",
                    permutation.len()
                )));
            }
        }

        // Sizes streams written during this block; shared by sibling columns.
        let mut offset_columns = HashSet::new();

        let mut primary_positions = HashMap::new();
        let mut primary_columns: Vec<Cow<'_, Column>> = Vec::with_capacity(self.sort_key.len());
        for (position, key) in self.sort_key.iter().enumerate() {
            if primary_positions.insert(key.clone(), position).is_some() {
                return Err(PartError::DuplicateSortKeyColumn(key.clone()));
            }
            let column = block
                .get_by_name(key)
                .ok_or_else(|| PartError::ColumnNotFound(key.clone()))?;
            primary_columns.push(match permutation {
                Some(permutation) => Cow::Owned(column.column.permute(permutation)),
                None => Cow::Borrowed(&column.column),
            });
        }

        if self.index_rows.is_empty() && !self.sort_key.is_empty() {
            self.index_rows = primary_columns
                .iter()
                .map(|column| column.empty_like())
                .collect_vec();
        }

        for desc in &self.columns {
            let column = block
                .get_by_name(&desc.name)
                .ok_or_else(|| PartError::ColumnNotFound(desc.name.clone()))?;
            if column.data_type != desc.data_type {
                return Err(PartError::bad_arguments(format!(
                    "block column {} has type {}, part declares {}",
                    desc.name, column.data_type, desc.data_type
                )));
            }
            match permutation {
                Some(permutation) => {
                    if let Some(&position) = primary_positions.get(&desc.name) {
                        self.streams.write_column(
                            &desc.name,
                            &desc.data_type,
                            &primary_columns[position],
                            &mut offset_columns,
                            0,
                        )?;
                    } else {
                        let permuted = column.column.permute(permutation);
                        self.streams.write_column(
                            &desc.name,
                            &desc.data_type,
                            &permuted,
                            &mut offset_columns,
                            0,
                        )?;
                    }
                }
                None => {
                    self.streams.write_column(
                        &desc.name,
                        &desc.data_type,
                        &column.column,
                        &mut offset_columns,
                        0,
                    )?;
                }
            }
        }

        // One index entry per granularity rows, starting at the carry-over.
        let granularity = self.streams.options.granularity;
        let mut row = self.streams.index_offset;
        while row < rows {
            if let Some(index_file) = &mut self.index_file {
                for (position, column) in primary_columns.iter().enumerate() {
                    column
                        .serialize_row(row, index_file)
                        .path_context(&self.index_path)?;
                    self.index_rows[position].push_row_from(column, row);
                }
            }
            self.marks_count += 1;
            row += granularity;
        }

        self.streams.index_offset =
            next_index_offset(granularity, self.streams.index_offset, rows);
        Ok(())
    }

    /// Commits the part: flushes and fingerprints every stream, writes the
    /// column descriptor and the manifest, and returns the manifest. A part
    /// that received no rows is erased instead, and the returned manifest is
    /// empty.
    pub fn finish(&mut self) -> PartResult<PartChecksums> {
        if !matches!(self.state, PartState::Open) {
            return Err(PartError::AlreadyFinished);
        }

        let mut checksums = PartChecksums::default();

        if let Some(mut index_file) = self.index_file.take() {
            index_file.flush().path_context(&self.index_path)?;
            checksums.insert(
                PRIMARY_INDEX_FILE_NAME,
                FileChecksum::plain(index_file.count(), index_file.digest()),
            );
        }

        for stream in self.streams.column_streams.values_mut() {
            stream.finalize()?;
            stream.add_to_checksums(&mut checksums, None);
        }
        self.streams.column_streams.clear();

        for stream in self.streams.null_streams.values_mut() {
            stream.finalize()?;
            stream.add_to_checksums(&mut checksums, None);
        }
        self.streams.null_streams.clear();

        if self.marks_count == 0 {
            // every row was merged away; an empty part is never published
            fs::remove_dir_all(&self.streams.part_path).path_context(&self.streams.part_path)?;
            checksums.clear();
            info!(part = %self.streams.part_path.display(), "removed empty part directory");
            self.state = PartState::Empty;
            return Ok(checksums);
        }

        save_columns(&self.streams.part_path, &self.columns)?;
        checksums.save(&self.streams.part_path)?;
        info!(
            part = %self.streams.part_path.display(),
            marks = self.marks_count,
            files = checksums.len(),
            "part committed"
        );
        self.state = PartState::Committed;
        Ok(checksums)
    }

    /// Not a supported commit surface; [`PartWriter::finish`] is the only
    /// way to complete a part.
    pub fn write_suffix(&mut self) -> PartResult<()> {
        Err(PartError::NotImplemented("PartWriter::write_suffix"))
    }

    /// Marks recorded so far across all written blocks.
    pub fn marks_count(&self) -> u64 {
        self.marks_count
    }

    /// The in-memory copy of the primary index: one column per sort-key
    /// column, one row per mark.
    pub fn index(&self) -> &[Column] {
        &self.index_rows
    }

    pub fn part_path(&self) -> &Path {
        &self.streams.part_path
    }
}
