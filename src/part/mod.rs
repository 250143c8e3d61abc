// Copyright 2026 Cairn Project Authors. Licensed under Apache-2.0.

//! On-disk part writing.
//!
//! A part is an immutable directory holding one sorted horizontal slice of a
//! table. For `create table t (n UInt32, v Nullable(String))` sorted by `n`,
//! one part looks like:
//!
//! ```plain
//! 19700101_000000_1_1_0/
//! |- n.bin          framed, compressed values of n
//! |- n.mrk          one (raw_offset, frame_offset) locator per granule
//! |- v.bin          values of v
//! |- v.mrk
//! |- v.null         byte-per-row null map of v
//! |- v.null_mrk
//! |- primary.idx    sort-key tuple at every granule boundary
//! |- columns.txt    ordered column descriptor
//! \- checksums.txt  manifest; its presence publishes the part
//! ```
//!
//! Array columns additionally store their lengths in a `%size<level>` stream
//! shared by all sibling columns of the same nested root. Data files are a
//! sequence of compression frames; marks locate a row by the raw offset of
//! its frame plus the offset inside the decompressed frame, which is how a
//! reader seeks to a granule without scanning.
//!
//! Writing is blocking and single-producer per part. Nothing is published
//! until [`PartWriter::finish`] writes the manifest last; a crashed write
//! leaves a directory without `checksums.txt` that readers ignore and a
//! sweeper removes.

mod append;
mod checksums;
mod columns_file;
mod compress;
mod escape;
mod hashing;
mod mark;
mod options;
mod stream;
mod writer;

pub use append::ColumnAppendWriter;
pub use checksums::{FileChecksum, PartChecksums, CHECKSUMS_FILE_NAME};
pub use columns_file::{load_columns, save_columns, COLUMNS_FILE_NAME};
pub use compress::{
    decompress_frame_at, read_data_file, CompressionMethod, FRAME_HEADER_SIZE,
};
pub use escape::{escape_for_file_name, unescape_for_file_name};
pub use mark::MARK_ENTRY_SIZE;
pub use options::PartOptions;
pub use writer::PartWriter;

pub const DATA_FILE_EXTENSION: &str = ".bin";
pub const MARKS_FILE_EXTENSION: &str = ".mrk";
pub const NULL_MAP_EXTENSION: &str = ".null";
pub const NULL_MARKS_FILE_EXTENSION: &str = ".null_mrk";
pub const ARRAY_SIZES_SUFFIX: &str = "%size";
pub const PRIMARY_INDEX_FILE_NAME: &str = "primary.idx";
