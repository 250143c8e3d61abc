// Copyright 2026 Cairn Project Authors. Licensed under Apache-2.0.

//! One physical stream of one column: a framed data file plus its mark file.

use std::fs::{File, OpenOptions};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use super::checksums::{FileChecksum, PartChecksums};
use super::compress::FramedWriter;
use super::mark::MarkLog;
use super::options::PartOptions;
use crate::error::{IoResultExt, PartResult};

const DATA_BUFFER_SIZE: usize = 1 << 20;
const LARGE_DATA_BUFFER_SIZE: usize = 4 << 20;

pub(crate) type DataWriter = FramedWriter<BufWriter<File>>;

/// The write end of one physical file pair, e.g. `n.bin` + `n.mrk` or
/// `n.null` + `n.null_mrk`.
pub(crate) struct ColumnStream {
    pub(crate) escaped_name: String,
    pub(crate) data_extension: &'static str,
    pub(crate) marks_extension: &'static str,
    pub(crate) data_path: PathBuf,
    pub(crate) data: DataWriter,
    pub(crate) marks: MarkLog,
}

impl ColumnStream {
    pub(crate) fn new(
        part_path: &Path,
        escaped_name: String,
        data_extension: &'static str,
        marks_extension: &'static str,
        options: &PartOptions,
        estimated_size: u64,
    ) -> PartResult<Self> {
        let data_path = part_path.join(format!("{escaped_name}{data_extension}"));
        let marks_path = part_path.join(format!("{escaped_name}{marks_extension}"));
        let data_file = create_data_file(&data_path, options, estimated_size)?;
        Ok(Self {
            data: FramedWriter::new(data_file, options.compression, options.max_frame_bytes),
            marks: MarkLog::create(marks_path)?,
            escaped_name,
            data_extension,
            marks_extension,
            data_path,
        })
    }

    /// Flushes the in-flight frame and both file buffers.
    pub(crate) fn finalize(&mut self) -> PartResult<()> {
        self.data.finalize().path_context(&self.data_path)?;
        self.marks.finalize()
    }

    /// Fsyncs the data file and the mark file.
    pub(crate) fn sync(&mut self) -> PartResult<()> {
        let writer = self.data.get_mut();
        std::io::Write::flush(writer).path_context(&self.data_path)?;
        writer
            .get_ref()
            .sync_data()
            .path_context(&self.data_path)?;
        self.marks.sync()
    }

    /// Appends the manifest entries for both files. The data side records the
    /// raw size/hash pair and the uncompressed pair; the marks side records
    /// size and hash only.
    pub(crate) fn add_to_checksums(&self, checksums: &mut PartChecksums, name: Option<&str>) {
        let name = name.unwrap_or(&self.escaped_name);
        checksums.insert(
            format!("{name}{}", self.data_extension),
            FileChecksum {
                file_size: self.data.raw_count(),
                file_hash: self.data.raw_digest(),
                is_compressed: true,
                uncompressed_size: self.data.uncompressed_count(),
                uncompressed_hash: self.data.uncompressed_digest(),
            },
        );
        checksums.insert(
            format!("{name}{}", self.marks_extension),
            FileChecksum::plain(self.marks.count(), self.marks.digest()),
        );
    }
}

/// Opens a data file with a buffer sized by the direct-I/O policy hint:
/// columns estimated to exceed `aio_threshold` get the large buffer.
fn create_data_file(
    path: &Path,
    options: &PartOptions,
    estimated_size: u64,
) -> PartResult<BufWriter<File>> {
    let capacity = if options.aio_threshold > 0 && estimated_size >= options.aio_threshold {
        LARGE_DATA_BUFFER_SIZE.max(options.max_frame_bytes)
    } else {
        DATA_BUFFER_SIZE
    };
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .path_context(path)?;
    Ok(BufWriter::with_capacity(capacity, file))
}
