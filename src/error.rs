// Copyright 2026 Cairn Project Authors. Licensed under Apache-2.0.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PartError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("sort key contains duplicate column: {0}")]
    DuplicateSortKeyColumn(String),
    #[error("column {0} not found in block")]
    ColumnNotFound(String),
    #[error("bad arguments: {0}")]
    BadArguments(String),
    #[error("method {0} is not supported")]
    NotImplemented(&'static str),
    #[error("part writer is already finished")]
    AlreadyFinished,
    #[error("checksum mismatch for {file}: found {found:#x}, expected {expected:#x}")]
    ChecksumMismatch {
        file: String,
        found: u64,
        expected: u64,
    },
    #[error("corrupted part artifact: {0}")]
    Corrupted(String),
    #[error("manifest codec error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    PlainIo(#[from] Box<io::Error>),
}

impl From<io::Error> for PartError {
    fn from(source: io::Error) -> Self {
        PartError::PlainIo(Box::new(source))
    }
}

impl PartError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        PartError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn bad_arguments(message: impl ToString) -> Self {
        PartError::BadArguments(message.to_string())
    }

    pub fn corrupted(message: impl ToString) -> Self {
        PartError::Corrupted(message.to_string())
    }
}

pub type PartResult<T> = std::result::Result<T, PartError>;

/// Attaches the offending file path to raw I/O errors.
pub(crate) trait IoResultExt<T> {
    fn path_context(self, path: &Path) -> PartResult<T>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn path_context(self, path: &Path) -> PartResult<T> {
        self.map_err(|source| PartError::io(path, source))
    }
}
