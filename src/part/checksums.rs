// Copyright 2026 Cairn Project Authors. Licensed under Apache-2.0.

//! The part manifest: per-artifact sizes and hashes.
//!
//! `checksums.txt` is the last file written into a part and doubles as the
//! existence predicate readers key on: a directory without it is incomplete
//! and must be discarded. The format is a version header followed by one
//! JSON record per artifact per line, ordered by file name.

use std::collections::BTreeMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{IoResultExt, PartError, PartResult};

pub const CHECKSUMS_FILE_NAME: &str = "checksums.txt";

const CHECKSUMS_FORMAT_HEADER: &str = "checksums format version: 1";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChecksum {
    pub file_size: u64,
    pub file_hash: u64,
    pub is_compressed: bool,
    /// Meaningful only when `is_compressed`.
    pub uncompressed_size: u64,
    pub uncompressed_hash: u64,
}

impl FileChecksum {
    /// An entry for an uncompressed artifact (marks, primary index).
    pub fn plain(file_size: u64, file_hash: u64) -> Self {
        Self {
            file_size,
            file_hash,
            ..Default::default()
        }
    }
}

#[derive(Serialize, Deserialize)]
struct ChecksumRecord {
    file: String,
    #[serde(flatten)]
    checksum: FileChecksum,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PartChecksums {
    files: BTreeMap<String, FileChecksum>,
}

impl PartChecksums {
    pub fn insert(&mut self, file: impl Into<String>, checksum: FileChecksum) {
        self.files.insert(file.into(), checksum);
    }

    pub fn get(&self, file: &str) -> Option<&FileChecksum> {
        self.files.get(file)
    }

    pub fn files(&self) -> impl Iterator<Item = (&String, &FileChecksum)> {
        self.files.iter()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn clear(&mut self) {
        self.files.clear();
    }

    /// Folds another manifest in, as done when merging append-written columns
    /// into an existing part's manifest.
    pub fn merge(&mut self, other: PartChecksums) {
        self.files.extend(other.files);
    }

    pub fn write_to(&self, out: &mut impl Write) -> PartResult<()> {
        writeln!(out, "{CHECKSUMS_FORMAT_HEADER}")?;
        for (file, checksum) in &self.files {
            serde_json::to_writer(
                &mut *out,
                &ChecksumRecord {
                    file: file.clone(),
                    checksum: checksum.clone(),
                },
            )?;
            writeln!(out)?;
        }
        Ok(())
    }

    pub fn read_from(data: &str) -> PartResult<Self> {
        let rest = data.strip_prefix(CHECKSUMS_FORMAT_HEADER).ok_or_else(|| {
            PartError::corrupted("checksums file is missing its version header")
        })?;
        let mut checksums = PartChecksums::default();
        for record in serde_json::Deserializer::from_str(rest).into_iter::<ChecksumRecord>() {
            let record = record?;
            checksums.files.insert(record.file, record.checksum);
        }
        Ok(checksums)
    }

    /// Writes `checksums.txt` into the part directory.
    pub fn save(&self, part_path: &Path) -> PartResult<()> {
        let path = part_path.join(CHECKSUMS_FILE_NAME);
        let file = fs::File::create(&path).path_context(&path)?;
        let mut out = BufWriter::new(file);
        self.write_to(&mut out)?;
        out.flush().path_context(&path)
    }

    pub fn load(part_path: &Path) -> PartResult<Self> {
        let path = part_path.join(CHECKSUMS_FILE_NAME);
        let data = fs::read_to_string(&path).path_context(&path)?;
        Self::read_from(&data)
    }

    /// Re-reads every listed artifact and checks its size and raw hash
    /// against the manifest.
    pub fn verify_part(&self, part_path: &Path) -> PartResult<()> {
        for (file, checksum) in &self.files {
            let path = part_path.join(file);
            let data = fs::read(&path).path_context(&path)?;
            if data.len() as u64 != checksum.file_size {
                return Err(PartError::corrupted(format!(
                    "{file}: size {} does not match manifest size {}",
                    data.len(),
                    checksum.file_size
                )));
            }
            let found = crc32fast::hash(&data) as u64;
            if found != checksum.file_hash {
                return Err(PartError::ChecksumMismatch {
                    file: file.clone(),
                    found,
                    expected: checksum.file_hash,
                });
            }
        }
        Ok(())
    }
}
