// Copyright 2026 Cairn Project Authors. Licensed under Apache-2.0.

//! The part's column descriptor, `columns.txt`:
//!
//! ```plain
//! columns format version: 1
//! 2 columns:
//! `n` UInt32
//! `t.x` Array(UInt8)
//! ```
//!
//! Names are backtick-quoted with `\` escapes; types use the canonical
//! grammar. Readers recover the exact column list from this file.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{IoResultExt, PartError, PartResult};
use crate::types::ColumnDesc;

pub const COLUMNS_FILE_NAME: &str = "columns.txt";

const COLUMNS_FORMAT_HEADER: &str = "columns format version: 1";

pub fn save_columns(part_path: &Path, columns: &[ColumnDesc]) -> PartResult<()> {
    let path = part_path.join(COLUMNS_FILE_NAME);
    let file = fs::File::create(&path).path_context(&path)?;
    let mut out = BufWriter::new(file);
    writeln!(out, "{COLUMNS_FORMAT_HEADER}")?;
    writeln!(out, "{} columns:", columns.len())?;
    for column in columns {
        writeln!(out, "{} {}", quote_name(&column.name), column.data_type)?;
    }
    out.flush().path_context(&path)
}

pub fn load_columns(part_path: &Path) -> PartResult<Vec<ColumnDesc>> {
    let path = part_path.join(COLUMNS_FILE_NAME);
    let data = fs::read_to_string(&path).path_context(&path)?;
    let mut lines = data.lines();
    if lines.next() != Some(COLUMNS_FORMAT_HEADER) {
        return Err(PartError::corrupted(
            "columns file is missing its version header",
        ));
    }
    let count_line = lines
        .next()
        .ok_or_else(|| PartError::corrupted("columns file is missing its count line"))?;
    let count: usize = count_line
        .strip_suffix(" columns:")
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| {
            PartError::corrupted(format!("malformed columns count line: {count_line:?}"))
        })?;

    let mut columns = Vec::with_capacity(count);
    for line in lines {
        let (name, type_text) = unquote_name(line)?;
        columns.push(ColumnDesc::new(name, type_text.trim().parse()?));
    }
    if columns.len() != count {
        return Err(PartError::corrupted(format!(
            "columns file declares {count} columns, found {}",
            columns.len()
        )));
    }
    Ok(columns)
}

fn quote_name(name: &str) -> String {
    let mut quoted = String::with_capacity(name.len() + 2);
    quoted.push('`');
    for c in name.chars() {
        if c == '`' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('`');
    quoted
}

/// Splits a descriptor line into the unquoted name and the trailing type text.
fn unquote_name(line: &str) -> PartResult<(String, &str)> {
    let malformed = || PartError::corrupted(format!("malformed columns line: {line:?}"));
    let rest = line.strip_prefix('`').ok_or_else(malformed)?;
    let mut name = String::new();
    let mut chars = rest.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => {
                let (_, escaped) = chars.next().ok_or_else(malformed)?;
                name.push(escaped);
            }
            '`' => return Ok((name, &rest[i + 1..])),
            _ => name.push(c),
        }
    }
    Err(malformed())
}
