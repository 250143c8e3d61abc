// Copyright 2026 Cairn Project Authors. Licensed under Apache-2.0.

//! Reversible mapping from logical column names to file names.
//!
//! Any byte outside `[A-Za-z0-9_]` is replaced by `%XX` (uppercase hex, one
//! escape per UTF-8 byte). Readers rely on the exact mapping to recover
//! logical names from a part directory.

use crate::error::{PartError, PartResult};

pub fn escape_for_file_name(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len());
    for &byte in name.as_bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' {
            escaped.push(byte as char);
        } else {
            escaped.push_str(&format!("%{byte:02X}"));
        }
    }
    escaped
}

pub fn unescape_for_file_name(escaped: &str) -> PartResult<String> {
    let mut bytes = Vec::with_capacity(escaped.len());
    let mut rest = escaped.as_bytes();
    while let Some((&first, tail)) = rest.split_first() {
        if first == b'%' {
            let [hi, lo] = tail.first_chunk::<2>().ok_or_else(|| {
                PartError::corrupted(format!("truncated escape in file name {escaped:?}"))
            })?;
            let decode = |c: u8| {
                (c as char)
                    .to_digit(16)
                    .ok_or_else(|| {
                        PartError::corrupted(format!("invalid escape in file name {escaped:?}"))
                    })
                    .map(|d| d as u8)
            };
            bytes.push((decode(*hi)? << 4) | decode(*lo)?);
            rest = &tail[2..];
        } else {
            bytes.push(first);
            rest = tail;
        }
    }
    String::from_utf8(bytes)
        .map_err(|_| PartError::corrupted(format!("file name {escaped:?} is not valid UTF-8")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_names_pass_through() {
        assert_eq!(escape_for_file_name("value_1"), "value_1");
    }

    #[test]
    fn test_special_characters() {
        assert_eq!(escape_for_file_name("t.x"), "t%2Ex");
        assert_eq!(escape_for_file_name("a/b"), "a%2Fb");
        assert_eq!(escape_for_file_name("a%b"), "a%25b");
        assert_eq!(escape_for_file_name("a b"), "a%20b");
    }

    #[test]
    fn test_multibyte_round_trip() {
        for name in ["цена", "t.x", "a%b", "tab\there", "весь.мир"] {
            let escaped = escape_for_file_name(name);
            assert!(escaped
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'%'));
            assert_eq!(unescape_for_file_name(&escaped).unwrap(), name);
        }
    }

    #[test]
    fn test_unescape_rejects_truncated() {
        assert!(unescape_for_file_name("a%2").is_err());
        assert!(unescape_for_file_name("a%zz").is_err());
    }
}
