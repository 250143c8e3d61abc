// Copyright 2026 Cairn Project Authors. Licensed under Apache-2.0.

//! The logical type algebra of columns stored in a part.
//!
//! A type is a tree over primitives, `Nullable`, `Array` and `Nested`.
//! `Nested` never reaches the writer directly: [`flatten_nested`] rewrites it
//! into sibling `Array` columns named `<column>.<field>`, which is also how
//! such columns appear on disk.

use std::fmt;
use std::str::FromStr;

use crate::column::{ArrayColumn, Column, NullableColumn};
use crate::error::{PartError, PartResult};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DataType {
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    String,
    Nullable(Box<DataType>),
    Array(Box<DataType>),
    Nested(Vec<ColumnDesc>),
}

impl DataType {
    pub fn nullable(self) -> DataType {
        DataType::Nullable(Box::new(self))
    }

    pub fn array(self) -> DataType {
        DataType::Array(Box::new(self))
    }

    /// An empty column container of this type.
    pub fn empty_column(&self) -> Column {
        match self {
            DataType::UInt8 => Column::UInt8(vec![]),
            DataType::UInt16 => Column::UInt16(vec![]),
            DataType::UInt32 => Column::UInt32(vec![]),
            DataType::UInt64 => Column::UInt64(vec![]),
            DataType::Int8 => Column::Int8(vec![]),
            DataType::Int16 => Column::Int16(vec![]),
            DataType::Int32 => Column::Int32(vec![]),
            DataType::Int64 => Column::Int64(vec![]),
            DataType::Float32 => Column::Float32(vec![]),
            DataType::Float64 => Column::Float64(vec![]),
            DataType::String => Column::String(vec![]),
            DataType::Nullable(inner) => {
                Column::Nullable(NullableColumn::new(vec![], inner.empty_column()))
            }
            DataType::Array(inner) => {
                Column::Array(ArrayColumn::from_sizes(vec![], inner.empty_column()))
            }
            DataType::Nested(_) => panic!("Nested columns must be flattened before writing"),
        }
    }

    /// Checks that the writer can lay this type out on disk.
    ///
    /// `Nullable` may wrap anything except another `Nullable`, but may not
    /// appear strictly inside an `Array`: the null-map stream runs the same
    /// granularity loop as its sibling streams, so its row count must equal
    /// the top-level row count.
    pub fn validate_for_write(&self) -> PartResult<()> {
        self.validate_at(false)
    }

    fn validate_at(&self, inside_array: bool) -> PartResult<()> {
        match self {
            DataType::Nullable(inner) => {
                if inside_array {
                    return Err(PartError::bad_arguments(format!(
                        "Nullable inside Array is not supported: {self}"
                    )));
                }
                if matches!(**inner, DataType::Nullable(_)) {
                    return Err(PartError::bad_arguments(format!(
                        "Nullable cannot contain Nullable: {self}"
                    )));
                }
                inner.validate_at(false)
            }
            DataType::Array(inner) => inner.validate_at(true),
            DataType::Nested(_) => Err(PartError::bad_arguments(format!(
                "Nested columns must be flattened before writing: {self}"
            ))),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::UInt8 => write!(f, "UInt8"),
            DataType::UInt16 => write!(f, "UInt16"),
            DataType::UInt32 => write!(f, "UInt32"),
            DataType::UInt64 => write!(f, "UInt64"),
            DataType::Int8 => write!(f, "Int8"),
            DataType::Int16 => write!(f, "Int16"),
            DataType::Int32 => write!(f, "Int32"),
            DataType::Int64 => write!(f, "Int64"),
            DataType::Float32 => write!(f, "Float32"),
            DataType::Float64 => write!(f, "Float64"),
            DataType::String => write!(f, "String"),
            DataType::Nullable(inner) => write!(f, "Nullable({inner})"),
            DataType::Array(inner) => write!(f, "Array({inner})"),
            DataType::Nested(fields) => {
                write!(f, "Nested(")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} {}", field.name, field.data_type)?;
                }
                write!(f, ")")
            }
        }
    }
}

impl FromStr for DataType {
    type Err = PartError;

    fn from_str(s: &str) -> PartResult<Self> {
        let mut parser = TypeParser { rest: s.trim() };
        let data_type = parser.parse_type()?;
        if !parser.rest.is_empty() {
            return Err(PartError::corrupted(format!(
                "trailing characters after type: {:?}",
                parser.rest
            )));
        }
        Ok(data_type)
    }
}

struct TypeParser<'a> {
    rest: &'a str,
}

impl<'a> TypeParser<'a> {
    fn parse_type(&mut self) -> PartResult<DataType> {
        let word = self.take_word()?;
        Ok(match word {
            "UInt8" => DataType::UInt8,
            "UInt16" => DataType::UInt16,
            "UInt32" => DataType::UInt32,
            "UInt64" => DataType::UInt64,
            "Int8" => DataType::Int8,
            "Int16" => DataType::Int16,
            "Int32" => DataType::Int32,
            "Int64" => DataType::Int64,
            "Float32" => DataType::Float32,
            "Float64" => DataType::Float64,
            "String" => DataType::String,
            "Nullable" => {
                self.expect('(')?;
                let inner = self.parse_type()?;
                self.expect(')')?;
                inner.nullable()
            }
            "Array" => {
                self.expect('(')?;
                let inner = self.parse_type()?;
                self.expect(')')?;
                inner.array()
            }
            "Nested" => {
                self.expect('(')?;
                let mut fields = vec![];
                loop {
                    self.skip_spaces();
                    let name = self.take_word()?;
                    self.skip_spaces();
                    let data_type = self.parse_type()?;
                    fields.push(ColumnDesc::new(name, data_type));
                    self.skip_spaces();
                    if self.rest.starts_with(',') {
                        self.rest = &self.rest[1..];
                        continue;
                    }
                    break;
                }
                self.expect(')')?;
                DataType::Nested(fields)
            }
            other => {
                return Err(PartError::corrupted(format!("unknown type name: {other:?}")));
            }
        })
    }

    fn take_word(&mut self) -> PartResult<&'a str> {
        let end = self
            .rest
            .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
            .unwrap_or(self.rest.len());
        if end == 0 {
            return Err(PartError::corrupted(format!(
                "expected a type name at {:?}",
                self.rest
            )));
        }
        let (word, rest) = self.rest.split_at(end);
        self.rest = rest;
        Ok(word)
    }

    fn expect(&mut self, c: char) -> PartResult<()> {
        if let Some(rest) = self.rest.strip_prefix(c) {
            self.rest = rest;
            Ok(())
        } else {
            Err(PartError::corrupted(format!(
                "expected {c:?} at {:?}",
                self.rest
            )))
        }
    }

    fn skip_spaces(&mut self) {
        self.rest = self.rest.trim_start();
    }
}

/// A logical column: name plus type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnDesc {
    pub name: String,
    pub data_type: DataType,
}

impl ColumnDesc {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// Rewrites `Nested` columns into the sibling `Array` columns they are stored
/// as: `Nested(x T, y U)` under name `n` becomes `n.x Array(T)`, `n.y Array(U)`.
pub fn flatten_nested(columns: &[ColumnDesc]) -> Vec<ColumnDesc> {
    let mut flat = Vec::with_capacity(columns.len());
    for column in columns {
        match &column.data_type {
            DataType::Nested(fields) => {
                for field in fields {
                    flat.push(ColumnDesc::new(
                        format!("{}.{}", column.name, field.name),
                        field.data_type.clone().array(),
                    ));
                }
            }
            _ => flat.push(column.clone()),
        }
    }
    flat
}

/// The nested root of a column name: everything before the final dotted
/// suffix. Sibling columns of one `Nested` group share a root and therefore
/// share their array-sizes streams.
pub fn nested_root(name: &str) -> &str {
    name.rsplit_once('.').map_or(name, |(root, _)| root)
}
