// Copyright 2026 Cairn Project Authors. Licensed under Apache-2.0.

//! In-memory column containers.
//!
//! A [`Column`] holds the values of one logical column for one block of rows.
//! Composite containers mirror the type tree: `Nullable` keeps a
//! byte-per-row null mask next to a dense values column (null slots hold the
//! default value), `Array` keeps cumulative element offsets next to a
//! flattened values column. Containers know how to serialize row ranges into
//! value streams and single rows into the primary index.

mod encode;

use std::io::{self, Write};

pub use encode::{read_var_u64, write_var_u64};

/// Fixed-width little-endian value encoding.
pub(crate) trait FixedWidthEncode: Copy {
    fn encode(&self, out: &mut impl Write) -> io::Result<()>;
}

macro_rules! impl_fixed_width_encode {
    ($($ty:ty),*) => {
        $(
            impl FixedWidthEncode for $ty {
                fn encode(&self, out: &mut impl Write) -> io::Result<()> {
                    out.write_all(&self.to_le_bytes())
                }
            }
        )*
    };
}

impl_fixed_width_encode! { u8, u16, u32, u64, i8, i16, i32, i64, f32, f64 }

fn write_fixed_slice<T: FixedWidthEncode>(values: &[T], out: &mut impl Write) -> io::Result<()> {
    for value in values {
        value.encode(out)?;
    }
    Ok(())
}

#[derive(Clone, Debug, PartialEq)]
pub enum Column {
    UInt8(Vec<u8>),
    UInt16(Vec<u16>),
    UInt32(Vec<u32>),
    UInt64(Vec<u64>),
    Int8(Vec<i8>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    String(Vec<std::string::String>),
    Nullable(NullableColumn),
    Array(ArrayColumn),
}

/// Null mask plus dense values. Mask byte `1` means null.
#[derive(Clone, Debug, PartialEq)]
pub struct NullableColumn {
    nulls: Vec<u8>,
    values: Box<Column>,
}

impl NullableColumn {
    pub fn new(nulls: Vec<u8>, values: Column) -> Self {
        assert_eq!(
            nulls.len(),
            values.len(),
            "null mask must cover the values column"
        );
        Self {
            nulls,
            values: Box::new(values),
        }
    }

    pub fn nulls(&self) -> &[u8] {
        &self.nulls
    }

    pub fn values(&self) -> &Column {
        &self.values
    }
}

/// Cumulative element offsets plus flattened values.
#[derive(Clone, Debug, PartialEq)]
pub struct ArrayColumn {
    offsets: Vec<u64>,
    values: Box<Column>,
}

impl ArrayColumn {
    pub fn from_sizes(sizes: Vec<u64>, values: Column) -> Self {
        let mut offsets = Vec::with_capacity(sizes.len());
        let mut total = 0u64;
        for size in sizes {
            total += size;
            offsets.push(total);
        }
        assert_eq!(
            total as usize,
            values.len(),
            "array sizes must cover the values column"
        );
        Self {
            offsets,
            values: Box::new(values),
        }
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn size_at(&self, row: usize) -> u64 {
        self.offsets[row] - if row == 0 { 0 } else { self.offsets[row - 1] }
    }

    /// Index of the first flattened value of `row`; `row == len()` gives the
    /// total value count.
    pub(crate) fn offset_at(&self, row: usize) -> usize {
        if row == 0 {
            0
        } else {
            self.offsets[row - 1] as usize
        }
    }

    pub fn values(&self) -> &Column {
        &self.values
    }
}

impl Column {
    pub fn nullable(nulls: Vec<u8>, values: Column) -> Column {
        Column::Nullable(NullableColumn::new(nulls, values))
    }

    pub fn array(sizes: Vec<u64>, values: Column) -> Column {
        Column::Array(ArrayColumn::from_sizes(sizes, values))
    }

    pub fn len(&self) -> usize {
        match self {
            Column::UInt8(v) => v.len(),
            Column::UInt16(v) => v.len(),
            Column::UInt32(v) => v.len(),
            Column::UInt64(v) => v.len(),
            Column::Int8(v) => v.len(),
            Column::Int16(v) => v.len(),
            Column::Int32(v) => v.len(),
            Column::Int64(v) => v.len(),
            Column::Float32(v) => v.len(),
            Column::Float64(v) => v.len(),
            Column::String(v) => v.len(),
            Column::Nullable(c) => c.nulls.len(),
            Column::Array(c) => c.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// An empty column of the same shape.
    pub fn empty_like(&self) -> Column {
        match self {
            Column::UInt8(_) => Column::UInt8(vec![]),
            Column::UInt16(_) => Column::UInt16(vec![]),
            Column::UInt32(_) => Column::UInt32(vec![]),
            Column::UInt64(_) => Column::UInt64(vec![]),
            Column::Int8(_) => Column::Int8(vec![]),
            Column::Int16(_) => Column::Int16(vec![]),
            Column::Int32(_) => Column::Int32(vec![]),
            Column::Int64(_) => Column::Int64(vec![]),
            Column::Float32(_) => Column::Float32(vec![]),
            Column::Float64(_) => Column::Float64(vec![]),
            Column::String(_) => Column::String(vec![]),
            Column::Nullable(c) => Column::Nullable(NullableColumn {
                nulls: vec![],
                values: Box::new(c.values.empty_like()),
            }),
            Column::Array(c) => Column::Array(ArrayColumn {
                offsets: vec![],
                values: Box::new(c.values.empty_like()),
            }),
        }
    }

    /// Deep-copies rows `[from, from + count)` of `src` onto the end of
    /// `self`. Panics if the containers do not share a shape.
    pub fn push_rows_from(&mut self, src: &Column, from: usize, count: usize) {
        match (self, src) {
            (Column::UInt8(dst), Column::UInt8(s)) => dst.extend_from_slice(&s[from..from + count]),
            (Column::UInt16(dst), Column::UInt16(s)) => {
                dst.extend_from_slice(&s[from..from + count])
            }
            (Column::UInt32(dst), Column::UInt32(s)) => {
                dst.extend_from_slice(&s[from..from + count])
            }
            (Column::UInt64(dst), Column::UInt64(s)) => {
                dst.extend_from_slice(&s[from..from + count])
            }
            (Column::Int8(dst), Column::Int8(s)) => dst.extend_from_slice(&s[from..from + count]),
            (Column::Int16(dst), Column::Int16(s)) => dst.extend_from_slice(&s[from..from + count]),
            (Column::Int32(dst), Column::Int32(s)) => dst.extend_from_slice(&s[from..from + count]),
            (Column::Int64(dst), Column::Int64(s)) => dst.extend_from_slice(&s[from..from + count]),
            (Column::Float32(dst), Column::Float32(s)) => {
                dst.extend_from_slice(&s[from..from + count])
            }
            (Column::Float64(dst), Column::Float64(s)) => {
                dst.extend_from_slice(&s[from..from + count])
            }
            (Column::String(dst), Column::String(s)) => {
                dst.extend(s[from..from + count].iter().cloned())
            }
            (Column::Nullable(dst), Column::Nullable(s)) => {
                dst.nulls.extend_from_slice(&s.nulls[from..from + count]);
                dst.values.push_rows_from(&s.values, from, count);
            }
            (Column::Array(dst), Column::Array(s)) => {
                let start = s.offset_at(from);
                let end = s.offset_at(from + count);
                let mut total = dst.offsets.last().copied().unwrap_or(0);
                for row in from..from + count {
                    total += s.size_at(row);
                    dst.offsets.push(total);
                }
                dst.values.push_rows_from(&s.values, start, end - start);
            }
            _ => panic!("column variant mismatch"),
        }
    }

    pub fn push_row_from(&mut self, src: &Column, row: usize) {
        self.push_rows_from(src, row, 1);
    }

    /// Deep permutation: row `i` of the result is row `permutation[i]` of
    /// `self`. Array payloads are regrouped, not aliased.
    pub fn permute(&self, permutation: &[u32]) -> Column {
        let mut out = self.empty_like();
        for &row in permutation {
            out.push_rows_from(self, row as usize, 1);
        }
        out
    }

    /// Serializes rows `[from, from + count)` in value-stream format. For an
    /// `Array` this is the flattened leaf values belonging to those rows; for
    /// a `Nullable` it is the dense values (the null mask travels in its own
    /// stream).
    pub fn serialize_slice(
        &self,
        from: usize,
        count: usize,
        out: &mut impl Write,
    ) -> io::Result<()> {
        match self {
            Column::UInt8(v) => out.write_all(&v[from..from + count]),
            Column::UInt16(v) => write_fixed_slice(&v[from..from + count], out),
            Column::UInt32(v) => write_fixed_slice(&v[from..from + count], out),
            Column::UInt64(v) => write_fixed_slice(&v[from..from + count], out),
            Column::Int8(v) => write_fixed_slice(&v[from..from + count], out),
            Column::Int16(v) => write_fixed_slice(&v[from..from + count], out),
            Column::Int32(v) => write_fixed_slice(&v[from..from + count], out),
            Column::Int64(v) => write_fixed_slice(&v[from..from + count], out),
            Column::Float32(v) => write_fixed_slice(&v[from..from + count], out),
            Column::Float64(v) => write_fixed_slice(&v[from..from + count], out),
            Column::String(v) => {
                for value in &v[from..from + count] {
                    write_var_u64(out, value.len() as u64)?;
                    out.write_all(value.as_bytes())?;
                }
                Ok(())
            }
            Column::Nullable(c) => c.values.serialize_slice(from, count, out),
            Column::Array(c) => {
                let start = c.offset_at(from);
                let end = c.offset_at(from + count);
                c.values.serialize_slice(start, end - start, out)
            }
        }
    }

    /// Serializes one full row in primary-index format: fixed width for
    /// primitives, varint-framed bytes for strings, a flag byte plus the
    /// value for nullables, a varint count plus the elements for arrays.
    pub fn serialize_row(&self, row: usize, out: &mut impl Write) -> io::Result<()> {
        match self {
            Column::UInt8(v) => v[row].encode(out),
            Column::UInt16(v) => v[row].encode(out),
            Column::UInt32(v) => v[row].encode(out),
            Column::UInt64(v) => v[row].encode(out),
            Column::Int8(v) => v[row].encode(out),
            Column::Int16(v) => v[row].encode(out),
            Column::Int32(v) => v[row].encode(out),
            Column::Int64(v) => v[row].encode(out),
            Column::Float32(v) => v[row].encode(out),
            Column::Float64(v) => v[row].encode(out),
            Column::String(v) => {
                write_var_u64(out, v[row].len() as u64)?;
                out.write_all(v[row].as_bytes())
            }
            Column::Nullable(c) => {
                out.write_all(&[c.nulls[row]])?;
                if c.nulls[row] == 0 {
                    c.values.serialize_row(row, out)?;
                }
                Ok(())
            }
            Column::Array(c) => {
                write_var_u64(out, c.size_at(row))?;
                let start = c.offset_at(row);
                for value_row in start..start + c.size_at(row) as usize {
                    c.values.serialize_row(value_row, out)?;
                }
                Ok(())
            }
        }
    }
}

macro_rules! impl_from_vec {
    ($({ $variant:ident, $ty:ty }),*) => {
        $(
            impl From<Vec<$ty>> for Column {
                fn from(values: Vec<$ty>) -> Self {
                    Column::$variant(values)
                }
            }
        )*
    };
}

impl_from_vec! {
    { UInt8, u8 },
    { UInt16, u16 },
    { UInt32, u32 },
    { UInt64, u64 },
    { Int8, i8 },
    { Int16, i16 },
    { Int32, i32 },
    { Int64, i64 },
    { Float32, f32 },
    { Float64, f64 },
    { String, std::string::String }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permute_primitive() {
        let column = Column::from(vec![3u32, 1, 2]);
        let permuted = column.permute(&[1, 2, 0]);
        assert_eq!(permuted, Column::from(vec![1u32, 2, 3]));
    }

    #[test]
    fn test_permute_array_regroups_values() {
        // rows: [10], [20, 21], []
        let column = Column::array(vec![1, 2, 0], Column::from(vec![10u8, 20, 21]));
        let permuted = column.permute(&[2, 1, 0]);
        assert_eq!(
            permuted,
            Column::array(vec![0, 2, 1], Column::from(vec![20u8, 21, 10]))
        );
    }

    #[test]
    fn test_permute_nullable() {
        let column = Column::nullable(vec![0, 1, 0], Column::from(vec![1i64, 0, 3]));
        let permuted = column.permute(&[2, 0, 1]);
        assert_eq!(
            permuted,
            Column::nullable(vec![0, 0, 1], Column::from(vec![3i64, 1, 0]))
        );
    }

    #[test]
    fn test_serialize_slice_primitive_range() {
        let column = Column::from(vec![1u32, 2, 3, 4]);
        let mut buf = vec![];
        column.serialize_slice(1, 2, &mut buf).unwrap();
        assert_eq!(buf, [2, 0, 0, 0, 3, 0, 0, 0]);
    }

    #[test]
    fn test_serialize_slice_array_maps_to_leaf_values() {
        // rows: [10, 11], [20], [30, 31, 32]
        let column = Column::array(vec![2, 1, 3], Column::from(vec![10u8, 11, 20, 30, 31, 32]));
        let mut buf = vec![];
        column.serialize_slice(1, 2, &mut buf).unwrap();
        assert_eq!(buf, [20, 30, 31, 32]);
    }

    #[test]
    fn test_serialize_slice_string_varint_framing() {
        let column = Column::from(vec!["ab".to_string(), "".to_string()]);
        let mut buf = vec![];
        column.serialize_slice(0, 2, &mut buf).unwrap();
        assert_eq!(buf, [2, b'a', b'b', 0]);
    }

    #[test]
    fn test_serialize_row_nullable_and_array() {
        let column = Column::nullable(vec![0, 1], Column::from(vec![7u16, 0]));
        let mut buf = vec![];
        column.serialize_row(0, &mut buf).unwrap();
        assert_eq!(buf, [0, 7, 0]);
        buf.clear();
        column.serialize_row(1, &mut buf).unwrap();
        assert_eq!(buf, [1]);

        let column = Column::array(vec![2, 1], Column::from(vec![5u8, 6, 7]));
        buf.clear();
        column.serialize_row(0, &mut buf).unwrap();
        assert_eq!(buf, [2, 5, 6]);
    }

    #[test]
    fn test_push_row_from_builds_index_rows() {
        let source = Column::array(vec![1, 2], Column::from(vec![9u64, 8, 7]));
        let mut sink = source.empty_like();
        sink.push_row_from(&source, 1);
        assert_eq!(sink, Column::array(vec![2], Column::from(vec![8u64, 7])));
    }

    #[test]
    #[should_panic(expected = "column variant mismatch")]
    fn test_push_rows_from_mismatch_panics() {
        let mut sink = Column::from(vec![1u8]);
        sink.push_rows_from(&Column::from(vec![1u32]), 0, 1);
    }
}
