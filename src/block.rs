// Copyright 2026 Cairn Project Authors. Licensed under Apache-2.0.

//! The writer's input batch: an ordered set of named, typed columns with a
//! uniform row count.

use itertools::Itertools;

use crate::column::Column;
use crate::error::{PartError, PartResult};
use crate::types::DataType;

#[derive(Clone, Debug)]
pub struct BlockColumn {
    pub name: String,
    pub data_type: DataType,
    pub column: Column,
}

impl BlockColumn {
    pub fn new(name: impl Into<String>, data_type: DataType, column: Column) -> Self {
        Self {
            name: name.into(),
            data_type,
            column,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Block {
    columns: Vec<BlockColumn>,
}

impl Block {
    pub fn new(columns: Vec<BlockColumn>) -> PartResult<Self> {
        if let Some((a, b)) = columns.iter().tuple_windows().find(|(a, b)| {
            a.column.len() != b.column.len()
        }) {
            return Err(PartError::bad_arguments(format!(
                "block columns differ in row count: {} has {}, {} has {}",
                a.name,
                a.column.len(),
                b.name,
                b.column.len()
            )));
        }
        Ok(Self { columns })
    }

    pub fn rows(&self) -> usize {
        self.columns.first().map_or(0, |c| c.column.len())
    }

    pub fn columns(&self) -> &[BlockColumn] {
        &self.columns
    }

    pub fn get_by_name(&self, name: &str) -> Option<&BlockColumn> {
        self.columns.iter().find(|c| c.name == name)
    }
}
