//! Columnar in-memory table shared by the checker, the feature engine and the split validator.
//!
//! A [`Frame`] holds named, equal-length columns of one of three kinds:
//! - `Key`: text entity attributes (e.g. `sku`), used for grouping
//! - `Date`: calendar days
//! - `Number`: `f64` measurements and derived features, `NaN` = undefined
//!
//! Per-entity work goes through [`Frame::partition_by_entity`], which yields every
//! entity's row positions in date order. Iterating the partition map gives the
//! global (entity, date) order used when results are merged back.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnKind {
    Key,
    Date,
    Number,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnData {
    Key(Vec<String>),
    Date(Vec<NaiveDate>),
    Number(Vec<f64>),
}

impl ColumnData {
    pub fn kind(&self) -> ColumnKind {
        match self {
            Self::Key(_) => ColumnKind::Key,
            Self::Date(_) => ColumnKind::Date,
            Self::Number(_) => ColumnKind::Number,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Key(values) => values.len(),
            Self::Date(values) => values.len(),
            Self::Number(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn take(&self, indices: &[usize]) -> Self {
        match self {
            Self::Key(values) => Self::Key(indices.iter().map(|&i| values[i].clone()).collect()),
            Self::Date(values) => Self::Date(indices.iter().map(|&i| values[i]).collect()),
            Self::Number(values) => Self::Number(indices.iter().map(|&i| values[i]).collect()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn key(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Key(values),
        }
    }

    pub fn date(name: impl Into<String>, values: Vec<NaiveDate>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Date(values),
        }
    }

    pub fn number(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Number(values),
        }
    }
}

/// Values of the grouping columns for one entity, in grouping-column order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityKey(pub Vec<String>);

impl EntityKey {
    pub fn values(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("column '{column}' not found")]
    MissingColumn { column: String },
    #[error("column '{column}' has kind {actual:?}, expected {expected:?}")]
    ColumnKind {
        column: String,
        expected: ColumnKind,
        actual: ColumnKind,
    },
    #[error("column '{column}' has {found} rows, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        found: usize,
    },
    #[error("duplicate column name '{0}'")]
    DuplicateColumn(String),
}

/// Failure of a feature or continuity transform. The underlying cause is kept as `source`.
#[derive(Debug, Error)]
pub enum ComputationError {
    #[error("{transform} failed: {source}")]
    Transform {
        transform: &'static str,
        #[source]
        source: FrameError,
    },
    #[error("{transform} requires a non-empty frame")]
    EmptyFrame { transform: &'static str },
    #[error("invalid feature config: {0}")]
    InvalidConfig(String),
    #[error("schema version mismatch: expected {expected}, got {actual}")]
    SchemaVersionMismatch { expected: u32, actual: u32 },
    #[error("schema fingerprint mismatch: expected {expected}, got {actual}")]
    SchemaFingerprintMismatch { expected: String, actual: String },
}

impl ComputationError {
    pub fn transform(transform: &'static str) -> impl FnOnce(FrameError) -> Self {
        move |source| Self::Transform { transform, source }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    columns: Vec<Column>,
    len: usize,
}

impl Frame {
    pub fn new(columns: Vec<Column>) -> Result<Self, FrameError> {
        let len = columns.first().map(|c| c.data.len()).unwrap_or(0);
        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(FrameError::DuplicateColumn(column.name.clone()));
            }
            if column.data.len() != len {
                return Err(FrameError::LengthMismatch {
                    column: column.name.clone(),
                    expected: len,
                    found: column.data.len(),
                });
            }
        }
        Ok(Self { columns, len })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Result<&Column, FrameError> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| FrameError::MissingColumn {
                column: name.to_string(),
            })
    }

    pub fn keys(&self, name: &str) -> Result<&[String], FrameError> {
        match &self.column(name)?.data {
            ColumnData::Key(values) => Ok(values),
            other => Err(kind_mismatch(name, ColumnKind::Key, other)),
        }
    }

    pub fn dates(&self, name: &str) -> Result<&[NaiveDate], FrameError> {
        match &self.column(name)?.data {
            ColumnData::Date(values) => Ok(values),
            other => Err(kind_mismatch(name, ColumnKind::Date, other)),
        }
    }

    pub fn numbers(&self, name: &str) -> Result<&[f64], FrameError> {
        match &self.column(name)?.data {
            ColumnData::Number(values) => Ok(values),
            other => Err(kind_mismatch(name, ColumnKind::Number, other)),
        }
    }

    /// Appends `column`, or replaces an existing column of the same name in place.
    pub fn set_column(&mut self, column: Column) -> Result<(), FrameError> {
        if self.columns.is_empty() {
            self.len = column.data.len();
        } else if column.data.len() != self.len {
            return Err(FrameError::LengthMismatch {
                column: column.name,
                expected: self.len,
                found: column.data.len(),
            });
        }

        match self.columns.iter_mut().find(|c| c.name == column.name) {
            Some(existing) => *existing = column,
            None => self.columns.push(column),
        }
        Ok(())
    }

    /// New frame holding the rows at `indices`, in that order.
    pub fn take(&self, indices: &[usize]) -> Frame {
        Frame {
            columns: self
                .columns
                .iter()
                .map(|c| Column {
                    name: c.name.clone(),
                    data: c.data.take(indices),
                })
                .collect(),
            len: indices.len(),
        }
    }

    /// Projection onto `names`, in that order.
    pub fn select(&self, names: &[&str]) -> Result<Frame, FrameError> {
        let columns = names
            .iter()
            .map(|name| self.column(name).cloned())
            .collect::<Result<Vec<_>, _>>()?;
        Frame::new(columns)
    }

    pub fn filter_rows(&self, mut keep: impl FnMut(usize) -> bool) -> Frame {
        let indices: Vec<usize> = (0..self.len).filter(|&row| keep(row)).collect();
        self.take(&indices)
    }

    /// Row-wise entity keys. No grouping columns puts every row in one entity.
    pub fn entity_keys(&self, group_columns: &[&str]) -> Result<Vec<EntityKey>, FrameError> {
        let key_columns = group_columns
            .iter()
            .map(|name| self.keys(name))
            .collect::<Result<Vec<_>, _>>()?;

        Ok((0..self.len)
            .map(|row| EntityKey(key_columns.iter().map(|col| col[row].clone()).collect()))
            .collect())
    }

    /// Entity → row positions sorted by date ascending (stable for equal dates).
    pub fn partition_by_entity(
        &self,
        group_columns: &[&str],
        date_column: &str,
    ) -> Result<BTreeMap<EntityKey, Vec<usize>>, FrameError> {
        let dates = self.dates(date_column)?;
        let keys = self.entity_keys(group_columns)?;

        let mut partitions: BTreeMap<EntityKey, Vec<usize>> = BTreeMap::new();
        for (row, key) in keys.into_iter().enumerate() {
            partitions.entry(key).or_default().push(row);
        }
        for rows in partitions.values_mut() {
            rows.sort_by_key(|&row| dates[row]);
        }
        Ok(partitions)
    }

    pub fn sort_by_entity_and_date(
        &self,
        group_columns: &[&str],
        date_column: &str,
    ) -> Result<Frame, FrameError> {
        let order: Vec<usize> = self
            .partition_by_entity(group_columns, date_column)?
            .into_values()
            .flatten()
            .collect();
        Ok(self.take(&order))
    }
}

fn kind_mismatch(name: &str, expected: ColumnKind, actual: &ColumnData) -> FrameError {
    FrameError::ColumnKind {
        column: name.to_string(),
        expected,
        actual: actual.kind(),
    }
}
