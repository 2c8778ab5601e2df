//! Core data types for captured rows, records, and capture errors.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

/// Display form of [`FieldValue::Unavailable`].
pub const UNAVAILABLE: &str = "N/A";

/// A single extracted cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    /// The column could not be read for this row.
    Unavailable,
}

impl FieldValue {
    pub fn is_available(&self) -> bool {
        !matches!(self, FieldValue::Unavailable)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Number(n) => write!(f, "{n}"),
            FieldValue::Unavailable => f.write_str(UNAVAILABLE),
        }
    }
}

/// Ordered column names shared by every record of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    columns: Vec<String>,
}

impl Schema {
    /// Build a schema, rejecting an empty column list and duplicate names.
    pub fn new<I, S>(columns: I) -> CaptureResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        if columns.is_empty() {
            return Err(CaptureError::InvalidPlan("at least one column is required".into()));
        }
        let mut seen = HashSet::new();
        for name in &columns {
            if !seen.insert(name.as_str()) {
                return Err(CaptureError::InvalidPlan(format!("duplicate column name: {name}")));
            }
        }
        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

/// One captured row: a value for every column of its schema, in schema order.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    schema: Arc<Schema>,
    values: Vec<FieldValue>,
}

impl Record {
    /// Build a record. The value count must match the schema exactly.
    pub fn new(schema: Arc<Schema>, values: Vec<FieldValue>) -> CaptureResult<Self> {
        if values.len() != schema.len() {
            return Err(CaptureError::RecordShape {
                values: values.len(),
                columns: schema.len(),
            });
        }
        Ok(Self { schema, values })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.schema.position(column).map(|i| &self.values[i])
    }

    pub fn values(&self) -> &[FieldValue] {
        &self.values
    }

    /// `(column, value)` pairs in schema order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.schema
            .columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, value) in self.fields() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Append-only, ordered sequence of records.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RecordBatch {
    records: Vec<Record>,
}

impl RecordBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    /// Move every record of `other` onto the end of this batch.
    pub fn extend(&mut self, other: RecordBatch) {
        self.records.extend(other.records);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}

impl<'a> IntoIterator for &'a RecordBatch {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Opaque reference to one rendered row, valid for a single capture cycle.
///
/// Handles are minted by a [`LiveDocument`](crate::document::LiveDocument)
/// when it enumerates rows. Each enumeration starts a new generation and
/// adapters refuse handles from older generations, so a handle cannot be
/// carried across a loader action. Deliberately neither `Clone` nor `Copy`.
#[derive(Debug, PartialEq, Eq)]
pub struct RowHandle {
    generation: u64,
    index: usize,
}

impl RowHandle {
    pub fn new(generation: u64, index: usize) -> Self {
        Self { generation, index }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Position of the row in document order within its generation.
    pub fn index(&self) -> usize {
        self.index
    }
}

/// Where the table's rows live in the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowScope {
    /// Selector for the table's content container.
    pub container: String,
    /// Selector for rows, evaluated inside the container.
    pub rows: String,
}

impl RowScope {
    pub fn new(container: impl Into<String>, rows: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            rows: rows.into(),
        }
    }
}

/// Preset cycle bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureProfile {
    /// Quick diagnostic pass.
    Fast,
    /// Full capture.
    #[default]
    Complete,
}

impl CaptureProfile {
    pub fn max_cycles(self) -> u32 {
        match self {
            CaptureProfile::Fast => 2,
            CaptureProfile::Complete => 20,
        }
    }
}

/// Errors that abort a capture session.
///
/// Field-level extraction problems never show up here; they become
/// [`FieldValue::Unavailable`] in the affected record.
#[derive(thiserror::Error, Debug)]
pub enum CaptureError {
    #[error("Document error: {0}")]
    Document(String),

    #[error("Row container not found: {0}")]
    ContainerMissing(String),

    #[error("Stale row handle: generation {handle} used after generation {current} was enumerated")]
    StaleHandle { handle: u64, current: u64 },

    #[error("Loader control not found: {0}")]
    LoaderControlMissing(String),

    #[error("Invalid capture plan: {0}")]
    InvalidPlan(String),

    #[error("Record has {values} values for {columns} columns")]
    RecordShape { values: usize, columns: usize },
}

/// Convenience result type.
pub type CaptureResult<T> = Result<T, CaptureError>;
