//! Static field-to-column descriptors
//!
//! Every persisted type declares the columns it writes. Rows are projected
//! through the descriptor before they reach a storage backend, so both backends
//! store the same shape and the mapping can be inspected as plain data.

use crate::domain::record::{from_record, to_record, Record};
use crate::domain::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Column list of one persisted record type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordDescriptor {
    /// Type name, for diagnostics
    pub name: &'static str,
    /// Identity column
    pub key: &'static str,
    /// Every column written by the type, key included
    pub columns: &'static [&'static str],
}

impl RecordDescriptor {
    /// Full row: every declared column, absent fields as null
    pub fn project(&self, record: &Record) -> Record {
        self.columns
            .iter()
            .map(|column| {
                let value = record.get(*column).cloned().unwrap_or(Value::Null);
                (column.to_string(), value)
            })
            .collect()
    }

    /// Partial row: declared columns present in the record, for `$set`-style updates
    pub fn project_present(&self, record: &Record) -> Record {
        self.columns
            .iter()
            .filter_map(|column| {
                record
                    .get(*column)
                    .map(|value| (column.to_string(), value.clone()))
            })
            .collect()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains(&column)
    }
}

/// A type stored through a [`RecordDescriptor`]
pub trait Persisted: Serialize + DeserializeOwned {
    const DESCRIPTOR: RecordDescriptor;

    /// Serializes into a full row
    fn to_row(&self) -> Result<Record> {
        Ok(Self::DESCRIPTOR.project(&to_record(self)?))
    }

    /// Decodes a row, ignoring undeclared columns such as backend ids
    fn from_row(row: Record) -> Result<Self> {
        from_record(Self::DESCRIPTOR.project_present(&row))
    }
}
