//! Snapshot payloads and their on-disk formats.

use polars::prelude::{DataFrame, DataType};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{DataError, Result};

/// Name of the date index column of tabular payloads.
pub const DATE_INDEX: &str = "date";

/// Serialization format of a snapshot, fixed per dataset type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SnapshotFormat {
    /// Delimited text with a header row (`.csv`).
    Tabular,
    /// UTF-8 encoded JSON text (`.json`).
    Document,
}

impl SnapshotFormat {
    /// File extension, without the leading dot.
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Tabular => "csv",
            Self::Document => "json",
        }
    }

    /// Maps a file extension back to a format.
    ///
    /// # Errors
    /// Returns [`DataError::UnsupportedFormat`] for unrecognized extensions.
    pub fn from_extension(extension: &str) -> Result<Self> {
        match extension {
            "csv" => Ok(Self::Tabular),
            "json" => Ok(Self::Document),
            other => Err(DataError::UnsupportedFormat(format!(
                "Unsupported file extension: .{other}"
            ))),
        }
    }

    /// Determines the format of a snapshot file from its extension.
    ///
    /// # Errors
    /// Returns [`DataError::UnsupportedFormat`] when the extension is missing or unknown.
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| {
                DataError::UnsupportedFormat(format!(
                    "Snapshot has no file extension: {}",
                    path.display()
                ))
            })?;
        Self::from_extension(extension)
    }
}

/// A tabular payload: a DataFrame with an optional named date index.
///
/// When the index is set, the index column is persisted as the first column.
#[derive(Clone, Debug, Default)]
pub struct Table {
    frame: DataFrame,
    index: Option<String>,
}

impl Table {
    /// Wraps a frame without an index.
    #[must_use]
    pub const fn new(frame: DataFrame) -> Self {
        Self { frame, index: None }
    }

    /// Wraps a frame whose `date` column is its index.
    ///
    /// # Errors
    /// Returns [`DataError::InvalidParameter`] if the frame has no `date` column.
    pub fn with_date_index(frame: DataFrame) -> Result<Self> {
        if frame.column(DATE_INDEX).is_err() {
            return Err(DataError::InvalidParameter(format!(
                "Frame has no '{DATE_INDEX}' column to use as index"
            )));
        }
        Ok(Self {
            frame,
            index: Some(DATE_INDEX.to_string()),
        })
    }

    /// An explicitly empty table (no rows, no columns).
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// The underlying frame.
    #[must_use]
    pub const fn frame(&self) -> &DataFrame {
        &self.frame
    }

    /// Consumes the table and returns the frame.
    #[must_use]
    pub fn into_frame(self) -> DataFrame {
        self.frame
    }

    /// Name of the index column, if any.
    #[must_use]
    pub fn index(&self) -> Option<&str> {
        self.index.as_deref()
    }

    /// Number of rows.
    #[must_use]
    pub fn height(&self) -> usize {
        self.frame.height()
    }

    /// Returns true if the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }

    /// Returns the frame with the index column moved to the front.
    ///
    /// # Errors
    /// Returns [`DataError::Cache`] if the column selection fails.
    pub fn to_persisted_frame(&self) -> Result<DataFrame> {
        let Some(index) = &self.index else {
            return Ok(self.frame.clone());
        };
        let names: Vec<String> = std::iter::once(index.clone())
            .chain(
                self.frame
                    .get_column_names()
                    .into_iter()
                    .map(|n| n.to_string())
                    .filter(|n| n != index),
            )
            .collect();
        self.frame.select(names).map_err(DataError::cache)
    }

    /// Rebuilds a table from a frame read back from disk.
    ///
    /// A leading `date` column becomes the index; string dates are cast to
    /// the `Date` type when they parse.
    #[must_use]
    pub fn from_persisted_frame(frame: DataFrame) -> Self {
        let leading_date = frame
            .get_column_names()
            .first()
            .is_some_and(|n| n.as_str() == DATE_INDEX);
        if frame.height() == 0 || !leading_date {
            return Self::new(frame);
        }

        let frame = match frame.column(DATE_INDEX).map(|c| c.dtype().clone()) {
            Ok(DataType::String) => {
                let mut cast = frame.clone();
                match frame
                    .column(DATE_INDEX)
                    .and_then(|c| c.strict_cast(&DataType::Date))
                    .and_then(|c| cast.with_column(c).map(|_| ()))
                {
                    Ok(()) => cast,
                    Err(_) => frame,
                }
            }
            _ => frame,
        };

        Self {
            frame,
            index: Some(DATE_INDEX.to_string()),
        }
    }
}

impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.frame.equals_missing(&other.frame)
    }
}

impl From<DataFrame> for Table {
    fn from(frame: DataFrame) -> Self {
        Self::new(frame)
    }
}

/// Data held by one snapshot.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    /// Tabular data, persisted as CSV.
    Table(Table),
    /// A structured document, persisted as JSON.
    Document(serde_json::Value),
}

impl Payload {
    /// The format this payload serializes to.
    #[must_use]
    pub const fn format(&self) -> SnapshotFormat {
        match self {
            Self::Table(_) => SnapshotFormat::Tabular,
            Self::Document(_) => SnapshotFormat::Document,
        }
    }

    /// Returns the table, or an error if this is a document.
    ///
    /// # Errors
    /// Returns [`DataError::UnsupportedFormat`] for document payloads.
    pub fn into_table(self) -> Result<Table> {
        match self {
            Self::Table(table) => Ok(table),
            Self::Document(_) => Err(DataError::UnsupportedFormat(
                "Expected a tabular payload, found a document".to_string(),
            )),
        }
    }

    /// Returns the document, or an error if this is a table.
    ///
    /// # Errors
    /// Returns [`DataError::UnsupportedFormat`] for tabular payloads.
    pub fn into_document(self) -> Result<serde_json::Value> {
        match self {
            Self::Document(value) => Ok(value),
            Self::Table(_) => Err(DataError::UnsupportedFormat(
                "Expected a document payload, found a table".to_string(),
            )),
        }
    }
}

impl From<Table> for Payload {
    fn from(table: Table) -> Self {
        Self::Table(table)
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Self::Document(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    #[test]
    fn test_extension_dispatch() {
        assert_eq!(SnapshotFormat::from_extension("csv").unwrap(), SnapshotFormat::Tabular);
        assert_eq!(
            SnapshotFormat::from_path(Path::new("a/b/fundamental_equity_20240101.json")).unwrap(),
            SnapshotFormat::Document
        );
        assert!(matches!(
            SnapshotFormat::from_extension("parquet"),
            Err(DataError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            SnapshotFormat::from_path(Path::new("a/b/snapshot")),
            Err(DataError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_index_moves_to_front() {
        let frame = DataFrame::new(vec![
            Column::new("close".into(), vec![1.0, 2.0]),
            Column::new("date".into(), vec!["2024-01-02", "2024-01-03"]),
        ])
        .unwrap();
        let table = Table::with_date_index(frame).unwrap();
        let persisted = table.to_persisted_frame().unwrap();
        let names: Vec<&str> = persisted
            .get_column_names()
            .into_iter()
            .map(|n| n.as_str())
            .collect();
        assert_eq!(names, vec!["date", "close"]);
    }

    #[test]
    fn test_with_date_index_requires_column() {
        let frame = DataFrame::new(vec![Column::new("close".into(), vec![1.0])]).unwrap();
        assert!(Table::with_date_index(frame).is_err());
    }

    #[test]
    fn test_payload_accessors() {
        let payload = Payload::from(serde_json::json!({"General": {"Code": "AAPL"}}));
        assert_eq!(payload.format(), SnapshotFormat::Document);
        assert!(payload.clone().into_table().is_err());
        assert!(payload.into_document().is_ok());
        assert!(Payload::from(Table::empty()).into_table().unwrap().is_empty());
    }
}
