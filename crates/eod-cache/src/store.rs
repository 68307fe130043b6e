//! Disk-backed snapshot store.

use chrono::NaiveDate;
use eod_core::{
    CaptureDate, DataError, DatasetKey, Payload, Result, SnapshotFormat, Table,
};
use polars::prelude::*;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, instrument, trace};

use crate::staleness;

/// One immutable cached artifact located on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedSnapshot {
    /// Key of the cached dataset.
    pub key: DatasetKey,
    /// Day the data was fetched.
    pub capture_date: CaptureDate,
    /// Serialization format of the file.
    pub format: SnapshotFormat,
    /// Location of the snapshot file.
    pub path: PathBuf,
}

impl CachedSnapshot {
    /// Loads the payload of this snapshot.
    ///
    /// # Errors
    /// See [`read_snapshot`].
    pub fn load(&self) -> Result<Payload> {
        read_snapshot(&self.path)
    }
}

/// Snapshot cache rooted at a base directory.
///
/// Snapshots are laid out as
/// `<base>/<dataset_type>/[<dimension>/...]/<YYYYMMDD>/<dataset_type>_<YYYYMMDD>.<ext>`
/// and are never modified once written.
#[derive(Debug, Clone)]
pub struct CacheStore {
    base_path: PathBuf,
}

impl CacheStore {
    /// Creates a store rooted at `base_path`. The directory is created lazily.
    #[must_use]
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Root directory of the cache.
    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Finds the most recent snapshot of `key` captured within
    /// `max_age_days` before `as_of` (inclusive on both ends).
    ///
    /// # Errors
    /// Returns [`DataError::Cache`] if the key directory exists but cannot be listed.
    pub fn find_valid_snapshot(
        &self,
        key: &DatasetKey,
        as_of: NaiveDate,
        max_age_days: u32,
    ) -> Result<Option<CachedSnapshot>> {
        staleness::find_valid_snapshot(&self.base_path, key, as_of, max_age_days)
    }

    /// Persists `payload` as the snapshot of `key` captured on `capture`.
    ///
    /// The capture directory is created if absent. The file is written to a
    /// temporary name and renamed into place, so readers never observe a
    /// partial snapshot.
    ///
    /// # Errors
    /// Returns [`DataError::UnsupportedFormat`] if the payload format does not
    /// match the dataset type, or [`DataError::Cache`] on I/O failure.
    #[instrument(skip(self, payload), fields(key = %key, capture = %capture))]
    pub fn write(
        &self,
        key: &DatasetKey,
        capture: CaptureDate,
        payload: &Payload,
    ) -> Result<CachedSnapshot> {
        let format = key.dataset_type().format();
        if payload.format() != format {
            return Err(DataError::UnsupportedFormat(format!(
                "{} snapshots must be {:?}, got {:?}",
                key.dataset_type(),
                format,
                payload.format()
            )));
        }

        let path = key.snapshot_path(&self.base_path, capture);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .map_err(|e| DataError::Cache(format!("failed to create {}: {e}", dir.display())))?;
        }

        let tmp_path = path.with_extension(format!("{}.tmp", format.extension()));
        let written = match payload {
            Payload::Table(table) => write_table(&tmp_path, table),
            Payload::Document(value) => write_document(&tmp_path, value),
        };
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }

        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            DataError::Cache(format!("atomic rename failed: {e}"))
        })?;

        debug!(path = %path.display(), "Wrote snapshot");
        Ok(CachedSnapshot {
            key: key.clone(),
            capture_date: capture,
            format,
            path,
        })
    }

    /// Reads the payload stored at `snapshot_path`.
    ///
    /// # Errors
    /// See [`read_snapshot`].
    pub fn read(&self, snapshot_path: &Path) -> Result<Payload> {
        read_snapshot(snapshot_path)
    }
}

/// Reads a snapshot file, dispatching on its extension.
///
/// A tabular snapshot that is present but holds no rows yields an empty
/// table rather than an error.
///
/// # Errors
/// Returns [`DataError::UnsupportedFormat`] for unrecognized extensions,
/// [`DataError::Cache`] on I/O failure and [`DataError::Parse`] for malformed content.
#[instrument(fields(path = %path.display()))]
pub fn read_snapshot(path: &Path) -> Result<Payload> {
    match SnapshotFormat::from_path(path)? {
        SnapshotFormat::Tabular => read_table(path).map(Payload::Table),
        SnapshotFormat::Document => {
            let text = fs::read_to_string(path).map_err(DataError::cache)?;
            let value = serde_json::from_str(&text)
                .map_err(|e| DataError::Parse(format!("{}: {e}", path.display())))?;
            Ok(Payload::Document(value))
        }
    }
}

fn write_table(path: &Path, table: &Table) -> Result<()> {
    let mut frame = table.to_persisted_frame()?;
    let mut file = fs::File::create(path).map_err(DataError::cache)?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(&mut frame)
        .map_err(DataError::cache)?;
    trace!(rows = frame.height(), "Serialized table");
    Ok(())
}

fn write_document(path: &Path, value: &serde_json::Value) -> Result<()> {
    let text = serde_json::to_string(value).map_err(|e| DataError::Parse(e.to_string()))?;
    fs::write(path, text).map_err(DataError::cache)
}

/// Vendor columns holding identifiers or free text. Kept as strings so that
/// codes such as `0001` survive a round trip.
const TEXT_COLUMNS: &[&str] = &[
    "Code",
    "Name",
    "Country",
    "Exchange",
    "Currency",
    "Type",
    "Isin",
    "OperatingMIC",
    "CountryISO2",
    "CountryISO3",
];

/// String overrides for the [`TEXT_COLUMNS`] present in the CSV header.
fn text_column_overrides(bytes: &[u8]) -> Schema {
    let header = bytes.split(|b| *b == b'\n').next().unwrap_or_default();
    String::from_utf8_lossy(header)
        .trim_end_matches('\r')
        .split(',')
        .map(|name| name.trim_matches('"'))
        .filter(|name| TEXT_COLUMNS.contains(name))
        .map(|name| Field::new(name.into(), DataType::String))
        .collect()
}

fn read_table(path: &Path) -> Result<Table> {
    let bytes = fs::read(path).map_err(DataError::cache)?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        debug!("Snapshot holds no rows");
        return Ok(Table::empty());
    }

    let overrides = text_column_overrides(&bytes);
    let frame = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .with_schema_overwrite(Some(Arc::new(overrides)))
        .map_parse_options(|options| options.with_try_parse_dates(true))
        .into_reader_with_file_handle(Cursor::new(bytes))
        .finish()
        .map_err(|e| DataError::Parse(format!("{}: {e}", path.display())))?;

    if frame.height() == 0 {
        debug!("Snapshot holds no rows");
        return Ok(Table::new(frame));
    }
    Ok(Table::from_persisted_frame(frame))
}

#[cfg(test)]
mod tests {
    use super::*;
    use eod_core::{DatasetType, Dimensions};
    use serde_json::json;

    fn capture(y: i32, m: u32, d: u32) -> CaptureDate {
        CaptureDate::new(NaiveDate::from_ymd_opt(y, m, d).unwrap()).unwrap()
    }

    fn price_key() -> DatasetKey {
        DatasetKey::new(
            DatasetType::HistoricalTimeSeries,
            &Dimensions::new().with_exchange("US").with_symbol("AAPL"),
        )
        .unwrap()
    }

    fn price_table() -> Table {
        let frame = DataFrame::new(vec![
            Column::new("close".into(), vec![151.25, 152.5]),
            Column::new("date".into(), vec!["2024-01-02", "2024-01-03"])
                .cast(&DataType::Date)
                .unwrap(),
            Column::new("volume".into(), vec![1_000_000i64, 1_100_000]),
        ])
        .unwrap();
        Table::with_date_index(frame).unwrap()
    }

    #[test]
    fn test_table_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        let snapshot = store
            .write(&price_key(), capture(2024, 1, 4), &Payload::Table(price_table()))
            .unwrap();

        assert!(snapshot.path.ends_with(
            "historical_time_series/1d/US/AAPL/20240104/historical_time_series_20240104.csv"
        ));
        let text = fs::read_to_string(&snapshot.path).unwrap();
        assert!(text.starts_with("date,close,volume"));

        let table = store.read(&snapshot.path).unwrap().into_table().unwrap();
        assert_eq!(table.index(), Some("date"));
        assert_eq!(table.height(), 2);
        assert_eq!(table.frame().column("date").unwrap().dtype(), &DataType::Date);
        let expected = price_table().to_persisted_frame().unwrap();
        assert!(table.frame().equals_missing(&expected));
    }

    fn symbols_key() -> DatasetKey {
        DatasetKey::new(
            DatasetType::ExchangeSymbols,
            &Dimensions::new().with_exchange("HK"),
        )
        .unwrap()
    }

    #[test]
    fn test_leading_zero_codes_survive() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        let frame = DataFrame::new(vec![
            Column::new("Code".into(), vec!["0001", "0002", "0005", "0700", "9988"]),
            Column::new("Type".into(), vec!["Common Stock"; 5]),
        ])
        .unwrap();
        let table = Table::new(frame);
        let snapshot = store
            .write(&symbols_key(), capture(2024, 1, 4), &Payload::Table(table.clone()))
            .unwrap();

        let read = store.read(&snapshot.path).unwrap().into_table().unwrap();
        assert_eq!(read.frame().column("Code").unwrap().dtype(), &DataType::String);
        assert_eq!(read, table);
    }

    #[test]
    fn test_late_text_values_do_not_break_inference() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        let mut codes: Vec<String> = (1..=150).map(|i| i.to_string()).collect();
        codes.push("ABC".to_string());
        let mut sectors: Vec<String> = (1..=150).map(|i| (i * 10).to_string()).collect();
        sectors.push("Technology".to_string());
        let frame = DataFrame::new(vec![
            Column::new("Code".into(), codes),
            Column::new("Sector".into(), sectors),
        ])
        .unwrap();
        let snapshot = store
            .write(&symbols_key(), capture(2024, 1, 4), &Payload::Table(Table::new(frame)))
            .unwrap();

        let read = store.read(&snapshot.path).unwrap().into_table().unwrap();
        assert_eq!(read.height(), 151);
        let codes = read.frame().column("Code").unwrap().str().unwrap();
        assert_eq!(codes.get(0), Some("1"));
        assert_eq!(codes.get(150), Some("ABC"));
        let sectors = read.frame().column("Sector").unwrap();
        assert_eq!(sectors.dtype(), &DataType::String);
        assert_eq!(sectors.str().unwrap().get(150), Some("Technology"));
    }

    #[test]
    fn test_positional_table_has_no_index() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        let key = DatasetKey::new(DatasetType::ExchangeList, &Dimensions::new()).unwrap();
        let frame = DataFrame::new(vec![
            Column::new("Code".into(), vec!["US", "LSE"]),
            Column::new("Name".into(), vec!["USA Stocks", "London Exchange"]),
        ])
        .unwrap();
        let snapshot = store
            .write(&key, capture(2024, 1, 4), &Payload::Table(Table::new(frame.clone())))
            .unwrap();
        let table = snapshot.load().unwrap().into_table().unwrap();
        assert_eq!(table.index(), None);
        assert!(table.frame().equals_missing(&frame));
    }

    #[test]
    fn test_document_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        let key = DatasetKey::new(
            DatasetType::FundamentalEquity,
            &Dimensions::new().with_exchange("US").with_symbol("AAPL"),
        )
        .unwrap();
        let document = json!({
            "General": {"Code": "AAPL", "Name": "Apple Inc"},
            "Financials": {"Balance_Sheet": {"quarterly": {"2023-09-30": {"totalAssets": "352583000000.00"}}}}
        });
        let snapshot = store
            .write(&key, capture(2023, 10, 2), &Payload::Document(document.clone()))
            .unwrap();
        assert_eq!(snapshot.format, SnapshotFormat::Document);
        assert_eq!(store.read(&snapshot.path).unwrap(), Payload::Document(document));
    }

    #[test]
    fn test_format_mismatch_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        let err = store
            .write(&price_key(), capture(2024, 1, 4), &Payload::Document(json!({})))
            .unwrap_err();
        assert!(matches!(err, DataError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_write_is_idempotent_for_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        let payload = Payload::Table(price_table());
        store.write(&price_key(), capture(2024, 1, 4), &payload).unwrap();
        let second = store.write(&price_key(), capture(2024, 1, 4), &payload).unwrap();
        let files: Vec<_> = fs::read_dir(second.path.parent().unwrap())
            .unwrap()
            .collect();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_empty_file_reads_as_empty_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("market_cap_20240101.csv");
        fs::write(&path, "").unwrap();
        let table = read_snapshot(&path).unwrap().into_table().unwrap();
        assert!(table.is_empty());

        fs::write(&path, "date,value\n").unwrap();
        let table = read_snapshot(&path).unwrap().into_table().unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("market_cap_20240101.parquet");
        fs::write(&path, "x").unwrap();
        assert!(matches!(
            read_snapshot(&path),
            Err(DataError::UnsupportedFormat(_))
        ));
    }
}
