//! Housekeeping and inventory over the snapshot tree.

use chrono::NaiveDate;
use eod_core::{Cadence, CaptureDate, DATE_INDEX, DataError, DatasetType, Result};
use eod_fundamentals::FundamentalEquity;
use polars::prelude::{ChunkAgg, DataFrame, DataType, Int32Chunked};
use serde_json::{Map, Value};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

use crate::staleness::list_capture_dates;
use crate::store::read_snapshot;

/// Observations older than this many days before capture mark a series inactive.
pub const ACTIVE_WINDOW_DAYS: i64 = 10;

/// `General` fields left out of fundamentals summaries.
pub const SUMMARY_EXCLUDED_FIELDS: [&str; 4] = ["Description", "AddressData", "Listings", "Officers"];

/// Latest capture of one key directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    /// Dimension values of the key, in path order.
    pub components: Vec<String>,
    /// Most recent capture date.
    pub capture_date: CaptureDate,
    /// Snapshot file of that capture.
    pub path: PathBuf,
}

/// Coverage of one cached time series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesSummary {
    /// Day the snapshot was captured.
    pub capture_date: CaptureDate,
    /// First observation.
    pub first_date: Option<NaiveDate>,
    /// Last observation.
    pub last_date: Option<NaiveDate>,
    /// Number of rows.
    pub observations: usize,
    /// Whether the last observation is within [`ACTIVE_WINDOW_DAYS`] of capture.
    pub is_active: bool,
}

/// `General` section of the latest fundamentals snapshot of one security.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneralSummary {
    /// Exchange and symbol directories of the key.
    pub components: Vec<String>,
    /// Day the document was captured.
    pub capture_date: CaptureDate,
    /// `General` fields without [`SUMMARY_EXCLUDED_FIELDS`].
    pub fields: Map<String, Value>,
}

/// Inventory of cached fundamentals documents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FundamentalsSummary {
    /// One entry per security whose latest document has a `General` section.
    pub summaries: Vec<GeneralSummary>,
    /// Keys whose latest document is empty.
    pub empty: Vec<Vec<String>>,
    /// Latest capture directories that hold no snapshot file.
    pub missing_files: Vec<PathBuf>,
}

/// Deletes capture directories that hold no files below `root`.
///
/// `root` may be the cache base or any dataset subtree. Returns the number of
/// directories removed.
///
/// # Errors
/// Returns [`DataError::Cache`] on I/O failure.
#[instrument]
pub fn remove_empty_snapshot_dirs(root: &Path) -> Result<usize> {
    let removed = prune(root)?;
    info!(removed, "Removed empty capture directories");
    Ok(removed)
}

fn prune(dir: &Path) -> Result<usize> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(DataError::cache(e)),
    };

    let mut removed = 0;
    for entry in entries {
        let entry = entry.map_err(DataError::cache)?;
        if !entry.file_type().map_err(DataError::cache)?.is_dir() {
            continue;
        }
        let path = entry.path();
        let is_capture = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.parse::<CaptureDate>().is_ok());

        if is_capture {
            let empty = fs::read_dir(&path)
                .map_err(DataError::cache)?
                .next()
                .is_none();
            if empty {
                fs::remove_dir(&path).map_err(DataError::cache)?;
                debug!(path = %path.display(), "Removed empty capture directory");
                removed += 1;
            }
        } else {
            removed += prune(&path)?;
        }
    }
    Ok(removed)
}

/// Lists the latest capture of every key directory of `dataset_type`.
///
/// Key directories without any capture holding a snapshot file are omitted.
/// Entries are sorted by their components.
///
/// # Errors
/// Returns [`DataError::Cache`] on I/O failure.
#[instrument]
pub fn latest_snapshots(base: &Path, dataset_type: DatasetType) -> Result<Vec<SnapshotEntry>> {
    let root = base.join(dataset_type.name());
    let depth = dataset_type.spec().dimensions.len();

    let mut key_dirs = Vec::new();
    collect_key_dirs(&root, depth, &mut Vec::new(), &mut key_dirs)?;

    let extension = dataset_type.format().extension();
    let mut entries = Vec::new();
    for (components, dir) in key_dirs {
        let latest = list_capture_dates(&dir)?.into_iter().rev().find_map(|capture| {
            let path = dir
                .join(capture.to_string())
                .join(format!("{}_{capture}.{extension}", dataset_type.name()));
            path.is_file().then_some((capture, path))
        });
        if let Some((capture_date, path)) = latest {
            entries.push(SnapshotEntry {
                components,
                capture_date,
                path,
            });
        }
    }
    entries.sort_by(|a, b| a.components.cmp(&b.components));
    debug!(count = entries.len(), "Collected latest snapshots");
    Ok(entries)
}

fn collect_key_dirs(
    dir: &Path,
    remaining: usize,
    prefix: &mut Vec<String>,
    out: &mut Vec<(Vec<String>, PathBuf)>,
) -> Result<()> {
    if remaining == 0 {
        out.push((prefix.clone(), dir.to_path_buf()));
        return Ok(());
    }
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(DataError::cache(e)),
    };
    for entry in entries {
        let entry = entry.map_err(DataError::cache)?;
        if !entry.file_type().map_err(DataError::cache)?.is_dir() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        prefix.push(name);
        collect_key_dirs(&entry.path(), remaining - 1, prefix, out)?;
        prefix.pop();
    }
    Ok(())
}

/// Summarizes the date coverage of a tabular snapshot.
///
/// # Errors
/// Returns an error if the snapshot cannot be read or is not tabular.
pub fn series_summary(entry: &SnapshotEntry) -> Result<SeriesSummary> {
    let table = read_snapshot(&entry.path)?.into_table()?;
    let frame = table.frame();
    let first_date = extract_date(frame, |days| ChunkAgg::min(days));
    let last_date = extract_date(frame, |days| ChunkAgg::max(days));
    let is_active = last_date.is_some_and(|last| {
        (entry.capture_date.date() - last).num_days() < ACTIVE_WINDOW_DAYS
    });
    Ok(SeriesSummary {
        capture_date: entry.capture_date,
        first_date,
        last_date,
        observations: frame.height(),
        is_active,
    })
}

/// Summarizes the latest fundamentals document of every cached security.
///
/// Only the newest capture directory of each key is inspected. When it holds
/// no snapshot file the directory is listed in `missing_files`; a `null` or
/// `{}` document, or one without a `General` section, is listed in `empty`.
///
/// # Errors
/// Returns [`DataError::Cache`] on I/O failure and [`DataError::Parse`] for
/// malformed documents.
#[instrument]
pub fn fundamentals_summary(base: &Path) -> Result<FundamentalsSummary> {
    let dataset_type = DatasetType::FundamentalEquity;
    let root = base.join(dataset_type.name());
    let mut key_dirs = Vec::new();
    let depth = dataset_type.spec().dimensions.len();
    collect_key_dirs(&root, depth, &mut Vec::new(), &mut key_dirs)?;
    key_dirs.sort();

    let mut summary = FundamentalsSummary::default();
    for (components, dir) in key_dirs {
        let Some(capture_date) = list_capture_dates(&dir)?.pop() else {
            continue;
        };
        let capture_dir = dir.join(capture_date.to_string());
        let path = capture_dir.join(format!(
            "{}_{capture_date}.{}",
            dataset_type.name(),
            dataset_type.format().extension()
        ));
        if !path.is_file() {
            summary.missing_files.push(capture_dir);
            continue;
        }

        let document = read_snapshot(&path)?.into_document()?;
        let is_blank = match &document {
            Value::Null => true,
            Value::Object(map) => map.is_empty(),
            _ => false,
        };
        if is_blank {
            summary.empty.push(components);
            continue;
        }

        let equity = FundamentalEquity::new(document, Cadence::Quarterly)?;
        match equity.general_section() {
            Some(general) => {
                let fields = general
                    .iter()
                    .filter(|(name, _)| !SUMMARY_EXCLUDED_FIELDS.contains(&name.as_str()))
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect();
                summary.summaries.push(GeneralSummary {
                    components,
                    capture_date,
                    fields,
                });
            }
            None => summary.empty.push(components),
        }
    }
    info!(
        documents = summary.summaries.len(),
        empty = summary.empty.len(),
        missing = summary.missing_files.len(),
        "Summarized fundamentals cache"
    );
    Ok(summary)
}

fn extract_date(
    frame: &DataFrame,
    pick: fn(&Int32Chunked) -> Option<i32>,
) -> Option<NaiveDate> {
    let column = frame.column(DATE_INDEX).ok()?;
    let column = match column.dtype() {
        DataType::Datetime(_, _) => column.cast(&DataType::Date).ok()?,
        _ => column.clone(),
    };
    let dates = column.date().ok()?;
    // Days since 1970-01-01.
    let days = pick(&dates.0)?;
    NaiveDate::from_num_days_from_ce_opt(days + 719_163)
}

#[cfg(test)]
mod tests {
    use super::*;
    use eod_core::{DatasetKey, Dimensions};

    fn capture(raw: &str) -> CaptureDate {
        raw.parse().unwrap()
    }

    fn write_series(base: &Path, symbol: &str, raw: &str, body: &str) -> PathBuf {
        let key = DatasetKey::new(
            DatasetType::HistoricalTimeSeries,
            &Dimensions::new().with_exchange("US").with_symbol(symbol),
        )
        .unwrap();
        let path = key.snapshot_path(base, capture(raw));
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_remove_empty_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let kept = write_series(dir.path(), "AAPL", "20240105", "date,close\n2024-01-04,1.0\n");
        let key_dir = kept.parent().unwrap().parent().unwrap();
        fs::create_dir_all(key_dir.join("20240101")).unwrap();
        fs::create_dir_all(key_dir.join("20240102")).unwrap();

        assert_eq!(remove_empty_snapshot_dirs(dir.path()).unwrap(), 2);
        assert!(kept.is_file());
        assert!(!key_dir.join("20240101").exists());
        assert_eq!(remove_empty_snapshot_dirs(dir.path()).unwrap(), 0);
    }

    #[test]
    fn test_latest_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        write_series(dir.path(), "MSFT", "20240102", "date,close\n2024-01-01,1.0\n");
        let newest = write_series(dir.path(), "MSFT", "20240110", "date,close\n2024-01-09,1.0\n");
        write_series(dir.path(), "AAPL", "20240105", "date,close\n2024-01-04,1.0\n");

        let entries = latest_snapshots(dir.path(), DatasetType::HistoricalTimeSeries).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].components, vec!["1d", "US", "AAPL"]);
        assert_eq!(entries[1].capture_date, capture("20240110"));
        assert_eq!(entries[1].path, newest);

        assert!(latest_snapshots(dir.path(), DatasetType::MarketCap).unwrap().is_empty());
    }

    #[test]
    fn test_intraday_series_summary() {
        let dir = tempfile::tempdir().unwrap();
        let key = DatasetKey::new(
            DatasetType::HistoricalTimeSeries,
            &Dimensions::new()
                .with_exchange("US")
                .with_symbol("AAPL")
                .with_frequency(eod_core::Frequency::Hourly),
        )
        .unwrap();
        let path = key.snapshot_path(dir.path(), capture("20240110"));
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(
            &path,
            "date,close\n2024-01-08T14:30:00.000,185.1\n2024-01-09T15:30:00.000,186.4\n",
        )
        .unwrap();

        let entries = latest_snapshots(dir.path(), DatasetType::HistoricalTimeSeries).unwrap();
        assert_eq!(entries[0].components, vec!["1h", "US", "AAPL"]);
        let summary = series_summary(&entries[0]).unwrap();
        assert_eq!(summary.first_date, NaiveDate::from_ymd_opt(2024, 1, 8));
        assert_eq!(summary.last_date, NaiveDate::from_ymd_opt(2024, 1, 9));
        assert_eq!(summary.observations, 2);
        assert!(summary.is_active);
    }

    fn write_fundamentals(base: &Path, symbol: &str, raw: &str, body: Option<&str>) -> PathBuf {
        let key = DatasetKey::new(
            DatasetType::FundamentalEquity,
            &Dimensions::new().with_exchange("US").with_symbol(symbol),
        )
        .unwrap();
        let path = key.snapshot_path(base, capture(raw));
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        if let Some(body) = body {
            fs::write(&path, body).unwrap();
        }
        path
    }

    #[test]
    fn test_fundamentals_summary() {
        let dir = tempfile::tempdir().unwrap();
        write_fundamentals(dir.path(), "AAPL", "20240101", Some(r#"{"General": {"Code": "OLD"}}"#));
        write_fundamentals(
            dir.path(),
            "AAPL",
            "20240105",
            Some(
                r#"{"General": {"Code": "AAPL", "Name": "Apple Inc", "Description": "long text",
                    "Officers": {"0": {}}, "Listings": {}, "AddressData": {"City": "Cupertino"}}}"#,
            ),
        );
        write_fundamentals(dir.path(), "EMPTY", "20240105", Some("{}"));
        let missing = write_fundamentals(dir.path(), "GONE", "20240105", None);

        let summary = fundamentals_summary(dir.path()).unwrap();
        assert_eq!(summary.summaries.len(), 1);
        let apple = &summary.summaries[0];
        assert_eq!(apple.components, vec!["US", "AAPL"]);
        assert_eq!(apple.capture_date, capture("20240105"));
        let mut names: Vec<&str> = apple.fields.keys().map(String::as_str).collect();
        names.sort_unstable();
        assert_eq!(names, vec!["Code", "Name"]);
        assert_eq!(apple.fields["Code"], "AAPL");

        assert_eq!(summary.empty, vec![vec!["US".to_string(), "EMPTY".to_string()]]);
        assert_eq!(summary.missing_files, vec![missing.parent().unwrap().to_path_buf()]);
    }

    #[test]
    fn test_fundamentals_summary_without_cache() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(fundamentals_summary(dir.path()).unwrap(), FundamentalsSummary::default());
    }

    #[test]
    fn test_series_summary() {
        let dir = tempfile::tempdir().unwrap();
        write_series(
            dir.path(),
            "AAPL",
            "20240110",
            "date,close\n2023-12-01,1.0\n2024-01-03,2.0\n2024-01-05,3.0\n",
        );
        write_series(dir.path(), "XYZ", "20240110", "date,close\n2023-06-30,4.0\n");

        let entries = latest_snapshots(dir.path(), DatasetType::HistoricalTimeSeries).unwrap();
        let active = series_summary(&entries[0]).unwrap();
        assert_eq!(active.first_date, NaiveDate::from_ymd_opt(2023, 12, 1));
        assert_eq!(active.last_date, NaiveDate::from_ymd_opt(2024, 1, 5));
        assert_eq!(active.observations, 3);
        assert!(active.is_active);

        let delisted = series_summary(&entries[1]).unwrap();
        assert_eq!(delisted.observations, 1);
        assert!(!delisted.is_active);
    }
}
