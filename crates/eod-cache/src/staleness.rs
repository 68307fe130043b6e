//! Staleness-aware snapshot lookup.

use chrono::{Days, NaiveDate};
use eod_core::{CaptureDate, DataError, DatasetKey, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, instrument, trace};

use crate::store::CachedSnapshot;

/// Lists the capture dates present under a key directory, oldest first.
///
/// Entries that are not directories named `YYYYMMDD` are skipped. A missing
/// directory yields an empty list.
///
/// # Errors
/// Returns [`DataError::Cache`] if the directory exists but cannot be read.
pub fn list_capture_dates(key_dir: &Path) -> Result<Vec<CaptureDate>> {
    let entries = match fs::read_dir(key_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(DataError::Cache(format!(
                "failed to list {}: {e}",
                key_dir.display()
            )));
        }
    };

    let mut dates = Vec::new();
    for entry in entries {
        let entry = entry.map_err(DataError::cache)?;
        if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            continue;
        }
        let name = entry.file_name();
        match name.to_str().map(str::parse::<CaptureDate>) {
            Some(Ok(date)) => dates.push(date),
            _ => trace!(entry = ?name, "Ignoring non-capture entry"),
        }
    }
    dates.sort_unstable();
    Ok(dates)
}

/// Returns the most recent snapshot of `key` whose capture date lies in
/// `[as_of - max_age_days, as_of]`.
///
/// Captures after `as_of` never qualify. A capture directory without its
/// snapshot file is treated as absent.
///
/// # Errors
/// Returns [`DataError::Cache`] if the key directory exists but cannot be read.
#[instrument(skip(base), fields(key = %key))]
pub fn find_valid_snapshot(
    base: &Path,
    key: &DatasetKey,
    as_of: NaiveDate,
    max_age_days: u32,
) -> Result<Option<CachedSnapshot>> {
    let oldest = as_of
        .checked_sub_days(Days::new(u64::from(max_age_days)))
        .unwrap_or(NaiveDate::MIN);
    let key_dir = key.directory(base);

    let mut found = None;
    for capture in list_capture_dates(&key_dir)? {
        let date = capture.date();
        if date > as_of {
            break;
        }
        if date < oldest {
            continue;
        }
        let path = key.snapshot_path(base, capture);
        if path.is_file() {
            found = Some(CachedSnapshot {
                key: key.clone(),
                capture_date: capture,
                format: key.dataset_type().format(),
                path,
            });
        } else {
            trace!(capture = %capture, "Capture directory holds no snapshot");
        }
    }

    match &found {
        Some(snapshot) => debug!(capture = %snapshot.capture_date, "Cache hit"),
        None => debug!(%oldest, "Cache miss"),
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use eod_core::{DatasetType, Dimensions};

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn market_cap_key() -> DatasetKey {
        DatasetKey::new(
            DatasetType::MarketCap,
            &Dimensions::new().with_exchange("US").with_symbol("MSFT"),
        )
        .unwrap()
    }

    fn seed(base: &Path, key: &DatasetKey, captures: &[&str]) {
        for raw in captures {
            let capture: CaptureDate = raw.parse().unwrap();
            let path = key.snapshot_path(base, capture);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, "date,value\n2023-01-01,1.0\n").unwrap();
        }
    }

    #[test]
    fn test_latest_within_window() {
        let dir = tempfile::tempdir().unwrap();
        let key = market_cap_key();
        seed(dir.path(), &key, &["20230101", "20230115", "20230201"]);

        let hit = find_valid_snapshot(dir.path(), &key, day(2023, 1, 20), 10)
            .unwrap()
            .unwrap();
        assert_eq!(hit.capture_date.to_string(), "20230115");
        assert!(hit.path.ends_with("20230115/market_cap_20230115.csv"));
    }

    #[test]
    fn test_zero_age_requires_same_day() {
        let dir = tempfile::tempdir().unwrap();
        let key = market_cap_key();
        seed(dir.path(), &key, &["20230101", "20230115", "20230201"]);

        assert!(
            find_valid_snapshot(dir.path(), &key, day(2023, 1, 20), 0)
                .unwrap()
                .is_none()
        );
        let same_day = find_valid_snapshot(dir.path(), &key, day(2023, 1, 15), 0)
            .unwrap()
            .unwrap();
        assert_eq!(same_day.capture_date.date(), day(2023, 1, 15));
    }

    #[test]
    fn test_future_captures_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let key = market_cap_key();
        seed(dir.path(), &key, &["20230201"]);
        assert!(
            find_valid_snapshot(dir.path(), &key, day(2023, 1, 20), 365)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_window_boundary_inclusive() {
        let dir = tempfile::tempdir().unwrap();
        let key = market_cap_key();
        seed(dir.path(), &key, &["20230110"]);
        assert!(
            find_valid_snapshot(dir.path(), &key, day(2023, 1, 20), 10)
                .unwrap()
                .is_some()
        );
        assert!(
            find_valid_snapshot(dir.path(), &key, day(2023, 1, 20), 9)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_missing_directory_is_miss() {
        let dir = tempfile::tempdir().unwrap();
        assert!(
            find_valid_snapshot(dir.path(), &market_cap_key(), day(2023, 1, 20), 30)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_empty_capture_directory_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let key = market_cap_key();
        seed(dir.path(), &key, &["20230110"]);
        fs::create_dir_all(key.directory(dir.path()).join("20230118")).unwrap();

        let hit = find_valid_snapshot(dir.path(), &key, day(2023, 1, 20), 30)
            .unwrap()
            .unwrap();
        assert_eq!(hit.capture_date.to_string(), "20230110");
    }

    #[test]
    fn test_list_ignores_foreign_entries() {
        let dir = tempfile::tempdir().unwrap();
        let key = market_cap_key();
        seed(dir.path(), &key, &["20230201", "20221231"]);
        let key_dir = key.directory(dir.path());
        fs::create_dir_all(key_dir.join("scratch")).unwrap();
        fs::create_dir_all(key_dir.join("2023-01-05")).unwrap();
        fs::write(key_dir.join("20230105"), "not a directory").unwrap();

        let dates: Vec<String> = list_capture_dates(&key_dir)
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(dates, vec!["20221231", "20230201"]);
    }
}
