//! Conversion of vendor JSON records into DataFrames.

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use eod_core::{DATE_INDEX, DataError, Result};
use polars::prelude::*;
use serde_json::{Map, Value};

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Builds a frame from JSON records, one column per key in first-seen order.
///
/// Columns whose non-null values are all numbers become `f64`, all booleans
/// become `bool`, anything else becomes a string column.
pub(crate) fn records_to_frame(records: &[Map<String, Value>]) -> Result<DataFrame> {
    let mut names: Vec<&str> = Vec::new();
    for record in records {
        for key in record.keys() {
            if !names.contains(&key.as_str()) {
                names.push(key);
            }
        }
    }

    let columns = names
        .into_iter()
        .map(|name| {
            let values: Vec<Option<&Value>> = records
                .iter()
                .map(|record| record.get(name).filter(|v| !v.is_null()))
                .collect();
            json_column(name, &values)
        })
        .collect();
    DataFrame::new(columns).map_err(|e| DataError::Parse(e.to_string()))
}

fn json_column(name: &str, values: &[Option<&Value>]) -> Column {
    let present = || values.iter().flatten();
    if present().all(|v| v.is_number()) {
        let data: Vec<Option<f64>> = values.iter().map(|v| v.and_then(Value::as_f64)).collect();
        Column::new(name.into(), data)
    } else if present().all(|v| v.is_boolean()) {
        let data: Vec<Option<bool>> = values.iter().map(|v| v.and_then(Value::as_bool)).collect();
        Column::new(name.into(), data)
    } else {
        let data: Vec<Option<String>> = values
            .iter()
            .map(|v| {
                v.map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
            })
            .collect();
        Column::new(name.into(), data)
    }
}

/// Days between 0001-01-01 and 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Replaces a string `date` column of `YYYY-MM-DD` values with a `Date` column.
pub(crate) fn parse_daily_dates(frame: &mut DataFrame) -> Result<()> {
    let days = string_values(frame)?
        .into_iter()
        .map(|raw| {
            raw.and_then(|s| NaiveDate::parse_from_str(&s, DATE_FORMAT).ok())
                .map(|d| d.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE)
        })
        .collect::<Vec<Option<i32>>>();
    let column = Column::new(DATE_INDEX.into(), days)
        .cast(&DataType::Date)
        .map_err(|e| DataError::Parse(e.to_string()))?;
    frame.with_column(column).map_err(|e| DataError::Parse(e.to_string()))?;
    Ok(())
}

/// Replaces a string `date` column of `YYYY-MM-DD HH:MM:SS` values with a
/// millisecond `Datetime` column.
pub(crate) fn parse_intraday_dates(frame: &mut DataFrame) -> Result<()> {
    let millis = string_values(frame)?
        .into_iter()
        .map(|raw| {
            raw.and_then(|s| NaiveDateTime::parse_from_str(&s, DATETIME_FORMAT).ok())
                .map(|dt| dt.and_utc().timestamp_millis())
        })
        .collect::<Vec<Option<i64>>>();
    let column = Column::new(DATE_INDEX.into(), millis)
        .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
        .map_err(|e| DataError::Parse(e.to_string()))?;
    frame.with_column(column).map_err(|e| DataError::Parse(e.to_string()))?;
    Ok(())
}

fn string_values(frame: &DataFrame) -> Result<Vec<Option<String>>> {
    let column = frame
        .column(DATE_INDEX)
        .map_err(|e| DataError::Parse(e.to_string()))?;
    let strings = column
        .str()
        .map_err(|e| DataError::Parse(format!("'{DATE_INDEX}' is not a string column: {e}")))?;
    Ok(strings.into_iter().map(|s| s.map(str::to_string)).collect())
}

/// Selects `date` followed by `columns`, adding null `f64` columns for any
/// that are missing, sorted by date.
pub(crate) fn select_series(mut frame: DataFrame, columns: &[&str]) -> Result<DataFrame> {
    let height = frame.height();
    for name in columns {
        if frame.column(name).is_err() {
            let nulls: Vec<Option<f64>> = vec![None; height];
            frame
                .with_column(Column::new((*name).into(), nulls))
                .map_err(|e| DataError::Parse(e.to_string()))?;
        }
    }
    let names: Vec<&str> = std::iter::once(DATE_INDEX).chain(columns.iter().copied()).collect();
    frame
        .select(names)
        .and_then(|f| f.sort([DATE_INDEX], SortMultipleOptions::default()))
        .map_err(|e| DataError::Parse(e.to_string()))
}

/// An empty frame with a `date` column followed by `f64` columns.
pub(crate) fn empty_series(date_type: DataType, columns: &[&str]) -> DataFrame {
    let fields = std::iter::once(Field::new(DATE_INDEX.into(), date_type)).chain(
        columns
            .iter()
            .map(|name| Field::new((*name).into(), DataType::Float64)),
    );
    DataFrame::empty_with_schema(&Schema::from_iter(fields))
}
