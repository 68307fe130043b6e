#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/eod/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! EOD Historical Data HTTP client.
//!
//! [`EodClient`] implements [`DatasetFetcher`] for every dataset type:
//!
//! | dataset | endpoint |
//! |---|---|
//! | `exchange_list` | `exchanges-list` |
//! | `exchange_symbols` | `exchange-symbol-list/{EXCHANGE}` (listed and delisted) |
//! | `historical_time_series` | `eod/{TICKER}` or `intraday/{TICKER}` |
//! | `market_cap` | `historical-market-cap/{TICKER}` |
//! | `fundamental_equity` | `fundamentals/{TICKER}` |
//! | `fundamental_equity_bulk` | `bulk-fundamentals/{EXCHANGE}` |
//!
//! Requests are not retried.

mod frames;

use async_trait::async_trait;
use chrono::NaiveDate;
use eod_core::{
    Clock, DataError, DatasetFetcher, DatasetRequest, DatasetType, EodConfig, ExchangeId,
    Frequency, Payload, ResolvedWindow, Result, Symbol, SystemClock, Table,
};
use polars::prelude::*;
use reqwest::{Client, Url};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::frames::{
    empty_series, parse_daily_dates, parse_intraday_dates, records_to_frame, select_series,
};

/// Page size of bulk fundamentals requests when the request sets none.
pub const DEFAULT_BULK_PAGE_SIZE: usize = 200;

/// Price columns of intraday series.
const INTRADAY_COLUMNS: &[&str] = &["open", "high", "low", "close", "volume"];

/// Price columns of daily series.
const DAILY_COLUMNS: &[&str] = &["open", "high", "low", "close", "volume", "adjusted_close"];

/// HTTP client for the EOD Historical Data API.
#[derive(Clone)]
pub struct EodClient {
    client: Client,
    config: EodConfig,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for EodClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EodClient")
            .field("api_token", &"[REDACTED]")
            .field("base_url", &self.config.base_url)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl EodClient {
    /// Creates a client using the token, endpoint and date limits of `config`.
    #[must_use]
    pub fn new(config: EodConfig) -> Self {
        Self {
            client: Client::new(),
            config,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the HTTP client.
    #[must_use]
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// Replaces the clock used to default request windows.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Builds an endpoint URL with the token and JSON format appended.
    fn url(&self, path: &str, params: &[(&str, String)]) -> Result<Url> {
        let base = self.config.base_url.trim_end_matches('/');
        let query = [
            ("api_token", self.config.api_token.clone()),
            ("fmt", "json".to_string()),
        ];
        Url::parse_with_params(
            &format!("{base}/{path}"),
            query.iter().chain(params).map(|(k, v)| (*k, v.as_str())),
        )
        .map_err(|e| DataError::configuration(format!("Invalid URL for {path}: {e}")))
    }

    /// Makes a GET request and parses the JSON response.
    async fn get(&self, path: &str, params: &[(&str, String)]) -> Result<Value> {
        let url = self.url(path, params)?;
        debug!(path, "EOD request");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DataError::Network(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(DataError::NotFound(path.to_string()));
        }

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .map(std::time::Duration::from_secs);
            return Err(DataError::RateLimited {
                endpoint: path.to_string(),
                retry_after,
            });
        }

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(DataError::Network(format!("HTTP {status}: {text}")));
        }

        let text = response
            .text()
            .await
            .map_err(|e| DataError::Network(e.to_string()))?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| DataError::Parse(format!("{e}: {text}")))
    }

    fn window(&self, request: &DatasetRequest, frequency: Frequency) -> Result<ResolvedWindow> {
        request
            .fetch_window()
            .resolve(frequency, self.clock.today(), &self.config)
    }

    /// Fetches the list of supported exchanges.
    #[instrument(skip(self))]
    pub async fn exchange_list(&self) -> Result<Table> {
        let records = into_records(self.get("exchanges-list/", &[]).await?)?;
        Ok(Table::new(records_to_frame(&records)?))
    }

    /// Fetches listed and delisted symbols of `exchange`, flagged by a
    /// boolean `delisted` column.
    #[instrument(skip(self), fields(exchange = %exchange))]
    pub async fn exchange_symbols(&self, exchange: &ExchangeId) -> Result<Table> {
        let path = format!("exchange-symbol-list/{exchange}");
        let mut records = Vec::new();
        for delisted in [false, true] {
            let flag = u8::from(delisted).to_string();
            let page = into_records(self.get(&path, &[("delisted", flag)]).await?)?;
            records.extend(page.into_iter().map(|mut record| {
                record.insert("delisted".to_string(), Value::Bool(delisted));
                record
            }));
        }
        debug!(count = records.len(), "Fetched exchange symbols");
        Ok(Table::new(records_to_frame(&records)?))
    }

    /// Fetches a price series.
    ///
    /// Daily series carry `open high low close volume adjusted_close`;
    /// intraday series omit `adjusted_close`. An empty response yields an
    /// empty table with those columns.
    #[instrument(skip(self), fields(ticker = %ticker(symbol, exchange)))]
    pub async fn historical_prices(
        &self,
        exchange: &ExchangeId,
        symbol: &Symbol,
        frequency: Frequency,
        window: ResolvedWindow,
    ) -> Result<Table> {
        let ticker = ticker(symbol, exchange);
        let (value, columns) = if frequency.is_intraday() {
            let params = [
                ("interval", frequency.as_str().to_string()),
                ("from", unix_seconds(window.start).to_string()),
                ("to", unix_seconds(window.end).to_string()),
            ];
            (self.get(&format!("intraday/{ticker}"), &params).await?, INTRADAY_COLUMNS)
        } else {
            let params = [
                ("period", "d".to_string()),
                ("from", window.start.format("%Y%m%d").to_string()),
                ("to", window.end.format("%Y%m%d").to_string()),
            ];
            (self.get(&format!("eod/{ticker}"), &params).await?, DAILY_COLUMNS)
        };

        let mut records = into_records(value)?;
        let date_type = if frequency.is_intraday() {
            DataType::Datetime(TimeUnit::Milliseconds, None)
        } else {
            DataType::Date
        };
        if records.is_empty() {
            debug!("Empty price series");
            return Table::with_date_index(empty_series(date_type, columns));
        }

        for record in &mut records {
            if let Some(datetime) = record.remove("datetime") {
                record.insert(eod_core::DATE_INDEX.to_string(), datetime);
            }
        }
        let mut frame = records_to_frame(&records)?;
        if frequency.is_intraday() {
            parse_intraday_dates(&mut frame)?;
        } else {
            parse_daily_dates(&mut frame)?;
        }
        Table::with_date_index(select_series(frame, columns)?)
    }

    /// Fetches daily market capitalization as a date-indexed `value` table.
    #[instrument(skip(self), fields(ticker = %ticker(symbol, exchange)))]
    pub async fn market_cap(
        &self,
        exchange: &ExchangeId,
        symbol: &Symbol,
        window: ResolvedWindow,
    ) -> Result<Table> {
        let params = [
            ("from", window.start.to_string()),
            ("to", window.end.to_string()),
        ];
        let value = self
            .get(&format!("historical-market-cap/{}", ticker(symbol, exchange)), &params)
            .await?;
        let records = into_records(value)?;
        if records.is_empty() {
            return Table::with_date_index(empty_series(DataType::Date, &["value"]));
        }
        let mut frame = records_to_frame(&records)?;
        parse_daily_dates(&mut frame)?;
        Table::with_date_index(select_series(frame, &["value"])?)
    }

    /// Fetches the fundamentals document of one security.
    #[instrument(skip(self), fields(ticker = %ticker(symbol, exchange)))]
    pub async fn fundamentals(&self, exchange: &ExchangeId, symbol: &Symbol) -> Result<Value> {
        self.get(&format!("fundamentals/{}", ticker(symbol, exchange)), &[])
            .await
    }

    /// Fetches fundamentals of every security on `exchange`, page by page.
    ///
    /// Pages are merged into one object keyed by the running offset
    /// (`"0"`, `"1"`, ...). Paging stops at the first short page.
    #[instrument(skip(self), fields(exchange = %exchange))]
    pub async fn fundamentals_bulk(&self, exchange: &ExchangeId, page_size: usize) -> Result<Value> {
        let page_size = page_size.max(1);
        let path = format!("bulk-fundamentals/{exchange}");
        let mut merged = Map::new();
        let mut offset = 0usize;
        loop {
            let params = [
                ("limit", page_size.to_string()),
                ("offset", offset.to_string()),
            ];
            let page = into_documents(self.get(&path, &params).await?);
            let count = page.len();
            for (idx, document) in page.into_iter().enumerate() {
                merged.insert((offset + idx).to_string(), document);
            }
            debug!(offset, count, "Fetched bulk fundamentals page");
            if count < page_size {
                break;
            }
            offset += page_size;
        }
        Ok(Value::Object(merged))
    }
}

#[async_trait]
impl DatasetFetcher for EodClient {
    async fn fetch(&self, request: &DatasetRequest) -> Result<Payload> {
        let key = request.key()?;
        let dims = key.dimensions();
        let exchange = || {
            dims.exchange
                .as_ref()
                .ok_or_else(|| DataError::configuration("The exchange ID must be provided."))
        };
        let symbol = || {
            dims.symbol
                .as_ref()
                .ok_or_else(|| DataError::configuration("The symbol must be provided."))
        };

        match request.dataset_type() {
            DatasetType::ExchangeList => self.exchange_list().await.map(Payload::Table),
            DatasetType::ExchangeSymbols => {
                self.exchange_symbols(exchange()?).await.map(Payload::Table)
            }
            DatasetType::HistoricalTimeSeries => {
                let frequency = dims.frequency.unwrap_or_default();
                let window = self.window(request, frequency)?;
                self.historical_prices(exchange()?, symbol()?, frequency, window)
                    .await
                    .map(Payload::Table)
            }
            DatasetType::MarketCap => {
                let frequency = dims.frequency.unwrap_or_default();
                if frequency != Frequency::Daily {
                    return Err(DataError::NotSupported(format!(
                        "Only daily frequency is supported for market cap, got {frequency}"
                    )));
                }
                let window = self.window(request, frequency)?;
                self.market_cap(exchange()?, symbol()?, window)
                    .await
                    .map(Payload::Table)
            }
            DatasetType::FundamentalEquity => self
                .fundamentals(exchange()?, symbol()?)
                .await
                .map(Payload::Document),
            DatasetType::FundamentalEquityBulk => {
                let page_size = request.page_size_hint().unwrap_or(DEFAULT_BULK_PAGE_SIZE);
                self.fundamentals_bulk(exchange()?, page_size)
                    .await
                    .map(Payload::Document)
            }
        }
    }
}

/// Vendor ticker `SYMBOL.EXCHANGE`.
fn ticker(symbol: &Symbol, exchange: &ExchangeId) -> String {
    format!("{symbol}.{exchange}")
}

fn unix_seconds(date: NaiveDate) -> i64 {
    date.and_time(chrono::NaiveTime::MIN).and_utc().timestamp()
}

/// Interprets a response as a list of records: an array of objects, or an
/// object whose values are objects. `null` is an empty list.
fn into_records(value: Value) -> Result<Vec<Map<String, Value>>> {
    let items: Vec<Value> = match value {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => items,
        Value::Object(map) => map.into_iter().map(|(_, v)| v).collect(),
        other => {
            return Err(DataError::Parse(format!(
                "Expected a list of records, got {other}"
            )));
        }
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::Object(record) => Ok(record),
            other => Err(DataError::Parse(format!("Expected a record, got {other}"))),
        })
        .collect()
}

/// Documents of one bulk page, in vendor order.
///
/// Object pages are keyed by position (`"0"`, `"1"`, ...); keys are ordered
/// numerically, non-numeric keys last.
fn into_documents(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Object(map) => {
            let position = |key: &str| key.parse::<u64>().unwrap_or(u64::MAX);
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|(a, _), (b, _)| position(a).cmp(&position(b)).then_with(|| a.cmp(b)));
            entries.into_iter().map(|(_, v)| v).collect()
        }
        _ => Vec::new(),
    }
}
