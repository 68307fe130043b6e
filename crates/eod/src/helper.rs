//! Fetch-or-reuse orchestration over the snapshot cache.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use polars::prelude::{DataFrame, DataType, StringChunked};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use eod_cache::CacheStore;
use eod_client::EodClient;
use eod_core::{
    CaptureDate, Clock, DataError, DatasetFetcher, DatasetRequest, DatasetType, EodConfig,
    ExchangeId, Frequency, Payload, Result, Symbol, SystemClock, Table,
};

/// Security type kept when building a download universe.
pub const COMMON_STOCK: &str = "Common Stock";

/// Characters that mark a symbol code as a non-ordinary listing.
const EXCLUDED_CODE_CHARS: [char; 3] = ['.', '(', '/'];

/// Default number of concurrent downloads.
pub const DEFAULT_WORKERS: usize = 20;

/// Per-symbol dataset fetched by [`EodHelper::download_all`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DownloadKind {
    /// Price series.
    Historical,
    /// Daily market capitalization.
    MarketCap,
    /// Fundamentals document.
    Fundamentals,
}

impl DownloadKind {
    /// Dataset type downloaded for each symbol.
    #[must_use]
    pub const fn dataset_type(&self) -> DatasetType {
        match self {
            Self::Historical => DatasetType::HistoricalTimeSeries,
            Self::MarketCap => DatasetType::MarketCap,
            Self::Fundamentals => DatasetType::FundamentalEquity,
        }
    }
}

/// Parameters shared by every symbol of a bulk download.
#[derive(Clone, Debug)]
pub struct DownloadOptions {
    /// Price series frequency; market cap is always daily.
    pub frequency: Frequency,
    /// First day requested.
    pub start: Option<NaiveDate>,
    /// Last day requested.
    pub end: Option<NaiveDate>,
    /// Staleness override.
    pub stale_days: Option<u32>,
    /// Maximum concurrent requests.
    pub workers: usize,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            frequency: Frequency::Daily,
            start: None,
            end: None,
            stale_days: None,
            workers: DEFAULT_WORKERS,
        }
    }
}

/// Outcome of a bulk download.
#[derive(Debug, Default)]
pub struct DownloadSummary {
    /// Symbols attempted.
    pub total: usize,
    /// Symbols served from cache or fetched successfully.
    pub succeeded: usize,
    /// Symbols that failed, with the error.
    pub failures: Vec<(Symbol, DataError)>,
    /// Wall-clock duration.
    pub elapsed: Duration,
}

/// Single entry point for cached vendor data.
///
/// Each call either reuses the newest snapshot within the allowed age or
/// fetches once, persists the result stamped with today's date, and returns it.
/// A failed fetch writes nothing.
#[derive(Clone, Debug)]
pub struct EodHelper {
    config: EodConfig,
    store: CacheStore,
    fetcher: Arc<dyn DatasetFetcher>,
    clock: Arc<dyn Clock>,
}

impl EodHelper {
    /// Creates a helper that fetches through the vendor HTTP client.
    #[must_use]
    pub fn from_config(config: EodConfig) -> Self {
        Self::from_config_with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a helper over the vendor HTTP client, with one clock driving
    /// both capture dates and default fetch windows.
    #[must_use]
    pub fn from_config_with_clock(config: EodConfig, clock: Arc<dyn Clock>) -> Self {
        let client = EodClient::new(config.clone()).with_clock(Arc::clone(&clock));
        Self::new(config, Arc::new(client)).with_clock(clock)
    }

    /// Creates a helper over an arbitrary fetcher.
    #[must_use]
    pub fn new(config: EodConfig, fetcher: Arc<dyn DatasetFetcher>) -> Self {
        Self {
            store: CacheStore::new(&config.base_path),
            config,
            fetcher,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the clock that supplies capture dates and default as-of dates.
    ///
    /// The fetcher keeps its own clock; use
    /// [`from_config_with_clock`](Self::from_config_with_clock) to share one.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The configuration.
    #[must_use]
    pub const fn config(&self) -> &EodConfig {
        &self.config
    }

    /// The snapshot store.
    #[must_use]
    pub const fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Returns the data for `request`, reusing a valid snapshot when one exists.
    ///
    /// The allowed age is the request override or the configured default for
    /// the dataset type; the as-of date defaults to today.
    ///
    /// # Errors
    /// Returns [`DataError::Configuration`] for missing dimensions, cache I/O
    /// errors, and fetch errors unchanged.
    #[instrument(skip(self, request), fields(key = tracing::field::Empty))]
    pub async fn get(&self, request: &DatasetRequest) -> Result<Payload> {
        let key = request.key()?;
        tracing::Span::current().record("key", tracing::field::display(&key));

        let dataset_type = request.dataset_type();
        let today = self.clock.today();
        let as_of = request.as_of_date().unwrap_or(today);
        let max_age = request
            .max_age_override()
            .unwrap_or_else(|| self.config.staleness.max_age_days(dataset_type));

        if let Some(snapshot) = self.store.find_valid_snapshot(&key, as_of, max_age)? {
            debug!(capture = %snapshot.capture_date, "Serving cached snapshot");
            return snapshot.load();
        }

        debug!(%as_of, max_age, "No valid snapshot, fetching");
        let payload = self.fetcher.fetch(request).await?;
        let snapshot = self.store.write(&key, CaptureDate::new(today)?, &payload)?;
        info!(path = %snapshot.path.display(), "Cached fresh snapshot");
        Ok(payload)
    }

    fn us_normalized(&self, exchange: impl Into<ExchangeId>) -> ExchangeId {
        exchange.into().normalized(&self.config.us_exchanges)
    }

    async fn get_table(&self, request: DatasetRequest) -> Result<Table> {
        self.get(&request).await?.into_table()
    }

    async fn get_document(&self, request: DatasetRequest) -> Result<Value> {
        self.get(&request).await?.into_document()
    }

    /// Supported exchanges.
    ///
    /// # Errors
    /// See [`get`](Self::get).
    pub async fn get_exchange_list(&self, stale_days: Option<u32>) -> Result<Table> {
        self.get_table(DatasetRequest::new(DatasetType::ExchangeList).stale_days(stale_days))
            .await
    }

    /// Listed and delisted symbols of `exchange`.
    ///
    /// # Errors
    /// See [`get`](Self::get).
    pub async fn get_exchange_symbols(
        &self,
        exchange: impl Into<ExchangeId>,
        stale_days: Option<u32>,
    ) -> Result<Table> {
        self.get_table(
            DatasetRequest::new(DatasetType::ExchangeSymbols)
                .exchange(exchange)
                .stale_days(stale_days),
        )
        .await
    }

    /// Common-stock symbols of `exchange` eligible for bulk download.
    ///
    /// Keeps rows typed `Common Stock` with a code and a venue, drops venues
    /// in the configured exclusion list and codes containing `.`, `(` or `/`.
    /// The result is deduplicated and sorted.
    ///
    /// # Errors
    /// See [`get`](Self::get).
    #[instrument(skip(self, exchange))]
    pub async fn get_non_excluded_exchange_symbols(
        &self,
        exchange: impl Into<ExchangeId>,
    ) -> Result<Vec<Symbol>> {
        let table = self.get_exchange_symbols(exchange, None).await?;
        let symbols = filter_universe(table.frame(), &self.config.excluded_exchanges)?;
        debug!(count = symbols.len(), "Filtered download universe");
        Ok(symbols)
    }

    /// Price series of one security.
    ///
    /// Venues listed in `us_exchanges` are served under the `US` id.
    ///
    /// # Errors
    /// See [`get`](Self::get).
    pub async fn get_historical_data(
        &self,
        exchange: impl Into<ExchangeId>,
        symbol: impl Into<Symbol>,
        frequency: Frequency,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        stale_days: Option<u32>,
    ) -> Result<Table> {
        self.get_table(
            DatasetRequest::new(DatasetType::HistoricalTimeSeries)
                .exchange(self.us_normalized(exchange))
                .symbol(symbol)
                .frequency(frequency)
                .window(start, end)
                .stale_days(stale_days),
        )
        .await
    }

    /// Daily market capitalization of one security.
    ///
    /// Venues listed in `us_exchanges` are served under the `US` id.
    ///
    /// # Errors
    /// See [`get`](Self::get).
    pub async fn get_market_cap(
        &self,
        exchange: impl Into<ExchangeId>,
        symbol: impl Into<Symbol>,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        stale_days: Option<u32>,
    ) -> Result<Table> {
        self.get_table(
            DatasetRequest::new(DatasetType::MarketCap)
                .exchange(self.us_normalized(exchange))
                .symbol(symbol)
                .frequency(Frequency::Daily)
                .window(start, end)
                .stale_days(stale_days),
        )
        .await
    }

    /// Fundamentals document of one security.
    ///
    /// # Errors
    /// See [`get`](Self::get).
    pub async fn get_fundamental_equity(
        &self,
        exchange: impl Into<ExchangeId>,
        symbol: impl Into<Symbol>,
        stale_days: Option<u32>,
    ) -> Result<Value> {
        self.get_document(
            DatasetRequest::new(DatasetType::FundamentalEquity)
                .exchange(exchange)
                .symbol(symbol)
                .stale_days(stale_days),
        )
        .await
    }

    /// Fundamentals of every security on `exchange`.
    ///
    /// # Errors
    /// See [`get`](Self::get).
    pub async fn get_fundamentals_bulk(
        &self,
        exchange: impl Into<ExchangeId>,
        page_size: Option<usize>,
        stale_days: Option<u32>,
    ) -> Result<Value> {
        let mut request = DatasetRequest::new(DatasetType::FundamentalEquityBulk)
            .exchange(exchange)
            .stale_days(stale_days);
        if let Some(size) = page_size {
            request = request.page_size(size);
        }
        self.get_document(request).await
    }

    /// Fetches `kind` for every symbol of the filtered universe of `exchange`.
    ///
    /// Up to `options.workers` symbols are in flight at once. A failing
    /// symbol is logged and counted; it does not stop the others.
    ///
    /// # Errors
    /// Fails only if the universe itself cannot be built.
    #[instrument(skip(self, exchange, options))]
    pub async fn download_all(
        &self,
        kind: DownloadKind,
        exchange: impl Into<ExchangeId>,
        options: &DownloadOptions,
    ) -> Result<DownloadSummary> {
        let started = Instant::now();
        let exchange = exchange.into();
        let symbols = self.get_non_excluded_exchange_symbols(exchange.clone()).await?;
        let total = symbols.len();
        info!(total, exchange = %exchange, "Starting bulk download");

        let requests = symbols.into_iter().map(|symbol| {
            let request = DatasetRequest::new(kind.dataset_type())
                .symbol(symbol.clone())
                .stale_days(options.stale_days);
            let request = match kind {
                DownloadKind::Fundamentals => request.exchange(exchange.clone()),
                DownloadKind::Historical => request
                    .exchange(self.us_normalized(exchange.clone()))
                    .frequency(options.frequency)
                    .window(options.start, options.end),
                DownloadKind::MarketCap => request
                    .exchange(self.us_normalized(exchange.clone()))
                    .frequency(Frequency::Daily)
                    .window(options.start, options.end),
            };
            (symbol, request)
        });

        let results: Vec<(Symbol, Result<Payload>)> = stream::iter(requests)
            .map(|(symbol, request)| async move {
                let result = self.get(&request).await;
                (symbol, result)
            })
            .buffer_unordered(options.workers.max(1))
            .collect()
            .await;

        let mut summary = DownloadSummary {
            total,
            ..DownloadSummary::default()
        };
        for (symbol, result) in results {
            match result {
                Ok(_) => summary.succeeded += 1,
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "Download failed");
                    summary.failures.push((symbol, e));
                }
            }
        }
        summary.failures.sort_by(|a, b| a.0.cmp(&b.0));
        summary.elapsed = started.elapsed();
        info!(
            succeeded = summary.succeeded,
            failed = summary.failures.len(),
            elapsed = ?summary.elapsed,
            "Bulk download finished"
        );
        Ok(summary)
    }
}

/// Applies the universe filter to an exchange symbols frame.
fn filter_universe(frame: &DataFrame, excluded: &[String]) -> Result<Vec<Symbol>> {
    let (Some(codes), Some(types), Some(venues)) = (
        string_column(frame, "Code")?,
        string_column(frame, "Type")?,
        string_column(frame, "Exchange")?,
    ) else {
        return Ok(Vec::new());
    };

    let excluded: BTreeSet<String> = excluded.iter().map(|e| e.trim().to_uppercase()).collect();
    let symbols: BTreeSet<Symbol> = (&codes)
        .into_iter()
        .zip(&types)
        .zip(&venues)
        .filter_map(|((code, kind), venue)| {
            let (code, venue) = (code?, venue?);
            let eligible = kind == Some(COMMON_STOCK)
                && !code.trim().is_empty()
                && !excluded.contains(&venue.trim().to_uppercase())
                && !code.contains(EXCLUDED_CODE_CHARS);
            eligible.then(|| Symbol::new(code))
        })
        .collect();
    Ok(symbols.into_iter().collect())
}

/// A column as strings, or `None` when the frame lacks it.
fn string_column(frame: &DataFrame, name: &str) -> Result<Option<StringChunked>> {
    let Ok(column) = frame.column(name) else {
        return Ok(None);
    };
    let cast = column
        .cast(&DataType::String)
        .map_err(|e| DataError::Parse(format!("{name}: {e}")))?;
    let strings = cast
        .str()
        .map_err(|e| DataError::Parse(format!("{name}: {e}")))?
        .clone();
    Ok(Some(strings))
}
