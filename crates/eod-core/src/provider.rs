//! Dataset requests and the fetch collaborator trait.
//!
//! - [`DatasetRequest`] - One "get data" call: dataset type, dimensions, fetch
//!   window and staleness override
//! - [`FetchWindow`] - Optional date bounds of a time-series request
//! - [`DatasetFetcher`] - Obtains fresh payloads from the vendor

use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use std::fmt::Debug;

use crate::{
    config::EodConfig,
    dataset::{DatasetKey, DatasetType, Dimensions},
    error::{DataError, Result},
    frequency::Frequency,
    payload::Payload,
    types::{ExchangeId, Symbol},
};

/// Obtains fresh data for a dataset request.
///
/// Implementations must return payloads in the format of the requested
/// dataset type. Errors are propagated to the caller unchanged.
#[async_trait]
pub trait DatasetFetcher: Send + Sync + Debug {
    /// Fetches the payload for `request`.
    async fn fetch(&self, request: &DatasetRequest) -> Result<Payload>;
}

/// Optional date bounds of a time-series request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FetchWindow {
    /// First day requested.
    pub start: Option<NaiveDate>,
    /// Last day requested.
    pub end: Option<NaiveDate>,
}

/// Concrete bounds produced by [`FetchWindow::resolve`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedWindow {
    /// First day requested.
    pub start: NaiveDate,
    /// Last day requested.
    pub end: NaiveDate,
}

impl FetchWindow {
    /// Creates a window from optional bounds.
    #[must_use]
    pub const fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    /// Fills in missing bounds.
    ///
    /// The end defaults to yesterday. A missing start is the configured
    /// historical start for daily data and `max_intraday_days` before the end
    /// for intraday data.
    ///
    /// # Errors
    /// Returns [`DataError::InvalidParameter`] when an explicit intraday window
    /// is longer than `max_intraday_days`, or when start is after end.
    pub fn resolve(
        &self,
        frequency: Frequency,
        today: NaiveDate,
        config: &EodConfig,
    ) -> Result<ResolvedWindow> {
        let end = match self.end {
            Some(end) => end,
            None => today
                .checked_sub_days(Days::new(1))
                .ok_or_else(|| DataError::InvalidParameter(format!("No day before {today}")))?,
        };
        let max_span = Days::new(u64::from(config.max_intraday_days));

        let start = match self.start {
            Some(start) => {
                if frequency.is_intraday() && (end - start).num_days() > i64::from(config.max_intraday_days) {
                    return Err(DataError::InvalidParameter(
                        "Request is too long and must be broken into smaller requests.".to_string(),
                    ));
                }
                start
            }
            None if frequency.is_intraday() => end.checked_sub_days(max_span).ok_or_else(|| {
                DataError::InvalidParameter(format!("Intraday window before {end} underflows"))
            })?,
            None => config.historical_start_date,
        };

        if start > end {
            return Err(DataError::InvalidParameter(format!(
                "Window start {start} is after end {end}"
            )));
        }
        Ok(ResolvedWindow { start, end })
    }
}

/// One "get data" call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatasetRequest {
    dataset_type: DatasetType,
    dimensions: Dimensions,
    window: FetchWindow,
    as_of: Option<NaiveDate>,
    max_age_days: Option<u32>,
    page_size: Option<usize>,
}

impl DatasetRequest {
    /// Creates a request for `dataset_type` with no dimensions set.
    #[must_use]
    pub fn new(dataset_type: DatasetType) -> Self {
        Self {
            dataset_type,
            dimensions: Dimensions::default(),
            window: FetchWindow::default(),
            as_of: None,
            max_age_days: None,
            page_size: None,
        }
    }

    /// Sets the exchange id.
    #[must_use]
    pub fn exchange(mut self, exchange: impl Into<ExchangeId>) -> Self {
        self.dimensions.exchange = Some(exchange.into());
        self
    }

    /// Sets the symbol.
    #[must_use]
    pub fn symbol(mut self, symbol: impl Into<Symbol>) -> Self {
        self.dimensions.symbol = Some(symbol.into());
        self
    }

    /// Sets the frequency.
    #[must_use]
    pub const fn frequency(mut self, frequency: Frequency) -> Self {
        self.dimensions.frequency = Some(frequency);
        self
    }

    /// Sets the fetch window.
    #[must_use]
    pub const fn window(mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        self.window = FetchWindow::new(start, end);
        self
    }

    /// Sets the date the cached data must be valid for. Defaults to today.
    #[must_use]
    pub const fn as_of(mut self, as_of: NaiveDate) -> Self {
        self.as_of = Some(as_of);
        self
    }

    /// Overrides the allowed snapshot age for this call.
    #[must_use]
    pub const fn max_age_days(mut self, days: u32) -> Self {
        self.max_age_days = Some(days);
        self
    }

    /// Sets an optional staleness override.
    #[must_use]
    pub const fn stale_days(mut self, days: Option<u32>) -> Self {
        self.max_age_days = days;
        self
    }

    /// Sets the page size used by paginated (bulk) datasets.
    #[must_use]
    pub const fn page_size(mut self, size: usize) -> Self {
        self.page_size = Some(size);
        self
    }

    /// The dataset type.
    #[must_use]
    pub const fn dataset_type(&self) -> DatasetType {
        self.dataset_type
    }

    /// The dimension parameters.
    #[must_use]
    pub const fn dimensions(&self) -> &Dimensions {
        &self.dimensions
    }

    /// The requested window.
    #[must_use]
    pub const fn fetch_window(&self) -> FetchWindow {
        self.window
    }

    /// The explicit as-of date, if any.
    #[must_use]
    pub const fn as_of_date(&self) -> Option<NaiveDate> {
        self.as_of
    }

    /// The explicit staleness override, if any.
    #[must_use]
    pub const fn max_age_override(&self) -> Option<u32> {
        self.max_age_days
    }

    /// The requested page size, if any.
    #[must_use]
    pub const fn page_size_hint(&self) -> Option<usize> {
        self.page_size
    }

    /// Builds the cache key of this request.
    ///
    /// # Errors
    /// Returns [`DataError::Configuration`] if a required dimension is missing.
    pub fn key(&self) -> Result<DatasetKey> {
        DatasetKey::new(self.dataset_type, &self.dimensions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_daily_defaults() {
        let config = EodConfig::default();
        let window = FetchWindow::default()
            .resolve(Frequency::Daily, day(2024, 3, 10), &config)
            .unwrap();
        assert_eq!(window.end, day(2024, 3, 9));
        assert_eq!(window.start, day(1999, 12, 31));
    }

    #[test]
    fn test_intraday_defaults_to_max_span() {
        let config = EodConfig::default();
        let window = FetchWindow::new(None, Some(day(2024, 5, 1)))
            .resolve(Frequency::Hourly, day(2024, 6, 1), &config)
            .unwrap();
        assert_eq!(window.end, day(2024, 5, 1));
        assert_eq!((window.end - window.start).num_days(), 120);
    }

    #[test]
    fn test_intraday_too_long() {
        let config = EodConfig::default();
        let err = FetchWindow::new(Some(day(2023, 1, 1)), Some(day(2024, 1, 1)))
            .resolve(Frequency::Minute, day(2024, 6, 1), &config)
            .unwrap_err();
        assert!(matches!(err, DataError::InvalidParameter(_)));

        // Daily requests have no span limit.
        assert!(
            FetchWindow::new(Some(day(2003, 1, 1)), Some(day(2024, 1, 1)))
                .resolve(Frequency::Daily, day(2024, 6, 1), &config)
                .is_ok()
        );
    }

    #[test]
    fn test_request_key() {
        let request = DatasetRequest::new(DatasetType::HistoricalTimeSeries)
            .exchange("US")
            .symbol("aapl")
            .frequency(Frequency::Daily);
        assert_eq!(
            request.key().unwrap().to_string(),
            "historical_time_series/1d/US/AAPL"
        );
        assert!(DatasetRequest::new(DatasetType::FundamentalEquity).key().is_err());
    }
}
