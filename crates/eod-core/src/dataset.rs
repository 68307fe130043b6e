//! Dataset types, the per-type strategy table and cache keys.
//!
//! Every cacheable dataset is described by a [`DatasetSpec`]: its directory
//! name, the ordered dimensions that make up its cache path, the snapshot
//! format and the default staleness window. A [`DatasetKey`] pairs a type with
//! validated dimension values and resolves to a directory of the form
//!
//! ```text
//! <base>/<dataset_type>/[<dimension>/...]/<YYYYMMDD>/<dataset_type>_<YYYYMMDD>.<ext>
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::{
    error::{DataError, Result},
    frequency::Frequency,
    payload::SnapshotFormat,
    types::{CaptureDate, ExchangeId, Symbol},
};

/// A category of cacheable vendor data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetType {
    /// List of all exchanges supported by the vendor.
    ExchangeList,
    /// Listed and delisted symbols of one exchange.
    ExchangeSymbols,
    /// End-of-day or intraday price history of one symbol.
    HistoricalTimeSeries,
    /// Daily market capitalization history of one symbol.
    MarketCap,
    /// Fundamentals document of one equity.
    FundamentalEquity,
    /// Fundamentals documents of a whole exchange.
    FundamentalEquityBulk,
}

/// One path dimension of a dataset key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Dimension {
    /// Sampling frequency (`1d`, `1h`, ...).
    Frequency,
    /// Exchange id.
    Exchange,
    /// Ticker symbol.
    Symbol,
}

impl Dimension {
    const fn label(&self) -> &'static str {
        match self {
            Self::Frequency => "frequency",
            Self::Exchange => "exchange id",
            Self::Symbol => "symbol",
        }
    }
}

/// Static configuration record of a dataset type.
#[derive(Debug, PartialEq, Eq)]
pub struct DatasetSpec {
    /// Directory name and file-name prefix.
    pub name: &'static str,
    /// Path dimensions, in path order. All of them are required.
    pub dimensions: &'static [Dimension],
    /// Serialization format, fixed for the lifetime of the type.
    pub format: SnapshotFormat,
    /// Allowed snapshot age when the caller does not override it.
    pub default_max_age_days: u32,
}

static EXCHANGE_LIST: DatasetSpec = DatasetSpec {
    name: "exchange_list",
    dimensions: &[],
    format: SnapshotFormat::Tabular,
    default_max_age_days: 0,
};

static EXCHANGE_SYMBOLS: DatasetSpec = DatasetSpec {
    name: "exchange_symbols",
    dimensions: &[Dimension::Exchange],
    format: SnapshotFormat::Tabular,
    default_max_age_days: 0,
};

static HISTORICAL_TIME_SERIES: DatasetSpec = DatasetSpec {
    name: "historical_time_series",
    dimensions: &[Dimension::Frequency, Dimension::Exchange, Dimension::Symbol],
    format: SnapshotFormat::Tabular,
    default_max_age_days: 0,
};

static MARKET_CAP: DatasetSpec = DatasetSpec {
    name: "market_cap",
    dimensions: &[Dimension::Frequency, Dimension::Exchange, Dimension::Symbol],
    format: SnapshotFormat::Tabular,
    default_max_age_days: 0,
};

static FUNDAMENTAL_EQUITY: DatasetSpec = DatasetSpec {
    name: "fundamental_equity",
    dimensions: &[Dimension::Exchange, Dimension::Symbol],
    format: SnapshotFormat::Document,
    default_max_age_days: 30,
};

static FUNDAMENTAL_EQUITY_BULK: DatasetSpec = DatasetSpec {
    name: "fundamental_equity_bulk",
    dimensions: &[Dimension::Exchange],
    format: SnapshotFormat::Document,
    default_max_age_days: 30,
};

impl DatasetType {
    /// Every dataset type, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::ExchangeList,
        Self::ExchangeSymbols,
        Self::HistoricalTimeSeries,
        Self::MarketCap,
        Self::FundamentalEquity,
        Self::FundamentalEquityBulk,
    ];

    /// Returns the strategy record for this type.
    #[must_use]
    pub fn spec(&self) -> &'static DatasetSpec {
        match self {
            Self::ExchangeList => &EXCHANGE_LIST,
            Self::ExchangeSymbols => &EXCHANGE_SYMBOLS,
            Self::HistoricalTimeSeries => &HISTORICAL_TIME_SERIES,
            Self::MarketCap => &MARKET_CAP,
            Self::FundamentalEquity => &FUNDAMENTAL_EQUITY,
            Self::FundamentalEquityBulk => &FUNDAMENTAL_EQUITY_BULK,
        }
    }

    /// Directory name of this type.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.spec().name
    }

    /// Snapshot format of this type.
    #[must_use]
    pub fn format(&self) -> SnapshotFormat {
        self.spec().format
    }

    /// Default allowed snapshot age in days.
    #[must_use]
    pub fn default_max_age_days(&self) -> u32 {
        self.spec().default_max_age_days
    }
}

impl fmt::Display for DatasetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DatasetType {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| DataError::UnsupportedFormat(format!("Unsupported data type: {s}")))
    }
}

/// Dimension parameters of a dataset request.
///
/// Parameters that the dataset type does not use are ignored.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Dimensions {
    /// Exchange id.
    pub exchange: Option<ExchangeId>,
    /// Ticker symbol.
    pub symbol: Option<Symbol>,
    /// Sampling frequency; defaults to daily for types that use it.
    pub frequency: Option<Frequency>,
}

impl Dimensions {
    /// Creates an empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the exchange id.
    #[must_use]
    pub fn with_exchange(mut self, exchange: impl Into<ExchangeId>) -> Self {
        self.exchange = Some(exchange.into());
        self
    }

    /// Sets the symbol.
    #[must_use]
    pub fn with_symbol(mut self, symbol: impl Into<Symbol>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    /// Sets the frequency.
    #[must_use]
    pub const fn with_frequency(mut self, frequency: Frequency) -> Self {
        self.frequency = Some(frequency);
        self
    }
}

/// Identifies a cacheable artifact: a dataset type plus its validated dimensions.
///
/// Only the dimensions used by the type are retained, so two keys compare equal
/// exactly when they resolve to the same directory.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DatasetKey {
    dataset_type: DatasetType,
    components: Vec<String>,
    dimensions: Dimensions,
}

impl DatasetKey {
    /// Builds a key, checking that every dimension the type requires is present.
    ///
    /// # Errors
    /// Returns [`DataError::Configuration`] if a required dimension is missing,
    /// blank, or not usable as a single path component.
    pub fn new(dataset_type: DatasetType, dimensions: &Dimensions) -> Result<Self> {
        let spec = dataset_type.spec();
        let mut components = Vec::with_capacity(spec.dimensions.len());
        let mut retained = Dimensions::default();

        for dimension in spec.dimensions {
            let value = match dimension {
                Dimension::Frequency => {
                    let frequency = dimensions.frequency.unwrap_or_default();
                    retained.frequency = Some(frequency);
                    frequency.as_str().to_string()
                }
                Dimension::Exchange => {
                    let exchange = dimensions.exchange.clone().unwrap_or_default();
                    let value = exchange.as_str().to_string();
                    retained.exchange = Some(exchange);
                    value
                }
                Dimension::Symbol => {
                    let symbol = dimensions.symbol.clone().unwrap_or_default();
                    let value = symbol.as_str().to_string();
                    retained.symbol = Some(symbol);
                    value
                }
            };
            validate_component(dataset_type, *dimension, &value)?;
            components.push(value);
        }

        Ok(Self {
            dataset_type,
            components,
            dimensions: retained,
        })
    }

    /// The dataset type of this key.
    #[must_use]
    pub const fn dataset_type(&self) -> DatasetType {
        self.dataset_type
    }

    /// The retained dimension values.
    #[must_use]
    pub const fn dimensions(&self) -> &Dimensions {
        &self.dimensions
    }

    /// Directory of this key relative to the cache root.
    #[must_use]
    pub fn relative_path(&self) -> PathBuf {
        let mut path = PathBuf::from(self.dataset_type.name());
        path.extend(&self.components);
        path
    }

    /// Directory holding every capture of this key.
    #[must_use]
    pub fn directory(&self, base: &Path) -> PathBuf {
        base.join(self.relative_path())
    }

    /// File name of the snapshot captured on `capture`.
    #[must_use]
    pub fn file_name(&self, capture: CaptureDate) -> String {
        format!(
            "{}_{capture}.{}",
            self.dataset_type.name(),
            self.dataset_type.format().extension()
        )
    }

    /// Full path of the snapshot captured on `capture`.
    #[must_use]
    pub fn snapshot_path(&self, base: &Path, capture: CaptureDate) -> PathBuf {
        self.directory(base)
            .join(capture.to_string())
            .join(self.file_name(capture))
    }
}

impl fmt::Display for DatasetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dataset_type)?;
        for component in &self.components {
            write!(f, "/{component}")?;
        }
        Ok(())
    }
}

/// Resolves the cache directory of a dataset request.
///
/// Pure: performs no I/O.
///
/// # Errors
/// Returns [`DataError::Configuration`] if a required dimension is missing or blank.
pub fn resolve_path(
    base: &Path,
    dataset_type: DatasetType,
    dimensions: &Dimensions,
) -> Result<PathBuf> {
    Ok(DatasetKey::new(dataset_type, dimensions)?.directory(base))
}

fn validate_component(dataset_type: DatasetType, dimension: Dimension, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(DataError::configuration(format!(
            "The {} must be provided for {dataset_type}",
            dimension.label()
        )));
    }
    if value == "." || value == ".." || value.contains(['/', '\\', '\0']) {
        return Err(DataError::configuration(format!(
            "Invalid {} for {dataset_type}: {value:?}",
            dimension.label()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn aapl() -> Dimensions {
        Dimensions::new().with_exchange("US").with_symbol("AAPL")
    }

    #[test]
    fn test_price_history_path_order() {
        let path = resolve_path(
            Path::new("/cache"),
            DatasetType::HistoricalTimeSeries,
            &aapl().with_frequency(Frequency::Hourly),
        )
        .unwrap();
        assert_eq!(
            path,
            PathBuf::from("/cache/historical_time_series/1h/US/AAPL")
        );
    }

    #[test]
    fn test_frequency_defaults_to_daily() {
        let key = DatasetKey::new(DatasetType::MarketCap, &aapl()).unwrap();
        assert_eq!(key.relative_path(), PathBuf::from("market_cap/1d/US/AAPL"));
        assert_eq!(
            key,
            DatasetKey::new(
                DatasetType::MarketCap,
                &aapl().with_frequency(Frequency::Daily)
            )
            .unwrap()
        );
    }

    #[test]
    fn test_unused_dimensions_are_ignored() {
        let with_symbol = DatasetKey::new(DatasetType::ExchangeList, &aapl()).unwrap();
        let bare = DatasetKey::new(DatasetType::ExchangeList, &Dimensions::new()).unwrap();
        assert_eq!(with_symbol, bare);
        assert_eq!(bare.relative_path(), PathBuf::from("exchange_list"));
    }

    #[test]
    fn test_missing_exchange_is_configuration_error() {
        let err = DatasetKey::new(
            DatasetType::ExchangeSymbols,
            &Dimensions::new().with_symbol("AAPL"),
        )
        .unwrap_err();
        assert!(matches!(err, DataError::Configuration(_)));

        let err = DatasetKey::new(
            DatasetType::FundamentalEquity,
            &Dimensions::new().with_exchange("  ").with_symbol("AAPL"),
        )
        .unwrap_err();
        assert!(matches!(err, DataError::Configuration(_)));
    }

    #[test]
    fn test_separator_in_dimension_rejected() {
        let err = DatasetKey::new(
            DatasetType::FundamentalEquity,
            &Dimensions::new().with_exchange("US").with_symbol("BRK/B"),
        )
        .unwrap_err();
        assert!(matches!(err, DataError::Configuration(_)));

        let err = DatasetKey::new(
            DatasetType::FundamentalEquity,
            &Dimensions::new().with_exchange("..").with_symbol("X"),
        )
        .unwrap_err();
        assert!(matches!(err, DataError::Configuration(_)));
    }

    #[test]
    fn test_distinct_requests_distinct_paths() {
        let mut seen = std::collections::HashSet::new();
        for dataset_type in DatasetType::ALL {
            for exchange in ["US", "LSE"] {
                for symbol in ["AAPL", "MSFT"] {
                    for frequency in [Frequency::Daily, Frequency::Minute] {
                        let dims = Dimensions::new()
                            .with_exchange(exchange)
                            .with_symbol(symbol)
                            .with_frequency(frequency);
                        let key = DatasetKey::new(dataset_type, &dims).unwrap();
                        let path = key.relative_path();
                        // Same inputs always give the same path.
                        assert_eq!(path, DatasetKey::new(dataset_type, &dims).unwrap().relative_path());
                        seen.insert((key, path));
                    }
                }
            }
        }
        let keys: std::collections::HashSet<_> = seen.iter().map(|(k, _)| k.clone()).collect();
        let paths: std::collections::HashSet<_> = seen.iter().map(|(_, p)| p.clone()).collect();
        assert_eq!(keys.len(), paths.len());
    }

    #[test]
    fn test_snapshot_path_layout() {
        let key = DatasetKey::new(DatasetType::FundamentalEquity, &aapl()).unwrap();
        let capture = CaptureDate::new(NaiveDate::from_ymd_opt(2023, 1, 15).unwrap()).unwrap();
        assert_eq!(
            key.snapshot_path(Path::new("/cache"), capture),
            PathBuf::from("/cache/fundamental_equity/US/AAPL/20230115/fundamental_equity_20230115.json")
        );
        assert_eq!(key.to_string(), "fundamental_equity/US/AAPL");
    }

    #[test]
    fn test_dataset_type_from_str() {
        for dataset_type in DatasetType::ALL {
            assert_eq!(dataset_type.name().parse::<DatasetType>().unwrap(), dataset_type);
        }
        assert!(matches!(
            "options_chain".parse::<DatasetType>(),
            Err(DataError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_default_staleness_table() {
        assert_eq!(DatasetType::FundamentalEquity.default_max_age_days(), 30);
        assert_eq!(DatasetType::HistoricalTimeSeries.default_max_age_days(), 0);
        assert_eq!(DatasetType::FundamentalEquity.format(), SnapshotFormat::Document);
        assert_eq!(DatasetType::MarketCap.format(), SnapshotFormat::Tabular);
    }
}
