//! Runtime configuration.
//!
//! [`EodConfig`] gathers everything that would otherwise be a module-level
//! global: vendor endpoint, credentials, cache root, exchange lists and the
//! staleness policy. It is passed explicitly to every component.

use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::{
    dataset::DatasetType,
    error::{DataError, Result},
};

/// Environment variable that overrides the configured API token.
pub const API_TOKEN_ENV: &str = "EOD_API_TOKEN";

/// Default vendor API root.
pub const DEFAULT_BASE_URL: &str = "https://eodhistoricaldata.com/api";

/// Venue codes that the vendor serves under the consolidated `US` exchange id.
pub const US_EXCHANGES: &[&str] = &[
    "AMEX", "BATS", "NASDAQ", "NMFQS", "NYSE", "NYSE ARCA", "NYSE MKT", "OTC", "OTCBB", "OTCCE",
    "OTCGREY", "OTCMKTS", "OTCQB", "OTCQX", "PINK",
];

/// Venues dropped when building a download universe.
pub const EXCLUDED_EXCHANGES: &[&str] = &["US", "NMFQS"];

/// Default allowed snapshot age per dataset type, overridable per call.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "BTreeMap<String, u32>")]
pub struct StalenessPolicy {
    overrides: BTreeMap<DatasetType, u32>,
}

impl TryFrom<BTreeMap<String, u32>> for StalenessPolicy {
    type Error = DataError;

    fn try_from(raw: BTreeMap<String, u32>) -> Result<Self> {
        let overrides = raw
            .into_iter()
            .map(|(name, days)| Ok((name.parse::<DatasetType>()?, days)))
            .collect::<Result<_>>()?;
        Ok(Self { overrides })
    }
}

impl StalenessPolicy {
    /// Policy that uses the built-in defaults of every dataset type.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the default allowed age of one dataset type.
    #[must_use]
    pub fn with_max_age(mut self, dataset_type: DatasetType, days: u32) -> Self {
        self.overrides.insert(dataset_type, days);
        self
    }

    /// Allowed age in days for `dataset_type` when the caller gives none.
    #[must_use]
    pub fn max_age_days(&self, dataset_type: DatasetType) -> u32 {
        self.overrides
            .get(&dataset_type)
            .copied()
            .unwrap_or_else(|| dataset_type.default_max_age_days())
    }
}

/// Configuration shared by the cache, the vendor client and the orchestrator.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EodConfig {
    /// Vendor API token.
    pub api_token: String,
    /// Root directory of the snapshot cache.
    pub base_path: PathBuf,
    /// Vendor API root URL.
    pub base_url: String,
    /// Venues normalised to the `US` exchange id.
    pub us_exchanges: Vec<String>,
    /// Venues excluded from download universes.
    pub excluded_exchanges: Vec<String>,
    /// First day requested when a daily series has no explicit start.
    pub historical_start_date: NaiveDate,
    /// Longest span, in days, of a single intraday request.
    pub max_intraday_days: u32,
    /// Per-type default staleness windows.
    pub staleness: StalenessPolicy,
}

impl Default for EodConfig {
    fn default() -> Self {
        Self {
            api_token: String::new(),
            base_path: std::env::temp_dir(),
            base_url: DEFAULT_BASE_URL.to_string(),
            us_exchanges: US_EXCHANGES.iter().map(|s| (*s).to_string()).collect(),
            excluded_exchanges: EXCLUDED_EXCHANGES.iter().map(|s| (*s).to_string()).collect(),
            historical_start_date: NaiveDate::from_ymd_opt(1999, 12, 31).unwrap_or_default(),
            max_intraday_days: 120,
            staleness: StalenessPolicy::default(),
        }
    }
}

impl fmt::Debug for EodConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EodConfig")
            .field("api_token", &"[REDACTED]")
            .field("base_path", &self.base_path)
            .field("base_url", &self.base_url)
            .field("excluded_exchanges", &self.excluded_exchanges)
            .field("historical_start_date", &self.historical_start_date)
            .field("max_intraday_days", &self.max_intraday_days)
            .field("staleness", &self.staleness)
            .finish_non_exhaustive()
    }
}

impl EodConfig {
    /// Creates a configuration with the given token and cache root.
    #[must_use]
    pub fn new(api_token: impl Into<String>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            api_token: api_token.into(),
            base_path: base_path.into(),
            ..Default::default()
        }
    }

    /// Parses a TOML document.
    ///
    /// # Errors
    /// Returns [`DataError::Configuration`] if the document is malformed.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| DataError::configuration(e.to_string()))
    }

    /// Loads a TOML file, then applies the `EOD_API_TOKEN` override.
    ///
    /// # Errors
    /// Returns [`DataError::Configuration`] if the file cannot be read or parsed.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| DataError::configuration(format!("{}: {e}", path.display())))?;
        Ok(Self::from_toml_str(&text)?.with_env_overrides())
    }

    /// Replaces the API token with `EOD_API_TOKEN` when that variable is set.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        match std::env::var(API_TOKEN_ENV) {
            Ok(token) if !token.is_empty() => self.api_token = token,
            _ => {}
        }
        self
    }

    /// Sets the cache root.
    #[must_use]
    pub fn with_base_path(mut self, base_path: impl Into<PathBuf>) -> Self {
        self.base_path = base_path.into();
        self
    }

    /// Sets the vendor API root.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the excluded venues.
    #[must_use]
    pub fn with_excluded_exchanges(mut self, exchanges: Vec<String>) -> Self {
        self.excluded_exchanges = exchanges;
        self
    }

    /// Sets the staleness policy.
    #[must_use]
    pub fn with_staleness(mut self, staleness: StalenessPolicy) -> Self {
        self.staleness = staleness;
        self
    }
}
