//! Sampling frequency and reporting cadence definitions.
//!
//! This module defines [`Frequency`] for the granularity of vendor time series
//! and [`Cadence`] for fundamental statement periods.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DataError;

/// Frequency/granularity of a vendor time series.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Frequency {
    /// One-minute bars.
    #[serde(rename = "1m")]
    Minute,
    /// Five-minute bars.
    #[serde(rename = "5m")]
    FiveMinute,
    /// Hourly bars.
    #[serde(rename = "1h")]
    Hourly,
    /// Daily bars.
    #[default]
    #[serde(rename = "1d")]
    Daily,
}

impl Frequency {
    /// Returns the vendor code for this frequency (`1d`, `1h`, ...).
    ///
    /// This string is also the frequency component of cache paths.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Minute => "1m",
            Self::FiveMinute => "5m",
            Self::Hourly => "1h",
            Self::Daily => "1d",
        }
    }

    /// Returns true if this is an intraday frequency.
    #[must_use]
    pub const fn is_intraday(&self) -> bool {
        matches!(self, Self::Minute | Self::FiveMinute | Self::Hourly)
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1m" => Ok(Self::Minute),
            "5m" => Ok(Self::FiveMinute),
            "1h" => Ok(Self::Hourly),
            "1d" => Ok(Self::Daily),
            other => Err(DataError::NotSupported(format!(
                "Unsupported frequency: {other}"
            ))),
        }
    }
}

/// Reporting cadence of fundamental statements.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cadence {
    /// Quarterly filings.
    #[default]
    Quarterly,
    /// Yearly filings.
    Yearly,
}

impl Cadence {
    /// Key of this cadence inside a statement section of a fundamentals document.
    #[must_use]
    pub const fn statement_key(&self) -> &'static str {
        match self {
            Self::Quarterly => "quarterly",
            Self::Yearly => "yearly",
        }
    }

    /// Key of this cadence inside the `outstandingShares` section.
    #[must_use]
    pub const fn shares_key(&self) -> &'static str {
        match self {
            Self::Quarterly => "quarterly",
            Self::Yearly => "annual",
        }
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.statement_key())
    }
}

impl FromStr for Cadence {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "q" | "quarterly" => Ok(Self::Quarterly),
            "y" | "yearly" | "annual" => Ok(Self::Yearly),
            other => Err(DataError::InvalidParameter(format!(
                "Cadence must be quarterly (\"q\") or yearly (\"y\"), got {other:?}"
            ))),
        }
    }
}
