//! Core identifier types.
//!
//! - [`Symbol`] - Trading symbol/ticker
//! - [`ExchangeId`] - Vendor exchange identifier
//! - [`CaptureDate`] - Day on which a snapshot was fetched

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DataError;

/// A trading symbol/ticker.
///
/// Symbols are trimmed and uppercased on creation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol(String);

impl Symbol {
    /// Creates a new symbol from a string, converting to uppercase.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into().trim().to_uppercase())
    }

    /// Returns the symbol as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Symbol {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// A vendor exchange identifier such as `US`, `LSE` or `TO`.
///
/// Like [`Symbol`], identifiers are trimmed and uppercased.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExchangeId(String);

impl ExchangeId {
    /// The consolidated US exchange id.
    pub const US: &'static str = "US";

    /// Creates a new exchange id.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into().trim().to_uppercase())
    }

    /// Returns the exchange id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Maps individual US venues (NASDAQ, NYSE, ...) onto the consolidated `US` id.
    #[must_use]
    pub fn normalized(self, us_exchanges: &[String]) -> Self {
        if us_exchanges.iter().any(|e| e.eq_ignore_ascii_case(&self.0)) {
            Self(Self::US.to_string())
        } else {
            self
        }
    }
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ExchangeId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ExchangeId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Calendar day on which a snapshot was captured.
///
/// Rendered as fixed-width `YYYYMMDD`, so lexicographic order of directory
/// names equals chronological order. Parsing accepts nothing else.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CaptureDate(NaiveDate);

impl CaptureDate {
    /// Wraps a calendar date.
    ///
    /// # Errors
    /// Returns [`DataError::InvalidParameter`] for years outside `0..=9999`,
    /// which cannot be rendered in eight digits.
    pub fn new(date: NaiveDate) -> crate::Result<Self> {
        use chrono::Datelike;
        if (0..=9999).contains(&date.year()) {
            Ok(Self(date))
        } else {
            Err(DataError::InvalidParameter(format!(
                "Capture date {date} cannot be rendered as YYYYMMDD"
            )))
        }
    }

    /// Returns the wrapped date.
    #[must_use]
    pub const fn date(&self) -> NaiveDate {
        self.0
    }
}

impl fmt::Display for CaptureDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y%m%d"))
    }
}

impl FromStr for CaptureDate {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DataError::Parse(format!("Not a YYYYMMDD capture date: {s}")));
        }
        NaiveDate::parse_from_str(s, "%Y%m%d")
            .map(Self)
            .map_err(|e| DataError::Parse(format!("{s}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_uppercases() {
        assert_eq!(Symbol::new(" aapl ").as_str(), "AAPL");
        assert_eq!(Symbol::from("msft"), Symbol::new("MSFT"));
    }

    #[test]
    fn test_exchange_normalization() {
        let us = vec!["NASDAQ".to_string(), "NYSE".to_string()];
        assert_eq!(ExchangeId::new("nasdaq").normalized(&us).as_str(), "US");
        assert_eq!(ExchangeId::new("LSE").normalized(&us).as_str(), "LSE");
    }

    #[test]
    fn test_capture_date_fixed_width() {
        let date = NaiveDate::from_ymd_opt(2023, 1, 5).unwrap();
        let capture = CaptureDate::new(date).unwrap();
        assert_eq!(capture.to_string(), "20230105");
        assert_eq!("20230105".parse::<CaptureDate>().unwrap(), capture);
    }

    #[test]
    fn test_capture_date_rejects_other_layouts() {
        assert!("2023-01-05".parse::<CaptureDate>().is_err());
        assert!("2023015".parse::<CaptureDate>().is_err());
        assert!("20231301".parse::<CaptureDate>().is_err());
        assert!("tmp".parse::<CaptureDate>().is_err());
    }
}
