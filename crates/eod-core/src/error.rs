//! Error type shared by every crate of the workspace.
//!
//! Foreign errors (I/O, polars, JSON, HTTP) are carried as strings so that
//! [`DataError`] stays independent of their crates.

use std::time::Duration;
use thiserror::Error;

/// Failure of a cache, fetch or fundamentals operation.
#[derive(Error, Debug)]
pub enum DataError {
    /// A dataset request is missing a dimension, or a dimension cannot be
    /// used as a path component.
    ///
    /// Raised before any I/O and never retried.
    #[error("invalid dataset configuration: {0}")]
    Configuration(String),

    /// A file extension, dataset type name or payload kind is not recognized.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Reading or writing the snapshot tree failed.
    #[error("snapshot cache: {0}")]
    Cache(String),

    /// Vendor data or a cached snapshot could not be decoded.
    #[error("could not parse {0}")]
    Parse(String),

    /// A request argument is out of range, e.g. an unknown statement field
    /// or an intraday window that is too long.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The dataset does not support the requested combination.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// The vendor has no data for the requested ticker.
    #[error("{0} not found at vendor")]
    NotFound(String),

    /// Transport failure or a non-success HTTP status.
    #[error("vendor request failed: {0}")]
    Network(String),

    /// The vendor answered HTTP 429.
    #[error("rate limited on {endpoint} (retry after {retry_after:?})")]
    RateLimited {
        /// Endpoint path of the rejected request.
        endpoint: String,
        /// Value of the `Retry-After` header, when present.
        retry_after: Option<Duration>,
    },
}

impl DataError {
    /// Builds a [`DataError::Configuration`].
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Builds a [`DataError::Cache`] from any displayable error.
    pub fn cache(err: impl std::fmt::Display) -> Self {
        Self::Cache(err.to_string())
    }
}

/// Result alias over [`DataError`].
pub type Result<T> = std::result::Result<T, DataError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(
            DataError::configuration("missing symbol").to_string(),
            "invalid dataset configuration: missing symbol"
        );
        let err = DataError::RateLimited {
            endpoint: "eod/AAPL.US".into(),
            retry_after: Some(Duration::from_secs(5)),
        };
        assert_eq!(err.to_string(), "rate limited on eod/AAPL.US (retry after Some(5s))");
        assert!(matches!(DataError::cache("disk full"), DataError::Cache(m) if m == "disk full"));
    }
}
