#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/eod/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Cached access to EOD Historical Data.
//!
//! Re-exports the core types, the snapshot store, the HTTP client and the
//! fundamentals model, and provides [`EodHelper`], which serves every
//! dataset from a date-partitioned disk cache before going to the network.
//!
//! # Example
//!
//! ```rust,ignore
//! use eod::{EodConfig, EodHelper, FundamentalEquity, Cadence};
//!
//! #[tokio::main]
//! async fn main() -> eod::Result<()> {
//!     let config = EodConfig::from_toml_file("eod.toml")?.with_env_overrides();
//!     let helper = EodHelper::from_config(config);
//!
//!     let document = helper.get_fundamental_equity("US", "AAPL", None).await?;
//!     let equity = FundamentalEquity::new(document, Cadence::Quarterly)?;
//!     println!("ROE: {}", equity.return_on_equity()?);
//!
//!     Ok(())
//! }
//! ```

// Core types and traits
pub use eod_core::*;

// Snapshot store
pub use eod_cache::{
    CacheStore, CachedSnapshot, FundamentalsSummary, GeneralSummary, SeriesSummary,
    SnapshotEntry, find_valid_snapshot, fundamentals_summary, latest_snapshots,
    list_capture_dates, read_snapshot, remove_empty_snapshot_dirs, series_summary,
};

// Vendor client
pub use eod_client::EodClient;

// Fundamentals
pub use eod_fundamentals::{
    FinancialStatement, FundamentalEquity, SharesPoint, StatementKind, clean_shares_series,
    common_reporting_dates,
};

mod helper;
pub use helper::{
    COMMON_STOCK, DEFAULT_WORKERS, DownloadKind, DownloadOptions, DownloadSummary, EodHelper,
};
