#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/eod/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Date-partitioned snapshot cache.
//!
//! - [`CacheStore`] - Writes and reads immutable snapshots under a base directory
//! - [`find_valid_snapshot`] - Staleness-aware lookup of the newest usable capture
//! - [`maintenance`] - Pruning and inventory of the snapshot tree

/// Cache housekeeping and inventory.
pub mod maintenance;
/// Staleness-aware lookup.
pub mod staleness;
/// Snapshot persistence.
pub mod store;

pub use maintenance::{
    FundamentalsSummary, GeneralSummary, SeriesSummary, SnapshotEntry, fundamentals_summary,
    latest_snapshots, remove_empty_snapshot_dirs, series_summary,
};
pub use staleness::{find_valid_snapshot, list_capture_dates};
pub use store::{CacheStore, CachedSnapshot, read_snapshot};
