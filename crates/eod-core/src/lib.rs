#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/eod/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Core types for the EOD historical data cache.
//!
//! This crate provides the foundational abstractions shared by the cache,
//! the vendor client and the orchestrator:
//!
//! - [`DatasetType`](dataset::DatasetType) - Dataset categories and their strategy table
//! - [`DatasetKey`](dataset::DatasetKey) - Validated cache keys and path resolution
//! - [`Payload`](payload::Payload) - Tabular or structured-document snapshot data
//! - [`EodConfig`](config::EodConfig) - Explicit runtime configuration
//! - [`DatasetFetcher`](provider::DatasetFetcher) - Fetch collaborator trait
//! - [`Clock`](clock::Clock) - Injectable source of "today"

/// Injectable clock.
pub mod clock;
/// Runtime configuration and staleness policy.
pub mod config;
/// Dataset types, strategy table and cache keys.
pub mod dataset;
/// Error types for data operations.
pub mod error;
/// Sampling frequency and reporting cadence definitions.
pub mod frequency;
/// Snapshot payloads and formats.
pub mod payload;
/// Dataset requests and the fetch collaborator trait.
pub mod provider;
/// Identifier types (Symbol, ExchangeId, CaptureDate).
pub mod types;

// Re-export commonly used items at crate root
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{EodConfig, StalenessPolicy};
pub use dataset::{DatasetKey, DatasetSpec, DatasetType, Dimension, Dimensions, resolve_path};
pub use error::{DataError, Result};
pub use frequency::{Cadence, Frequency};
pub use payload::{DATE_INDEX, Payload, SnapshotFormat, Table};
pub use provider::{DatasetFetcher, DatasetRequest, FetchWindow, ResolvedWindow};
pub use types::{CaptureDate, ExchangeId, Symbol};
