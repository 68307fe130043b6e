#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/eod/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

/// Reporting-date alignment.
pub mod align;
/// Fundamental equity view and derived metrics.
pub mod equity;
/// Shares-outstanding cleaning.
pub mod shares;
/// Statement access.
pub mod statement;

pub use align::common_reporting_dates;
pub use equity::FundamentalEquity;
pub use shares::{SharesPoint, clean_shares_series};
pub use statement::{FieldSpec, FinancialStatement, StatementKind, coerce_number};
