//! Reporting-date alignment across statements.

use chrono::NaiveDate;
use std::collections::BTreeSet;

use crate::statement::FinancialStatement;

/// Reporting dates present in every statement, ascending.
///
/// Empty when no statements are given or any statement has no dates; callers
/// treat that as "no consistent snapshot available".
#[must_use]
pub fn common_reporting_dates(statements: &[&FinancialStatement]) -> Vec<NaiveDate> {
    let Some((first, rest)) = statements.split_first() else {
        return Vec::new();
    };
    let mut common: BTreeSet<NaiveDate> = first.available_dates().into_iter().collect();
    for statement in rest {
        let dates: BTreeSet<NaiveDate> = statement.available_dates().into_iter().collect();
        common.retain(|date| dates.contains(date));
    }
    common.into_iter().collect()
}
