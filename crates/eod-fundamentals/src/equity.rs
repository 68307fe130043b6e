//! Fundamental equity view over a cached fundamentals document.

use chrono::NaiveDate;
use eod_core::{Cadence, DataError, Result};
use serde_json::{Map, Value};
use std::sync::OnceLock;
use tracing::{debug, instrument};

use crate::{
    align::common_reporting_dates,
    shares::{SharesPoint, clean_shares_series},
    statement::{FinancialStatement, STATEMENT_DATE_FORMAT, StatementKind, coerce_number},
};

/// Added to pre-tax income so the tax rate stays finite at zero.
const TAX_RATE_EPSILON: f64 = 1e-10;

/// Company fundamentals at one reporting cadence.
///
/// Statement lookups and metrics are evaluated at [`as_of_date`](Self::as_of_date),
/// which defaults to the latest date reported by all three statements.
#[derive(Debug)]
pub struct FundamentalEquity {
    document: Value,
    cadence: Cadence,
    balance_sheet: FinancialStatement,
    income_statement: FinancialStatement,
    cash_flow: FinancialStatement,
    as_of: Option<NaiveDate>,
    shares: OnceLock<Vec<SharesPoint>>,
}

impl FundamentalEquity {
    /// Wraps a fundamentals document.
    ///
    /// # Errors
    /// Returns [`DataError::Parse`] if the document is not a JSON object or a
    /// statement section is malformed.
    pub fn new(document: Value, cadence: Cadence) -> Result<Self> {
        if !document.is_object() {
            return Err(DataError::Parse(
                "Fundamentals document must be a JSON object".to_string(),
            ));
        }
        let mut equity = Self {
            document,
            cadence,
            balance_sheet: FinancialStatement::default(),
            income_statement: FinancialStatement::default(),
            cash_flow: FinancialStatement::default(),
            as_of: None,
            shares: OnceLock::new(),
        };
        equity.load_statements()?;
        Ok(equity)
    }

    fn load_statements(&mut self) -> Result<()> {
        self.balance_sheet =
            FinancialStatement::from_document(&self.document, StatementKind::BalanceSheet, self.cadence)?;
        self.income_statement = FinancialStatement::from_document(
            &self.document,
            StatementKind::IncomeStatement,
            self.cadence,
        )?;
        self.cash_flow =
            FinancialStatement::from_document(&self.document, StatementKind::CashFlow, self.cadence)?;
        self.as_of = self.common_financial_dates().last().copied();
        Ok(())
    }

    /// The raw document.
    #[must_use]
    pub const fn document(&self) -> &Value {
        &self.document
    }

    /// The `General` section, when the document has one.
    #[must_use]
    pub fn general_section(&self) -> Option<&Map<String, Value>> {
        self.document.get("General")?.as_object()
    }

    /// Field of the `General` section.
    #[must_use]
    pub fn general(&self, field: &str) -> Option<&Value> {
        self.general_section()?.get(field)
    }

    fn general_text(&self, field: &str) -> Option<&str> {
        self.general(field)?.as_str()
    }

    /// Ticker code.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.general_text("Code")
    }

    /// Company name.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.general_text("Name")
    }

    /// Listing venue.
    #[must_use]
    pub fn exchange(&self) -> Option<&str> {
        self.general_text("Exchange")
    }

    /// Security type, e.g. `Common Stock`.
    #[must_use]
    pub fn security_type(&self) -> Option<&str> {
        self.general_text("Type")
    }

    /// Reporting currency code.
    #[must_use]
    pub fn currency_code(&self) -> Option<&str> {
        self.general_text("CurrencyCode")
    }

    /// Whether the vendor marks the security delisted.
    #[must_use]
    pub fn is_delisted(&self) -> bool {
        self.general("IsDelisted").and_then(Value::as_bool).unwrap_or(false)
    }

    /// Current reporting cadence.
    #[must_use]
    pub const fn cadence(&self) -> Cadence {
        self.cadence
    }

    /// Switches cadence, reloading statements and resetting the as-of date
    /// and the memoised shares series.
    ///
    /// # Errors
    /// Returns [`DataError::Parse`] if a statement section is malformed.
    pub fn set_cadence(&mut self, cadence: Cadence) -> Result<()> {
        self.cadence = cadence;
        self.shares = OnceLock::new();
        self.load_statements()
    }

    /// Balance sheet at the current cadence.
    #[must_use]
    pub const fn balance_sheet(&self) -> &FinancialStatement {
        &self.balance_sheet
    }

    /// Income statement at the current cadence.
    #[must_use]
    pub const fn income_statement(&self) -> &FinancialStatement {
        &self.income_statement
    }

    /// Cash flow statement at the current cadence.
    #[must_use]
    pub const fn cash_flow(&self) -> &FinancialStatement {
        &self.cash_flow
    }

    /// Dates reported by all three statements, ascending.
    #[must_use]
    pub fn common_financial_dates(&self) -> Vec<NaiveDate> {
        common_reporting_dates(&[&self.balance_sheet, &self.income_statement, &self.cash_flow])
    }

    /// The reporting date metrics are evaluated at. `None` when the
    /// statements share no date.
    #[must_use]
    pub const fn as_of_date(&self) -> Option<NaiveDate> {
        self.as_of
    }

    /// Sets the evaluation date; `None` restores the latest common date.
    ///
    /// # Errors
    /// Returns [`DataError::InvalidParameter`] if `date` is not reported by
    /// all three statements.
    pub fn set_as_of_date(&mut self, date: Option<NaiveDate>) -> Result<()> {
        let common = self.common_financial_dates();
        self.as_of = match date {
            None => common.last().copied(),
            Some(date) if common.contains(&date) => Some(date),
            Some(date) => {
                return Err(DataError::InvalidParameter(format!(
                    "{date} is not reported by every statement"
                )));
            }
        };
        Ok(())
    }

    fn require_as_of(&self) -> Result<NaiveDate> {
        self.as_of.ok_or_else(|| {
            DataError::InvalidParameter("No reporting date common to all statements".to_string())
        })
    }

    /// Latest filing date across the three statements at the as-of date.
    #[must_use]
    pub fn filing_date(&self) -> Option<NaiveDate> {
        let as_of = self.as_of?;
        [&self.balance_sheet, &self.income_statement, &self.cash_flow]
            .into_iter()
            .filter_map(|statement| statement.text(as_of, "filing_date"))
            .filter_map(|raw| NaiveDate::parse_from_str(raw, STATEMENT_DATE_FORMAT).ok())
            .max()
    }

    fn balance(&self, field: &str) -> Result<f64> {
        self.balance_sheet.value(self.require_as_of()?, field)
    }

    fn income(&self, field: &str) -> Result<f64> {
        self.income_statement.value(self.require_as_of()?, field)
    }

    /// Net income over total stockholder equity.
    ///
    /// # Errors
    /// Returns [`DataError::InvalidParameter`] without a common reporting date.
    pub fn return_on_equity(&self) -> Result<f64> {
        Ok(self.income("netIncome")? / self.balance("totalStockholderEquity")?)
    }

    /// Net income over total assets.
    ///
    /// # Errors
    /// Returns [`DataError::InvalidParameter`] without a common reporting date.
    pub fn return_on_assets(&self) -> Result<f64> {
        Ok(self.income("netIncome")? / self.balance("totalAssets")?)
    }

    /// Income tax expense over pre-tax income.
    ///
    /// # Errors
    /// Returns [`DataError::InvalidParameter`] without a common reporting date.
    pub fn tax_rate(&self) -> Result<f64> {
        Ok(self.income("incomeTaxExpense")? / (TAX_RATE_EPSILON + self.income("incomeBeforeTax")?))
    }

    /// Net operating profit after tax: `ebit * (1 - tax_rate)`.
    ///
    /// # Errors
    /// Returns [`DataError::InvalidParameter`] without a common reporting date.
    pub fn nopat(&self) -> Result<f64> {
        Ok(self.income("ebit")? * (1.0 - self.tax_rate()?))
    }

    /// NOPAT over net invested capital.
    ///
    /// # Errors
    /// Returns [`DataError::InvalidParameter`] without a common reporting date.
    pub fn roic(&self) -> Result<f64> {
        Ok(self.nopat()? / self.balance("netInvestedCapital")?)
    }

    /// Cleaned shares-outstanding series at the current cadence, computed once.
    pub fn shares_series(&self) -> &[SharesPoint] {
        self.shares.get_or_init(|| {
            let raw = self.raw_shares_series();
            debug!(points = raw.len(), cadence = %self.cadence, "Cleaning shares series");
            clean_shares_series(&raw)
        })
    }

    /// Uncleaned shares series: `outstandingShares` when reported, balance
    /// sheet `commonStockSharesOutstanding` otherwise.
    #[instrument(skip(self), fields(code = ?self.code()))]
    pub fn raw_shares_series(&self) -> Vec<SharesPoint> {
        let reported = self
            .document
            .get("outstandingShares")
            .and_then(|section| section.get(self.cadence.shares_key()))
            .map(outstanding_shares_points)
            .unwrap_or_default();
        if !reported.is_empty() {
            return reported;
        }

        debug!("Falling back to balance sheet share counts");
        self.balance_sheet
            .available_dates()
            .into_iter()
            .filter_map(|date| {
                let shares = self.balance_sheet.value(date, "commonStockSharesOutstanding").ok()?;
                Some(SharesPoint::new(date, shares))
            })
            .collect()
    }
}

fn outstanding_shares_points(section: &Value) -> Vec<SharesPoint> {
    let records: Vec<&Value> = match section {
        Value::Object(map) => map.values().collect(),
        Value::Array(items) => items.iter().collect(),
        _ => Vec::new(),
    };
    let mut points: Vec<SharesPoint> = records
        .into_iter()
        .filter_map(|record| {
            let date = record.get("dateFormatted")?.as_str()?;
            let date = NaiveDate::parse_from_str(date, STATEMENT_DATE_FORMAT).ok()?;
            let shares = record.get("shares").map_or(f64::NAN, coerce_number);
            Some(SharesPoint::new(date, shares))
        })
        .collect();
    points.sort_by_key(|point| point.date);
    points
}
