//! Financial statements of a fundamentals document.
//!
//! Every statement field is read through one table-driven accessor: a field
//! missing from a statement yields the table default, an explicit `null`
//! yields `NaN`, and numbers or numeric strings are coerced to `f64`.

use chrono::NaiveDate;
use eod_core::{Cadence, DataError, Result};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::trace;

/// Date layout of statement keys and `date`/`filing_date` fields.
pub const STATEMENT_DATE_FORMAT: &str = "%Y-%m-%d";

/// A numeric statement field and the value reported when it is absent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FieldSpec {
    /// Vendor field name.
    pub name: &'static str,
    /// Value used when the statement omits the field.
    pub default: f64,
}

impl FieldSpec {
    const fn zero(name: &'static str) -> Self {
        Self { name, default: 0.0 }
    }
}

/// The three statement kinds under `Financials`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StatementKind {
    /// `Balance_Sheet`
    BalanceSheet,
    /// `Income_Statement`
    IncomeStatement,
    /// `Cash_Flow`
    CashFlow,
}

impl StatementKind {
    /// All statement kinds.
    pub const ALL: [Self; 3] = [Self::BalanceSheet, Self::IncomeStatement, Self::CashFlow];

    /// Key of the statement under `Financials`.
    #[must_use]
    pub const fn key(&self) -> &'static str {
        match self {
            Self::BalanceSheet => "Balance_Sheet",
            Self::IncomeStatement => "Income_Statement",
            Self::CashFlow => "Cash_Flow",
        }
    }

    /// Numeric fields of the statement.
    #[must_use]
    pub const fn fields(&self) -> &'static [FieldSpec] {
        match self {
            Self::BalanceSheet => BALANCE_SHEET_FIELDS,
            Self::IncomeStatement => INCOME_STATEMENT_FIELDS,
            Self::CashFlow => CASH_FLOW_FIELDS,
        }
    }

    /// Looks up a numeric field of this statement kind.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields().iter().find(|spec| spec.name == name)
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for StatementKind {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.key() == s)
            .ok_or_else(|| DataError::InvalidParameter(format!("Unknown statement kind: {s}")))
    }
}

const BALANCE_SHEET_FIELDS: &[FieldSpec] = &[
    FieldSpec::zero("accountsPayable"),
    FieldSpec::zero("accumulatedAmortization"),
    FieldSpec::zero("accumulatedDepreciation"),
    FieldSpec::zero("accumulatedOtherComprehensiveIncome"),
    FieldSpec::zero("additionalPaidInCapital"),
    FieldSpec::zero("capitalLeaseObligations"),
    FieldSpec::zero("capitalStock"),
    FieldSpec::zero("capitalSurpluse"),
    FieldSpec::zero("cash"),
    FieldSpec::zero("cashAndEquivalents"),
    FieldSpec::zero("cashAndShortTermInvestments"),
    FieldSpec::zero("commonStock"),
    FieldSpec::zero("commonStockSharesOutstanding"),
    FieldSpec::zero("commonStockTotalEquity"),
    FieldSpec::zero("currentDeferredRevenue"),
    FieldSpec::zero("deferredLongTermAssetCharges"),
    FieldSpec::zero("deferredLongTermLiab"),
    FieldSpec::zero("earningAssets"),
    FieldSpec::zero("goodWill"),
    FieldSpec::zero("intangibleAssets"),
    FieldSpec::zero("inventory"),
    FieldSpec::zero("liabilitiesAndStockholdersEquity"),
    FieldSpec::zero("longTermDebt"),
    FieldSpec::zero("longTermDebtTotal"),
    FieldSpec::zero("longTermInvestments"),
    FieldSpec::zero("negativeGoodwill"),
    FieldSpec::zero("netDebt"),
    FieldSpec::zero("netInvestedCapital"),
    FieldSpec::zero("netReceivables"),
    FieldSpec::zero("netTangibleAssets"),
    FieldSpec::zero("netWorkingCapital"),
    FieldSpec::zero("nonCurrentAssetsTotal"),
    FieldSpec::zero("nonCurrentLiabilitiesOther"),
    FieldSpec::zero("nonCurrentLiabilitiesTotal"),
    FieldSpec::zero("nonCurrrentAssetsOther"),
    FieldSpec::zero("noncontrollingInterestInConsolidatedEntity"),
    FieldSpec::zero("otherAssets"),
    FieldSpec::zero("otherCurrentAssets"),
    FieldSpec::zero("otherCurrentLiab"),
    FieldSpec::zero("otherLiab"),
    FieldSpec::zero("otherStockholderEquity"),
    FieldSpec::zero("preferredStockRedeemable"),
    FieldSpec::zero("preferredStockTotalEquity"),
    FieldSpec::zero("propertyPlantAndEquipmentGross"),
    FieldSpec::zero("propertyPlantAndEquipmentNet"),
    FieldSpec::zero("propertyPlantEquipment"),
    FieldSpec::zero("retainedEarnings"),
    FieldSpec::zero("retainedEarningsTotalEquity"),
    FieldSpec::zero("shortLongTermDebt"),
    FieldSpec::zero("shortLongTermDebtTotal"),
    FieldSpec::zero("shortTermDebt"),
    FieldSpec::zero("shortTermInvestments"),
    FieldSpec::zero("temporaryEquityRedeemableNoncontrollingInterests"),
    FieldSpec::zero("totalAssets"),
    FieldSpec::zero("totalCurrentAssets"),
    FieldSpec::zero("totalCurrentLiabilities"),
    FieldSpec::zero("totalLiab"),
    FieldSpec::zero("totalPermanentEquity"),
    FieldSpec::zero("totalStockholderEquity"),
    FieldSpec::zero("treasuryStock"),
    FieldSpec::zero("warrants"),
];

const INCOME_STATEMENT_FIELDS: &[FieldSpec] = &[
    FieldSpec::zero("costOfRevenue"),
    FieldSpec::zero("depreciationAndAmortization"),
    FieldSpec::zero("discontinuedOperations"),
    FieldSpec::zero("ebit"),
    FieldSpec::zero("ebitda"),
    FieldSpec::zero("effectOfAccountingCharges"),
    FieldSpec::zero("extraordinaryItems"),
    FieldSpec::zero("grossProfit"),
    FieldSpec::zero("incomeBeforeTax"),
    FieldSpec::zero("incomeTaxExpense"),
    FieldSpec::zero("interestExpense"),
    FieldSpec::zero("interestIncome"),
    FieldSpec::zero("minorityInterest"),
    FieldSpec::zero("netIncome"),
    FieldSpec::zero("netIncomeApplicableToCommonShares"),
    FieldSpec::zero("netIncomeFromContinuingOps"),
    FieldSpec::zero("netInterestIncome"),
    FieldSpec::zero("nonOperatingIncomeNetOther"),
    FieldSpec::zero("nonRecurring"),
    FieldSpec::zero("operatingIncome"),
    FieldSpec::zero("otherItems"),
    FieldSpec::zero("otherOperatingExpenses"),
    FieldSpec::zero("preferredStockAndOtherAdjustments"),
    FieldSpec::zero("reconciledDepreciation"),
    FieldSpec::zero("researchDevelopment"),
    FieldSpec::zero("sellingAndMarketingExpenses"),
    FieldSpec::zero("sellingGeneralAdministrative"),
    FieldSpec::zero("taxProvision"),
    FieldSpec::zero("totalOperatingExpenses"),
    FieldSpec::zero("totalOtherIncomeExpenseNet"),
    FieldSpec::zero("totalRevenue"),
];

const CASH_FLOW_FIELDS: &[FieldSpec] = &[
    FieldSpec::zero("beginPeriodCashFlow"),
    FieldSpec::zero("capitalExpenditures"),
    FieldSpec::zero("cashAndCashEquivalentsChanges"),
    FieldSpec::zero("cashFlowsOtherOperating"),
    FieldSpec::zero("changeInCash"),
    FieldSpec::zero("changeInWorkingCapital"),
    FieldSpec::zero("changeReceivables"),
    FieldSpec::zero("changeToAccountReceivables"),
    FieldSpec::zero("changeToInventory"),
    FieldSpec::zero("changeToLiabilities"),
    FieldSpec::zero("changeToNetincome"),
    FieldSpec::zero("changeToOperatingActivities"),
    FieldSpec::zero("depreciation"),
    FieldSpec::zero("dividendsPaid"),
    FieldSpec::zero("endPeriodCashFlow"),
    FieldSpec::zero("exchangeRateChanges"),
    FieldSpec::zero("freeCashFlow"),
    FieldSpec::zero("investments"),
    FieldSpec::zero("issuanceOfCapitalStock"),
    FieldSpec::zero("netBorrowings"),
    FieldSpec::zero("netIncome"),
    FieldSpec::zero("otherCashflowsFromFinancingActivities"),
    FieldSpec::zero("otherCashflowsFromInvestingActivities"),
    FieldSpec::zero("otherNonCashItems"),
    FieldSpec::zero("salePurchaseOfStock"),
    FieldSpec::zero("stockBasedCompensation"),
    FieldSpec::zero("totalCashFromFinancingActivities"),
    FieldSpec::zero("totalCashFromOperatingActivities"),
    FieldSpec::zero("totalCashflowsFromInvestingActivities"),
];

/// Coerces a statement value to `f64`.
///
/// `null`, booleans, containers and non-numeric strings are not available and
/// map to `NaN`.
#[must_use]
pub fn coerce_number(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => s.trim().parse().unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

/// One statement kind at one cadence, keyed by reporting date.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FinancialStatement {
    kind: Option<StatementKind>,
    cadence: Cadence,
    entries: BTreeMap<NaiveDate, Map<String, Value>>,
}

impl FinancialStatement {
    /// Extracts `Financials.<kind>.<cadence>` from a fundamentals document.
    ///
    /// A missing section yields a statement with no dates. Entries whose key
    /// is not a `YYYY-MM-DD` date or whose value is not an object are skipped.
    ///
    /// # Errors
    /// Returns [`DataError::Parse`] if the section exists but is not an object.
    pub fn from_document(document: &Value, kind: StatementKind, cadence: Cadence) -> Result<Self> {
        let section = document
            .get("Financials")
            .and_then(|financials| financials.get(kind.key()))
            .and_then(|statement| statement.get(cadence.statement_key()));

        let mut entries = BTreeMap::new();
        match section {
            None | Some(Value::Null) => {}
            Some(Value::Object(by_date)) => {
                for (raw_date, entry) in by_date {
                    let date = NaiveDate::parse_from_str(raw_date, STATEMENT_DATE_FORMAT);
                    match (date, entry) {
                        (Ok(date), Value::Object(fields)) => {
                            entries.insert(date, fields.clone());
                        }
                        _ => trace!(%kind, raw_date, "Skipping malformed statement entry"),
                    }
                }
            }
            Some(_) => {
                return Err(DataError::Parse(format!(
                    "Financials.{}.{} is not an object",
                    kind.key(),
                    cadence.statement_key()
                )));
            }
        }

        Ok(Self {
            kind: Some(kind),
            cadence,
            entries,
        })
    }

    /// The statement kind, if known.
    #[must_use]
    pub const fn kind(&self) -> Option<StatementKind> {
        self.kind
    }

    /// The reporting cadence.
    #[must_use]
    pub const fn cadence(&self) -> Cadence {
        self.cadence
    }

    /// Reporting dates, ascending.
    #[must_use]
    pub fn available_dates(&self) -> Vec<NaiveDate> {
        self.entries.keys().copied().collect()
    }

    /// Latest reporting date.
    #[must_use]
    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.entries.keys().next_back().copied()
    }

    /// Raw entry reported for `date`.
    #[must_use]
    pub fn entry(&self, date: NaiveDate) -> Option<&Map<String, Value>> {
        self.entries.get(&date)
    }

    /// Numeric field `field` reported for `date`.
    ///
    /// # Errors
    /// Returns [`DataError::InvalidParameter`] if `field` is not a numeric
    /// field of this statement kind or no entry exists for `date`.
    pub fn value(&self, date: NaiveDate, field: &str) -> Result<f64> {
        let spec = self
            .kind
            .and_then(|kind| kind.field(field))
            .ok_or_else(|| {
                DataError::InvalidParameter(format!("{field} is not a field of {self}"))
            })?;
        let entry = self.entry(date).ok_or_else(|| {
            DataError::InvalidParameter(format!("{self} has no entry for {date}"))
        })?;
        Ok(entry.get(spec.name).map_or(spec.default, coerce_number))
    }

    /// Text field (`date`, `filing_date`, `currency_symbol`) reported for
    /// `date`. Missing or non-string values read as `None`.
    #[must_use]
    pub fn text(&self, date: NaiveDate, field: &str) -> Option<&str> {
        self.entry(date)?.get(field)?.as_str()
    }
}

impl fmt::Display for FinancialStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            Some(kind) => write!(f, "{kind} ({})", self.cadence.statement_key()),
            None => f.write_str("empty statement"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn document() -> Value {
        json!({
            "Financials": {
                "Balance_Sheet": {
                    "quarterly": {
                        "2023-06-30": {"date": "2023-06-30", "totalAssets": "335038000000.00", "cash": null},
                        "2023-03-31": {"date": "2023-03-31", "totalAssets": 332160000000.0, "goodWill": "n/a"},
                        "garbage": {"totalAssets": "1"}
                    },
                    "yearly": {}
                }
            }
        })
    }

    #[test]
    fn test_dates_sorted() {
        let statement = FinancialStatement::from_document(
            &document(),
            StatementKind::BalanceSheet,
            Cadence::Quarterly,
        )
        .unwrap();
        assert_eq!(
            statement.available_dates(),
            vec![day(2023, 3, 31), day(2023, 6, 30)]
        );
        assert_eq!(statement.latest_date(), Some(day(2023, 6, 30)));
    }

    #[test]
    fn test_field_coercion() {
        let statement = FinancialStatement::from_document(
            &document(),
            StatementKind::BalanceSheet,
            Cadence::Quarterly,
        )
        .unwrap();
        let q2 = day(2023, 6, 30);
        assert_eq!(statement.value(q2, "totalAssets").unwrap(), 335_038_000_000.0);
        assert!(statement.value(q2, "cash").unwrap().is_nan());
        assert_eq!(statement.value(q2, "inventory").unwrap(), 0.0);
        assert!(statement.value(day(2023, 3, 31), "goodWill").unwrap().is_nan());
        assert_eq!(statement.text(q2, "date"), Some("2023-06-30"));
        assert_eq!(statement.text(q2, "filing_date"), None);
    }

    #[test]
    fn test_unknown_field_and_date() {
        let statement = FinancialStatement::from_document(
            &document(),
            StatementKind::BalanceSheet,
            Cadence::Quarterly,
        )
        .unwrap();
        assert!(statement.value(day(2023, 6, 30), "netIncome").is_err());
        assert!(statement.value(day(2020, 1, 1), "totalAssets").is_err());
    }

    #[test]
    fn test_missing_sections_are_empty() {
        let yearly = FinancialStatement::from_document(
            &document(),
            StatementKind::BalanceSheet,
            Cadence::Yearly,
        )
        .unwrap();
        assert!(yearly.available_dates().is_empty());

        let cash_flow = FinancialStatement::from_document(
            &document(),
            StatementKind::CashFlow,
            Cadence::Quarterly,
        )
        .unwrap();
        assert!(cash_flow.latest_date().is_none());
    }

    #[test]
    fn test_non_object_section_rejected() {
        let doc = json!({"Financials": {"Cash_Flow": {"quarterly": [1, 2]}}});
        assert!(
            FinancialStatement::from_document(&doc, StatementKind::CashFlow, Cadence::Quarterly)
                .is_err()
        );
    }

    #[test]
    fn test_field_tables() {
        assert!(StatementKind::IncomeStatement.field("incomeBeforeTax").is_some());
        assert!(StatementKind::CashFlow.field("freeCashFlow").is_some());
        assert!(StatementKind::BalanceSheet.field("netInvestedCapital").is_some());
        assert_eq!(
            "Cash_Flow".parse::<StatementKind>().unwrap(),
            StatementKind::CashFlow
        );
    }
}
