//! Period summaries over the ledger, and CSV export.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Months, NaiveDate};
use rust_decimal::Decimal;
use tracing::info;

use crate::db::{checked_total, sum_by_category, Database, LedgerStore, TransactionFilter};
use crate::models::{BudgetMonth, Transaction, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReportPeriod {
    Month,
    ThreeMonths,
}

impl ReportPeriod {
    pub(crate) fn months(&self) -> u32 {
        match self {
            Self::Month => 1,
            Self::ThreeMonths => 3,
        }
    }

    pub(crate) fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "month" | "1" | "1month" => Some(Self::Month),
            "3months" | "3" | "quarter" => Some(Self::ThreeMonths),
            _ => None,
        }
    }

    pub(crate) fn label(&self) -> &'static str {
        match self {
            Self::Month => "last month",
            Self::ThreeMonths => "last 3 months",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MonthlyTrend {
    pub(crate) month: BudgetMonth,
    pub(crate) income: Decimal,
    pub(crate) expenses: Decimal,
}

#[derive(Debug, Clone)]
pub(crate) struct Report {
    pub(crate) period: ReportPeriod,
    /// First day included in the window.
    pub(crate) since: NaiveDate,
    /// Expense totals per category, largest first.
    pub(crate) breakdown: Vec<(String, Decimal)>,
    pub(crate) total_income: Decimal,
    pub(crate) total_expenses: Decimal,
    pub(crate) net_savings: Decimal,
    /// Oldest month first. Months without transactions are absent.
    pub(crate) trends: Vec<MonthlyTrend>,
    pub(crate) largest_category: Option<String>,
    pub(crate) largest_category_share: Decimal,
    pub(crate) savings_rate: Decimal,
    /// Budgets in `today`'s month whose expenses exceed the limit.
    pub(crate) categories_over_budget: usize,
}

impl Report {
    pub(crate) fn build(
        db: &Database,
        user_id: &UserId,
        period: ReportPeriod,
        today: NaiveDate,
    ) -> Result<Self> {
        let since = today
            .checked_sub_months(Months::new(period.months()))
            .with_context(|| format!("Report window before {today} is out of range"))?;
        let txns = db.get_transactions_since(user_id, since)?;

        let expenses: Vec<Transaction> = txns.iter().filter(|t| t.is_expense()).cloned().collect();
        let mut breakdown = sum_by_category(&expenses)?;
        breakdown.sort_by(|a, b| b.1.cmp(&a.1));

        let total_income = checked_total(txns.iter().filter(|t| t.is_income()).map(|t| t.amount))
            .context("Income total overflowed")?;
        let total_expenses =
            checked_total(expenses.iter().map(|t| t.amount)).context("Expense total overflowed")?;
        let net_savings = total_income
            .checked_sub(total_expenses)
            .context("Net savings overflowed")?;

        let (largest_category, largest_category_share) = match breakdown.first() {
            Some((name, amount)) if !total_expenses.is_zero() => {
                (Some(name.clone()), percent_of(*amount, total_expenses)?)
            }
            _ => (None, Decimal::ZERO),
        };
        let savings_rate = if total_income.is_zero() {
            Decimal::ZERO
        } else {
            percent_of(net_savings, total_income)?
        };

        Ok(Self {
            period,
            since,
            breakdown,
            total_income,
            total_expenses,
            net_savings,
            trends: monthly_trends(&txns)?,
            largest_category,
            largest_category_share,
            savings_rate,
            categories_over_budget: categories_over_budget(db, user_id, today)?,
        })
    }
}

fn percent_of(part: Decimal, whole: Decimal) -> Result<Decimal> {
    part.checked_div(whole)
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .with_context(|| format!("{part} as a percentage of {whole} overflowed"))
}

fn monthly_trends(txns: &[Transaction]) -> Result<Vec<MonthlyTrend>> {
    let mut trends: Vec<MonthlyTrend> = Vec::new();
    for txn in txns {
        let month = txn.month();
        let index = match trends.iter().position(|t| t.month == month) {
            Some(index) => index,
            None => {
                trends.push(MonthlyTrend {
                    month,
                    income: Decimal::ZERO,
                    expenses: Decimal::ZERO,
                });
                trends.len() - 1
            }
        };
        let trend = &mut trends[index];
        let total = if txn.is_income() {
            &mut trend.income
        } else {
            &mut trend.expenses
        };
        *total = total
            .checked_add(txn.amount)
            .with_context(|| format!("Totals for {month} overflowed"))?;
    }
    trends.sort_by_key(|t| t.month);
    Ok(trends)
}

fn categories_over_budget(db: &Database, user_id: &UserId, today: NaiveDate) -> Result<usize> {
    let month = BudgetMonth::from_date(today);
    let mut over = 0;
    for budget in db.get_budgets(user_id, month)? {
        if db.sum_expenses(user_id, &budget.category, month)? > budget.limit_amount {
            over += 1;
        }
    }
    Ok(over)
}

/// Writes the user's transactions for `month` to `path`, oldest first.
/// Returns the number of rows written.
pub(crate) fn export_csv(
    db: &Database,
    path: &Path,
    user_id: &UserId,
    month: BudgetMonth,
) -> Result<usize> {
    let filter = TransactionFilter {
        month: Some(month),
        ..Default::default()
    };
    let mut txns = db.get_transactions(user_id, &filter)?;
    txns.reverse();

    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create export file: {}", path.display()))?;
    wtr.write_record(["id", "date", "kind", "category", "amount", "description"])?;
    for txn in &txns {
        wtr.write_record([
            txn.id.unwrap_or_default().to_string(),
            txn.date.format("%Y-%m-%d").to_string(),
            txn.kind.to_string(),
            txn.category.clone(),
            txn.amount.to_string(),
            txn.description.clone(),
        ])?;
    }
    wtr.flush()
        .with_context(|| format!("Failed to write export file: {}", path.display()))?;

    info!("Exported {} transaction(s) for {month} to {}", txns.len(), path.display());
    Ok(txns.len())
}
