//! Keeps each budget's `spent` in step with the ledger.
//!
//! There are two ways to do that and they must agree: `recompute` sums the
//! ledger from scratch, `apply_delta` nudges the stored total as single
//! transactions come and go.

pub(crate) mod alert;
mod errors;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use tracing::debug;

use crate::db::{Database, LedgerStore};
use crate::models::{is_currency_scale, Budget, BudgetMonth, UserId, MAX_AMOUNT};

pub(crate) use errors::BudgetError;

/// Which way a single transaction moves a budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    /// A new expense was recorded.
    Increase,
    /// An expense was deleted. The result is clamped at zero.
    Decrease,
}

impl Direction {
    fn signed(&self, amount: Decimal) -> Decimal {
        match self {
            Self::Increase => amount,
            Self::Decrease => -amount,
        }
    }
}

pub(crate) struct BudgetTracker;

impl BudgetTracker {
    /// Sums the user's expenses for `category` in `month` and writes the total
    /// into the matching budget, if one exists. Returns the sum either way.
    pub(crate) fn recompute<S: LedgerStore + ?Sized>(
        store: &mut S,
        user_id: &UserId,
        category: &str,
        month: BudgetMonth,
    ) -> Result<Decimal> {
        let spent = store.sum_expenses(user_id, category, month)?;
        if let Some(budget) = store.find_budget(user_id, category, month)? {
            let id = budget.id.context("Stored budget has no id")?;
            store.update_budget_spent(id, spent)?;
            debug!("Recomputed budget [{id}] {category} {month}: spent {spent}");
        }
        Ok(spent)
    }

    /// Applies one transaction's amount to the matching budget. Returns the
    /// updated budget, or `None` when the user has no budget for that
    /// category and month.
    pub(crate) fn apply_delta<S: LedgerStore + ?Sized>(
        store: &mut S,
        user_id: &UserId,
        category: &str,
        month: BudgetMonth,
        amount: Decimal,
        direction: Direction,
    ) -> Result<Option<Budget>> {
        let Some(mut budget) = store.find_budget(user_id, category, month)? else {
            debug!("No budget for {category} in {month}, nothing to adjust");
            return Ok(None);
        };
        let id = budget.id.context("Stored budget has no id")?;
        budget.spent = store.adjust_budget_spent(id, direction.signed(amount))?;
        debug!(
            "Adjusted budget [{id}] {} {month} ({direction:?} {amount}): spent {}",
            budget.category, budget.spent
        );
        Ok(Some(budget))
    }

    /// Recomputes every budget the user has in `month` and returns them fresh.
    pub(crate) fn refresh_month(
        db: &mut Database,
        user_id: &UserId,
        month: BudgetMonth,
    ) -> Result<Vec<Budget>> {
        let budgets = db.get_budgets(user_id, month)?;
        for budget in &budgets {
            Self::recompute(db, user_id, &budget.category, month)?;
        }
        db.get_budgets(user_id, month)
    }

    /// Creates a budget and seeds `spent` from expenses already in the ledger.
    pub(crate) fn create_budget(
        db: &mut Database,
        user_id: &UserId,
        category: &str,
        limit: Decimal,
        month: BudgetMonth,
    ) -> Result<Budget, BudgetError> {
        let category = category.trim();
        if category.is_empty() {
            return Err(BudgetError::MissingCategory);
        }
        if limit < Decimal::ZERO {
            return Err(BudgetError::NegativeLimit { limit });
        }
        if !is_currency_scale(limit) {
            return Err(BudgetError::LimitTooPrecise { limit });
        }
        if limit > MAX_AMOUNT {
            return Err(BudgetError::LimitTooLarge {
                limit,
                max: MAX_AMOUNT,
            });
        }

        let settings = db.get_user_settings(user_id)?;
        let category = settings.match_category(category).unwrap_or(category).to_string();

        if db.find_budget(user_id, &category, month)?.is_some() {
            return Err(BudgetError::Duplicate {
                user_id: user_id.clone(),
                category,
                month,
            });
        }

        let mut budget = Budget::new(user_id.clone(), category, month, limit);
        budget.id = Some(db.insert_budget(&budget)?);
        budget.spent = Self::recompute(db, user_id, &budget.category, month)?;
        Ok(budget)
    }

    pub(crate) fn delete_budget(
        db: &mut Database,
        budget_id: i64,
        user_id: &UserId,
    ) -> Result<Budget, BudgetError> {
        let budget = db
            .get_budget(budget_id)?
            .ok_or(BudgetError::NotFound { budget_id })?;
        if &budget.user_id != user_id {
            return Err(BudgetError::Forbidden {
                budget_id,
                user_id: user_id.clone(),
            });
        }
        db.delete_budget(budget_id)?;
        Ok(budget)
    }
}
