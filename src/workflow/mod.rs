//! Add and delete transactions along with their side effects.
//!
//! Only the ledger write is part of the result the caller sees. Everything
//! after it (the push notification, the budget update, the budget alert) is
//! best-effort: failures are logged and the operation still succeeds.

mod errors;

use chrono::Local;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::budget::alert::{alert_for, AlertTier};
use crate::budget::{BudgetTracker, Direction};
use crate::db::LedgerStore;
use crate::models::{
    is_currency_scale, Transaction, TransactionInput, TransactionKind, UserId, UserSettings,
    DEFAULT_DESCRIPTION, MAX_AMOUNT,
};
use crate::notify::Notifier;

pub(crate) use errors::{ValidationError, WorkflowError};

pub(crate) struct TransactionWorkflow<'a, S: LedgerStore + ?Sized> {
    store: &'a mut S,
    notifier: &'a Notifier,
}

impl<'a, S: LedgerStore + ?Sized> TransactionWorkflow<'a, S> {
    pub(crate) fn new(store: &'a mut S, notifier: &'a Notifier) -> Self {
        Self { store, notifier }
    }

    /// Validates and records a transaction, then notifies the user and updates
    /// the matching budget. Returns the stored transaction.
    pub(crate) fn submit_transaction(
        &mut self,
        user_id: &UserId,
        input: TransactionInput,
    ) -> Result<Transaction, WorkflowError> {
        let settings = self.settings_for(user_id);
        let mut txn = validate(user_id, input, &settings)?;

        let id = self
            .store
            .insert_transaction(&txn)
            .map_err(WorkflowError::Persistence)?;
        txn.id = Some(id);
        info!(
            "Recorded {} [{id}] of {} in {} for user [{user_id}]",
            txn.kind, txn.amount, txn.category
        );

        self.notifier.notify_transaction(&txn);
        if txn.is_expense() {
            self.track_expense(&txn, &settings);
        }
        Ok(txn)
    }

    /// Deletes a transaction owned by `user_id` and takes an expense back out
    /// of the budget for the month it was dated in.
    pub(crate) fn delete_transaction(
        &mut self,
        transaction_id: i64,
        user_id: &UserId,
    ) -> Result<Transaction, WorkflowError> {
        let txn = self
            .store
            .get_transaction(transaction_id)
            .map_err(WorkflowError::Persistence)?
            .ok_or(WorkflowError::NotFound { transaction_id })?;
        if &txn.user_id != user_id {
            return Err(WorkflowError::Forbidden {
                transaction_id,
                user_id: user_id.clone(),
            });
        }

        let deleted = self
            .store
            .delete_transaction(transaction_id)
            .map_err(WorkflowError::Persistence)?;
        if !deleted {
            return Err(WorkflowError::NotFound { transaction_id });
        }
        info!("Deleted transaction [{transaction_id}] for user [{user_id}]");

        if txn.is_expense() {
            if let Err(e) = BudgetTracker::apply_delta(
                &mut *self.store,
                user_id,
                &txn.category,
                txn.month(),
                txn.amount,
                Direction::Decrease,
            ) {
                warn!("Budget not adjusted after deleting transaction [{transaction_id}]: {e:#}");
            }
        }
        Ok(txn)
    }

    fn track_expense(&mut self, txn: &Transaction, settings: &UserSettings) {
        let budget = match BudgetTracker::apply_delta(
            &mut *self.store,
            &txn.user_id,
            &txn.category,
            txn.month(),
            txn.amount,
            Direction::Increase,
        ) {
            Ok(Some(budget)) => budget,
            Ok(None) => return,
            Err(e) => {
                warn!(
                    "Budget not updated for transaction [{}]: {e:#}",
                    txn.id.unwrap_or_default()
                );
                return;
            }
        };

        if !settings.show_budget_alerts {
            debug!("Budget alerts are off for user [{}]", txn.user_id);
            return;
        }
        let tier = AlertTier::classify(budget.percentage_used());
        if let Some(alert) = alert_for(&budget, alert_icon(tier)) {
            debug!("Budget {} reached {} tier", budget.category, alert.tier);
            self.notifier.send_to_user(&txn.user_id, alert.message);
        }
    }

    fn settings_for(&self, user_id: &UserId) -> UserSettings {
        self.store.get_user_settings(user_id).unwrap_or_else(|e| {
            warn!("Using default settings for user [{user_id}]: {e:#}");
            UserSettings::default()
        })
    }
}

fn alert_icon(tier: AlertTier) -> Option<&'static str> {
    match tier {
        AlertTier::Critical => Some("😈"),
        AlertTier::Urgent => Some("👹"),
        AlertTier::Warning | AlertTier::None => None,
    }
}

fn validate(
    user_id: &UserId,
    input: TransactionInput,
    settings: &UserSettings,
) -> Result<Transaction, ValidationError> {
    if input.amount <= Decimal::ZERO {
        return Err(ValidationError::NonPositiveAmount {
            amount: input.amount,
        });
    }
    if !is_currency_scale(input.amount) {
        return Err(ValidationError::TooPrecise {
            amount: input.amount,
        });
    }
    if input.amount > MAX_AMOUNT {
        return Err(ValidationError::TooLarge {
            amount: input.amount,
            max: MAX_AMOUNT,
        });
    }

    let kind = input.kind.trim();
    if kind.is_empty() {
        return Err(ValidationError::MissingKind);
    }
    let kind =
        TransactionKind::parse(kind).ok_or_else(|| ValidationError::UnknownKind(kind.to_string()))?;

    let category = input.category.trim();
    if category.is_empty() {
        return Err(ValidationError::MissingCategory);
    }
    let category = settings.match_category(category).unwrap_or(category).to_string();

    let description = input
        .description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string());

    Ok(Transaction {
        id: None,
        user_id: user_id.clone(),
        amount: input.amount,
        kind,
        category,
        date: input.date.unwrap_or_else(|| Local::now().date_naive()),
        description,
    })
}

#[cfg(test)]
mod tests;
