#![allow(clippy::unwrap_used)]

use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use rust_decimal_macros::dec;
use tokio::sync::mpsc::UnboundedReceiver;

use super::*;
use crate::budget::BudgetTracker;
use crate::db::Database;
use crate::models::{Budget, BudgetMonth, SettingKey};
use crate::notify::{Audience, Notification};

fn alice() -> UserId {
    UserId::new("alice")
}

fn month(y: i32, m: u32) -> BudgetMonth {
    BudgetMonth::new(y, m).unwrap()
}

fn input(kind: &str, amount: Decimal, category: &str, date: (i32, u32, u32)) -> TransactionInput {
    TransactionInput {
        amount,
        kind: kind.into(),
        category: category.into(),
        date: NaiveDate::from_ymd_opt(date.0, date.1, date.2),
        description: Some("test".into()),
    }
}

fn drain(rx: &mut UnboundedReceiver<Notification>) -> Vec<String> {
    let mut messages = Vec::new();
    while let Ok(n) = rx.try_recv() {
        messages.push(n.message);
    }
    messages
}

fn spent(db: &Database, category: &str, m: BudgetMonth) -> Decimal {
    db.find_budget(&alice(), category, m).unwrap().unwrap().spent
}

/// Wraps a real database and fails selected operations.
struct FlakyStore {
    inner: Database,
    fail_insert: bool,
    fail_budgets: bool,
}

impl FlakyStore {
    fn new(inner: Database) -> Self {
        Self {
            inner,
            fail_insert: false,
            fail_budgets: false,
        }
    }
}

impl LedgerStore for FlakyStore {
    fn insert_transaction(&mut self, txn: &Transaction) -> Result<i64> {
        if self.fail_insert {
            return Err(anyhow!("disk I/O error"));
        }
        self.inner.insert_transaction(txn)
    }

    fn delete_transaction(&mut self, id: i64) -> Result<bool> {
        self.inner.delete_transaction(id)
    }

    fn get_transaction(&self, id: i64) -> Result<Option<Transaction>> {
        self.inner.get_transaction(id)
    }

    fn find_budget(&self, user_id: &UserId, category: &str, month: BudgetMonth) -> Result<Option<Budget>> {
        if self.fail_budgets {
            return Err(anyhow!("budgets table is locked"));
        }
        self.inner.find_budget(user_id, category, month)
    }

    fn update_budget_spent(&mut self, budget_id: i64, spent: Decimal) -> Result<()> {
        self.inner.update_budget_spent(budget_id, spent)
    }

    fn adjust_budget_spent(&mut self, budget_id: i64, delta: Decimal) -> Result<Decimal> {
        self.inner.adjust_budget_spent(budget_id, delta)
    }

    fn sum_expenses(&self, user_id: &UserId, category: &str, month: BudgetMonth) -> Result<Decimal> {
        self.inner.sum_expenses(user_id, category, month)
    }

    fn get_user_settings(&self, user_id: &UserId) -> Result<UserSettings> {
        self.inner.get_user_settings(user_id)
    }
}

// ── Validation ────────────────────────────────────────────────

#[test]
fn test_non_positive_amount_has_no_side_effects() {
    let mut db = Database::open_in_memory().unwrap();
    let (notifier, mut rx) = Notifier::channel();

    for amount in [Decimal::ZERO, dec!(-12.50)] {
        let result = TransactionWorkflow::new(&mut db, &notifier)
            .submit_transaction(&alice(), input("expense", amount, "Food", (2024, 5, 1)));
        assert!(matches!(
            result,
            Err(WorkflowError::Validation(ValidationError::NonPositiveAmount { .. }))
        ));
    }

    assert!(db.get_transactions(&alice(), &Default::default()).unwrap().is_empty());
    assert!(drain(&mut rx).is_empty());
}

#[test]
fn test_kind_and_category_are_required() {
    let mut db = Database::open_in_memory().unwrap();
    let (notifier, _rx) = Notifier::channel();
    let mut workflow = TransactionWorkflow::new(&mut db, &notifier);

    let err = workflow
        .submit_transaction(&alice(), input("", dec!(5), "Food", (2024, 5, 1)))
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Validation(ValidationError::MissingKind)));

    let err = workflow
        .submit_transaction(&alice(), input("transfer", dec!(5), "Food", (2024, 5, 1)))
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Validation(ValidationError::UnknownKind(k)) if k == "transfer"));

    let err = workflow
        .submit_transaction(&alice(), input("expense", dec!(5), "   ", (2024, 5, 1)))
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Validation(ValidationError::MissingCategory)));
}

#[test]
fn test_amount_must_be_cents_within_bounds() {
    let mut db = Database::open_in_memory().unwrap();
    let (notifier, mut rx) = Notifier::channel();
    let mut workflow = TransactionWorkflow::new(&mut db, &notifier);

    let err = workflow
        .submit_transaction(&alice(), input("expense", dec!(0.000000000000000000000000001), "Food", (2024, 5, 1)))
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Validation(ValidationError::TooPrecise { .. })));

    let err = workflow
        .submit_transaction(&alice(), input("expense", Decimal::MAX, "Food", (2024, 5, 1)))
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Validation(ValidationError::TooLarge { .. })));

    // trailing zeros are still whole cents, and the bound itself is accepted
    workflow
        .submit_transaction(&alice(), input("expense", dec!(4.500), "Food", (2024, 5, 1)))
        .unwrap();
    workflow
        .submit_transaction(&alice(), input("income", MAX_AMOUNT, "Salary", (2024, 5, 1)))
        .unwrap();

    assert_eq!(db.get_transactions(&alice(), &Default::default()).unwrap().len(), 2);
    assert_eq!(drain(&mut rx).len(), 2);
}

#[test]
fn test_defaults_fill_date_and_description() {
    let mut db = Database::open_in_memory().unwrap();
    let (notifier, _rx) = Notifier::channel();
    let submitted = TransactionInput {
        amount: dec!(20),
        kind: "Income".into(),
        category: "salary".into(),
        date: None,
        description: Some("   ".into()),
    };

    let txn = TransactionWorkflow::new(&mut db, &notifier)
        .submit_transaction(&alice(), submitted)
        .unwrap();
    assert_eq!(txn.description, "No description");
    assert_eq!(txn.date, Local::now().date_naive());
    assert_eq!(txn.kind, TransactionKind::Income);
    assert_eq!(txn.category, "Salary");

    let stored = db.get_transaction(txn.id.unwrap()).unwrap().unwrap();
    assert_eq!(stored, txn);
}

// ── Submit ────────────────────────────────────────────────────

#[test]
fn test_expense_without_budget_only_notifies_the_transaction() {
    let mut db = Database::open_in_memory().unwrap();
    let (notifier, mut rx) = Notifier::channel();

    TransactionWorkflow::new(&mut db, &notifier)
        .submit_transaction(&alice(), input("expense", dec!(42), "Books", (2024, 5, 1)))
        .unwrap();

    assert_eq!(drain(&mut rx), vec!["💸 Expense: $42.00 spent on Books"]);
    assert_eq!(db.get_transactions(&alice(), &Default::default()).unwrap().len(), 1);
}

#[test]
fn test_expense_reaching_limit_sends_critical_alert() {
    let mut db = Database::open_in_memory().unwrap();
    BudgetTracker::create_budget(&mut db, &alice(), "Travel", dec!(100), month(2024, 5)).unwrap();
    let (notifier, mut rx) = Notifier::channel();

    TransactionWorkflow::new(&mut db, &notifier)
        .submit_transaction(&alice(), input("expense", dec!(100), "travel", (2024, 5, 20)))
        .unwrap();

    let budget = db.find_budget(&alice(), "Travel", month(2024, 5)).unwrap().unwrap();
    assert_eq!(budget.percentage_used(), dec!(100));

    let messages = drain(&mut rx);
    assert_eq!(messages.len(), 2);
    assert!(messages[1].starts_with("😈😈 CRITICAL"));
    assert!(messages[1].contains("EXCEEDED"));
    assert!(messages[1].contains("by 0%"));
}

#[test]
fn test_expense_reaches_budget_with_differently_cased_accented_category() {
    let mut db = Database::open_in_memory().unwrap();
    BudgetTracker::create_budget(&mut db, &alice(), "Épicerie", dec!(100), month(2024, 5)).unwrap();
    let (notifier, mut rx) = Notifier::channel();

    TransactionWorkflow::new(&mut db, &notifier)
        .submit_transaction(&alice(), input("expense", dec!(80), "épicerie", (2024, 5, 3)))
        .unwrap();

    assert_eq!(spent(&db, "Épicerie", month(2024, 5)), dec!(80));
    let messages = drain(&mut rx);
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1], "⚠️ Budget Warning: You've used 80% of your Épicerie budget");
}

#[test]
fn test_budget_overflow_is_logged_and_transaction_kept() {
    let mut db = Database::open_in_memory().unwrap();
    let budget = BudgetTracker::create_budget(&mut db, &alice(), "Travel", dec!(100), month(2024, 5)).unwrap();
    db.update_budget_spent(budget.id.unwrap(), Decimal::MAX).unwrap();
    let (notifier, mut rx) = Notifier::channel();

    let txn = TransactionWorkflow::new(&mut db, &notifier)
        .submit_transaction(&alice(), input("expense", dec!(10), "Travel", (2024, 5, 3)))
        .unwrap();

    assert!(db.get_transaction(txn.id.unwrap()).unwrap().is_some());
    assert_eq!(spent(&db, "Travel", month(2024, 5)), Decimal::MAX);
    assert_eq!(drain(&mut rx), vec!["💸 Expense: $10.00 spent on Travel"]);
}

#[test]
fn test_alert_tiers_use_workflow_icons() {
    let mut db = Database::open_in_memory().unwrap();
    BudgetTracker::create_budget(&mut db, &alice(), "Fuel", dec!(100), month(2024, 5)).unwrap();
    let (notifier, mut rx) = Notifier::channel();
    let mut workflow = TransactionWorkflow::new(&mut db, &notifier);

    // 50%: below every tier
    workflow
        .submit_transaction(&alice(), input("expense", dec!(50), "Fuel", (2024, 5, 1)))
        .unwrap();
    assert_eq!(drain(&mut rx).len(), 1);

    // 80%: warning keeps the default icon
    workflow
        .submit_transaction(&alice(), input("expense", dec!(30), "Fuel", (2024, 5, 2)))
        .unwrap();
    let messages = drain(&mut rx);
    assert_eq!(messages[1], "⚠️ Budget Warning: You've used 80% of your Fuel budget");

    // 95%: urgent
    workflow
        .submit_transaction(&alice(), input("expense", dec!(15), "Fuel", (2024, 5, 3)))
        .unwrap();
    let messages = drain(&mut rx);
    assert_eq!(messages[1], "👹 URGENT: You've used 95% of your Fuel budget! Only 5% remaining");
}

#[test]
fn test_income_never_touches_budgets() {
    let mut db = Database::open_in_memory().unwrap();
    BudgetTracker::create_budget(&mut db, &alice(), "Salary", dec!(10), month(2024, 5)).unwrap();
    let (notifier, mut rx) = Notifier::channel();

    TransactionWorkflow::new(&mut db, &notifier)
        .submit_transaction(&alice(), input("income", dec!(3000), "Salary", (2024, 5, 1)))
        .unwrap();

    assert_eq!(spent(&db, "Salary", month(2024, 5)), Decimal::ZERO);
    assert_eq!(drain(&mut rx), vec!["💰 Income: $3000.00 added to Salary"]);
}

#[test]
fn test_disabled_alerts_still_update_budget() {
    let mut db = Database::open_in_memory().unwrap();
    db.set_setting(&alice(), SettingKey::ShowBudgetAlerts, "false").unwrap();
    BudgetTracker::create_budget(&mut db, &alice(), "Fuel", dec!(10), month(2024, 5)).unwrap();
    let (notifier, mut rx) = Notifier::channel();

    TransactionWorkflow::new(&mut db, &notifier)
        .submit_transaction(&alice(), input("expense", dec!(25), "Fuel", (2024, 5, 1)))
        .unwrap();

    assert_eq!(spent(&db, "Fuel", month(2024, 5)), dec!(25));
    assert_eq!(drain(&mut rx).len(), 1);
}

#[test]
fn test_persistence_failure_skips_every_side_effect() {
    let mut db = Database::open_in_memory().unwrap();
    BudgetTracker::create_budget(&mut db, &alice(), "Fuel", dec!(10), month(2024, 5)).unwrap();
    let mut store = FlakyStore::new(db);
    store.fail_insert = true;
    let (notifier, mut rx) = Notifier::channel();

    let result = TransactionWorkflow::new(&mut store, &notifier)
        .submit_transaction(&alice(), input("expense", dec!(25), "Fuel", (2024, 5, 1)));

    assert!(matches!(result, Err(WorkflowError::Persistence(_))));
    assert!(drain(&mut rx).is_empty());
    assert_eq!(spent(&store.inner, "Fuel", month(2024, 5)), Decimal::ZERO);
}

#[test]
fn test_budget_failure_after_commit_is_swallowed() {
    let mut store = FlakyStore::new(Database::open_in_memory().unwrap());
    store.fail_budgets = true;
    let (notifier, mut rx) = Notifier::channel();

    let txn = TransactionWorkflow::new(&mut store, &notifier)
        .submit_transaction(&alice(), input("expense", dec!(25), "Fuel", (2024, 5, 1)))
        .unwrap();

    assert!(store.inner.get_transaction(txn.id.unwrap()).unwrap().is_some());
    assert_eq!(drain(&mut rx).len(), 1);
}

#[test]
fn test_closed_notification_queue_does_not_fail_submit() {
    let mut db = Database::open_in_memory().unwrap();
    let (notifier, rx) = Notifier::channel();
    drop(rx);

    let result = TransactionWorkflow::new(&mut db, &notifier)
        .submit_transaction(&alice(), input("expense", dec!(1), "Fuel", (2024, 5, 1)));
    assert!(result.is_ok());
}

// ── Delete ────────────────────────────────────────────────────

#[test]
fn test_delete_reverses_budget_of_the_transaction_month() {
    let mut db = Database::open_in_memory().unwrap();
    BudgetTracker::create_budget(&mut db, &alice(), "Fuel", dec!(100), month(2023, 11)).unwrap();
    BudgetTracker::create_budget(&mut db, &alice(), "Fuel", dec!(100), BudgetMonth::current()).unwrap();
    let (notifier, _rx) = Notifier::channel();
    let mut workflow = TransactionWorkflow::new(&mut db, &notifier);

    let old = workflow
        .submit_transaction(&alice(), input("expense", dec!(40), "Fuel", (2023, 11, 30)))
        .unwrap();
    workflow
        .submit_transaction(
            &alice(),
            TransactionInput {
                amount: dec!(7),
                kind: "expense".into(),
                category: "Fuel".into(),
                ..Default::default()
            },
        )
        .unwrap();

    workflow.delete_transaction(old.id.unwrap(), &alice()).unwrap();

    assert_eq!(spent(&db, "Fuel", month(2023, 11)), Decimal::ZERO);
    assert_eq!(spent(&db, "Fuel", BudgetMonth::current()), dec!(7));
}

#[test]
fn test_delete_of_foreign_or_missing_transaction() {
    let mut db = Database::open_in_memory().unwrap();
    BudgetTracker::create_budget(&mut db, &alice(), "Fuel", dec!(100), month(2024, 5)).unwrap();
    let (notifier, _rx) = Notifier::channel();
    let mut workflow = TransactionWorkflow::new(&mut db, &notifier);

    let txn = workflow
        .submit_transaction(&alice(), input("expense", dec!(40), "Fuel", (2024, 5, 2)))
        .unwrap();
    let id = txn.id.unwrap();

    let err = workflow.delete_transaction(id, &UserId::new("mallory")).unwrap_err();
    assert!(matches!(err, WorkflowError::Forbidden { .. }));

    let err = workflow.delete_transaction(id + 100, &alice()).unwrap_err();
    assert!(matches!(err, WorkflowError::NotFound { .. }));

    // Neither attempt touched the row or the budget.
    assert!(db.get_transaction(id).unwrap().is_some());
    assert_eq!(spent(&db, "Fuel", month(2024, 5)), dec!(40));
}

#[test]
fn test_spent_never_goes_negative() {
    let mut db = Database::open_in_memory().unwrap();
    let (notifier, _rx) = Notifier::channel();
    let mut workflow = TransactionWorkflow::new(&mut db, &notifier);

    // Recorded before the budget existed, so the budget never saw it.
    let early = workflow
        .submit_transaction(&alice(), input("expense", dec!(60), "Fuel", (2024, 5, 2)))
        .unwrap();
    drop(workflow);
    BudgetTracker::create_budget(&mut db, &alice(), "Fuel", dec!(100), month(2024, 5)).unwrap();
    let budget_id = db.find_budget(&alice(), "Fuel", month(2024, 5)).unwrap().unwrap().id.unwrap();
    db.update_budget_spent(budget_id, dec!(10)).unwrap();

    TransactionWorkflow::new(&mut db, &notifier)
        .delete_transaction(early.id.unwrap(), &alice())
        .unwrap();
    assert_eq!(spent(&db, "Fuel", month(2024, 5)), Decimal::ZERO);
}

#[test]
fn test_submit_then_delete_matches_recompute() {
    let mut db = Database::open_in_memory().unwrap();
    let m = month(2024, 9);
    BudgetTracker::create_budget(&mut db, &alice(), "Dining", dec!(500), m).unwrap();
    let (notifier, _rx) = Notifier::channel();
    let mut workflow = TransactionWorkflow::new(&mut db, &notifier);

    let mut ids = Vec::new();
    for (day, amount) in [dec!(19.99), dec!(5.01), dec!(73.40), dec!(12)].into_iter().enumerate() {
        let txn = workflow
            .submit_transaction(&alice(), input("expense", amount, "Dining", (2024, 9, day as u32 + 1)))
            .unwrap();
        ids.push(txn.id.unwrap());
    }
    workflow.delete_transaction(ids[2], &alice()).unwrap();
    workflow.delete_transaction(ids[0], &alice()).unwrap();

    let incremental = spent(&db, "Dining", m);
    assert_eq!(incremental, dec!(17.01));
    assert_eq!(BudgetTracker::recompute(&mut db, &alice(), "Dining", m).unwrap(), incremental);
}

#[test]
fn test_notifications_address_the_submitting_user() {
    let mut db = Database::open_in_memory().unwrap();
    let (notifier, mut rx) = Notifier::channel();

    TransactionWorkflow::new(&mut db, &notifier)
        .submit_transaction(&alice(), input("expense", dec!(3), "Fuel", (2024, 5, 1)))
        .unwrap();
    let notification = rx.try_recv().unwrap();
    assert_eq!(notification.audience, Audience::User(alice()));
}
