mod schema;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row, TransactionBehavior};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

use crate::models::*;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Storage operations the budgeting core depends on. `Database` is the
/// production implementation; anything else is a test double.
pub(crate) trait LedgerStore {
    fn insert_transaction(&mut self, txn: &Transaction) -> Result<i64>;
    /// Returns whether a row was removed.
    fn delete_transaction(&mut self, id: i64) -> Result<bool>;
    fn get_transaction(&self, id: i64) -> Result<Option<Transaction>>;
    fn find_budget(
        &self,
        user_id: &UserId,
        category: &str,
        month: BudgetMonth,
    ) -> Result<Option<Budget>>;
    fn update_budget_spent(&mut self, budget_id: i64, spent: Decimal) -> Result<()>;
    /// Adds `delta` to `spent` atomically and clamps the result at zero.
    /// Returns the stored value.
    fn adjust_budget_spent(&mut self, budget_id: i64, delta: Decimal) -> Result<Decimal>;
    /// Sum of expense amounts for (user, category, month); category is case-insensitive.
    fn sum_expenses(&self, user_id: &UserId, category: &str, month: BudgetMonth)
        -> Result<Decimal>;
    fn get_user_settings(&self, user_id: &UserId) -> Result<UserSettings>;
}

/// Optional filters for listing a user's transactions. Empty means everything.
#[derive(Debug, Clone, Default)]
pub(crate) struct TransactionFilter {
    pub(crate) kind: Option<TransactionKind>,
    pub(crate) category: Option<String>,
    pub(crate) from: Option<NaiveDate>,
    pub(crate) to: Option<NaiveDate>,
    pub(crate) month: Option<BudgetMonth>,
}

pub(crate) struct Database {
    conn: Connection,
}

impl Database {
    pub(crate) fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .context("Failed to set database pragmas")?;
        let mut db = Self { conn };
        db.migrate().context("Database migration failed")?;
        debug!("Opened database at {}", path.display());
        Ok(db)
    }

    #[cfg(test)]
    pub(crate) fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let mut db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&mut self) -> Result<()> {
        let has_version_table: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            [],
            |row| row.get(0),
        )?;

        if !has_version_table {
            self.conn.execute_batch(schema::SCHEMA_V1)?;
            self.conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                params![schema::CURRENT_VERSION],
            )?;
            return Ok(());
        }

        let current: i32 = self
            .conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .unwrap_or(0);

        for &(from_version, sql) in schema::MIGRATIONS {
            if current <= from_version {
                self.conn.execute_batch(sql)?;
            }
        }

        if current < schema::CURRENT_VERSION {
            self.conn.execute(
                "UPDATE schema_version SET version = ?1",
                params![schema::CURRENT_VERSION],
            )?;
        }

        Ok(())
    }

    // ── Transactions ──────────────────────────────────────────

    pub(crate) fn get_transactions(
        &self,
        user_id: &UserId,
        filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>> {
        let mut sql = String::from(
            "SELECT id, user_id, amount, kind, category, date, description
             FROM transactions WHERE user_id = ?1",
        );
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> =
            vec![Box::new(user_id.as_str().to_string())];

        if let Some(kind) = filter.kind {
            sql.push_str(&format!(" AND kind = ?{}", param_values.len() + 1));
            param_values.push(Box::new(kind.as_str()));
        }
        if let Some(category) = &filter.category {
            sql.push_str(&format!(
                " AND category_key = ?{}",
                param_values.len() + 1
            ));
            param_values.push(Box::new(category_key(category)));
        }
        if let Some(from) = filter.from {
            sql.push_str(&format!(" AND date >= ?{}", param_values.len() + 1));
            param_values.push(Box::new(from.format(DATE_FORMAT).to_string()));
        }
        if let Some(to) = filter.to {
            sql.push_str(&format!(" AND date <= ?{}", param_values.len() + 1));
            param_values.push(Box::new(to.format(DATE_FORMAT).to_string()));
        }
        if let Some(month) = filter.month {
            sql.push_str(&format!(" AND date LIKE ?{}", param_values.len() + 1));
            param_values.push(Box::new(month.date_pattern()));
        }

        sql.push_str(" ORDER BY date DESC, id DESC");

        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_ref.as_slice(), transaction_from_row)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    // ── Budgets ───────────────────────────────────────────────

    pub(crate) fn insert_budget(&self, budget: &Budget) -> Result<i64> {
        self.conn
            .execute(
                "INSERT INTO budgets (user_id, category, category_key, month, limit_amount, spent)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    budget.user_id.as_str(),
                    budget.category,
                    category_key(&budget.category),
                    budget.month.to_string(),
                    budget.limit_amount.to_string(),
                    budget.spent.to_string(),
                ],
            )
            .with_context(|| {
                format!(
                    "Failed to insert budget for '{}' in {}",
                    budget.category, budget.month
                )
            })?;
        Ok(self.conn.last_insert_rowid())
    }

    pub(crate) fn get_budget(&self, id: i64) -> Result<Option<Budget>> {
        let result = self.conn.query_row(
            "SELECT id, user_id, category, month, limit_amount, spent FROM budgets WHERE id = ?1",
            params![id],
            budget_from_row,
        );
        match result {
            Ok(b) => Ok(Some(b)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub(crate) fn get_budgets(&self, user_id: &UserId, month: BudgetMonth) -> Result<Vec<Budget>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, category, month, limit_amount, spent FROM budgets
             WHERE user_id = ?1 AND month = ?2
             ORDER BY category_key",
        )?;
        let rows = stmt.query_map(
            params![user_id.as_str(), month.to_string()],
            budget_from_row,
        )?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    pub(crate) fn delete_budget(&self, id: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM budgets WHERE id = ?1", params![id])?;
        Ok(())
    }

    // ── Settings ──────────────────────────────────────────────

    /// Stored overrides only; unknown keys are skipped.
    pub(crate) fn get_settings(&self, user_id: &UserId) -> Result<Vec<(SettingKey, String)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, value FROM settings WHERE user_id = ?1 ORDER BY key")?;
        let rows = stmt.query_map(params![user_id.as_str()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut settings = Vec::new();
        for row in rows {
            let (key, value) = row?;
            match SettingKey::parse(&key) {
                Some(key) => settings.push((key, value)),
                None => debug!("Skipping unknown setting '{key}' for user {user_id}"),
            }
        }
        Ok(settings)
    }

    pub(crate) fn set_setting(&self, user_id: &UserId, key: SettingKey, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO settings (user_id, key, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id, key) DO UPDATE SET value = ?3",
            params![user_id.as_str(), key.as_str(), value],
        )?;
        Ok(())
    }

    // ── Analytics ─────────────────────────────────────────────

    /// Every transaction of the user dated on or after `since`, oldest first.
    pub(crate) fn get_transactions_since(
        &self,
        user_id: &UserId,
        since: NaiveDate,
    ) -> Result<Vec<Transaction>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, amount, kind, category, date, description
             FROM transactions WHERE user_id = ?1 AND date >= ?2
             ORDER BY date, id",
        )?;
        let rows = stmt.query_map(
            params![user_id.as_str(), since.format(DATE_FORMAT).to_string()],
            transaction_from_row,
        )?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Expense totals per category for one month. Categories are grouped
    /// case-insensitively under the first spelling seen.
    pub(crate) fn get_spending_by_category(
        &self,
        user_id: &UserId,
        month: BudgetMonth,
    ) -> Result<Vec<(String, Decimal)>> {
        let filter = TransactionFilter {
            kind: Some(TransactionKind::Expense),
            month: Some(month),
            ..Default::default()
        };
        let mut txns = self.get_transactions(user_id, &filter)?;
        txns.reverse();
        sum_by_category(&txns)
    }
}

impl LedgerStore for Database {
    fn insert_transaction(&mut self, txn: &Transaction) -> Result<i64> {
        self.conn
            .execute(
                "INSERT INTO transactions (user_id, amount, kind, category, category_key, date, description, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    txn.user_id.as_str(),
                    txn.amount.to_string(),
                    txn.kind.as_str(),
                    txn.category,
                    category_key(&txn.category),
                    txn.date.format(DATE_FORMAT).to_string(),
                    txn.description,
                    chrono::Utc::now().to_rfc3339(),
                ],
            )
            .context("Failed to insert transaction")?;
        Ok(self.conn.last_insert_rowid())
    }

    fn delete_transaction(&mut self, id: i64) -> Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM transactions WHERE id = ?1", params![id])
            .with_context(|| format!("Failed to delete transaction {id}"))?;
        Ok(removed > 0)
    }

    fn get_transaction(&self, id: i64) -> Result<Option<Transaction>> {
        let result = self.conn.query_row(
            "SELECT id, user_id, amount, kind, category, date, description
             FROM transactions WHERE id = ?1",
            params![id],
            transaction_from_row,
        );
        match result {
            Ok(t) => Ok(Some(t)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn find_budget(
        &self,
        user_id: &UserId,
        category: &str,
        month: BudgetMonth,
    ) -> Result<Option<Budget>> {
        let result = self.conn.query_row(
            "SELECT id, user_id, category, month, limit_amount, spent FROM budgets
             WHERE user_id = ?1 AND category_key = ?2 AND month = ?3",
            params![user_id.as_str(), category_key(category), month.to_string()],
            budget_from_row,
        );
        match result {
            Ok(b) => Ok(Some(b)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn update_budget_spent(&mut self, budget_id: i64, spent: Decimal) -> Result<()> {
        self.conn.execute(
            "UPDATE budgets SET spent = ?1 WHERE id = ?2",
            params![spent.to_string(), budget_id],
        )?;
        Ok(())
    }

    fn adjust_budget_spent(&mut self, budget_id: i64, delta: Decimal) -> Result<Decimal> {
        // IMMEDIATE takes the write lock up front so the read below cannot go stale.
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let current: String = tx
            .query_row(
                "SELECT spent FROM budgets WHERE id = ?1",
                params![budget_id],
                |row| row.get(0),
            )
            .with_context(|| format!("Budget {budget_id} not found"))?;
        let current = Decimal::from_str(&current)
            .with_context(|| format!("Budget {budget_id} has a malformed spent value"))?;
        let updated = current
            .checked_add(delta)
            .with_context(|| format!("Budget {budget_id} spent overflowed adding {delta}"))?
            .max(Decimal::ZERO);
        tx.execute(
            "UPDATE budgets SET spent = ?1 WHERE id = ?2",
            params![updated.to_string(), budget_id],
        )?;
        tx.commit()?;
        Ok(updated)
    }

    fn sum_expenses(
        &self,
        user_id: &UserId,
        category: &str,
        month: BudgetMonth,
    ) -> Result<Decimal> {
        let mut stmt = self.conn.prepare(
            "SELECT amount FROM transactions
             WHERE user_id = ?1 AND kind = 'expense' AND category_key = ?2
               AND date LIKE ?3",
        )?;
        let rows = stmt.query_map(
            params![user_id.as_str(), category_key(category), month.date_pattern()],
            |row| decimal_column(row, 0),
        )?;
        let amounts = rows.collect::<rusqlite::Result<Vec<Decimal>>>()?;
        checked_total(amounts)
            .with_context(|| format!("Expense total for {category} in {month} overflowed"))
    }

    fn get_user_settings(&self, user_id: &UserId) -> Result<UserSettings> {
        let stored = self.get_settings(user_id)?;
        Ok(UserSettings::from_pairs(
            stored.iter().map(|(key, value)| (*key, value.as_str())),
        ))
    }
}

/// Exact sum, or `None` if it leaves the representable range.
pub(crate) fn checked_total(amounts: impl IntoIterator<Item = Decimal>) -> Option<Decimal> {
    amounts
        .into_iter()
        .try_fold(Decimal::ZERO, |total, amount| total.checked_add(amount))
}

/// Sums amounts per category, preserving first-seen order and spelling.
pub(crate) fn sum_by_category(txns: &[Transaction]) -> Result<Vec<(String, Decimal)>> {
    let mut totals: Vec<(String, Decimal)> = Vec::new();
    for txn in txns {
        let key = category_key(&txn.category);
        match totals.iter_mut().find(|(name, _)| category_key(name) == key) {
            Some((name, total)) => {
                *total = total
                    .checked_add(txn.amount)
                    .with_context(|| format!("Total for {name} overflowed"))?;
            }
            None => totals.push((txn.category.clone(), txn.amount)),
        }
    }
    Ok(totals)
}

fn decimal_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let text: String = row.get(idx)?;
    Decimal::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn transaction_from_row(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    let kind: String = row.get(3)?;
    let kind = TransactionKind::parse(&kind).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            Type::Text,
            format!("unknown transaction kind '{kind}'").into(),
        )
    })?;
    let date: String = row.get(5)?;
    let date = NaiveDate::parse_from_str(&date, DATE_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?;
    Ok(Transaction {
        id: Some(row.get(0)?),
        user_id: UserId::new(row.get::<_, String>(1)?),
        amount: decimal_column(row, 2)?,
        kind,
        category: row.get(4)?,
        date,
        description: row.get(6)?,
    })
}

fn budget_from_row(row: &Row<'_>) -> rusqlite::Result<Budget> {
    let month: String = row.get(3)?;
    let month = BudgetMonth::parse(&month).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, Type::Text, e.into())
    })?;
    Ok(Budget {
        id: Some(row.get(0)?),
        user_id: UserId::new(row.get::<_, String>(1)?),
        category: row.get(2)?,
        month,
        limit_amount: decimal_column(row, 4)?,
        spent: decimal_column(row, 5)?,
    })
}
