use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::{BudgetMonth, UserId};

pub(crate) const DEFAULT_DESCRIPTION: &str = "No description";

/// Amounts and limits are whole cents.
pub(crate) const CURRENCY_SCALE: u32 = 2;
/// 1,000,000,000,000. Keeps every sum and percentage far from `Decimal::MAX`.
pub(crate) const MAX_AMOUNT: Decimal = Decimal::from_parts(3_567_587_328, 232, 0, false, 0);

/// True when `amount` fits in cents, ignoring trailing zeros.
pub(crate) fn is_currency_scale(amount: Decimal) -> bool {
    amount.normalize().scale() <= CURRENCY_SCALE
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionKind {
    Income,
    Expense,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
        }
    }

    /// Case-insensitive; anything other than income/expense is rejected.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "income" => Some(Self::Income),
            "expense" => Some(Self::Expense),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Income => "Income",
            Self::Expense => "Expense",
        }
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A recorded ledger entry. Immutable once stored; only ever deleted.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub id: Option<i64>,
    pub user_id: UserId,
    /// Always positive; direction comes from `kind`.
    pub amount: Decimal,
    pub kind: TransactionKind,
    pub category: String,
    pub date: NaiveDate,
    pub description: String,
}

impl Transaction {
    pub fn is_income(&self) -> bool {
        self.kind == TransactionKind::Income
    }

    pub fn is_expense(&self) -> bool {
        self.kind == TransactionKind::Expense
    }

    pub fn month(&self) -> BudgetMonth {
        BudgetMonth::from_date(self.date)
    }
}

/// Raw submission from the request layer, before validation.
#[derive(Debug, Clone, Default)]
pub struct TransactionInput {
    pub amount: Decimal,
    pub kind: String,
    pub category: String,
    pub date: Option<NaiveDate>,
    pub description: Option<String>,
}
