use rust_decimal::Decimal;

use super::{BudgetMonth, UserId};

#[derive(Debug, Clone, PartialEq)]
pub struct Budget {
    pub id: Option<i64>,
    pub user_id: UserId,
    pub category: String,
    pub month: BudgetMonth,
    pub limit_amount: Decimal,
    /// Maintained by the budget tracker; never edited directly by the user.
    pub spent: Decimal,
}

impl Budget {
    pub fn new(user_id: UserId, category: String, month: BudgetMonth, limit_amount: Decimal) -> Self {
        Self {
            id: None,
            user_id,
            category,
            month,
            limit_amount,
            spent: Decimal::ZERO,
        }
    }

    /// May go negative once the budget is overspent.
    pub fn remaining(&self) -> Decimal {
        self.limit_amount - self.spent
    }

    /// Zero when the limit is zero. Saturates at `Decimal::MAX` when the
    /// ratio is too large to represent.
    pub fn percentage_used(&self) -> Decimal {
        if self.limit_amount > Decimal::ZERO {
            self.spent
                .checked_div(self.limit_amount)
                .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
                .unwrap_or(Decimal::MAX)
        } else {
            Decimal::ZERO
        }
    }

    pub fn matches_category(&self, category: &str) -> bool {
        category_key(&self.category) == category_key(category)
    }
}

/// Comparison form of a category label: trimmed, Unicode lowercase.
pub(crate) fn category_key(name: &str) -> String {
    name.trim().to_lowercase()
}
