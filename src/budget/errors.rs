use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::{BudgetMonth, UserId};

#[derive(Debug, Error)]
pub(crate) enum BudgetError {
    #[error("Budget category is required")]
    MissingCategory,
    #[error("Budget limit must not be negative, got [{limit}]")]
    NegativeLimit { limit: Decimal },
    #[error("Budget limit must be in whole cents, got [{limit}]")]
    LimitTooPrecise { limit: Decimal },
    #[error("Budget limit must not exceed [{max}], got [{limit}]")]
    LimitTooLarge { limit: Decimal, max: Decimal },
    #[error("A budget for [{category}] in [{month}] already exists for user [{user_id}]")]
    Duplicate {
        user_id: UserId,
        category: String,
        month: BudgetMonth,
    },
    #[error("Budget [{budget_id}] was not found")]
    NotFound { budget_id: i64 },
    #[error("Budget [{budget_id}] does not belong to user [{user_id}]")]
    Forbidden { budget_id: i64, user_id: UserId },
    #[error("Budget storage failed: {0:#}")]
    Persistence(#[from] anyhow::Error),
}
