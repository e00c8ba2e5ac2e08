use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::UserId;

#[derive(Debug, Error, PartialEq)]
pub(crate) enum ValidationError {
    #[error("Amount must be greater than zero, got [{amount}]")]
    NonPositiveAmount { amount: Decimal },
    #[error("Amount must be in whole cents, got [{amount}]")]
    TooPrecise { amount: Decimal },
    #[error("Amount must not exceed [{max}], got [{amount}]")]
    TooLarge { amount: Decimal, max: Decimal },
    #[error("Transaction kind is required")]
    MissingKind,
    #[error("Unknown transaction kind [{0}], expected income or expense")]
    UnknownKind(String),
    #[error("Category is required")]
    MissingCategory,
}

#[derive(Debug, Error)]
pub(crate) enum WorkflowError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Failed to save transaction: {0:#}")]
    Persistence(anyhow::Error),
    #[error("Transaction [{transaction_id}] was not found")]
    NotFound { transaction_id: i64 },
    #[error("Transaction [{transaction_id}] does not belong to user [{user_id}]")]
    Forbidden { transaction_id: i64, user_id: UserId },
}
