mod budget;
mod month;
mod settings;
mod transaction;
mod user;

pub use budget::Budget;
pub(crate) use budget::category_key;
pub use month::BudgetMonth;
pub(crate) use settings::parse_flag;
pub use settings::{SettingKey, UserSettings};
pub(crate) use transaction::{is_currency_scale, DEFAULT_DESCRIPTION, MAX_AMOUNT};
pub use transaction::{Transaction, TransactionInput, TransactionKind};
pub use user::{UserId, UserSession};
