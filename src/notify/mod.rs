//! Best-effort push notifications.
//!
//! Callers enqueue through a [`Notifier`] and move on; the [`Dispatcher`] task
//! owns delivery to whatever connections the [`ConnectionHub`] holds at that
//! moment. Nothing is queued for users who are offline and nothing is retried.

mod dispatcher;
mod errors;
mod hub;

use rust_decimal::{Decimal, RoundingStrategy};
use tokio::sync::mpsc;
use tracing::warn;

use crate::models::{Transaction, TransactionKind, UserId};

pub(crate) use dispatcher::Dispatcher;
pub(crate) use errors::NotificationError;
pub(crate) use hub::ConnectionHub;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Audience {
    User(UserId),
    All,
}

impl std::fmt::Display for Audience {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User(user_id) => write!(f, "user [{user_id}]"),
            Self::All => write!(f, "all connections"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Notification {
    pub(crate) audience: Audience,
    pub(crate) message: String,
}

/// Cheap-to-clone handle for enqueueing notifications. Every method returns
/// whether the message was accepted by the queue; none of them fail.
#[derive(Debug, Clone)]
pub(crate) struct Notifier {
    sender: mpsc::UnboundedSender<Notification>,
}

impl Notifier {
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    pub(crate) fn send_to_user(&self, user_id: &UserId, message: impl Into<String>) -> bool {
        self.enqueue(Notification {
            audience: Audience::User(user_id.clone()),
            message: message.into(),
        })
    }

    pub(crate) fn broadcast(&self, message: impl Into<String>) -> bool {
        self.enqueue(Notification {
            audience: Audience::All,
            message: message.into(),
        })
    }

    /// Prefixes `icon` when given, else a camera when the message carries an
    /// image. The image itself is not part of the text.
    pub(crate) fn send_custom(
        &self,
        user_id: &UserId,
        message: &str,
        icon: Option<&str>,
        image_url: Option<&str>,
    ) -> bool {
        let icon = icon.filter(|i| !i.is_empty());
        let has_image = image_url.is_some_and(|url| !url.is_empty());
        let message = match icon {
            Some(icon) => format!("{icon} {message}"),
            None if has_image => format!("📷 {message}"),
            None => message.to_string(),
        };
        self.send_to_user(user_id, message)
    }

    pub(crate) fn notify_transaction(&self, txn: &Transaction) -> bool {
        let (icon, action) = match txn.kind {
            TransactionKind::Income => ("💰", "added to"),
            TransactionKind::Expense => ("💸", "spent on"),
        };
        let message = format!(
            "{}: ${} {action} {}",
            txn.kind.label(),
            dollars(txn.amount),
            txn.category
        );
        self.send_custom(&txn.user_id, &message, Some(icon), None)
    }

    pub(crate) fn notify_contact_submission(&self, name: &str, email: &str, subject: &str) -> bool {
        self.broadcast(format!("📧 New Contact Form: {name} ({email}) - {subject}"))
    }

    fn enqueue(&self, notification: Notification) -> bool {
        match self.sender.send(notification) {
            Ok(()) => true,
            Err(mpsc::error::SendError(dropped)) => {
                warn!(
                    "Dropping notification for {}: {}",
                    dropped.audience,
                    NotificationError::QueueClosed
                );
                false
            }
        }
    }
}

fn dollars(amount: Decimal) -> String {
    format!(
        "{:.2}",
        amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    )
}
