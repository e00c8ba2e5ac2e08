use thiserror::Error;

use crate::models::UserId;

#[derive(Debug, Error)]
pub(crate) enum NotificationError {
    #[error("Notification queue is closed")]
    QueueClosed,
    #[error("All {attempted} connection(s) of user [{user_id}] are closed")]
    Undeliverable { user_id: UserId, attempted: usize },
}
