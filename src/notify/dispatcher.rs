use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::spawn;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{Audience, ConnectionHub, Notification, Notifier};

/// Background task that drains the notifier queue into the connection hub.
pub(crate) struct Dispatcher;

impl Dispatcher {
    /// Spawns the delivery task and returns the sending half. The task ends
    /// once every clone of the returned `Notifier` has been dropped.
    pub(crate) fn spawn(hub: Arc<ConnectionHub>) -> (Notifier, DispatcherHandle) {
        let (notifier, mut receiver) = Notifier::channel();

        let task = spawn(async move {
            let mut processed = 0;
            while let Some(notification) = receiver.recv().await {
                deliver(&hub, &notification);
                processed += 1;
            }
            debug!("Notification queue closed after {processed} message(s)");
            processed
        });

        (notifier, DispatcherHandle { task })
    }
}

fn deliver(hub: &ConnectionHub, notification: &Notification) {
    let Notification { audience, message } = notification;
    match audience {
        Audience::User(user_id) => match hub.deliver_to_user(user_id, message) {
            Ok(0) => debug!("User [{user_id}] has no open connection, dropped: {message}"),
            Ok(n) => debug!("Delivered to {n} connection(s) of user [{user_id}]: {message}"),
            Err(error) => warn!("Notification not delivered: {error}"),
        },
        Audience::All => {
            let n = hub.deliver_all(message);
            debug!("Broadcast to {n} connection(s): {message}");
        }
    }
}

pub(crate) struct DispatcherHandle {
    task: JoinHandle<usize>,
}

impl DispatcherHandle {
    /// Waits for the queue to drain. Returns the number of notifications handled.
    pub(crate) async fn join(self) -> Result<usize> {
        self.task.await.context("Notification dispatcher panicked")
    }
}
