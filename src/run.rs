//! Runs one command-line request inside a notification session.

mod cli;

use std::sync::Arc;

use anyhow::Result;
use tokio::spawn;
use tracing::{debug, warn};

use crate::config::Config;
use crate::db::Database;
use crate::notify::{ConnectionHub, Dispatcher};

pub(crate) async fn as_cli(args: &[String], config: &Config) -> Result<()> {
    if cli::print_info(args) {
        return Ok(());
    }

    let mut db = Database::open(&config.db_path)?;
    let session = config.session();
    let user_id = session.user_id();

    // The session's own connection: pushes for this user show up on stderr
    // while the command's regular output goes to stdout.
    let hub = Arc::new(ConnectionHub::new());
    let (connection, mut pushes) = hub.connect(user_id);
    debug!(
        "Session for [{user_id}] has {} open connection(s)",
        hub.connection_count(user_id)
    );
    let printer = spawn(async move {
        while let Some(message) = pushes.recv().await {
            eprintln!("{message}");
        }
    });
    let (notifier, dispatcher) = Dispatcher::spawn(hub.clone());

    let result = cli::run_command(args, &mut db, user_id, &notifier);

    drop(notifier);
    match dispatcher.join().await {
        Ok(handled) => debug!("Dispatcher drained {handled} notification(s)"),
        Err(e) => warn!("{e:#}"),
    }
    hub.disconnect(connection);
    if let Err(e) = printer.await {
        warn!("Notification printer stopped early: {e}");
    }

    result
}
