//! Runtime configuration, resolved from the environment.
//!
//! - `SMARTEXPENSE_DB`: database file. Defaults to `smartexpense.db` in the
//!   platform data directory.
//! - `SMARTEXPENSE_USER`: user the session acts as. Defaults to `local`.
//! - `SMARTEXPENSE_LOG`: log level for this crate. Defaults to `warn`;
//!   `RUST_LOG` takes over entirely when set.

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use tracing_subscriber::filter::LevelFilter;

use crate::models::{UserId, UserSession};

const DB_VAR: &str = "SMARTEXPENSE_DB";
const USER_VAR: &str = "SMARTEXPENSE_USER";
const LOG_VAR: &str = "SMARTEXPENSE_LOG";
const DEFAULT_USER: &str = "local";
const DB_FILE: &str = "smartexpense.db";

#[derive(Debug, Clone)]
pub(crate) struct Config {
    pub(crate) db_path: PathBuf,
    pub(crate) user_id: UserId,
    pub(crate) log_level: LevelFilter,
}

impl Config {
    pub(crate) fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let db_path = match var(DB_VAR) {
            Some(path) => PathBuf::from(path),
            None => default_db_path()?,
        };
        let user_id = UserId::new(var(USER_VAR).unwrap_or_else(|| DEFAULT_USER.into()));
        let log_level = match var(LOG_VAR) {
            Some(level) => LevelFilter::from_str(&level)
                .with_context(|| format!("Invalid {LOG_VAR} value '{level}'"))?,
            None => LevelFilter::WARN,
        };

        Ok(Self {
            db_path,
            user_id,
            log_level,
        })
    }

    /// The session the command line acts under. Local use has no login step,
    /// so the configured user is taken as verified.
    pub(crate) fn session(&self) -> UserSession {
        UserSession::verified(self.user_id.clone())
    }
}

fn default_db_path() -> Result<PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("com", "smartexpense", "SmartExpense")
        .context("Could not determine data directory")?;
    let data_dir = proj_dirs.data_dir();
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;
    Ok(data_dir.join(DB_FILE))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_explicit_values() {
        let config = config(&[
            (DB_VAR, "/tmp/ledger.db"),
            (USER_VAR, "alice"),
            (LOG_VAR, "debug"),
        ])
        .unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/ledger.db"));
        assert_eq!(config.user_id, UserId::new("alice"));
        assert_eq!(config.log_level, LevelFilter::DEBUG);
        assert_eq!(config.session().user_id(), &UserId::new("alice"));
    }

    #[test]
    fn test_blank_values_fall_back_to_defaults() {
        let config = config(&[(DB_VAR, "/tmp/x.db"), (USER_VAR, "  "), (LOG_VAR, "")]).unwrap();
        assert_eq!(config.user_id, UserId::new(DEFAULT_USER));
        assert_eq!(config.log_level, LevelFilter::WARN);
    }

    #[test]
    fn test_invalid_log_level() {
        let err = config(&[(DB_VAR, "/tmp/x.db"), (LOG_VAR, "loud")]).unwrap_err();
        assert!(err.to_string().contains(LOG_VAR));
    }
}
