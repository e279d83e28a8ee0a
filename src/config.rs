//! Configuration.
//!
//! Required environment variables are read fail-fast with a descriptive
//! error and no hidden defaults. Optional variables fall back to
//! documented defaults.

use crate::error::{IndexerError, Result};

const DEFAULT_USER_CONFIG_REFRESH_INTERVAL_SECS: u64 = 300;
const DEFAULT_FROM_LEDGER: u32 = 0;

#[derive(Debug, Clone)]
pub struct Config {
    pub ledger_rpc_url: String,
    pub store_uri: String,
    pub store_db_name: String,
    pub collection_frequency_secs: u64,
    pub user_config_refresh_interval_secs: u64,
    pub source_tag: Option<u32>,
    pub from_ledger: u32,
}

impl Config {
    /// Read the six contractual environment variables. Required
    /// variables missing from the environment produce a descriptive
    /// error that propagates to `main` and exits 1.
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            ledger_rpc_url: required_env("LEDGER_RPC_URL")?,
            store_uri: required_env("STORE_URI")?,
            store_db_name: required_env("STORE_DB_NAME")?,
            collection_frequency_secs: required_env("COLLECTION_FREQUENCY")?
                .parse()
                .map_err(|_| IndexerError::Config("COLLECTION_FREQUENCY must be an integer number of seconds".to_string()))?,
            user_config_refresh_interval_secs: optional_env("USER_CONFIG_REFRESH_INTERVAL")?
                .unwrap_or(DEFAULT_USER_CONFIG_REFRESH_INTERVAL_SECS),
            source_tag: std::env::var("SOURCE_TAG").ok().and_then(|v| v.parse().ok()),
            from_ledger: optional_env("FROM_LEDGER")?.map(|v: u64| v as u32).unwrap_or(DEFAULT_FROM_LEDGER),
        })
    }
}

fn required_env(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| IndexerError::Config(format!("missing required environment variable {name}")))
}

fn optional_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| IndexerError::Config(format!("{name} has an invalid value"))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn missing_required_var_is_a_config_error() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("LEDGER_RPC_URL");
        let err = required_env("LEDGER_RPC_URL").unwrap_err();
        assert!(matches!(err, IndexerError::Config(_)));
    }

    #[test]
    fn optional_var_falls_back_when_absent() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("FROM_LEDGER");
        let value: Option<u32> = optional_env("FROM_LEDGER").unwrap();
        assert_eq!(value, None);
    }
}
