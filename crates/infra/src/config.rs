//! Configuration loading from the process environment.

use std::time::Duration;

use thiserror::Error;

use asrs_warehouse::{IntegrityPolicy, TopologySpec};

use crate::allocation::DEFAULT_TRANSACTION_TIMEOUT;

pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid {key}: {message}")]
pub struct ConfigError {
    pub key: &'static str,
    pub message: String,
}

impl ConfigError {
    fn new(key: &'static str, message: impl Into<String>) -> Self {
        Self {
            key,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarehouseConfig {
    /// `None` selects the in-memory store.
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub transaction_timeout: Duration,
    pub integrity_policy: IntegrityPolicy,
    pub topology: TopologySpec,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            transaction_timeout: DEFAULT_TRANSACTION_TIMEOUT,
            integrity_policy: IntegrityPolicy::default(),
            topology: TopologySpec::default(),
        }
    }
}

impl WarehouseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key/value source. Unset or blank keys keep
    /// their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let max_connections = match get("ASRS_DB_MAX_CONNECTIONS") {
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::new(
                        "ASRS_DB_MAX_CONNECTIONS",
                        format!("expected a positive integer, got '{raw}'"),
                    ));
                }
            },
            None => defaults.max_connections,
        };

        let transaction_timeout = match get("ASRS_TX_TIMEOUT_MS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => Duration::from_millis(ms),
                _ => {
                    return Err(ConfigError::new(
                        "ASRS_TX_TIMEOUT_MS",
                        format!("expected milliseconds > 0, got '{raw}'"),
                    ));
                }
            },
            None => defaults.transaction_timeout,
        };

        let integrity_policy = match get("ASRS_INTEGRITY_POLICY") {
            Some(raw) => raw
                .parse()
                .map_err(|e| ConfigError::new("ASRS_INTEGRITY_POLICY", format!("{e}")))?,
            None => defaults.integrity_policy,
        };

        let columns = match get("ASRS_COLUMNS") {
            Some(raw) => TopologySpec::parse_columns(&raw)
                .map_err(|e| ConfigError::new("ASRS_COLUMNS", format!("{e}")))?,
            None => defaults.topology.columns().to_vec(),
        };
        let rows = match get("ASRS_ROWS") {
            Some(raw) => raw.trim().parse::<u16>().map_err(|_| {
                ConfigError::new("ASRS_ROWS", format!("expected a row count, got '{raw}'"))
            })?,
            None => defaults.topology.rows(),
        };
        let sub_slots = match get("ASRS_SUB_SLOTS") {
            Some(raw) => TopologySpec::parse_sub_slots(&raw)
                .map_err(|e| ConfigError::new("ASRS_SUB_SLOTS", format!("{e}")))?,
            None => defaults.topology.sub_slots().to_vec(),
        };
        let topology = TopologySpec::new(columns, rows, sub_slots)
            .map_err(|e| ConfigError::new("topology", format!("{e}")))?;

        Ok(Self {
            database_url: get("DATABASE_URL"),
            max_connections,
            transaction_timeout,
            integrity_policy,
            topology,
        })
    }
}
