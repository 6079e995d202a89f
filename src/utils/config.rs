use anyhow::Context;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use super::retry::RetryPolicy;
use crate::error::MigrationError;
use crate::monitor::MonitorSettings;

/// Prefix der Environment Variablen, z.B. `MIGRATOR_ADMIN_PORT`
pub const ENV_PREFIX: &str = "MIGRATOR";

/// Default-Datei im Arbeitsverzeichnis, falls kein `--config` angegeben ist
pub const DEFAULT_CONFIG_FILE: &str = "migrator";

/// Hauptkonfiguration des Migrators
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_admin_port")]
    pub admin_port: u16,
    #[serde(default)]
    pub log_format: LogFormat,
    /// Account in dem die Job-Tabelle liegt
    pub jobs_account: String,
    #[serde(default = "default_jobs_table")]
    pub jobs_table: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    /// Ohne Bucket werden fehlgeschlagene Dokumente nur geloggt
    #[serde(default)]
    pub deadletter_bucket: Option<String>,
    /// Default: `jobs_account`
    #[serde(default)]
    pub deadletter_account: Option<String>,
    #[serde(default)]
    pub backfill_enabled: bool,
    #[serde(default = "default_backfill_page_size")]
    pub backfill_page_size: usize,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub accounts: HashMap<String, AccountConfig>,
}

/// Verbindungsdaten eines Accounts (Region + optionaler Endpoint, z.B. DynamoDB Local)
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AccountConfig {
    pub region: String,
    #[serde(default)]
    pub endpoint_url: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

fn default_admin_port() -> u16 {
    8080
}

fn default_jobs_table() -> String {
    "migration_jobs".to_string()
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_max_concurrent_jobs() -> usize {
    4
}

fn default_backfill_page_size() -> usize {
    100
}

impl Config {
    /// Lade Config aus TOML-Datei und Environment Variablen (`.env` wird vorher gelesen)
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let config: Config = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), MigrationError> {
        if self.poll_interval_secs == 0 {
            return Err(MigrationError::Config(
                "poll_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.max_concurrent_jobs == 0 {
            return Err(MigrationError::Config(
                "max_concurrent_jobs must be greater than 0".to_string(),
            ));
        }
        self.account(&self.jobs_account)?;
        if self.deadletter_bucket.is_some() {
            self.account(self.deadletter_account())?;
        }
        Ok(())
    }

    pub fn account(&self, name: &str) -> Result<&AccountConfig, MigrationError> {
        self.accounts
            .get(name)
            .ok_or_else(|| MigrationError::Config(format!("unknown account: {name}")))
    }

    pub fn deadletter_account(&self) -> &str {
        self.deadletter_account
            .as_deref()
            .unwrap_or(&self.jobs_account)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn monitor_settings(&self) -> MonitorSettings {
        MonitorSettings {
            poll_interval: self.poll_interval(),
            max_concurrent_jobs: self.max_concurrent_jobs,
            // Konflikte lösen sich schnell, daher kurzer Backoff
            conflict_backoff: RetryPolicy {
                base_delay_ms: self.retry.base_delay_ms,
                max_delay_ms: self.retry.base_delay_ms.saturating_mul(10),
                max_attempts: None,
            },
        }
    }
}
