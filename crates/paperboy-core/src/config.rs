use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Number of days after which transient records (execution log, failure log)
/// expire.
pub const RECORD_TTL_DAYS: i64 = 7;
/// Cumulative failures per calendar day before the circuit breaker opens.
pub const MAX_FAILURES_PER_DAY: i64 = 3;
/// Failure messages are truncated to this many characters before storage.
pub const MAX_ERROR_CHARS: usize = 500;
/// Bounded wait on SQLite connection acquisition so a stalled writer cannot
/// hang a caller indefinitely.
pub const SQLITE_BUSY_TIMEOUT_MS: u32 = 30_000;

/// Top-level config (paperboy.toml + PAPERBOY_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PaperboyConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

/// Where state lives. One environment runs against DynamoDB, the other
/// against a local SQLite file; both sections are always present so a single
/// config file works in either place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database file (embedded backend).
    #[serde(default = "default_db_path")]
    pub db_path: String,
    /// AWS region for the managed backend.
    #[serde(default = "default_aws_region")]
    pub aws_region: String,
    #[serde(default = "default_recipients_table")]
    pub recipients_table: String,
    #[serde(default = "default_failures_table")]
    pub failures_table: String,
    #[serde(default = "default_execution_table")]
    pub execution_table: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            aws_region: default_aws_region(),
            recipients_table: default_recipients_table(),
            failures_table: default_failures_table(),
            execution_table: default_execution_table(),
        }
    }
}

/// Admin notification settings. The transport itself is owned by the
/// orchestrator; only the destination address is configured here.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NotifyConfig {
    pub admin_email: Option<String>,
}

fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.paperboy/paperboy.db", home)
}
fn default_aws_region() -> String {
    "ap-northeast-2".to_string()
}
fn default_recipients_table() -> String {
    "paperboy-recipients".to_string()
}
fn default_failures_table() -> String {
    "paperboy-delivery-failures".to_string()
}
fn default_execution_table() -> String {
    "paperboy-execution-log".to_string()
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.paperboy/paperboy.toml", home)
}

impl PaperboyConfig {
    /// Load config from a TOML file with PAPERBOY_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. $PAPERBOY_CONFIG
    ///   3. ~/.paperboy/paperboy.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .or_else(|| std::env::var("PAPERBOY_CONFIG").ok())
            .unwrap_or_else(default_config_path);

        // Double underscore separates sections from keys, so
        // PAPERBOY_STORAGE__DB_PATH reaches storage.db_path.
        let config: PaperboyConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("PAPERBOY_").split("__"))
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_complete() {
        let config = PaperboyConfig::default();
        assert!(config.storage.db_path.ends_with("paperboy.db"));
        assert_eq!(config.storage.aws_region, "ap-northeast-2");
        assert_eq!(config.storage.recipients_table, "paperboy-recipients");
        assert_eq!(config.storage.execution_table, "paperboy-execution-log");
        assert!(config.notify.admin_email.is_none());
    }
}
