//! Gateway configuration.
//!
//! ```toml
//! [database]
//! url = "${DATABASE_URL}"
//! max_connections = 16
//! connect_timeout_ms = 5000
//!
//! [gateway]
//! allowed_tables = ["incidents", "reports", "responders"]
//! query_timeout_ms = 10000
//! max_sql_log_length = 200
//! ```
//!
//! `${VAR}` references in `database.url` are expanded from the environment at load time.
//! The RPC function allow-list is compiled in and cannot be configured.

use crate::allowlist::TableAllowList;
use crate::error::{GatewayError, GatewayResult};
use crate::ident::quote_identifier;
use crate::router::DEFAULT_MAX_SQL_LOG_LENGTH;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub gateway: GatewaySection,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    pub connect_timeout_ms: Option<u64>,
}

fn default_max_connections() -> usize {
    16
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: default_max_connections(),
            connect_timeout_ms: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GatewaySection {
    #[serde(default)]
    pub allowed_tables: Vec<String>,
    pub query_timeout_ms: Option<u64>,
    #[serde(default = "default_max_sql_log_length")]
    pub max_sql_log_length: usize,
}

fn default_max_sql_log_length() -> usize {
    DEFAULT_MAX_SQL_LOG_LENGTH
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            allowed_tables: Vec::new(),
            query_timeout_ms: None,
            max_sql_log_length: default_max_sql_log_length(),
        }
    }
}

impl GatewayConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read, expand and validate a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> GatewayResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::Config(format!("failed to read config file {}: {e}", path.display()))
        })?;
        Self::from_toml(&raw).map_err(|e| match e {
            GatewayError::Config(msg) => {
                GatewayError::Config(format!("{}: {msg}", path.display()))
            }
            other => other,
        })
    }

    /// Parse, expand and validate TOML text.
    pub fn from_toml(raw: &str) -> GatewayResult<Self> {
        let mut config: GatewayConfig =
            toml::from_str(raw).map_err(|e| GatewayError::Config(e.to_string()))?;
        config.expand_env()?;
        config.validate()?;
        Ok(config)
    }

    // ==================== builder-style setters ====================

    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.database.url = url.into();
        self
    }

    pub fn max_connections(mut self, n: usize) -> Self {
        self.database.max_connections = n;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.database.connect_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn allowed_tables<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.gateway.allowed_tables = tables.into_iter().map(Into::into).collect();
        self
    }

    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.gateway.query_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn max_sql_log_length(mut self, len: usize) -> Self {
        self.gateway.max_sql_log_length = len;
        self
    }

    // ==================== derived values ====================

    pub fn query_timeout_duration(&self) -> Option<Duration> {
        self.gateway.query_timeout_ms.map(Duration::from_millis)
    }

    pub fn connect_timeout_duration(&self) -> Option<Duration> {
        self.database.connect_timeout_ms.map(Duration::from_millis)
    }

    /// The frozen table allow-list.
    pub fn table_allow_list(&self) -> GatewayResult<TableAllowList> {
        TableAllowList::new(self.gateway.allowed_tables.iter().cloned())
    }

    fn expand_env(&mut self) -> GatewayResult<()> {
        self.database.url = expand_env_vars(&self.database.url)?;
        Ok(())
    }

    /// Check the settings a gateway cannot run without.
    ///
    /// An empty `database.url` is allowed here; callers that connect check it themselves, since
    /// it may still come from `DATABASE_URL` or the command line.
    pub fn validate(&self) -> GatewayResult<()> {
        if self.database.max_connections == 0 {
            return Err(GatewayError::Config(
                "database.max_connections must be greater than 0".to_string(),
            ));
        }
        if self.gateway.query_timeout_ms == Some(0) {
            return Err(GatewayError::Config(
                "gateway.query_timeout_ms must be greater than 0".to_string(),
            ));
        }
        for table in &self.gateway.allowed_tables {
            quote_identifier(table).map_err(|_| {
                GatewayError::Config(format!("gateway.allowed_tables: invalid table name '{table}'"))
            })?;
        }
        Ok(())
    }
}

fn expand_env_vars(input: &str) -> GatewayResult<String> {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'

            let mut key = String::new();
            let mut closed = false;
            for ch in chars.by_ref() {
                if ch == '}' {
                    closed = true;
                    break;
                }
                key.push(ch);
            }

            if !closed {
                return Err(GatewayError::Config(format!(
                    "unterminated env var reference: ${{{key}}}"
                )));
            }
            if key.is_empty() {
                return Err(GatewayError::Config(
                    "invalid env var reference: ${}".to_string(),
                ));
            }

            let v = std::env::var(&key).map_err(|_| {
                GatewayError::Config(format!("missing env var for config expansion: {key}"))
            })?;
            out.push_str(&v);
            continue;
        }

        out.push(c);
    }

    Ok(out)
}
