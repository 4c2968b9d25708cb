//! PostgreSQL connection options.
//!
//! A resolved options record handed to `Connection::open`. Parsing of
//! connection URIs is left to the caller; the record can be built with the
//! builder methods below or deserialized from a config document.

use std::time::Duration;

use dataobjects_core::{ConfigError, Error, Result};
use serde::Deserialize;

/// How a command is driven to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStrategy {
    /// Send the query and block reading until the server is done.
    Blocking,
    /// Send the query, then wait for socket readiness in bounded slices and
    /// consume input as it arrives.
    NonBlocking,
}

impl Default for ExecutionStrategy {
    #[cfg(not(windows))]
    fn default() -> Self {
        ExecutionStrategy::NonBlocking
    }

    #[cfg(windows)]
    fn default() -> Self {
        ExecutionStrategy::Blocking
    }
}

/// PostgreSQL connection options.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConnectionOptions {
    /// Hostname or IP address
    pub host: String,
    /// Port number (default: 5432)
    pub port: u16,
    /// Username for authentication
    pub user: String,
    /// Password for authentication (optional for trust auth)
    pub password: Option<String>,
    /// Database name to connect to
    pub database: String,
    /// Schema search path applied right after connecting
    pub search_path: Option<String>,
    /// Client encoding
    pub encoding: Option<String>,
    /// Legacy alias for `encoding`
    pub charset: Option<String>,
    /// Application name (visible in pg_stat_activity)
    pub application_name: Option<String>,
    /// TCP connect timeout
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,
    /// Wake granularity of the readiness wait; not a query timeout
    #[serde(with = "duration_secs")]
    pub poll_interval: Duration,
    /// Execution strategy for commands
    pub strategy: ExecutionStrategy,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: String::new(),
            password: None,
            database: String::new(),
            search_path: None,
            encoding: None,
            charset: None,
            application_name: None,
            connect_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(1),
            strategy: ExecutionStrategy::default(),
        }
    }
}

impl ConnectionOptions {
    /// Create new options with the given connection components.
    pub fn new(
        host: impl Into<String>,
        user: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            database: database.into(),
            ..Default::default()
        }
    }

    /// Set the port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the password.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set the schema search path.
    pub fn search_path(mut self, path: impl Into<String>) -> Self {
        self.search_path = Some(path.into());
        self
    }

    /// Set the client encoding.
    pub fn encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }

    /// Set the legacy charset alias.
    pub fn charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = Some(charset.into());
        self
    }

    /// Set the application name.
    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the readiness wait granularity.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the execution strategy.
    pub fn strategy(mut self, strategy: ExecutionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Reject options that cannot produce a connection.
    pub fn validate(&self) -> Result<()> {
        if self.database.trim().is_empty() {
            return Err(config_error("database name is required"));
        }
        if self.host.trim().is_empty() {
            return Err(config_error("host is required"));
        }
        if self.poll_interval.is_zero() {
            return Err(config_error("poll_interval must be greater than zero"));
        }
        if self.connect_timeout.is_zero() {
            return Err(config_error("connect_timeout must be greater than zero"));
        }
        Ok(())
    }

    /// The encoding to apply: `encoding`, then `charset`, then `utf8`.
    pub fn effective_encoding(&self) -> &str {
        self.encoding
            .as_deref()
            .or(self.charset.as_deref())
            .filter(|e| !e.is_empty())
            .unwrap_or("utf8")
    }

    /// Build the startup parameters to send to the server.
    pub fn startup_params(&self) -> Vec<(String, String)> {
        let mut params = vec![
            ("user".to_string(), self.user.clone()),
            ("database".to_string(), self.database.clone()),
        ];

        if let Some(app_name) = &self.application_name {
            params.push(("application_name".to_string(), app_name.clone()));
        }

        params
    }

    /// Get the socket address string for connection.
    ///
    /// IPv6 literals are bracketed (`[::1]:5432`).
    pub fn socket_addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

fn config_error(message: &str) -> Error {
    Error::Config(ConfigError {
        message: message.to_string(),
        source: None,
    })
}

/// Durations in config documents are given as (fractional) seconds.
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
