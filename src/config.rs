/*!
 * Configuration
 *
 * Server settings come from defaults, then an optional JSON file named by
 * `UNISOCKETS_CONFIG`, then individual `UNISOCKETS_*` environment overrides.
 */

use crate::core::limits::{
    DEFAULT_MAX_OPEN_HANDLES, DEFAULT_RECV_BUFFER_LEN, DEFAULT_SERVER_BACKLOG, DEFAULT_SERVER_HOST,
    DEFAULT_SERVER_PORT,
};
use crate::net::Address;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info};

pub const CONFIG_PATH_VAR: &str = "UNISOCKETS_CONFIG";
pub const HOST_VAR: &str = "UNISOCKETS_HOST";
pub const PORT_VAR: &str = "UNISOCKETS_PORT";
pub const BACKLOG_VAR: &str = "UNISOCKETS_BACKLOG";
pub const BUFFER_LEN_VAR: &str = "UNISOCKETS_BUFFER_LEN";

/// Configuration result
pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Diagnostic)]
#[serde(rename_all = "snake_case", tag = "error", content = "details")]
pub enum ConfigError {
    #[error("could not read config file {path}: {message}")]
    #[diagnostic(
        code(config::read),
        help("Check that UNISOCKETS_CONFIG points at a readable file")
    )]
    Read { path: String, message: String },

    #[error("could not parse config file {path}: {message}")]
    #[diagnostic(
        code(config::parse),
        help("The file must be a JSON object with any of: host, port, backlog, buffer_len")
    )]
    Parse { path: String, message: String },

    #[error("invalid value {value:?} for {name}")]
    #[diagnostic(code(config::invalid_value))]
    InvalidValue { name: String, value: String },
}

/// Limits applied to a socket layer instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketLimits {
    pub max_open_handles: usize,
}

impl Default for SocketLimits {
    fn default() -> Self {
        Self {
            max_open_handles: DEFAULT_MAX_OPEN_HANDLES,
        }
    }
}

/// Connection server settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: Ipv4Addr,
    pub port: u16,
    pub backlog: i32,
    pub buffer_len: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Ipv4Addr::from(DEFAULT_SERVER_HOST),
            port: DEFAULT_SERVER_PORT,
            backlog: DEFAULT_SERVER_BACKLOG,
            buffer_len: DEFAULT_RECV_BUFFER_LEN,
        }
    }
}

fn parse_var<T: FromStr>(name: &str, value: String) -> ConfigResult<T> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        name: name.to_string(),
        value,
    })
}

impl ServerConfig {
    pub fn address(&self) -> Address {
        Address::new(self.host, self.port)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let config: Self = serde_json::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        debug!(path = %path.display(), "loaded server config file");
        Ok(config)
    }

    /// Load from the process environment
    pub fn load() -> ConfigResult<Self> {
        Self::load_with(|name| std::env::var(name).ok())
    }

    /// Load using `lookup` in place of the environment
    pub fn load_with(lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<Self> {
        let mut config = match lookup(CONFIG_PATH_VAR) {
            Some(path) => Self::from_json_file(path)?,
            None => Self::default(),
        };

        if let Some(value) = lookup(HOST_VAR) {
            config.host = parse_var(HOST_VAR, value)?;
        }
        if let Some(value) = lookup(PORT_VAR) {
            config.port = parse_var(PORT_VAR, value)?;
        }
        if let Some(value) = lookup(BACKLOG_VAR) {
            config.backlog = parse_var(BACKLOG_VAR, value)?;
        }
        if let Some(value) = lookup(BUFFER_LEN_VAR) {
            config.buffer_len = parse_var(BUFFER_LEN_VAR, value)?;
        }

        config.validate()?;
        info!(
            address = %config.address(),
            backlog = config.backlog,
            buffer_len = config.buffer_len,
            "server configuration loaded"
        );
        Ok(config)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.backlog < 0 {
            return Err(ConfigError::InvalidValue {
                name: "backlog".to_string(),
                value: self.backlog.to_string(),
            });
        }
        if self.buffer_len == 0 {
            return Err(ConfigError::InvalidValue {
                name: "buffer_len".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}
