//! Server configuration.
//!
//! Configuration is loaded once at startup (defaults, then an optional JSON
//! file, then environment overrides) and resolved into [`TransferSettings`]
//! before the dispatcher starts. Nothing here is mutated while serving.

use crate::error::TftpError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Retransmissions allowed per block when none are configured.
pub const DEFAULT_RETRIES: u8 = 10;

/// Acknowledgement deadline per attempt when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(6);

/// Names of the environment variables read by [`ServerConfig::from_env`].
pub mod env_vars {
    /// Path to an optional JSON configuration file
    pub const CONFIG_FILE: &str = "TFTP_CONFIG";
    /// Listen address override
    pub const LISTEN_ADDR: &str = "TFTP_LISTEN_ADDR";
    /// Payload path override
    pub const PAYLOAD_PATH: &str = "TFTP_PAYLOAD_PATH";
    /// Retry count override
    pub const RETRIES: &str = "TFTP_RETRIES";
    /// Timeout override in seconds
    pub const TIMEOUT_SECS: &str = "TFTP_TIMEOUT_SECS";
}

/// Raw server configuration as read from file and environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct ServerConfig {
    /// Address the dispatcher listens on (default `127.0.0.1:6667`)
    pub listen_addr: String,
    /// File whose contents are served to every client (default `payload.txt`)
    pub payload_path: PathBuf,
    /// Attempts per block; unset or zero means [`DEFAULT_RETRIES`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retries: Option<u8>,
    /// Seconds to wait for each acknowledgement; unset or zero means [`DEFAULT_TIMEOUT`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:6667".to_string(),
            payload_path: PathBuf::from("payload.txt"),
            retries: None,
            timeout_secs: None,
        }
    }
}

/// Resolved per-transfer settings shared read-only by every session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferSettings {
    /// Attempts per block, always at least one
    pub retries: u8,
    /// Deadline for each acknowledgement
    pub timeout: Duration,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ServerConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, TftpError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration using `lookup` to resolve environment variables.
    ///
    /// Starts from defaults, replaces them with the JSON file named by
    /// `TFTP_CONFIG` if set, then applies individual overrides.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, TftpError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup(env_vars::CONFIG_FILE) {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };

        if let Some(addr) = lookup(env_vars::LISTEN_ADDR) {
            config.listen_addr = addr;
        }
        if let Some(path) = lookup(env_vars::PAYLOAD_PATH) {
            config.payload_path = PathBuf::from(path);
        }
        if let Some(raw) = lookup(env_vars::RETRIES) {
            config.retries = Some(parse_override(env_vars::RETRIES, &raw)?);
        }
        if let Some(raw) = lookup(env_vars::TIMEOUT_SECS) {
            config.timeout_secs = Some(parse_override(env_vars::TIMEOUT_SECS, &raw)?);
        }

        Ok(config)
    }

    /// Read a JSON configuration file.
    pub fn from_file(path: &str) -> Result<Self, TftpError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            TftpError::Configuration(format!("failed to read config file {}: {}", path, e))
        })?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Apply defaults to unset or zero values.
    pub fn transfer_settings(&self) -> TransferSettings {
        let retries = match self.retries {
            Some(n) if n > 0 => n,
            _ => DEFAULT_RETRIES,
        };
        let timeout = match self.timeout_secs {
            Some(secs) if secs > 0 => Duration::from_secs(secs),
            _ => DEFAULT_TIMEOUT,
        };
        TransferSettings { retries, timeout }
    }
}

fn parse_override<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, TftpError>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| TftpError::Configuration(format!("{} has invalid value {:?}: {}", key, raw, e)))
}
