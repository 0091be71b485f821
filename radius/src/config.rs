//! JSON configuration of the daemon.

use std::collections::HashSet;
use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use ipnetwork::IpNetwork;
use serde::Deserialize;
use thiserror::Error;

use crate::storage::User;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read `{0}`: {1}")]
    IoError(String, std::io::Error),
    #[error("failed to parse the configuration: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    InvalidError(String),
}

/// One UDP socket, its shared secret and the networks allowed to use it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ListenerConfig {
    pub addr: String,
    pub secret: String,
    #[serde(default)]
    pub cidr: Vec<String>,
}

fn default_server_identity() -> String {
    "radius@localhost".to_owned()
}

fn default_eap_state_ttl_secs() -> u64 {
    60
}

fn default_sync_interval_secs() -> u64 {
    60
}

fn default_sync_jitter_secs() -> u64 {
    20
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Config {
    pub listeners: Vec<ListenerConfig>,
    #[serde(default = "default_server_identity")]
    pub server_identity: String,
    #[serde(default = "default_eap_state_ttl_secs")]
    pub eap_state_ttl_secs: u64,
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,
    #[serde(default = "default_sync_jitter_secs")]
    pub sync_jitter_secs: u64,
    #[serde(default)]
    pub hostname: Option<String>,
    /// Seed records for the in-memory storage backend.
    #[serde(default)]
    pub users: Vec<User>,
}

impl Config {
    /// Loads and validates the file at `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.display().to_string(), e))?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reports the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::InvalidError(msg));

        if self.listeners.is_empty() {
            return invalid("at least one listener is required".to_owned());
        }
        for (i, listener) in self.listeners.iter().enumerate() {
            if listener.addr.parse::<SocketAddr>().is_err() {
                return invalid(format!("listeners[{}].addr `{}` is not ip:port", i, listener.addr));
            }
            if listener.secret.is_empty() {
                return invalid(format!("listeners[{}].secret is empty", i));
            }
            if listener.cidr.is_empty() {
                return invalid(format!("listeners[{}].cidr is empty", i));
            }
            for cidr in &listener.cidr {
                if let Err(e) = cidr.parse::<IpNetwork>() {
                    return invalid(format!("listeners[{}].cidr `{}`: {}", i, cidr, e));
                }
            }
        }

        if self.server_identity.is_empty() {
            return invalid("server_identity is empty".to_owned());
        }
        if self.eap_state_ttl_secs == 0 {
            return invalid("eap_state_ttl_secs must be positive".to_owned());
        }
        if self.sync_interval_secs == 0 {
            return invalid("sync_interval_secs must be positive".to_owned());
        }

        let mut names = HashSet::new();
        for user in &self.users {
            if !names.insert(user.name.as_str()) {
                return invalid(format!("user `{}` is defined twice", user.name));
            }
        }
        Ok(())
    }

    /// Name stamped on accounting rows: `hostname`, then `$HOSTNAME`, then `localhost`.
    pub fn hostname(&self) -> String {
        self.hostname
            .clone()
            .or_else(|| env::var("HOSTNAME").ok())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "localhost".to_owned())
    }

    pub fn eap_state_ttl(&self) -> Duration {
        Duration::from_secs(self.eap_state_ttl_secs)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn sync_jitter(&self) -> Duration {
        Duration::from_secs(self.sync_jitter_secs)
    }
}
