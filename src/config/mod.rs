//! Configuration types for the shunt demultiplexer.
//!
//! Configuration is loaded with Figment from a TOML file merged with
//! prefixed environment variables. The ordered `[[protocols]]` array is the
//! heart of the file: its order is the probe order, and its last entry is
//! the fallback taken when nothing matches.

mod defaults;
mod protocol;

pub use protocol::ProtocolSpec;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::net::IpAddr;
use std::path::Path;

use crate::error::{ConfigError, Result};
use crate::probe::arbiter::ProbeChain;

use defaults::*;

/// Top-level configuration for the multiplexer.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ShuntConfig {
    /// Listener configuration
    #[serde(default)]
    pub listen: ListenConfig,
    /// Seconds to wait for the first client bytes before taking the
    /// timeout fallback (default = 2)
    #[serde(default = "default_timeout_s")]
    pub timeout_s: u64,
    /// Name of the protocol entry to select on timeout. Falls back to the
    /// first entry when unset or unresolved.
    #[serde(default)]
    pub on_timeout: Option<String>,
    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,
    /// Ordered protocol list; probe order follows declaration order
    pub protocols: Vec<ProtocolSpec>,
}

/// Address and port the multiplexer listens on.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ListenConfig {
    /// The address to bind to (default = 0.0.0.0)
    #[serde(default = "default_bind_address")]
    pub address: IpAddr,
    /// The port to bind to (default = 443)
    #[serde(default = "default_bind_port")]
    pub port: u16,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            address: default_bind_address(),
            port: default_bind_port(),
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct LogConfig {
    /// Log level filter (default = info). Probe decisions are logged at
    /// debug and per-probe detail at trace.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub trait ConfigInit<T: DeserializeOwned> {
    /// Initializes the configuration object from the given Figment
    fn init(figment: Figment, _env_prefix: &str) -> Result<T> {
        Ok(figment.extract()?)
    }
}

pub trait FromPath<T: DeserializeOwned + ConfigInit<T>> {
    /// Creates a configuration object from the given path and ENV prefix
    fn from_path(path: &Path, env_prefix: &str) -> Result<T> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }
            .into());
        }

        let figment = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed(env_prefix).split("__"));

        T::init(figment, env_prefix)
    }
}

impl ConfigInit<ShuntConfig> for ShuntConfig {}
impl FromPath<ShuntConfig> for ShuntConfig {}

impl ShuntConfig {
    /// Binds every configured protocol to its probe and builds the
    /// immutable probe chain shared by all connections.
    ///
    /// All configuration errors surface here, at load time: unknown probe
    /// names, invalid regexes, a catch-all entry that is not last, an empty
    /// protocol list, or a zero `min_length`.
    pub fn build_chain(&self) -> Result<ProbeChain> {
        if self.protocols.is_empty() {
            return Err(ConfigError::NoProtocols.into());
        }
        let entries = self
            .protocols
            .iter()
            .map(|spec| spec.bind())
            .collect::<Result<Vec<_>>>()?;
        ProbeChain::new(entries, self.on_timeout.clone())
    }
}
