//! Protocol entry configuration and probe binding.

use regex::bytes::Regex;
use serde::Deserialize;

use crate::error::{ConfigError, Result};
use crate::probe::tls::TlsPolicy;
use crate::probe::{resolve_probe, ProbeData, ProtocolEntry};

/// One `[[protocols]]` entry: a protocol name, its backend, and per-probe
/// configuration. Declaration order in the file is probe order.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ProtocolSpec {
    /// Protocol name; must resolve in the probe registry (a built-in name,
    /// `regex`, or `timeout`)
    pub name: String,
    /// Backend host to forward matching connections to
    pub host: String,
    /// Backend port
    pub port: u16,
    /// Do not invoke the probe until this many bytes are buffered
    #[serde(default)]
    pub min_length: Option<usize>,
    /// TLS entries only: acceptable SNI hostnames (`*.` wildcard matches
    /// exactly one left-most label). Empty = no SNI constraint.
    #[serde(default)]
    pub sni_hostnames: Vec<String>,
    /// TLS entries only: acceptable ALPN protocols, compared exactly.
    /// Empty = no ALPN constraint.
    #[serde(default)]
    pub alpn_protocols: Vec<String>,
    /// Regex entries only: patterns tried in order against the buffer.
    #[serde(default)]
    pub regex_patterns: Vec<String>,
}

impl ProtocolSpec {
    /// Resolves the probe and compiles per-probe data into a bound entry.
    pub fn bind(&self) -> Result<ProtocolEntry> {
        let probe = resolve_probe(&self.name).ok_or_else(|| ConfigError::UnknownProbe {
            name: self.name.clone(),
        })?;

        if let Some(0) = self.min_length {
            return Err(ConfigError::InvalidValue {
                field: format!("protocols.{}.min_length", self.name),
                reason: "must be a positive integer".to_string(),
            }
            .into());
        }

        let data = if self.name == "regex" {
            let patterns = self
                .regex_patterns
                .iter()
                .map(|pattern| {
                    Regex::new(pattern).map_err(|e| ConfigError::InvalidRegex {
                        protocol: self.name.clone(),
                        message: e.to_string(),
                    })
                })
                .collect::<std::result::Result<Vec<_>, _>>()?;
            ProbeData::Regex(patterns)
        } else if self.name == "tls"
            && (!self.sni_hostnames.is_empty() || !self.alpn_protocols.is_empty())
        {
            ProbeData::Tls(TlsPolicy {
                sni_allow: self.sni_hostnames.clone(),
                alpn_allow: self.alpn_protocols.clone(),
            })
        } else {
            ProbeData::None
        };

        Ok(ProtocolEntry {
            name: self.name.clone(),
            host: self.host.clone(),
            port: self.port,
            probe: Some(probe),
            min_length: self.min_length,
            data,
        })
    }
}
