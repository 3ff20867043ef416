//! Default value functions for serde deserialization.

use std::net::IpAddr;

pub fn default_log_level() -> String {
    "info".to_string()
}

pub fn default_bind_address() -> IpAddr {
    "0.0.0.0".parse().expect("Default address is valid")
}

pub fn default_bind_port() -> u16 {
    443 // Most demultiplexed stacks hide behind the HTTPS port
}

pub fn default_timeout_s() -> u64 {
    2
}
