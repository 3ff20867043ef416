//! Shunt: a single-port protocol demultiplexer.
//!
//! Shunt accepts TCP connections on one port, inspects the first bytes each
//! client sends, identifies the application-layer protocol (SSH, TLS with
//! SNI/ALPN matching, HTTP, OpenVPN, XMPP, SOCKS5, ADB, tinc, or custom
//! regex rules), and forwards the connection to the backend configured for
//! that protocol. The buffered opening bytes are replayed to the backend
//! verbatim, so backends see exactly what the client sent.
//!
//! The probing core is usable on its own: build a
//! [`ProbeChain`](probe::arbiter::ProbeChain) from configuration and call
//! `probe_buffer` with whatever bytes you have. Each probe returns one of
//! three outcomes (identified, ruled out, or needs more bytes) and the
//! chain combines them deterministically in configuration order.

pub mod config;
pub mod constants;
pub mod error;
pub mod probe;
pub mod server;
pub mod utils;

pub use crate::config::{FromPath, ShuntConfig};
pub use crate::error::{Result, ShuntError};
pub use crate::probe::arbiter::ProbeChain;
pub use crate::probe::{ProbeOutcome, ProtocolEntry};
pub use crate::server::ShuntServer;
