//! Protocol recognition over the first bytes of a connection.
//!
//! Each probe classifies a byte slice as one specific protocol, returning a
//! three-valued [`ProbeOutcome`]. Probes are pure functions of the slice and
//! the entry's configuration: they never block, never perform I/O, and never
//! index past the end of the slice. When a decision would require a byte the
//! slice does not have yet, a probe returns [`ProbeOutcome::Again`] and the
//! caller reads more.
//!
//! The byte-level signatures recognized here are load-bearing: clients in
//! the wild depend on these exact heuristics, so the contracts must not be
//! loosened or tightened.

pub mod arbiter;
pub mod tls;

use memchr::memmem;
use regex::bytes::Regex;

use crate::constants::MAX_SCAN_PREFIX;
use crate::probe::tls::TlsPolicy;

/// Name of the catch-all entry. When configured it must be last; the
/// arbiter never invokes it as a probe and instead selects it when the
/// chain is exhausted.
pub const CATCH_ALL: &str = "anyprot";

/// Result of probing a byte slice for one protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The probe positively identifies its protocol.
    Match,
    /// The probe rules itself out on the available bytes.
    Next,
    /// Inconclusive; more bytes are needed before this probe can decide.
    Again,
}

/// A probe function: classifies a byte slice for one protocol entry.
pub type ProbeFn = fn(&[u8], &ProtocolEntry) -> ProbeOutcome;

/// Per-probe configuration attached to a protocol entry.
#[derive(Debug, Clone, Default)]
pub enum ProbeData {
    /// No per-probe configuration.
    #[default]
    None,
    /// SNI/ALPN allow-lists for a TLS entry.
    Tls(TlsPolicy),
    /// Compiled patterns for a regex entry, tried in order.
    Regex(Vec<Regex>),
}

/// A configured protocol bound to its probe and backend.
#[derive(Debug, Clone)]
pub struct ProtocolEntry {
    /// Protocol name, unique within a configuration.
    pub name: String,
    /// Backend host to forward matching connections to.
    pub host: String,
    /// Backend port.
    pub port: u16,
    /// The bound probe. Entries without a probe are skipped by the arbiter.
    pub probe: Option<ProbeFn>,
    /// If set, the probe is not invoked until the buffer reaches this
    /// length; a shorter buffer contributes an implicit `Again`.
    pub min_length: Option<usize>,
    /// Per-probe configuration.
    pub data: ProbeData,
}

impl ProtocolEntry {
    /// The `host:port` string external code connects to on a match.
    pub fn backend_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Built-in probes, keyed by the protocol name used in configuration files.
pub const BUILTIN_PROBES: &[(&str, ProbeFn)] = &[
    ("ssh", is_ssh),
    ("openvpn", is_openvpn),
    ("tinc", is_tinc),
    ("xmpp", is_xmpp),
    ("http", is_http),
    ("tls", tls::is_tls),
    ("adb", is_adb),
    ("socks5", is_socks5),
    (CATCH_ALL, match_any),
];

/// Resolves a configured protocol name to its probe.
///
/// `regex` and `timeout` are reserved names resolved here rather than in
/// [`BUILTIN_PROBES`]: `regex` is only legal with configured patterns, and
/// `timeout` lets a configuration route the idle-timeout fallback to a
/// dedicated backend entry.
pub fn resolve_probe(name: &str) -> Option<ProbeFn> {
    if let Some((_, probe)) = BUILTIN_PROBES.iter().find(|(n, _)| *n == name) {
        return Some(*probe);
    }
    match name {
        "regex" => Some(probe_regex),
        "timeout" => Some(match_any),
        _ => None,
    }
}

/// SSH banner: the connection opens with the ASCII `SSH-`.
fn is_ssh(buf: &[u8], _entry: &ProtocolEntry) -> ProbeOutcome {
    if buf.len() < 4 {
        return ProbeOutcome::Again;
    }
    if &buf[..4] == b"SSH-" {
        ProbeOutcome::Match
    } else {
        ProbeOutcome::Next
    }
}

/// OpenVPN over TCP: the first packet is length-prefixed, so the declared
/// big-endian length must equal the rest of the buffer exactly. If the
/// kernel coalesces two packets into one read this rules OpenVPN out; the
/// exact check is what deployed clients rely on.
fn is_openvpn(buf: &[u8], _entry: &ProtocolEntry) -> ProbeOutcome {
    if buf.len() < 2 {
        return ProbeOutcome::Again;
    }
    let declared = u16::from_be_bytes([buf[0], buf[1]]) as usize;
    if declared == buf.len() - 2 {
        ProbeOutcome::Match
    } else {
        ProbeOutcome::Next
    }
}

/// tinc 1.0: the first connection starts with `0 ` (ID request).
fn is_tinc(buf: &[u8], _entry: &ProtocolEntry) -> ProbeOutcome {
    if buf.len() < 2 {
        return ProbeOutcome::Again;
    }
    if &buf[..2] == b"0 " {
        ProbeOutcome::Match
    } else {
        ProbeOutcome::Next
    }
}

/// XMPP: lazy clients are recognized by `jabber` anywhere in the opening
/// stream element. The word sometimes shows up late in the preamble, so
/// short buffers wait for more before ruling XMPP out.
fn is_xmpp(buf: &[u8], _entry: &ProtocolEntry) -> ProbeOutcome {
    let scan = &buf[..buf.len().min(MAX_SCAN_PREFIX)];
    if memmem::find(scan, b"jabber").is_some() {
        return ProbeOutcome::Match;
    }
    if buf.len() < 50 {
        ProbeOutcome::Again
    } else {
        ProbeOutcome::Next
    }
}

/// HTTP request methods, RFC 2616 5.1.1. Matching is case-sensitive.
const HTTP_METHODS: &[&[u8]] = &[
    b"OPTIONS", b"GET", b"HEAD", b"POST", b"PUT", b"DELETE", b"TRACE", b"CONNECT",
];

/// HTTP: either `HTTP` appears in the request line (HTTP/1.x), or the
/// buffer starts with a request method (HTTP/1.0 without version).
fn is_http(buf: &[u8], _entry: &ProtocolEntry) -> ProbeOutcome {
    let scan = &buf[..buf.len().min(MAX_SCAN_PREFIX)];
    if memmem::find(scan, b"HTTP").is_some() {
        return ProbeOutcome::Match;
    }
    for method in HTTP_METHODS {
        if buf.len() < method.len() {
            return ProbeOutcome::Again;
        }
        if buf.starts_with(method) {
            return ProbeOutcome::Match;
        }
    }
    ProbeOutcome::Next
}

/// ADB message header (24 bytes) plus the `host:` payload tag.
const ADB_CNXN_PACKET_LEN: usize = 30;

/// Empty message some ADB client builds send before CNXN: an all-zero
/// header whose magic field is four 0xFF bytes.
const ADB_EMPTY_MESSAGE: [u8; 24] = [
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0xff, 0xff, 0xff,
];

/// The initial ADB host->device packet has a command type of CNXN and a
/// data payload starting with `host:`. Callers guarantee at least
/// [`ADB_CNXN_PACKET_LEN`] bytes.
fn adb_cnxn_message(buf: &[u8]) -> bool {
    &buf[..4] == b"CNXN" && &buf[24..29] == b"host:"
}

/// ADB: a CNXN message at offset 0, or one preceded by the empty message
/// that ADB v26.0.0 builds emit first.
fn is_adb(buf: &[u8], _entry: &ProtocolEntry) -> ProbeOutcome {
    if buf.len() < ADB_CNXN_PACKET_LEN {
        return ProbeOutcome::Again;
    }
    if adb_cnxn_message(buf) {
        return ProbeOutcome::Match;
    }

    if buf.len() < ADB_CNXN_PACKET_LEN + ADB_EMPTY_MESSAGE.len() {
        return ProbeOutcome::Again;
    }
    if buf[..ADB_EMPTY_MESSAGE.len()] != ADB_EMPTY_MESSAGE {
        return ProbeOutcome::Next;
    }
    if adb_cnxn_message(&buf[ADB_EMPTY_MESSAGE.len()..]) {
        ProbeOutcome::Match
    } else {
        ProbeOutcome::Next
    }
}

/// SOCKS5 method-selection message: version 5, then 1..=10 advertised
/// authentication methods, each in the IANA-assigned range 0..=9.
fn is_socks5(buf: &[u8], _entry: &ProtocolEntry) -> ProbeOutcome {
    if buf.len() < 2 {
        return ProbeOutcome::Again;
    }
    if buf[0] != 5 {
        return ProbeOutcome::Next;
    }
    let methods = buf[1] as usize;
    if !(1..=10).contains(&methods) {
        return ProbeOutcome::Next;
    }
    if buf.len() < 2 + methods {
        return ProbeOutcome::Again;
    }
    if buf[2..2 + methods].iter().all(|&m| m <= 9) {
        ProbeOutcome::Match
    } else {
        ProbeOutcome::Next
    }
}

/// Unconditional match. Bound to the catch-all entry and to `timeout`
/// pseudo-protocol entries; the arbiter never runs it inside the chain.
fn match_any(_buf: &[u8], _entry: &ProtocolEntry) -> ProbeOutcome {
    ProbeOutcome::Match
}

/// Regex probe: tries the entry's compiled patterns in order. Matching a
/// slice of exactly the buffered length keeps the engine region-bounded.
/// Patterns are expected to tolerate partial input (or the entry's
/// `min_length` handles it), so this probe never returns `Again`.
fn probe_regex(buf: &[u8], entry: &ProtocolEntry) -> ProbeOutcome {
    let ProbeData::Regex(patterns) = &entry.data else {
        // The configuration binder always attaches compiled patterns to a
        // regex entry; reaching this arm is an internal error.
        unreachable!("regex probe invoked without compiled patterns");
    };
    if patterns.iter().any(|re| re.is_match(buf)) {
        ProbeOutcome::Match
    } else {
        ProbeOutcome::Next
    }
}
