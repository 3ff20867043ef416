//! TLS ClientHello parsing and allow-list policy for the TLS probe.
//!
//! Parses just enough of the record layer and ClientHello to extract the
//! SNI server name and the ALPN protocol list, then evaluates the entry's
//! configured allow-lists. The parser maps cleanly onto the three probe
//! outcomes: structurally impossible bytes rule TLS out, truncated but
//! plausible input asks for more bytes, and a well-formed handshake that
//! passes policy is a match.

use bytes::Buf;
use std::io::Cursor;
use thiserror::Error;

use crate::constants::{TLS_MAX_RECORD_LEN, TLS_RECORD_HEADER_LEN};
use crate::probe::{ProbeData, ProbeOutcome, ProtocolEntry};

const CONTENT_TYPE_HANDSHAKE: u8 = 0x16;
const HANDSHAKE_TYPE_CLIENT_HELLO: u8 = 0x01;
const EXT_SERVER_NAME: u16 = 0x0000;
const EXT_ALPN: u16 = 0x0010;
const SNI_TYPE_HOST_NAME: u8 = 0x00;

#[derive(Debug, Error)]
pub enum TlsParseError {
    #[error("Not a TLS handshake record")]
    NotHandshake,
    #[error("Unsupported record-layer version")]
    BadVersion,
    #[error("Implausible record length")]
    BadRecordLength,
    #[error("Record is not a ClientHello")]
    NotClientHello,
}

/// Fields extracted from a ClientHello.
#[derive(Debug, Clone, Default)]
pub struct ClientHello {
    /// First host_name entry of the server_name extension, if present.
    pub server_name: Option<String>,
    /// All ALPN protocol names, in client preference order.
    pub alpn: Vec<String>,
}

/// SNI and ALPN allow-lists configured on a TLS protocol entry.
///
/// An empty list places no constraint. When both lists are non-empty, both
/// must be satisfied for the entry to match.
#[derive(Debug, Clone, Default)]
pub struct TlsPolicy {
    /// Acceptable server names. Case-insensitive; a left-most `*` label
    /// matches exactly one label (`*.example.com` matches `a.example.com`
    /// but neither `example.com` nor `a.b.example.com`).
    pub sni_allow: Vec<String>,
    /// Acceptable ALPN protocol names, compared case-sensitively.
    pub alpn_allow: Vec<String>,
}

impl TlsPolicy {
    /// Whether this policy places any constraint at all.
    pub fn is_empty(&self) -> bool {
        self.sni_allow.is_empty() && self.alpn_allow.is_empty()
    }

    /// Evaluates the parsed hello against the allow-lists.
    pub fn accepts(&self, hello: &ClientHello) -> bool {
        if !self.sni_allow.is_empty() {
            let Some(name) = &hello.server_name else {
                return false;
            };
            if !self.sni_allow.iter().any(|pat| sni_matches(pat, name)) {
                return false;
            }
        }
        if !self.alpn_allow.is_empty()
            && !hello
                .alpn
                .iter()
                .any(|proto| self.alpn_allow.iter().any(|allow| allow == proto))
        {
            return false;
        }
        true
    }
}

/// Case-insensitive hostname match with single-label wildcard support.
fn sni_matches(pattern: &str, name: &str) -> bool {
    let pattern = pattern.to_ascii_lowercase();
    let name = name.to_ascii_lowercase();
    if let Some(suffix) = pattern.strip_prefix("*.") {
        match name.split_once('.') {
            Some((label, rest)) => !label.is_empty() && rest == suffix,
            None => false,
        }
    } else {
        pattern == name
    }
}

/// TLS probe: delegates to the ClientHello parser, then applies the entry's
/// allow-lists. A well-formed hello rejected by policy yields `Next` so a
/// later TLS-like entry may still match.
pub(crate) fn is_tls(buf: &[u8], entry: &ProtocolEntry) -> ProbeOutcome {
    match parse_client_hello(buf) {
        Ok(Some(hello)) => match &entry.data {
            ProbeData::Tls(policy) if !policy.accepts(&hello) => ProbeOutcome::Next,
            _ => ProbeOutcome::Match,
        },
        Ok(None) => ProbeOutcome::Again,
        Err(_) => ProbeOutcome::Next,
    }
}

/// Parses the beginning of a TLS stream up to the ClientHello extensions.
///
/// Returns `Ok(Some(hello))` on a complete, well-formed ClientHello,
/// `Ok(None)` when the input is truncated but still plausible, and `Err`
/// when the bytes cannot be a ClientHello at all.
pub fn parse_client_hello(buf: &[u8]) -> Result<Option<ClientHello>, TlsParseError> {
    let mut cursor = Cursor::new(buf);

    // Record header: type (1), version (2), length (2)
    if cursor.remaining() < TLS_RECORD_HEADER_LEN {
        return Ok(None);
    }
    let content_type = cursor.get_u8();
    if content_type != CONTENT_TYPE_HANDSHAKE {
        return Err(TlsParseError::NotHandshake);
    }
    let version_major = cursor.get_u8();
    let version_minor = cursor.get_u8();
    if version_major != 3 || version_minor > 4 {
        return Err(TlsParseError::BadVersion);
    }
    let record_len = cursor.get_u16() as usize;
    if record_len > TLS_MAX_RECORD_LEN {
        return Err(TlsParseError::BadRecordLength);
    }
    if cursor.remaining() < record_len {
        return Ok(None);
    }

    // Walk the handshake message within the record body only.
    let record = &buf[TLS_RECORD_HEADER_LEN..TLS_RECORD_HEADER_LEN + record_len];
    let mut hs = Cursor::new(record);

    // Handshake header: type (1), length (3)
    if hs.remaining() < 4 {
        return Ok(None);
    }
    if hs.get_u8() != HANDSHAKE_TYPE_CLIENT_HELLO {
        return Err(TlsParseError::NotClientHello);
    }
    hs.advance(3);

    // client_version (2) + random (32)
    if hs.remaining() < 34 {
        return Ok(None);
    }
    hs.advance(34);

    // session_id
    if hs.remaining() < 1 {
        return Ok(None);
    }
    let session_id_len = hs.get_u8() as usize;
    if hs.remaining() < session_id_len {
        return Ok(None);
    }
    hs.advance(session_id_len);

    // cipher_suites
    if hs.remaining() < 2 {
        return Ok(None);
    }
    let cipher_suites_len = hs.get_u16() as usize;
    if hs.remaining() < cipher_suites_len {
        return Ok(None);
    }
    hs.advance(cipher_suites_len);

    // compression_methods
    if hs.remaining() < 1 {
        return Ok(None);
    }
    let compression_len = hs.get_u8() as usize;
    if hs.remaining() < compression_len {
        return Ok(None);
    }
    hs.advance(compression_len);

    // Extensions are absent in minimal TLS 1.0 hellos; that is still a
    // complete ClientHello with nothing to extract.
    if hs.remaining() < 2 {
        return Ok(Some(ClientHello::default()));
    }
    let extensions_len = hs.get_u16() as usize;
    if hs.remaining() < extensions_len {
        return Ok(None);
    }
    let ext_start = hs.position() as usize;
    parse_extensions(&record[ext_start..ext_start + extensions_len])
}

/// Iterates the extension block, collecting the SNI host name and the ALPN
/// protocol list.
fn parse_extensions(block: &[u8]) -> Result<Option<ClientHello>, TlsParseError> {
    let mut hello = ClientHello::default();
    let mut cursor = Cursor::new(block);

    while cursor.remaining() >= 4 {
        let ext_type = cursor.get_u16();
        let ext_len = cursor.get_u16() as usize;
        if cursor.remaining() < ext_len {
            return Ok(None);
        }
        let start = cursor.position() as usize;
        let payload = &block[start..start + ext_len];

        match ext_type {
            EXT_SERVER_NAME => {
                if hello.server_name.is_none() {
                    hello.server_name = parse_server_name(payload);
                }
            }
            EXT_ALPN => {
                hello.alpn = parse_alpn(payload);
            }
            _ => {}
        }
        cursor.advance(ext_len);
    }

    Ok(Some(hello))
}

/// server_name extension payload: a 2-byte list length, then entries of
/// 1-byte name type + 2-byte name length + name. Only the first host_name
/// entry is taken.
fn parse_server_name(payload: &[u8]) -> Option<String> {
    let mut cursor = Cursor::new(payload);
    if cursor.remaining() < 2 {
        return None;
    }
    let list_len = cursor.get_u16() as usize;
    let list_len = list_len.min(cursor.remaining());
    let end = cursor.position() as usize + list_len;

    while (cursor.position() as usize) + 3 <= end {
        let name_type = cursor.get_u8();
        let name_len = cursor.get_u16() as usize;
        if cursor.remaining() < name_len {
            return None;
        }
        if name_type == SNI_TYPE_HOST_NAME {
            let start = cursor.position() as usize;
            return String::from_utf8(payload[start..start + name_len].to_vec()).ok();
        }
        cursor.advance(name_len);
    }
    None
}

/// ALPN extension payload: a 2-byte list length, then entries of 1-byte
/// protocol length + protocol name.
fn parse_alpn(payload: &[u8]) -> Vec<String> {
    let mut protocols = Vec::new();
    let mut cursor = Cursor::new(payload);
    if cursor.remaining() < 2 {
        return protocols;
    }
    let list_len = cursor.get_u16() as usize;
    let list_len = list_len.min(cursor.remaining());
    let end = cursor.position() as usize + list_len;

    while (cursor.position() as usize) < end {
        let proto_len = cursor.get_u8() as usize;
        if cursor.remaining() < proto_len {
            break;
        }
        let start = cursor.position() as usize;
        if let Ok(proto) = String::from_utf8(payload[start..start + proto_len].to_vec()) {
            protocols.push(proto);
        }
        cursor.advance(proto_len);
    }
    protocols
}
