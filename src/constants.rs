//! Probe and buffer constants for the shunt demultiplexer.
//!
//! These constants bound how much of a client's opening bytes the probe
//! pipeline will buffer and inspect before falling back.

/// Read chunk size for each pass over the client socket during probing.
pub const PROBE_READ_CHUNK: usize = 1024;

/// Maximum number of client bytes buffered while probing. Once exceeded,
/// arbitration stops and the exhaustion fallback is taken.
pub const MAX_PROBE_BUFFER: usize = 16384;

/// Maximum prefix length scanned by substring probes (XMPP, HTTP). Bounds
/// the work done on adversarial inputs.
pub const MAX_SCAN_PREFIX: usize = 1024;

/// Maximum plausible TLS record length for a ClientHello. A declared record
/// length above this is structurally impossible and rules TLS out.
pub const TLS_MAX_RECORD_LEN: usize = 16384;

/// TLS record header size: type (1) + version (2) + length (2).
pub const TLS_RECORD_HEADER_LEN: usize = 5;
