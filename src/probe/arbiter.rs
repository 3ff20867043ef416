//! Probe arbitration: running the configured chain over a buffer.
//!
//! The chain is an immutable value built once at configuration load and
//! shared read-only by every connection. Entries are evaluated in the exact
//! order the configuration lists them; the first match wins and no later
//! probe can shadow an earlier one.

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, trace};

use crate::constants::PROBE_READ_CHUNK;
use crate::error::{ConfigError, Result};
use crate::probe::{ProbeOutcome, ProtocolEntry, CATCH_ALL};

/// The ordered probe chain plus the timeout fallback selection.
#[derive(Debug, Clone)]
pub struct ProbeChain {
    entries: Vec<ProtocolEntry>,
    on_timeout: Option<String>,
}

impl ProbeChain {
    /// Builds a chain from bound entries.
    ///
    /// The chain must be non-empty and a catch-all entry may only appear in
    /// last position; both are configuration errors, not runtime states.
    pub fn new(entries: Vec<ProtocolEntry>, on_timeout: Option<String>) -> Result<Self> {
        if entries.is_empty() {
            return Err(ConfigError::NoProtocols.into());
        }
        if let Some(entry) = entries[..entries.len() - 1]
            .iter()
            .find(|e| e.name == CATCH_ALL)
        {
            return Err(ConfigError::CatchAllNotLast {
                name: entry.name.clone(),
            }
            .into());
        }
        Ok(Self {
            entries,
            on_timeout,
        })
    }

    /// The configured entries, in declaration order.
    pub fn entries(&self) -> &[ProtocolEntry] {
        &self.entries
    }

    /// The exhaustion fallback: the last configured entry.
    pub fn last(&self) -> &ProtocolEntry {
        // `new` rejects empty chains
        &self.entries[self.entries.len() - 1]
    }

    /// The entry selected when the client sends nothing within the timeout
    /// window: the entry named by `on_timeout`, or the first entry.
    pub fn timeout_protocol(&self) -> &ProtocolEntry {
        self.on_timeout
            .as_deref()
            .and_then(|name| self.entries.iter().find(|e| e.name == name))
            .unwrap_or(&self.entries[0])
    }

    /// Runs the chain against the accumulated buffer.
    ///
    /// Returns `(Match, Some(entry))` as soon as a probe identifies its
    /// protocol, `(Again, None)` when no probe matched but at least one
    /// needs more bytes, and `(Match, Some(last))` when every probe ruled
    /// itself out, making the last entry the residual fallback.
    pub fn probe_buffer(&self, buf: &[u8]) -> (ProbeOutcome, Option<&ProtocolEntry>) {
        let mut any_again = false;
        let last_index = self.entries.len() - 1;

        for (i, entry) in self.entries.iter().enumerate() {
            let Some(probe) = entry.probe else {
                continue;
            };

            // The trailing catch-all is never probed; it is the residual
            // fallback once the chain is exhausted.
            if i == last_index && entry.name == CATCH_ALL {
                break;
            }

            if let Some(min) = entry.min_length {
                if buf.len() < min {
                    trace!(
                        protocol = %entry.name,
                        have = buf.len(),
                        need = min,
                        "buffer below min_length"
                    );
                    any_again = true;
                    continue;
                }
            }

            let outcome = probe(buf, entry);
            trace!(protocol = %entry.name, ?outcome, len = buf.len(), "probed");
            match outcome {
                ProbeOutcome::Match => return (ProbeOutcome::Match, Some(entry)),
                ProbeOutcome::Again => any_again = true,
                ProbeOutcome::Next => {}
            }
        }

        if any_again {
            (ProbeOutcome::Again, None)
        } else {
            (ProbeOutcome::Match, Some(self.last()))
        }
    }

    /// Performs one read from the client and one arbitration pass over the
    /// cumulative buffer.
    ///
    /// Bytes read are appended to `deferred`, which the caller replays
    /// verbatim to the backend on match. An empty read or a read error
    /// selects the last configured entry so the caller can still open a
    /// backend; the backend then observes the same failure.
    pub async fn probe_connection<R>(
        &self,
        client: &mut R,
        deferred: &mut Vec<u8>,
    ) -> (ProbeOutcome, Option<&ProtocolEntry>)
    where
        R: AsyncRead + Unpin,
    {
        let mut chunk = [0u8; PROBE_READ_CHUNK];
        match client.read(&mut chunk).await {
            Ok(n) if n > 0 => {
                deferred.extend_from_slice(&chunk[..n]);
                self.probe_buffer(deferred)
            }
            Ok(_) => {
                debug!("client closed before a match, taking last entry");
                (ProbeOutcome::Match, Some(self.last()))
            }
            Err(e) => {
                debug!("read failed before a match ({e}), taking last entry");
                (ProbeOutcome::Match, Some(self.last()))
            }
        }
    }
}
