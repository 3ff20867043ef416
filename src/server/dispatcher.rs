//! Per-connection dispatch: probe the opening bytes, then forward.
//!
//! Each accepted connection runs the accumulation loop here: read a chunk,
//! arbitrate over the cumulative buffer, and either forward on a match,
//! read again, or take a fallback. The buffered bytes are replayed to the
//! backend before any live traffic so the backend observes exactly the
//! byte sequence the client sent.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::constants::{MAX_PROBE_BUFFER, PROBE_READ_CHUNK};
use crate::error::{Result, ShuntError};
use crate::probe::arbiter::ProbeChain;
use crate::probe::{ProbeOutcome, ProtocolEntry};

/// Probes an accepted connection and forwards it to the selected backend.
pub async fn dispatch(chain: &ProbeChain, mut stream: TcpStream, probe_timeout: Duration) -> Result<()> {
    if let Err(e) = stream.set_nodelay(true) {
        warn!("Failed to set TCP_NODELAY on incoming connection: {}", e);
    }

    let mut deferred = Vec::with_capacity(PROBE_READ_CHUNK);

    let selected = loop {
        if deferred.len() >= MAX_PROBE_BUFFER {
            debug!(
                buffered = deferred.len(),
                "probe buffer cap reached with no match, taking last entry"
            );
            break chain.last();
        }

        match timeout(
            probe_timeout,
            chain.probe_connection(&mut stream, &mut deferred),
        )
        .await
        {
            Ok((ProbeOutcome::Match, Some(entry))) => break entry,
            Ok(_) => {
                debug!(buffered = deferred.len(), "probes inconclusive, reading more");
                continue;
            }
            Err(_) => {
                let entry = chain.timeout_protocol();
                debug!(protocol = %entry.name, "probe timeout, taking timeout entry");
                break entry;
            }
        }
    };

    info!(
        protocol = %selected.name,
        backend = %selected.backend_address(),
        buffered = deferred.len(),
        "connection dispatched"
    );

    let client = ReplayStream::new(deferred, stream);
    proxy_connection(client, selected).await
}

/// Connects to the entry's backend and splices both directions until both
/// sides close, propagating half-closes. The replay prefix reaches the
/// backend first.
pub async fn proxy_connection(
    mut client: ReplayStream<TcpStream>,
    entry: &ProtocolEntry,
) -> Result<()> {
    let address = entry.backend_address();
    let mut backend = TcpStream::connect(&address).await.map_err(|e| {
        warn!("Failed to connect to backend {}: {}", address, e);
        ShuntError::connection_failed(address.clone())
    })?;
    let _ = backend.set_nodelay(true);

    match tokio::io::copy_bidirectional(&mut client, &mut backend).await {
        Ok((sent, received)) => {
            debug!(sent, received, "connection closed");
            Ok(())
        }
        Err(e) => {
            debug!("connection ended with error: {}", e);
            Ok(())
        }
    }
}

/// A stream that yields a replay prefix before reading from the underlying
/// stream. Writes go straight through.
pub struct ReplayStream<S> {
    prefix: Vec<u8>,
    offset: usize,
    stream: S,
}

impl<S> ReplayStream<S> {
    pub fn new(prefix: Vec<u8>, stream: S) -> Self {
        Self {
            prefix,
            offset: 0,
            stream,
        }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for ReplayStream<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        if self.offset < self.prefix.len() {
            let available = &self.prefix[self.offset..];
            let to_read = available.len().min(buf.remaining());
            buf.put_slice(&available[..to_read]);
            self.offset += to_read;
            return Poll::Ready(Ok(()));
        }

        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for ReplayStream<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.stream).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.stream).poll_shutdown(cx)
    }
}
