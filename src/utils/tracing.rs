//! Tracing subscriber setup.

use tracing::Subscriber;
use tracing_subscriber::{fmt, EnvFilter};

/// Builds the fmt subscriber for the given level filter. The filter accepts
/// anything `EnvFilter` understands (`info`, `shunt=debug`, ...); an
/// unparsable filter falls back to `info`.
pub fn log_subscriber(level: &str) -> impl Subscriber + Send + Sync {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).finish()
}
