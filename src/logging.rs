//! Diagnostic tracing for builds.
//!
//! Stage boundaries, per-file decisions (ignored files, permalinks, pruned
//! collection entries) and build summaries are emitted as `tracing` events.
//! They go to stderr and never mix with the command output printed by
//! [`crate::output`].

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter for a `-v` count: `warn`, `info`, then `debug`.
fn default_level(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins when set; otherwise the level follows `verbosity`.
///
/// # Example
/// ```bash
/// RUST_LOG=pressroom::permalinks=debug pressroom build
/// ```
pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level(verbosity)));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
