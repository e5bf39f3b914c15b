//! Tracing subscriber setup
//!
//! The library only emits `tracing` events; installing a subscriber is left
//! to the binary (or to tests). `RUST_LOG` takes precedence over the level
//! passed in, so `RUST_LOG=mirrorup=trace` works as usual.

use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::EnvFilter;

/// Timestamp layout used in log lines
pub const TIMESTAMP_FORMAT: &str = "%d.%m.%Y %H:%M:%S";

/// Install a stderr fmt subscriber with `default_level` as fallback filter
///
/// Calling it twice is harmless; the second call leaves the first
/// subscriber in place.
pub fn init_tracing(default_level: tracing::Level) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_string().to_lowercase()));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(ChronoLocal::new(TIMESTAMP_FORMAT.to_string()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
