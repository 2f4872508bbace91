//! Logging setup emitting JSON lines through `tracing`.
//!
//! The core only emits events; installing a subscriber is left to the host,
//! which calls [`init`] once at start-up.

use tracing_subscriber::EnvFilter;

use crate::common::config::AppCfg;

/// Install the global JSON subscriber.
///
/// `RUST_LOG` wins over the configured filter when set. Calling this more
/// than once is harmless: later calls leave the first subscriber in place.
pub fn init(cfg: &AppCfg) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.log_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let installed = tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_current_span(false)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(filter = %cfg.log_filter, "logging initialised");
    }
}

/// Milliseconds elapsed since `start`, for `duration_ms` log fields.
pub fn elapsed_ms(start: std::time::Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
