//! Tracing subscriber setup for binaries and tests that embed the client.
//!
//! The library itself only emits `tracing` events; installing a subscriber
//! is left to the application. `RUST_LOG` takes precedence over the filter
//! passed in.

use tracing_subscriber::EnvFilter;

/// Install a formatted stderr subscriber.
///
/// Calling this more than once (or after another subscriber was installed)
/// is a no-op.
pub fn init_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        init_logging("engine_client=debug");
        init_logging("warn");
        tracing::debug!("still alive");
    }
}
