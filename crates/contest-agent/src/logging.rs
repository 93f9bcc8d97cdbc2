//! Tracing setup shared by both binaries.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install a stderr subscriber with compact output.
///
/// `RUST_LOG` wins when set; otherwise `default_level` (e.g. `"info"`)
/// applies. Calling this twice is harmless: the second call is ignored.
///
/// ```bash
/// RUST_LOG=contest_agent=debug cargo run -p contest-agent -- --contest-id c1 --participant-id p1
/// ```
pub fn init(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}
