//! Process-wide log setup.
//!
//! Library code only emits `tracing` events; binaries (and anything else that
//! wants to see them) call [`init_logging`] once at startup.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install a stderr `fmt` subscriber filtered at `level`.
///
/// `RUST_LOG`, when set, takes precedence over `level`. Safe to call more than
/// once: only the first call installs a subscriber, later calls return
/// `false` and change nothing.
pub fn init_logging(level: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .is_ok()
}
