//! Logging setup
//!
//! Library code only emits `tracing` events under `scriptblock::*` targets.
//! Binaries and tests call `init_logging` to get a subscriber.

pub use tracing::{debug, error, info, trace, warn, Level};

/// Environment variable checked before `RUST_LOG`
pub const LOG_ENV: &str = "SCRIPTBLOCK_LOG";

/// Install a compact fmt subscriber.
///
/// The filter comes from `SCRIPTBLOCK_LOG`, then `RUST_LOG`, then a build
/// default (`debug` in debug builds, `info` otherwise). Calling this more
/// than once is harmless.
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_directive()));
    install(filter);
}

/// Install a subscriber with an explicit filter directive, ignoring the environment
pub fn init_logging_with(directive: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new(default_directive()));
    install(filter);
}

fn install(filter: tracing_subscriber::EnvFilter) {
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .try_init()
        .ok(); // already initialized
}

fn default_directive() -> &'static str {
    #[cfg(debug_assertions)]
    {
        "scriptblock=debug"
    }
    #[cfg(not(debug_assertions))]
    {
        "scriptblock=info"
    }
}
