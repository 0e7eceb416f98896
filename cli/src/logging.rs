//! Logging configuration for the ticktock binary.
//!
//! Logs go to stdout. Set `DEBUG_LOGGING=1` to enable debug output for the
//! ticktock crates (registrations, rearms, stale entry discards).

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Initialize stdout logging.
///
/// # Behavior
/// - INFO+ by default
/// - DEBUG+ for ticktock crates when `DEBUG_LOGGING` is set
/// - `RUST_LOG`, when present, replaces both
pub fn init() {
    let debug_logging = std::env::var("DEBUG_LOGGING").is_ok();

    let stdout_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(true)
        .with_thread_names(true)
        .with_span_events(FmtSpan::NONE);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(debug_logging)));

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(filter)
        .init();

    tracing::debug!(debug_logging, "ticktock logging initialized");
}

fn filter_directive(debug_logging: bool) -> &'static str {
    if debug_logging {
        "info,ticktock=debug,ticktock_core=debug,ticktock_cli=debug"
    } else {
        "info"
    }
}
