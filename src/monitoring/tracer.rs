/*!
 * Structured Tracing
 * Subscriber setup and the spans arenas and pools log under
 *
 * The core never installs a subscriber itself. Each arena and chunk pool
 * carries a `tracing::Span` handed to it at construction and emits its
 * events with that span as parent, so a service can attribute allocator
 * activity to the connection or subsystem that owns it.
 */

use tracing::{debug_span, info, Span};
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// Environment variable enabling JSON output
pub const ENV_TRACE_JSON: &str = "NETMEM_TRACE_JSON";

/// Install a global subscriber for binaries and tests
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
/// - NETMEM_TRACE_JSON: Enable JSON output (default: false)
///
/// Returns false if a global subscriber was already installed.
pub fn init_tracing() -> bool {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = std::env::var(ENV_TRACE_JSON)
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if use_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .try_init()
            .is_ok()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true)
                    .with_file(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()
            .is_ok()
    };

    if installed {
        info!(json = use_json, "Structured tracing initialized");
    }
    installed
}

/// Default span for an arena with the given block capacity
pub fn arena_span(capacity: usize) -> Span {
    debug_span!("arena", capacity = capacity)
}

/// Default span for a chunk pool with the given chunk size
pub fn pool_span(chunk_size: usize) -> Span {
    debug_span!("chunk_pool", chunk_size = chunk_size)
}
