pub use tracing::{debug, error, info, warn, trace, instrument};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt::{self, format::FmtSpan}};

/// Filter used when `RUST_LOG` is not set.
const DEFAULT_DIRECTIVE: &str = "info";

pub fn init() {
    init_with_default(DEFAULT_DIRECTIVE);
}

/// Installs the global subscriber, falling back to `directive` when `RUST_LOG` is unset.
///
/// Span close events (with their busy/idle timings) are only emitted for debug or trace
/// filters, which is how per-pass merge timings become visible.
pub fn init_with_default(directive: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directive));

    let filter_text = env_filter.to_string();
    let verbose = filter_text.contains("debug") || filter_text.contains("trace");

    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_timer(fmt::time::uptime())
        .with_span_events(if verbose {
            FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        });

    // Embedding applications and test binaries may already own the global subscriber.
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();
}
