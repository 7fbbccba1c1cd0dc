// Logging initialization for binaries and tests
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Initialize tracing with `RUST_LOG` or an `info` default.
pub fn init() {
    init_with_default("info");
}

/// Initialize tracing with an explicit default filter. Safe to call more
/// than once; later calls are no-ops.
pub fn init_with_default(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
