use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

/// Install the global subscriber. Verbosity comes from `RUST_LOG` and
/// defaults to `info`.
pub fn tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_span_events(FmtSpan::CLOSE)
        .init();
}
