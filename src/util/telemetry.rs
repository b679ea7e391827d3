//! Telemetry helpers for structured logging and tracing.

/// Initialize tracing. Embedders can install their own subscriber; this
/// helper installs a default env-filtered fmt subscriber if none is set.
pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("apply_dispatch=info")),
        )
        .with_target(true)
        .try_init();
}
