//! Sink for unexpected errors.

/// Receives errors the host swallows so they can still be reported.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, context: &str, error: &dyn std::error::Error);
}

/// Reports errors through `tracing` at error level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, context: &str, error: &dyn std::error::Error) {
        tracing::error!(context, error = %error, "Plugin host error");
    }
}
