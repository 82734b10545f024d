//! Process-wide tracing setup shared by binaries and tests.

/// Initialize tracing with the default filter (`info`, overridable via `RUST_LOG`).
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    tracing::init(tracing::DEFAULT_FILTER);
}

/// Subscriber configuration (filters, JSON formatting).
pub mod tracing;
