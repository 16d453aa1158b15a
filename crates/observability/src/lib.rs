//! Tracing and logging (shared setup).

/// Initialize process-wide observability (tracing/logging).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Initialize human-readable logging captured by the test harness.
pub fn init_test() {
    tracing::init_test();
}

/// Tracing configuration (filters, layers).
pub mod tracing;
