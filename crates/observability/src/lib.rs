//! Tracing/logging setup shared by CareHub binaries and tests.

/// Initialize process-wide tracing with the default `info` filter.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init("info");
}

/// Test-friendly logging at `debug` (for integration tests).
pub fn init_for_tests() {
    tracing::init_for_tests("debug");
}

/// Tracing configuration (filters, layers).
pub mod tracing;
