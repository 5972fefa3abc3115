//! Metric helpers for the transfer engine.
//!
//! All helpers record through the `metrics` facade. Without an installed
//! recorder they are no-ops, so they are safe to call from tests.

use metrics::{counter, gauge, histogram};

// ============================================================================
// Cache Metrics
// ============================================================================

/// Record a cache lookup.
///
/// # Arguments
///
/// * `cache` - Cache name (e.g., "balances", "records")
/// * `hit` - Whether the lookup found a fresh entry
pub fn record_cache_lookup(cache: &str, hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!(
        "cache_lookups_total",
        "cache" => cache.to_string(),
        "result" => result
    )
    .increment(1);
}

/// Record an LRU eviction.
pub fn record_cache_eviction(cache: &str) {
    counter!("cache_evictions_total", "cache" => cache.to_string()).increment(1);
}

/// Record expired entries removed from a cache.
pub fn record_cache_expirations(cache: &str, count: u64) {
    counter!("cache_expirations_total", "cache" => cache.to_string()).increment(count);
}

/// Update the cache population gauge.
pub fn update_cache_size(cache: &str, size: usize) {
    gauge!("cache_entries", "cache" => cache.to_string()).set(size as f64);
}

// ============================================================================
// Circuit Breaker Metrics
// ============================================================================

/// Circuit breaker state values for the gauge.
pub mod circuit_breaker_state {
    /// Circuit is closed (healthy).
    pub const CLOSED: f64 = 0.0;
    /// Circuit is open (failing).
    pub const OPEN: f64 = 1.0;
    /// Circuit is half-open (probing).
    pub const HALF_OPEN: f64 = 2.0;
}

/// Update circuit breaker state gauge.
///
/// # Arguments
///
/// * `service` - Dependency name (e.g., "ledger", "record_store")
/// * `state` - Numeric state (0=closed, 1=open, 2=`half_open`)
pub fn record_circuit_breaker_state(service: &str, state: f64) {
    gauge!(
        "circuit_breaker_state",
        "service" => service.to_string()
    )
    .set(state);
}

/// Record a circuit breaker failure.
pub fn record_circuit_breaker_failure(service: &str) {
    counter!(
        "circuit_breaker_failures_total",
        "service" => service.to_string()
    )
    .increment(1);
}

/// Record a circuit breaker rejection (call rejected due to open circuit).
pub fn record_circuit_breaker_rejected(service: &str) {
    counter!(
        "circuit_breaker_rejected_total",
        "service" => service.to_string()
    )
    .increment(1);
}

// ============================================================================
// Retry and Runner Metrics
// ============================================================================

/// Record a retry scheduled after a transient failure.
///
/// # Arguments
///
/// * `attempt` - Zero-based attempt that failed
/// * `delay_seconds` - Backoff before the next attempt
pub fn record_retry_attempt(attempt: u32, delay_seconds: f64) {
    counter!("retry_attempts_total").increment(1);
    histogram!("retry_backoff_seconds", "attempt" => attempt.to_string()).record(delay_seconds);
}

/// Record retries exhausted.
pub fn record_retry_exhausted() {
    counter!("retry_exhausted_total").increment(1);
}

/// Update the in-flight operation gauge for a runner.
pub fn update_runner_in_flight(runner: &str, count: usize) {
    gauge!("runner_in_flight", "runner" => runner.to_string()).set(count as f64);
}

// ============================================================================
// Batch and Command Metrics
// ============================================================================

/// Record one dispatched batch group.
///
/// # Arguments
///
/// * `kind` - Item kind the group was dispatched for
/// * `items` - Number of items in the group
/// * `success` - Whether the handler accepted the group
pub fn record_batch_group(kind: &str, items: usize, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "batch_groups_total",
        "kind" => kind.to_string(),
        "status" => status
    )
    .increment(1);
    histogram!("batch_group_size", "kind" => kind.to_string()).record(items as f64);
}

/// Record a command reaching a terminal state.
///
/// # Arguments
///
/// * `state` - Terminal state (e.g., "EXECUTED", "ROLLED_BACK")
pub fn record_command_terminal(state: &str) {
    counter!("command_terminal_total", "state" => state.to_string()).increment(1);
}

/// Record a compensation failure that needs manual reconciliation.
pub fn record_compensation_failure() {
    counter!("compensation_failures_total").increment(1);
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circuit_breaker_state_constants() {
        assert!((circuit_breaker_state::CLOSED - 0.0).abs() < f64::EPSILON);
        assert!((circuit_breaker_state::OPEN - 1.0).abs() < f64::EPSILON);
        assert!((circuit_breaker_state::HALF_OPEN - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        // Actual metric recording requires an installed recorder
        record_cache_lookup("balances", true);
        record_cache_eviction("balances");
        record_cache_expirations("balances", 3);
        update_cache_size("balances", 10);
        record_circuit_breaker_state("ledger", circuit_breaker_state::OPEN);
        record_circuit_breaker_failure("ledger");
        record_circuit_breaker_rejected("ledger");
        record_retry_attempt(0, 0.1);
        record_retry_exhausted();
        update_runner_in_flight("transfers", 2);
        record_batch_group("log_event", 5, true);
        record_command_terminal("ROLLED_BACK");
        record_compensation_failure();
    }
}
