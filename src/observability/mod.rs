//! Observability module providing logging and metrics.

use crate::types::RateLimit;
use reqwest::header::HeaderMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, trace, warn};

/// Metrics collector for TargetProcess API operations.
#[derive(Debug, Default)]
pub struct Metrics {
    /// Total requests sent.
    requests_total: AtomicU64,
    /// Requests that produced a success status.
    requests_success: AtomicU64,
    /// Requests that failed, for any reason but cancellation.
    requests_failed: AtomicU64,
    /// Requests cancelled by the caller.
    requests_cancelled: AtomicU64,
    /// Requests rejected for an exhausted quota.
    requests_rate_limited: AtomicU64,
    /// Bodies decoded by wrapping a lone object into a list.
    single_objects_wrapped: AtomicU64,
    /// Pagination runs stopped on a repeated page URI.
    pagination_loops: AtomicU64,
    /// Total request latency in microseconds.
    latency_total_us: AtomicU64,
    /// Request count for latency calculation.
    latency_count: AtomicU64,
}

impl Metrics {
    /// Creates a new metrics collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a request.
    pub fn record_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a successful request.
    pub fn record_success(&self) {
        self.requests_success.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a failed request.
    pub fn record_failure(&self) {
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a cancelled request.
    pub fn record_cancelled(&self) {
        self.requests_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a rate-limited request.
    pub fn record_rate_limited(&self) {
        self.requests_rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a lone object decoded as a one-element list.
    pub fn record_single_object_wrapped(&self) {
        self.single_objects_wrapped.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a pagination loop.
    pub fn record_pagination_loop(&self) {
        self.pagination_loops.fetch_add(1, Ordering::Relaxed);
    }

    /// Records request latency.
    pub fn record_latency(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.latency_total_us.fetch_add(us, Ordering::Relaxed);
        self.latency_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Gets the total request count.
    pub fn total_requests(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    /// Gets the successful request count.
    pub fn successful_requests(&self) -> u64 {
        self.requests_success.load(Ordering::Relaxed)
    }

    /// Gets the failed request count.
    pub fn failed_requests(&self) -> u64 {
        self.requests_failed.load(Ordering::Relaxed)
    }

    /// Gets the cancelled request count.
    pub fn cancelled_requests(&self) -> u64 {
        self.requests_cancelled.load(Ordering::Relaxed)
    }

    /// Gets the rate-limited request count.
    pub fn rate_limited_requests(&self) -> u64 {
        self.requests_rate_limited.load(Ordering::Relaxed)
    }

    /// Gets the count of wrapped single-object bodies.
    pub fn single_objects_wrapped(&self) -> u64 {
        self.single_objects_wrapped.load(Ordering::Relaxed)
    }

    /// Gets the pagination loop count.
    pub fn pagination_loops(&self) -> u64 {
        self.pagination_loops.load(Ordering::Relaxed)
    }

    /// Gets the average latency in microseconds.
    pub fn average_latency_us(&self) -> u64 {
        let total = self.latency_total_us.load(Ordering::Relaxed);
        let count = self.latency_count.load(Ordering::Relaxed);
        if count == 0 {
            0
        } else {
            total / count
        }
    }

    /// Gets a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_total: self.total_requests(),
            requests_success: self.successful_requests(),
            requests_failed: self.failed_requests(),
            requests_cancelled: self.cancelled_requests(),
            requests_rate_limited: self.rate_limited_requests(),
            single_objects_wrapped: self.single_objects_wrapped(),
            pagination_loops: self.pagination_loops(),
            average_latency_us: self.average_latency_us(),
        }
    }

    /// Resets all metrics.
    pub fn reset(&self) {
        self.requests_total.store(0, Ordering::Relaxed);
        self.requests_success.store(0, Ordering::Relaxed);
        self.requests_failed.store(0, Ordering::Relaxed);
        self.requests_cancelled.store(0, Ordering::Relaxed);
        self.requests_rate_limited.store(0, Ordering::Relaxed);
        self.single_objects_wrapped.store(0, Ordering::Relaxed);
        self.pagination_loops.store(0, Ordering::Relaxed);
        self.latency_total_us.store(0, Ordering::Relaxed);
        self.latency_count.store(0, Ordering::Relaxed);
    }
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Total requests.
    pub requests_total: u64,
    /// Successful requests.
    pub requests_success: u64,
    /// Failed requests.
    pub requests_failed: u64,
    /// Cancelled requests.
    pub requests_cancelled: u64,
    /// Rate-limited requests.
    pub requests_rate_limited: u64,
    /// Wrapped single-object bodies.
    pub single_objects_wrapped: u64,
    /// Pagination loops.
    pub pagination_loops: u64,
    /// Average latency in microseconds.
    pub average_latency_us: u64,
}

/// Request timer for measuring latency.
pub struct RequestTimer {
    start: Instant,
    metrics: Arc<Metrics>,
}

impl RequestTimer {
    /// Creates a new request timer.
    pub fn new(metrics: Arc<Metrics>) -> Self {
        metrics.record_request();
        Self {
            start: Instant::now(),
            metrics,
        }
    }

    /// Records success and latency.
    pub fn success(self) {
        self.metrics.record_success();
        self.metrics.record_latency(self.start.elapsed());
    }

    /// Records failure and latency.
    pub fn failure(self) {
        self.metrics.record_failure();
        self.metrics.record_latency(self.start.elapsed());
    }

    /// Gets elapsed time without recording.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Tracing hooks for TargetProcess API operations.
pub struct TracingHooks;

impl TracingHooks {
    /// Logs the start of an API request.
    #[instrument(skip(method, url))]
    pub fn on_request_start(method: &str, url: &str) {
        debug!(
            method = %method,
            url = %url,
            "TargetProcess API request started"
        );
    }

    /// Logs the outgoing headers, redacted.
    pub fn on_request_headers(headers: &HeaderMap) {
        for (name, value) in headers.iter() {
            let value = value.to_str().unwrap_or("<binary>");
            trace!(
                header = %name,
                value = %redact_header(name.as_str(), value),
                "Request header"
            );
        }
    }

    /// Logs the completion of an API request.
    #[instrument(skip(method, url, status, duration))]
    pub fn on_request_complete(method: &str, url: &str, status: u16, duration: Duration) {
        info!(
            method = %method,
            url = %url,
            status = status,
            duration_ms = duration.as_millis() as u64,
            "TargetProcess API request completed"
        );
    }

    /// Logs a request error.
    #[instrument(skip(method, url, error))]
    pub fn on_request_error(method: &str, url: &str, error: &str) {
        error!(
            method = %method,
            url = %url,
            error = %error,
            "TargetProcess API request failed"
        );
    }

    /// Logs a cancelled request.
    pub fn on_request_cancelled(method: &str, url: &str) {
        info!(
            method = %method,
            url = %url,
            "TargetProcess API request cancelled"
        );
    }

    /// Logs rate limit info.
    #[instrument(skip(rate_limit))]
    pub fn on_rate_limit_update(rate_limit: &RateLimit) {
        debug!(
            limit = rate_limit.limit,
            remaining = rate_limit.remaining,
            reset_at = %rate_limit.reset,
            "Rate limit updated"
        );
    }

    /// Logs rate limit exceeded.
    #[instrument(skip(rate_limit))]
    pub fn on_rate_limit_exceeded(rate_limit: &RateLimit) {
        warn!(
            limit = rate_limit.limit,
            remaining = rate_limit.remaining,
            reset_at = %rate_limit.reset,
            "Rate limit exceeded"
        );
    }

    /// Logs a lone JSON object decoded as a one-element list.
    pub fn on_single_object_wrapped(url: &str, type_name: &str) {
        warn!(
            url = %url,
            expected = %type_name,
            "Expected a JSON array but received a single object; wrapped it into a one-element list"
        );
    }

    /// Logs a pagination run that revisited a page.
    pub fn on_pagination_loop(url: &str, pages: usize) {
        error!(
            url = %url,
            pages = pages,
            "Pagination returned a next link that was already visited"
        );
    }
}

/// Sensitive headers that should be redacted in logs.
pub const SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "proxy-authorization",
    "cookie",
    "set-cookie",
    "x-access-token",
];

/// Redacts sensitive values in headers.
pub fn redact_header(name: &str, value: &str) -> String {
    if SENSITIVE_HEADERS.contains(&name.to_lowercase().as_str()) {
        "[REDACTED]".to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics() {
        let metrics = Metrics::new();

        metrics.record_request();
        metrics.record_success();
        metrics.record_latency(Duration::from_millis(100));

        assert_eq!(metrics.total_requests(), 1);
        assert_eq!(metrics.successful_requests(), 1);
        assert_eq!(metrics.failed_requests(), 0);
        assert!(metrics.average_latency_us() >= 100_000);
    }

    #[test]
    fn test_metrics_snapshot_and_reset() {
        let metrics = Metrics::new();

        metrics.record_request();
        metrics.record_request();
        metrics.record_success();
        metrics.record_cancelled();
        metrics.record_single_object_wrapped();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests_total, 2);
        assert_eq!(snapshot.requests_success, 1);
        assert_eq!(snapshot.requests_cancelled, 1);
        assert_eq!(snapshot.single_objects_wrapped, 1);

        metrics.reset();
        assert_eq!(metrics.total_requests(), 0);
        assert_eq!(metrics.single_objects_wrapped(), 0);
    }

    #[test]
    fn test_request_timer() {
        let metrics = Arc::new(Metrics::new());

        RequestTimer::new(metrics.clone()).failure();
        RequestTimer::new(metrics.clone()).success();

        assert_eq!(metrics.total_requests(), 2);
        assert_eq!(metrics.failed_requests(), 1);
        assert_eq!(metrics.successful_requests(), 1);
    }

    #[test]
    fn test_redact_header() {
        assert_eq!(redact_header("Authorization", "Bearer token"), "[REDACTED]");
        assert_eq!(redact_header("Content-Type", "application/json"), "application/json");
    }
}
