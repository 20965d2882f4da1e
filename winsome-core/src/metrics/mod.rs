//! Metrics for observability
//!
//! Recorded through the `metrics` facade. No recorder is installed here; an
//! embedding binary may install any exporter it likes, and without one every
//! call is a no-op.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::time::Instant;

pub const CONNECTIONS_ACCEPTED: &str = "server.connections.accepted";
pub const CONNECTIONS_ACTIVE: &str = "server.connections.active";
pub const REQUESTS_TOTAL: &str = "server.requests.total";
pub const REQUESTS_FAILED: &str = "server.requests.failed";
pub const REQUEST_DURATION: &str = "server.request.duration_ms";
pub const PROTOCOL_ERRORS: &str = "server.protocol_errors";
pub const REWARDS_SWEEPS: &str = "rewards.sweeps";
pub const REWARDS_CREDITED: &str = "rewards.credited";
pub const NOTIFY_PUSHES: &str = "notify.pushes";
pub const NOTIFY_FAILURES: &str = "notify.failures";

/// Initialize metrics with descriptions
pub fn init_metrics() {
    describe_counter!(CONNECTIONS_ACCEPTED, "Command connections accepted");
    describe_gauge!(CONNECTIONS_ACTIVE, "Command connections currently open");
    describe_counter!(REQUESTS_TOTAL, "Requests dispatched to the worker pool");
    describe_counter!(REQUESTS_FAILED, "Requests whose worker failed or panicked");
    describe_histogram!(REQUEST_DURATION, "Request execution time in milliseconds");
    describe_counter!(PROTOCOL_ERRORS, "Connections closed for malformed frames");

    describe_counter!(REWARDS_SWEEPS, "Completed rewards sweeps");
    describe_histogram!(REWARDS_CREDITED, "Wincoins credited per ledger entry");

    describe_counter!(NOTIFY_PUSHES, "Follower-list pushes delivered");
    describe_counter!(NOTIFY_FAILURES, "Pushes or datagrams that could not be delivered");
}

/// Record a counter metric
pub fn record_counter(name: &'static str, value: u64) {
    counter!(name).increment(value);
}

/// Record a gauge metric
pub fn record_gauge(name: &'static str, value: f64) {
    gauge!(name).set(value);
}

/// Record a histogram metric
pub fn record_histogram(name: &'static str, value: f64) {
    histogram!(name).record(value);
}

/// Timer for measuring operation duration
pub struct Timer {
    name: &'static str,
    start: Instant,
}

impl Timer {
    pub fn new(name: &'static str) -> Self {
        Self { name, start: Instant::now() }
    }

    /// Stop the timer and record the duration in milliseconds
    pub fn stop(self) {
        histogram!(self.name).record(self.start.elapsed().as_secs_f64() * 1000.0);
    }
}
