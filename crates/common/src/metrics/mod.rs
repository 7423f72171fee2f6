//! Metrics and observability utilities
//!
//! Prometheus metrics with standardized naming conventions.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all DocuGrade metrics
pub const METRICS_PREFIX: &str = "docugrade";

/// Histogram buckets for analysis duration (analysis is slow by design)
pub const ANALYSIS_BUCKETS: &[f64] = &[
    1.0,    // 1s
    5.0,    // 5s
    15.0,   // 15s
    30.0,   // 30s
    60.0,   // 1m
    120.0,  // 2m
    300.0,  // 5m
    600.0,  // 10m
];

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_jobs_created_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of analysis jobs created"
    );

    describe_counter!(
        format!("{}_jobs_completed_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of analysis jobs completed successfully"
    );

    describe_counter!(
        format!("{}_jobs_failed_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of analysis jobs that terminated in failure"
    );

    describe_counter!(
        format!("{}_submissions_created_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of submissions created"
    );

    describe_counter!(
        format!("{}_submission_poll_timeouts_total", METRICS_PREFIX),
        Unit::Count,
        "Submission analyses that exhausted the poll budget"
    );

    describe_histogram!(
        format!("{}_analysis_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end document analysis latency in seconds"
    );

    describe_gauge!(
        format!("{}_worker_backlog", METRICS_PREFIX),
        Unit::Count,
        "Dispatched-but-not-started analysis tasks"
    );
}

/// Record a job creation
pub fn record_job_created() {
    counter!(format!("{}_jobs_created_total", METRICS_PREFIX)).increment(1);
}

/// Record a job completion
pub fn record_job_completed() {
    counter!(format!("{}_jobs_completed_total", METRICS_PREFIX)).increment(1);
}

/// Record a job failure
pub fn record_job_failed() {
    counter!(format!("{}_jobs_failed_total", METRICS_PREFIX)).increment(1);
}

/// Record a submission creation
pub fn record_submission_created() {
    counter!(format!("{}_submissions_created_total", METRICS_PREFIX)).increment(1);
}

/// Record a poll-budget exhaustion
pub fn record_poll_timeout() {
    counter!(format!("{}_submission_poll_timeouts_total", METRICS_PREFIX)).increment(1);
}

/// Timer for analysis duration
pub struct AnalysisTimer {
    start: Instant,
}

impl AnalysisTimer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Record the elapsed duration into the analysis histogram
    pub fn observe(self) {
        histogram!(format!("{}_analysis_duration_seconds", METRICS_PREFIX))
            .record(self.start.elapsed().as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_is_idempotent() {
        register_metrics();
        register_metrics();
    }

    #[test]
    fn test_timer_observe() {
        let timer = AnalysisTimer::start();
        timer.observe();
    }
}
