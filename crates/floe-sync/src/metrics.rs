//! Observability metrics for warehouse synchronization.
//!
//! ## Metrics Exported
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `floe_sync_commands_total` | Counter | `kind`, `result` | Executed commands by outcome |
//! | `floe_sync_command_duration_seconds` | Histogram | `kind`, `result` | Command execution time, retries included |
//! | `floe_sync_retries_total` | Counter | `operation` | Retried remote calls |
//! | `floe_sync_events_skipped_total` | Counter | `reason` | Notifications filtered out |
//! | `floe_sync_commands_discarded_total` | Counter | - | Pending commands dropped on cancel |
//! | `floe_sync_pending_commands` | Gauge | - | Commands queued but not started |
//! | `floe_sync_in_flight_commands` | Gauge | - | Commands currently executing |
//!
//! No recorder is installed by the library; binaries choose an exporter.

use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};

/// Metric names as constants for consistency.
pub mod names {
    /// Counter: Executed commands by outcome.
    pub const COMMANDS_TOTAL: &str = "floe_sync_commands_total";
    /// Histogram: Command execution duration in seconds.
    pub const COMMAND_DURATION_SECONDS: &str = "floe_sync_command_duration_seconds";
    /// Counter: Retried remote calls.
    pub const RETRIES_TOTAL: &str = "floe_sync_retries_total";
    /// Counter: Notifications skipped by the event filter.
    pub const EVENTS_SKIPPED_TOTAL: &str = "floe_sync_events_skipped_total";
    /// Counter: Pending commands discarded by cancellation.
    pub const COMMANDS_DISCARDED_TOTAL: &str = "floe_sync_commands_discarded_total";
    /// Gauge: Commands queued but not yet started.
    pub const PENDING_COMMANDS: &str = "floe_sync_pending_commands";
    /// Gauge: Commands currently executing.
    pub const IN_FLIGHT_COMMANDS: &str = "floe_sync_in_flight_commands";
}

/// Label keys used across metrics.
pub mod labels {
    /// Command kind (`create_table`, `refresh_table`, `drop_table`).
    pub const KIND: &str = "kind";
    /// Outcome (`success`, `failure`, `panic`).
    pub const RESULT: &str = "result";
    /// Remote operation being retried.
    pub const OPERATION: &str = "operation";
    /// Skip reason.
    pub const REASON: &str = "reason";
}

/// High-level interface for recording sync metrics.
///
/// Cheap to clone and share across drain tasks.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncMetrics;

impl SyncMetrics {
    /// Creates a new metrics recorder.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Records the outcome of one command execution.
    pub fn record_command(&self, kind: &str, result: &str, duration: Duration) {
        counter!(
            names::COMMANDS_TOTAL,
            labels::KIND => kind.to_string(),
            labels::RESULT => result.to_string(),
        )
        .increment(1);
        histogram!(
            names::COMMAND_DURATION_SECONDS,
            labels::KIND => kind.to_string(),
            labels::RESULT => result.to_string(),
        )
        .record(duration.as_secs_f64());
    }

    /// Records a retried remote call.
    pub fn record_retry(&self, operation: &str) {
        counter!(
            names::RETRIES_TOTAL,
            labels::OPERATION => operation.to_string(),
        )
        .increment(1);
    }

    /// Records a notification skipped by the filter.
    pub fn record_skip(&self, reason: &str) {
        counter!(
            names::EVENTS_SKIPPED_TOTAL,
            labels::REASON => reason.to_string(),
        )
        .increment(1);
    }

    /// Records commands discarded without running.
    pub fn record_discarded(&self, count: usize) {
        counter!(names::COMMANDS_DISCARDED_TOTAL).increment(count as u64);
    }

    /// Sets the pending command gauge.
    #[allow(clippy::cast_precision_loss)] // Gauge values are typically small
    pub fn set_pending(&self, count: usize) {
        gauge!(names::PENDING_COMMANDS).set(count as f64);
    }

    /// Sets the in-flight command gauge.
    #[allow(clippy::cast_precision_loss)] // Gauge values are typically small
    pub fn set_in_flight(&self, count: usize) {
        gauge!(names::IN_FLIGHT_COMMANDS).set(count as f64);
    }
}

/// RAII guard for timing operations.
///
/// Calls `on_drop` with the elapsed duration when dropped, including when
/// the owning future is dropped before it completes.
pub struct TimingGuard<F>
where
    F: FnOnce(Duration),
{
    start: Instant,
    on_drop: Option<F>,
}

impl<F> TimingGuard<F>
where
    F: FnOnce(Duration),
{
    /// Creates a new timing guard that will call `on_drop` with the elapsed duration.
    pub fn new(on_drop: F) -> Self {
        Self {
            start: Instant::now(),
            on_drop: Some(on_drop),
        }
    }

    /// Returns the elapsed time since the guard was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl<F> Drop for TimingGuard<F>
where
    F: FnOnce(Duration),
{
    fn drop(&mut self) {
        if let Some(f) = self.on_drop.take() {
            f(self.start.elapsed());
        }
    }
}
