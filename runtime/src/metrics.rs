//! Prometheus metrics for observability and monitoring.
//!
//! This module provides metric collection for the engine:
//! - Event store appends and concurrency conflicts
//! - Snapshot persistence decisions
//! - Command outcomes
//! - Views rebuild progress
//! - Publication timeouts
//!
//! Recording without an installed recorder is a no-op, so libraries record
//! unconditionally and binaries decide whether to export.
//!
//! # Example
//!
//! ```rust,no_run
//! use eventloom_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! if let Some(text) = server.render() {
//!     println!("{text}");
//! }
//! # Ok(())
//! # }
//! ```

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics exporter.
///
/// Installs the global recorder and renders the Prometheus text format.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address the scrape endpoint is advertised on
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Register metric descriptions and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g., in tests), this logs a
    /// warning and succeeds without a handle.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(addr = %self.addr, "Metrics recorder installed");
                Ok(())
            },
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            },
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this server did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    describe_counter!(
        "eventloom_events_appended_total",
        "Total number of events appended to the event store"
    );
    describe_counter!(
        "eventloom_concurrency_conflicts_total",
        "Total number of appends rejected by the expected-version check"
    );
    describe_histogram!(
        "eventloom_append_duration_seconds",
        "Duration of event store appends in seconds"
    );
    describe_counter!(
        "eventloom_snapshots_saved_total",
        "Total number of snapshots persisted"
    );
    describe_counter!(
        "eventloom_snapshots_skipped_total",
        "Total number of snapshots skipped by the creation policy"
    );
    describe_counter!(
        "eventloom_snapshot_failures_total",
        "Total number of absorbed snapshot load or save failures"
    );
    describe_counter!(
        "eventloom_commands_total",
        "Total number of commands handled, by outcome"
    );
    describe_counter!(
        "eventloom_rebuild_batches_total",
        "Total number of batches republished by the views rebuilder"
    );
    describe_counter!(
        "eventloom_rebuild_events_total",
        "Total number of events republished by the views rebuilder"
    );
    describe_counter!(
        "eventloom_publication_timeouts_total",
        "Total number of completion waits that timed out"
    );
}

/// Event store metrics recorder.
pub struct EventStoreMetrics;

impl EventStoreMetrics {
    /// Record a committed append.
    pub fn record_append(count: usize, duration: Duration) {
        counter!("eventloom_events_appended_total").increment(count as u64);
        histogram!("eventloom_append_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record an append lost to a concurrent writer.
    pub fn record_conflict() {
        counter!("eventloom_concurrency_conflicts_total").increment(1);
    }
}

/// Snapshot metrics recorder.
pub struct SnapshotMetrics;

impl SnapshotMetrics {
    /// Record a persisted snapshot.
    pub fn record_saved() {
        counter!("eventloom_snapshots_saved_total").increment(1);
    }

    /// Record a snapshot skipped by policy.
    pub fn record_skipped() {
        counter!("eventloom_snapshots_skipped_total").increment(1);
    }

    /// Record an absorbed snapshot failure.
    pub fn record_failure() {
        counter!("eventloom_snapshot_failures_total").increment(1);
    }
}

/// Command metrics recorder.
pub struct CommandMetrics;

impl CommandMetrics {
    /// Record a handled command. `outcome` is one of `changed`, `unchanged`,
    /// `rejected`, `conflict` or `failed`.
    pub fn record(outcome: &'static str) {
        counter!("eventloom_commands_total", "outcome" => outcome).increment(1);
    }
}

/// Views rebuild metrics recorder.
pub struct RebuildMetrics;

impl RebuildMetrics {
    /// Record one republished batch.
    pub fn record_batch(events: usize) {
        counter!("eventloom_rebuild_batches_total").increment(1);
        counter!("eventloom_rebuild_events_total").increment(events as u64);
    }
}

/// Completion tracker metrics recorder.
pub struct CompletionMetrics;

impl CompletionMetrics {
    /// Record a wait that timed out.
    pub fn record_timeout() {
        counter!("eventloom_publication_timeouts_total").increment(1);
    }
}
