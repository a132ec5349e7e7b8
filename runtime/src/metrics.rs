//! Prometheus metrics for observability and monitoring.
//!
//! Metrics are recorded through the `metrics` facade everywhere in the
//! workspace. Nothing is exported until a [`MetricsServer`] installs the
//! Prometheus recorder:
//! - Store reductions and effect execution
//! - Push connection lifecycle and reconnects
//! - Dropped push messages
//! - Mutation outcomes
//!
//! # Example
//!
//! ```rust,no_run
//! use workshop_sync_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Metrics available at http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics recorder
    #[error("Failed to install metrics recorder: {0}")]
    Install(String),
}

/// Prometheus metrics server.
///
/// Exposes metrics on an HTTP endpoint for Prometheus scraping.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address to bind to (e.g., `0.0.0.0:9090`)
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Install the recorder and spawn the HTTP exporter.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or the recorder cannot be
    /// installed.
    ///
    /// # Note
    ///
    /// If a metrics recorder is already installed (e.g., in tests), this logs a
    /// warning and succeeds without a handle.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let (recorder, exporter) = PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?
            .build()
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        let handle = recorder.handle();
        match metrics::set_global_recorder(recorder) {
            Ok(()) => {
                self.handle = Some(handle);
                tokio::spawn(async move {
                    if exporter.await.is_err() {
                        tracing::error!("Metrics exporter stopped");
                    }
                });
                tracing::info!(
                    addr = %self.addr,
                    "Metrics server started - available at http://{}/metrics",
                    self.addr
                );
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if server hasn't been started.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    describe_counter!("store.commands.total", "Actions reduced by the store");
    describe_counter!(
        "store.effects.executed",
        "Effects executed by the store, labelled by type"
    );
    describe_histogram!(
        "store.reducer.duration_seconds",
        "Time spent inside the reducer"
    );
    describe_counter!(
        "store.shutdown.rejected_actions",
        "Actions rejected because the store was shutting down"
    );
    describe_counter!("push.connections.opened", "Push connections established");
    describe_counter!(
        "push.reconnect.scheduled",
        "Reconnect attempts scheduled after an unexpected closure"
    );
    describe_counter!(
        "push.messages.dropped",
        "Push messages dropped as malformed"
    );
    describe_counter!(
        "sync.mutations.completed",
        "Server mutations answered, labelled by outcome"
    );
}

/// Push channel metrics recorder.
pub struct PushMetrics;

impl PushMetrics {
    /// Record an established connection.
    pub fn record_opened() {
        counter!("push.connections.opened").increment(1);
    }

    /// Record a scheduled reconnect.
    pub fn record_reconnect_scheduled() {
        counter!("push.reconnect.scheduled").increment(1);
    }

    /// Record a dropped message.
    pub fn record_dropped() {
        counter!("push.messages.dropped").increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_has_no_handle_before_start() {
        let server = MetricsServer::new(SocketAddr::from(([127, 0, 0, 1], 0)));
        assert!(server.handle().is_none());
        assert!(server.render().is_none());
    }

    #[tokio::test]
    async fn started_server_renders_recorded_metrics() {
        let mut server = MetricsServer::new(SocketAddr::from(([127, 0, 0, 1], 0)));
        assert!(server.start().is_ok());
        PushMetrics::record_opened();
        if let Some(rendered) = server.render() {
            assert!(rendered.contains("push_connections_opened"));
        }
    }

    #[test]
    fn recording_without_a_recorder_is_a_no_op() {
        PushMetrics::record_opened();
        PushMetrics::record_reconnect_scheduled();
        PushMetrics::record_dropped();
    }
}
