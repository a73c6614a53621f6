//! Metrics collection and export for roomcast.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format. Relay-level counters live in `roomcast-core`
//! and are copied into the recorder by [`spawn_sampler`].

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use roomcast_core::{AdminInspector, RelayStats};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::info;

/// How often relay counters are copied into the recorder.
pub const SAMPLE_INTERVAL: Duration = Duration::from_secs(5);

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "roomcast_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "roomcast_connections_active";
    pub const MESSAGES_TOTAL: &str = "roomcast_messages_total";
    pub const MESSAGES_BYTES: &str = "roomcast_messages_bytes";
    pub const ROOMS_CREATED_TOTAL: &str = "roomcast_rooms_created_total";
    pub const ROOMS_ACTIVE: &str = "roomcast_rooms_active";
    pub const MEMBERS_ACTIVE: &str = "roomcast_members_active";
    pub const SESSION_SECONDS: &str = "roomcast_session_seconds";
    pub const ERRORS_TOTAL: &str = "roomcast_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of room connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of open room connections"
    );
    metrics::describe_counter!(names::MESSAGES_TOTAL, "Messages posted and delivered");
    metrics::describe_counter!(names::MESSAGES_BYTES, "Payload bytes delivered");
    metrics::describe_counter!(names::ROOMS_CREATED_TOTAL, "Rooms created since start");
    metrics::describe_gauge!(names::ROOMS_ACTIVE, "Current number of live rooms");
    metrics::describe_gauge!(names::MEMBERS_ACTIVE, "Members across all live rooms");
    metrics::describe_histogram!(
        names::SESSION_SECONDS,
        "Time a connection spent in its room, in seconds"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a new connection.
pub fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
}

/// Record a disconnection.
pub fn record_disconnection(session: Duration) {
    gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(names::SESSION_SECONDS).record(session.as_secs_f64());
}

/// Record an error.
pub fn record_error(error_type: &str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type.to_string()).increment(1);
}

/// Copy a stats snapshot into the recorder.
pub fn record_stats(stats: &RelayStats) {
    let counters = &stats.counters;

    gauge!(names::ROOMS_ACTIVE).set(stats.rooms as f64);
    gauge!(names::MEMBERS_ACTIVE).set(stats.members as f64);
    counter!(names::ROOMS_CREATED_TOTAL).absolute(counters.rooms_created);

    counter!(names::MESSAGES_TOTAL, "direction" => "inbound").absolute(counters.messages_posted);
    counter!(names::MESSAGES_TOTAL, "direction" => "outbound")
        .absolute(counters.messages_delivered);
    counter!(names::MESSAGES_TOTAL, "direction" => "dropped").absolute(counters.messages_dropped);
    counter!(names::MESSAGES_BYTES, "direction" => "outbound").absolute(counters.bytes_delivered);

    counter!(names::ERRORS_TOTAL, "type" => "delivery").absolute(counters.delivery_failures);
}

/// Periodically sample relay statistics into the recorder.
pub fn spawn_sampler(inspector: AdminInspector, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            record_stats(&inspector.stats());
        }
    })
}

/// Metrics guard that records disconnection on drop.
pub struct ConnectionMetricsGuard {
    opened_at: Instant,
}

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        record_connection();
        Self {
            opened_at: Instant::now(),
        }
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        record_disconnection(self.opened_at.elapsed());
    }
}
