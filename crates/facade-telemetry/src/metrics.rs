//! Prometheus metrics for the P2P facade subsystems.
//!
//! All metrics follow the naming convention: `pf_<subsystem>_<metric>`
//!
//! ## Metric Types
//!
//! - **Counter**: Monotonically increasing value (e.g., pubsub_in_total)
//! - **Gauge**: Value that can go up or down (e.g., pubsub_listening)
//!
//! Label cardinality is bounded by the number of peers, topics and
//! protocols a node actually touches.

use lazy_static::lazy_static;
use prometheus::{
    Encoder, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // CONNECTIVITY METRICS (pf-01)
    // =========================================================================

    /// 1 while a peer is counted as connected by the tracker
    pub static ref PEERS_CONNECTED: IntGaugeVec = IntGaugeVec::new(
        Opts::new("pf_peers_connected", "Peers currently counted as connected"),
        &["pid"]
    ).expect("metric creation failed");

    /// Size of the tracker's connected set
    pub static ref PEERS_TRACKED: IntGauge = IntGauge::new(
        "pf_peers_tracked",
        "Number of peers in the connection tracker"
    ).expect("metric creation failed");

    /// Connector dial outcomes
    pub static ref CONNECT_ATTEMPTS: IntCounterVec = IntCounterVec::new(
        Opts::new("pf_connect_attempts_total", "Connection attempts by the backoff connector"),
        &["outcome"]  // outcome: success/failed/timeout
    ).expect("metric creation failed");

    /// Entries dropped because the connect queue was full
    pub static ref CONNECT_QUEUE_DROPPED: IntCounter = IntCounter::new(
        "pf_connect_queue_dropped_total",
        "Peer addresses dropped on a full connect queue"
    ).expect("metric creation failed");

    /// Queue entries the connector chose not to dial
    pub static ref CONNECTOR_SKIPPED: IntCounterVec = IntCounterVec::new(
        Opts::new("pf_connector_skipped_total", "Peer addresses skipped by the connector"),
        &["reason"]  // reason: connected/unreachable/in_flight/backoff/buffer_full
    ).expect("metric creation failed");

    /// Peers reported by discovery services
    pub static ref DISCOVERY_PEERS_FOUND: IntCounterVec = IntCounterVec::new(
        Opts::new("pf_discovery_peers_found_total", "Peer-found notifications"),
        &["outcome"]  // outcome: accepted/rejected
    ).expect("metric creation failed");

    // =========================================================================
    // PUBSUB METRICS (pf-02)
    // =========================================================================

    /// Active delivery pumps per topic
    pub static ref PUBSUB_LISTENING: IntGaugeVec = IntGaugeVec::new(
        Opts::new("pf_pubsub_listening", "Active subscription pumps"),
        &["topic"]
    ).expect("metric creation failed");

    /// Messages read from the engine
    pub static ref PUBSUB_IN: IntCounterVec = IntCounterVec::new(
        Opts::new("pf_pubsub_in_total", "Messages received per topic"),
        &["topic"]
    ).expect("metric creation failed");

    /// Messages dropped on a full delivery buffer
    pub static ref PUBSUB_IN_DROPPED: IntCounterVec = IntCounterVec::new(
        Opts::new("pf_pubsub_in_dropped_total", "Messages dropped on a full delivery buffer"),
        &["topic"]
    ).expect("metric creation failed");

    /// Messages published
    pub static ref PUBSUB_OUT: IntCounterVec = IntCounterVec::new(
        Opts::new("pf_pubsub_out_total", "Messages published per topic"),
        &["topic"]
    ).expect("metric creation failed");

    // =========================================================================
    // STREAM METRICS (pf-03)
    // =========================================================================

    pub static ref STREAMS_IN: IntCounterVec = IntCounterVec::new(
        Opts::new("pf_streams_in_total", "Inbound streams handled"),
        &["protocol"]
    ).expect("metric creation failed");

    pub static ref STREAMS_IN_SUCCESS: IntCounterVec = IntCounterVec::new(
        Opts::new("pf_streams_in_success_total", "Inbound streams read successfully"),
        &["protocol"]
    ).expect("metric creation failed");

    pub static ref STREAMS_IN_FAILED: IntCounterVec = IntCounterVec::new(
        Opts::new("pf_streams_in_failed_total", "Inbound stream failures"),
        &["protocol", "err"]  // err: read/write/close
    ).expect("metric creation failed");

    pub static ref STREAMS_IN_ACTIVE: IntGaugeVec = IntGaugeVec::new(
        Opts::new("pf_streams_in_active", "Inbound streams currently open"),
        &["protocol"]
    ).expect("metric creation failed");

    pub static ref STREAMS_OUT: IntCounterVec = IntCounterVec::new(
        Opts::new("pf_streams_out_total", "Outbound requests issued"),
        &["protocol"]
    ).expect("metric creation failed");

    pub static ref STREAMS_OUT_SUCCESS: IntCounterVec = IntCounterVec::new(
        Opts::new("pf_streams_out_success_total", "Outbound requests answered"),
        &["protocol"]
    ).expect("metric creation failed");

    pub static ref STREAMS_OUT_FAILED: IntCounterVec = IntCounterVec::new(
        Opts::new("pf_streams_out_failed_total", "Outbound request failures"),
        &["protocol", "err"]  // err: open/write/close_write/read
    ).expect("metric creation failed");

    pub static ref STREAMS_OUT_ACTIVE: IntGaugeVec = IntGaugeVec::new(
        Opts::new("pf_streams_out_active", "Outbound streams currently open"),
        &["protocol"]
    ).expect("metric creation failed");
}

/// Handle proving the metrics were registered
pub struct MetricsHandle {
    _registry: Arc<Registry>,
}

/// Register all metrics with the global registry.
///
/// Fails on a second call since the collectors are already registered.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Connectivity
        Box::new(PEERS_CONNECTED.clone()),
        Box::new(PEERS_TRACKED.clone()),
        Box::new(CONNECT_ATTEMPTS.clone()),
        Box::new(CONNECT_QUEUE_DROPPED.clone()),
        Box::new(CONNECTOR_SKIPPED.clone()),
        Box::new(DISCOVERY_PEERS_FOUND.clone()),
        // PubSub
        Box::new(PUBSUB_LISTENING.clone()),
        Box::new(PUBSUB_IN.clone()),
        Box::new(PUBSUB_IN_DROPPED.clone()),
        Box::new(PUBSUB_OUT.clone()),
        // Streams
        Box::new(STREAMS_IN.clone()),
        Box::new(STREAMS_IN_SUCCESS.clone()),
        Box::new(STREAMS_IN_FAILED.clone()),
        Box::new(STREAMS_IN_ACTIVE.clone()),
        Box::new(STREAMS_OUT.clone()),
        Box::new(STREAMS_OUT_SUCCESS.clone()),
        Box::new(STREAMS_OUT_FAILED.clone()),
        Box::new(STREAMS_OUT_ACTIVE.clone()),
    ];

    for metric in metrics {
        REGISTRY
            .register(metric)
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    }

    Ok(MetricsHandle {
        _registry: Arc::new(REGISTRY.clone()),
    })
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}
