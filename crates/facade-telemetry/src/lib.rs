//! # Facade Telemetry
//!
//! Observability for the P2P facade.
//!
//! ## Components
//!
//! - **Logging**: `tracing-subscriber` with env filter, pretty or JSON output
//! - **Metrics**: Prometheus counters and gauges for connectivity, pubsub
//!   and streams, encoded in the text exposition format
//!
//! ## Usage
//!
//! ```rust,ignore
//! use facade_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _guard = init_telemetry(TelemetryConfig::from_env())?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `PF_SERVICE_NAME` | `p2p-facade` | Service name in logs |
//! | `PF_LOG_LEVEL` | `info` | Log level filter (falls back to `RUST_LOG`) |
//! | `PF_CONSOLE_OUTPUT` | `true` | Write logs to stdout |
//! | `PF_JSON_LOGS` | `false` | JSON formatted logs |

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::{init_logging, LoggingHandle};
pub use metrics::{
    encode_metrics, register_metrics, MetricsHandle, CONNECTOR_SKIPPED, CONNECT_ATTEMPTS,
    CONNECT_QUEUE_DROPPED, DISCOVERY_PEERS_FOUND, PEERS_CONNECTED, PEERS_TRACKED,
    PUBSUB_IN, PUBSUB_IN_DROPPED, PUBSUB_LISTENING, PUBSUB_OUT, STREAMS_IN, STREAMS_IN_ACTIVE,
    STREAMS_IN_FAILED, STREAMS_IN_SUCCESS, STREAMS_OUT, STREAMS_OUT_ACTIVE, STREAMS_OUT_FAILED,
    STREAMS_OUT_SUCCESS,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Initialize logging and register metrics.
///
/// Returns a guard that should be held for the lifetime of the process.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let metrics = register_metrics()?;
    let logging = init_logging(&config)?;

    Ok(TelemetryGuard {
        _metrics: metrics,
        _logging: logging,
    })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    _metrics: MetricsHandle,
    _logging: LoggingHandle,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!("Shutting down telemetry...");
    }
}

/// Convenience macro for recording a metric increment.
#[macro_export]
macro_rules! metric_inc {
    ($metric:expr) => {
        $metric.inc()
    };
    ($metric:expr, $labels:expr) => {
        $metric.with_label_values($labels).inc()
    };
}
