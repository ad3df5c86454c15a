//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! envelope lifecycle events
//!     → logging.rs (structured log events with request_id / api fields)
//!     → metrics.rs (lifecycle counters)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```

pub mod logging;
pub mod metrics;

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::ObservabilityConfig;

#[derive(Debug, Error)]
pub enum ObservabilityError {
    #[error("failed to install log subscriber: {0}")]
    Logging(#[from] logging::TryInitError),

    #[error("invalid metrics address '{0}'")]
    MetricsAddress(String),

    #[error("failed to install metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),
}

/// Initialize logging and, when enabled, the metrics exporter.
pub fn init(config: &ObservabilityConfig) -> Result<(), ObservabilityError> {
    logging::init_logging(&config.log_level, config.log_json)?;

    if config.metrics_enabled {
        let addr: SocketAddr = config
            .metrics_address
            .parse()
            .map_err(|_| ObservabilityError::MetricsAddress(config.metrics_address.clone()))?;
        metrics::init_metrics(addr)?;
    }
    Ok(())
}
