//! Logging and metrics exporter setup

use std::net::SocketAddr;
use std::str::FromStr;

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::error::SessionError;

/// Install the global tracing subscriber
pub fn init_logging(level: &str, json: bool) -> Result<(), SessionError> {
    let level = Level::from_str(level)
        .map_err(|e| SessionError::Logging(format!("invalid level '{}': {}", level, e)))?;

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true);

    let installed = if json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    installed.map_err(|e| SessionError::Logging(e.to_string()))
}

/// Serve Prometheus metrics on `addr`. Must run inside a tokio runtime.
pub fn install_metrics(addr: &str) -> Result<(), SessionError> {
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| SessionError::Metrics(format!("invalid address '{}': {}", addr, e)))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| SessionError::Metrics(e.to_string()))?;

    info!("Prometheus metrics listening on {}", addr);
    Ok(())
}
