//! Layered settings: defaults, optional TOML file, then `DROWSY_*` env vars

use std::path::Path;
use std::time::Duration;

use alerting::DebounceConfig;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use stream_transport::TransportConfig;

/// Environment variable prefix, e.g. `DROWSY_ALERTS__COOLDOWN_MS=3000`
pub const ENV_PREFIX: &str = "DROWSY";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub capture: CaptureSettings,
    pub transport: TransportSettings,
    pub alerts: DebounceConfig,
    pub logging: LoggingSettings,
    /// Prometheus listener address, e.g. "0.0.0.0:9000"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics_addr: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Analyzer HTTP base URL
    pub base_url: String,
    /// Path of the streaming endpoint on the same host
    pub stream_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    pub target_fps: u32,
    /// JPEG quality, 1-100
    pub jpeg_quality: u8,
    /// `still:<path>` or `v4l:<index>`
    pub source: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// Duplex streaming of frames and results
    Stream,
    /// Poll the analyzer's own camera status
    Poll,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    pub mode: TransportMode,
    /// 0 disables the connect timeout
    pub connect_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub inbound_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            stream_path: "/ws".to_string(),
        }
    }
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            target_fps: 10,
            jpeg_quality: 70,
            source: "v4l:0".to_string(),
        }
    }
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            mode: TransportMode::Stream,
            connect_timeout_ms: 10_000,
            poll_interval_ms: 500,
            inbound_capacity: 64,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            capture: CaptureSettings::default(),
            transport: TransportSettings::default(),
            alerts: DebounceConfig::default(),
            logging: LoggingSettings::default(),
            metrics_addr: None,
        }
    }
}

impl Settings {
    /// Load settings, layering an optional TOML file and the process
    /// environment over the defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = defaults()?;
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }
        builder.add_source(environment()).build()?.try_deserialize()
    }

    /// Settings from a TOML document layered over the defaults
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        defaults()?
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    /// Settings from an explicit variable map, as if it were the environment
    pub fn from_env_map(vars: config::Map<String, String>) -> Result<Self, ConfigError> {
        defaults()?
            .add_source(environment().source(Some(vars)))
            .build()?
            .try_deserialize()
    }

    /// Streaming endpoint derived from the analyzer base URL
    /// ("http://host:8000" + "/ws" -> "ws://host:8000/ws")
    pub fn stream_endpoint(&self) -> Result<String, ConfigError> {
        let base = self.server.base_url.trim_end_matches('/');
        let rest = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            return Err(ConfigError::Message(format!(
                "server.base_url must be http(s), got '{}'",
                self.server.base_url
            )));
        };

        let path = &self.server.stream_path;
        if path.starts_with('/') {
            Ok(format!("{}{}", rest, path))
        } else {
            Ok(format!("{}/{}", rest, path))
        }
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            connect_timeout: match self.transport.connect_timeout_ms {
                0 => None,
                ms => Some(Duration::from_millis(ms)),
            },
            inbound_capacity: self.transport.inbound_capacity,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.transport.poll_interval_ms)
    }
}

fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Ok(Config::builder().add_source(Config::try_from(&Settings::default())?))
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_round_trip_through_config() {
        let settings = Settings::from_toml_str("").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.alerts.cooldown_ms, 2000);
        assert_eq!(settings.capture.target_fps, 10);
        assert!(settings.metrics_addr.is_none());
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let settings = Settings::from_toml_str(
            r#"
            metrics_addr = "127.0.0.1:9000"

            [server]
            base_url = "https://analyzer.local:8443/"

            [transport]
            mode = "poll"
            connect_timeout_ms = 0

            [alerts]
            enabled = false
            "#,
        )
        .unwrap();

        assert_eq!(settings.transport.mode, TransportMode::Poll);
        assert_eq!(settings.transport_config().connect_timeout, None);
        assert!(!settings.alerts.enabled);
        assert_eq!(settings.alerts.cooldown_ms, 2000);
        assert_eq!(settings.metrics_addr.as_deref(), Some("127.0.0.1:9000"));
        assert_eq!(settings.stream_endpoint().unwrap(), "wss://analyzer.local:8443/ws");
    }

    #[test]
    fn test_environment_overrides() {
        let mut vars = config::Map::new();
        vars.insert("DROWSY_ALERTS__COOLDOWN_MS".to_string(), "3000".to_string());
        vars.insert("DROWSY_CAPTURE__SOURCE".to_string(), "still:/tmp/face.jpg".to_string());
        vars.insert("DROWSY_LOGGING__JSON".to_string(), "true".to_string());

        let settings = Settings::from_env_map(vars).unwrap();
        assert_eq!(settings.alerts.cooldown_ms, 3000);
        assert_eq!(settings.capture.source, "still:/tmp/face.jpg");
        assert!(settings.logging.json);
    }

    #[test]
    fn test_stream_endpoint_derivation() {
        let mut settings = Settings::default();
        assert_eq!(settings.stream_endpoint().unwrap(), "ws://localhost:8000/ws");

        settings.server.stream_path = "stream".to_string();
        assert_eq!(settings.stream_endpoint().unwrap(), "ws://localhost:8000/stream");

        settings.server.base_url = "ftp://nowhere".to_string();
        assert!(settings.stream_endpoint().is_err());
    }

    #[test]
    fn test_transport_config_mapping() {
        let settings = Settings::default();
        let config = settings.transport_config();
        assert_eq!(config.connect_timeout, Some(Duration::from_secs(10)));
        assert_eq!(config.inbound_capacity, 64);
        assert_eq!(settings.poll_interval(), Duration::from_millis(500));
    }
}
