//! HTTP client for the analyzer's request/response endpoints
//!
//! Covers the one-shot `POST /analyze` upload as well as `GET /status` and
//! `GET /health`, which the polling transport builds on.

use reqwest::multipart::{Form, Part};
use reqwest::{Response, Url};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::ProtocolError;
use crate::result::{decode_message, AnalysisResult};
use crate::thresholds;

/// Default request timeout
const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Per-request threshold overrides for `/analyze`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub ear: f64,
    pub mar: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            ear: thresholds::EAR,
            mar: thresholds::MAR,
        }
    }
}

/// Client for the analyzer's HTTP API
#[derive(Debug, Clone)]
pub struct AnalysisClient {
    /// Base URL without trailing slash (e.g. "http://localhost:8000")
    base_url: String,
    http: reqwest::Client,
}

impl AnalysisClient {
    /// Create a client with the default timeout
    pub fn new(base_url: &str) -> Result<Self, ProtocolError> {
        Self::with_timeout(base_url, Duration::from_millis(DEFAULT_TIMEOUT_MS))
    }

    /// Create a client with an explicit request timeout
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, ProtocolError> {
        let parsed = Url::parse(base_url).map_err(|e| ProtocolError::InvalidUrl(e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ProtocolError::InvalidUrl(format!(
                "unsupported scheme '{}'",
                parsed.scheme()
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ProtocolError::from)?;

        info!("Creating analysis client for {}", base_url);
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Base URL this client talks to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check that the analyzer is reachable
    pub async fn health(&self) -> Result<(), ProtocolError> {
        let response = self.http.get(self.url("/health")).send().await?;
        ensure_success(response, "Health check failed").await?;
        Ok(())
    }

    /// Fetch the analyzer's latest live metrics
    pub async fn status(&self) -> Result<AnalysisResult, ProtocolError> {
        let response = self
            .http
            .get(self.url("/status"))
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;
        let response = ensure_success(response, "Failed to fetch status").await?;
        let body = response.bytes().await?;
        decode_message(&body)
    }

    /// Upload a single image and return the analyzer's verdict
    pub async fn analyze_image(
        &self,
        image: Vec<u8>,
        file_name: &str,
        overrides: Option<Thresholds>,
    ) -> Result<AnalysisResult, ProtocolError> {
        if image.is_empty() {
            return Err(ProtocolError::AnalysisRequestFailed {
                status: 400,
                message: "No file provided".to_string(),
            });
        }

        debug!("Uploading {} ({} bytes) for analysis", file_name, image.len());

        let part = Part::bytes(image).file_name(file_name.to_string());
        let form = Form::new().part("file", part);

        let mut request = self.http.post(self.url("/analyze")).multipart(form);
        if let Some(t) = overrides {
            request = request.query(&[("ear_threshold", t.ear), ("mar_threshold", t.mar)]);
        }

        let response = request.send().await?;
        let response = ensure_success(response, "Analysis failed").await?;
        let body = response.bytes().await?;
        decode_message(&body)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Turn a non-2xx response into `AnalysisRequestFailed`
async fn ensure_success(response: Response, context: &str) -> Result<Response, ProtocolError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let reason = status.canonical_reason().unwrap_or("Unknown status");
    warn!("{}: HTTP {}", context, status.as_u16());
    Err(ProtocolError::AnalysisRequestFailed {
        status: status.as_u16(),
        message: format!("{}: {}", context, reason),
    })
}
