//! One-shot still image analysis

use std::time::Instant;

use alerting::{AlertDebouncer, AlertPattern, AlertRenderer, DebounceConfig};
use analysis_protocol::{AnalysisClient, AnalysisResult, ProtocolError, Thresholds};
use tracing::info;

/// Outcome of analyzing a single uploaded image
#[derive(Debug, Clone)]
pub struct OneShotReport {
    pub result: AnalysisResult,
    /// Pattern that was played
    pub pattern: AlertPattern,
}

/// Upload one image, then run a fresh debouncer over the result once.
///
/// Plays the matching alert, or `Success` when nothing fires. Request
/// failures are returned as-is; nothing is retried.
pub async fn analyze_once(
    client: &AnalysisClient,
    image: Vec<u8>,
    file_name: &str,
    overrides: Option<Thresholds>,
    renderer: &dyn AlertRenderer,
) -> Result<OneShotReport, ProtocolError> {
    let result = client.analyze_image(image, file_name, overrides).await?;

    let mut debouncer = AlertDebouncer::new(&DebounceConfig {
        enabled: true,
        ..DebounceConfig::default()
    });
    let pattern = debouncer
        .observe(&result, Instant::now())
        .map(|kind| kind.pattern())
        .unwrap_or(AlertPattern::Success);

    info!(
        "{}: {} (EAR {:.3}, MAR {:.3})",
        file_name,
        result.status().as_str(),
        result.ear,
        result.mar
    );
    renderer.render(pattern);

    Ok(OneShotReport { result, pattern })
}
