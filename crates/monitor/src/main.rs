//! Drowsiness Monitor - Main Entry Point

use std::path::PathBuf;
use std::sync::Arc;

use alerting::TerminalRenderer;
use analysis_protocol::{AnalysisClient, Thresholds};
use anyhow::Context;
use clap::{Parser, Subcommand};
use monitor::{analyze_once, init_logging, install_metrics, spawn_status_observer, start_session, Settings};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "drowsiness-monitor", version, about = "Camera drowsiness monitoring client")]
struct Cli {
    /// TOML settings file layered over the defaults
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log only, no terminal bell
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stream the camera to the analyzer until Ctrl-C
    Stream {
        /// Start with alerts muted
        #[arg(long)]
        no_alerts: bool,
    },
    /// Analyze a single image file
    Analyze {
        image: PathBuf,

        /// EAR threshold override
        #[arg(long)]
        ear_threshold: Option<f64>,

        /// MAR threshold override
        #[arg(long)]
        mar_threshold: Option<f64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("loading settings")?;
    init_logging(&settings.logging.level, settings.logging.json)?;

    info!("=== Drowsiness Monitor v{} ===", env!("CARGO_PKG_VERSION"));

    if let Some(addr) = &settings.metrics_addr {
        install_metrics(addr)?;
    }

    let renderer = Arc::new(TerminalRenderer::new(cli.quiet));

    match cli.command {
        Command::Stream { no_alerts } => {
            let session = start_session(&settings, renderer)
                .await
                .context("starting capture session")?;
            if no_alerts {
                session.set_alerts_enabled(false);
            }
            let observer = spawn_status_observer(&session);

            tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
            info!("Shutdown requested");

            let report = session.teardown().await;
            observer.abort();
            for err in &report.errors {
                error!("Teardown: {}", err);
            }
            if !report.is_clean() {
                warn!("Session closed with {} teardown error(s)", report.errors.len());
            }
        }
        Command::Analyze {
            image,
            ear_threshold,
            mar_threshold,
        } => {
            let bytes = tokio::fs::read(&image)
                .await
                .with_context(|| format!("reading {}", image.display()))?;
            let file_name = image
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "upload.jpg".to_string());

            let overrides = match (ear_threshold, mar_threshold) {
                (None, None) => None,
                (ear, mar) => {
                    let defaults = Thresholds::default();
                    Some(Thresholds {
                        ear: ear.unwrap_or(defaults.ear),
                        mar: mar.unwrap_or(defaults.mar),
                    })
                }
            };

            let client = AnalysisClient::new(&settings.server.base_url)?;
            let report = analyze_once(&client, bytes, &file_name, overrides, renderer.as_ref())
                .await
                .context("analyzing image")?;

            let mut summary = serde_json::json!({
                "status": report.result.status().as_str(),
                "ear": report.result.ear,
                "mar": report.result.mar,
                "drowsy": report.result.drowsy,
                "yawning": report.result.yawning,
                "eyes_closed": report.result.eyes_closed(),
                "mouth_open": report.result.mouth_open(),
                "alert": report.pattern.as_str(),
            });
            if report.result.annotated_image.is_some() {
                summary["annotated_image"] = serde_json::Value::Bool(true);
            }
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}
