//! Hazard detection pipeline binary.
//!
//! Replays frames from a directory through the full pipeline; intended for
//! soak testing against a staging backend.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use hazard_geo::{GeoResolver, NoDeviceLocation};
use hazard_infer::InferenceDispatcher;
use hazard_pipeline::{HazardPipeline, LoggingSink, PipelineConfig, ReplayDirectorySource};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"))
        .add_directive("ort=warn".parse().unwrap())
        .add_directive("onnxruntime=warn".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting hazard-pipeline");

    let config = PipelineConfig::from_env();

    let frame_dir = std::env::var("FRAME_DIR").unwrap_or_else(|_| "frames".to_string());
    let source = match ReplayDirectorySource::new(&frame_dir) {
        Ok(s) => {
            info!(frame_dir, frames = s.len(), "Replay source ready");
            Arc::new(s)
        }
        Err(e) => {
            error!("Failed to open frame directory: {}", e);
            std::process::exit(1);
        }
    };

    let dispatcher = match InferenceDispatcher::connect(config.dispatcher.clone()).await {
        Ok(d) => d,
        Err(e) => {
            error!("No inference backend available: {}", e);
            std::process::exit(1);
        }
    };

    let geo = Arc::new(GeoResolver::new(
        Arc::new(NoDeviceLocation),
        config.geo.clone(),
    ));

    let pipeline = HazardPipeline::new(config, source, Arc::new(LoggingSink), dispatcher, geo);

    let mut events = pipeline.subscribe();
    let event_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            info!(
                hazard_id = %event.hazard_id,
                class = %event.class,
                "Save event observed"
            );
        }
    });

    if let Err(e) = pipeline.start() {
        error!("Failed to start pipeline: {}", e);
        std::process::exit(1);
    }

    tokio::signal::ctrl_c().await.ok();
    info!("Received shutdown signal");

    pipeline.stop().await;
    event_task.abort();

    let metrics = pipeline.metrics();
    info!(
        ticks = metrics.ticks,
        saves = metrics.saves,
        fps = format!("{:.1}", metrics.fps),
        "Pipeline shutdown complete"
    );
}
