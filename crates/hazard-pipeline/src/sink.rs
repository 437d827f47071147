//! Report sink collaborator seam.

use async_trait::async_trait;
use tracing::info;

use hazard_models::SaveEvent;

use crate::error::PipelineResult;

/// Accepts save events for persistence.
///
/// Submission failures are treated as transient by the pipeline: the event
/// was still emitted and counted against the cooldown.
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn submit(&self, event: SaveEvent) -> PipelineResult<()>;
}

/// Sink that only logs events; the default for soak runs.
pub struct LoggingSink;

#[async_trait]
impl ReportSink for LoggingSink {
    async fn submit(&self, event: SaveEvent) -> PipelineResult<()> {
        info!(
            hazard_id = %event.hazard_id,
            class = %event.class,
            confidence = event.confidence,
            lat = event.geo.map(|g| g.lat),
            lng = event.geo.map(|g| g.lng),
            snapshot_bytes = event.snapshot.len(),
            "Hazard report"
        );
        Ok(())
    }
}
