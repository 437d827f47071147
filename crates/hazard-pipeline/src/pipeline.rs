//! The per-frame pipeline orchestrator.
//!
//! Drives one tick at a time: frame → throttle → inference → postprocess →
//! tracker → save decision → report sink. Stage failures are absorbed as
//! "no detections this cycle"; repeated consecutive failures raise a
//! degraded signal without stopping the loop, and only fatal errors halt it.
//!
//! Throttle and tracker state live inside the run task and are recreated on
//! every start: no tracks, cooldowns or latency history survive a
//! stop/start cycle.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use hazard_geo::GeoResolver;
use hazard_infer::{encode_jpeg, to_observations, InferenceDispatcher};
use hazard_models::{SaveEvent, Severity};
use hazard_track::{FrameThrottle, HazardTracker};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::metrics::{MetricsCollector, PipelineMetrics};
use crate::sink::ReportSink;
use crate::source::FrameSource;
use crate::status::PipelineStatus;

/// Everything a run task needs, cloned out of the pipeline handle.
struct TickContext {
    config: PipelineConfig,
    source: Arc<dyn FrameSource>,
    sink: Arc<dyn ReportSink>,
    dispatcher: InferenceDispatcher,
    geo: Arc<GeoResolver>,
    save_tx: broadcast::Sender<SaveEvent>,
    metrics: MetricsCollector,
}

/// Outcome of one successful tick.
struct TickReport {
    active_tracks: usize,
}

/// The real-time detection-and-tracking pipeline.
pub struct HazardPipeline {
    config: PipelineConfig,
    source: Arc<dyn FrameSource>,
    sink: Arc<dyn ReportSink>,
    dispatcher: InferenceDispatcher,
    geo: Arc<GeoResolver>,
    save_tx: broadcast::Sender<SaveEvent>,
    status_tx: watch::Sender<PipelineStatus>,
    shutdown_tx: watch::Sender<bool>,
    metrics: MetricsCollector,
    run_task: Mutex<Option<JoinHandle<()>>>,
}

impl HazardPipeline {
    /// Create a pipeline over its collaborators.
    ///
    /// The dispatcher must already be connected; construction itself spawns
    /// nothing.
    pub fn new(
        config: PipelineConfig,
        source: Arc<dyn FrameSource>,
        sink: Arc<dyn ReportSink>,
        dispatcher: InferenceDispatcher,
        geo: Arc<GeoResolver>,
    ) -> Self {
        let (save_tx, _) = broadcast::channel(config.event_channel_capacity);
        let (status_tx, _) = watch::channel(PipelineStatus::Idle);
        let (shutdown_tx, _) = watch::channel(false);
        let metrics = MetricsCollector::new(config.fps_window);

        Self {
            config,
            source,
            sink,
            dispatcher,
            geo,
            save_tx,
            status_tx,
            shutdown_tx,
            metrics,
            run_task: Mutex::new(None),
        }
    }

    /// Start ticking.
    pub fn start(&self) -> PipelineResult<()> {
        let mut slot = self.run_task.lock().unwrap();
        if slot.as_ref().is_some_and(|t| !t.is_finished()) {
            return Err(PipelineError::AlreadyRunning);
        }

        self.shutdown_tx.send_replace(false);
        self.metrics.reset();
        self.status_tx.send_replace(PipelineStatus::Running);

        self.dispatcher.start_reprobe();

        let ctx = TickContext {
            config: self.config.clone(),
            source: Arc::clone(&self.source),
            sink: Arc::clone(&self.sink),
            dispatcher: self.dispatcher.clone(),
            geo: Arc::clone(&self.geo),
            save_tx: self.save_tx.clone(),
            metrics: self.metrics.clone(),
        };
        let status_tx = self.status_tx.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();

        *slot = Some(tokio::spawn(run_loop(ctx, status_tx, shutdown_rx)));
        info!("Pipeline started");
        Ok(())
    }

    /// Stop ticking, cancel background work and clear all tracking state.
    pub async fn stop(&self) {
        self.shutdown_tx.send_replace(true);
        let handle = self.run_task.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        info!("Pipeline stopped");
    }

    /// Subscribe to emitted save events.
    pub fn subscribe(&self) -> broadcast::Receiver<SaveEvent> {
        self.save_tx.subscribe()
    }

    /// Watch pipeline status changes.
    pub fn status(&self) -> watch::Receiver<PipelineStatus> {
        self.status_tx.subscribe()
    }

    /// Point-in-time metrics snapshot.
    pub fn metrics(&self) -> PipelineMetrics {
        self.metrics.snapshot()
    }
}

/// The tick loop: owned throttle/tracker state, strict stage order per tick.
async fn run_loop(
    ctx: TickContext,
    status_tx: watch::Sender<PipelineStatus>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut throttle = FrameThrottle::new(ctx.config.throttle.clone());
    let mut tracker = HazardTracker::new(ctx.config.tracker.clone());

    match ctx.geo.acquire_initial().await {
        Some(fix) => info!(source = ?fix.source, "Initial location acquired"),
        None => warn!("No location available, reports will carry no position"),
    }
    ctx.geo.start_watch();

    let mut ticker = tokio::time::interval(ctx.config.tick_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let mut cycle: u64 = 0;
    let mut consecutive_failures: u32 = 0;
    let mut status = PipelineStatus::Running;
    let mut fatal = false;

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                let tick_start = Instant::now();

                match run_tick(&ctx, &mut throttle, &mut tracker, cycle).await {
                    Ok(report) => {
                        consecutive_failures = 0;
                        if status != PipelineStatus::Running {
                            status = PipelineStatus::Running;
                            status_tx.send_replace(status.clone());
                        }
                        ctx.metrics.record_tick(
                            tick_start.elapsed(),
                            report.active_tracks,
                            ctx.dispatcher.mode(),
                            consecutive_failures,
                        );
                    }
                    Err(e) if e.severity() == Severity::Fatal => {
                        error!("Fatal pipeline error: {}", e);
                        status = PipelineStatus::Failed(e.to_string());
                        status_tx.send_replace(status.clone());
                        fatal = true;
                        break;
                    }
                    Err(e) => {
                        // Absorbed as "no detections this cycle"
                        consecutive_failures += 1;
                        warn!(consecutive_failures, "Tick failed: {}", e);
                        if consecutive_failures > ctx.config.degraded_threshold
                            && status != PipelineStatus::Degraded
                        {
                            status = PipelineStatus::Degraded;
                            status_tx.send_replace(status.clone());
                        }
                        ctx.metrics.record_tick(
                            tick_start.elapsed(),
                            tracker.active_count(),
                            ctx.dispatcher.mode(),
                            consecutive_failures,
                        );
                    }
                }

                cycle += 1;
            }
        }
    }

    // Teardown: cancel background tasks, drop all per-run state
    tracker.reset();
    ctx.geo.stop();
    ctx.dispatcher.shutdown();
    if !fatal {
        status_tx.send_replace(PipelineStatus::Stopped);
    }
}

/// One pipeline tick, stages in strict order.
async fn run_tick(
    ctx: &TickContext,
    throttle: &mut FrameThrottle,
    tracker: &mut HazardTracker,
    cycle: u64,
) -> PipelineResult<TickReport> {
    let frame = ctx.source.next_frame().await?;

    if !throttle.should_run_inference(&frame, cycle) {
        // Preview-only path
        return Ok(TickReport {
            active_tracks: tracker.active_count(),
        });
    }

    let infer_start = Instant::now();
    let detections = ctx.dispatcher.detect(&frame).await?;
    let infer_latency = infer_start.elapsed();
    throttle.record_latency(infer_latency);
    ctx.metrics.record_inference(infer_latency);

    let observations = to_observations(
        &detections,
        frame.width,
        frame.height,
        &ctx.config.postprocess,
    );

    let now = Instant::now();
    let live = tracker.update(&observations, now);

    let mut snapshot: Option<Vec<u8>> = None;
    for hazard in &live {
        if !tracker.should_save(hazard, now) {
            continue;
        }

        let jpeg = match &snapshot {
            Some(bytes) => bytes.clone(),
            None => {
                let encoded = encode_jpeg(&frame)
                    .map_err(|e| PipelineError::Snapshot(e.to_string()))?;
                snapshot = Some(encoded.clone());
                encoded
            }
        };

        let event = SaveEvent {
            hazard_id: hazard.id,
            snapshot: jpeg,
            class: hazard.class,
            confidence: hazard.confidence,
            geo: ctx.geo.current_best(),
            timestamp: chrono::Utc::now(),
        };

        info!(
            hazard_id = %hazard.id,
            class = %hazard.class,
            confidence = hazard.confidence,
            "Emitting save event"
        );

        let _ = ctx.save_tx.send(event.clone());
        if let Err(e) = ctx.sink.submit(event).await {
            // Transient: the event still counts against the cooldown
            warn!("Report sink failed: {}", e);
        }
        tracker.mark_saved(hazard.id, now);
        ctx.metrics.record_save();
    }

    Ok(TickReport {
        active_tracks: tracker.active_count(),
    })
}
