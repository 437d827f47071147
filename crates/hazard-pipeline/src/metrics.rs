//! Rolling pipeline metrics.

use std::collections::VecDeque;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use serde::Serialize;

use hazard_models::InferenceMode;

/// Read-only metrics snapshot exposed to collaborators.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineMetrics {
    /// Rolling tick rate over the recent window.
    pub fps: f64,
    /// Live tracked-hazard count after the latest tick.
    pub active_tracks: usize,
    /// Current inference mode.
    pub mode: InferenceMode,
    /// Latency of the most recent inference call, if any ran yet.
    pub infer_latency_ms: Option<f64>,
    /// Duration of the most recent full tick.
    pub tick_latency_ms: Option<f64>,
    /// Consecutive failed ticks.
    pub consecutive_failures: u32,
    /// Total ticks since start.
    pub ticks: u64,
    /// Total save events emitted since start.
    pub saves: u64,
}

#[derive(Default)]
struct MetricsInner {
    tick_instants: VecDeque<Instant>,
    active_tracks: usize,
    mode: Option<InferenceMode>,
    infer_latency: Option<Duration>,
    tick_latency: Option<Duration>,
    consecutive_failures: u32,
    ticks: u64,
    saves: u64,
}

/// Shared collector updated by the tick loop, readable from anywhere.
#[derive(Clone)]
pub struct MetricsCollector {
    window: usize,
    inner: Arc<RwLock<MetricsInner>>,
}

impl MetricsCollector {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(2),
            inner: Arc::new(RwLock::new(MetricsInner::default())),
        }
    }

    /// Record one completed tick.
    pub fn record_tick(
        &self,
        tick_latency: Duration,
        active_tracks: usize,
        mode: InferenceMode,
        consecutive_failures: u32,
    ) {
        let mut inner = self.inner.write().unwrap();
        inner.tick_instants.push_back(Instant::now());
        while inner.tick_instants.len() > self.window {
            inner.tick_instants.pop_front();
        }
        inner.tick_latency = Some(tick_latency);
        inner.active_tracks = active_tracks;
        inner.mode = Some(mode);
        inner.consecutive_failures = consecutive_failures;
        inner.ticks += 1;
    }

    /// Record the latency of an inference run.
    pub fn record_inference(&self, latency: Duration) {
        self.inner.write().unwrap().infer_latency = Some(latency);
    }

    /// Record an emitted save event.
    pub fn record_save(&self) {
        self.inner.write().unwrap().saves += 1;
    }

    /// Take a point-in-time snapshot.
    pub fn snapshot(&self) -> PipelineMetrics {
        let inner = self.inner.read().unwrap();

        let fps = match (inner.tick_instants.front(), inner.tick_instants.back()) {
            (Some(&first), Some(&last)) if inner.tick_instants.len() >= 2 => {
                let span = last.duration_since(first).as_secs_f64();
                if span > 0.0 {
                    (inner.tick_instants.len() - 1) as f64 / span
                } else {
                    0.0
                }
            }
            _ => 0.0,
        };

        PipelineMetrics {
            fps,
            active_tracks: inner.active_tracks,
            mode: inner.mode.unwrap_or(InferenceMode::Unknown),
            infer_latency_ms: inner.infer_latency.map(|d| d.as_secs_f64() * 1000.0),
            tick_latency_ms: inner.tick_latency.map(|d| d.as_secs_f64() * 1000.0),
            consecutive_failures: inner.consecutive_failures,
            ticks: inner.ticks,
            saves: inner.saves,
        }
    }

    /// Clear rolling state for a fresh start.
    pub fn reset(&self) {
        *self.inner.write().unwrap() = MetricsInner::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_snapshot() {
        let metrics = MetricsCollector::new(30);
        let snap = metrics.snapshot();
        assert_eq!(snap.fps, 0.0);
        assert_eq!(snap.ticks, 0);
        assert_eq!(snap.mode, InferenceMode::Unknown);
        assert!(snap.infer_latency_ms.is_none());
    }

    #[test]
    fn test_tick_accounting() {
        let metrics = MetricsCollector::new(5);
        for i in 0..10 {
            metrics.record_tick(
                Duration::from_millis(10),
                i,
                InferenceMode::Remote,
                0,
            );
        }

        let snap = metrics.snapshot();
        assert_eq!(snap.ticks, 10);
        assert_eq!(snap.active_tracks, 9);
        assert_eq!(snap.mode, InferenceMode::Remote);
    }

    #[test]
    fn test_fps_rolls_over_window() {
        let metrics = MetricsCollector::new(3);
        for _ in 0..3 {
            metrics.record_tick(Duration::from_millis(1), 0, InferenceMode::Local, 0);
            std::thread::sleep(Duration::from_millis(10));
        }

        let snap = metrics.snapshot();
        assert!(snap.fps > 0.0);
        assert!(snap.fps < 1000.0);
    }

    #[test]
    fn test_reset_clears_counts() {
        let metrics = MetricsCollector::new(5);
        metrics.record_tick(Duration::from_millis(1), 2, InferenceMode::Remote, 1);
        metrics.record_save();
        metrics.reset();

        let snap = metrics.snapshot();
        assert_eq!(snap.ticks, 0);
        assert_eq!(snap.saves, 0);
        assert_eq!(snap.active_tracks, 0);
    }
}
