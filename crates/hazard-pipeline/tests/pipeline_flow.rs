//! End-to-end pipeline tests against a mocked remote backend.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use hazard_geo::{GeoResolver, GeoResolverConfig, NoDeviceLocation};
use hazard_infer::{InferError, InferenceDispatcher, LocalModelLoader, RemoteConfig};
use hazard_models::{Frame, GeoSource, HazardClass, SaveEvent};
use hazard_pipeline::{
    FrameSource, HazardPipeline, PipelineConfig, PipelineError, PipelineResult, PipelineStatus,
    ReportSink,
};

/// Frame source producing a fixed synthetic scene.
struct SyntheticSource;

#[async_trait]
impl FrameSource for SyntheticSource {
    async fn next_frame(&self) -> PipelineResult<Frame> {
        Ok(Frame::rgb8(vec![90u8; 64 * 48 * 3], 64, 48, Instant::now()))
    }
}

/// Frame source that always fails, for degraded-mode tests.
struct BrokenSource;

#[async_trait]
impl FrameSource for BrokenSource {
    async fn next_frame(&self) -> PipelineResult<Frame> {
        Err(PipelineError::frame_source("camera unplugged"))
    }
}

/// Sink collecting submitted events.
#[derive(Clone, Default)]
struct CollectingSink {
    events: Arc<Mutex<Vec<SaveEvent>>>,
}

#[async_trait]
impl ReportSink for CollectingSink {
    async fn submit(&self, event: SaveEvent) -> PipelineResult<()> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

fn unused_local_loader() -> LocalModelLoader {
    Box::new(|| Err(InferError::ModelNotFound("not used in this test".into())))
}

async fn pothole_backend() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            serde_json::json!({"status": "healthy", "model_loaded": true}),
        ))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/detect-base64"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "detections": [
                {"bbox": [10.0, 8.0, 50.0, 40.0], "confidence": 0.9,
                 "class_id": 8, "class_name": "Pothole"}
            ]
        })))
        .mount(&server)
        .await;
    server
}

fn test_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.tick_interval = Duration::from_millis(10);
    config.degraded_threshold = 3;
    // Every tick is an inference candidate and the motion gate is open
    config.throttle.initial_skip_frames = 1;
    config.throttle.motion_threshold = 0.0;
    // The mocked box is 40x32; accept it for saving
    config.tracker.min_save_area = 300.0;
    // Unreachable geo tiers resolve quickly to the configured default
    config.geo = GeoResolverConfig {
        ip_lookup_url: "http://127.0.0.1:1".to_string(),
        ip_lookup_timeout: Duration::from_millis(100),
        high_accuracy_timeout: Duration::from_millis(50),
        low_accuracy_timeout: Duration::from_millis(50),
        ..Default::default()
    };
    config
}

async fn connect_dispatcher(server: &MockServer) -> InferenceDispatcher {
    InferenceDispatcher::connect_with(
        RemoteConfig {
            endpoints: vec![server.uri()],
            ..Default::default()
        },
        unused_local_loader(),
        Duration::from_secs(3600),
    )
    .await
    .unwrap()
}

fn build_pipeline(
    config: PipelineConfig,
    source: Arc<dyn FrameSource>,
    sink: CollectingSink,
    dispatcher: InferenceDispatcher,
) -> HazardPipeline {
    let geo = Arc::new(GeoResolver::new(
        Arc::new(NoDeviceLocation),
        config.geo.clone(),
    ));
    HazardPipeline::new(config, source, Arc::new(sink), dispatcher, geo)
}

#[tokio::test]
async fn test_stable_hazard_saves_once_per_cooldown() {
    let server = pothole_backend().await;
    let dispatcher = connect_dispatcher(&server).await;
    let sink = CollectingSink::default();
    let pipeline = build_pipeline(
        test_config(),
        Arc::new(SyntheticSource),
        sink.clone(),
        dispatcher,
    );

    let mut events = pipeline.subscribe();
    pipeline.start().unwrap();

    // The first save arrives once the track stabilizes
    let event = tokio::time::timeout(Duration::from_secs(10), events.recv())
        .await
        .expect("no save event before timeout")
        .unwrap();

    assert_eq!(event.class, HazardClass::Pothole);
    assert!(event.confidence >= 0.6);
    assert!(!event.snapshot.is_empty());
    let geo = event.geo.expect("default geo tier should have produced a fix");
    assert_eq!(geo.source, GeoSource::Default);

    // Let the pipeline keep ticking well past the save; the global cooldown
    // (10s default) must block any further event
    tokio::time::sleep(Duration::from_millis(500)).await;
    pipeline.stop().await;

    assert_eq!(sink.events.lock().unwrap().len(), 1);

    let metrics = pipeline.metrics();
    assert!(metrics.ticks > 10);
    assert_eq!(metrics.saves, 1);
    assert!(metrics.fps > 0.0);
}

#[tokio::test]
async fn test_stop_clears_tracking_and_cooldown_state() {
    let server = pothole_backend().await;
    let dispatcher = connect_dispatcher(&server).await;
    let sink = CollectingSink::default();
    let pipeline = build_pipeline(
        test_config(),
        Arc::new(SyntheticSource),
        sink.clone(),
        dispatcher,
    );

    let mut events = pipeline.subscribe();

    pipeline.start().unwrap();
    tokio::time::timeout(Duration::from_secs(10), events.recv())
        .await
        .expect("no save event in first run")
        .unwrap();
    pipeline.stop().await;

    // Restart immediately: the save cooldown (10s) has not elapsed, so a
    // second event can only appear if stop() really cleared tracker state
    pipeline.start().unwrap();
    tokio::time::timeout(Duration::from_secs(10), events.recv())
        .await
        .expect("no save event after restart; state leaked across stop/start")
        .unwrap();
    pipeline.stop().await;

    assert_eq!(sink.events.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_repeated_failures_raise_degraded_signal() {
    let server = pothole_backend().await;
    let dispatcher = connect_dispatcher(&server).await;
    let sink = CollectingSink::default();
    let pipeline = build_pipeline(
        test_config(),
        Arc::new(BrokenSource),
        sink.clone(),
        dispatcher,
    );

    let mut status = pipeline.status();
    pipeline.start().unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        assert!(
            Instant::now() < deadline,
            "degraded signal never raised, status {:?}",
            *status.borrow()
        );
        status.changed().await.unwrap();
        if *status.borrow() == PipelineStatus::Degraded {
            break;
        }
    }

    // Degraded, not stopped: the loop keeps ticking
    let ticks_before = pipeline.metrics().ticks;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(pipeline.metrics().ticks > ticks_before);

    pipeline.stop().await;
    assert_eq!(*pipeline.status().borrow(), PipelineStatus::Stopped);
    assert!(sink.events.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_metrics_report_remote_mode() {
    let server = pothole_backend().await;
    let dispatcher = connect_dispatcher(&server).await;
    let sink = CollectingSink::default();
    let pipeline = build_pipeline(
        test_config(),
        Arc::new(SyntheticSource),
        sink,
        dispatcher,
    );

    pipeline.start().unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    let metrics = pipeline.metrics();
    pipeline.stop().await;

    assert_eq!(metrics.mode, hazard_models::InferenceMode::Remote);
    assert!(metrics.infer_latency_ms.is_some());
    assert!(metrics.active_tracks >= 1);
}
