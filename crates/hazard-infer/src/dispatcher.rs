//! Inference dispatch across the remote and local backends.
//!
//! Holds the authoritative backend mode (`Unknown` → `Remote` | `Local`) and
//! fails over from remote to local on call failure. While serving locally, a
//! background task re-probes the remote service and switches back when it
//! recovers. Mode is read once per call, so a single `detect` never
//! oscillates between backends.

use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use hazard_models::{Frame, InferenceMode, RawDetection};

use crate::error::{InferError, InferResult};
use crate::letterbox::LetterboxMeta;
use crate::local::{LocalConfig, LocalModel, OrtDetector};
use crate::remote::{RemoteConfig, RemoteDetector};

/// Factory for the lazily initialized local model.
pub type LocalModelLoader = Box<dyn Fn() -> InferResult<Arc<dyn LocalModel>> + Send + Sync>;

/// Configuration for the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub remote: RemoteConfig,
    pub local: LocalConfig,
    /// How often to re-probe the remote service while serving locally.
    pub reprobe_interval: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            remote: RemoteConfig::default(),
            local: LocalConfig::default(),
            reprobe_interval: Duration::from_secs(30),
        }
    }
}

impl DispatcherConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            remote: RemoteConfig::from_env(),
            local: LocalConfig::from_env(),
            reprobe_interval: Duration::from_secs(
                std::env::var("HAZARD_REPROBE_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }
}

/// Result of a successful `detect` call.
#[derive(Debug, Clone)]
pub struct Detections {
    /// Raw detections in the space described by `letterbox`.
    pub raw: Vec<RawDetection>,
    /// Transform back to source-frame coordinates.
    pub letterbox: LetterboxMeta,
    /// Informational tag: which backend served the call.
    pub served_by: InferenceMode,
}

struct ModeState {
    mode: InferenceMode,
    active_remote: Option<String>,
}

enum LocalSlot {
    Uninit,
    Ready(Arc<dyn LocalModel>),
    Failed,
}

struct Inner {
    remote: RemoteDetector,
    loader: LocalModelLoader,
    local: Mutex<LocalSlot>,
    state: RwLock<ModeState>,
    probe_task: Mutex<Option<JoinHandle<()>>>,
    reprobe_interval: Duration,
}

/// Dispatches `detect` calls to the healthy backend.
#[derive(Clone)]
pub struct InferenceDispatcher {
    inner: Arc<Inner>,
}

impl InferenceDispatcher {
    /// Connect using the ONNX local backend.
    ///
    /// Probes the remote candidates; if none answers, the local model is
    /// initialized immediately. Errors only when no backend is available at
    /// all.
    pub async fn connect(config: DispatcherConfig) -> InferResult<Self> {
        let local_config = config.local.clone();
        let loader: LocalModelLoader = Box::new(move || {
            OrtDetector::new(local_config.clone()).map(|d| Arc::new(d) as Arc<dyn LocalModel>)
        });
        Self::connect_with(config.remote, loader, config.reprobe_interval).await
    }

    /// Connect with a custom local-model factory.
    pub async fn connect_with(
        remote_config: RemoteConfig,
        loader: LocalModelLoader,
        reprobe_interval: Duration,
    ) -> InferResult<Self> {
        let remote = RemoteDetector::new(remote_config)?;

        let dispatcher = Self {
            inner: Arc::new(Inner {
                remote,
                loader,
                local: Mutex::new(LocalSlot::Uninit),
                state: RwLock::new(ModeState {
                    mode: InferenceMode::Unknown,
                    active_remote: None,
                }),
                probe_task: Mutex::new(None),
                reprobe_interval,
            }),
        };

        dispatcher.resolve_startup_mode().await?;
        Ok(dispatcher)
    }

    /// Current backend mode.
    pub fn mode(&self) -> InferenceMode {
        self.inner.state.read().unwrap().mode
    }

    /// Run detection on a frame against the current backend.
    pub async fn detect(&self, frame: &Frame) -> InferResult<Detections> {
        let (mode, active) = {
            let state = self.inner.state.read().unwrap();
            (state.mode, state.active_remote.clone())
        };

        match mode {
            InferenceMode::Remote => {
                let base = active
                    .ok_or_else(|| InferError::RemoteUnavailable("no active endpoint".into()))?;
                match self.inner.remote.detect(&base, frame).await {
                    Ok(raw) => Ok(Detections {
                        raw,
                        letterbox: LetterboxMeta::identity(frame.width, frame.height),
                        served_by: InferenceMode::Remote,
                    }),
                    Err(e) => {
                        warn!("Remote detect failed, failing over to local: {}", e);
                        self.set_mode(InferenceMode::Local, None);
                        self.detect_local(frame)
                    }
                }
            }
            InferenceMode::Local => self.detect_local(frame),
            InferenceMode::Unknown => {
                // Defensive: mode is resolved at connect time.
                self.resolve_startup_mode().await?;
                Box::pin(self.detect(frame)).await
            }
        }
    }

    /// Start the background remote re-probe task.
    pub fn start_reprobe(&self) {
        let inner = Arc::clone(&self.inner);
        let interval = self.inner.reprobe_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick fires immediately; skip it so a fresh failover
            // is not immediately reverted by a stale health response.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let mode = inner.state.read().unwrap().mode;
                if mode != InferenceMode::Local {
                    continue;
                }
                if let Some(base) = inner.remote.probe().await {
                    info!(endpoint = %base, "Remote backend recovered, switching back");
                    let mut state = inner.state.write().unwrap();
                    state.mode = InferenceMode::Remote;
                    state.active_remote = Some(base);
                }
            }
        });

        let mut slot = self.inner.probe_task.lock().unwrap();
        if let Some(previous) = slot.replace(handle) {
            previous.abort();
        }
    }

    /// Stop the background re-probe task.
    pub fn shutdown(&self) {
        if let Some(handle) = self.inner.probe_task.lock().unwrap().take() {
            handle.abort();
        }
    }

    /// Probe the remote candidates once and settle the initial mode.
    async fn resolve_startup_mode(&self) -> InferResult<()> {
        if let Some(base) = self.inner.remote.probe().await {
            info!(endpoint = %base, "Serving inference remotely");
            self.set_mode(InferenceMode::Remote, Some(base));
            return Ok(());
        }

        warn!("No remote backend reachable, initializing local model");
        self.ensure_local()?;
        self.set_mode(InferenceMode::Local, None);
        Ok(())
    }

    fn detect_local(&self, frame: &Frame) -> InferResult<Detections> {
        let model = self.ensure_local()?;
        let (raw, letterbox) = model.detect(frame)?;
        Ok(Detections {
            raw,
            letterbox,
            served_by: InferenceMode::Local,
        })
    }

    /// Initialize the local model on first use; a failed init is terminal.
    fn ensure_local(&self) -> InferResult<Arc<dyn LocalModel>> {
        let mut slot = self.inner.local.lock().unwrap();
        match &*slot {
            LocalSlot::Ready(model) => Ok(Arc::clone(model)),
            LocalSlot::Failed => Err(InferError::NoBackend),
            LocalSlot::Uninit => match (self.inner.loader)() {
                Ok(model) => match model.warm_up() {
                    Ok(()) => {
                        *slot = LocalSlot::Ready(Arc::clone(&model));
                        Ok(model)
                    }
                    Err(e) => {
                        warn!("Local model warm-up failed: {}", e);
                        *slot = LocalSlot::Failed;
                        Err(InferError::NoBackend)
                    }
                },
                Err(e) => {
                    warn!("Local model load failed: {}", e);
                    *slot = LocalSlot::Failed;
                    Err(InferError::NoBackend)
                }
            },
        }
    }

    fn set_mode(&self, mode: InferenceMode, active_remote: Option<String>) {
        let mut state = self.inner.state.write().unwrap();
        if state.mode != mode {
            info!(from = %state.mode, to = %mode, "Inference mode changed");
        }
        state.mode = mode;
        state.active_remote = active_remote;
    }
}
