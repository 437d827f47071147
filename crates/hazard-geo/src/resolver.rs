//! Tiered location acquisition with fallback chain.
//!
//! Tiers, in order: high-accuracy device geolocation (short timeout),
//! low-accuracy device geolocation (longer timeout), IP-based lookup, then a
//! configured default coordinate. The first tier that succeeds becomes the
//! current best fix and short-circuits the rest. Permission denial is
//! terminal for both GPS tiers only.
//!
//! All failures are absorbed: the public surface returns `Option<GeoFix>`.

use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use hazard_models::{GeoFix, GeoSource};

use crate::error::{GeoError, GeoResult};
use crate::provider::{Accuracy, DeviceLocationProvider};

/// Configuration for the resolver.
#[derive(Debug, Clone)]
pub struct GeoResolverConfig {
    /// Timeout for the high-accuracy device tier.
    pub high_accuracy_timeout: Duration,
    /// Timeout for the low-accuracy device tier.
    pub low_accuracy_timeout: Duration,
    /// IP geolocation endpoint (ip-api.com JSON contract).
    pub ip_lookup_url: String,
    /// Timeout for the IP tier.
    pub ip_lookup_timeout: Duration,
    /// Fallback coordinate when every upstream tier fails. `None` disables
    /// the tier, making the resolver report unavailability instead.
    pub default_coordinate: Option<(f64, f64)>,
    /// Poll interval for the continuous background watch.
    pub watch_interval: Duration,
}

impl Default for GeoResolverConfig {
    fn default() -> Self {
        Self {
            high_accuracy_timeout: Duration::from_secs(5),
            low_accuracy_timeout: Duration::from_secs(10),
            ip_lookup_url: "http://ip-api.com/json".to_string(),
            ip_lookup_timeout: Duration::from_secs(5),
            default_coordinate: Some((32.0853, 34.7818)),
            watch_interval: Duration::from_secs(30),
        }
    }
}

impl GeoResolverConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            high_accuracy_timeout: Duration::from_secs(
                std::env::var("GEO_HIGH_ACCURACY_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
            low_accuracy_timeout: Duration::from_secs(
                std::env::var("GEO_LOW_ACCURACY_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
            ),
            ip_lookup_url: std::env::var("GEO_IP_LOOKUP_URL")
                .unwrap_or(defaults.ip_lookup_url),
            ip_lookup_timeout: Duration::from_secs(
                std::env::var("GEO_IP_LOOKUP_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
            default_coordinate: defaults.default_coordinate,
            watch_interval: Duration::from_secs(
                std::env::var("GEO_WATCH_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }
}

/// ip-api.com response body (subset).
#[derive(Debug, Deserialize)]
struct IpLookupResponse {
    #[serde(default)]
    status: Option<String>,
    lat: f64,
    lon: f64,
}

/// Tiered geolocation resolver.
///
/// Holds at most one "current best" fix; superseded fixes are discarded,
/// never merged.
pub struct GeoResolver {
    provider: Arc<dyn DeviceLocationProvider>,
    http: Client,
    config: GeoResolverConfig,
    current: Arc<RwLock<Option<GeoFix>>>,
    watch_task: Mutex<Option<JoinHandle<()>>>,
}

impl GeoResolver {
    /// Create a resolver over a device location provider.
    pub fn new(provider: Arc<dyn DeviceLocationProvider>, config: GeoResolverConfig) -> Self {
        Self {
            provider,
            http: Client::new(),
            config,
            current: Arc::new(RwLock::new(None)),
            watch_task: Mutex::new(None),
        }
    }

    /// Walk the tier chain until one produces a fix.
    ///
    /// Always terminates within the sum of the tier timeouts; returns `None`
    /// only when every tier fails (including a disabled default tier).
    pub async fn acquire_initial(&self) -> Option<GeoFix> {
        let mut gps_denied = false;

        match self
            .device_fix(Accuracy::High, self.config.high_accuracy_timeout)
            .await
        {
            Ok(fix) => return Some(self.store(fix)),
            Err(e) => {
                debug!("High-accuracy tier failed: {}", e);
                gps_denied = e.is_permission_denied();
            }
        }

        if !gps_denied {
            match self
                .device_fix(Accuracy::Low, self.config.low_accuracy_timeout)
                .await
            {
                Ok(fix) => return Some(self.store(fix)),
                Err(e) => debug!("Low-accuracy tier failed: {}", e),
            }
        }

        match self.ip_lookup().await {
            Ok(fix) => return Some(self.store(fix)),
            Err(e) => debug!("IP tier failed: {}", e),
        }

        match self.config.default_coordinate {
            Some((lat, lng)) => {
                warn!("All geolocation tiers failed, using default coordinate");
                Some(self.store(GeoFix::new(lat, lng, GeoSource::Default)))
            }
            None => None,
        }
    }

    /// The best fix known so far, if any.
    pub fn current_best(&self) -> Option<GeoFix> {
        *self.current.read().unwrap()
    }

    /// Start the best-effort background watch.
    ///
    /// Each successful poll overwrites the current best fix; failures keep
    /// the last known fix. Permission denial ends the watch.
    pub fn start_watch(&self) {
        let provider = Arc::clone(&self.provider);
        let current = Arc::clone(&self.current);
        let interval = self.config.watch_interval;
        let timeout = self.config.high_accuracy_timeout;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                match locate_bounded(provider.as_ref(), Accuracy::High, timeout).await {
                    Ok(fix) => {
                        *current.write().unwrap() = Some(fix);
                    }
                    Err(e) if e.is_permission_denied() => {
                        info!("Location permission denied, stopping watch");
                        break;
                    }
                    Err(e) => debug!("Location watch poll failed: {}", e),
                }
            }
        });

        let mut slot = self.watch_task.lock().unwrap();
        if let Some(previous) = slot.replace(handle) {
            previous.abort();
        }
    }

    /// Stop the watch and clear the current fix.
    pub fn stop(&self) {
        if let Some(handle) = self.watch_task.lock().unwrap().take() {
            handle.abort();
        }
        *self.current.write().unwrap() = None;
    }

    async fn device_fix(&self, accuracy: Accuracy, timeout: Duration) -> GeoResult<GeoFix> {
        let fix = locate_bounded(self.provider.as_ref(), accuracy, timeout).await?;
        let source = match accuracy {
            Accuracy::High => GeoSource::HighAccuracyGps,
            Accuracy::Low => GeoSource::LowAccuracyGps,
        };
        Ok(GeoFix::new(fix.lat, fix.lng, source))
    }

    async fn ip_lookup(&self) -> GeoResult<GeoFix> {
        let response = self
            .http
            .get(&self.config.ip_lookup_url)
            .timeout(self.config.ip_lookup_timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GeoError::LookupFailed(format!(
                "service returned {}",
                response.status()
            )));
        }

        let body: IpLookupResponse = response
            .json()
            .await
            .map_err(|e| GeoError::LookupFailed(e.to_string()))?;

        if matches!(body.status.as_deref(), Some(s) if s != "success") {
            return Err(GeoError::LookupFailed(format!(
                "lookup status {}",
                body.status.unwrap_or_default()
            )));
        }

        Ok(GeoFix::new(body.lat, body.lon, GeoSource::Ip))
    }

    fn store(&self, fix: GeoFix) -> GeoFix {
        *self.current.write().unwrap() = Some(fix);
        fix
    }
}

/// Run a provider call under a hard timeout, whatever the provider does.
async fn locate_bounded(
    provider: &dyn DeviceLocationProvider,
    accuracy: Accuracy,
    timeout: Duration,
) -> GeoResult<GeoFix> {
    match tokio::time::timeout(timeout, provider.locate(accuracy, timeout)).await {
        Ok(result) => result,
        Err(_) => Err(GeoError::Timeout(timeout)),
    }
}
