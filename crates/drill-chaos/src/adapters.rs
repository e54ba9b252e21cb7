//! Fault-aware wrappers around the ports in `port`.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{NetworkError, RenderError, StorageError};
use crate::plane::{FaultPlane, NetworkFault, RenderFault, StorageFault};
use crate::port::{
    ClockPort, ContextKind, HttpRequest, HttpResponse, NetworkPort, RenderContext, RenderPort,
    StoragePort,
};

/// Body substituted for successful responses while `Malformed` is active.
pub const MALFORMED_BODY: &str = "{\"success\": tru, \"layers\": [";

pub struct ChaosNetwork {
    inner: Arc<dyn NetworkPort>,
    plane: Arc<FaultPlane>,
}

impl ChaosNetwork {
    pub fn new(inner: Arc<dyn NetworkPort>, plane: Arc<FaultPlane>) -> Self {
        Self { inner, plane }
    }
}

#[async_trait]
impl NetworkPort for ChaosNetwork {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, NetworkError> {
        // Snapshot once so a teardown mid-request cannot half-apply a fault.
        let faults = self.plane.network_faults();

        let delay_ms: u64 = faults
            .iter()
            .map(|fault| match fault {
                NetworkFault::Latency { delay_ms } => *delay_ms,
                NetworkFault::SlowPath { path, delay_ms } if request.url.contains(path.as_str()) => {
                    *delay_ms
                }
                _ => 0,
            })
            .sum();
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }

        for fault in &faults {
            match fault {
                NetworkFault::Timeout { after_ms } => {
                    tokio::time::sleep(Duration::from_millis(*after_ms)).await;
                    return Err(NetworkError::Timeout {
                        url: request.url,
                        after_ms: *after_ms,
                    });
                }
                NetworkFault::ConnectionError { message } => {
                    return Err(NetworkError::Connection {
                        url: request.url,
                        message: message.clone(),
                    });
                }
                NetworkFault::NotFound { pattern } if request.url.contains(pattern.as_str()) => {
                    return Ok(HttpResponse::new(404, "Not Found"));
                }
                _ => {}
            }
        }

        let malformed = faults
            .iter()
            .any(|fault| matches!(fault, NetworkFault::Malformed));
        let mut response = self.inner.send(request).await?;
        if malformed && response.is_success() {
            response.body = MALFORMED_BODY.to_string();
        }
        Ok(response)
    }
}

pub struct ChaosStorage {
    inner: Arc<dyn StoragePort>,
    plane: Arc<FaultPlane>,
}

impl ChaosStorage {
    pub fn new(inner: Arc<dyn StoragePort>, plane: Arc<FaultPlane>) -> Self {
        Self { inner, plane }
    }
}

impl StoragePort for ChaosStorage {
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if self
            .plane
            .storage_faults()
            .iter()
            .any(|fault| matches!(fault, StorageFault::QuotaExceeded))
        {
            return Err(StorageError::QuotaExceeded {
                key: key.to_string(),
            });
        }
        self.inner.set_item(key, value)
    }

    fn get_item(&self, key: &str) -> Option<String> {
        self.inner.get_item(key)
    }

    fn remove_item(&self, key: &str) {
        self.inner.remove_item(key);
    }
}

pub struct ChaosRender {
    inner: Arc<dyn RenderPort>,
    plane: Arc<FaultPlane>,
}

impl ChaosRender {
    pub fn new(inner: Arc<dyn RenderPort>, plane: Arc<FaultPlane>) -> Self {
        Self { inner, plane }
    }
}

impl RenderPort for ChaosRender {
    fn create_context(&self, kind: ContextKind) -> Result<RenderContext, RenderError> {
        let gpu_blocked = self
            .plane
            .render_faults()
            .iter()
            .any(|fault| matches!(fault, RenderFault::GpuUnavailable));
        if gpu_blocked && kind.is_gpu() {
            return Err(RenderError::ContextUnavailable {
                kind: kind.as_str().to_string(),
            });
        }
        self.inner.create_context(kind)
    }
}

pub struct ChaosClock {
    inner: Arc<dyn ClockPort>,
    plane: Arc<FaultPlane>,
}

impl ChaosClock {
    pub fn new(inner: Arc<dyn ClockPort>, plane: Arc<FaultPlane>) -> Self {
        Self { inner, plane }
    }
}

impl ClockPort for ChaosClock {
    fn now(&self) -> DateTime<Utc> {
        self.inner.now() + ChronoDuration::milliseconds(self.plane.clock_offset_ms())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plane::{ClockFault, Fault};
    use crate::port::{HeadlessRender, MemoryStorage};
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingNetwork {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl NetworkPort for CountingNetwork {
        async fn send(&self, _request: HttpRequest) -> Result<HttpResponse, NetworkError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(HttpResponse::new(200, r#"{"success":true}"#))
        }
    }

    struct FixedClock;

    impl ClockPort for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0)
                .single()
                .expect("valid timestamp")
        }
    }

    fn network_with(plane: &Arc<FaultPlane>) -> (Arc<CountingNetwork>, ChaosNetwork) {
        let inner = Arc::new(CountingNetwork {
            calls: AtomicUsize::new(0),
        });
        let chaos = ChaosNetwork::new(inner.clone(), Arc::clone(plane));
        (inner, chaos)
    }

    #[tokio::test]
    async fn clean_plane_passes_requests_through() {
        let plane = Arc::new(FaultPlane::new());
        let (inner, network) = network_with(&plane);

        let response = network
            .send(HttpRequest::get("http://localhost/api/validation/health"))
            .await
            .expect("request succeeds");
        assert_eq!(response.status, 200);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn not_found_only_matches_its_pattern() {
        let plane = Arc::new(FaultPlane::new());
        plane
            .install(
                "tile-404",
                1,
                &Fault::network(NetworkFault::NotFound {
                    pattern: "/tiles/".to_string(),
                }),
            )
            .expect("install");
        let (inner, network) = network_with(&plane);

        let tile = network
            .send(HttpRequest::get("http://localhost/tiles/12/2048/1361.png"))
            .await
            .expect("tile response");
        assert_eq!(tile.status, 404);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 0);

        let api = network
            .send(HttpRequest::get("http://localhost/api/validation/health"))
            .await
            .expect("api response");
        assert_eq!(api.status, 200);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn malformed_fault_corrupts_successful_bodies() {
        let plane = Arc::new(FaultPlane::new());
        plane
            .install("malformed-response", 1, &Fault::network(NetworkFault::Malformed))
            .expect("install");
        let (_, network) = network_with(&plane);

        let response = network
            .send(HttpRequest::get("http://localhost/api/validation/comprehensive"))
            .await
            .expect("response");
        assert!(response.json::<serde_json::Value>().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn latency_layers_add_up() {
        let plane = Arc::new(FaultPlane::new());
        plane
            .install("network-latency", 1, &Fault::network(NetworkFault::Latency { delay_ms: 300 }))
            .expect("install");
        plane
            .install(
                "slow-api",
                2,
                &Fault::network(NetworkFault::SlowPath {
                    path: "/api/".to_string(),
                    delay_ms: 700,
                }),
            )
            .expect("install");
        let (_, network) = network_with(&plane);

        let started = tokio::time::Instant::now();
        network
            .send(HttpRequest::get("http://localhost/api/validation/health"))
            .await
            .expect("response");
        assert!(started.elapsed() >= Duration::from_millis(1_000));
    }

    #[test]
    fn storage_quota_fault_blocks_writes_but_not_reads() {
        let plane = Arc::new(FaultPlane::new());
        let inner = Arc::new(MemoryStorage::new());
        inner.set_item("basemap", "satellite").expect("seed");
        let storage = ChaosStorage::new(inner, Arc::clone(&plane));

        plane
            .install("storage-full", 1, &Fault::storage(StorageFault::QuotaExceeded))
            .expect("install");
        assert!(storage.set_item("basemap", "streets").is_err());
        assert_eq!(storage.get_item("basemap").as_deref(), Some("satellite"));

        plane.remove("storage-full", 1);
        storage.set_item("basemap", "streets").expect("write after restore");
    }

    #[test]
    fn gpu_fault_leaves_canvas_contexts_available() {
        let plane = Arc::new(FaultPlane::new());
        plane
            .install("webgl-unavailable", 1, &Fault::render(RenderFault::GpuUnavailable))
            .expect("install");
        let render = ChaosRender::new(Arc::new(HeadlessRender::default()), Arc::clone(&plane));

        assert!(render.create_context(ContextKind::Webgl).is_err());
        assert!(render.create_context(ContextKind::Canvas2d).is_ok());
    }

    #[test]
    fn clock_skew_shifts_reported_time() {
        let plane = Arc::new(FaultPlane::new());
        let clock = ChaosClock::new(Arc::new(FixedClock), Arc::clone(&plane));
        let base = clock.now();

        plane
            .install("clock-skew", 1, &Fault::clock(ClockFault::Skew { offset_ms: 90_000 }))
            .expect("install");
        assert_eq!(clock.now() - base, ChronoDuration::seconds(90));
    }
}
