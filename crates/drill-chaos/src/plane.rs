//! The fault plane: every fault currently injected, layered per port.
//!
//! Each activation pushes a layer tagged with `(scenario, activation)`;
//! removal only ever drops the caller's own layer, so scenarios touching the
//! same port compose and restore independently of each other.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::error::ChaosError;
use crate::port::lock;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NetworkFault {
    /// Adds a fixed delay before every request.
    Latency { delay_ms: u64 },
    /// Requests hang for `after_ms` and then fail.
    Timeout { after_ms: u64 },
    /// Requests fail immediately.
    ConnectionError { message: String },
    /// Requests whose URL contains `pattern` answer 404.
    NotFound { pattern: String },
    /// Successful responses have their body replaced by unparseable JSON.
    Malformed,
    /// Adds a delay only to requests whose URL contains `path`.
    SlowPath { path: String, delay_ms: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorageFault {
    QuotaExceeded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RenderFault {
    GpuUnavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClockFault {
    Skew { offset_ms: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceFault {
    /// Holds `megabytes` of touched heap memory while active.
    MemoryBallast { megabytes: usize },
    /// Keeps `threads` OS threads spinning while active.
    CpuBurn { threads: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "port", rename_all = "snake_case")]
pub enum Fault {
    Network { fault: NetworkFault },
    Storage { fault: StorageFault },
    Render { fault: RenderFault },
    Clock { fault: ClockFault },
    Resource { fault: ResourceFault },
}

impl Fault {
    pub fn network(fault: NetworkFault) -> Self {
        Fault::Network { fault }
    }

    pub fn storage(fault: StorageFault) -> Self {
        Fault::Storage { fault }
    }

    pub fn render(fault: RenderFault) -> Self {
        Fault::Render { fault }
    }

    pub fn clock(fault: ClockFault) -> Self {
        Fault::Clock { fault }
    }

    pub fn resource(fault: ResourceFault) -> Self {
        Fault::Resource { fault }
    }

    pub fn port_name(&self) -> &'static str {
        match self {
            Fault::Network { .. } => "network",
            Fault::Storage { .. } => "storage",
            Fault::Render { .. } => "render",
            Fault::Clock { .. } => "clock",
            Fault::Resource { .. } => "resource",
        }
    }
}

#[derive(Debug)]
struct Layer<F> {
    scenario: String,
    activation: u64,
    fault: F,
}

impl<F> Layer<F> {
    fn belongs_to(&self, scenario: &str, activation: u64) -> bool {
        self.scenario == scenario && self.activation == activation
    }
}

/// Live resource pressure. Dropping it releases memory and stops spinners.
enum ResourceHold {
    Ballast(Vec<u8>),
    Burner(CpuBurner),
}

impl std::fmt::Debug for ResourceHold {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceHold::Ballast(bytes) => write!(f, "Ballast({} bytes)", bytes.len()),
            ResourceHold::Burner(burner) => write!(f, "Burner({} threads)", burner.workers.len()),
        }
    }
}

struct CpuBurner {
    stop: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl CpuBurner {
    fn start(threads: usize) -> Result<Self, std::io::Error> {
        let stop = Arc::new(AtomicBool::new(false));
        let mut burner = Self {
            stop: Arc::clone(&stop),
            workers: Vec::with_capacity(threads),
        };
        for idx in 0..threads {
            let stop = Arc::clone(&stop);
            let handle = thread::Builder::new()
                .name(format!("drill-cpu-burn-{idx}"))
                .spawn(move || {
                    let mut acc = 0u64;
                    while !stop.load(Ordering::Relaxed) {
                        acc = acc.wrapping_mul(6364136223846793005).wrapping_add(1);
                        std::hint::black_box(acc);
                    }
                })?;
            burner.workers.push(handle);
        }
        Ok(burner)
    }
}

impl Drop for CpuBurner {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

#[derive(Debug, Default)]
pub struct FaultPlane {
    network: Mutex<Vec<Layer<NetworkFault>>>,
    storage: Mutex<Vec<Layer<StorageFault>>>,
    render: Mutex<Vec<Layer<RenderFault>>>,
    clock: Mutex<Vec<Layer<ClockFault>>>,
    resources: Mutex<Vec<Layer<ResourceHold>>>,
}

impl FaultPlane {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(&self, scenario: &str, activation: u64, fault: &Fault) -> Result<(), ChaosError> {
        let scenario_name = scenario.to_string();
        match fault {
            Fault::Network { fault } => lock(&self.network).push(Layer {
                scenario: scenario_name,
                activation,
                fault: fault.clone(),
            }),
            Fault::Storage { fault } => lock(&self.storage).push(Layer {
                scenario: scenario_name,
                activation,
                fault: fault.clone(),
            }),
            Fault::Render { fault } => lock(&self.render).push(Layer {
                scenario: scenario_name,
                activation,
                fault: fault.clone(),
            }),
            Fault::Clock { fault } => lock(&self.clock).push(Layer {
                scenario: scenario_name,
                activation,
                fault: fault.clone(),
            }),
            Fault::Resource { fault } => {
                let hold = acquire_resource(scenario, fault)?;
                lock(&self.resources).push(Layer {
                    scenario: scenario_name,
                    activation,
                    fault: hold,
                });
            }
        }
        Ok(())
    }

    /// Removes the layers of one activation. Returns whether anything was removed.
    pub fn remove(&self, scenario: &str, activation: u64) -> bool {
        let mut removed = false;
        removed |= retain_foreign(&self.network, scenario, activation);
        removed |= retain_foreign(&self.storage, scenario, activation);
        removed |= retain_foreign(&self.render, scenario, activation);
        removed |= retain_foreign(&self.clock, scenario, activation);

        // Dropping a hold may join spinner threads; do it outside the lock.
        let released: Vec<Layer<ResourceHold>> = {
            let mut resources = lock(&self.resources);
            let (mine, others): (Vec<_>, Vec<_>) = resources
                .drain(..)
                .partition(|layer| layer.belongs_to(scenario, activation));
            *resources = others;
            mine
        };
        removed |= !released.is_empty();
        drop(released);
        removed
    }

    pub fn network_faults(&self) -> Vec<NetworkFault> {
        lock(&self.network)
            .iter()
            .map(|layer| layer.fault.clone())
            .collect()
    }

    pub fn storage_faults(&self) -> Vec<StorageFault> {
        lock(&self.storage)
            .iter()
            .map(|layer| layer.fault.clone())
            .collect()
    }

    pub fn render_faults(&self) -> Vec<RenderFault> {
        lock(&self.render)
            .iter()
            .map(|layer| layer.fault.clone())
            .collect()
    }

    pub fn clock_offset_ms(&self) -> i64 {
        lock(&self.clock)
            .iter()
            .map(|layer| match layer.fault {
                ClockFault::Skew { offset_ms } => offset_ms,
            })
            .sum()
    }

    pub fn held_resources(&self) -> usize {
        lock(&self.resources).len()
    }

    pub fn is_clear(&self) -> bool {
        lock(&self.network).is_empty()
            && lock(&self.storage).is_empty()
            && lock(&self.render).is_empty()
            && lock(&self.clock).is_empty()
            && lock(&self.resources).is_empty()
    }
}

fn retain_foreign<F>(layers: &Mutex<Vec<Layer<F>>>, scenario: &str, activation: u64) -> bool {
    let mut layers = lock(layers);
    let before = layers.len();
    layers.retain(|layer| !layer.belongs_to(scenario, activation));
    layers.len() != before
}

fn acquire_resource(scenario: &str, fault: &ResourceFault) -> Result<ResourceHold, ChaosError> {
    match fault {
        ResourceFault::MemoryBallast { megabytes } => {
            let bytes = megabytes.saturating_mul(1024 * 1024);
            let mut ballast = Vec::new();
            ballast
                .try_reserve_exact(bytes)
                .map_err(|err| ChaosError::SetupFailed {
                    scenario: scenario.to_string(),
                    message: format!("cannot reserve {megabytes}MB ballast: {err}"),
                })?;
            ballast.resize(bytes, 0xA5);
            Ok(ResourceHold::Ballast(ballast))
        }
        ResourceFault::CpuBurn { threads } => CpuBurner::start(*threads)
            .map(ResourceHold::Burner)
            .map_err(|err| ChaosError::SetupFailed {
                scenario: scenario.to_string(),
                message: format!("cannot start cpu burner: {err}"),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layers_from_different_scenarios_restore_independently() {
        let plane = FaultPlane::new();
        plane
            .install("network-latency", 1, &Fault::network(NetworkFault::Latency { delay_ms: 200 }))
            .expect("install latency");
        plane
            .install(
                "network-error",
                2,
                &Fault::network(NetworkFault::ConnectionError {
                    message: "reset".to_string(),
                }),
            )
            .expect("install error");

        // Tear down in installation order; the later layer must survive.
        assert!(plane.remove("network-latency", 1));
        assert_eq!(
            plane.network_faults(),
            vec![NetworkFault::ConnectionError {
                message: "reset".to_string()
            }]
        );

        assert!(plane.remove("network-error", 2));
        assert!(plane.is_clear());
    }

    #[test]
    fn removing_a_stale_activation_is_a_no_op() {
        let plane = FaultPlane::new();
        plane
            .install("storage-full", 5, &Fault::storage(StorageFault::QuotaExceeded))
            .expect("install");

        assert!(!plane.remove("storage-full", 4));
        assert_eq!(plane.storage_faults().len(), 1);
        assert!(plane.remove("storage-full", 5));
        assert!(!plane.remove("storage-full", 5));
    }

    #[test]
    fn clock_skews_accumulate() {
        let plane = FaultPlane::new();
        plane
            .install("clock-skew", 1, &Fault::clock(ClockFault::Skew { offset_ms: 1_000 }))
            .expect("install");
        plane
            .install("clock-skew-back", 2, &Fault::clock(ClockFault::Skew { offset_ms: -250 }))
            .expect("install");
        assert_eq!(plane.clock_offset_ms(), 750);
    }

    #[test]
    fn resource_holds_are_released_on_remove() {
        let plane = FaultPlane::new();
        plane
            .install(
                "memory-pressure",
                1,
                &Fault::resource(ResourceFault::MemoryBallast { megabytes: 1 }),
            )
            .expect("ballast");
        plane
            .install("cpu-pressure", 2, &Fault::resource(ResourceFault::CpuBurn { threads: 1 }))
            .expect("burner");
        assert_eq!(plane.held_resources(), 2);

        assert!(plane.remove("cpu-pressure", 2));
        assert!(plane.remove("memory-pressure", 1));
        assert!(plane.is_clear());
    }

    #[test]
    fn fault_serializes_with_port_and_kind_tags() {
        let fault = Fault::network(NetworkFault::NotFound {
            pattern: "/tiles/".to_string(),
        });
        let encoded = serde_json::to_value(&fault).expect("serialize fault");
        assert_eq!(encoded["port"], "network");
        assert_eq!(encoded["fault"]["kind"], "not_found");
        assert_eq!(fault.port_name(), "network");
    }
}
