//! Scenario lifecycle: probabilistic trigger loop, explicit triggers and
//! teardown on expiry.

use chrono::{DateTime, Utc};
use drill_core::ChaosConfig;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::adapters::{ChaosClock, ChaosNetwork, ChaosRender, ChaosStorage};
use crate::error::ChaosError;
use crate::plane::FaultPlane;
use crate::port::{lock, ClockPort, NetworkPort, RenderPort, StoragePort};
use crate::scenario::{builtin_scenarios, ChaosScenario};

pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChaosTransition {
    Activated { scenario: String, at: DateTime<Utc> },
    Restored { scenario: String, at: DateTime<Utc> },
}

#[derive(Debug)]
struct Activation {
    id: u64,
    expiry: Option<JoinHandle<()>>,
}

#[derive(Debug)]
struct EngineInner {
    scenarios: Vec<ChaosScenario>,
    plane: Arc<FaultPlane>,
    active: Mutex<HashMap<String, Activation>>,
    next_activation: AtomicU64,
    rng: Mutex<StdRng>,
    transitions: Mutex<Vec<ChaosTransition>>,
}

impl EngineInner {
    fn scenario(&self, name: &str) -> Option<&ChaosScenario> {
        self.scenarios.iter().find(|scenario| scenario.name == name)
    }

    fn is_active(&self, name: &str) -> bool {
        lock(&self.active).contains_key(name)
    }

    fn trigger(self: &Arc<Self>, name: &str) -> bool {
        match self.activate(name, true) {
            Ok(activated) => activated,
            Err(err) => {
                warn!(scenario = name, error = %err, "chaos scenario not activated");
                false
            }
        }
    }

    /// Installs the scenario's fault. `Ok(false)` means it was already
    /// active. Without `expire` it stays until stopped or disabled.
    fn activate(self: &Arc<Self>, name: &str, expire: bool) -> Result<bool, ChaosError> {
        let scenario = self
            .scenario(name)
            .ok_or_else(|| ChaosError::UnknownScenario {
                name: name.to_string(),
            })?;

        let mut active = lock(&self.active);
        if active.contains_key(name) {
            debug!(scenario = name, "chaos scenario already active");
            return Ok(false);
        }

        let id = self.next_activation.fetch_add(1, Ordering::Relaxed) + 1;
        self.plane.install(name, id, &scenario.fault)?;

        // The active lock is still held, so the expiry task cannot observe the
        // map before this activation is recorded.
        let expiry = match Handle::try_current() {
            Ok(handle) if expire => {
                let weak: Weak<EngineInner> = Arc::downgrade(self);
                let scenario_name = scenario.name.clone();
                let duration = scenario.duration();
                Some(handle.spawn(async move {
                    tokio::time::sleep(duration).await;
                    if let Some(inner) = weak.upgrade() {
                        inner.deactivate(&scenario_name, Some(id));
                    }
                }))
            }
            Ok(_) => None,
            Err(_) => {
                debug!(scenario = name, "no runtime available; scenario stays active until stopped");
                None
            }
        };
        active.insert(name.to_string(), Activation { id, expiry });
        drop(active);

        self.record(ChaosTransition::Activated {
            scenario: name.to_string(),
            at: Utc::now(),
        });
        info!(
            scenario = name,
            activation = id,
            duration_ms = scenario.duration_ms,
            held = !expire,
            port = scenario.fault.port_name(),
            "chaos scenario activated"
        );
        Ok(true)
    }

    /// Tears down the scenario. With `only` set, the current activation must
    /// match it, which keeps a late expiry from removing a newer activation.
    fn deactivate(&self, name: &str, only: Option<u64>) -> bool {
        let activation = {
            let mut active = lock(&self.active);
            match active.get(name) {
                Some(current) if only.map_or(true, |id| id == current.id) => active.remove(name),
                _ => None,
            }
        };
        let Some(activation) = activation else {
            return false;
        };

        if only.is_none() {
            if let Some(expiry) = activation.expiry {
                expiry.abort();
            }
        }
        self.plane.remove(name, activation.id);
        self.record(ChaosTransition::Restored {
            scenario: name.to_string(),
            at: Utc::now(),
        });
        info!(scenario = name, activation = activation.id, "chaos scenario restored");
        true
    }

    fn roll(self: &Arc<Self>) {
        for scenario in &self.scenarios {
            if self.is_active(&scenario.name) {
                continue;
            }
            let draw: f64 = lock(&self.rng).gen();
            if draw < scenario.probability {
                self.trigger(&scenario.name);
            }
        }
    }

    fn record(&self, transition: ChaosTransition) {
        lock(&self.transitions).push(transition);
    }
}

/// Owns the scenario registry and the fault plane the chaos wrappers read.
#[derive(Debug)]
pub struct ChaosEngine {
    inner: Arc<EngineInner>,
    ticker: Mutex<Option<JoinHandle<()>>>,
    tick: Duration,
}

impl Default for ChaosEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ChaosEngine {
    pub fn new() -> Self {
        Self::with_scenarios(builtin_scenarios(), None)
    }

    pub fn with_scenarios(scenarios: Vec<ChaosScenario>, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            inner: Arc::new(EngineInner {
                scenarios,
                plane: Arc::new(FaultPlane::new()),
                active: Mutex::new(HashMap::new()),
                next_activation: AtomicU64::new(0),
                rng: Mutex::new(rng),
                transitions: Mutex::new(Vec::new()),
            }),
            ticker: Mutex::new(None),
            tick: DEFAULT_TICK,
        }
    }

    pub fn from_config(config: &ChaosConfig) -> Self {
        let mut scenarios = builtin_scenarios();
        if !config.scenarios.is_empty() {
            for name in &config.scenarios {
                if !scenarios.iter().any(|scenario| &scenario.name == name) {
                    warn!(scenario = %name, "configured chaos scenario is not registered");
                }
            }
            scenarios.retain(|scenario| config.scenarios.contains(&scenario.name));
        }
        let scenarios = scenarios
            .iter()
            .map(|scenario| scenario.scaled(config.probability_scale))
            .collect();
        Self::with_scenarios(scenarios, config.seed).with_tick(config.tick())
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn plane(&self) -> Arc<FaultPlane> {
        Arc::clone(&self.inner.plane)
    }

    /// Starts the probabilistic trigger loop. Needs a tokio runtime; without
    /// one the call is logged and ignored.
    pub fn enable(&self) {
        let mut ticker = lock(&self.ticker);
        if ticker.is_some() {
            debug!("chaos engine already enabled");
            return;
        }
        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("chaos engine needs a tokio runtime; trigger loop not started");
                return;
            }
        };

        // interval() panics on a zero period.
        let tick = self.tick.max(Duration::from_millis(1));
        let weak = Arc::downgrade(&self.inner);
        *ticker = Some(handle.spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                inner.roll();
            }
        }));
        info!(
            tick_ms = tick.as_millis() as u64,
            scenarios = self.inner.scenarios.len(),
            "chaos engine enabled"
        );
    }

    /// Stops the trigger loop and tears down every active scenario.
    pub fn disable(&self) {
        if let Some(ticker) = lock(&self.ticker).take() {
            ticker.abort();
            info!("chaos engine disabled");
        }
        for name in self.active_scenarios() {
            self.inner.deactivate(&name, None);
        }
    }

    pub fn is_enabled(&self) -> bool {
        lock(&self.ticker).is_some()
    }

    /// Activates `name` regardless of its probability. Returns `false` for
    /// unknown or already active scenarios and when setup fails.
    pub fn trigger_scenario(&self, name: &str) -> bool {
        self.inner.trigger(name)
    }

    /// Activates `name` with no expiry; it stays until `stop_scenario` or
    /// `disable`. `Ok(false)` when it was already active.
    pub fn hold_scenario(&self, name: &str) -> Result<bool, ChaosError> {
        self.inner.activate(name, false)
    }

    pub fn stop_scenario(&self, name: &str) -> bool {
        self.inner.deactivate(name, None)
    }

    pub fn active_scenarios(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.inner.active).keys().cloned().collect();
        names.sort();
        names
    }

    pub fn available_scenarios(&self) -> &[ChaosScenario] {
        &self.inner.scenarios
    }

    /// Drains the activation/restore history recorded since the last call.
    pub fn take_transitions(&self) -> Vec<ChaosTransition> {
        std::mem::take(&mut *lock(&self.inner.transitions))
    }

    /// Runs `future` with `names` active. Scenarios this call activated are
    /// torn down when the future completes or is dropped.
    pub async fn run_with_scenarios<F>(&self, names: &[String], future: F) -> F::Output
    where
        F: Future,
    {
        let mut guard = ScenarioGuard {
            engine: self,
            names: Vec::with_capacity(names.len()),
        };
        for name in names {
            if self.trigger_scenario(name) {
                guard.names.push(name.clone());
            }
        }
        future.await
    }

    pub fn wrap_network(&self, inner: Arc<dyn NetworkPort>) -> ChaosNetwork {
        ChaosNetwork::new(inner, self.plane())
    }

    pub fn wrap_storage(&self, inner: Arc<dyn StoragePort>) -> ChaosStorage {
        ChaosStorage::new(inner, self.plane())
    }

    pub fn wrap_render(&self, inner: Arc<dyn RenderPort>) -> ChaosRender {
        ChaosRender::new(inner, self.plane())
    }

    pub fn wrap_clock(&self, inner: Arc<dyn ClockPort>) -> ChaosClock {
        ChaosClock::new(inner, self.plane())
    }
}

impl Drop for ChaosEngine {
    fn drop(&mut self) {
        self.disable();
    }
}

struct ScenarioGuard<'a> {
    engine: &'a ChaosEngine,
    names: Vec<String>,
}

impl Drop for ScenarioGuard<'_> {
    fn drop(&mut self) {
        for name in &self.names {
            self.engine.stop_scenario(name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NetworkError;
    use crate::plane::{Fault, NetworkFault, StorageFault};
    use crate::port::{HttpRequest, HttpResponse, MemoryStorage};
    use async_trait::async_trait;

    struct OkNetwork;

    #[async_trait]
    impl NetworkPort for OkNetwork {
        async fn send(&self, _request: HttpRequest) -> Result<HttpResponse, NetworkError> {
            Ok(HttpResponse::new(200, r#"{"status":"ok"}"#))
        }
    }

    fn scenario(name: &str, probability: f64, duration_ms: u64, fault: Fault) -> ChaosScenario {
        ChaosScenario::new(name, "test scenario", probability, duration_ms, fault)
            .expect("valid scenario")
    }

    const HEALTH: &str = "http://localhost:5000/api/validation/health";

    #[tokio::test(start_paused = true)]
    async fn network_timeout_fails_next_call_then_recovers_after_duration() {
        let engine = ChaosEngine::with_scenarios(builtin_scenarios(), Some(7));
        let network = engine.wrap_network(Arc::new(OkNetwork));

        assert!(engine.trigger_scenario("network-timeout"));
        let err = network
            .send(HttpRequest::get(HEALTH))
            .await
            .expect_err("call under network-timeout");
        assert!(matches!(err, NetworkError::Timeout { .. }));

        tokio::time::sleep(Duration::from_millis(10_001)).await;
        assert!(engine.active_scenarios().is_empty());
        let response = network
            .send(HttpRequest::get(HEALTH))
            .await
            .expect("call after expiry");
        assert_eq!(response.status, 200);
        assert!(engine.plane().is_clear());
    }

    #[tokio::test]
    async fn unknown_and_duplicate_triggers_return_false() {
        let engine = ChaosEngine::new();
        assert!(!engine.trigger_scenario("solar-flare"));
        assert!(engine.trigger_scenario("tile-404"));
        assert!(!engine.trigger_scenario("tile-404"));
        assert_eq!(engine.active_scenarios(), vec!["tile-404".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn held_scenario_outlives_its_duration_until_disabled() {
        let engine = ChaosEngine::new();
        assert_eq!(engine.hold_scenario("network-error"), Ok(true));
        assert_eq!(engine.hold_scenario("network-error"), Ok(false));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(engine.active_scenarios(), vec!["network-error".to_string()]);

        engine.disable();
        assert!(engine.active_scenarios().is_empty());
        assert!(engine.plane().is_clear());
    }

    #[tokio::test(start_paused = true)]
    async fn triggered_scenario_expires_after_its_duration() {
        let engine = ChaosEngine::new();
        assert!(engine.trigger_scenario("network-error"));
        tokio::time::sleep(Duration::from_millis(3_001)).await;
        assert!(engine.active_scenarios().is_empty());
    }

    #[test]
    fn holding_an_unknown_scenario_is_an_error() {
        let engine = ChaosEngine::new();
        assert_eq!(
            engine.hold_scenario("solar-flare"),
            Err(ChaosError::UnknownScenario {
                name: "solar-flare".to_string()
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn enabled_loop_honours_probability_extremes() {
        let engine = ChaosEngine::with_scenarios(
            vec![
                scenario("always", 1.0, 60_000, Fault::storage(StorageFault::QuotaExceeded)),
                scenario("never", 0.0, 60_000, Fault::network(NetworkFault::Malformed)),
            ],
            Some(1),
        )
        .with_tick(Duration::from_millis(100));

        engine.enable();
        assert!(engine.is_enabled());
        tokio::time::sleep(Duration::from_millis(550)).await;
        assert_eq!(engine.active_scenarios(), vec!["always".to_string()]);

        engine.disable();
        assert!(!engine.is_enabled());
        assert!(engine.active_scenarios().is_empty());
        assert!(engine.plane().is_clear());
    }

    #[tokio::test]
    async fn stop_scenario_is_idempotent() {
        let engine = ChaosEngine::new();
        assert!(engine.trigger_scenario("storage-full"));
        assert!(engine.stop_scenario("storage-full"));
        assert!(!engine.stop_scenario("storage-full"));
        assert!(engine.plane().is_clear());

        let transitions = engine.take_transitions();
        assert_eq!(transitions.len(), 2);
        assert!(matches!(transitions[0], ChaosTransition::Activated { .. }));
        assert!(matches!(transitions[1], ChaosTransition::Restored { .. }));
        assert!(engine.take_transitions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_expiry_does_not_end_a_newer_activation() {
        let engine = ChaosEngine::with_scenarios(
            vec![scenario("blip", 0.0, 1_000, Fault::storage(StorageFault::QuotaExceeded))],
            Some(3),
        );

        assert!(engine.trigger_scenario("blip"));
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(engine.stop_scenario("blip"));
        assert!(engine.trigger_scenario("blip"));

        // First activation would have expired at 1000ms.
        tokio::time::sleep(Duration::from_millis(700)).await;
        assert_eq!(engine.active_scenarios(), vec!["blip".to_string()]);

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(engine.active_scenarios().is_empty());
    }

    #[tokio::test]
    async fn concurrent_network_scenarios_compose() {
        let engine = ChaosEngine::new();
        let network = engine.wrap_network(Arc::new(OkNetwork));

        assert!(engine.trigger_scenario("tile-404"));
        assert!(engine.trigger_scenario("network-error"));
        assert!(engine.stop_scenario("tile-404"));

        let err = network
            .send(HttpRequest::get("http://localhost:5000/tiles/1/2/3.png"))
            .await
            .expect_err("network-error still active");
        assert!(matches!(err, NetworkError::Connection { .. }));

        assert!(engine.stop_scenario("network-error"));
        assert!(network.send(HttpRequest::get(HEALTH)).await.is_ok());
    }

    #[tokio::test]
    async fn run_with_scenarios_restores_afterwards() {
        let engine = ChaosEngine::new();
        let storage = engine.wrap_storage(Arc::new(MemoryStorage::new()));

        let during = engine
            .run_with_scenarios(&["storage-full".to_string()], async {
                storage.set_item("viewport", "51.5,-0.12,12")
            })
            .await;
        assert!(during.is_err());
        assert!(engine.active_scenarios().is_empty());
        assert!(storage.set_item("viewport", "51.5,-0.12,12").is_ok());
    }

    #[test]
    fn from_config_filters_and_scales_registry() {
        let config = ChaosConfig {
            enabled: true,
            tick_ms: 250,
            seed: Some(42),
            scenarios: vec!["tile-404".to_string(), "clock-skew".to_string()],
            probability_scale: 100.0,
        };
        let engine = ChaosEngine::from_config(&config);
        let names: Vec<&str> = engine
            .available_scenarios()
            .iter()
            .map(|scenario| scenario.name.as_str())
            .collect();
        assert_eq!(names, vec!["tile-404", "clock-skew"]);
        assert!(engine
            .available_scenarios()
            .iter()
            .all(|scenario| scenario.probability == 1.0));
    }

    #[test]
    fn trigger_without_runtime_stays_active_until_stopped() {
        let engine = ChaosEngine::new();
        engine.enable();
        assert!(!engine.is_enabled());
        assert!(engine.trigger_scenario("webgl-unavailable"));
        assert_eq!(engine.active_scenarios().len(), 1);
        assert!(engine.stop_scenario("webgl-unavailable"));
    }
}
