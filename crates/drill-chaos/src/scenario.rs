use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ChaosError;
use crate::plane::{
    ClockFault, Fault, NetworkFault, RenderFault, ResourceFault, StorageFault,
};

/// A named fault with the odds of it firing on a chaos tick and how long it
/// stays active once triggered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChaosScenario {
    pub name: String,
    pub description: String,
    pub probability: f64,
    pub duration_ms: u64,
    pub fault: Fault,
}

impl ChaosScenario {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        probability: f64,
        duration_ms: u64,
        fault: Fault,
    ) -> Result<Self, ChaosError> {
        let name = name.into();
        if !(0.0..=1.0).contains(&probability) {
            return Err(ChaosError::InvalidProbability { name, probability });
        }
        Ok(Self {
            name,
            description: description.into(),
            probability,
            duration_ms,
            fault,
        })
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    /// Copy with the probability multiplied by `scale`, clamped to `[0, 1]`.
    pub fn scaled(&self, scale: f64) -> Self {
        Self {
            probability: (self.probability * scale).clamp(0.0, 1.0),
            ..self.clone()
        }
    }
}

fn entry(name: &str, description: &str, probability: f64, duration_ms: u64, fault: Fault) -> ChaosScenario {
    ChaosScenario {
        name: name.to_string(),
        description: description.to_string(),
        probability,
        duration_ms,
        fault,
    }
}

pub fn builtin_scenarios() -> Vec<ChaosScenario> {
    vec![
        entry(
            "network-latency",
            "Adds 2s of latency to every request",
            0.1,
            5_000,
            Fault::network(NetworkFault::Latency { delay_ms: 2_000 }),
        ),
        entry(
            "network-timeout",
            "Requests hang for 3s and then time out",
            0.05,
            10_000,
            Fault::network(NetworkFault::Timeout { after_ms: 3_000 }),
        ),
        entry(
            "network-error",
            "Requests fail with a connection error",
            0.05,
            3_000,
            Fault::network(NetworkFault::ConnectionError {
                message: "simulated network failure".to_string(),
            }),
        ),
        entry(
            "tile-404",
            "Map tile requests answer 404",
            0.1,
            5_000,
            Fault::network(NetworkFault::NotFound {
                pattern: "/tiles/".to_string(),
            }),
        ),
        entry(
            "malformed-response",
            "Successful responses carry unparseable JSON",
            0.05,
            3_000,
            Fault::network(NetworkFault::Malformed),
        ),
        entry(
            "slow-api",
            "Validation API calls take an extra 5s",
            0.1,
            8_000,
            Fault::network(NetworkFault::SlowPath {
                path: "/api/".to_string(),
                delay_ms: 5_000,
            }),
        ),
        entry(
            "webgl-unavailable",
            "WebGL contexts cannot be created",
            0.02,
            5_000,
            Fault::render(RenderFault::GpuUnavailable),
        ),
        entry(
            "memory-pressure",
            "Holds 50MB of ballast memory",
            0.05,
            5_000,
            Fault::resource(ResourceFault::MemoryBallast { megabytes: 50 }),
        ),
        entry(
            "cpu-pressure",
            "Keeps a worker thread spinning",
            0.05,
            3_000,
            Fault::resource(ResourceFault::CpuBurn { threads: 1 }),
        ),
        entry(
            "storage-full",
            "Storage writes fail with a quota error",
            0.03,
            5_000,
            Fault::storage(StorageFault::QuotaExceeded),
        ),
        entry(
            "clock-skew",
            "Clock runs 5 minutes ahead",
            0.02,
            10_000,
            Fault::clock(ClockFault::Skew { offset_ms: 300_000 }),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn builtin_names_are_unique_and_probabilities_valid() {
        let scenarios = builtin_scenarios();
        let names: HashSet<&str> = scenarios.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names.len(), scenarios.len());
        assert_eq!(scenarios.len(), 11);
        assert!(scenarios
            .iter()
            .all(|s| (0.0..=1.0).contains(&s.probability) && s.duration_ms > 0));
    }

    #[test]
    fn network_timeout_outlasts_its_own_hang() {
        let scenario = builtin_scenarios()
            .into_iter()
            .find(|s| s.name == "network-timeout")
            .expect("network-timeout registered");
        let Fault::Network {
            fault: NetworkFault::Timeout { after_ms },
        } = scenario.fault
        else {
            panic!("unexpected fault {:?}", scenario.fault);
        };
        assert!(scenario.duration_ms > after_ms);
    }

    #[test]
    fn new_rejects_out_of_range_probability() {
        let err = ChaosScenario::new(
            "custom",
            "broken",
            1.2,
            1_000,
            Fault::network(NetworkFault::Malformed),
        )
        .expect_err("probability above one");
        assert!(matches!(err, ChaosError::InvalidProbability { .. }));
    }

    #[test]
    fn scaled_clamps_to_unit_interval() {
        let scenario = ChaosScenario::new(
            "custom",
            "",
            0.4,
            1_000,
            Fault::storage(StorageFault::QuotaExceeded),
        )
        .expect("valid");
        assert_eq!(scenario.scaled(5.0).probability, 1.0);
        assert_eq!(scenario.scaled(0.0).probability, 0.0);
    }
}
