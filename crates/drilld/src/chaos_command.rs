use async_trait::async_trait;
use drill_chaos::ChaosEngine;
use drill_core::TestResult;
use std::sync::Arc;

use crate::command::{Command, CommandContext, CommandError};

/// Runs another command with chaos scenarios active and its network routed
/// through the fault plane.
///
/// Scenarios are shared engine state: when two commands of a parallel batch
/// name the same scenario, the one that activated it also tears it down, so
/// the other may finish without the fault.
pub struct ChaosCommand {
    inner: Arc<dyn Command>,
    engine: Arc<ChaosEngine>,
    scenarios: Vec<String>,
}

impl ChaosCommand {
    pub fn new(inner: Arc<dyn Command>, engine: Arc<ChaosEngine>, scenarios: Vec<String>) -> Self {
        Self {
            inner,
            engine,
            scenarios,
        }
    }

    pub fn scenarios(&self) -> &[String] {
        &self.scenarios
    }
}

#[async_trait]
impl Command for ChaosCommand {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn run(&self, ctx: &CommandContext) -> Result<TestResult, CommandError> {
        let network = Arc::new(self.engine.wrap_network(Arc::clone(&ctx.network)));
        let chaotic = ctx.with_network(network);
        let result = self
            .engine
            .run_with_scenarios(&self.scenarios, self.inner.run(&chaotic))
            .await?;
        Ok(result.with_metadata("chaosScenarios", serde_json::json!(self.scenarios)))
    }
}
