//! Brute-force render commands expanded from a component map.
//!
//! Every prop combination of every mapped component becomes one command that
//! POSTs `{component, props}` to the app's render endpoint. A render passes
//! on a 2xx status unless the body reports `success: false`.

use async_trait::async_trait;
use drill_chaos::HttpRequest;
use drill_core::TestResult;
use drill_map::{generate_test_config, prop_combinations, ComponentMap};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::time::Instant;
use tracing::debug;

use crate::command::{Command, CommandContext, CommandError};

pub const DEFAULT_RENDER_PATH: &str = "/api/test/render/{component}";
pub const DEFAULT_COMBINATION_LIMIT: usize = 16;

#[derive(Debug, Clone, PartialEq)]
pub struct ComponentRenderCommand {
    pub name: String,
    pub component: String,
    pub props: Map<String, Value>,
    /// `{component}` is replaced with the component name.
    pub path: String,
}

#[derive(Debug, Default, Deserialize)]
struct RenderResponse {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    error: Option<String>,
}

impl ComponentRenderCommand {
    pub fn new(
        name: impl Into<String>,
        component: impl Into<String>,
        props: Map<String, Value>,
    ) -> Self {
        Self {
            name: name.into(),
            component: component.into(),
            props,
            path: DEFAULT_RENDER_PATH.to_string(),
        }
    }

    pub fn at(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    fn render_path(&self) -> String {
        self.path.replace("{component}", &self.component)
    }
}

#[async_trait]
impl Command for ComponentRenderCommand {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &CommandContext) -> Result<TestResult, CommandError> {
        let started = Instant::now();
        let url = ctx.url(&self.render_path());
        let body = json!({ "component": self.component, "props": self.props });
        let outcome = ctx.network.send(HttpRequest::post_json(&url, body)).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let (result, status) = match outcome {
            Err(err) => (TestResult::failed(&self.name, duration_ms, err.to_string()), None),
            Ok(response) if !response.is_success() => (
                TestResult::failed(
                    &self.name,
                    duration_ms,
                    format!("render of {} returned status {}", self.component, response.status),
                ),
                Some(response.status),
            ),
            Ok(response) => {
                let parsed: RenderResponse = response.json().unwrap_or_default();
                let result = if parsed.success == Some(false) {
                    let reason = parsed
                        .error
                        .unwrap_or_else(|| "render reported failure".to_string());
                    TestResult::failed(
                        &self.name,
                        duration_ms,
                        format!("{} failed to render: {reason}", self.component),
                    )
                } else {
                    TestResult::passed(&self.name, duration_ms)
                };
                (result, Some(response.status))
            }
        };
        Ok(result
            .with_metadata("component", json!(self.component))
            .with_metadata("props", Value::Object(self.props.clone()))
            .with_metadata("status", json!(status)))
    }
}

/// One render command per prop combination, at most `limit` per component.
/// `only` restricts the expansion to the named components when non-empty.
pub fn component_commands(
    prefix: &str,
    map: &ComponentMap,
    path: &str,
    limit: usize,
    only: &[String],
) -> Vec<ComponentRenderCommand> {
    let mut commands = Vec::new();
    for component in &map.components {
        if !only.is_empty() && !only.contains(&component.name) {
            continue;
        }
        let config = generate_test_config(component);
        let combinations = prop_combinations(&config, limit);
        debug!(
            component = %component.name,
            combinations = combinations.len(),
            "expanded component render commands"
        );
        for (idx, combination) in combinations.into_iter().enumerate() {
            let props: Map<String, Value> = combination
                .iter()
                .filter_map(|(prop, value)| value.to_json().map(|json| (prop.clone(), json)))
                .collect();
            commands.push(
                ComponentRenderCommand::new(
                    format!("{prefix}: {} #{}", component.name, idx + 1),
                    &component.name,
                    props,
                )
                .at(path),
            );
        }
    }
    commands
}
