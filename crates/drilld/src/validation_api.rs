//! Client for the backend validation endpoints.

use async_trait::async_trait;
use drill_chaos::HttpRequest;
use drill_core::TestResult;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::command::{Command, CommandContext, CommandError};

pub const HEALTH_PATH: &str = "/api/validation/health";
pub const COMPREHENSIVE_PATH: &str = "/api/validation/comprehensive";
pub const COMPARE_PATH: &str = "/api/validation/compare";

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationCheck {
    Health,
    Comprehensive,
    /// POSTs the frontend's own validation snapshot for a cross-check.
    Compare { payload: serde_json::Value },
}

impl ValidationCheck {
    pub fn path(&self) -> &'static str {
        match self {
            ValidationCheck::Health => HEALTH_PATH,
            ValidationCheck::Comprehensive => COMPREHENSIVE_PATH,
            ValidationCheck::Compare { .. } => COMPARE_PATH,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationCheck::Health => "health",
            ValidationCheck::Comprehensive => "comprehensive",
            ValidationCheck::Compare { .. } => "compare",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompareResponse {
    pub success: bool,
    #[serde(default)]
    pub discrepancies: Vec<serde_json::Value>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationApiCommand {
    pub name: String,
    pub check: ValidationCheck,
}

impl ValidationApiCommand {
    pub fn new(name: impl Into<String>, check: ValidationCheck) -> Self {
        Self {
            name: name.into(),
            check,
        }
    }

    fn request(&self, ctx: &CommandContext) -> HttpRequest {
        let url = ctx.url(self.check.path());
        match &self.check {
            ValidationCheck::Compare { payload } => HttpRequest::post_json(url, payload.clone()),
            _ => HttpRequest::get(url),
        }
    }
}

#[async_trait]
impl Command for ValidationApiCommand {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &CommandContext) -> Result<TestResult, CommandError> {
        let started = Instant::now();
        let request = self.request(ctx);
        let method = request.method;
        let url = request.url.clone();
        let outcome = ctx.network.send(request).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let response = match outcome {
            Ok(response) => response,
            Err(err) => {
                return Ok(TestResult::failed(&self.name, duration_ms, err.to_string())
                    .with_metadata("check", serde_json::json!(self.check.as_str())))
            }
        };
        if !response.is_success() {
            return Ok(TestResult::failed(
                &self.name,
                duration_ms,
                format!("{method} {url} returned status {}", response.status),
            )
            .with_metadata("check", serde_json::json!(self.check.as_str()))
            .with_metadata("status", serde_json::json!(response.status)));
        }

        let result = match &self.check {
            ValidationCheck::Compare { .. } => match response.json::<CompareResponse>() {
                Ok(compare) => compare_result(&self.name, duration_ms, compare),
                Err(err) => TestResult::failed(
                    &self.name,
                    duration_ms,
                    format!("compare response is not valid json: {err}"),
                ),
            },
            _ => match response.json::<serde_json::Value>() {
                Ok(body) => body_result(&self.name, duration_ms, body),
                Err(err) => TestResult::failed(
                    &self.name,
                    duration_ms,
                    format!("{method} {url} returned invalid json: {err}"),
                ),
            },
        };
        Ok(result
            .with_metadata("check", serde_json::json!(self.check.as_str()))
            .with_metadata("status", serde_json::json!(response.status)))
    }
}

/// Health and comprehensive bodies only fail on an explicit `success: false`.
fn body_result(name: &str, duration_ms: u64, body: serde_json::Value) -> TestResult {
    match body.get("success").and_then(serde_json::Value::as_bool) {
        Some(false) => {
            let detail = body
                .get("error")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("backend reported success=false");
            TestResult::failed(name, duration_ms, detail).with_metadata("response", body)
        }
        _ => TestResult::passed(name, duration_ms).with_metadata("response", body),
    }
}

fn compare_result(name: &str, duration_ms: u64, compare: CompareResponse) -> TestResult {
    let mut result = if compare.success && compare.discrepancies.is_empty() {
        TestResult::passed(name, duration_ms)
    } else if compare.discrepancies.is_empty() {
        TestResult::failed(name, duration_ms, "backend comparison reported failure")
    } else {
        TestResult::failed(
            name,
            duration_ms,
            format!(
                "{} discrepancies between frontend and backend",
                compare.discrepancies.len()
            ),
        )
    };
    for recommendation in &compare.recommendations {
        result = result.with_warning(recommendation.clone());
    }
    result
        .with_metadata("discrepancies", serde_json::json!(compare.discrepancies))
        .with_metadata("recommendations", serde_json::json!(compare.recommendations))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::tests::ctx_with;
    use drill_chaos::{HttpMethod, HttpResponse, NetworkError, NetworkPort};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recording {
        status: u16,
        body: String,
        seen: Mutex<Vec<HttpRequest>>,
    }

    #[async_trait]
    impl NetworkPort for Recording {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, NetworkError> {
            self.seen.lock().expect("seen lock").push(request);
            Ok(HttpResponse::new(self.status, self.body.clone()))
        }
    }

    fn network(status: u16, body: &str) -> Arc<Recording> {
        Arc::new(Recording {
            status,
            body: body.to_string(),
            ..Recording::default()
        })
    }

    #[tokio::test]
    async fn health_passes_on_ok_body() {
        let net = network(200, r#"{"status":"healthy","success":true}"#);
        let cmd = ValidationApiCommand::new("health", ValidationCheck::Health);
        let result = cmd.run(&ctx_with(net.clone())).await.expect("run");
        assert!(result.success);
        assert_eq!(result.metadata["response"]["status"], "healthy");

        let seen = net.seen.lock().expect("seen lock");
        assert_eq!(seen[0].method, HttpMethod::Get);
        assert_eq!(seen[0].url, "http://localhost:5000/api/validation/health");
    }

    #[tokio::test]
    async fn comprehensive_fails_on_explicit_failure() {
        let net = network(200, r#"{"success":false,"error":"layer registry empty"}"#);
        let cmd = ValidationApiCommand::new("full", ValidationCheck::Comprehensive);
        let result = cmd.run(&ctx_with(net)).await.expect("run");
        assert_eq!(result.first_error(), Some("layer registry empty"));
    }

    #[tokio::test]
    async fn server_errors_and_bad_json_fail_without_erroring() {
        let down = ValidationApiCommand::new("health", ValidationCheck::Health)
            .run(&ctx_with(network(500, "oops")))
            .await
            .expect("run");
        assert!(down
            .first_error()
            .is_some_and(|err| err.contains("returned status 500")));

        let garbled = ValidationApiCommand::new("health", ValidationCheck::Health)
            .run(&ctx_with(network(200, "<html>")))
            .await
            .expect("run");
        assert!(garbled
            .first_error()
            .is_some_and(|err| err.contains("invalid json")));
    }

    #[tokio::test]
    async fn compare_posts_payload_and_reports_discrepancies() {
        let net = network(
            200,
            r#"{"success":false,"discrepancies":[{"layer":"hazards"}],"recommendations":["reload hazards"]}"#,
        );
        let payload = serde_json::json!({"layers": {"hazards": {"visible": true}}});
        let cmd = ValidationApiCommand::new(
            "compare",
            ValidationCheck::Compare {
                payload: payload.clone(),
            },
        );
        let result = cmd.run(&ctx_with(net.clone())).await.expect("run");
        assert!(!result.success);
        assert_eq!(
            result.first_error(),
            Some("1 discrepancies between frontend and backend")
        );
        assert_eq!(result.warnings, vec!["reload hazards".to_string()]);

        let seen = net.seen.lock().expect("seen lock");
        assert_eq!(seen[0].method, HttpMethod::Post);
        assert_eq!(seen[0].body.as_ref(), Some(&payload));
    }

    #[tokio::test]
    async fn compare_without_discrepancies_passes() {
        let net = network(200, r#"{"success":true,"discrepancies":[],"recommendations":[]}"#);
        let cmd = ValidationApiCommand::new(
            "compare",
            ValidationCheck::Compare {
                payload: serde_json::json!({}),
            },
        );
        assert!(cmd.run(&ctx_with(net)).await.expect("run").success);
    }
}
