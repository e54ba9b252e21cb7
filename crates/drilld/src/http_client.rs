use async_trait::async_trait;
use drill_chaos::{HttpMethod, HttpRequest, HttpResponse, NetworkError, NetworkPort};
use drill_core::TestResult;
use std::time::Duration;
use tokio::time::Instant;

use crate::command::{Command, CommandContext, CommandError};

/// The production [`NetworkPort`], backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestNetwork {
    client: reqwest::Client,
    timeout: Duration,
}

impl ReqwestNetwork {
    pub fn new(timeout: Duration) -> Result<Self, CommandError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(CommandError::HttpClient)?;
        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl NetworkPort for ReqwestNetwork {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, NetworkError> {
        let url = request.url.clone();
        let builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        };
        let builder = match &request.body {
            Some(body) => builder.json(body),
            None => builder,
        };

        let map_err = |err: reqwest::Error| {
            if err.is_timeout() {
                NetworkError::Timeout {
                    url: url.clone(),
                    after_ms: self.timeout.as_millis() as u64,
                }
            } else if err.is_builder() {
                NetworkError::InvalidRequest {
                    url: url.clone(),
                    message: err.to_string(),
                }
            } else {
                NetworkError::Connection {
                    url: url.clone(),
                    message: err.to_string(),
                }
            }
        };

        let response = builder.send().await.map_err(map_err)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(map_err)?;
        Ok(HttpResponse::new(status, body))
    }
}

/// GETs `path` under the base url and passes when the status matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpCheckCommand {
    pub name: String,
    pub path: String,
    pub expect_status: u16,
}

impl HttpCheckCommand {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            expect_status: 200,
        }
    }

    pub fn expecting(mut self, status: u16) -> Self {
        self.expect_status = status;
        self
    }
}

#[async_trait]
impl Command for HttpCheckCommand {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &CommandContext) -> Result<TestResult, CommandError> {
        let started = Instant::now();
        let url = ctx.url(&self.path);
        let outcome = ctx.network.send(HttpRequest::get(&url)).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let (result, status) = match outcome {
            Ok(response) if response.status == self.expect_status => {
                (TestResult::passed(&self.name, duration_ms), Some(response.status))
            }
            Ok(response) => (
                TestResult::failed(
                    &self.name,
                    duration_ms,
                    format!(
                        "GET {url} returned status {}, expected {}",
                        response.status, self.expect_status
                    ),
                ),
                Some(response.status),
            ),
            Err(err) => (TestResult::failed(&self.name, duration_ms, err.to_string()), None),
        };
        Ok(result
            .with_metadata("url", serde_json::json!(url))
            .with_metadata("status", serde_json::json!(status)))
    }
}
