//! Ports the system under test depends on.
//!
//! Faults are injected by wrapping these traits (see `adapters`) instead of
//! patching process-wide state, so every run receives its own fault-aware
//! implementations through dependency injection.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{NetworkError, RenderError, StorageError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub body: Option<serde_json::Value>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            body: None,
        }
    }

    pub fn post_json(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            body: Some(body),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

#[async_trait]
pub trait NetworkPort: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, NetworkError>;
}

pub trait StoragePort: Send + Sync {
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn get_item(&self, key: &str) -> Option<String>;
    fn remove_item(&self, key: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextKind {
    Canvas2d,
    Webgl,
    Webgl2,
}

impl ContextKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ContextKind::Canvas2d => "2d",
            ContextKind::Webgl => "webgl",
            ContextKind::Webgl2 => "webgl2",
        }
    }

    pub fn is_gpu(self) -> bool {
        matches!(self, ContextKind::Webgl | ContextKind::Webgl2)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderContext {
    pub kind: ContextKind,
    pub max_texture_size: u32,
}

pub trait RenderPort: Send + Sync {
    fn create_context(&self, kind: ContextKind) -> Result<RenderContext, RenderError>;
}

pub trait ClockPort: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory key/value storage with an optional byte quota.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: Mutex<HashMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            items: Mutex::new(HashMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }

    pub fn used_bytes(&self) -> usize {
        lock(&self.items)
            .iter()
            .map(|(key, value)| key.len() + value.len())
            .sum()
    }
}

impl StoragePort for MemoryStorage {
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut items = lock(&self.items);
        if let Some(quota) = self.quota_bytes {
            let existing = items.get(key).map_or(0, |old| key.len() + old.len());
            let used: usize = items.iter().map(|(k, v)| k.len() + v.len()).sum();
            if used - existing + key.len() + value.len() > quota {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                });
            }
        }
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get_item(&self, key: &str) -> Option<String> {
        lock(&self.items).get(key).cloned()
    }

    fn remove_item(&self, key: &str) {
        lock(&self.items).remove(key);
    }
}

/// Renderer that hands out every context kind it is configured for.
#[derive(Debug, Clone)]
pub struct HeadlessRender {
    pub gpu_available: bool,
    pub max_texture_size: u32,
}

impl Default for HeadlessRender {
    fn default() -> Self {
        Self {
            gpu_available: true,
            max_texture_size: 4096,
        }
    }
}

impl RenderPort for HeadlessRender {
    fn create_context(&self, kind: ContextKind) -> Result<RenderContext, RenderError> {
        if kind.is_gpu() && !self.gpu_available {
            return Err(RenderError::ContextUnavailable {
                kind: kind.as_str().to_string(),
            });
        }
        Ok(RenderContext {
            kind,
            max_texture_size: self.max_texture_size,
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl ClockPort for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
