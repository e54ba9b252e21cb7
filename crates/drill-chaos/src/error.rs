#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ChaosError {
    #[error("unknown chaos scenario: {name}")]
    UnknownScenario { name: String },
    #[error("scenario {name} has probability {probability}, expected a value in [0, 1]")]
    InvalidProbability { name: String, probability: f64 },
    #[error("chaos scenario {scenario} failed to install: {message}")]
    SetupFailed { scenario: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetworkError {
    #[error("request to {url} timed out after {after_ms}ms")]
    Timeout { url: String, after_ms: u64 },
    #[error("request to {url} failed: {message}")]
    Connection { url: String, message: String },
    #[error("invalid request to {url}: {message}")]
    InvalidRequest { url: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("storage quota exceeded while writing {key}")]
    QuotaExceeded { key: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("rendering context {kind} is unavailable")]
    ContextUnavailable { kind: String },
}
