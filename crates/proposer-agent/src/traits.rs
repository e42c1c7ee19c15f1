use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::Message;

/// Errors that can occur while invoking a text generation backend
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Failed to spawn backend process: {0}")]
    SpawnFailed(#[from] std::io::Error),

    #[error("Backend call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Backend not found at path: {0}")]
    NotFound(String),

    #[error("Backend configuration error: {0}")]
    ConfigError(String),

    #[error("Backend execution failed: {0}")]
    ExecutionFailed(String),
}

/// Per-call configuration for a backend invocation
#[derive(Debug, Clone, Default)]
pub struct BackendConfig {
    /// Working directory for process-based backends (None = inherit)
    pub working_dir: Option<PathBuf>,
    /// Optional timeout (None = no limit)
    pub timeout: Option<Duration>,
    /// Additional environment variables
    pub env_vars: HashMap<String, String>,
    /// Model to use (if the backend supports it)
    pub model: Option<String>,
    /// Sampling temperature (if the backend supports it)
    pub temperature: Option<f32>,
    /// Requested structured-output schema
    pub response_schema: Option<serde_json::Value>,
}

impl BackendConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = Some(dir);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.response_schema = Some(schema);
        self
    }

    pub fn with_env(mut self, key: String, value: String) -> Self {
        self.env_vars.insert(key, value);
        self
    }
}

/// Supported backend types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendType {
    Claude,
    OpenCode,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendType::Claude => write!(f, "claude"),
            BackendType::OpenCode => write!(f, "opencode"),
        }
    }
}

impl std::str::FromStr for BackendType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "claude" | "claude-code" | "claudecode" => Ok(BackendType::Claude),
            "opencode" | "open-code" => Ok(BackendType::OpenCode),
            _ => Err(format!("Unknown backend type: {}", s)),
        }
    }
}

/// The core abstraction for text generation.
///
/// `invoke` returns `Ok` with whatever text the backend produced, including an
/// empty string. Failures are always reported as `Err`, never as empty output.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Human-readable name of the backend (e.g., "Claude", "OpenCode")
    fn name(&self) -> &str;

    /// The backend type
    fn backend_type(&self) -> BackendType;

    /// Send an ordered list of role messages and return the generated text
    async fn invoke(
        &self,
        messages: &[Message],
        config: &BackendConfig,
    ) -> Result<String, BackendError>;

    /// Check if the backend is usable on this system
    async fn is_available(&self) -> bool;
}
