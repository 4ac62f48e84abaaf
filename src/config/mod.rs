//! Typed configuration from environment variables and an optional TOML file.
//!
//! Loads once at startup, fails fast on malformed values. Values from the
//! environment win over values from the file.

use crate::error::{Error, Result};
use crate::worker::DEFAULT_LATCH_REASON;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub log_level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otel_endpoint: Option<String>,
    pub coordinator_thread_name: String,
    pub worker_thread_name: String,
    /// Reason shown on the heavy-work latch while a task runs.
    pub latch_reason: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            otel_endpoint: None,
            coordinator_thread_name: "taskq-coordinator".to_string(),
            worker_thread_name: "taskq-worker".to_string(),
            latch_reason: DEFAULT_LATCH_REASON.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables over the defaults.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides()
    }

    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| Error::Config(format!("bad config: {e}")))?;
        config.validate()
    }

    /// Load a TOML file, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read config {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)?.with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Result<Self> {
        if let Some(level) = optional_var("TASKQ_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(endpoint) = optional_var("OTEL_ENDPOINT") {
            self.otel_endpoint = Some(endpoint);
        }
        if let Some(name) = optional_var("TASKQ_COORDINATOR_THREAD") {
            self.coordinator_thread_name = name;
        }
        if let Some(name) = optional_var("TASKQ_WORKER_THREAD") {
            self.worker_thread_name = name;
        }
        if let Some(reason) = optional_var("TASKQ_LATCH_REASON") {
            self.latch_reason = reason;
        }
        self.validate()
    }

    fn validate(self) -> Result<Self> {
        if self.log_level.trim().is_empty() {
            return Err(Error::Config("log_level must not be empty".to_string()));
        }
        if self.coordinator_thread_name.trim().is_empty() {
            return Err(Error::Config(
                "coordinator_thread_name must not be empty".to_string(),
            ));
        }
        if self.worker_thread_name.trim().is_empty() {
            return Err(Error::Config(
                "worker_thread_name must not be empty".to_string(),
            ));
        }
        if self.coordinator_thread_name == self.worker_thread_name {
            return Err(Error::Config(format!(
                "coordinator and worker threads must have different names, both are {:?}",
                self.worker_thread_name
            )));
        }
        Ok(self)
    }
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok()
}
