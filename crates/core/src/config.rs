// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime configuration
//!
//! Loaded from TOML. Every field has a default, so an empty document is a
//! valid configuration.

use crate::registry::{AsyncCapabilities, HandlerKind};
use crate::retry::Backoff;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NexusConfig {
    pub dispatch: DispatchConfig,
    pub lifecycle: LifecycleConfig,
    pub delivery: DeliveryConfig,
    pub services: Vec<ServiceConfig>,
}

impl NexusConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: NexusConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, falling back to defaults when the file does not exist
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Io {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.dispatch.max_attempts == 0 {
            return Err(ConfigError::Invalid("dispatch.max_attempts must be > 0".into()));
        }
        if self.dispatch.max_depth == 0 {
            return Err(ConfigError::Invalid("dispatch.max_depth must be > 0".into()));
        }
        // Periods drive tokio intervals, which reject zero
        for (name, value) in [
            ("dispatch.lease_timeout", self.dispatch.lease_timeout),
            ("dispatch.tick_interval", self.dispatch.tick_interval),
            ("lifecycle.eviction_interval", self.lifecycle.eviction_interval),
        ] {
            if value.is_zero() {
                return Err(ConfigError::Invalid(format!("{name} must be > 0")));
            }
        }
        if self.lifecycle.cas_retries == 0 {
            return Err(ConfigError::Invalid("lifecycle.cas_retries must be > 0".into()));
        }
        if self.delivery.max_attempts == 0 {
            return Err(ConfigError::Invalid("delivery.max_attempts must be > 0".into()));
        }
        if self.delivery.multiplier < 1.0 {
            return Err(ConfigError::Invalid("delivery.multiplier must be >= 1.0".into()));
        }
        if self.delivery.queue_capacity == 0 {
            return Err(ConfigError::Invalid("delivery.queue_capacity must be > 0".into()));
        }
        Ok(())
    }
}

/// `[dispatch]`: task distribution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// How long a delivered task stays invisible before it is redelivered
    #[serde(with = "humantime_serde")]
    pub lease_timeout: Duration,
    /// Deliveries before a task is dead-lettered
    pub max_attempts: u32,
    /// Longest compatible chain accepted per task queue
    pub max_depth: usize,
    #[serde(with = "humantime_serde")]
    pub tick_interval: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            lease_timeout: Duration::from_secs(30),
            max_attempts: 10,
            max_depth: 32,
            tick_interval: Duration::from_secs(1),
        }
    }
}

/// `[lifecycle]`: operation state machine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// How long Start waits for the handler to accept or answer
    #[serde(with = "humantime_serde")]
    pub start_timeout: Duration,
    /// How long a dedup entry outlives its operation's terminal state
    #[serde(with = "humantime_serde")]
    pub dedup_grace: Duration,
    /// Optimistic concurrency retries before giving up with an internal error
    pub cas_retries: u32,
    #[serde(with = "humantime_serde")]
    pub eviction_interval: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            start_timeout: Duration::from_secs(10),
            dedup_grace: Duration::from_secs(600),
            cas_retries: 16,
            eviction_interval: Duration::from_secs(60),
        }
    }
}

/// `[delivery]`: callback delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    #[serde(with = "humantime_serde")]
    pub initial_backoff: Duration,
    #[serde(with = "humantime_serde")]
    pub max_backoff: Duration,
    pub multiplier: f64,
    pub max_attempts: u32,
    /// Give up once this much time has passed since the first attempt
    #[serde(with = "humantime_serde")]
    pub deadline: Duration,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    pub queue_capacity: usize,
}

impl DeliveryConfig {
    pub fn backoff(&self) -> Backoff {
        Backoff {
            initial: self.initial_backoff,
            max: self.max_backoff,
            multiplier: self.multiplier,
            max_attempts: self.max_attempts,
            deadline: self.deadline,
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(300),
            multiplier: 2.0,
            max_attempts: 8,
            deadline: Duration::from_secs(3600),
            request_timeout: Duration::from_secs(10),
            queue_capacity: 1024,
        }
    }
}

/// `[[services]]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    #[serde(default)]
    pub operations: Vec<OperationConfig>,
}

/// Handler kind as written in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfiguredKind {
    FireAndForget,
    Sync,
    Async,
}

/// `[[services.operations]]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationConfig {
    pub name: String,
    pub task_queue: String,
    pub kind: ConfiguredKind,
    #[serde(default = "enabled")]
    pub cancel: bool,
    #[serde(default = "enabled")]
    pub fetch_info: bool,
    #[serde(default = "enabled")]
    pub fetch_result: bool,
}

fn enabled() -> bool {
    true
}

impl OperationConfig {
    pub fn handler_kind(&self) -> HandlerKind {
        match self.kind {
            ConfiguredKind::FireAndForget => HandlerKind::FireAndForget,
            ConfiguredKind::Sync => HandlerKind::Sync,
            ConfiguredKind::Async => HandlerKind::Async(AsyncCapabilities {
                cancel: self.cancel,
                fetch_info: self.fetch_info,
                fetch_result: self.fetch_result,
            }),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
