// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operation registry
//!
//! Maps `(service, operation)` to a [`HandlerDescriptor`]. The registry is
//! assembled once from configuration and never mutated afterwards, so it can
//! be shared behind an `Arc` and resolved from any thread without locking.

use crate::config::{OperationConfig, ServiceConfig};
use crate::error::NexusError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// A single verb a handler may or may not support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    StartSync,
    StartAsync,
    Cancel,
    FetchInfo,
    FetchResult,
}

/// Optional verbs of an asynchronous handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsyncCapabilities {
    pub cancel: bool,
    pub fetch_info: bool,
    pub fetch_result: bool,
}

impl Default for AsyncCapabilities {
    fn default() -> Self {
        Self {
            cancel: true,
            fetch_info: true,
            fetch_result: true,
        }
    }
}

/// How a handler serves Start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum HandlerKind {
    /// Accepted on enqueue; the caller never receives a result inline
    FireAndForget,
    /// Always returns an inline result
    Sync,
    /// May accept the work and finish it later
    Async(AsyncCapabilities),
}

impl HandlerKind {
    pub fn supports(&self, capability: Capability) -> bool {
        match self {
            HandlerKind::FireAndForget => {
                matches!(capability, Capability::StartAsync | Capability::FetchInfo)
            }
            HandlerKind::Sync => matches!(
                capability,
                Capability::StartSync | Capability::FetchInfo | Capability::FetchResult
            ),
            HandlerKind::Async(caps) => match capability {
                Capability::StartSync | Capability::StartAsync => true,
                Capability::Cancel => caps.cancel,
                Capability::FetchInfo => caps.fetch_info,
                Capability::FetchResult => caps.fetch_result,
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HandlerKind::FireAndForget => "fire_and_forget",
            HandlerKind::Sync => "sync",
            HandlerKind::Async(_) => "async",
        }
    }
}

/// Capability descriptor for one registered operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerDescriptor {
    pub service: String,
    pub operation: String,
    pub task_queue: String,
    pub kind: HandlerKind,
}

impl HandlerDescriptor {
    pub fn new(
        service: impl Into<String>,
        operation: impl Into<String>,
        task_queue: impl Into<String>,
        kind: HandlerKind,
    ) -> Self {
        Self {
            service: service.into(),
            operation: operation.into(),
            task_queue: task_queue.into(),
            kind,
        }
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.kind.supports(capability)
    }

    /// Fail with `Unsupported` unless the handler offers `capability`
    pub fn require(&self, capability: Capability) -> Result<(), NexusError> {
        if self.supports(capability) {
            Ok(())
        } else {
            Err(NexusError::Unsupported(format!(
                "{}/{} does not support {:?}",
                self.service, self.operation, capability
            )))
        }
    }
}

/// Errors while assembling a registry
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("operation {service}/{operation} registered twice")]
    Duplicate { service: String, operation: String },
    #[error("operation {service}/{operation} has an empty {field}")]
    Empty {
        service: String,
        operation: String,
        field: &'static str,
    },
}

/// Immutable (service, operation) -> handler table
#[derive(Debug, Clone, Default)]
pub struct Registry {
    handlers: HashMap<(String, String), Arc<HandlerDescriptor>>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Build a registry from `[[services]]` configuration
    pub fn from_config(services: &[ServiceConfig]) -> Result<Self, RegistryError> {
        let mut builder = Self::builder();
        for service in services {
            for op in &service.operations {
                builder = builder.register(descriptor_from_config(&service.name, op))?;
            }
        }
        Ok(builder.build())
    }

    pub fn resolve(
        &self,
        service: &str,
        operation: &str,
    ) -> Result<Arc<HandlerDescriptor>, NexusError> {
        self.handlers
            .get(&(service.to_string(), operation.to_string()))
            .cloned()
            .ok_or_else(|| NexusError::NotFound(format!("operation {}/{}", service, operation)))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// All distinct task queues served by registered handlers
    pub fn task_queues(&self) -> Vec<String> {
        let mut queues: Vec<String> = self
            .handlers
            .values()
            .map(|d| d.task_queue.clone())
            .collect();
        queues.sort();
        queues.dedup();
        queues
    }
}

fn descriptor_from_config(service: &str, op: &OperationConfig) -> HandlerDescriptor {
    HandlerDescriptor::new(service, &op.name, &op.task_queue, op.handler_kind())
}

/// Collects descriptors before freezing them into a [`Registry`]
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    handlers: HashMap<(String, String), Arc<HandlerDescriptor>>,
}

impl RegistryBuilder {
    pub fn register(mut self, descriptor: HandlerDescriptor) -> Result<Self, RegistryError> {
        for (field, value) in [
            ("service", &descriptor.service),
            ("operation", &descriptor.operation),
            ("task_queue", &descriptor.task_queue),
        ] {
            if value.is_empty() {
                return Err(RegistryError::Empty {
                    service: descriptor.service.clone(),
                    operation: descriptor.operation.clone(),
                    field,
                });
            }
        }

        let key = (descriptor.service.clone(), descriptor.operation.clone());
        if self.handlers.contains_key(&key) {
            return Err(RegistryError::Duplicate {
                service: key.0,
                operation: key.1,
            });
        }
        self.handlers.insert(key, Arc::new(descriptor));
        Ok(self)
    }

    pub fn build(self) -> Registry {
        Registry {
            handlers: self.handlers,
        }
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
