// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Opaque payloads and the translation seam to native values

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Metadata key naming the payload encoding
pub const ENCODING_KEY: &str = "encoding";

/// Encoding marker for JSON payloads
pub const JSON_ENCODING: &str = "json/plain";

/// Opaque bytes plus metadata headers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub data: Vec<u8>,
}

impl Payload {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            metadata: BTreeMap::new(),
            data: data.into(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Encode a serializable value as a JSON payload
    pub fn json<T: Serialize>(value: &T) -> Result<Self, PayloadError> {
        JsonPayloadConverter.to_payload(value)
    }

    /// Decode a JSON payload into a typed value
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, PayloadError> {
        JsonPayloadConverter.from_payload(self)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Errors from payload translation
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("unsupported payload encoding: {0}")]
    UnsupportedEncoding(String),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Converts between opaque payloads and native values
///
/// Treated as a pure function: `(bytes, headers) -> value` and its inverse.
pub trait PayloadConverter: Send + Sync {
    fn to_payload<T: Serialize>(&self, value: &T) -> Result<Payload, PayloadError>;

    fn from_payload<T: DeserializeOwned>(&self, payload: &Payload) -> Result<T, PayloadError>;
}

/// JSON converter, the default translation
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonPayloadConverter;

impl PayloadConverter for JsonPayloadConverter {
    fn to_payload<T: Serialize>(&self, value: &T) -> Result<Payload, PayloadError> {
        let data = serde_json::to_vec(value)?;
        Ok(Payload::new(data).with_metadata(ENCODING_KEY, JSON_ENCODING))
    }

    fn from_payload<T: DeserializeOwned>(&self, payload: &Payload) -> Result<T, PayloadError> {
        match payload.metadata.get(ENCODING_KEY).map(String::as_str) {
            // Untagged payloads are assumed to be JSON
            None | Some(JSON_ENCODING) => Ok(serde_json::from_slice(&payload.data)?),
            Some(other) => Err(PayloadError::UnsupportedEncoding(other.to_string())),
        }
    }
}

#[cfg(test)]
#[path = "payload_tests.rs"]
mod tests;
