// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire protocol between nxd and its clients
//!
//! Each message is a 4-byte big-endian length followed by a JSON body. A
//! connection carries one request and one response.

use std::time::Duration;

use nx_core::{
    BuildId, LeaseId, NexusError, OperationKey, OrderingView, Outcome, RequestId, SetOrdering,
    TaskLease, TaskResponse,
};
use nx_engine::{CancelOutcome, OperationInfo, OperationResult, StartRequest, StartResponse};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Bumped on incompatible wire changes
pub const PROTOCOL_VERSION: &str = "1";

/// Read/write timeout for one message
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Largest accepted message body
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("connection closed")]
    ConnectionClosed,

    #[error("timed out")]
    Timeout,

    #[error("message of {0} bytes exceeds the limit")]
    TooLarge(usize),

    #[error("invalid message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// How a cancel addresses its operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "by")]
pub enum CancelTarget {
    Key { key: OperationKey },
    Request {
        service: String,
        operation: String,
        request_id: RequestId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    Ping,
    Hello {
        version: String,
    },
    Status,
    Shutdown,

    Start {
        request: StartRequest,
    },
    Cancel {
        target: CancelTarget,
    },
    GetInfo {
        key: OperationKey,
    },
    GetResult {
        key: OperationKey,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        wait_ms: Option<u64>,
    },
    Complete {
        key: OperationKey,
        outcome: Outcome,
        #[serde(default)]
        build_id: Option<BuildId>,
    },

    SetOrdering {
        task_queue: String,
        ordering: SetOrdering,
    },
    GetOrdering {
        task_queue: String,
        #[serde(default)]
        max_depth: Option<usize>,
    },

    PollTask {
        task_queue: String,
        #[serde(default)]
        build_id: Option<BuildId>,
        timeout_ms: u64,
    },
    RespondTask {
        lease_id: LeaseId,
        response: TaskResponse,
        #[serde(default)]
        build_id: Option<BuildId>,
    },
    NackTask {
        lease_id: LeaseId,
        reason: String,
    },
}

impl Request {
    /// Longest time the daemon may take to answer, beyond the usual round trip
    pub fn wait_hint(&self) -> Duration {
        match self {
            Request::GetResult {
                wait_ms: Some(ms), ..
            }
            | Request::PollTask { timeout_ms: ms, .. } => Duration::from_millis(*ms),
            _ => Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    Ok,
    Pong,
    Hello {
        version: String,
    },
    Status {
        uptime_secs: u64,
        operations: usize,
        pending_tasks: usize,
        leased_tasks: usize,
        delivery_failures: usize,
    },
    ShuttingDown,

    Started {
        response: StartResponse,
    },
    Canceled {
        outcome: CancelOutcome,
    },
    Info {
        info: OperationInfo,
    },
    Result {
        result: OperationResult,
    },
    Ordering {
        revision: u64,
    },
    OrderingView {
        view: OrderingView,
    },
    Task {
        lease: Option<TaskLease>,
    },

    Error {
        kind: String,
        message: String,
    },
}

impl From<NexusError> for Response {
    fn from(err: NexusError) -> Self {
        Response::Error {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// Serialize to JSON bytes (no length prefix)
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, ProtocolError> {
    Ok(serde_json::to_vec(message)?)
}

pub fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, ProtocolError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Read one length-prefixed message
pub async fn read_message<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, ProtocolError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(ProtocolError::ConnectionClosed)
        }
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::TooLarge(len));
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Write one length-prefixed message
pub async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    data: &[u8],
) -> Result<(), ProtocolError> {
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::TooLarge(data.len()));
    }
    let len = data.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(data).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_request<R: AsyncRead + Unpin>(
    reader: &mut R,
    timeout: Duration,
) -> Result<Request, ProtocolError> {
    let bytes = tokio::time::timeout(timeout, read_message(reader))
        .await
        .map_err(|_| ProtocolError::Timeout)??;
    decode(&bytes)
}

pub async fn write_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    response: &Response,
    timeout: Duration,
) -> Result<(), ProtocolError> {
    let bytes = encode(response)?;
    tokio::time::timeout(timeout, write_message(writer, &bytes))
        .await
        .map_err(|_| ProtocolError::Timeout)?
}

/// Client side: send `request` and wait for the answer
pub async fn call<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut S,
    request: &Request,
    timeout: Duration,
) -> Result<Response, ProtocolError> {
    let bytes = encode(request)?;
    tokio::time::timeout(timeout, write_message(stream, &bytes))
        .await
        .map_err(|_| ProtocolError::Timeout)??;

    let wait = timeout + request.wait_hint();
    let bytes = tokio::time::timeout(wait, read_message(stream))
        .await
        .map_err(|_| ProtocolError::Timeout)??;
    decode(&bytes)
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
