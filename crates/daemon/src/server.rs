// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Socket server and connection handling.

use std::sync::Arc;
use std::time::{Duration, Instant};

use nx_adapters::{AuthGate, NotifyAdapter};
use nx_core::{Clock, IdGen};
use nx_engine::{CancelOutcome, Nexus, PollOutcome};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::UnixListener;
use tokio::sync::watch;
use tracing::{debug, error};

use crate::protocol::{self, CancelTarget, Request, Response, DEFAULT_TIMEOUT, PROTOCOL_VERSION};

/// Shared by every connection task
pub struct ServerContext<A: AuthGate, N: NotifyAdapter, C: Clock, I: IdGen> {
    pub nexus: Arc<Nexus<A, N, C, I>>,
    pub start_time: Instant,
    /// Set to `true` when a client asks the daemon to stop
    pub shutdown: watch::Sender<bool>,
}

impl<A, N, C, I> ServerContext<A, N, C, I>
where
    A: AuthGate,
    N: NotifyAdapter,
    C: Clock,
    I: IdGen,
{
    pub fn new(nexus: Arc<Nexus<A, N, C, I>>, shutdown: watch::Sender<bool>) -> Self {
        Self {
            nexus,
            start_time: Instant::now(),
            shutdown,
        }
    }
}

/// Accept connections forever, one task per connection
pub async fn serve<A, N, C, I>(listener: &UnixListener, ctx: Arc<ServerContext<A, N, C, I>>)
where
    A: AuthGate,
    N: NotifyAdapter,
    C: Clock,
    I: IdGen,
{
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let ctx = Arc::clone(&ctx);
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(ctx, stream).await {
                        error!("Error handling connection: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {}", e);
            }
        }
    }
}

/// Handle a single client connection
pub async fn handle_connection<A, N, C, I, S>(
    ctx: Arc<ServerContext<A, N, C, I>>,
    stream: S,
) -> Result<(), ServerError>
where
    A: AuthGate,
    N: NotifyAdapter,
    C: Clock,
    I: IdGen,
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut reader, mut writer) = tokio::io::split(stream);

    let request = match protocol::read_request(&mut reader, DEFAULT_TIMEOUT).await {
        Ok(req) => req,
        Err(protocol::ProtocolError::Timeout) => {
            error!("Request read timeout");
            return Err(ServerError::Timeout);
        }
        Err(protocol::ProtocolError::ConnectionClosed) => {
            debug!("Client disconnected before sending request");
            return Ok(());
        }
        Err(e) => {
            error!("Failed to read request: {}", e);
            return Err(ServerError::Protocol(e));
        }
    };

    debug!(?request, "received request");

    let response = handle_request(&ctx, request).await;

    debug!(?response, "sending response");

    protocol::write_response(&mut writer, &response, DEFAULT_TIMEOUT)
        .await
        .map_err(ServerError::Protocol)?;

    Ok(())
}

/// Handle a single request and return a response
pub async fn handle_request<A, N, C, I>(
    ctx: &ServerContext<A, N, C, I>,
    request: Request,
) -> Response
where
    A: AuthGate,
    N: NotifyAdapter,
    C: Clock,
    I: IdGen,
{
    let nexus = &ctx.nexus;
    match request {
        Request::Ping => Response::Pong,

        Request::Hello { version: _ } => Response::Hello {
            version: PROTOCOL_VERSION.to_string(),
        },

        Request::Shutdown => {
            let _ = ctx.shutdown.send(true);
            Response::ShuttingDown
        }

        Request::Status => {
            let status = nexus.status();
            Response::Status {
                uptime_secs: ctx.start_time.elapsed().as_secs(),
                operations: status.operations,
                pending_tasks: status.queues.pending,
                leased_tasks: status.queues.leased,
                delivery_failures: status.delivery_failures,
            }
        }

        Request::Start { request } => match nexus.start(request).await {
            Ok(response) => Response::Started { response },
            Err(e) => e.into(),
        },

        Request::Cancel { target } => {
            let outcome = match target {
                CancelTarget::Key { key } => nexus
                    .cancel(&key)
                    .await
                    .map(|info| CancelOutcome::Operation { info }),
                CancelTarget::Request {
                    service,
                    operation,
                    request_id,
                } => {
                    nexus
                        .cancel_by_request(&service, &operation, &request_id)
                        .await
                }
            };
            match outcome {
                Ok(outcome) => Response::Canceled { outcome },
                Err(e) => e.into(),
            }
        }

        Request::GetInfo { key } => match nexus.get_info(&key).await {
            Ok(info) => Response::Info { info },
            Err(e) => e.into(),
        },

        Request::GetResult { key, wait_ms } => {
            match nexus.get_result(&key, wait_ms.map(Duration::from_millis)).await {
                Ok(result) => Response::Result { result },
                Err(e) => e.into(),
            }
        }

        Request::Complete {
            key,
            outcome,
            build_id,
        } => match nexus.complete(&key, outcome, build_id).await {
            Ok(info) => Response::Info { info },
            Err(e) => e.into(),
        },

        Request::SetOrdering {
            task_queue,
            ordering,
        } => match nexus.set_ordering(&task_queue, &ordering).await {
            Ok(revision) => Response::Ordering { revision },
            Err(e) => e.into(),
        },

        Request::GetOrdering {
            task_queue,
            max_depth,
        } => Response::OrderingView {
            view: nexus.get_ordering(&task_queue, max_depth),
        },

        Request::PollTask {
            task_queue,
            build_id,
            timeout_ms,
        } => {
            let timeout = Duration::from_millis(timeout_ms);
            match nexus.poll_task(&task_queue, build_id.as_ref(), timeout).await {
                PollOutcome::Task(lease) => Response::Task { lease: Some(lease) },
                PollOutcome::NoTask => Response::Task { lease: None },
            }
        }

        Request::RespondTask {
            lease_id,
            response,
            build_id,
        } => match nexus.respond_task(&lease_id, response, build_id).await {
            Ok(()) => Response::Ok,
            Err(e) => e.into(),
        },

        Request::NackTask { lease_id, reason } => {
            match nexus.nack_task(&lease_id, &reason).await {
                Ok(()) => Response::Ok,
                Err(e) => e.into(),
            }
        }
    }
}

/// Server errors
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] protocol::ProtocolError),

    #[error("Request timeout")]
    Timeout,
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
