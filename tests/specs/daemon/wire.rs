//! Daemon wire specs
//!
//! Start a real daemon in a temp state dir and talk to it over its socket.

use crate::prelude::*;
use nx_daemon::protocol::{self, CancelTarget, Request, Response, DEFAULT_TIMEOUT};
use nx_daemon::server::{self, ServerContext};
use nx_daemon::{lifecycle, Config, DaemonState, PROTOCOL_VERSION};
use similar_asserts::assert_eq;
use tokio::net::UnixStream;
use tokio::sync::watch;

struct Daemon {
    _dir: tempfile::TempDir,
    config: Config,
    state: DaemonState,
    ctx: Arc<ServerContext<
        nx_adapters::AllowAllGate,
        nx_adapters::LogNotifyAdapter,
        nx_core::SystemClock,
        nx_core::UuidIdGen,
    >>,
    shutdown: watch::Receiver<bool>,
}

impl Daemon {
    async fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::in_dir(dir.path());
        std::fs::write(&config.config_path, CONFIG).unwrap();
        let state = lifecycle::startup(&config).await.unwrap();
        let (tx, rx) = watch::channel(false);
        let ctx = Arc::new(ServerContext::new(state.nexus(), tx));
        Self {
            _dir: dir,
            config,
            state,
            ctx,
            shutdown: rx,
        }
    }

    /// One request over a fresh connection, serving the socket meanwhile
    async fn call(&self, request: Request) -> Response {
        let client = async {
            let mut stream = UnixStream::connect(&self.config.socket_path).await.unwrap();
            protocol::call(&mut stream, &request, DEFAULT_TIMEOUT)
                .await
                .unwrap()
        };
        tokio::select! {
            _ = server::serve(&self.state.listener, Arc::clone(&self.ctx)) => {
                panic!("server stopped accepting")
            }
            response = client => response,
        }
    }
}

#[tokio::test]
async fn daemon_answers_ping_and_hello() {
    let daemon = Daemon::start().await;

    assert_eq!(daemon.call(Request::Ping).await, Response::Pong);
    assert_eq!(
        daemon
            .call(Request::Hello {
                version: PROTOCOL_VERSION.into()
            })
            .await,
        Response::Hello {
            version: PROTOCOL_VERSION.into()
        }
    );

    daemon.state.shutdown().await.unwrap();
}

#[tokio::test]
async fn operation_lifecycle_over_the_socket() {
    let daemon = Daemon::start().await;

    let started = daemon
        .call(Request::Start {
            request: charge("order-1", "r1"),
        })
        .await;
    assert_eq!(
        started,
        Response::Started {
            response: accepted("order-1")
        }
    );

    let lease = match daemon
        .call(Request::PollTask {
            task_queue: TQ.into(),
            build_id: None,
            timeout_ms: 1_000,
        })
        .await
    {
        Response::Task { lease: Some(lease) } => lease,
        other => panic!("expected a task, got {other:?}"),
    };
    assert_eq!(lease.task.operation, charge_key("order-1"));

    let answered = daemon
        .call(Request::RespondTask {
            lease_id: lease.lease_id,
            response: TaskResponse::Accepted {
                token: "tok".into(),
            },
            build_id: None,
        })
        .await;
    assert_eq!(answered, Response::Ok);

    let canceled = daemon
        .call(Request::Cancel {
            target: CancelTarget::Key {
                key: charge_key("order-1"),
            },
        })
        .await;
    assert!(
        matches!(
            &canceled,
            Response::Canceled {
                outcome: CancelOutcome::Operation { info }
            } if info.cancel_requested
        ),
        "{canceled:?}"
    );

    match daemon.call(Request::Status).await {
        Response::Status {
            operations,
            pending_tasks,
            ..
        } => {
            assert_eq!(operations, 1);
            assert_eq!(pending_tasks, 1, "the cancel task waits for a worker");
        }
        other => panic!("expected status, got {other:?}"),
    }

    daemon.state.shutdown().await.unwrap();
}

#[tokio::test]
async fn errors_carry_a_kind() {
    let daemon = Daemon::start().await;

    let response = daemon
        .call(Request::GetInfo {
            key: OperationKey::new("orders", "refund", "x"),
        })
        .await;
    assert!(
        matches!(&response, Response::Error { kind, .. } if kind == "not_found"),
        "{response:?}"
    );

    daemon.state.shutdown().await.unwrap();
}

#[tokio::test]
async fn shutdown_request_is_acknowledged() {
    let daemon = Daemon::start().await;

    assert_eq!(daemon.call(Request::Shutdown).await, Response::ShuttingDown);
    assert!(*daemon.shutdown.borrow());

    let socket = daemon.config.socket_path.clone();
    daemon.state.shutdown().await.unwrap();
    assert!(!socket.exists());
}

#[tokio::test]
async fn operations_survive_a_daemon_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::in_dir(dir.path());
    std::fs::write(&config.config_path, CONFIG).unwrap();

    let first = lifecycle::startup(&config).await.unwrap();
    first.nexus().start(charge("order-1", "r1")).await.unwrap();
    first.shutdown().await.unwrap();

    let second = lifecycle::startup(&config).await.unwrap();
    let info = second.nexus().get_info(&charge_key("order-1")).await.unwrap();
    assert_eq!(info.state, OperationState::Pending);
    assert_eq!(second.nexus().status().queues.pending, 1);
    second.shutdown().await.unwrap();
}
