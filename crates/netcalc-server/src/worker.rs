//! Request Worker
//!
//! One worker serves one connection: read a line, evaluate it, write the
//! response, repeat.
//!
//! ## Lifecycle
//!
//! ```text
//! register ─▶ AWAITING_REQUEST ─▶ PARSING ─▶ COMPUTING ─▶ RESPONDING ─┐
//!                   ▲                                                 │
//!                   └─────────────────────────────────────────────────┘
//!             EOF / read error / long line / shutdown / write error
//!                                     │
//!                                     ▼
//!                   TERMINATED: unregister, then shut the stream down
//! ```
//!
//! Malformed requests and unknown operators are answered with an error line
//! and the loop continues. Only stream-level failures end the session.

use std::{io, sync::Arc};

use netcalc_core::{
    Environment, MAX_LINE_LEN, Response, Timestamp,
    protocol::{decode_request, encode_response},
    timestamp::{diff, format_duration},
};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::Instrument;

use crate::{
    registry::{ConnectionRegistry, Registration, Session, WorkerId},
    shutdown::ShutdownSignal,
};

/// Why a worker stopped serving its session.
#[derive(Debug, Error)]
pub enum WorkerExit {
    /// The peer closed its end.
    #[error("peer closed the connection")]
    PeerClosed,

    /// The server is shutting down.
    #[error("server shutdown")]
    Shutdown,

    /// Reading from the stream failed.
    #[error("read failed: {0}")]
    ReadFailed(#[source] io::Error),

    /// Writing or flushing the response failed.
    #[error("write failed: {0}")]
    WriteFailed(#[source] io::Error),

    /// The peer sent `MAX_LINE_LEN` bytes without a newline.
    #[error("request line exceeds {MAX_LINE_LEN} bytes")]
    LineTooLong,
}

impl WorkerExit {
    /// True for the exits that are part of normal operation.
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::PeerClosed | Self::Shutdown)
    }
}

/// Successful evaluation, logged once the response is on the wire.
struct Served {
    request: String,
    result: f64,
    start: Timestamp,
    end: Timestamp,
    operations: u64,
}

/// Per-connection request loop.
#[derive(Debug)]
pub struct Worker<E: Environment> {
    id: WorkerId,
    env: E,
    registry: Arc<ConnectionRegistry>,
    shutdown: ShutdownSignal,
}

impl<E: Environment> Worker<E> {
    /// Create a worker bound to the shared registry and shutdown flag.
    pub fn new(
        id: WorkerId,
        env: E,
        registry: Arc<ConnectionRegistry>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self { id, env, registry, shutdown }
    }

    /// Serve `session` over `stream` until it terminates.
    ///
    /// The registry entry is removed before the stream is shut down, on every
    /// path out of the loop.
    pub async fn run<S>(self, stream: S, session: Session) -> WorkerExit
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let span = tracing::info_span!(
            "session",
            peer = %session.peer,
            session_id = session.id.as_u64(),
            worker_id = self.id.as_u64(),
        );
        self.serve(stream, session).instrument(span).await
    }

    async fn serve<S>(mut self, stream: S, session: Session) -> WorkerExit
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut reader = BufReader::new(stream);
        let registration = self.registry.register_scoped(&session, self.id);
        tracing::info!(created_at = %session.created_at, "session registered");

        let exit = request_loop(&mut reader, &registration, &mut self.shutdown, &self.env).await;

        if let Some(info) = registration.release() {
            tracing::debug!(operations = info.operations, "session unregistered");
        }
        if let Err(e) = reader.into_inner().shutdown().await {
            tracing::debug!(error = %e, "stream shutdown failed");
        }

        if exit.is_clean() {
            tracing::info!(reason = %exit, "session closed");
        } else {
            tracing::warn!(reason = %exit, "session terminated");
        }
        exit
    }
}

async fn request_loop<S, E>(
    reader: &mut BufReader<S>,
    registration: &Registration<'_>,
    shutdown: &mut ShutdownSignal,
    env: &E,
) -> WorkerExit
where
    S: AsyncRead + AsyncWrite + Unpin,
    E: Environment,
{
    let mut buf = Vec::with_capacity(64);

    loop {
        buf.clear();

        let read = {
            let mut limited = (&mut *reader).take(MAX_LINE_LEN as u64);
            tokio::select! {
                biased;
                () = shutdown.wait() => return WorkerExit::Shutdown,
                read = limited.read_until(b'\n', &mut buf) => read,
            }
        };

        match read {
            Ok(0) => return WorkerExit::PeerClosed,
            Ok(n) if n >= MAX_LINE_LEN && buf.last() != Some(&b'\n') => {
                return WorkerExit::LineTooLong;
            },
            Ok(_) => {},
            Err(e) => return WorkerExit::ReadFailed(e),
        }
        if shutdown.is_triggered() {
            return WorkerExit::Shutdown;
        }

        let start = env.wall_clock();
        let (response, served) = match std::str::from_utf8(&buf) {
            Ok(line) => evaluate(line, start, registration, env),
            Err(e) => {
                tracing::warn!(error = %e, "request is not valid UTF-8");
                (Response::error(format!("malformed request: {e}")), None)
            },
        };

        let written = async {
            let inner = reader.get_mut();
            inner.write_all(encode_response(&response).as_bytes()).await?;
            inner.flush().await
        };
        if let Err(e) = written.await {
            return WorkerExit::WriteFailed(e);
        }

        if let Some(served) = served {
            tracing::info!(
                request = %served.request,
                result = served.result,
                start = %served.start,
                end = %served.end,
                elapsed = %format_duration(diff(&served.start, &served.end)),
                operations = served.operations,
                "request served"
            );
        }
        if shutdown.is_triggered() {
            return WorkerExit::Shutdown;
        }
    }
}

fn evaluate<E: Environment>(
    line: &str,
    start: Timestamp,
    registration: &Registration<'_>,
    env: &E,
) -> (Response, Option<Served>) {
    let request = match decode_request(line) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(line = line.trim_end(), error = %e, "malformed request");
            return (Response::error(format!("malformed request: {e}")), None);
        },
    };

    let operation = match request.operation() {
        Ok(operation) => operation,
        Err(e) => {
            tracing::warn!(line = line.trim_end(), error = %e, "rejected request");
            return (Response::error(e.to_string()), None);
        },
    };

    let result = operation.evaluate();
    let end = env.wall_clock();
    let operations = registration.increment();

    let request = line.trim_end().to_string();
    let served = Served { request, result, start, end, operations };
    (Response::Success { start, end, result }, Some(served))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::{net::SocketAddr, time::Duration};

    use netcalc_core::{SystemEnv, protocol::decode_response};
    use tokio::{
        io::{DuplexStream, ReadHalf, WriteHalf},
        task::JoinHandle,
    };

    use super::*;
    use crate::{registry::SessionId, shutdown::Shutdown};

    struct Harness {
        lines: tokio::io::Lines<BufReader<ReadHalf<DuplexStream>>>,
        writer: WriteHalf<DuplexStream>,
        registry: Arc<ConnectionRegistry>,
        shutdown: Shutdown,
        worker: JoinHandle<WorkerExit>,
    }

    impl Harness {
        fn start() -> Self {
            let (client, server) = tokio::io::duplex(4096);
            let registry = Arc::new(ConnectionRegistry::new());
            let shutdown = Shutdown::new();

            let worker =
                Worker::new(WorkerId::new(1), SystemEnv::new(), Arc::clone(&registry), shutdown.subscribe());
            let session = Session {
                id: SessionId::new(1),
                peer: SocketAddr::from(([127, 0, 0, 1], 50_000)),
                created_at: Timestamp::now(),
            };
            let worker = tokio::spawn(worker.run(server, session));

            let (read, writer) = tokio::io::split(client);
            Self { lines: BufReader::new(read).lines(), writer, registry, shutdown, worker }
        }

        async fn roundtrip(&mut self, request: &str) -> Response {
            self.writer.write_all(request.as_bytes()).await.unwrap();
            let line = self.lines.next_line().await.unwrap().unwrap();
            decode_response(&line).unwrap()
        }

        async fn exit(self) -> (WorkerExit, Arc<ConnectionRegistry>) {
            let exit = tokio::time::timeout(Duration::from_secs(5), self.worker).await.unwrap().unwrap();
            (exit, self.registry)
        }
    }

    fn result_of(response: &Response) -> f64 {
        match response {
            Response::Success { result, .. } => *result,
            Response::Error { message } => panic!("expected success, got error: {message}"),
        }
    }

    #[tokio::test]
    async fn addition_succeeds_and_counts() {
        let mut harness = Harness::start();

        let response = harness.roundtrip("+ 2 3\n").await;
        assert_eq!(result_of(&response), 5.0);

        let entries = harness.registry.snapshot();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].operations, 1);
    }

    #[tokio::test]
    async fn division_by_zero_is_infinite() {
        let mut harness = Harness::start();

        let response = harness.roundtrip("/ 1 0\n").await;
        assert_eq!(result_of(&response), f64::INFINITY);
    }

    #[tokio::test]
    async fn unknown_operator_keeps_connection_open() {
        let mut harness = Harness::start();

        let response = harness.roundtrip("^ 2 3\n").await;
        assert!(matches!(response, Response::Error { .. }));

        let response = harness.roundtrip("* 2 3\n").await;
        assert_eq!(result_of(&response), 6.0);
        assert_eq!(harness.registry.snapshot()[0].operations, 1);
    }

    #[tokio::test]
    async fn malformed_request_gets_error_line() {
        let mut harness = Harness::start();

        harness.writer.write_all(b"hello\n").await.unwrap();
        let line = harness.lines.next_line().await.unwrap().unwrap();
        assert!(line.starts_with('-'), "expected error line, got {line:?}");

        let response = harness.roundtrip("- 10 4\n").await;
        assert_eq!(result_of(&response), 6.0);
    }

    #[tokio::test]
    async fn peer_close_unregisters() {
        let mut harness = Harness::start();
        harness.roundtrip("+ 1 1\n").await;
        harness.writer.shutdown().await.unwrap();

        let (exit, registry) = harness.exit().await;
        assert!(matches!(exit, WorkerExit::PeerClosed));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn shutdown_interrupts_idle_read() {
        let harness = Harness::start();
        while harness.registry.is_empty() {
            tokio::task::yield_now().await;
        }

        harness.shutdown.trigger();

        let (exit, registry) = harness.exit().await;
        assert!(matches!(exit, WorkerExit::Shutdown));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn overlong_line_terminates_session() {
        let mut harness = Harness::start();
        let long = "1".repeat(MAX_LINE_LEN + 16);
        harness.writer.write_all(long.as_bytes()).await.unwrap();

        let (exit, registry) = harness.exit().await;
        assert!(matches!(exit, WorkerExit::LineTooLong));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn invalid_utf8_request_gets_error_line() {
        let mut harness = Harness::start();

        harness.writer.write_all(b"+ 2\xff 3\n").await.unwrap();
        let line = harness.lines.next_line().await.unwrap().unwrap();
        assert!(line.starts_with('-'), "expected error line, got {line:?}");

        let response = harness.roundtrip("+ 2 3\n").await;
        assert_eq!(result_of(&response), 5.0);
        assert_eq!(harness.registry.snapshot()[0].operations, 1);
    }

    #[test]
    fn clean_exits() {
        assert!(WorkerExit::PeerClosed.is_clean());
        assert!(WorkerExit::Shutdown.is_clean());
        assert!(!WorkerExit::LineTooLong.is_clean());
    }
}
