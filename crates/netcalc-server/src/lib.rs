//! netcalc server.
//!
//! Accepts TCP connections and evaluates one arithmetic request per line.
//!
//! ## Architecture
//!
//! ```text
//! netcalc-server
//!   ├─ Server             (accept loop, one worker task per connection)
//!   ├─ Worker             (read → parse → compute → respond → record)
//!   ├─ ConnectionRegistry (live session table, change notification)
//!   ├─ Shutdown           (process-wide flag observed by every worker)
//!   ├─ StatusDisplay      (OS thread redrawing the session table)
//!   └─ LogBuffer          (recent log lines shown under the table)
//! ```
//!
//! Concurrency is unbounded: every accepted connection gets its own task and
//! nothing queues or sheds load.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
pub mod log_buffer;
pub mod registry;
pub mod shutdown;
pub mod status;
pub mod worker;

use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};

pub use error::ServerError;
pub use log_buffer::{LogBuffer, LogMakeWriter};
use netcalc_core::{DEFAULT_HOST, DEFAULT_PORT, Environment, SystemEnv};
pub use registry::{
    ConnectionRegistry, EntryHandle, Registration, Session, SessionId, SessionInfo, WorkerId,
};
pub use shutdown::{Shutdown, ShutdownSignal};
pub use status::{StatusDisplay, render_table};
use tokio::{net::TcpListener, task::JoinSet};
pub use worker::{Worker, WorkerExit};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to (e.g., "127.0.0.1:12345")
    pub bind_address: String,
    /// Pause after a failed `accept` before trying again
    pub accept_backoff: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: format!("{DEFAULT_HOST}:{DEFAULT_PORT}"),
            accept_backoff: Duration::from_millis(100),
        }
    }
}

/// Production netcalc server.
pub struct Server<E: Environment = SystemEnv> {
    listener: TcpListener,
    registry: Arc<ConnectionRegistry>,
    config: ServerConfig,
    env: E,
}

impl Server<SystemEnv> {
    /// Bind with the system clocks.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The bind address does not parse
    /// - Binding to the address fails
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        Self::bind_with_env(config, SystemEnv::new()).await
    }
}

impl<E: Environment> Server<E> {
    /// Bind and listen using the given environment.
    pub async fn bind_with_env(config: ServerConfig, env: E) -> Result<Self, ServerError> {
        let address: SocketAddr = config.bind_address.parse().map_err(|e| {
            ServerError::Config(format!("invalid bind address '{}': {e}", config.bind_address))
        })?;

        let listener = TcpListener::bind(address)
            .await
            .map_err(|e| ServerError::Transport(format!("failed to bind {address}: {e}")))?;

        Ok(Self { listener, registry: Arc::new(ConnectionRegistry::new()), config, env })
    }

    /// Get the local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Shared registry of live sessions.
    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        Arc::clone(&self.registry)
    }

    /// Accept connections until `shutdown` resolves.
    ///
    /// On shutdown the listener is closed first, then every worker is told to
    /// stop and joined before this returns.
    pub async fn run<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        let Self { listener, registry, config, env } = self;
        tracing::info!("server listening on {}", listener.local_addr()?);

        let stop = Shutdown::new();
        let mut workers = JoinSet::new();
        let mut next_id: u64 = 0;
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => break,

                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        next_id += 1;
                        let session = Session {
                            id: SessionId::new(next_id),
                            peer,
                            created_at: env.wall_clock(),
                        };
                        let worker = Worker::new(
                            WorkerId::new(next_id),
                            env.clone(),
                            Arc::clone(&registry),
                            stop.subscribe(),
                        );

                        tracing::debug!(%peer, session_id = next_id, "connection accepted");
                        workers.spawn(worker.run(stream, session));
                    },
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                        env.sleep(config.accept_backoff).await;
                    },
                },

                Some(joined) = workers.join_next(), if !workers.is_empty() => {
                    log_worker_join(joined);
                },
            }
        }

        drop(listener);
        tracing::info!(active = registry.len(), "shutting down, listener closed");

        for entry in registry.snapshot() {
            tracing::info!(
                peer = %entry.peer,
                session_id = entry.session_id.as_u64(),
                operations = entry.operations,
                "closing session"
            );
        }
        stop.trigger();

        while let Some(joined) = workers.join_next().await {
            log_worker_join(joined);
        }
        tracing::info!("all workers stopped");

        Ok(())
    }
}

fn log_worker_join(joined: Result<WorkerExit, tokio::task::JoinError>) {
    match joined {
        Ok(_) => {},
        Err(e) if e.is_panic() => tracing::error!("worker panicked: {}", e),
        Err(e) => tracing::warn!("worker cancelled: {}", e),
    }
}
