//! I/O driver for [`ClientSession`].
//!
//! Executes the session's actions against a TCP connection, the user's input
//! and output streams and a [`Chart`], then feeds each outcome back as the
//! next event. Every event replaces whatever actions were still queued.

use std::{collections::VecDeque, future::Future, time::Duration};

use netcalc_core::{
    Environment, MAX_LINE_LEN, Operation, Timestamp,
    protocol::{decode_response, encode_request},
    timestamp::{diff, format_duration},
};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    net::TcpStream,
};

use crate::{
    backoff::{Backoff, DEFAULT_MAX_DELAY, INITIAL_DELAY},
    chart::Chart,
    error::ClientError,
    input::{InputError, parse_operation},
    session::{ClientAction, ClientEvent, ClientSession, UndecodablePolicy},
};

const PROMPT: &str = "\nTo exit, press CTRL+D\nNext operation: ";

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address (e.g., "127.0.0.1:12345")
    pub server_address: String,
    /// First reconnect delay
    pub backoff_initial: Duration,
    /// Give up once the next delay would exceed this
    pub backoff_ceiling: Duration,
    /// Handling of responses that fail to decode
    pub undecodable: UndecodablePolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_address: format!("{}:{}", netcalc_core::DEFAULT_HOST, netcalc_core::DEFAULT_PORT),
            backoff_initial: INITIAL_DELAY,
            backoff_ceiling: DEFAULT_MAX_DELAY,
            undecodable: UndecodablePolicy::default(),
        }
    }
}

/// Interactive calculator client.
///
/// # Type Parameters
///
/// - `E`: Environment for clocks and backoff sleeps
/// - `I`: user input, one operation per line
/// - `O`: user output
/// - `C`: chart fed with round-trip times
pub struct Client<E, I, O, C> {
    config: ClientConfig,
    env: E,
    input: I,
    output: O,
    chart: C,
    session: ClientSession,
    connection: Option<BufReader<TcpStream>>,
    sent_at: Option<std::time::Instant>,
}

impl<E, I, O, C> Client<E, I, O, C>
where
    E: Environment,
    I: AsyncBufRead + Unpin,
    O: AsyncWrite + Unpin,
    C: Chart,
{
    /// Create a client; nothing happens until [`Client::run`].
    pub fn new(config: ClientConfig, env: E, input: I, output: O, chart: C) -> Self {
        let backoff = Backoff::new(config.backoff_initial, config.backoff_ceiling);
        let session = ClientSession::new(backoff, config.undecodable);
        Self { config, env, input, output, chart, session, connection: None, sent_at: None }
    }

    /// The chart with every recorded round trip.
    pub fn chart(&self) -> &C {
        &self.chart
    }

    /// The underlying state machine.
    pub fn session(&self) -> &ClientSession {
        &self.session
    }

    /// The user output stream.
    pub fn output(&self) -> &O {
        &self.output
    }

    /// Run until user input ends or a fatal error occurs.
    pub async fn run(&mut self) -> Result<(), ClientError> {
        let mut queue: VecDeque<ClientAction> = self.session.handle(ClientEvent::Start)?.into();

        while let Some(action) = queue.pop_front() {
            if action == ClientAction::Exit {
                tracing::info!("input closed, exiting");
                return Ok(());
            }
            if let Some(event) = self.execute(action).await? {
                queue = self.session.handle(event)?.into();
            }
        }
        Ok(())
    }

    /// Like [`Client::run`], but stop early when `shutdown` resolves.
    ///
    /// Interruption cancels whatever the client is waiting on: a backoff
    /// sleep, user input, or the server's response.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<(), ClientError>
    where
        F: Future<Output = ()>,
    {
        let finished = tokio::select! {
            result = self.run() => Some(result),
            () = shutdown => None,
        };

        match finished {
            Some(result) => result,
            None => {
                tracing::info!(pending = ?self.session.pending(), "interrupted");
                self.disconnect().await;
                self.print("\nInterrupted, closing...\n").await
            },
        }
    }

    async fn execute(&mut self, action: ClientAction) -> Result<Option<ClientEvent>, ClientError> {
        match action {
            ClientAction::Connect => Ok(Some(self.connect().await)),
            ClientAction::Wait(delay) => {
                self.env.sleep(delay).await;
                Ok(None)
            },
            ClientAction::ReadInput => self.read_input().await.map(Some),
            ClientAction::Send(operation) => Ok(self.send(&operation).await),
            ClientAction::ReadResponse => Ok(Some(self.read_response().await)),
            ClientAction::Disconnect => {
                self.disconnect().await;
                Ok(None)
            },
            ClientAction::RecordLatency(round_trip) => {
                self.chart.update(round_trip);
                Ok(None)
            },
            ClientAction::ShowResult { operation, result, start, end } => {
                self.show_result(&operation, result, &start, &end).await?;
                Ok(None)
            },
            ClientAction::ShowServerError { message } => {
                tracing::warn!(message = %message, "server rejected request");
                self.print(&format!("[ERROR] {message}\n")).await?;
                Ok(None)
            },
            ClientAction::Notify { message } => {
                tracing::info!("{}", message);
                self.print(&format!("{message}\n")).await?;
                Ok(None)
            },
            ClientAction::Exit => Ok(None),
        }
    }

    async fn connect(&mut self) -> ClientEvent {
        let address = &self.config.server_address;
        match TcpStream::connect(address).await {
            Ok(stream) => {
                tracing::info!(%address, "connected");
                self.connection = Some(BufReader::new(stream));
                ClientEvent::Connected
            },
            Err(e) => {
                let reason = e.to_string();
                let err = ClientError::Connect { address: address.clone(), reason: reason.clone() };
                tracing::warn!(error = %err, "connect failed");
                ClientEvent::ConnectFailed { reason }
            },
        }
    }

    async fn read_input(&mut self) -> Result<ClientEvent, ClientError> {
        let mut line = String::new();
        loop {
            self.print(PROMPT).await?;

            line.clear();
            if self.input.read_line(&mut line).await? == 0 {
                self.print("Closing...\n").await?;
                return Ok(ClientEvent::InputClosed);
            }

            match parse_operation(&line) {
                Ok(operation) => return Ok(ClientEvent::Input(operation)),
                Err(InputError::Empty) => {},
                Err(e) => self.print(&format!("Invalid input ({e}), try again.\n")).await?,
            }
        }
    }

    /// Returns an event only when sending failed.
    async fn send(&mut self, operation: &Operation) -> Option<ClientEvent> {
        let Some(connection) = self.connection.as_mut() else {
            return Some(transport_failed("not connected".to_string()));
        };

        let line = encode_request(operation);
        let stream = connection.get_mut();
        let written = async {
            stream.write_all(line.as_bytes()).await?;
            stream.flush().await
        };
        if let Err(e) = written.await {
            return Some(transport_failed(e.to_string()));
        }

        self.sent_at = Some(self.env.now());
        tracing::debug!(request = line.trim_end(), "request sent");
        None
    }

    async fn read_response(&mut self) -> ClientEvent {
        let Some(connection) = self.connection.as_mut() else {
            return transport_failed("not connected".to_string());
        };

        let mut line = String::new();
        let read = connection.take(MAX_LINE_LEN as u64).read_line(&mut line).await;
        let round_trip =
            self.sent_at.map_or(Duration::ZERO, |sent| self.env.now().saturating_duration_since(sent));

        match read {
            Ok(0) => transport_failed("server closed the connection".to_string()),
            Ok(n) if !line.ends_with('\n') && n >= MAX_LINE_LEN => {
                transport_failed(format!("response line exceeds {MAX_LINE_LEN} bytes"))
            },
            Ok(_) if !line.ends_with('\n') => {
                transport_failed("connection closed mid-response".to_string())
            },
            Ok(_) => match decode_response(&line) {
                Ok(response) => {
                    tracing::debug!(?round_trip, "response received");
                    ClientEvent::ResponseReceived { response, round_trip }
                },
                Err(e) => {
                    let err = ClientError::from(e);
                    tracing::warn!(line = line.trim_end(), error = %err, "undecodable response");
                    ClientEvent::ResponseUndecodable { reason: err.to_string() }
                },
            },
            Err(e) => transport_failed(e.to_string()),
        }
    }

    async fn disconnect(&mut self) {
        if let Some(connection) = self.connection.take() {
            let _ = connection.into_inner().shutdown().await;
            tracing::debug!("disconnected");
        }
        self.sent_at = None;
    }

    async fn show_result(
        &mut self,
        operation: &Operation,
        result: f64,
        start: &Timestamp,
        end: &Timestamp,
    ) -> Result<(), ClientError> {
        let server_time = format_duration(diff(start, end));
        tracing::info!(request = %operation, result, start = %start, end = %end, "result received");

        let text = format!(
            "{}\n{operation} = {result}\nstarted {start}, finished {end} (server time {server_time})\n",
            self.chart.render()
        );
        self.print(&text).await
    }

    async fn print(&mut self, text: &str) -> Result<(), ClientError> {
        self.output.write_all(text.as_bytes()).await?;
        self.output.flush().await?;
        Ok(())
    }
}

fn transport_failed(reason: String) -> ClientEvent {
    tracing::warn!(error = %ClientError::Transport { reason: reason.clone() }, "connection lost");
    ClientEvent::TransportFailed { reason }
}
