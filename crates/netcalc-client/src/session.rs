//! Client session state machine.
//!
//! Pure state machine - receives events, returns actions, performs no I/O.
//! The [`Client`](crate::Client) driver executes the actions and feeds the
//! outcomes back as events.
//!
//! ```text
//! Disconnected ─Start─▶ Connecting ─Connected─▶ AwaitingInput ─Input─▶ AwaitingResponse
//!                        ▲    │                      ▲                       │
//!          ConnectFailed │    │ backoff exhausted    └──── response ─────────┤
//!          (Wait, retry) └────┤                                              │
//!                             ▼                        transport failure     │
//!                           Closed ◀── InputClosed     (pending kept) ◀──────┘
//! ```
//!
//! The pending operation survives reconnects and is sent again as the first
//! line on the new connection. It is cleared only by a definitive answer.

use std::time::Duration;

use netcalc_core::{Operation, Response, Timestamp};

use crate::{backoff::Backoff, error::ClientError};

/// What to do with a success-looking response that fails to decode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UndecodablePolicy {
    /// Keep the request, reconnect and send it again.
    #[default]
    Retry,
    /// Drop the request and go back to input.
    Discard,
}

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Not started.
    Disconnected,
    /// Dialing the server, possibly between backoff waits.
    Connecting,
    /// Connected, waiting for the user.
    AwaitingInput,
    /// Request sent, waiting for the server.
    AwaitingResponse,
    /// Finished; no further events are accepted.
    Closed,
}

impl ClientState {
    fn name(self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::AwaitingInput => "AwaitingInput",
            Self::AwaitingResponse => "AwaitingResponse",
            Self::Closed => "Closed",
        }
    }
}

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Begin connecting.
    Start,
    /// The connection attempt succeeded.
    Connected,
    /// The connection attempt failed.
    ConnectFailed {
        /// Description of the failure.
        reason: String,
    },
    /// The user entered an operation.
    Input(Operation),
    /// User input reached end of file.
    InputClosed,
    /// A response line decoded.
    ResponseReceived {
        /// The decoded response.
        response: Response,
        /// Time from sending the request to reading the response.
        round_trip: Duration,
    },
    /// A response line arrived but did not decode.
    ResponseUndecodable {
        /// Description of the decoding failure.
        reason: String,
    },
    /// Sending or reading failed, or the server closed the connection.
    TransportFailed {
        /// Description of the failure.
        reason: String,
    },
}

impl ClientEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::Start => "Start",
            Self::Connected => "Connected",
            Self::ConnectFailed { .. } => "ConnectFailed",
            Self::Input(_) => "Input",
            Self::InputClosed => "InputClosed",
            Self::ResponseReceived { .. } => "ResponseReceived",
            Self::ResponseUndecodable { .. } => "ResponseUndecodable",
            Self::TransportFailed { .. } => "TransportFailed",
        }
    }
}

/// Outputs of the state machine, executed in order by the driver.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientAction {
    /// Open a connection; report `Connected` or `ConnectFailed`.
    Connect,
    /// Sleep before the next step.
    Wait(Duration),
    /// Read one operation; report `Input` or `InputClosed`.
    ReadInput,
    /// Write the request line; report `TransportFailed` only on failure.
    Send(Operation),
    /// Read one response line; report `ResponseReceived`,
    /// `ResponseUndecodable` or `TransportFailed`.
    ReadResponse,
    /// Close the current connection, if any.
    Disconnect,
    /// Add a round-trip sample to the chart.
    RecordLatency(Duration),
    /// Show a computed result.
    ShowResult {
        /// The operation that was evaluated.
        operation: Operation,
        /// Server result.
        result: f64,
        /// When the server started computing.
        start: Timestamp,
        /// When the server finished computing.
        end: Timestamp,
    },
    /// Show an error reported by the server.
    ShowServerError {
        /// Server message.
        message: String,
    },
    /// Show a status message to the user.
    Notify {
        /// Message text.
        message: String,
    },
    /// Stop the client.
    Exit,
}

/// Client session state machine.
#[derive(Debug, Clone)]
pub struct ClientSession {
    state: ClientState,
    pending: Option<Operation>,
    backoff: Backoff,
    policy: UndecodablePolicy,
    connect_attempts: u32,
}

impl ClientSession {
    /// Create a session in `Disconnected`.
    pub fn new(backoff: Backoff, policy: UndecodablePolicy) -> Self {
        Self { state: ClientState::Disconnected, pending: None, backoff, policy, connect_attempts: 0 }
    }

    /// Current state.
    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Operation awaiting a definitive response.
    pub fn pending(&self) -> Option<&Operation> {
        self.pending.as_ref()
    }

    /// Process an event and return resulting actions.
    ///
    /// # Errors
    ///
    /// - `RetriesExhausted` when the backoff ceiling is reached; the session
    ///   is then `Closed`.
    /// - `InvalidTransition` when the event does not apply to the current
    ///   state; the state is left unchanged.
    pub fn handle(&mut self, event: ClientEvent) -> Result<Vec<ClientAction>, ClientError> {
        match (self.state, event) {
            (ClientState::Disconnected, ClientEvent::Start) => {
                self.state = ClientState::Connecting;
                self.connect_attempts = 1;
                Ok(vec![ClientAction::Connect])
            },

            (ClientState::Connecting, ClientEvent::Connected) => Ok(self.handle_connected()),

            (ClientState::Connecting, ClientEvent::ConnectFailed { reason }) => {
                self.handle_connect_failed(reason)
            },

            (ClientState::AwaitingInput, ClientEvent::Input(operation)) => {
                self.pending = Some(operation);
                self.state = ClientState::AwaitingResponse;
                Ok(vec![ClientAction::Send(operation), ClientAction::ReadResponse])
            },

            (ClientState::AwaitingInput, ClientEvent::InputClosed) => {
                self.state = ClientState::Closed;
                Ok(vec![ClientAction::Disconnect, ClientAction::Exit])
            },

            (ClientState::AwaitingResponse, ClientEvent::ResponseReceived { response, round_trip }) => {
                Ok(self.handle_response(response, round_trip))
            },

            (ClientState::AwaitingResponse, ClientEvent::ResponseUndecodable { reason }) => {
                Ok(self.handle_undecodable(reason))
            },

            (ClientState::AwaitingResponse, ClientEvent::TransportFailed { reason }) => {
                Ok(self.reconnect(format!("connection lost: {reason}")))
            },

            (state, event) => {
                Err(ClientError::InvalidTransition { state: state.name(), event: event.name() })
            },
        }
    }

    fn handle_connected(&mut self) -> Vec<ClientAction> {
        self.backoff.reset();
        self.connect_attempts = 0;

        match self.pending {
            Some(operation) => {
                self.state = ClientState::AwaitingResponse;
                vec![
                    ClientAction::Notify { message: format!("reconnected, resending {operation}") },
                    ClientAction::Send(operation),
                    ClientAction::ReadResponse,
                ]
            },
            None => {
                self.state = ClientState::AwaitingInput;
                vec![ClientAction::ReadInput]
            },
        }
    }

    fn handle_connect_failed(&mut self, reason: String) -> Result<Vec<ClientAction>, ClientError> {
        match self.backoff.next_delay() {
            Some(delay) => {
                self.connect_attempts += 1;
                Ok(vec![
                    ClientAction::Notify {
                        message: format!("cannot connect ({reason}), retrying in {}s", delay.as_secs()),
                    },
                    ClientAction::Wait(delay),
                    ClientAction::Connect,
                ])
            },
            None => {
                self.state = ClientState::Closed;
                Err(ClientError::RetriesExhausted {
                    attempts: self.connect_attempts,
                    last_delay: self.backoff.last_delay(),
                })
            },
        }
    }

    fn handle_response(&mut self, response: Response, round_trip: Duration) -> Vec<ClientAction> {
        let operation = self.pending.take();
        self.state = ClientState::AwaitingInput;

        match (response, operation) {
            (Response::Success { start, end, result }, Some(operation)) => vec![
                ClientAction::RecordLatency(round_trip),
                ClientAction::ShowResult { operation, result, start, end },
                ClientAction::ReadInput,
            ],
            (Response::Success { .. }, None) => vec![
                ClientAction::Notify { message: "ignored response without a request".to_string() },
                ClientAction::ReadInput,
            ],
            (Response::Error { message }, _) => {
                vec![ClientAction::ShowServerError { message }, ClientAction::ReadInput]
            },
        }
    }

    fn handle_undecodable(&mut self, reason: String) -> Vec<ClientAction> {
        match self.policy {
            UndecodablePolicy::Retry => self.reconnect(format!("unreadable response: {reason}")),
            UndecodablePolicy::Discard => {
                self.pending = None;
                self.state = ClientState::AwaitingInput;
                vec![
                    ClientAction::Notify {
                        message: format!("unreadable response, request dropped: {reason}"),
                    },
                    ClientAction::ReadInput,
                ]
            },
        }
    }

    fn reconnect(&mut self, message: String) -> Vec<ClientAction> {
        self.state = ClientState::Connecting;
        self.connect_attempts = 1;
        vec![ClientAction::Notify { message }, ClientAction::Disconnect, ClientAction::Connect]
    }
}

impl Default for ClientSession {
    fn default() -> Self {
        Self::new(Backoff::default(), UndecodablePolicy::default())
    }
}
