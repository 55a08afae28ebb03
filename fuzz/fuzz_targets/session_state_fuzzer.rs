//! Fuzz target for the [`ClientSession`] state machine
//!
//! Prevent a pending request from being lost or duplicated across reconnects
//!
//! # Strategy
//!
//! - Event sequences: Arbitrary sequences of connects, failures, user input
//!   and responses, valid or not for the current state
//! - Policies: both undecodable-response policies
//! - Backoff: small ceilings so exhaustion is reached quickly
//!
//! # Invariants
//!
//! - No transition FROM `Closed` state (terminal invariant)
//! - A rejected event leaves the state unchanged, unless backoff is exhausted
//! - The pending request is cleared ONLY by a decoded response, or by an
//!   undecodable one under `Discard`
//! - After reconnecting with a pending request, the first `Send` is that
//!   request
//! - Every `Wait` is within the backoff ceiling
//! - NEVER panic on an unexpected event

#![no_main]

use std::time::Duration;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use netcalc_client::{
    Backoff, ClientAction, ClientError, ClientEvent, ClientSession, ClientState, UndecodablePolicy,
};
use netcalc_core::{Operation, Operator, Response, Timestamp};

#[derive(Debug, Clone, Arbitrary)]
enum FuzzEvent {
    Start,
    Connected,
    ConnectFailed,
    Input { operator: u8, left: f64, right: f64 },
    InputClosed,
    Success { result: f64, round_trip_ms: u16 },
    ServerError,
    Undecodable,
    TransportFailed,
}

/// Fuzz input.
#[derive(Debug, Clone, Arbitrary)]
struct FuzzInput {
    /// Use `Discard` instead of `Retry`.
    discard: bool,
    /// Backoff ceiling in milliseconds (initial delay is 1 ms).
    ceiling_ms: u8,
    /// Event sequence to process.
    events: Vec<FuzzEvent>,
}

fuzz_target!(|input: FuzzInput| {
    let policy = if input.discard { UndecodablePolicy::Discard } else { UndecodablePolicy::Retry };
    let ceiling = Duration::from_millis(u64::from(input.ceiling_ms));
    let mut session = ClientSession::new(Backoff::new(Duration::from_millis(1), ceiling), policy);
    let stamp = Timestamp::now();

    for event in input.events {
        let previous_state = session.state();
        let previous_pending = session.pending().copied();

        let event = match event {
            FuzzEvent::Start => ClientEvent::Start,
            FuzzEvent::Connected => ClientEvent::Connected,
            FuzzEvent::ConnectFailed => ClientEvent::ConnectFailed { reason: "refused".to_string() },
            FuzzEvent::Input { operator, left, right } => {
                let operator = Operator::ALL[usize::from(operator) % Operator::ALL.len()];
                ClientEvent::Input(Operation::new(operator, left, right))
            },
            FuzzEvent::InputClosed => ClientEvent::InputClosed,
            FuzzEvent::Success { result, round_trip_ms } => ClientEvent::ResponseReceived {
                response: Response::Success { start: stamp, end: stamp, result },
                round_trip: Duration::from_millis(u64::from(round_trip_ms)),
            },
            FuzzEvent::ServerError => ClientEvent::ResponseReceived {
                response: Response::error("rejected"),
                round_trip: Duration::ZERO,
            },
            FuzzEvent::Undecodable => {
                ClientEvent::ResponseUndecodable { reason: "truncated".to_string() }
            },
            FuzzEvent::TransportFailed => {
                ClientEvent::TransportFailed { reason: "reset".to_string() }
            },
        };
        let is_response = matches!(event, ClientEvent::ResponseReceived { .. });
        let is_undecodable = matches!(event, ClientEvent::ResponseUndecodable { .. });
        let is_connected = matches!(event, ClientEvent::Connected);

        match session.handle(event) {
            Ok(actions) => {
                assert_ne!(previous_state, ClientState::Closed, "Closed must be terminal");

                for action in &actions {
                    if let ClientAction::Wait(delay) = action {
                        assert!(*delay <= ceiling, "waited {delay:?} past ceiling {ceiling:?}");
                    }
                }

                let cleared = previous_pending.is_some() && session.pending().is_none();
                if cleared {
                    assert!(
                        is_response || (is_undecodable && input.discard),
                        "pending request lost without a definitive response"
                    );
                }

                if is_connected {
                    if let Some(pending) = previous_pending {
                        let first_send = actions.iter().find_map(|a| match a {
                            ClientAction::Send(operation) => Some(*operation),
                            _ => None,
                        });
                        let first_send = first_send.map(|op| (op.operator, op.left.to_bits(), op.right.to_bits()));
                        let expected = (pending.operator, pending.left.to_bits(), pending.right.to_bits());
                        assert_eq!(first_send, Some(expected), "pending request not resent first");
                    }
                }
            },
            Err(ClientError::RetriesExhausted { .. }) => {
                assert_eq!(previous_state, ClientState::Connecting);
                assert_eq!(session.state(), ClientState::Closed);
            },
            Err(_) => {
                assert_eq!(session.state(), previous_state, "rejected event changed state");
            },
        }
    }

    if session.state() == ClientState::Closed {
        assert!(session.handle(ClientEvent::Start).is_err());
        assert!(session.handle(ClientEvent::Connected).is_err());
        assert_eq!(session.state(), ClientState::Closed);
    }
});
