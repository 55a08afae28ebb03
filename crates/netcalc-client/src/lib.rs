//! netcalc client.
//!
//! Interactive client for the netcalc server. Reads infix operations from the
//! user, sends them over TCP and shows each result with a chart of round-trip
//! times.
//!
//! # Architecture
//!
//! The client is split the same way on both sides of the wire:
//! - [`ClientSession`]: pure state machine; receives events, returns actions
//! - [`Client`]: driver executing those actions against the socket, the
//!   terminal and the chart
//!
//! # Components
//!
//! - [`Backoff`]: doubling reconnect delay with a ceiling
//! - [`LatencyChart`]: ten-row line chart of round-trip times
//! - [`parse_operation`]: infix user input parser

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod backoff;
mod chart;
mod driver;
mod error;
mod input;
mod session;

pub use backoff::{Backoff, DEFAULT_MAX_DELAY, INITIAL_DELAY};
pub use chart::{Chart, DEFAULT_COLUMNS, LatencyChart};
pub use driver::{Client, ClientConfig};
pub use error::ClientError;
pub use input::{InputError, parse_operation};
pub use netcalc_core::env::Environment;
pub use session::{ClientAction, ClientEvent, ClientSession, ClientState, UndecodablePolicy};
