//! Shared building blocks for the netcalc server and client.
//!
//! ## Architecture
//!
//! ```text
//! netcalc-core
//!   ├─ protocol     (line-oriented request/response codec)
//!   ├─ timestamp    (fixed-width wall-clock values, diffs)
//!   ├─ operation    (operators and IEEE arithmetic)
//!   ├─ env          (clock + sleep abstraction)
//!   ├─ signal       (Ctrl-C / SIGTERM future)
//!   └─ logging      (tracing subscriber with append-only log file)
//! ```
//!
//! Nothing in this crate performs socket I/O. The server and client crates own
//! their streams and use these modules to encode, decode and time messages.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod env;
pub mod logging;
pub mod operation;
pub mod protocol;
pub mod signal;
mod system_env;
pub mod timestamp;

pub use env::Environment;
pub use operation::{CalcError, Operation, Operator};
pub use protocol::{MAX_LINE_LEN, ProtocolError, Request, Response};
pub use signal::shutdown_signal;
pub use system_env::SystemEnv;
pub use timestamp::{TS_WIDTH, Timestamp, TimestampError};

/// Port used when none is given on the command line.
pub const DEFAULT_PORT: u16 = 12345;

/// Address used when none is given on the command line.
pub const DEFAULT_HOST: &str = "127.0.0.1";
