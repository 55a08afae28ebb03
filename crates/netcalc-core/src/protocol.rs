//! Line-oriented wire protocol.
//!
//! Every message is one UTF-8 line terminated by `\n`.
//!
//! ```text
//! request:  <op> <left> <right>\n
//! success:  <start:26 bytes><end:26 bytes><result>\n
//! error:    -<message>\n
//! ```
//!
//! Numbers use Rust's shortest round-trip `f64` formatting, which is locale
//! independent and parses back to the identical value (`inf`, `-inf` and
//! `NaN` included). Success responses need no separators because both
//! timestamps are exactly [`TS_WIDTH`] bytes wide.

use thiserror::Error;

use crate::{
    operation::{CalcError, Operation, Operator},
    timestamp::{TS_WIDTH, Timestamp, TimestampError},
};

/// First byte of every error response.
pub const ERROR_SENTINEL: char = '-';

/// Longest line, newline included, a peer may send.
pub const MAX_LINE_LEN: usize = 1024;

/// Errors from decoding a request or response line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Request did not contain exactly three fields.
    #[error("expected 3 fields (operator, left, right), found {found}")]
    FieldCount {
        /// Number of whitespace-separated fields found.
        found: usize,
    },

    /// Operator field is not a single character.
    #[error("operator must be a single character, got {0:?}")]
    InvalidOperator(String),

    /// Operand is not a decimal number.
    #[error("invalid operand {0:?}")]
    InvalidOperand(String),

    /// Success response too short to hold both timestamps.
    #[error("response truncated: {len} bytes, need at least {}", 2 * TS_WIDTH + 1)]
    Truncated {
        /// Length of the line without its terminator.
        len: usize,
    },

    /// One of the response timestamps could not be parsed.
    #[error("invalid timestamp: {0}")]
    Timestamp(#[from] TimestampError),

    /// Result field is empty or has trailing garbage.
    #[error("invalid result {0:?}")]
    InvalidResult(String),
}

/// A decoded request line.
///
/// The operator is kept as the raw symbol: an unknown symbol is a valid
/// request that fails at evaluation time, not a decoding failure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Request {
    /// Operator symbol as sent by the peer.
    pub symbol: char,
    /// Left operand.
    pub left: f64,
    /// Right operand.
    pub right: f64,
}

impl Request {
    /// Resolve the operator symbol.
    pub fn operation(&self) -> Result<Operation, CalcError> {
        let operator = Operator::try_from(self.symbol)?;
        Ok(Operation::new(operator, self.left, self.right))
    }
}

impl From<Operation> for Request {
    fn from(operation: Operation) -> Self {
        Self { symbol: operation.operator.symbol(), left: operation.left, right: operation.right }
    }
}

/// A server response.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// The operation was evaluated.
    Success {
        /// When the server read the request.
        start: Timestamp,
        /// When the server finished computing.
        end: Timestamp,
        /// Result of the operation.
        result: f64,
    },

    /// The server rejected the request.
    Error {
        /// Human-readable reason.
        message: String,
    },
}

impl Response {
    /// Build an error response.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error { message: message.into() }
    }
}

/// Encode a request line, newline included.
pub fn encode_request(operation: &Operation) -> String {
    format!("{} {} {}\n", operation.operator.symbol(), operation.left, operation.right)
}

/// Decode a request line. A trailing `\n` or `\r\n` is ignored.
///
/// The operator may be written against the left operand (`+2 3`).
pub fn decode_request(line: &str) -> Result<Request, ProtocolError> {
    let fields: Vec<&str> = strip_line_ending(line).split_ascii_whitespace().collect();
    let (symbol, left, right) = match *fields.as_slice() {
        [symbol, left, right] => (symbol, left, right),
        [glued, right] => match split_glued_operator(glued) {
            Some((symbol, left)) => (symbol, left, right),
            None => return Err(ProtocolError::FieldCount { found: 2 }),
        },
        _ => return Err(ProtocolError::FieldCount { found: fields.len() }),
    };

    let mut chars = symbol.chars();
    let (Some(symbol_char), None) = (chars.next(), chars.next()) else {
        return Err(ProtocolError::InvalidOperator(symbol.to_string()));
    };

    Ok(Request { symbol: symbol_char, left: parse_operand(left)?, right: parse_operand(right)? })
}

/// Encode a response line, newline included.
pub fn encode_response(response: &Response) -> String {
    match response {
        Response::Success { start, end, result } => format!("{start}{end}{result}\n"),
        Response::Error { message } => {
            format!("{ERROR_SENTINEL}{}\n", message.replace(['\r', '\n'], " "))
        },
    }
}

/// Decode a response line. A trailing `\n` or `\r\n` is ignored.
///
/// The first byte decides the kind: the sentinel means error whatever
/// follows. Otherwise both fixed-width timestamps are sliced off and the
/// remainder must parse as an `f64` in its entirety.
pub fn decode_response(line: &str) -> Result<Response, ProtocolError> {
    let line = strip_line_ending(line);

    if let Some(message) = line.strip_prefix(ERROR_SENTINEL) {
        return Ok(Response::Error { message: message.to_string() });
    }

    let truncated = || ProtocolError::Truncated { len: line.len() };
    let start = line.get(..TS_WIDTH).ok_or_else(truncated)?;
    let end = line.get(TS_WIDTH..2 * TS_WIDTH).ok_or_else(truncated)?;
    let result_text = line.get(2 * TS_WIDTH..).ok_or_else(truncated)?;

    let start = Timestamp::parse(start)?;
    let end = Timestamp::parse(end)?;
    let result =
        result_text.parse().map_err(|_| ProtocolError::InvalidResult(result_text.to_string()))?;

    Ok(Response::Success { start, end, result })
}

/// Split `+2` into `("+", "2")` when the rest is a number.
fn split_glued_operator(field: &str) -> Option<(&str, &str)> {
    let width = field.chars().next()?.len_utf8();
    let (symbol, left) = field.split_at(width);
    (!left.is_empty() && left.parse::<f64>().is_ok()).then_some((symbol, left))
}

fn parse_operand(field: &str) -> Result<f64, ProtocolError> {
    field.parse().map_err(|_| ProtocolError::InvalidOperand(field.to_string()))
}

fn strip_line_ending(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn stamp(micros: u32) -> Timestamp {
        Timestamp::new(1, 2, 2024, 12, 30, 45, micros).unwrap()
    }

    #[test]
    fn encode_request_uses_wire_order() {
        let operation = Operation::new(Operator::Add, 2.0, 3.5);
        assert_eq!(encode_request(&operation), "+ 2 3.5\n");
    }

    #[test]
    fn decode_request_accepts_crlf() {
        let request = decode_request("* -1.5 4\r\n").unwrap();
        assert_eq!(request, Request { symbol: '*', left: -1.5, right: 4.0 });
    }

    #[test]
    fn decode_request_keeps_unknown_symbol() {
        let request = decode_request("^ 2 3\n").unwrap();
        assert_eq!(request.symbol, '^');
        assert_eq!(request.operation(), Err(CalcError::UnknownOperator('^')));
    }

    #[test]
    fn decode_request_rejects_missing_fields() {
        assert_eq!(decode_request("+ 2\n"), Err(ProtocolError::FieldCount { found: 2 }));
        assert_eq!(decode_request("\n"), Err(ProtocolError::FieldCount { found: 0 }));
    }

    #[test]
    fn decode_request_accepts_operator_against_left_operand() {
        assert_eq!(decode_request("+2 3\n"), Ok(Request { symbol: '+', left: 2.0, right: 3.0 }));
        assert_eq!(decode_request("--1.5 2\n"), Ok(Request { symbol: '-', left: -1.5, right: 2.0 }));
        assert_eq!(decode_request("add 2\n"), Err(ProtocolError::FieldCount { found: 2 }));
    }

    #[test]
    fn decode_request_rejects_extra_fields() {
        assert_eq!(decode_request("+ 2 3 4\n"), Err(ProtocolError::FieldCount { found: 4 }));
    }

    #[test]
    fn decode_request_rejects_long_operator() {
        assert_eq!(
            decode_request("add 2 3\n"),
            Err(ProtocolError::InvalidOperator("add".to_string()))
        );
    }

    #[test]
    fn decode_request_rejects_bad_operand() {
        assert_eq!(
            decode_request("+ two 3\n"),
            Err(ProtocolError::InvalidOperand("two".to_string()))
        );
    }

    #[test]
    fn success_response_layout() {
        let response = Response::Success { start: stamp(1), end: stamp(2), result: 5.0 };
        let line = encode_response(&response);

        assert_eq!(line, "01/02/2024 12:30:45.00000101/02/2024 12:30:45.0000025\n");
        assert_eq!(decode_response(&line).unwrap(), response);
    }

    #[test]
    fn infinite_result_roundtrips() {
        let response = Response::Success { start: stamp(1), end: stamp(2), result: f64::INFINITY };
        let line = encode_response(&response);

        assert!(line.ends_with("inf\n"));
        assert_eq!(decode_response(&line).unwrap(), response);
    }

    #[test]
    fn negative_result_is_not_an_error() {
        let response = Response::Success { start: stamp(1), end: stamp(2), result: -7.25 };
        assert_eq!(decode_response(&encode_response(&response)).unwrap(), response);
    }

    #[test]
    fn sentinel_marks_error_whatever_follows() {
        let decoded = decode_response("-01/02/2024 12:30:45.0000015\n").unwrap();
        assert_eq!(decoded, Response::error("01/02/2024 12:30:45.0000015"));
    }

    #[test]
    fn error_message_newlines_are_flattened() {
        let line = encode_response(&Response::error("bad\nrequest"));
        assert_eq!(line, "-bad request\n");
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        let line = "01/02/2024 12:30:45.00000101/02/2024 12:30:45.0000025abc\n";
        assert_eq!(decode_response(line), Err(ProtocolError::InvalidResult("5abc".to_string())));
    }

    #[test]
    fn empty_result_is_rejected() {
        let line = "01/02/2024 12:30:45.00000101/02/2024 12:30:45.000002\n";
        assert_eq!(decode_response(line), Err(ProtocolError::InvalidResult(String::new())));
    }

    #[test]
    fn short_response_is_truncated() {
        assert_eq!(decode_response("12\n"), Err(ProtocolError::Truncated { len: 2 }));
    }

    #[test]
    fn non_ascii_response_does_not_panic() {
        let line = "é".repeat(40);
        assert!(decode_response(&line).is_err());
    }
}
