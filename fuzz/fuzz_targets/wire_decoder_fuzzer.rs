//! Fuzz target for the request and response line decoders
//!
//! Both decoders read lines straight off the socket, so any byte sequence a
//! peer can send must be handled without panicking.
//!
//! # Strategy
//!
//! - Raw lines: arbitrary bytes, lossily converted to UTF-8 as the reader would
//!   reject invalid sequences before decoding
//! - Near-valid lines: a real timestamp prefix followed by fuzzed bytes, to
//!   reach the slicing and float parsing paths
//!
//! # Invariants
//!
//! - NEVER panic, including on short or multi-byte input around the
//!   fixed-width timestamp boundaries
//! - A line starting with the sentinel ALWAYS decodes as an error response
//! - A decoded request re-encodes to a line that decodes to the same values
//! - A decoded success response re-encodes to the same response

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use netcalc_core::{
    protocol::{decode_request, decode_response, encode_request, encode_response, ERROR_SENTINEL},
    Response, Timestamp,
};

#[derive(Debug, Arbitrary)]
enum FuzzLine {
    Raw(Vec<u8>),
    AfterTimestamps { result: Vec<u8> },
    AfterOneTimestamp { rest: Vec<u8> },
}

fuzz_target!(|input: FuzzLine| {
    let stamp = Timestamp::new(1, 2, 2024, 3, 4, 5, 678_901).unwrap_or_else(|_| Timestamp::now());

    let line = match input {
        FuzzLine::Raw(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        FuzzLine::AfterTimestamps { result } => {
            format!("{stamp}{stamp}{}", String::from_utf8_lossy(&result))
        },
        FuzzLine::AfterOneTimestamp { rest } => {
            format!("{stamp}{}", String::from_utf8_lossy(&rest))
        },
    };

    if let Ok(request) = decode_request(&line) {
        if let Ok(operation) = request.operation() {
            let again = decode_request(&encode_request(&operation));
            let again = again.unwrap_or_else(|e| panic!("re-encoded request failed: {e}"));
            assert!(same_value(again.left, request.left));
            assert!(same_value(again.right, request.right));
            assert_eq!(again.symbol, request.symbol);
        }
    }

    match decode_response(&line) {
        Ok(Response::Error { .. }) => {},
        Ok(response @ Response::Success { result, .. }) => {
            assert!(!line.starts_with(ERROR_SENTINEL));
            if !result.is_nan() {
                let again = decode_response(&encode_response(&response));
                assert_eq!(again.ok(), Some(response));
            }
        },
        Err(_) => assert!(!line.starts_with(ERROR_SENTINEL), "sentinel line rejected: {line:?}"),
    }
});

/// Bit equality, except that every NaN matches every other NaN: the encoder
/// does not preserve the sign of NaN.
fn same_value(a: f64, b: f64) -> bool {
    a.to_bits() == b.to_bits() || (a.is_nan() && b.is_nan())
}
