//! Property-based tests for the wire codec and timestamps.

use netcalc_core::{
    Operation, Operator, Response, Timestamp,
    protocol::{decode_request, decode_response, encode_request, encode_response},
    timestamp::diff,
};
use proptest::prelude::*;

fn any_operator() -> impl Strategy<Value = Operator> {
    prop::sample::select(Operator::ALL.to_vec())
}

fn any_operand() -> impl Strategy<Value = f64> {
    prop_oneof![
        any::<f64>().prop_filter("NaN never compares equal", |v| !v.is_nan()),
        Just(f64::INFINITY),
        Just(f64::NEG_INFINITY),
        Just(0.0),
        Just(-0.0),
    ]
}

prop_compose! {
    fn any_timestamp()(
        day in 1u32..=31,
        month in 1u32..=12,
        year in 1000u32..=9999,
        hour in 0u32..24,
        minute in 0u32..60,
        second in 0u32..60,
        micros in 0u32..1_000_000,
    ) -> Timestamp {
        Timestamp::new(day, month, year, hour, minute, second, micros)
            .expect("strategy only yields valid fields")
    }
}

proptest! {
    #[test]
    fn prop_request_roundtrip(operator in any_operator(), left in any_operand(), right in any_operand()) {
        let operation = Operation::new(operator, left, right);
        let line = encode_request(&operation);
        let decoded = decode_request(&line).expect("encoded request must decode");

        // PROPERTY: encode then decode reproduces the exact triple
        prop_assert_eq!(decoded.operation(), Ok(operation));
        prop_assert_eq!(decoded.left.to_bits(), left.to_bits());
        prop_assert_eq!(decoded.right.to_bits(), right.to_bits());
    }

    #[test]
    fn prop_timestamp_roundtrip(stamp in any_timestamp()) {
        let text = stamp.to_string();

        prop_assert_eq!(text.len(), netcalc_core::TS_WIDTH);
        prop_assert_eq!(Timestamp::parse(&text), Ok(stamp));
    }

    #[test]
    fn prop_diff_with_self_is_zero(stamp in any_timestamp()) {
        prop_assert_eq!(diff(&stamp, &stamp), std::time::Duration::ZERO);
    }

    #[test]
    fn prop_diff_is_symmetric(a in any_timestamp(), b in any_timestamp()) {
        prop_assert_eq!(diff(&a, &b), diff(&b, &a));
    }

    #[test]
    fn prop_success_response_roundtrip(
        start in any_timestamp(),
        end in any_timestamp(),
        result in any_operand(),
    ) {
        let response = Response::Success { start, end, result };
        let decoded = decode_response(&encode_response(&response)).expect("encoded response must decode");

        prop_assert_eq!(decoded, response);
    }

    #[test]
    fn prop_error_response_keeps_kind(message in "[^\r\n]{0,64}") {
        let decoded = decode_response(&encode_response(&Response::error(message.clone())));

        prop_assert_eq!(decoded, Ok(Response::Error { message }));
    }

    #[test]
    fn prop_decoders_never_panic(line in "\\PC{0,120}") {
        let _ = decode_request(&line);
        let _ = decode_response(&line);
    }
}
