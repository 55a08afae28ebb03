//! Parsing of user-typed operations.
//!
//! The user writes infix `LEFT OP RIGHT`, with or without spaces:
//! `2 + 3`, `2*3`, `-1.5 / 2e3`, `4--2`.

use netcalc_core::{CalcError, Operation, Operator};
use thiserror::Error;

/// Why a line of user input was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    /// Nothing but whitespace.
    #[error("empty input")]
    Empty,

    /// The left operand is not a number.
    #[error("expected a number at '{0}'")]
    InvalidLeft(String),

    /// Nothing follows the left operand.
    #[error("missing operator")]
    MissingOperator,

    /// The operator is not one of `+ - * /`.
    #[error(transparent)]
    Operator(#[from] CalcError),

    /// The right operand is missing or not a number.
    #[error("invalid right operand '{0}'")]
    InvalidRight(String),
}

/// Parse one line of user input into an operation.
pub fn parse_operation(line: &str) -> Result<Operation, InputError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(InputError::Empty);
    }

    let split = number_prefix_len(line);
    let left = line[..split].parse::<f64>().map_err(|_| InputError::InvalidLeft(line.to_string()))?;

    let rest = line[split..].trim_start();
    let symbol = rest.chars().next().ok_or(InputError::MissingOperator)?;
    let operator = Operator::try_from(symbol)?;

    let right_text = rest[symbol.len_utf8()..].trim();
    let right =
        right_text.parse::<f64>().map_err(|_| InputError::InvalidRight(right_text.to_string()))?;

    Ok(Operation::new(operator, left, right))
}

/// Length of the leading float literal: sign, digits, fraction, exponent, or
/// `inf`/`infinity`/`nan`.
fn number_prefix_len(s: &str) -> usize {
    let bytes = s.as_bytes();
    let mut i = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));

    for word in ["infinity", "inf", "nan"] {
        if s.get(i..i + word.len()).is_some_and(|w| w.eq_ignore_ascii_case(word)) {
            return i + word.len();
        }
    }

    while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
        i += 1;
    }

    if matches!(bytes.get(i), Some(b'e' | b'E')) {
        let mut j = i + 1;
        if matches!(bytes.get(j), Some(b'+' | b'-')) {
            j += 1;
        }
        let digits_start = j;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if j > digits_start {
            i = j;
        }
    }
    i
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn op(operator: Operator, left: f64, right: f64) -> Operation {
        Operation::new(operator, left, right)
    }

    #[test]
    fn spaced_infix() {
        assert_eq!(parse_operation("2 + 3"), Ok(op(Operator::Add, 2.0, 3.0)));
        assert_eq!(parse_operation("  10 / 4 \n"), Ok(op(Operator::Div, 10.0, 4.0)));
    }

    #[test]
    fn compact_infix() {
        assert_eq!(parse_operation("2*3"), Ok(op(Operator::Mul, 2.0, 3.0)));
        assert_eq!(parse_operation("4--2"), Ok(op(Operator::Sub, 4.0, -2.0)));
        assert_eq!(parse_operation("-1-1"), Ok(op(Operator::Sub, -1.0, 1.0)));
    }

    #[test]
    fn exponents_and_fractions() {
        assert_eq!(parse_operation("-1.5 / 2e3"), Ok(op(Operator::Div, -1.5, 2000.0)));
        assert_eq!(parse_operation("1e-3+.5"), Ok(op(Operator::Add, 0.001, 0.5)));
    }

    #[test]
    fn special_values() {
        let parsed = parse_operation("inf * 0").unwrap();
        assert_eq!(parsed.left, f64::INFINITY);

        let parsed = parse_operation("-Infinity+1").unwrap();
        assert_eq!(parsed.left, f64::NEG_INFINITY);
    }

    #[test]
    fn exponent_without_digits_is_not_consumed() {
        // "2e" is not a number, so 'e' is read as the operator
        assert_eq!(parse_operation("2e 3"), Err(InputError::Operator(CalcError::UnknownOperator('e'))));
    }

    #[test]
    fn unknown_operator_is_rejected() {
        assert_eq!(parse_operation("2 ^ 3"), Err(InputError::Operator(CalcError::UnknownOperator('^'))));
    }

    #[test]
    fn malformed_input() {
        assert_eq!(parse_operation("   "), Err(InputError::Empty));
        assert_eq!(parse_operation("2"), Err(InputError::MissingOperator));
        assert!(matches!(parse_operation("abc + 1"), Err(InputError::InvalidLeft(_))));
        assert!(matches!(parse_operation("2 +"), Err(InputError::InvalidRight(_))));
        assert!(matches!(parse_operation("2 + 3 + 4"), Err(InputError::InvalidRight(_))));
    }
}
