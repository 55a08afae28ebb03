//! Arithmetic operations.
//!
//! Division follows IEEE 754: dividing by zero yields an infinity or NaN
//! rather than an error. The only failure is an operator symbol outside
//! `+ - * /`.

use std::fmt;

use thiserror::Error;

/// Errors from evaluating a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CalcError {
    /// The operator symbol is not one of `+ - * /`.
    #[error("unknown operator '{0}'")]
    UnknownOperator(char),
}

/// One of the four supported arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
}

impl Operator {
    /// All operators, in wire-symbol order.
    pub const ALL: [Self; 4] = [Self::Add, Self::Sub, Self::Mul, Self::Div];

    /// The single-character wire symbol.
    pub fn symbol(self) -> char {
        match self {
            Self::Add => '+',
            Self::Sub => '-',
            Self::Mul => '*',
            Self::Div => '/',
        }
    }

    /// Apply the operator with IEEE floating-point semantics.
    pub fn apply(self, left: f64, right: f64) -> f64 {
        match self {
            Self::Add => left + right,
            Self::Sub => left - right,
            Self::Mul => left * right,
            Self::Div => left / right,
        }
    }
}

impl TryFrom<char> for Operator {
    type Error = CalcError;

    fn try_from(symbol: char) -> Result<Self, Self::Error> {
        match symbol {
            '+' => Ok(Self::Add),
            '-' => Ok(Self::Sub),
            '*' => Ok(Self::Mul),
            '/' => Ok(Self::Div),
            other => Err(CalcError::UnknownOperator(other)),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// A single arithmetic request: `left <operator> right`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Operation {
    /// The operator.
    pub operator: Operator,
    /// Left operand.
    pub left: f64,
    /// Right operand.
    pub right: f64,
}

impl Operation {
    /// Create an operation.
    pub fn new(operator: Operator, left: f64, right: f64) -> Self {
        Self { operator, left, right }
    }

    /// Compute the result.
    pub fn evaluate(&self) -> f64 {
        self.operator.apply(self.left, self.right)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.left, self.operator, self.right)
    }
}
