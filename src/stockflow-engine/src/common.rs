// Copyright 2025 The Stockflow Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::fmt;
use std::{error, result};

pub type Ident = String;

/// Low-level failure codes produced by the lexer, parser and binder.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NoError, // will never be produced
    InvalidToken,
    UnrecognizedEof,
    UnrecognizedToken,
    ExtraToken,
    UnclosedComment,
    UnclosedQuotedIdent,
    ExpectedNumber,
    EmptyEquation,
    BadConditionalArgs,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ErrorCode::*;
        let name = match self {
            NoError => "no_error",
            InvalidToken => "invalid_token",
            UnrecognizedEof => "unrecognized_eof",
            UnrecognizedToken => "unrecognized_token",
            ExtraToken => "extra_token",
            UnclosedComment => "unclosed_comment",
            UnclosedQuotedIdent => "unclosed_quoted_ident",
            ExpectedNumber => "expected_number",
            EmptyEquation => "empty_equation",
            BadConditionalArgs => "bad_conditional_args",
        };

        write!(f, "{}", name)
    }
}

/// An error inside a single formula, with byte offsets into its source text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EquationError {
    pub start: u32,
    pub end: u32,
    pub code: ErrorCode,
}

impl fmt::Display for EquationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}:{}", self.start, self.end, self.code)
    }
}

#[macro_export]
macro_rules! eqn_err(
    ($code:tt, $start:expr, $end:expr) => {{
        use $crate::common::{EquationError, ErrorCode};
        Err(EquationError{ start: $start as u32, end: $end as u32, code: ErrorCode::$code })
    }}
);

#[macro_export]
macro_rules! sim_err {
    ($variant:tt, $details:expr) => {{
        use $crate::common::SimulationError;
        Err(SimulationError::$variant($details))
    }};
    ($variant:tt) => {{
        use $crate::common::SimulationError;
        Err(SimulationError::$variant)
    }};
}

/// Runtime failures surfaced by the simulator.
///
/// A plan that compiled cleanly cannot produce `UnknownFunctionAtRuntime`;
/// `DivisionByZero` is only produced in strict arithmetic mode (the default
/// lets IEEE-754 infinities propagate).
#[derive(Clone, Debug, PartialEq)]
pub enum SimulationError {
    TypeError(String),
    DivisionByZero,
    UnknownFunctionAtRuntime(String),
}

impl fmt::Display for SimulationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SimulationError::TypeError(details) => write!(f, "type_error: {}", details),
            SimulationError::DivisionByZero => write!(f, "division_by_zero"),
            SimulationError::UnknownFunctionAtRuntime(name) => {
                write!(f, "unknown_function_at_runtime: {}", name)
            }
        }
    }
}

impl error::Error for SimulationError {}

pub type EquationResult<T> = result::Result<T, EquationError>;
pub type SimResult<T> = result::Result<T, SimulationError>;

/// 1-based line of a byte offset within a formula's source text.
pub fn line_of_offset(text: &str, offset: u32) -> u32 {
    let newlines = text
        .bytes()
        .take(offset as usize)
        .filter(|b| *b == b'\n')
        .count();
    1 + newlines as u32
}

#[test]
fn test_err_macros() {
    let eqn: EquationResult<()> = eqn_err!(ExtraToken, 3usize, 7usize);
    assert_eq!(
        EquationError {
            start: 3,
            end: 7,
            code: ErrorCode::ExtraToken
        },
        eqn.unwrap_err()
    );

    let sim: SimResult<()> = sim_err!(DivisionByZero);
    assert_eq!(SimulationError::DivisionByZero, sim.unwrap_err());
    let sim: SimResult<()> = sim_err!(TypeError, "bad override".to_string());
    assert_eq!(
        SimulationError::TypeError("bad override".to_string()),
        sim.unwrap_err()
    );
}

#[test]
fn test_line_of_offset() {
    assert_eq!(1, line_of_offset("a + b", 4));
    assert_eq!(2, line_of_offset("a +\nb", 4));
    assert_eq!(1, line_of_offset("", 7));
    assert_eq!(3, line_of_offset("a\nb\nc", 4));
}
