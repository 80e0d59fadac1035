// Copyright 2025 The Stockflow Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use serde::{Deserialize, Serialize};

/// Named functions callable from formulas, generic over the expression
/// type so the same shape serves unbound and bound trees.
#[derive(PartialEq, Clone, Debug, Serialize, Deserialize)]
pub enum BuiltinFn<Expr> {
    Abs(Box<Expr>),
    Int(Box<Expr>),
    Sqrt(Box<Expr>),
    Exp(Box<Expr>),
    Ln(Box<Expr>),
    Log10(Box<Expr>),
    Sin(Box<Expr>),
    Cos(Box<Expr>),
    Tan(Box<Expr>),
    Max(Box<Expr>, Box<Expr>),
    Min(Box<Expr>, Box<Expr>),
    SafeDiv(Box<Expr>, Box<Expr>, Option<Box<Expr>>),
    Step(Box<Expr>, Box<Expr>),
    Pulse(Box<Expr>, Box<Expr>, Option<Box<Expr>>),
    Ramp(Box<Expr>, Box<Expr>, Option<Box<Expr>>),
}

pub fn is_builtin_fn(name: &str) -> bool {
    arity(name).is_some()
}

/// `(min, max)` argument counts for a builtin, `None` for unknown names.
pub fn arity(name: &str) -> Option<(usize, usize)> {
    let arity = match name {
        "abs" | "int" | "sqrt" | "exp" | "ln" | "log10" | "sin" | "cos" | "tan" => (1, 1),
        "max" | "min" | "step" => (2, 2),
        "safediv" | "pulse" | "ramp" => (2, 3),
        _ => return None,
    };
    Some(arity)
}

/// Build a typed builtin from a checked name and argument list.  Callers
/// must have verified the name and arity first.
pub fn instantiate<Expr>(name: &str, args: Vec<Expr>) -> Option<BuiltinFn<Expr>> {
    let (min, max) = arity(name)?;
    if args.len() < min || args.len() > max {
        return None;
    }
    let mut args = args.into_iter().map(Box::new);
    let mut args = || args.next();
    let builtin = match name {
        "abs" => BuiltinFn::Abs(args()?),
        "int" => BuiltinFn::Int(args()?),
        "sqrt" => BuiltinFn::Sqrt(args()?),
        "exp" => BuiltinFn::Exp(args()?),
        "ln" => BuiltinFn::Ln(args()?),
        "log10" => BuiltinFn::Log10(args()?),
        "sin" => BuiltinFn::Sin(args()?),
        "cos" => BuiltinFn::Cos(args()?),
        "tan" => BuiltinFn::Tan(args()?),
        "max" => BuiltinFn::Max(args()?, args()?),
        "min" => BuiltinFn::Min(args()?, args()?),
        "step" => BuiltinFn::Step(args()?, args()?),
        "safediv" => BuiltinFn::SafeDiv(args()?, args()?, args()),
        "pulse" => BuiltinFn::Pulse(args()?, args()?, args()),
        "ramp" => BuiltinFn::Ramp(args()?, args()?, args()),
        _ => return None,
    };
    Some(builtin)
}

#[test]
fn test_is_builtin_fn() {
    assert!(is_builtin_fn("max"));
    assert!(is_builtin_fn("safediv"));
    assert!(!is_builtin_fn("maxx"));
    assert!(!is_builtin_fn("lookup"));
}

#[test]
fn test_arity() {
    assert_eq!(Some((1, 1)), arity("abs"));
    assert_eq!(Some((2, 3)), arity("pulse"));
    assert_eq!(None, arity("if"));
}

#[test]
fn test_instantiate() {
    assert_eq!(Some(BuiltinFn::Max(Box::new(1), Box::new(2))), instantiate("max", vec![1, 2]));
    assert_eq!(None, instantiate::<i32>("max", vec![1]));
    assert_eq!(
        Some(BuiltinFn::SafeDiv(Box::new(1), Box::new(2), None)),
        instantiate("safediv", vec![1, 2])
    );
}
