// Copyright 2025 The Stockflow Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::common::{EquationResult, Ident};

/// Byte span in formula source text for error reporting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loc {
    pub start: u32,
    pub end: u32,
}

impl Loc {
    pub fn new(start: usize, end: usize) -> Self {
        Loc {
            start: start as u32,
            end: end as u32,
        }
    }

    pub fn union(&self, other: &Loc) -> Self {
        Loc {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Positive,
    Negative,
    Not,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Exp,
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
    Neq,
    And,
    Or,
}

/// A function application whose name has not yet been checked against the
/// builtin table.
#[derive(Clone, Debug, PartialEq)]
pub struct UntypedCall(pub Ident, pub Vec<Expr0>);

/// The unbound expression tree produced by the parser: leaves are names
/// and numeric literals, not state-vector offsets.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr0 {
    Const(String, f64, Loc),
    Var(Ident, Loc),
    App(UntypedCall, Loc),
    Op1(UnaryOp, Box<Expr0>, Loc),
    Op2(BinaryOp, Box<Expr0>, Box<Expr0>, Loc),
    If(Box<Expr0>, Box<Expr0>, Box<Expr0>, Loc),
}

impl Expr0 {
    /// Parse a formula; `Ok(None)` means the input was empty or
    /// comment-only.
    pub fn new(formula: &str) -> EquationResult<Option<Expr0>> {
        crate::parser::parse(formula)
    }

    pub fn get_loc(&self) -> Loc {
        match self {
            Expr0::Const(_, _, loc)
            | Expr0::Var(_, loc)
            | Expr0::App(_, loc)
            | Expr0::Op1(_, _, loc)
            | Expr0::Op2(_, _, _, loc)
            | Expr0::If(_, _, _, loc) => *loc,
        }
    }
}

fn walk_names(e: &Expr0, names: &mut HashSet<Ident>) {
    match e {
        Expr0::Const(_, _, _) => {}
        Expr0::Var(id, _) => {
            names.insert(id.clone());
        }
        Expr0::App(UntypedCall(_, args), _) => {
            for arg in args {
                walk_names(arg, names);
            }
        }
        Expr0::Op1(_, l, _) => walk_names(l, names),
        Expr0::Op2(_, l, r, _) => {
            walk_names(l, names);
            walk_names(r, names);
        }
        Expr0::If(cond, t, f, _) => {
            walk_names(cond, names);
            walk_names(t, names);
            walk_names(f, names);
        }
    }
}

/// The set of names an expression references; function names are not
/// included, only their arguments' references.
pub fn free_names(e: &Expr0) -> HashSet<Ident> {
    let mut names = HashSet::new();
    walk_names(e, &mut names);
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_name_sets() {
        let cases: &[(&str, &[&str])] = &[
            ("a + b", &["a", "b"]),
            ("if(a, b, c)", &["a", "b", "c"]),
            ("max(b, c)", &["b", "c"]),
            ("-(a)", &["a"]),
            ("if(a == 1, -c, min(c, b))", &["a", "b", "c"]),
            ("3 * 4 + 7", &[]),
            ("time * rate", &["time", "rate"]),
        ];

        for (eqn, expected) in cases.iter() {
            let ast = Expr0::new(eqn).unwrap().unwrap();
            let expected: HashSet<Ident> = expected.iter().map(|s| s.to_string()).collect();
            assert_eq!(expected, free_names(&ast), "in {}", eqn);
        }
    }

    #[test]
    fn loc_union() {
        let a = Loc::new(3, 7);
        let b = Loc::new(5, 11);
        assert_eq!(Loc::new(3, 11), a.union(&b));
    }
}
