// Copyright 2025 The Stockflow Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::{BTreeMap, HashMap};

use crate::ast::{Expr0, UntypedCall, free_names};
use crate::builtins;
use crate::common::{Ident, line_of_offset};
use crate::diagnostics::{Issue, IssueKind, IssueReporter, SourceRange};
use crate::frame::{Frame, ObjectId};
use crate::gf::{GraphicalFn, InterpolationMethod};
use crate::metamodel::ObjectType;
use crate::plan::is_builtin_name;

/// Role-specific compiled attributes of a computed node.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum VarKind {
    Stock {
        allows_negative: bool,
        delayed_inflow: bool,
    },
    Flow {
        priority: i64,
    },
    Auxiliary,
    Graphical {
        function: GraphicalFn,
    },
    Delay {
        duration: usize,
        initial_value: f64,
    },
    Smooth {
        window_time: f64,
        initial_value: Option<f64>,
    },
}

impl VarKind {
    pub(crate) fn is_stock(&self) -> bool {
        matches!(self, VarKind::Stock { .. })
    }

    pub(crate) fn is_flow(&self) -> bool {
        matches!(self, VarKind::Flow { .. })
    }

    /// Stateful nodes take one unnamed input instead of a formula.
    fn takes_unnamed_input(&self) -> bool {
        matches!(
            self,
            VarKind::Graphical { .. } | VarKind::Delay { .. } | VarKind::Smooth { .. }
        )
    }
}

/// A computed node after name resolution, formula parsing and parameter
/// resolution, ready for topology analysis and binding.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Variable {
    pub id: ObjectId,
    pub name: Ident,
    pub kind: VarKind,
    pub ast: Option<Expr0>,
    /// named inputs: formula variable -> origin of the parameter edge
    pub inputs: BTreeMap<Ident, ObjectId>,
    /// the unnamed input of a stateful node
    pub input: Option<ObjectId>,
    /// an error-severity diagnostic was attached; later phases that would
    /// cascade skip this object (its neighbors are still analyzed)
    pub failed: bool,
}

impl Variable {
    /// Objects this one must be computed after.  Stocks advance on their
    /// previous-step value, so at step evaluation they depend on nothing.
    pub(crate) fn dependencies(&self) -> Vec<ObjectId> {
        if self.kind.is_stock() {
            return vec![];
        }
        let mut deps: Vec<ObjectId> = self.inputs.values().copied().collect();
        deps.extend(self.input);
        deps
    }
}

/// Collect named objects into a lookup, rejecting empty and duplicate
/// names.  Built-in names are pre-declared and cannot be taken.
pub(crate) fn resolve_names(frame: &Frame, issues: &mut IssueReporter) -> HashMap<Ident, ObjectId> {
    let mut by_name: BTreeMap<Ident, Vec<ObjectId>> = BTreeMap::new();

    for node in frame.nodes() {
        if !node.ty.is_computed() {
            continue;
        }
        match frame.name(node.id) {
            None | Some("") => {
                issues.report(node.id, Issue::new("", IssueKind::EmptyName));
            }
            Some(name) => {
                by_name.entry(name.to_owned()).or_default().push(node.id);
            }
        }
    }

    let mut names: HashMap<Ident, ObjectId> = HashMap::new();
    for (name, ids) in by_name {
        if ids.len() >= 2 || is_builtin_name(&name) {
            for id in ids {
                issues.report(id, Issue::new(&name, IssueKind::DuplicateName(name.clone())));
            }
        } else {
            names.insert(name, ids[0]);
        }
    }
    names
}

/// Analyze every computed node: extract role attributes, parse formulas,
/// and resolve parameters.  Diagnostics accumulate; an object that fails
/// is still returned (marked `failed`) so neighbors see a full picture.
pub(crate) fn analyze(
    frame: &Frame,
    names: &HashMap<Ident, ObjectId>,
    issues: &mut IssueReporter,
) -> Vec<Variable> {
    let mut variables = Vec::new();
    for node in frame.nodes() {
        if !node.ty.is_computed() {
            continue;
        }
        variables.push(analyze_node(frame, node.id, node.ty, names, issues));
    }
    variables
}

fn analyze_node(
    frame: &Frame,
    id: ObjectId,
    ty: ObjectType,
    names: &HashMap<Ident, ObjectId>,
    issues: &mut IssueReporter,
) -> Variable {
    let name = frame.name(id).unwrap_or_default().to_owned();
    let mut failed = false;

    let report = |issues: &mut IssueReporter, failed: &mut bool, issue: Issue| {
        *failed |= issue.severity == crate::diagnostics::Severity::Error;
        issues.report(id, issue);
    };

    let kind = match ty {
        ObjectType::Stock => VarKind::Stock {
            allows_negative: frame.attr_bool(id, "allows_negative").unwrap_or(false),
            delayed_inflow: frame.attr_bool(id, "delayed_inflow").unwrap_or(false),
        },
        ObjectType::FlowRate => VarKind::Flow {
            priority: frame.attr_i64(id, "priority").unwrap_or(0),
        },
        ObjectType::Auxiliary => VarKind::Auxiliary,
        ObjectType::GraphicalFunction => {
            let method = match frame.attr_str(id, "interpolation_method") {
                None => InterpolationMethod::default(),
                Some(spelling) => match InterpolationMethod::from_attr(spelling) {
                    Some(method) => method,
                    None => {
                        report(
                            issues,
                            &mut failed,
                            Issue::new(
                                &name,
                                IssueKind::TypeMismatch {
                                    expected: "interpolation method".to_owned(),
                                    got: spelling.to_owned(),
                                },
                            ),
                        );
                        InterpolationMethod::default()
                    }
                },
            };
            let points = frame.attr_points(id, "points").unwrap_or(&[]).to_vec();
            VarKind::Graphical {
                function: GraphicalFn::new(points, method),
            }
        }
        ObjectType::Delay => {
            let duration = match frame.attr_i64(id, "delay_duration") {
                Some(d) if d >= 0 => d as usize,
                Some(_) => {
                    report(
                        issues,
                        &mut failed,
                        Issue::new(
                            &name,
                            IssueKind::TypeMismatch {
                                expected: "non-negative int delay_duration".to_owned(),
                                got: "negative int".to_owned(),
                            },
                        ),
                    );
                    0
                }
                None => {
                    report(
                        issues,
                        &mut failed,
                        Issue::new(
                            &name,
                            IssueKind::TypeMismatch {
                                expected: "int delay_duration".to_owned(),
                                got: "nothing".to_owned(),
                            },
                        ),
                    );
                    0
                }
            };
            VarKind::Delay {
                duration,
                initial_value: frame.attr_f64(id, "initial_value").unwrap_or(0.0),
            }
        }
        ObjectType::Smooth => {
            let window_time = match frame.attr_f64(id, "window_time") {
                Some(w) if w > 0.0 => w,
                got => {
                    report(
                        issues,
                        &mut failed,
                        Issue::new(
                            &name,
                            IssueKind::TypeMismatch {
                                expected: "positive double window_time".to_owned(),
                                got: match got {
                                    Some(_) => "non-positive double".to_owned(),
                                    None => "nothing".to_owned(),
                                },
                            },
                        ),
                    );
                    1.0
                }
            };
            VarKind::Smooth {
                window_time,
                initial_value: frame.attr_f64(id, "initial_value"),
            }
        }
        _ => unreachable!("{} is not a computed type", ty),
    };

    let mut variable = Variable {
        id,
        name,
        kind,
        ast: None,
        inputs: BTreeMap::new(),
        input: None,
        failed,
    };

    if variable.kind.takes_unnamed_input() {
        resolve_unnamed_input(frame, &mut variable, issues);
    } else {
        parse_formula(frame, &mut variable, issues);
        if variable.ast.is_some() {
            resolve_parameters(frame, names, &mut variable, issues);
        }
    }

    variable
}

/// Parse the `formula` attribute; a failure records `syntax_error` and
/// excludes the object from parameter resolution and binding, avoiding
/// cascading spurious diagnostics.
fn parse_formula(frame: &Frame, variable: &mut Variable, issues: &mut IssueReporter) {
    let formula = frame.attr_str(variable.id, "formula").unwrap_or_default();
    match Expr0::new(formula) {
        Ok(Some(ast)) => {
            variable.ast = Some(ast);
        }
        Ok(None) => {
            variable.failed = true;
            let code = crate::common::ErrorCode::EmptyEquation;
            issues.report(
                variable.id,
                Issue::new(&variable.name, IssueKind::SyntaxError(code.to_string())),
            );
        }
        Err(err) => {
            variable.failed = true;
            let location = SourceRange {
                start: err.start,
                end: err.end,
                line: line_of_offset(formula, err.start),
            };
            issues.report(
                variable.id,
                Issue::new(&variable.name, IssueKind::SyntaxError(err.code.to_string()))
                    .with_location(location),
            );
        }
    }

    // call names and arities are checked up front so binding proper can
    // only fail on compiler bugs
    if let Some(ast) = variable.ast.clone() {
        let formula = formula.to_owned();
        validate_calls(&ast, &formula, variable, issues);
    }
}

fn validate_calls(expr: &Expr0, formula: &str, variable: &mut Variable, issues: &mut IssueReporter) {
    match expr {
        Expr0::Const(_, _, _) | Expr0::Var(_, _) => {}
        Expr0::App(UntypedCall(name, args), loc) => {
            let location = SourceRange {
                start: loc.start,
                end: loc.end,
                line: line_of_offset(formula, loc.start),
            };
            match builtins::arity(name) {
                None => {
                    variable.failed = true;
                    issues.report(
                        variable.id,
                        Issue::new(&variable.name, IssueKind::UnknownFunction(name.clone()))
                            .with_location(location),
                    );
                }
                Some((min, max)) if args.len() < min || args.len() > max => {
                    variable.failed = true;
                    let expected = if min == max {
                        format!("{} argument(s) to {}", min, name)
                    } else {
                        format!("{}..{} argument(s) to {}", min, max, name)
                    };
                    issues.report(
                        variable.id,
                        Issue::new(
                            &variable.name,
                            IssueKind::TypeMismatch {
                                expected,
                                got: args.len().to_string(),
                            },
                        )
                        .with_location(location),
                    );
                }
                Some(_) => {}
            }
            for arg in args {
                validate_calls(arg, formula, variable, issues);
            }
        }
        Expr0::Op1(_, l, _) => validate_calls(l, formula, variable, issues),
        Expr0::Op2(_, l, r, _) => {
            validate_calls(l, formula, variable, issues);
            validate_calls(r, formula, variable, issues);
        }
        Expr0::If(cond, t, f, _) => {
            validate_calls(cond, formula, variable, issues);
            validate_calls(t, formula, variable, issues);
            validate_calls(f, formula, variable, issues);
        }
    }
}

/// Match the formula's required variables against incoming parameter
/// edges: used edges bind, surplus edges warn, absences are errors.
fn resolve_parameters(
    frame: &Frame,
    names: &HashMap<Ident, ObjectId>,
    variable: &mut Variable,
    issues: &mut IssueReporter,
) {
    let ast = variable.ast.as_ref().unwrap();
    let required: BTreeMap<Ident, ()> = free_names(ast)
        .into_iter()
        .filter(|name| !is_builtin_name(name))
        .map(|name| (name, ()))
        .collect();

    for edge in frame.incoming(variable.id) {
        if edge.ty != ObjectType::Parameter {
            continue;
        }
        let origin_name = match frame.name(edge.origin) {
            Some(name) if !name.is_empty() => name.to_owned(),
            // the origin's own empty_name diagnostic covers this edge
            _ => continue,
        };
        if required.contains_key(&origin_name) {
            variable.inputs.insert(origin_name, edge.origin);
        } else {
            issues.report(
                variable.id,
                Issue::new(&variable.name, IssueKind::UnusedInput(origin_name)),
            );
        }
    }

    for name in required.keys() {
        if variable.inputs.contains_key(name) {
            continue;
        }
        variable.failed = true;
        let kind = if names.contains_key(name) {
            IssueKind::UnknownParameter(name.clone())
        } else {
            IssueKind::UnknownVariable(name.clone())
        };
        issues.report(variable.id, Issue::new(&variable.name, kind));
    }
}

/// Graphical functions, delays and smooths expect exactly one incoming
/// parameter edge of any origin name.
fn resolve_unnamed_input(frame: &Frame, variable: &mut Variable, issues: &mut IssueReporter) {
    let mut origins: Vec<ObjectId> = frame
        .incoming(variable.id)
        .filter(|e| e.ty == ObjectType::Parameter)
        .map(|e| e.origin)
        .collect();
    origins.sort();

    match origins.len() {
        0 => {
            variable.failed = true;
            issues.report(
                variable.id,
                Issue::new(&variable.name, IssueKind::MissingRequiredParameter),
            );
        }
        1 => {
            variable.input = Some(origins[0]);
        }
        _ => {
            variable.failed = true;
            issues.report(
                variable.id,
                Issue::new(&variable.name, IssueKind::TooManyParameters),
            );
        }
    }
}
