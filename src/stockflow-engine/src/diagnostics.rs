// Copyright 2025 The Stockflow Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::BTreeMap;
use std::error;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::frame::ObjectId;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Outgoing,
    Incoming,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Direction::Outgoing => write!(f, "outgoing"),
            Direction::Incoming => write!(f, "incoming"),
        }
    }
}

/// How an edge failed metamodel validation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeViolation {
    NoRuleSatisfied,
    CardinalityViolation { rule: String, direction: Direction },
    EdgeNotAllowed,
}

/// Everything the compiler can hold against an object, as a closed set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum IssueKind {
    // structural
    DuplicateName(String),
    EmptyName,
    MissingRequiredParameter,
    TooManyParameters,
    UnknownParameter(String),
    UnusedInput(String),
    ComputationCycle,
    FlowCycle,
    EdgeRuleViolation(EdgeViolation),
    // expression
    SyntaxError(String),
    UnknownFunction(String),
    UnknownVariable(String),
    TypeMismatch { expected: String, got: String },
}

impl IssueKind {
    pub fn severity(&self) -> Severity {
        match self {
            IssueKind::UnusedInput(_) => Severity::Warning,
            _ => Severity::Error,
        }
    }

    pub fn code(&self) -> &'static str {
        use IssueKind::*;
        match self {
            DuplicateName(_) => "duplicate_name",
            EmptyName => "empty_name",
            MissingRequiredParameter => "missing_required_parameter",
            TooManyParameters => "too_many_parameters",
            UnknownParameter(_) => "unknown_parameter",
            UnusedInput(_) => "unused_input",
            ComputationCycle => "computation_cycle",
            FlowCycle => "flow_cycle",
            EdgeRuleViolation(_) => "edge_rule_violation",
            SyntaxError(_) => "syntax_error",
            UnknownFunction(_) => "unknown_function",
            UnknownVariable(_) => "unknown_variable",
            TypeMismatch { .. } => "type_mismatch",
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use IssueKind::*;
        match self {
            DuplicateName(name) => write!(f, "duplicate_name({})", name),
            UnknownParameter(name) => write!(f, "unknown_parameter({})", name),
            UnusedInput(name) => write!(f, "unused_input({})", name),
            SyntaxError(msg) => write!(f, "syntax_error: {}", msg),
            UnknownFunction(name) => write!(f, "unknown_function({})", name),
            UnknownVariable(name) => write!(f, "unknown_variable({})", name),
            TypeMismatch { expected, got } => {
                write!(f, "type_mismatch(expected {}, got {})", expected, got)
            }
            EdgeRuleViolation(EdgeViolation::CardinalityViolation { rule, direction }) => {
                write!(f, "edge_rule_violation(cardinality, {} at {})", rule, direction)
            }
            EdgeRuleViolation(EdgeViolation::NoRuleSatisfied) => {
                write!(f, "edge_rule_violation(no_rule_satisfied)")
            }
            EdgeRuleViolation(EdgeViolation::EdgeNotAllowed) => {
                write!(f, "edge_rule_violation(edge_not_allowed)")
            }
            other => write!(f, "{}", other.code()),
        }
    }
}

/// Span of a diagnostic within a formula's source text.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRange {
    pub start: u32,
    pub end: u32,
    pub line: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    /// display name of the object the issue is attached to, if it has one
    pub identifier: String,
    pub severity: Severity,
    pub error: IssueKind,
    pub location: Option<SourceRange>,
}

impl Issue {
    pub fn new(identifier: &str, error: IssueKind) -> Self {
        Issue {
            identifier: identifier.to_owned(),
            severity: error.severity(),
            error,
            location: None,
        }
    }

    pub fn with_location(mut self, location: SourceRange) -> Self {
        self.location = Some(location);
        self
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.identifier.is_empty() {
            write!(f, "{}", self.error)
        } else {
            write!(f, "{}: {}", self.identifier, self.error)
        }
    }
}

pub type IssueMap = BTreeMap<ObjectId, Vec<Issue>>;

/// Why compilation did not produce a plan.
#[derive(Clone, Debug, PartialEq)]
pub enum CompilerError {
    /// an invariant violation inside the compiler -- a bug, not user input
    InternalError(String),
    /// per-object diagnostics, at least one of error severity
    Issues(IssueMap),
}

impl fmt::Display for CompilerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CompilerError::InternalError(msg) => write!(f, "internal error: {}", msg),
            CompilerError::Issues(issues) => {
                let n: usize = issues.values().map(|l| l.len()).sum();
                write!(f, "{} issue(s) on {} object(s)", n, issues.len())
            }
        }
    }
}

impl error::Error for CompilerError {}

/// Accumulates diagnostics across compiler phases; a failure on one object
/// must not suppress diagnostics on its neighbors.
#[derive(Clone, Debug, Default)]
pub(crate) struct IssueReporter {
    issues: IssueMap,
}

impl IssueReporter {
    pub(crate) fn new() -> Self {
        Default::default()
    }

    pub(crate) fn report(&mut self, id: ObjectId, issue: Issue) {
        self.issues.entry(id).or_default().push(issue);
    }

    pub(crate) fn has_errors(&self) -> bool {
        self.issues
            .values()
            .flatten()
            .any(|issue| issue.severity == Severity::Error)
    }

    /// Warnings survive into the emitted plan when no errors exist.
    pub(crate) fn into_warnings(self) -> Vec<(ObjectId, Issue)> {
        self.issues
            .into_iter()
            .flat_map(|(id, issues)| issues.into_iter().map(move |issue| (id, issue)))
            .filter(|(_, issue)| issue.severity == Severity::Warning)
            .collect()
    }

    pub(crate) fn into_issues(self) -> IssueMap {
        self.issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severities() {
        assert_eq!(
            Severity::Warning,
            IssueKind::UnusedInput("x".to_owned()).severity()
        );
        assert_eq!(Severity::Error, IssueKind::EmptyName.severity());
        assert_eq!(Severity::Error, IssueKind::ComputationCycle.severity());
    }

    #[test]
    fn issues_round_trip_through_json() {
        let issue = Issue::new("pour", IssueKind::UnknownParameter("rate".to_owned()))
            .with_location(SourceRange {
                start: 3,
                end: 7,
                line: 1,
            });
        let encoded = serde_json::to_string(&issue).unwrap();
        let decoded: Issue = serde_json::from_str(&encoded).unwrap();
        assert_eq!(issue, decoded);
    }

    #[test]
    fn reporter_partitions_warnings() {
        let mut reporter = IssueReporter::new();
        let id = ObjectId::for_tests(1);
        reporter.report(id, Issue::new("a", IssueKind::UnusedInput("b".to_owned())));
        assert!(!reporter.has_errors());

        reporter.report(id, Issue::new("a", IssueKind::EmptyName));
        assert!(reporter.has_errors());

        let warnings = reporter.into_warnings();
        assert_eq!(1, warnings.len());
        assert_eq!("unused_input", warnings[0].1.error.code());
    }
}
