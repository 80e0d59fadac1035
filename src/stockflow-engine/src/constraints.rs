// Copyright 2025 The Stockflow Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use crate::diagnostics::{Direction, EdgeViolation, Issue, IssueKind, IssueReporter};
use crate::frame::{Edge, Frame};
use crate::metamodel::{EdgeRule, Metamodel, Multiplicity};

/// Validate every edge in the frame against the metamodel's edge rules,
/// and every node's stored attributes against its traits' schemas.
pub(crate) fn check_frame(frame: &Frame, metamodel: &Metamodel, issues: &mut IssueReporter) {
    for edge in frame.edges() {
        check_edge(frame, metamodel, edge, issues);
    }

    for node in frame.nodes() {
        for t in node.ty.traits() {
            for schema in t.schema() {
                if let Some(value) = frame.attribute(node.id, schema.name) {
                    let got = value.type_of();
                    // ints are accepted anywhere a double is declared
                    let coercible = schema.value_type == crate::frame::ValueType::Double
                        && value.as_f64().is_some();
                    if got != schema.value_type && !coercible {
                        let identifier = frame.name(node.id).unwrap_or_default().to_owned();
                        issues.report(
                            node.id,
                            Issue::new(
                                &identifier,
                                IssueKind::TypeMismatch {
                                    expected: format!("{} {}", schema.value_type, schema.name),
                                    got: got.to_string(),
                                },
                            ),
                        );
                    }
                }
            }
        }
    }
}

/// An edge is valid iff at least one rule for its type is satisfied by
/// both endpoints and no cardinality bound is violated under that rule.
fn check_edge(frame: &Frame, metamodel: &Metamodel, edge: &Edge, issues: &mut IssueReporter) {
    let rules: Vec<&EdgeRule> = metamodel.rules_for(edge.ty).collect();
    if rules.is_empty() {
        issues.report(
            edge.id,
            Issue::new("", IssueKind::EdgeRuleViolation(EdgeViolation::EdgeNotAllowed)),
        );
        return;
    }

    let origin_ty = frame.node(edge.origin).map(|n| n.ty);
    let target_ty = frame.node(edge.target).map(|n| n.ty);

    let mut cardinality_failure: Option<(&EdgeRule, Direction)> = None;
    for rule in rules {
        let endpoints_match = match (origin_ty, target_ty) {
            (Some(o), Some(t)) => rule.origin.matches(o) && rule.target.matches(t),
            _ => false,
        };
        if !endpoints_match {
            continue;
        }

        match violated_bound(frame, edge, rule) {
            None => return, // satisfied
            Some(direction) => {
                cardinality_failure.get_or_insert((rule, direction));
            }
        }
    }

    let kind = match cardinality_failure {
        Some((rule, direction)) => IssueKind::EdgeRuleViolation(EdgeViolation::CardinalityViolation {
            rule: rule.name.to_owned(),
            direction,
        }),
        None => IssueKind::EdgeRuleViolation(EdgeViolation::NoRuleSatisfied),
    };
    issues.report(edge.id, Issue::new("", kind));
}

/// Cardinality is computed per endpoint as the count of edges of the same
/// type in the same direction.
fn violated_bound(frame: &Frame, edge: &Edge, rule: &EdgeRule) -> Option<Direction> {
    if rule.outgoing == Multiplicity::One {
        let peers = frame
            .outgoing(edge.origin)
            .filter(|e| e.ty == edge.ty)
            .count();
        if peers > 1 {
            return Some(Direction::Outgoing);
        }
    }
    if rule.incoming == Multiplicity::One {
        let peers = frame
            .incoming(edge.target)
            .filter(|e| e.ty == edge.ty)
            .count();
        if peers > 1 {
            return Some(Direction::Incoming);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Value;
    use crate::metamodel::ObjectType;

    fn check(frame: &Frame) -> IssueReporter {
        let mut issues = IssueReporter::new();
        check_frame(frame, &Metamodel::stock_flow(), &mut issues);
        issues
    }

    #[test]
    fn well_formed_flow_chain() {
        let mut frame = Frame::new();
        let kettle = frame.add_node(ObjectType::Stock);
        let cup = frame.add_node(ObjectType::Stock);
        let pour = frame.add_node(ObjectType::FlowRate);
        frame.add_edge(ObjectType::Flow, kettle, pour);
        frame.add_edge(ObjectType::Flow, pour, cup);

        assert!(!check(&frame).has_errors());
    }

    #[test]
    fn flow_between_stocks_matches_no_rule() {
        let mut frame = Frame::new();
        let a = frame.add_node(ObjectType::Stock);
        let b = frame.add_node(ObjectType::Stock);
        frame.add_edge(ObjectType::Flow, a, b);

        let issues = check(&frame).into_issues();
        let issue = &issues.values().next().unwrap()[0];
        assert_eq!(
            IssueKind::EdgeRuleViolation(EdgeViolation::NoRuleSatisfied),
            issue.error
        );
    }

    #[test]
    fn two_drains_into_one_flow_rate() {
        let mut frame = Frame::new();
        let a = frame.add_node(ObjectType::Stock);
        let b = frame.add_node(ObjectType::Stock);
        let rate = frame.add_node(ObjectType::FlowRate);
        frame.add_edge(ObjectType::Flow, a, rate);
        frame.add_edge(ObjectType::Flow, b, rate);

        let issues = check(&frame).into_issues();
        // both edges exceed the incoming bound of the drain rule
        assert_eq!(2, issues.len());
        for edge_issues in issues.values() {
            assert!(matches!(
                edge_issues[0].error,
                IssueKind::EdgeRuleViolation(EdgeViolation::CardinalityViolation {
                    direction: Direction::Incoming,
                    ..
                })
            ));
        }
    }

    #[test]
    fn parameter_into_cloud_is_rejected() {
        let mut frame = Frame::new();
        let aux = frame.add_node(ObjectType::Auxiliary);
        let cloud = frame.add_node(ObjectType::Cloud);
        frame.add_edge(ObjectType::Parameter, aux, cloud);

        assert!(check(&frame).has_errors());
    }

    #[test]
    fn attribute_type_mismatch() {
        let mut frame = Frame::new();
        let stock = frame.add_node(ObjectType::Stock);
        frame.set_attribute(stock, "name", Value::String("s".to_owned()));
        frame.set_attribute(stock, "allows_negative", Value::String("yes".to_owned()));

        let issues = check(&frame).into_issues();
        assert!(matches!(
            issues[&stock][0].error,
            IssueKind::TypeMismatch { .. }
        ));
    }

    #[test]
    fn int_accepted_for_double_attribute() {
        let mut frame = Frame::new();
        let sim = frame.add_node(ObjectType::Simulation);
        frame.set_attribute(sim, "time_delta", Value::Int(2));

        assert!(!check(&frame).has_errors());
    }
}
