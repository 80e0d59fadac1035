// Copyright 2025 The Stockflow Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The metamodel is a value, not a compiled-in type hierarchy: object
//! types declare trait bundles, traits declare attribute schemas, and
//! edge types declare structural rules.  The checker in `constraints.rs`
//! interprets it; nothing here touches a concrete diagram.

use std::fmt;

use lazy_static::lazy_static;

use crate::frame::{Value, ValueType};

/// The closed set of object types, fixed at compile time of the host binary.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ObjectType {
    // computed nodes
    Stock,
    FlowRate,
    Auxiliary,
    GraphicalFunction,
    Delay,
    Smooth,
    // structural edges
    Flow,
    Parameter,
    // UI/metadata, not simulated
    Control,
    Chart,
    ChartSeries,
    ValueBinding,
    Note,
    Comment,
    Cloud,
    Simulation,
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl ObjectType {
    pub fn is_edge(&self) -> bool {
        matches!(
            self,
            ObjectType::Flow
                | ObjectType::Parameter
                | ObjectType::ChartSeries
                | ObjectType::ValueBinding
                | ObjectType::Comment
        )
    }

    /// Computed types own a slot in the state vector.
    pub fn is_computed(&self) -> bool {
        self.has_trait(Trait::Computed)
    }

    pub fn traits(&self) -> &'static [Trait] {
        use ObjectType::*;
        use Trait as T;
        match self {
            Stock => &[T::Named, T::Computed, T::Formula, T::Stock],
            FlowRate => &[T::Named, T::Computed, T::Formula, T::FlowRate],
            Auxiliary => &[T::Named, T::Computed, T::Formula],
            GraphicalFunction => &[T::Named, T::Computed, T::GraphicalFunction],
            Delay => &[T::Named, T::Computed, T::Delay],
            Smooth => &[T::Named, T::Computed, T::Smooth],
            Control => &[T::Named, T::Control],
            Chart => &[T::Named],
            Note => &[T::Note],
            Simulation => &[T::Simulation],
            Flow | Parameter | ChartSeries | ValueBinding | Comment | Cloud => &[],
        }
    }

    pub fn has_trait(&self, t: Trait) -> bool {
        self.traits().contains(&t)
    }
}

/// Attribute bundles attached to object types.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Trait {
    Named,
    Computed,
    Formula,
    Stock,
    FlowRate,
    GraphicalFunction,
    Delay,
    Smooth,
    Control,
    Note,
    Simulation,
}

/// Schema for one attribute a trait contributes.
#[derive(Clone, Debug, PartialEq)]
pub struct AttributeSchema {
    pub name: &'static str,
    pub value_type: ValueType,
    pub default: Option<Value>,
}

fn attr(name: &'static str, value_type: ValueType, default: Option<Value>) -> AttributeSchema {
    AttributeSchema {
        name,
        value_type,
        default,
    }
}

impl Trait {
    pub fn schema(&self) -> Vec<AttributeSchema> {
        use Trait::*;
        use ValueType as VT;
        match self {
            Named => vec![attr("name", VT::String, None)],
            Computed => vec![],
            Formula => vec![attr("formula", VT::String, None)],
            Stock => vec![
                attr("allows_negative", VT::Bool, Some(Value::Bool(false))),
                attr("delayed_inflow", VT::Bool, Some(Value::Bool(false))),
            ],
            FlowRate => vec![attr("priority", VT::Int, Some(Value::Int(0)))],
            GraphicalFunction => vec![
                attr("interpolation_method", VT::String, None),
                attr("points", VT::Points, None),
            ],
            Delay => vec![
                attr("delay_duration", VT::Int, None),
                attr("initial_value", VT::Double, Some(Value::Double(0.0))),
            ],
            Smooth => vec![
                attr("window_time", VT::Double, None),
                attr("initial_value", VT::Double, None),
            ],
            Control => vec![
                attr("value", VT::Double, None),
                attr("min", VT::Double, None),
                attr("max", VT::Double, None),
                attr("step", VT::Double, None),
            ],
            Note => vec![attr("text", VT::String, None)],
            Simulation => vec![
                attr("initial_time", VT::Double, Some(Value::Double(0.0))),
                attr("time_delta", VT::Double, Some(Value::Double(1.0))),
                attr("end_time", VT::Double, Some(Value::Double(10.0))),
                attr("steps", VT::Int, None),
            ],
        }
    }
}

/// Boolean composition over object types and traits.
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    Any,
    IsType(ObjectType),
    HasTrait(Trait),
    Or(Box<Predicate>, Box<Predicate>),
    And(Box<Predicate>, Box<Predicate>),
}

impl Predicate {
    pub fn matches(&self, ty: ObjectType) -> bool {
        match self {
            Predicate::Any => true,
            Predicate::IsType(t) => ty == *t,
            Predicate::HasTrait(t) => ty.has_trait(*t),
            Predicate::Or(a, b) => a.matches(ty) || b.matches(ty),
            Predicate::And(a, b) => a.matches(ty) && b.matches(ty),
        }
    }
}

fn is_type(ty: ObjectType) -> Predicate {
    Predicate::IsType(ty)
}

fn has_trait(t: Trait) -> Predicate {
    Predicate::HasTrait(t)
}

fn or(a: Predicate, b: Predicate) -> Predicate {
    Predicate::Or(Box::new(a), Box::new(b))
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Multiplicity {
    One,
    Many,
}

/// One way an edge of `edge_type` is allowed to connect two objects.
#[derive(Clone, Debug, PartialEq)]
pub struct EdgeRule {
    pub name: &'static str,
    pub edge_type: ObjectType,
    pub origin: Predicate,
    pub target: Predicate,
    /// bound on edges of this type originating at the origin endpoint
    pub outgoing: Multiplicity,
    /// bound on edges of this type terminating at the target endpoint
    pub incoming: Multiplicity,
}

/// Structural rules for a family of diagrams.
#[derive(Clone, Debug, PartialEq)]
pub struct Metamodel {
    rules: Vec<EdgeRule>,
}

impl Metamodel {
    /// The canonical stock-and-flow metamodel.
    pub fn stock_flow() -> Metamodel {
        use Multiplicity::{Many, One};
        use ObjectType::*;
        let rules = vec![
            // a flow edge either drains a stock (or cloud) into a flow
            // rate, or fills a stock (or cloud) from one
            EdgeRule {
                name: "flow-drain",
                edge_type: Flow,
                origin: or(is_type(Stock), is_type(Cloud)),
                target: is_type(FlowRate),
                outgoing: Many,
                incoming: One,
            },
            EdgeRule {
                name: "flow-fill",
                edge_type: Flow,
                origin: is_type(FlowRate),
                target: or(is_type(Stock), is_type(Cloud)),
                outgoing: One,
                incoming: Many,
            },
            EdgeRule {
                name: "parameter",
                edge_type: Parameter,
                origin: has_trait(Trait::Computed),
                target: has_trait(Trait::Computed),
                outgoing: Many,
                incoming: Many,
            },
            EdgeRule {
                name: "chart-series",
                edge_type: ChartSeries,
                origin: is_type(Chart),
                target: has_trait(Trait::Computed),
                outgoing: Many,
                incoming: Many,
            },
            EdgeRule {
                name: "value-binding",
                edge_type: ValueBinding,
                origin: is_type(Control),
                target: has_trait(Trait::Computed),
                outgoing: One,
                incoming: Many,
            },
            EdgeRule {
                name: "comment",
                edge_type: Comment,
                origin: is_type(Note),
                target: Predicate::Any,
                outgoing: Many,
                incoming: Many,
            },
        ];
        Metamodel { rules }
    }

    pub fn rules(&self) -> &[EdgeRule] {
        &self.rules
    }

    pub fn rules_for(&self, edge_type: ObjectType) -> impl Iterator<Item = &EdgeRule> {
        self.rules.iter().filter(move |r| r.edge_type == edge_type)
    }
}

lazy_static! {
    /// Process-wide read-only default; initialized before any compile.
    pub static ref STOCK_FLOW: Metamodel = Metamodel::stock_flow();
}
