// Copyright 2025 The Stockflow Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::metamodel::ObjectType;

/// Opaque stable identity for a node or edge.  Produced by the frame,
/// never by the compiler or simulator.
#[derive(
    Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize,
)]
pub struct ObjectId(u64);

impl ObjectId {
    #[cfg(test)]
    pub(crate) fn for_tests(raw: u64) -> Self {
        ObjectId(raw)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueType {
    Double,
    Int,
    Bool,
    String,
    Points,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ValueType::Double => "double",
            ValueType::Int => "int",
            ValueType::Bool => "bool",
            ValueType::String => "string",
            ValueType::Points => "points",
        };
        write!(f, "{}", name)
    }
}

/// An attribute value as stored on a node or edge.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Double(f64),
    Int(i64),
    Bool(bool),
    String(String),
    Points(Vec<(f64, f64)>),
}

impl Value {
    pub fn type_of(&self) -> ValueType {
        match self {
            Value::Double(_) => ValueType::Double,
            Value::Int(_) => ValueType::Int,
            Value::Bool(_) => ValueType::Bool,
            Value::String(_) => ValueType::String,
            Value::Points(_) => ValueType::Points,
        }
    }

    /// Numeric coercion: ints and bools read as doubles.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(n) => Some(*n),
            Value::Int(n) => Some(*n as f64),
            Value::Bool(b) => Some(*b as i64 as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Double(n) if n.fract() == 0.0 => Some(*n as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_points(&self) -> Option<&[(f64, f64)]> {
        match self {
            Value::Points(points) => Some(points),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub id: ObjectId,
    pub ty: ObjectType,
    attributes: BTreeMap<String, Value>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Edge {
    pub id: ObjectId,
    pub ty: ObjectType,
    pub origin: ObjectId,
    pub target: ObjectId,
    attributes: BTreeMap<String, Value>,
}

impl Edge {
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }
}

/// A snapshot of the object graph presented to the compiler.
///
/// The frame owns all node and edge storage; every other component holds
/// `ObjectId` values and resolves them through this interface.  The
/// compiler consumes exactly the read-only surface (`nodes`, `edges`,
/// `incoming`, `outgoing`, `attribute`); the mutating methods exist for
/// hosts assembling a diagram.
#[derive(Clone, Debug, Default)]
pub struct Frame {
    next_id: u64,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    node_index: HashMap<ObjectId, usize>,
    incoming: HashMap<ObjectId, Vec<usize>>,
    outgoing: HashMap<ObjectId, Vec<usize>>,
}

impl Frame {
    pub fn new() -> Self {
        Default::default()
    }

    fn fresh_id(&mut self) -> ObjectId {
        let id = ObjectId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn add_node(&mut self, ty: ObjectType) -> ObjectId {
        assert!(!ty.is_edge(), "{} is an edge type", ty);
        let id = self.fresh_id();
        self.node_index.insert(id, self.nodes.len());
        self.nodes.push(Node {
            id,
            ty,
            attributes: BTreeMap::new(),
        });
        id
    }

    pub fn add_edge(&mut self, ty: ObjectType, origin: ObjectId, target: ObjectId) -> ObjectId {
        assert!(ty.is_edge(), "{} is a node type", ty);
        let id = self.fresh_id();
        let idx = self.edges.len();
        self.edges.push(Edge {
            id,
            ty,
            origin,
            target,
            attributes: BTreeMap::new(),
        });
        self.outgoing.entry(origin).or_default().push(idx);
        self.incoming.entry(target).or_default().push(idx);
        id
    }

    pub fn set_attribute(&mut self, id: ObjectId, name: &str, value: Value) {
        if let Some(idx) = self.node_index.get(&id) {
            self.nodes[*idx].attributes.insert(name.to_owned(), value);
        } else if let Some(edge) = self.edges.iter_mut().find(|e| e.id == id) {
            edge.attributes.insert(name.to_owned(), value);
        }
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter()
    }

    pub fn node(&self, id: ObjectId) -> Option<&Node> {
        self.node_index.get(&id).map(|idx| &self.nodes[*idx])
    }

    /// Edges terminating at `id`.
    pub fn incoming(&self, id: ObjectId) -> impl Iterator<Item = &Edge> {
        self.incoming
            .get(&id)
            .map(|idxs| idxs.as_slice())
            .unwrap_or(&[])
            .iter()
            .map(|idx| &self.edges[*idx])
    }

    /// Edges originating at `id`.
    pub fn outgoing(&self, id: ObjectId) -> impl Iterator<Item = &Edge> {
        self.outgoing
            .get(&id)
            .map(|idxs| idxs.as_slice())
            .unwrap_or(&[])
            .iter()
            .map(|idx| &self.edges[*idx])
    }

    pub fn attribute(&self, id: ObjectId, name: &str) -> Option<&Value> {
        self.node(id).and_then(|node| node.attributes.get(name))
    }

    pub fn attr_f64(&self, id: ObjectId, name: &str) -> Option<f64> {
        self.attribute(id, name).and_then(Value::as_f64)
    }

    pub fn attr_i64(&self, id: ObjectId, name: &str) -> Option<i64> {
        self.attribute(id, name).and_then(Value::as_i64)
    }

    pub fn attr_bool(&self, id: ObjectId, name: &str) -> Option<bool> {
        self.attribute(id, name).and_then(Value::as_bool)
    }

    pub fn attr_str(&self, id: ObjectId, name: &str) -> Option<&str> {
        self.attribute(id, name).and_then(Value::as_str)
    }

    pub fn attr_points(&self, id: ObjectId, name: &str) -> Option<&[(f64, f64)]> {
        self.attribute(id, name).and_then(Value::as_points)
    }

    /// The trimmed name attribute, if the object carries a non-empty one.
    pub fn name(&self, id: ObjectId) -> Option<&str> {
        self.attr_str(id, "name").map(str::trim)
    }
}
