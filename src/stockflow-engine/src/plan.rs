// Copyright 2025 The Stockflow Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The compiled artifact: an immutable program over a flat state vector.
//! Everything here is produced by the compiler and only read by the
//! simulator, so the hot path can branch on closed sum types.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::ast::{BinaryOp, Loc, UnaryOp};
use crate::builtins::BuiltinFn;
use crate::common::Ident;
use crate::diagnostics::Issue;
use crate::frame::{ObjectId, ValueType};
use crate::gf::GraphicalFn;

// builtin state slots occupy fixed positions at the head of the vector
pub(crate) const TIME_OFF: usize = 0;
pub(crate) const DT_OFF: usize = 1;
pub(crate) const STEP_OFF: usize = 2;
pub(crate) const IMPLICIT_VAR_COUNT: usize = 3;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuiltinKind {
    Time,
    TimeDelta,
    SimulationStep,
}

impl BuiltinKind {
    pub fn name(&self) -> &'static str {
        match self {
            BuiltinKind::Time => "time",
            BuiltinKind::TimeDelta => "time_delta",
            BuiltinKind::SimulationStep => "simulation_step",
        }
    }

    pub(crate) fn offset(&self) -> usize {
        match self {
            BuiltinKind::Time => TIME_OFF,
            BuiltinKind::TimeDelta => DT_OFF,
            BuiltinKind::SimulationStep => STEP_OFF,
        }
    }

    pub fn all() -> [BuiltinKind; IMPLICIT_VAR_COUNT] {
        [
            BuiltinKind::Time,
            BuiltinKind::TimeDelta,
            BuiltinKind::SimulationStep,
        ]
    }

    pub fn from_name(name: &str) -> Option<BuiltinKind> {
        BuiltinKind::all().into_iter().find(|b| b.name() == name)
    }
}

/// Reserved names are pre-declared; taking one is a duplicate.
pub fn is_builtin_name(name: &str) -> bool {
    BuiltinKind::from_name(name).is_some()
}

/// A bound expression: every leaf is a state-vector offset or a literal.
#[derive(PartialEq, Clone, Debug, Serialize, Deserialize)]
pub enum Expr {
    Const(f64, Loc),
    Var(usize, Loc), // offset
    App(BuiltinFn<Expr>, Loc),
    Op1(UnaryOp, Box<Expr>, Loc),
    Op2(BinaryOp, Box<Expr>, Box<Expr>, Loc),
    If(Box<Expr>, Box<Expr>, Box<Expr>, Loc),
}

/// What owns a state-vector slot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum VariableContent {
    Builtin(BuiltinKind),
    Object(ObjectId),
    Internal { owner: ObjectId, purpose: String },
}

/// Descriptor for one slot in the per-step numeric state vector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateVariable {
    pub name: Ident,
    pub value_type: ValueType,
    pub content: VariableContent,
}

/// How a simulation object's value is produced each step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Computation {
    Formula(Expr),
    GraphicalFunction {
        function: GraphicalFn,
        input_index: usize,
    },
    Delay {
        duration: usize,
        input_index: usize,
        queue_base_index: usize,
        initial_value: f64,
    },
    Smooth {
        window_time: f64,
        input_index: usize,
        state_index: usize,
        initial_value: Option<f64>,
    },
}

/// A compiled computed node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationObject {
    pub object_id: ObjectId,
    pub name: Ident,
    pub variable_index: usize,
    pub computation: Computation,
}

pub type FlowIndexList = SmallVec<[usize; 4]>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundStock {
    pub object_id: ObjectId,
    pub variable_index: usize,
    pub allows_negative: bool,
    /// indices into `SimulationPlan::flows`, sorted by flow object id
    pub inflows: FlowIndexList,
    /// indices into `SimulationPlan::flows`, sorted by (priority, id);
    /// this order is binding for the non-negativity adjustment
    pub outflows: FlowIndexList,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundFlow {
    pub object_id: ObjectId,
    pub variable_index: usize,
    pub priority: i64,
    /// index into `SimulationPlan::stocks`; absent for a cloud endpoint
    pub drains: Option<usize>,
    pub fills: Option<usize>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundBuiltins {
    pub time: usize,
    pub time_delta: usize,
    pub simulation_step: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValueBinding {
    pub control_id: ObjectId,
    pub variable_index: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SeriesBinding {
    pub node_id: ObjectId,
    pub color: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Chart {
    pub chart_id: ObjectId,
    pub series: Vec<SeriesBinding>,
}

/// Simulation-wide run parameters from the diagram's `Simulation` node.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimSpecs {
    pub initial_time: f64,
    pub time_delta: f64,
    pub end_time: f64,
    pub steps: i64,
}

impl Default for SimSpecs {
    fn default() -> Self {
        SimSpecs {
            initial_time: 0.0,
            time_delta: 1.0,
            end_time: 10.0,
            steps: 10,
        }
    }
}

/// The immutable compiled program the simulator executes.  Freely
/// shareable across threads; any number of simulators may run against
/// one plan concurrently.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationPlan {
    /// simulation objects in evaluation order
    pub objects: Vec<SimulationObject>,
    pub state_variables: Vec<StateVariable>,
    pub builtins: BoundBuiltins,
    /// stocks in stock-order (order of appearance in the evaluation order)
    pub stocks: Vec<BoundStock>,
    /// flows in flow-order
    pub flows: Vec<BoundFlow>,
    pub value_bindings: Vec<ValueBinding>,
    pub charts: Vec<Chart>,
    pub sim_specs: Option<SimSpecs>,
    /// warning-severity diagnostics that did not prevent emission
    pub warnings: Vec<(ObjectId, Issue)>,
}

impl SimulationPlan {
    /// O(n); debugging and tests only.
    pub fn variable_index(&self, object_id: ObjectId) -> Option<usize> {
        self.objects
            .iter()
            .find(|o| o.object_id == object_id)
            .map(|o| o.variable_index)
    }

    /// O(n); debugging and tests only.
    pub fn variable(&self, name: &str) -> Option<&SimulationObject> {
        self.objects.iter().find(|o| o.name == name)
    }

    /// O(n); index into `stocks` for test inspection.
    pub fn stock_index(&self, object_id: ObjectId) -> Option<usize> {
        self.stocks.iter().position(|s| s.object_id == object_id)
    }

    /// O(n); index into `flows` for test inspection.
    pub fn flow_index(&self, object_id: ObjectId) -> Option<usize> {
        self.flows.iter().position(|f| f.object_id == object_id)
    }

    pub fn time_variable_index(&self) -> usize {
        self.builtins.time
    }

    pub fn time_delta_variable_index(&self) -> usize {
        self.builtins.time_delta
    }

    pub fn step_variable_index(&self) -> usize {
        self.builtins.simulation_step
    }
}
