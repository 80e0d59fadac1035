// Copyright 2025 The Stockflow Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Compilation is a pure function from a frame to either a
//! `SimulationPlan` or a `CompilerError` carrying per-object diagnostics.
//! Phases accumulate diagnostics instead of aborting: a failure on one
//! object never suppresses an unrelated diagnostic on another.

use std::collections::HashMap;

use crate::ast::{Expr0, UntypedCall};
use crate::builtins;
use crate::common::Ident;
use crate::constraints;
use crate::diagnostics::{CompilerError, Issue, IssueKind, IssueReporter};
use crate::frame::{Frame, ObjectId, ValueType};
use crate::metamodel::{Metamodel, ObjectType, STOCK_FLOW};
use crate::plan::{
    BoundBuiltins, BoundFlow, BoundStock, BuiltinKind, Chart, Computation, Expr, FlowIndexList,
    SeriesBinding, SimSpecs, SimulationObject, SimulationPlan, StateVariable, ValueBinding,
    VariableContent,
};
use crate::topology::{self, FlowLinks};
use crate::variable::{VarKind, Variable, analyze, resolve_names};

/// Compile a frame against the canonical stock-and-flow metamodel.
pub fn compile(frame: &Frame) -> Result<SimulationPlan, CompilerError> {
    Compiler::new(frame).compile()
}

pub struct Compiler<'a> {
    frame: &'a Frame,
    metamodel: &'a Metamodel,
}

impl<'a> Compiler<'a> {
    pub fn new(frame: &'a Frame) -> Self {
        Compiler {
            frame,
            metamodel: &STOCK_FLOW,
        }
    }

    pub fn with_metamodel(frame: &'a Frame, metamodel: &'a Metamodel) -> Self {
        Compiler { frame, metamodel }
    }

    pub fn compile(&self) -> Result<SimulationPlan, CompilerError> {
        let frame = self.frame;
        let mut issues = IssueReporter::new();

        constraints::check_frame(frame, self.metamodel, &mut issues);
        let names = resolve_names(frame, &mut issues);
        let variables = analyze(frame, &names, &mut issues);

        let links: HashMap<ObjectId, FlowLinks> = variables
            .iter()
            .filter(|v| v.kind.is_flow())
            .map(|v| (v.id, topology::flow_links(frame, v.id)))
            .collect();
        let stock_links = topology::stock_links(&variables, &links);

        // a flow may keep cloud (absent) endpoints, but it has to be
        // attached to something
        for v in variables.iter().filter(|v| v.kind.is_flow()) {
            let attached = frame
                .incoming(v.id)
                .chain(frame.outgoing(v.id))
                .any(|e| e.ty == ObjectType::Flow);
            if !attached {
                issues.report(v.id, Issue::new(&v.name, IssueKind::MissingRequiredParameter));
            }
        }

        let order = topology::computation_order(&variables, &mut issues);
        topology::check_flow_cycles(&variables, &links, &mut issues);

        if issues.has_errors() {
            return Err(CompilerError::Issues(issues.into_issues()));
        }

        let binder = Binder {
            frame,
            variables: variables.iter().map(|v| (v.id, v)).collect(),
            order,
            links,
            stock_links,
        };
        binder.emit(issues.into_warnings())
    }
}

struct Binder<'a> {
    frame: &'a Frame,
    variables: HashMap<ObjectId, &'a Variable>,
    order: Vec<ObjectId>,
    links: HashMap<ObjectId, FlowLinks>,
    stock_links: std::collections::BTreeMap<ObjectId, topology::StockLinks>,
}

fn internal_error<T>(msg: String) -> Result<T, CompilerError> {
    Err(CompilerError::InternalError(msg))
}

impl Binder<'_> {
    fn emit(&self, warnings: Vec<(ObjectId, Issue)>) -> Result<SimulationPlan, CompilerError> {
        // builtins own the fixed head of the state vector
        let mut state_variables: Vec<StateVariable> = BuiltinKind::all()
            .into_iter()
            .map(|kind| StateVariable {
                name: kind.name().to_owned(),
                value_type: match kind {
                    BuiltinKind::SimulationStep => ValueType::Int,
                    _ => ValueType::Double,
                },
                content: VariableContent::Builtin(kind),
            })
            .collect();

        // then one slot per simulation object in computation order
        let mut index_of: HashMap<ObjectId, usize> = HashMap::new();
        for id in &self.order {
            let var = self.variables[id];
            index_of.insert(*id, state_variables.len());
            state_variables.push(StateVariable {
                name: var.name.clone(),
                value_type: ValueType::Double,
                content: VariableContent::Object(*id),
            });
        }

        // stateful nodes own additional internal slots at the tail
        let mut internal_base: HashMap<ObjectId, usize> = HashMap::new();
        for id in &self.order {
            let var = self.variables[id];
            match &var.kind {
                VarKind::Delay { duration, .. } => {
                    internal_base.insert(*id, state_variables.len());
                    for i in 0..=*duration {
                        state_variables.push(StateVariable {
                            name: format!("{}:queue:{}", var.name, i),
                            value_type: ValueType::Double,
                            content: VariableContent::Internal {
                                owner: *id,
                                purpose: "delay queue".to_owned(),
                            },
                        });
                    }
                }
                VarKind::Smooth { .. } => {
                    internal_base.insert(*id, state_variables.len());
                    state_variables.push(StateVariable {
                        name: format!("{}:level", var.name),
                        value_type: ValueType::Double,
                        content: VariableContent::Internal {
                            owner: *id,
                            purpose: "running average".to_owned(),
                        },
                    });
                }
                _ => {}
            }
        }

        let mut objects: Vec<SimulationObject> = Vec::with_capacity(self.order.len());
        for id in &self.order {
            let var = self.variables[id];
            let computation = self.bind_computation(var, &index_of, &internal_base)?;
            objects.push(SimulationObject {
                object_id: *id,
                name: var.name.clone(),
                variable_index: index_of[id],
                computation,
            });
        }

        // stock-order and flow-order are order of appearance in the
        // computation order
        let stock_ids: Vec<ObjectId> = self
            .order
            .iter()
            .filter(|id| self.variables[id].kind.is_stock())
            .copied()
            .collect();
        let flow_ids: Vec<ObjectId> = self
            .order
            .iter()
            .filter(|id| self.variables[id].kind.is_flow())
            .copied()
            .collect();
        let stock_pos: HashMap<ObjectId, usize> =
            stock_ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        let flow_pos: HashMap<ObjectId, usize> =
            flow_ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();

        let flows: Vec<BoundFlow> = flow_ids
            .iter()
            .map(|id| {
                let links = &self.links[id];
                let priority = match self.variables[id].kind {
                    VarKind::Flow { priority } => priority,
                    _ => 0,
                };
                BoundFlow {
                    object_id: *id,
                    variable_index: index_of[id],
                    priority,
                    drains: links.drains.map(|s| stock_pos[&s]),
                    fills: links.fills.map(|s| stock_pos[&s]),
                }
            })
            .collect();

        let stocks: Vec<BoundStock> = stock_ids
            .iter()
            .map(|id| {
                let links = &self.stock_links[id];
                let mut inflows: FlowIndexList =
                    links.inflows.iter().map(|f| flow_pos[f]).collect();
                inflows.sort_unstable();
                // outflow order carries the adjustment priority
                let outflows: FlowIndexList =
                    links.outflows.iter().map(|f| flow_pos[f]).collect();
                let allows_negative = match self.variables[id].kind {
                    VarKind::Stock {
                        allows_negative, ..
                    } => allows_negative,
                    _ => false,
                };
                BoundStock {
                    object_id: *id,
                    variable_index: index_of[id],
                    allows_negative,
                    inflows,
                    outflows,
                }
            })
            .collect();

        Ok(SimulationPlan {
            objects,
            state_variables,
            builtins: BoundBuiltins {
                time: BuiltinKind::Time.offset(),
                time_delta: BuiltinKind::TimeDelta.offset(),
                simulation_step: BuiltinKind::SimulationStep.offset(),
            },
            stocks,
            flows,
            value_bindings: self.bind_controls(&index_of),
            charts: self.bind_charts(),
            sim_specs: self.bind_sim_specs(),
            warnings,
        })
    }

    fn bind_computation(
        &self,
        var: &Variable,
        index_of: &HashMap<ObjectId, usize>,
        internal_base: &HashMap<ObjectId, usize>,
    ) -> Result<Computation, CompilerError> {
        let input_index = |var: &Variable| -> Result<usize, CompilerError> {
            let input = match var.input {
                Some(input) => input,
                None => {
                    return internal_error(format!("'{}' has no bound input", var.name));
                }
            };
            match index_of.get(&input) {
                Some(index) => Ok(*index),
                None => internal_error(format!("input of '{}' has no slot", var.name)),
            }
        };

        match &var.kind {
            VarKind::Stock { .. } | VarKind::Flow { .. } | VarKind::Auxiliary => {
                let ast = match &var.ast {
                    Some(ast) => ast,
                    None => {
                        return internal_error(format!("'{}' reached binding without an AST", var.name));
                    }
                };
                let expr = self.bind_expr(var, ast, index_of)?;
                Ok(Computation::Formula(expr))
            }
            VarKind::Graphical { function } => Ok(Computation::GraphicalFunction {
                function: function.clone(),
                input_index: input_index(var)?,
            }),
            VarKind::Delay {
                duration,
                initial_value,
            } => Ok(Computation::Delay {
                duration: *duration,
                input_index: input_index(var)?,
                queue_base_index: internal_base[&var.id],
                initial_value: *initial_value,
            }),
            VarKind::Smooth {
                window_time,
                initial_value,
            } => Ok(Computation::Smooth {
                window_time: *window_time,
                input_index: input_index(var)?,
                state_index: internal_base[&var.id],
                initial_value: *initial_value,
            }),
        }
    }

    /// Rewrite an unbound tree into one whose leaves are state-vector
    /// offsets.  Resolution misses here are compiler bugs: parameter
    /// resolution already accounted for every free name.
    fn bind_expr(
        &self,
        var: &Variable,
        expr: &Expr0,
        index_of: &HashMap<ObjectId, usize>,
    ) -> Result<Expr, CompilerError> {
        let bound = match expr {
            Expr0::Const(_, n, loc) => Expr::Const(*n, *loc),
            Expr0::Var(name, loc) => {
                let index = self.resolve_name(var, name, index_of)?;
                Expr::Var(index, *loc)
            }
            Expr0::App(UntypedCall(name, args), loc) => {
                let args = args
                    .iter()
                    .map(|arg| self.bind_expr(var, arg, index_of))
                    .collect::<Result<Vec<Expr>, CompilerError>>()?;
                match builtins::instantiate(name, args) {
                    Some(builtin) => Expr::App(builtin, *loc),
                    None => {
                        return internal_error(format!(
                            "unchecked call to '{}' in '{}'",
                            name, var.name
                        ));
                    }
                }
            }
            Expr0::Op1(op, l, loc) => Expr::Op1(*op, Box::new(self.bind_expr(var, l, index_of)?), *loc),
            Expr0::Op2(op, l, r, loc) => Expr::Op2(
                *op,
                Box::new(self.bind_expr(var, l, index_of)?),
                Box::new(self.bind_expr(var, r, index_of)?),
                *loc,
            ),
            Expr0::If(cond, t, f, loc) => Expr::If(
                Box::new(self.bind_expr(var, cond, index_of)?),
                Box::new(self.bind_expr(var, t, index_of)?),
                Box::new(self.bind_expr(var, f, index_of)?),
                *loc,
            ),
        };
        Ok(bound)
    }

    fn resolve_name(
        &self,
        var: &Variable,
        name: &Ident,
        index_of: &HashMap<ObjectId, usize>,
    ) -> Result<usize, CompilerError> {
        if let Some(builtin) = BuiltinKind::from_name(name) {
            return Ok(builtin.offset());
        }
        let origin = match var.inputs.get(name) {
            Some(origin) => *origin,
            None => {
                return internal_error(format!(
                    "name '{}' in '{}' was never resolved",
                    name, var.name
                ));
            }
        };
        match index_of.get(&origin) {
            Some(index) => Ok(*index),
            None => internal_error(format!("parameter '{}' of '{}' has no slot", name, var.name)),
        }
    }

    fn bind_controls(&self, index_of: &HashMap<ObjectId, usize>) -> Vec<ValueBinding> {
        let mut controls: Vec<ObjectId> = self
            .frame
            .nodes()
            .filter(|n| n.ty == ObjectType::Control)
            .map(|n| n.id)
            .collect();
        controls.sort();

        let mut bindings = Vec::new();
        for control_id in controls {
            let target = self
                .frame
                .outgoing(control_id)
                .find(|e| e.ty == ObjectType::ValueBinding)
                .map(|e| e.target);
            let Some(target) = target else { continue };
            let Some(variable_index) = index_of.get(&target) else {
                continue;
            };
            bindings.push(ValueBinding {
                control_id,
                variable_index: *variable_index,
                min: self.frame.attr_f64(control_id, "min"),
                max: self.frame.attr_f64(control_id, "max"),
                step: self.frame.attr_f64(control_id, "step"),
            });
        }
        bindings
    }

    fn bind_charts(&self) -> Vec<Chart> {
        let mut chart_ids: Vec<ObjectId> = self
            .frame
            .nodes()
            .filter(|n| n.ty == ObjectType::Chart)
            .map(|n| n.id)
            .collect();
        chart_ids.sort();

        chart_ids
            .into_iter()
            .map(|chart_id| {
                let mut edges: Vec<_> = self
                    .frame
                    .outgoing(chart_id)
                    .filter(|e| e.ty == ObjectType::ChartSeries)
                    .collect();
                edges.sort_by_key(|e| e.id);
                let series = edges
                    .into_iter()
                    .map(|e| SeriesBinding {
                        node_id: e.target,
                        color: e.attribute("color").and_then(|v| v.as_str()).map(str::to_owned),
                    })
                    .collect();
                Chart { chart_id, series }
            })
            .collect()
    }

    fn bind_sim_specs(&self) -> Option<SimSpecs> {
        let mut sims: Vec<ObjectId> = self
            .frame
            .nodes()
            .filter(|n| n.ty == ObjectType::Simulation)
            .map(|n| n.id)
            .collect();
        sims.sort();
        let id = *sims.first()?;

        let initial_time = self.frame.attr_f64(id, "initial_time").unwrap_or(0.0);
        let time_delta = self.frame.attr_f64(id, "time_delta").unwrap_or(1.0);
        let end_time = self.frame.attr_f64(id, "end_time").unwrap_or(10.0);
        let steps = self.frame.attr_i64(id, "steps").unwrap_or_else(|| {
            if time_delta > 0.0 {
                ((end_time - initial_time) / time_delta).round() as i64
            } else {
                0
            }
        });

        Some(SimSpecs {
            initial_time,
            time_delta,
            end_time,
            steps: steps.max(0),
        })
    }
}
