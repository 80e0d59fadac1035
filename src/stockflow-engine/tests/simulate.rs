// Copyright 2025 The Stockflow Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::HashMap;

use float_cmp::approx_eq;

use stockflow_engine::{
    CompilerError, FlowScaling, Frame, InitOptions, IssueKind, ObjectId, ObjectType, Severity,
    SimulationState, Simulator, Value, compile,
};

fn stock(frame: &mut Frame, name: &str, initial: f64) -> ObjectId {
    let id = frame.add_node(ObjectType::Stock);
    frame.set_attribute(id, "name", Value::String(name.to_owned()));
    frame.set_attribute(id, "formula", Value::String(format!("{}", initial)));
    id
}

fn flow(frame: &mut Frame, name: &str, formula: &str) -> ObjectId {
    let id = frame.add_node(ObjectType::FlowRate);
    frame.set_attribute(id, "name", Value::String(name.to_owned()));
    frame.set_attribute(id, "formula", Value::String(formula.to_owned()));
    id
}

fn aux(frame: &mut Frame, name: &str, formula: &str) -> ObjectId {
    let id = frame.add_node(ObjectType::Auxiliary);
    frame.set_attribute(id, "name", Value::String(name.to_owned()));
    frame.set_attribute(id, "formula", Value::String(formula.to_owned()));
    id
}

fn connect(frame: &mut Frame, rate: ObjectId, drains: Option<ObjectId>, fills: Option<ObjectId>) {
    if let Some(source) = drains {
        frame.add_edge(ObjectType::Flow, source, rate);
    }
    if let Some(target) = fills {
        frame.add_edge(ObjectType::Flow, rate, target);
    }
}

fn run_steps(frame: &Frame, n: usize) -> (stockflow_engine::SimulationPlan, SimulationState) {
    let plan = compile(frame).unwrap();
    let sim = Simulator::new(&plan);
    let mut state = sim.initialize(&InitOptions::default()).unwrap();
    for _ in 0..n {
        state = sim.step(&state).unwrap();
    }
    (plan.clone(), state)
}

#[test]
fn kettle_to_cup() {
    let mut frame = Frame::new();
    let kettle = stock(&mut frame, "kettle", 1000.0);
    let cup = stock(&mut frame, "cup", 0.0);
    let pour = flow(&mut frame, "pour", "100");
    connect(&mut frame, pour, Some(kettle), Some(cup));

    let plan = compile(&frame).unwrap();
    let sim = Simulator::new(&plan);
    let s0 = sim.initialize(&InitOptions::default()).unwrap();
    let kettle_index = plan.variable_index(kettle).unwrap();
    let cup_index = plan.variable_index(cup).unwrap();

    assert_eq!(1000.0, s0.get(kettle_index));
    assert_eq!(0.0, s0.get(cup_index));

    let s1 = sim.step(&s0).unwrap();
    assert_eq!(900.0, s1.get(kettle_index));
    assert_eq!(100.0, s1.get(cup_index));
    assert_eq!(1.0, s1.time);

    let s2 = sim.step(&s1).unwrap();
    assert_eq!(800.0, s2.get(kettle_index));
    assert_eq!(200.0, s2.get(cup_index));
    assert_eq!(2, s2.step);
}

#[test]
fn non_negative_drain_clamps_at_zero() {
    let mut frame = Frame::new();
    let s = stock(&mut frame, "s", 5.0);
    let sink = stock(&mut frame, "sink", 0.0);
    let f = flow(&mut frame, "f", "10");
    connect(&mut frame, f, Some(s), Some(sink));

    let (plan, s1) = run_steps(&frame, 1);
    assert_eq!(0.0, s1.get(plan.variable_index(s).unwrap()));
    assert_eq!(5.0, s1.get(plan.variable_index(sink).unwrap()));
}

#[test]
fn prioritized_outflows_scale_uniformly() {
    let mut frame = Frame::new();
    let s = stock(&mut frame, "s", 12.0);
    let a = stock(&mut frame, "a", 0.0);
    let b = stock(&mut frame, "b", 0.0);
    let a_rate = flow(&mut frame, "a_rate", "10");
    let b_rate = flow(&mut frame, "b_rate", "20");
    frame.set_attribute(a_rate, "priority", Value::Int(1));
    frame.set_attribute(b_rate, "priority", Value::Int(2));
    connect(&mut frame, a_rate, Some(s), Some(a));
    connect(&mut frame, b_rate, Some(s), Some(b));

    let plan = compile(&frame).unwrap();
    let sim = Simulator::new(&plan).with_flow_scaling(FlowScaling::OutflowFirst);
    let s0 = sim.initialize(&InitOptions::default()).unwrap();
    let s1 = sim.step(&s0).unwrap();

    // each outflow scaled by 12/30 = 0.4
    assert!(approx_eq!(f64, 4.0, s1.get(plan.variable_index(a).unwrap())));
    assert!(approx_eq!(f64, 8.0, s1.get(plan.variable_index(b).unwrap())));
    assert!(approx_eq!(f64, 0.0, s1.get(plan.variable_index(s).unwrap())));

    // the adjustment order is the (priority, id) outflow order
    let s_stock = &plan.stocks[plan.stock_index(s).unwrap()];
    let first = &plan.flows[s_stock.outflows[0]];
    assert_eq!(a_rate, first.object_id);
}

#[test]
fn flow_cycle_is_fatal_until_a_stock_delays_its_inflow() {
    let mut frame = Frame::new();
    let a = stock(&mut frame, "a", 1.0);
    let b = stock(&mut frame, "b", 1.0);
    let f_ab = flow(&mut frame, "f_ab", "1");
    let f_ba = flow(&mut frame, "f_ba", "1");
    connect(&mut frame, f_ab, Some(a), Some(b));
    connect(&mut frame, f_ba, Some(b), Some(a));

    match compile(&frame) {
        Err(CompilerError::Issues(issues)) => {
            for id in [a, b] {
                assert!(
                    issues[&id]
                        .iter()
                        .any(|issue| issue.error == IssueKind::FlowCycle),
                    "missing flow_cycle on {}",
                    id
                );
            }
        }
        other => panic!("expected flow_cycle issues, got {:?}", other.map(|_| ())),
    }

    frame.set_attribute(a, "delayed_inflow", Value::Bool(true));
    assert!(compile(&frame).is_ok());
}

#[test]
fn graphical_function_interpolation_methods() {
    let methods: &[(&str, f64)] = &[("linear", 50.0), ("step", 0.0), ("nearestStep", 0.0)];

    for (method, expected) in methods {
        let mut frame = Frame::new();
        let x = aux(&mut frame, "x", "5");
        let gf = frame.add_node(ObjectType::GraphicalFunction);
        frame.set_attribute(gf, "name", Value::String("g".to_owned()));
        frame.set_attribute(
            gf,
            "points",
            Value::Points(vec![(0.0, 0.0), (10.0, 100.0)]),
        );
        frame.set_attribute(
            gf,
            "interpolation_method",
            Value::String(method.to_string()),
        );
        frame.add_edge(ObjectType::Parameter, x, gf);

        let (plan, s0) = run_steps(&frame, 0);
        assert_eq!(
            *expected,
            s0.get(plan.variable_index(gf).unwrap()),
            "with {} interpolation",
            method
        );
    }
}

#[test]
fn computation_cycle_is_fatal() {
    let mut frame = Frame::new();
    let a = aux(&mut frame, "a", "b");
    let b = aux(&mut frame, "b", "a");
    frame.add_edge(ObjectType::Parameter, a, b);
    frame.add_edge(ObjectType::Parameter, b, a);

    match compile(&frame) {
        Err(CompilerError::Issues(issues)) => {
            for id in [a, b] {
                assert!(
                    issues[&id]
                        .iter()
                        .any(|issue| issue.error == IssueKind::ComputationCycle),
                    "missing computation_cycle on {}",
                    id
                );
            }
        }
        other => panic!("expected computation_cycle issues, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn delay_identity() {
    // a delay of duration d with constant input x and initial value 0
    // emits 0 for steps 1..d and x from step d+1 on
    let d = 4usize;
    let x = 11.0;

    let mut frame = Frame::new();
    let input = aux(&mut frame, "input", &format!("{}", x));
    let delay = frame.add_node(ObjectType::Delay);
    frame.set_attribute(delay, "name", Value::String("transport".to_owned()));
    frame.set_attribute(delay, "delay_duration", Value::Int(d as i64));
    frame.add_edge(ObjectType::Parameter, input, delay);

    let plan = compile(&frame).unwrap();
    let sim = Simulator::new(&plan);
    let out = plan.variable_index(delay).unwrap();
    let mut state = sim.initialize(&InitOptions::default()).unwrap();

    for step in 1..=d {
        state = sim.step(&state).unwrap();
        assert_eq!(0.0, state.get(out), "step {}", step);
    }
    state = sim.step(&state).unwrap();
    assert_eq!(x, state.get(out), "step {}", d + 1);
}

#[test]
fn parameter_paths_precede_dependents() {
    // P1: a parameter path a -> b -> c orders the variable indices
    let mut frame = Frame::new();
    let a = aux(&mut frame, "a", "2");
    let b = aux(&mut frame, "b", "a * 3");
    let c = aux(&mut frame, "c", "b + 1");
    frame.add_edge(ObjectType::Parameter, a, b);
    frame.add_edge(ObjectType::Parameter, b, c);

    let (plan, s0) = run_steps(&frame, 0);
    let ai = plan.variable_index(a).unwrap();
    let bi = plan.variable_index(b).unwrap();
    let ci = plan.variable_index(c).unwrap();
    assert!(ai < bi && bi < ci);
    assert_eq!(7.0, s0.get(ci));
}

#[test]
fn state_vector_indices_are_a_bijection() {
    // P2: object slots form a prefix right after the builtin slots
    let mut frame = Frame::new();
    let s = stock(&mut frame, "s", 1.0);
    let f = flow(&mut frame, "f", "s * 0.5");
    frame.add_edge(ObjectType::Parameter, s, f);
    connect(&mut frame, f, Some(s), None);
    aux(&mut frame, "helper", "time + 1");

    let plan = compile(&frame).unwrap();
    let mut indices: Vec<usize> = plan.objects.iter().map(|o| o.variable_index).collect();
    indices.sort_unstable();
    let first = plan.step_variable_index() + 1;
    assert_eq!(
        (first..first + plan.objects.len()).collect::<Vec<usize>>(),
        indices
    );
}

#[test]
fn warnings_do_not_block_compilation() {
    let mut frame = Frame::new();
    let a = aux(&mut frame, "a", "1");
    let b = aux(&mut frame, "b", "2");
    frame.add_edge(ObjectType::Parameter, a, b);

    let plan = compile(&frame).unwrap();
    assert_eq!(1, plan.warnings.len());
    let (on, issue) = &plan.warnings[0];
    assert_eq!(b, *on);
    assert_eq!(Severity::Warning, issue.severity);
}

#[test]
fn diagnostics_accumulate_across_objects() {
    // a broken formula on one object must not hide issues on another
    let mut frame = Frame::new();
    let broken = aux(&mut frame, "broken", "1 + +");
    let dup_a = aux(&mut frame, "dup", "1");
    let dup_b = aux(&mut frame, "dup", "2");

    match compile(&frame) {
        Err(CompilerError::Issues(issues)) => {
            assert!(issues[&broken]
                .iter()
                .any(|issue| issue.error.code() == "syntax_error"));
            assert!(issues[&dup_a]
                .iter()
                .any(|issue| issue.error.code() == "duplicate_name"));
            assert!(issues.contains_key(&dup_b));
        }
        other => panic!("expected issues, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn cloud_endpoints_are_absent_links() {
    let mut frame = Frame::new();
    let cloud = frame.add_node(ObjectType::Cloud);
    let s = stock(&mut frame, "s", 0.0);
    let faucet = flow(&mut frame, "faucet", "3");
    frame.add_edge(ObjectType::Flow, cloud, faucet);
    frame.add_edge(ObjectType::Flow, faucet, s);

    let plan = compile(&frame).unwrap();
    let bound = &plan.flows[plan.flow_index(faucet).unwrap()];
    assert_eq!(None, bound.drains);
    assert_eq!(Some(plan.stock_index(s).unwrap()), bound.fills);

    let sim = Simulator::new(&plan);
    let mut state = sim.initialize(&InitOptions::default()).unwrap();
    for _ in 0..3 {
        state = sim.step(&state).unwrap();
    }
    assert_eq!(9.0, state.get(plan.variable_index(s).unwrap()));
}

#[test]
fn teacup_cools_toward_room_temperature() {
    // a classic first-order model: a stock parameterizes its own drain,
    // d(temp)/dt = -(temp - room) / tau
    let mut frame = Frame::new();
    let temp = stock(&mut frame, "temperature", 100.0);
    let room = aux(&mut frame, "room", "20");
    let cooling = flow(&mut frame, "cooling", "(temperature - room) / 5");
    frame.add_edge(ObjectType::Parameter, temp, cooling);
    frame.add_edge(ObjectType::Parameter, room, cooling);
    connect(&mut frame, cooling, Some(temp), None);

    let plan = compile(&frame).unwrap();
    let sim = Simulator::new(&plan);
    let temp_index = plan.variable_index(temp).unwrap();

    let s0 = sim.initialize(&InitOptions::default()).unwrap();
    let s1 = sim.step(&s0).unwrap();
    assert!(approx_eq!(f64, 84.0, s1.get(temp_index)));

    let mut state = s0;
    let mut previous = state.get(temp_index);
    for _ in 0..20 {
        state = sim.step(&state).unwrap();
        let current = state.get(temp_index);
        assert!(current < previous, "cooling must be monotone");
        assert!(current >= 20.0 - 1e-9, "cannot cool below room");
        previous = current;
    }
}

#[test]
fn overrides_and_dt_options() {
    let mut frame = Frame::new();
    let s = stock(&mut frame, "s", 100.0);
    let f = flow(&mut frame, "f", "10");
    connect(&mut frame, f, Some(s), None);

    let plan = compile(&frame).unwrap();
    let sim = Simulator::new(&plan);
    let state = sim
        .initialize(&InitOptions {
            time: Some(5.0),
            time_delta: Some(0.5),
            overrides: HashMap::from([(s, 30.0)]),
        })
        .unwrap();
    let s_index = plan.variable_index(s).unwrap();
    assert_eq!(30.0, state.get(s_index));
    assert_eq!(5.0, state.time);

    // with dt = 0.5 the flow moves half its rate per step
    let next = sim.step(&state).unwrap();
    assert_eq!(25.0, next.get(s_index));
    assert_eq!(5.5, next.time);
}
