// Copyright 2025 The Stockflow Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap, HashSet};

use crate::diagnostics::{Issue, IssueKind, IssueReporter};
use crate::frame::{Frame, ObjectId};
use crate::metamodel::ObjectType;
use crate::variable::{VarKind, Variable};

/// Where a flow rate pulls from and pushes to.  A cloud endpoint is the
/// sentinel absent link.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub(crate) struct FlowLinks {
    pub drains: Option<ObjectId>,
    pub fills: Option<ObjectId>,
}

/// The metamodel's cardinality rules guarantee at most one incoming and
/// one outgoing flow edge per rate, so the first match is the only one.
pub(crate) fn flow_links(frame: &Frame, flow_id: ObjectId) -> FlowLinks {
    let stock_endpoint = |id: ObjectId| -> Option<ObjectId> {
        match frame.node(id).map(|n| n.ty) {
            Some(ObjectType::Stock) => Some(id),
            _ => None, // cloud or missing
        }
    };

    let drains = frame
        .incoming(flow_id)
        .find(|e| e.ty == ObjectType::Flow)
        .and_then(|e| stock_endpoint(e.origin));
    let fills = frame
        .outgoing(flow_id)
        .find(|e| e.ty == ObjectType::Flow)
        .and_then(|e| stock_endpoint(e.target));

    FlowLinks { drains, fills }
}

/// Per-stock flow sets derived from the drain/fill links.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct StockLinks {
    /// flows whose `fills` is this stock, sorted by flow object id
    pub inflows: Vec<ObjectId>,
    /// flows whose `drains` is this stock, sorted by `(priority, id)`;
    /// binding for the non-negativity adjustment
    pub outflows: Vec<ObjectId>,
}

pub(crate) fn stock_links(
    variables: &[Variable],
    links: &HashMap<ObjectId, FlowLinks>,
) -> BTreeMap<ObjectId, StockLinks> {
    let mut stocks: BTreeMap<ObjectId, StockLinks> = variables
        .iter()
        .filter(|v| v.kind.is_stock())
        .map(|v| (v.id, StockLinks::default()))
        .collect();

    let mut priorities: HashMap<ObjectId, i64> = HashMap::new();
    for v in variables {
        if let VarKind::Flow { priority } = v.kind {
            priorities.insert(v.id, priority);
        }
    }

    let mut flow_ids: Vec<ObjectId> = links.keys().copied().collect();
    flow_ids.sort();
    for flow_id in flow_ids {
        let link = &links[&flow_id];
        if let Some(stock) = link.fills
            && let Some(entry) = stocks.get_mut(&stock)
        {
            entry.inflows.push(flow_id);
        }
        if let Some(stock) = link.drains
            && let Some(entry) = stocks.get_mut(&stock)
        {
            entry.outflows.push(flow_id);
        }
    }

    for entry in stocks.values_mut() {
        entry
            .outflows
            .sort_by_key(|id| (priorities.get(id).copied().unwrap_or(0), *id));
    }

    stocks
}

fn rank(kind: &VarKind) -> u8 {
    match kind {
        VarKind::Stock { .. } => 0,
        VarKind::Flow { .. } => 1,
        _ => 2,
    }
}

/// Topologically sort the computed objects along must-be-computed-before
/// edges (parameter and unnamed-input dependencies; stocks depend on
/// nothing at step time).  Ties break on `(structural-priority, id)`:
/// stocks first, then flow rates, then the rest.  A cycle marks every
/// participating object with `computation_cycle`.
pub(crate) fn computation_order(
    variables: &[Variable],
    issues: &mut IssueReporter,
) -> Vec<ObjectId> {
    let by_id: HashMap<ObjectId, &Variable> = variables.iter().map(|v| (v.id, v)).collect();

    // dependency -> dependents, dependencies filtered to computed objects
    let mut out_edges: HashMap<ObjectId, Vec<ObjectId>> = HashMap::new();
    let mut in_degree: HashMap<ObjectId, usize> = variables.iter().map(|v| (v.id, 0)).collect();
    for v in variables {
        for dep in v.dependencies() {
            if !by_id.contains_key(&dep) {
                continue;
            }
            out_edges.entry(dep).or_default().push(v.id);
            *in_degree.get_mut(&v.id).unwrap() += 1;
        }
    }
    for targets in out_edges.values_mut() {
        targets.sort();
    }

    let key = |id: ObjectId| (rank(&by_id[&id].kind), id);

    let mut ready: BinaryHeap<Reverse<(u8, ObjectId)>> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| Reverse(key(*id)))
        .collect();

    let mut order: Vec<ObjectId> = Vec::with_capacity(variables.len());
    while let Some(Reverse((_, id))) = ready.pop() {
        order.push(id);
        for dependent in out_edges.get(&id).map(Vec::as_slice).unwrap_or(&[]) {
            let degree = in_degree.get_mut(dependent).unwrap();
            *degree -= 1;
            if *degree == 0 {
                ready.push(Reverse(key(*dependent)));
            }
        }
    }

    if order.len() < variables.len() {
        let ordered: HashSet<ObjectId> = order.iter().copied().collect();
        let mut leftover: Vec<ObjectId> = variables
            .iter()
            .map(|v| v.id)
            .filter(|id| !ordered.contains(id))
            .collect();

        // only objects on a cycle are participants; objects merely
        // downstream of one stay unmarked
        let dep_edges: HashMap<ObjectId, Vec<ObjectId>> = leftover
            .iter()
            .map(|id| {
                let deps = by_id[id]
                    .dependencies()
                    .into_iter()
                    .filter(|dep| !ordered.contains(dep) && by_id.contains_key(dep))
                    .collect();
                (*id, deps)
            })
            .collect();
        for id in cyclic_members(&leftover, &dep_edges) {
            let name = by_id[&id].name.clone();
            issues.report(id, Issue::new(&name, IssueKind::ComputationCycle));
        }

        leftover.sort_by_key(|id| key(*id));
        order.extend(leftover);
    }

    order
}

/// Construct the stock flow graph (stocks as nodes, flow rates as
/// `drains -> fills` edges) and flag cycles.  A participating stock with
/// `delayed_inflow` consumes its previous-step value, which breaks the
/// dependency at that stock: edges into it are dropped before the check.
pub(crate) fn check_flow_cycles(
    variables: &[Variable],
    links: &HashMap<ObjectId, FlowLinks>,
    issues: &mut IssueReporter,
) {
    let mut delayed: HashSet<ObjectId> = HashSet::new();
    let mut stock_names: HashMap<ObjectId, &str> = HashMap::new();
    for v in variables {
        if let VarKind::Stock { delayed_inflow, .. } = v.kind {
            stock_names.insert(v.id, &v.name);
            if delayed_inflow {
                delayed.insert(v.id);
            }
        }
    }

    let mut nodes: Vec<ObjectId> = stock_names.keys().copied().collect();
    nodes.sort();

    let mut edges: HashMap<ObjectId, Vec<ObjectId>> =
        nodes.iter().map(|id| (*id, Vec::new())).collect();
    let mut flow_ids: Vec<ObjectId> = links.keys().copied().collect();
    flow_ids.sort();
    for flow_id in flow_ids {
        let link = &links[&flow_id];
        if let (Some(drains), Some(fills)) = (link.drains, link.fills) {
            if delayed.contains(&fills) {
                continue;
            }
            if stock_names.contains_key(&drains) && stock_names.contains_key(&fills) {
                edges.get_mut(&drains).unwrap().push(fills);
            }
        }
    }

    for id in cyclic_members(&nodes, &edges) {
        issues.report(id, Issue::new(stock_names[&id], IssueKind::FlowCycle));
    }
}

/// Members of non-trivial strongly connected components (size > 1, or a
/// single node with a self-edge), in deterministic order.
fn cyclic_members(
    nodes: &[ObjectId],
    edges: &HashMap<ObjectId, Vec<ObjectId>>,
) -> Vec<ObjectId> {
    struct Tarjan<'a> {
        edges: &'a HashMap<ObjectId, Vec<ObjectId>>,
        index: HashMap<ObjectId, usize>,
        lowlink: HashMap<ObjectId, usize>,
        on_stack: HashSet<ObjectId>,
        stack: Vec<ObjectId>,
        next_index: usize,
        sccs: Vec<Vec<ObjectId>>,
    }

    impl Tarjan<'_> {
        fn visit(&mut self, v: ObjectId) {
            self.index.insert(v, self.next_index);
            self.lowlink.insert(v, self.next_index);
            self.next_index += 1;
            self.stack.push(v);
            self.on_stack.insert(v);

            let edges = self.edges;
            for w in edges.get(&v).map(Vec::as_slice).unwrap_or(&[]) {
                if !self.index.contains_key(w) {
                    self.visit(*w);
                    let low = self.lowlink[&v].min(self.lowlink[w]);
                    self.lowlink.insert(v, low);
                } else if self.on_stack.contains(w) {
                    let low = self.lowlink[&v].min(self.index[w]);
                    self.lowlink.insert(v, low);
                }
            }

            if self.lowlink[&v] == self.index[&v] {
                let mut scc = Vec::new();
                while let Some(w) = self.stack.pop() {
                    self.on_stack.remove(&w);
                    scc.push(w);
                    if w == v {
                        break;
                    }
                }
                self.sccs.push(scc);
            }
        }
    }

    let mut tarjan = Tarjan {
        edges,
        index: HashMap::new(),
        lowlink: HashMap::new(),
        on_stack: HashSet::new(),
        stack: Vec::new(),
        next_index: 0,
        sccs: Vec::new(),
    };
    for v in nodes {
        if !tarjan.index.contains_key(v) {
            tarjan.visit(*v);
        }
    }

    let mut members: Vec<ObjectId> = Vec::new();
    for scc in tarjan.sccs {
        let self_loop = scc.len() == 1
            && edges
                .get(&scc[0])
                .map(|targets| targets.contains(&scc[0]))
                .unwrap_or(false);
        if scc.len() > 1 || self_loop {
            members.extend(scc);
        }
    }
    members.sort();
    members
}
