//! `Program`: owns the node table, the DDDG, the labelmaps, the loop
//! boundary list, and the call-argument map. Filled by the DDDG builder,
//! mutated in place by the optimization passes, read-only during scheduling.

use std::collections::{HashMap, VecDeque};

use indexmap::IndexMap;
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::graph::{Dddg, EdgeKind};
use crate::node::{ExecNode, NodeId};
use crate::source::{DynamicLabel, DynamicVariable, UniqueLabel};

/// A dynamic loop boundary: a branch/call node plus the loop depth its
/// target sits at. Populated by `LoopUnrolling`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopBound {
    pub node_id: NodeId,
    pub target_loop_depth: u32,
}

/// Maps a callee-side dynamic register back to the caller's, transitively.
/// Read-mostly after the DDDG builder finishes; `lookup` walks (and does
/// not need to shorten) the chain since it is always shallow in practice.
#[derive(Debug, Default, Clone)]
pub struct CallArgMap {
    map: HashMap<DynamicVariable, DynamicVariable>,
}

impl CallArgMap {
    pub fn add(&mut self, callee: DynamicVariable, caller: DynamicVariable) {
        self.map.insert(callee, caller);
    }

    /// Follow the chain of caller mappings until reaching a variable with no
    /// further mapping; that is the canonical (top-level) name.
    pub fn lookup(&self, mut var: DynamicVariable) -> DynamicVariable {
        let mut guard = 0;
        while let Some(&next) = self.map.get(&var) {
            var = next;
            guard += 1;
            if guard > self.map.len() + 1 {
                // A cycle would be a builder bug; bail rather than loop forever.
                break;
            }
        }
        var
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }
}

#[derive(Default)]
pub struct Program {
    /// Complete set of execution nodes, iterable in emission (node_id)
    /// order — required by several passes and by the scheduler.
    pub nodes: IndexMap<NodeId, ExecNode>,
    pub graph: Dddg,
    /// Line number -> every `UniqueLabel` declared on that line (a multimap,
    /// since multiple source files can collide on a line number).
    pub labelmap: HashMap<u32, Vec<UniqueLabel>>,
    /// Inlined label -> original label it was inlined from.
    pub inline_labelmap: HashMap<UniqueLabel, UniqueLabel>,
    /// Loop boundary entries, populated by `LoopUnrolling`, in strictly
    /// increasing node_id order.
    pub loop_bounds: Vec<LoopBound>,
    pub call_arg_map: CallArgMap,
}

impl Program {
    pub fn new() -> Self {
        Program::default()
    }

    /// Reset all per-invocation state, leaving no trace of the previous run.
    /// Source ids are owned by `SourceManager`, not `Program`, so they
    /// persist across this call (see spec §3 lifecycle).
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.graph.clear();
        self.labelmap.clear();
        self.inline_labelmap.clear();
        self.loop_bounds.clear();
        self.call_arg_map.clear();
    }

    /// Insert a new node. Node ids must be inserted in ascending order
    /// (the builder's emission order); this keeps `petgraph::NodeIndex`
    /// aligned with `node_id`.
    pub fn insert_node(&mut self, mut node: ExecNode) -> NodeId {
        let node_id = node.node_id;
        let vertex = self.graph.add_node(());
        debug_assert_eq!(vertex.index() as u32, node_id);
        node.set_vertex(vertex);
        self.nodes.insert(node_id, node);
        node_id
    }

    pub fn node(&self, node_id: NodeId) -> &ExecNode {
        &self.nodes[&node_id]
    }

    pub fn node_mut(&mut self, node_id: NodeId) -> &mut ExecNode {
        &mut self.nodes[&node_id]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Add an edge `from -> to` tagged `kind`. Self-edges are forbidden
    /// (invariant 1). Duplicate inserts of the same `(from, to, kind)` are a
    /// no-op, implementing the "remove-then-add, `doesEdgeExist` guards
    /// every insertion" rule from the design notes.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId, kind: EdgeKind) {
        assert_ne!(from, to, "self-edges are forbidden (node {from})");
        if self.edge_exists_with_kind(from, to, kind) {
            return;
        }
        self.graph
            .add_edge(self.node(from).vertex(), self.node(to).vertex(), kind);
        self.node_mut(from).isolated = false;
        self.node_mut(to).isolated = false;
    }

    /// Remove every edge between `from` and `to`, regardless of kind.
    pub fn remove_edge(&mut self, from: NodeId, to: NodeId) {
        let (fv, tv) = (self.node(from).vertex(), self.node(to).vertex());
        while let Some(e) = self.graph.find_edge(fv, tv) {
            self.graph.remove_edge(e);
        }
    }

    pub fn edge_exists(&self, from: NodeId, to: NodeId) -> bool {
        self.graph
            .find_edge(self.node(from).vertex(), self.node(to).vertex())
            .is_some()
    }

    pub fn edge_exists_with_kind(&self, from: NodeId, to: NodeId, kind: EdgeKind) -> bool {
        self.out_edges(from).any(|(to_id, k)| to_id == to && k == kind)
    }

    pub fn edge_kind(&self, from: NodeId, to: NodeId) -> Option<EdgeKind> {
        self.graph
            .find_edge(self.node(from).vertex(), self.node(to).vertex())
            .map(|e| self.graph[e])
    }

    /// Isolate a node: remove every edge touching it. Node ids are never
    /// reused, matching the original's `clear_vertex` (not a true removal).
    pub fn isolate_node(&mut self, node_id: NodeId) {
        let vertex = self.node(node_id).vertex();
        let incident: Vec<_> = self
            .graph
            .edges_directed(vertex, Direction::Incoming)
            .chain(self.graph.edges_directed(vertex, Direction::Outgoing))
            .map(|e| e.id())
            .collect();
        for e in incident {
            self.graph.remove_edge(e);
        }
        self.node_mut(node_id).isolated = true;
    }

    /// Isolate any node left with no incident edges after a rewrite. Run
    /// after every pass that may have created dead nodes.
    pub fn clean_leaf_nodes(&mut self) {
        let dangling: Vec<NodeId> = self
            .nodes
            .values()
            .filter(|n| !n.isolated && self.graph.edges(n.vertex()).next().is_none()
                && self.graph.edges_directed(n.vertex(), Direction::Incoming).next().is_none())
            .map(|n| n.node_id)
            .collect();
        for node_id in dangling {
            self.node_mut(node_id).isolated = true;
        }
    }

    pub fn out_edges(&self, node_id: NodeId) -> impl Iterator<Item = (NodeId, EdgeKind)> + '_ {
        self.graph
            .edges_directed(self.node(node_id).vertex(), Direction::Outgoing)
            .map(|e| (e.target().index() as NodeId, *e.weight()))
    }

    pub fn in_edges(&self, node_id: NodeId) -> impl Iterator<Item = (NodeId, EdgeKind)> + '_ {
        self.graph
            .edges_directed(self.node(node_id).vertex(), Direction::Incoming)
            .map(|e| (e.source().index() as NodeId, *e.weight()))
    }

    pub fn child_nodes(&self, node_id: NodeId) -> Vec<NodeId> {
        self.out_edges(node_id).map(|(id, _)| id).collect()
    }

    pub fn parent_nodes(&self, node_id: NodeId) -> Vec<NodeId> {
        self.in_edges(node_id).map(|(id, _)| id).collect()
    }

    pub fn in_degree(&self, node_id: NodeId) -> usize {
        self.graph
            .edges_directed(self.node(node_id).vertex(), Direction::Incoming)
            .count()
    }

    pub fn out_degree(&self, node_id: NodeId) -> usize {
        self.graph
            .edges_directed(self.node(node_id).vertex(), Direction::Outgoing)
            .count()
    }

    /// Resolve the `UniqueLabel` covering `node`'s source line, if any. A
    /// node whose line has no labelmap entry (labelmap absent, or line
    /// simply unlabeled) has no unique label.
    pub fn unique_label_for_node(&self, node_id: NodeId) -> Option<UniqueLabel> {
        let line = self.node(node_id).line_num;
        if line < 0 {
            return None;
        }
        self.labelmap.get(&(line as u32)).and_then(|labels| {
            let node_func = self.node(node_id).function_id;
            labels
                .iter()
                .find(|l| l.function_id == node_func)
                .copied()
                .or_else(|| labels.first().copied())
        })
    }

    /// Return `(first_branch, second_branch)` pairs bounding each iteration
    /// of the loop identified by `label`, reading directly from
    /// `loop_bounds`: consecutive entries whose node resolves to `label`
    /// bound one iteration.
    pub fn find_loop_boundaries(&self, label: UniqueLabel) -> Vec<(NodeId, NodeId)> {
        let matches: Vec<NodeId> = self
            .loop_bounds
            .iter()
            .filter(|b| self.unique_label_for_node(b.node_id) == Some(label))
            .map(|b| b.node_id)
            .collect();
        matches.windows(2).map(|w| (w[0], w[1])).collect()
    }

    /// Return `(first_branch, second_branch)` pairs for a single dynamic
    /// (invocation-qualified) loop occurrence.
    pub fn find_dynamic_loop_boundaries(&self, label: DynamicLabel) -> Vec<(NodeId, NodeId)> {
        self.find_loop_boundaries(label.unique_label)
            .into_iter()
            .filter(|&(start, _)| {
                self.node(start).dynamic_invocation == label.dyn_func.iteration
            })
            .collect()
    }

    /// Return the `(Call, Ret)` node pairs bounding every invocation of
    /// `function_id`.
    pub fn find_function_boundaries(&self, function_id: crate::source::SrcId) -> Vec<(NodeId, NodeId)> {
        use crate::microop::Microop;
        let mut calls: Vec<NodeId> = Vec::new();
        let mut rets: Vec<NodeId> = Vec::new();
        for node in self.nodes.values() {
            if node.function_id == function_id {
                match node.microop {
                    Microop::Call => calls.push(node.node_id),
                    Microop::Ret => rets.push(node.node_id),
                    _ => {}
                }
            }
        }
        calls.into_iter().zip(rets).collect()
    }

    /// BFS shortest distance between two nodes that does not traverse
    /// control edges, treating every other edge as unit distance. Returns
    /// `-1` if unreachable, matching the original's sentinel.
    pub fn shortest_distance_between_nodes(&self, from: NodeId, to: NodeId) -> i64 {
        if from == to {
            return 0;
        }
        let mut visited: std::collections::HashSet<NodeId> = std::collections::HashSet::new();
        let mut queue: VecDeque<(NodeId, i64)> = VecDeque::new();
        queue.push_back((from, 0));
        visited.insert(from);
        while let Some((current, dist)) = queue.pop_front() {
            for (neighbor, kind) in self.out_edges(current) {
                if kind.is_control() || visited.contains(&neighbor) {
                    continue;
                }
                if neighbor == to {
                    return dist + 1;
                }
                visited.insert(neighbor);
                queue.push_back((neighbor, dist + 1));
            }
        }
        -1
    }

    /// Assert the invariants from spec §8 that are cheap enough to check
    /// unconditionally. Panics on violation (a programmer/pass bug, not a
    /// user-facing error) matching spec §7's "aborts" policy.
    pub fn check_invariants(&self) {
        for edge in self.graph.edge_references() {
            assert_ne!(
                edge.source(),
                edge.target(),
                "self-edge detected at vertex {:?}",
                edge.source()
            );
        }
        let mut last_id: Option<NodeId> = None;
        for &node_id in self.nodes.keys() {
            if let Some(prev) = last_id {
                assert!(prev < node_id, "node ids must be dense and ascending");
            }
            last_id = Some(node_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::microop::Microop;
    use crate::node::ExecNode;

    fn push(program: &mut Program, microop: Microop) -> NodeId {
        let id = program.node_count() as NodeId;
        program.insert_node(ExecNode::new(id, microop, 0, 0))
    }

    #[test]
    fn self_edges_are_rejected() {
        let mut program = Program::new();
        let a = push(&mut program, Microop::Add);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            program.add_edge(a, a, EdgeKind::Control);
        }));
        assert!(result.is_err());
    }

    #[test]
    fn duplicate_edges_collapse() {
        let mut program = Program::new();
        let a = push(&mut program, Microop::Add);
        let b = push(&mut program, Microop::Add);
        program.add_edge(a, b, EdgeKind::DataOperand(1));
        program.add_edge(a, b, EdgeKind::DataOperand(1));
        assert_eq!(program.out_degree(a), 1);
    }

    #[test]
    fn isolating_a_node_clears_edges_but_keeps_id() {
        let mut program = Program::new();
        let a = push(&mut program, Microop::Add);
        let b = push(&mut program, Microop::Add);
        program.add_edge(a, b, EdgeKind::Control);
        program.isolate_node(a);
        assert!(program.node(a).isolated);
        assert_eq!(program.out_degree(a), 0);
        assert!(program.nodes.contains_key(&a));
    }

    #[test]
    fn shortest_distance_skips_control_edges() {
        let mut program = Program::new();
        let a = push(&mut program, Microop::Add);
        let b = push(&mut program, Microop::Add);
        let c = push(&mut program, Microop::Add);
        program.add_edge(a, b, EdgeKind::Control);
        program.add_edge(a, c, EdgeKind::DataOperand(1));
        assert_eq!(program.shortest_distance_between_nodes(a, c), 1);
        assert_eq!(program.shortest_distance_between_nodes(a, b), -1);
    }

    #[test]
    fn call_arg_map_follows_chain_to_canonical_name() {
        use crate::source::DynamicFunction;
        let mut map = CallArgMap::default();
        let df = DynamicFunction { function_id: 0, iteration: 0 };
        let callee = DynamicVariable { dyn_func: df, variable_id: 1 };
        let mid = DynamicVariable { dyn_func: df, variable_id: 2 };
        let caller = DynamicVariable { dyn_func: df, variable_id: 3 };
        map.add(callee, mid);
        map.add(mid, caller);
        assert_eq!(map.lookup(callee), caller);
    }
}
