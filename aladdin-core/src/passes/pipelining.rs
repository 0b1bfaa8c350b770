//! Loop pipelining, grounded in
//! `original_source/common/graph_opts/global_loop_pipelining.cpp` and
//! `per_loop_pipelining.cpp`.
//!
//! After loop unrolling, every instruction in a loop body has a strict
//! control dependence on the previous iteration's branch node, which
//! serializes iterations entirely. Pipelining loosens that: the next
//! iteration's "first non-isolated node" (FNIN) only needs to wait on the
//! *previous* iteration's FNIN, not its branch, so iterations can overlap.
//! `GlobalLoopPipelining` does this for every discovered loop boundary;
//! `PerLoopPipelining` restricts it to the loops named by the `pipeline`
//! config directive. The two are mutually exclusive (`PassPipeline::new`
//! rejects a config that sets both).

use std::collections::HashMap;

use super::GraphPass;
use crate::config::UserConfig;
use crate::graph::EdgeKind;
use crate::node::NodeId;
use crate::program::Program;
use crate::source::SourceManager;

/// First non-isolated node after a boundary: walks forward from
/// `after_node_id` (exclusive) up to (exclusive) `before_node_id`, returning
/// the first node that has edges and isn't a branch itself.
fn first_non_isolated_node(
    program: &Program,
    after_node_id: NodeId,
    before_node_id: NodeId,
) -> Option<NodeId> {
    let mut candidate = after_node_id + 1;
    while candidate < before_node_id {
        if program.nodes.contains_key(&candidate) {
            let node = program.node(candidate);
            let has_edges = program.in_degree(candidate) > 0 || program.out_degree(candidate) > 0;
            if has_edges && !node.microop.is_branch_op() {
                return Some(candidate);
            }
        }
        candidate += 1;
    }
    None
}

/// Reattach the control dependences that ran from `prev_branch`'s region
/// into `first_node`'s region so they instead chain through the previous
/// iteration's FNIN (`prev_first`). Shared by both passes; the only
/// difference between them is which (branch, FNIN) pairs get fed in.
fn pipeline_boundary(
    program: &mut Program,
    prev_branch: NodeId,
    prev_first: NodeId,
    first_node: NodeId,
) {
    if !program.edge_exists(prev_first, first_node) {
        program.add_edge(prev_first, first_node, EdgeKind::Control);
    }

    let out_of_prev_branch: Vec<(NodeId, EdgeKind)> = program.out_edges(prev_branch).collect();
    for (child, kind) in &out_of_prev_branch {
        if *child < first_node || !matches!(kind, EdgeKind::Control) {
            continue;
        }
        if !program.edge_exists(first_node, *child) {
            program.add_edge(first_node, *child, EdgeKind::Control);
        }
    }

    let into_first: Vec<(NodeId, EdgeKind)> = program.in_edges(first_node).collect();
    for (parent, _) in into_first {
        if program.node(parent).microop.is_branch_op() {
            continue;
        }
        program.remove_edge(parent, first_node);
        program.add_edge(parent, first_node, EdgeKind::Control);
    }

    for (child, kind) in out_of_prev_branch {
        if program.node(child).microop.is_call_op() {
            continue;
        }
        if matches!(kind, EdgeKind::Control) {
            program.remove_edge(prev_branch, child);
        }
    }
}

pub struct GlobalLoopPipelining;

impl GraphPass for GlobalLoopPipelining {
    fn name(&self) -> &'static str {
        "GlobalLoopPipelining"
    }

    fn run(&self, program: &mut Program, config: &UserConfig, _sources: &SourceManager) {
        if !config.global_pipelining || config.unrolling.is_empty() {
            return;
        }
        if program.loop_bounds.len() <= 2 {
            return;
        }

        let bounds = program.loop_bounds.clone();
        let mut fnin_by_boundary: HashMap<NodeId, NodeId> = HashMap::new();
        for pair in bounds.windows(2) {
            let (start, end) = (pair[0].node_id, pair[1].node_id);
            let fnin = first_non_isolated_node(program, start, end).unwrap_or(end);
            fnin_by_boundary.insert(end, fnin);
        }

        let mut prev: Option<(NodeId, NodeId, u32, u32)> = None;
        for pair in bounds.windows(2) {
            let branch = pair[1].node_id;
            if !program.nodes.contains_key(&branch) {
                continue;
            }
            let Some(&fnin) = fnin_by_boundary.get(&branch) else { continue };
            let line = program.node(branch).line_num as u32;
            let func = program.node(branch).function_id;

            if let Some((prev_branch, prev_fnin, prev_line, prev_func)) = prev {
                if line == prev_line && func == prev_func {
                    pipeline_boundary(program, prev_branch, prev_fnin, fnin);
                }
            }
            prev = Some((branch, fnin, line, func));
        }

        program.clean_leaf_nodes();
    }
}

pub struct PerLoopPipelining;

impl GraphPass for PerLoopPipelining {
    fn name(&self) -> &'static str {
        "PerLoopPipelining"
    }

    fn run(&self, program: &mut Program, config: &UserConfig, _sources: &SourceManager) {
        if program.loop_bounds.len() <= 2 || config.pipeline.is_empty() || config.global_pipelining {
            return;
        }

        for &label in &config.pipeline {
            let boundaries = program.find_loop_boundaries(label);
            let mut fnin_by_boundary: HashMap<NodeId, NodeId> = HashMap::new();
            for &(start, end) in &boundaries {
                if let Some(fnin) = first_non_isolated_node(program, start, end) {
                    fnin_by_boundary.insert(end, fnin);
                }
            }

            let mut prev: Option<(NodeId, NodeId)> = None;
            for &(_, end) in &boundaries {
                let Some(&fnin) = fnin_by_boundary.get(&end) else { continue };
                if let Some((prev_branch, prev_fnin)) = prev {
                    pipeline_boundary(program, prev_branch, prev_fnin, fnin);
                }
                prev = Some((end, fnin));
            }
        }

        program.clean_leaf_nodes();
    }
}
