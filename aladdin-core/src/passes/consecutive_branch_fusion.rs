//! Consecutive branch fusion, grounded in
//! `original_source/common/graph_opts/consecutive_branch_fusion.cpp`.
//!
//! Chains of branch/call nodes with nothing else between them (nested loop
//! preheaders, back-to-back loop exits) are assumed to resolve in a single
//! FSM cycle. Each maximal chain of single-successor branch nodes is
//! linked by `FusedBranch` edges instead of full `Control` edges, so the
//! scheduler can co-schedule the whole chain.
//!
//! The original walks a boost topological sort; node ids are assigned in
//! trace emission order and the builder only ever wires forward edges, so
//! ascending node-id order is already a valid topological order here.

use std::collections::HashSet;

use super::GraphPass;
use crate::config::UserConfig;
use crate::graph::EdgeKind;
use crate::node::NodeId;
use crate::program::Program;
use crate::source::SourceManager;

pub struct ConsecutiveBranchFusion;

impl GraphPass for ConsecutiveBranchFusion {
    fn name(&self) -> &'static str {
        "ConsecutiveBranchFusion"
    }

    fn run(&self, program: &mut Program, _config: &UserConfig, _sources: &SourceManager) {
        let mut to_remove: Vec<(NodeId, NodeId)> = Vec::new();
        let mut to_add: Vec<(NodeId, NodeId)> = Vec::new();
        let mut chained: HashSet<NodeId> = HashSet::new();

        let node_ids: Vec<NodeId> = program.nodes.keys().copied().collect();
        for node_id in node_ids {
            if chained.contains(&node_id) {
                continue;
            }
            let node = program.node(node_id);
            if node.isolated || !node.microop.is_branch_op() || program.out_degree(node_id) != 1 {
                continue;
            }

            let mut chain = vec![node_id];
            let mut current = node_id;
            loop {
                if program.out_degree(current) != 1 {
                    break;
                }
                let (child, _) = program.out_edges(current).next().unwrap();
                if !program.node(child).microop.is_branch_op() {
                    break;
                }
                to_remove.push((current, child));
                chain.push(child);
                chained.insert(child);
                current = child;
            }

            if chain.len() > 1 {
                for pair in chain.windows(2) {
                    to_add.push((pair[0], pair[1]));
                }
            }
        }

        for (from, to) in to_remove {
            program.remove_edge(from, to);
        }
        for (from, to) in to_add {
            program.add_edge(from, to, EdgeKind::FusedBranch);
        }
        program.clean_leaf_nodes();
    }
}
