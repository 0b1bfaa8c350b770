//! PHI and convert-node removal, grounded in
//! `original_source/common/graph_opts/phi_node_removal.cpp`.
//!
//! PHI nodes and bitcast/truncate/extend-style convert nodes exist only to
//! satisfy SSA form; Aladdin doesn't schedule them separately. Every such
//! node is spliced out: its children are reattached directly to its first
//! non-PHI/non-convert ancestor, carrying over the original operand tag.

use std::collections::HashSet;

use super::GraphPass;
use crate::config::UserConfig;
use crate::graph::EdgeKind;
use crate::microop::Microop;
use crate::node::NodeId;
use crate::program::Program;
use crate::source::SourceManager;

pub struct PhiAndConvertNodeRemoval;

impl GraphPass for PhiAndConvertNodeRemoval {
    fn name(&self) -> &'static str {
        "PhiAndConvertNodeRemoval"
    }

    fn run(&self, program: &mut Program, _config: &UserConfig, _sources: &SourceManager) {
        let mut checked: HashSet<NodeId> = HashSet::new();
        let node_ids: Vec<NodeId> = program.nodes.keys().rev().copied().collect();

        for node_id in node_ids {
            if checked.contains(&node_id) {
                continue;
            }
            let node = program.node(node_id);
            if node.isolated || !(node.microop == Microop::Phi || node.microop.is_convert_op()) {
                continue;
            }

            let children: Vec<(NodeId, EdgeKind)> = program.out_edges(node_id).collect();
            checked.insert(node_id);
            if children.is_empty() || program.in_degree(node_id) == 0 {
                continue;
            }

            let is_phi = node.microop == Microop::Phi;
            let ancestor = find_nonphi_ancestor(program, node_id, is_phi, &mut checked);

            for &(child, _) in &children {
                program.remove_edge(node_id, child);
            }
            if let Some(ancestor) = ancestor {
                for (child, kind) in children {
                    program.add_edge(ancestor, child, kind);
                }
            }
        }
    }
}

/// Walk up through a chain of PHI (or convert) nodes until reaching a node
/// that is neither, returning `None` if the chain runs off the graph's root
/// (no further parent).
fn find_nonphi_ancestor(
    program: &mut Program,
    start: NodeId,
    is_phi_chain: bool,
    checked: &mut HashSet<NodeId>,
) -> Option<NodeId> {
    let mut current = start;
    loop {
        let parent = program.parent_nodes(current).into_iter().next()?;
        checked.insert(current);
        let parent_node = program.node(parent);
        let parent_is_chain_member = if is_phi_chain {
            parent_node.microop == Microop::Phi
        } else {
            parent_node.microop == Microop::Phi || parent_node.microop.is_convert_op()
        };
        if !parent_is_chain_member {
            return Some(parent);
        }
        if program.in_degree(parent) == 0 {
            return None;
        }
        current = parent;
    }
}
