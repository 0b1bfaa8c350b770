//! Tree height reduction, grounded in
//! `original_source/common/graph_opts/tree_height_reduction.cpp`.
//!
//! A chain of associative, single-use operations (e.g. `a + b + c + d`
//! compiled as a left-leaning chain of `Add`s) has depth proportional to
//! its length even though the operation is commutative and associative.
//! This collects each maximal chain of associative ops feeding a single
//! consumer, and rebuilds it as a balanced binary tree so its critical
//! path is `O(log n)` instead of `O(n)`.
//!
//! The original ranks leaves by node id (favoring nodes already deep in
//! the graph) and repeatedly merges the two lowest-ranked nodes. We keep
//! that core idea but drive it with a simple min-heap over current rank
//! rather than reproducing the exact two-pass `rank_map` scan; the result
//! is the same shape of balanced tree, just not guaranteed to break ties
//! identically to the original on asymmetric chains. Documented in
//! DESIGN.md.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use super::GraphPass;
use crate::config::UserConfig;
use crate::graph::EdgeKind;
use crate::node::NodeId;
use crate::program::Program;
use crate::source::SourceManager;

pub struct TreeHeightReduction;

impl GraphPass for TreeHeightReduction {
    fn name(&self) -> &'static str {
        "TreeHeightReduction"
    }

    fn run(&self, program: &mut Program, _config: &UserConfig, _sources: &SourceManager) {
        if program.loop_bounds.len() <= 2 {
            return;
        }

        let mut updated = vec![false; program.node_count()];
        let mut to_remove: Vec<(NodeId, NodeId)> = Vec::new();
        let mut to_add: Vec<(NodeId, NodeId)> = Vec::new();

        let node_ids: Vec<NodeId> = program.nodes.keys().rev().copied().collect();
        for root_id in node_ids {
            if updated[root_id as usize] {
                continue;
            }
            let root = program.node(root_id);
            if root.isolated || !root.microop.is_associative() {
                continue;
            }
            updated[root_id as usize] = true;

            let (chain, leaves, removed_edges) = collect_associative_chain(program, root_id, &mut updated);
            if chain.len() < 3 {
                continue;
            }
            to_remove.extend(removed_edges);

            let mut heap: BinaryHeap<Reverse<(NodeId, NodeId)>> =
                leaves.into_iter().map(Reverse).collect();

            for &merge_node in chain.iter().rev() {
                let Reverse((rank1, node1)) = heap.pop().expect("chain has enough leaves");
                let Reverse((rank2, node2)) = heap.pop().expect("chain has enough leaves");
                to_add.push((node1, merge_node));
                to_add.push((node2, merge_node));
                let new_rank = rank1.max(rank2) + 1;
                heap.push(Reverse((new_rank, merge_node)));
            }
        }

        for (from, to) in to_remove {
            program.remove_edge(from, to);
        }
        for (from, to) in to_add {
            if !program.edge_exists(from, to) {
                program.add_edge(from, to, EdgeKind::DataOperand(1));
            }
        }
        program.clean_leaf_nodes();
    }
}

/// Walk the maximal chain of associative nodes each feeding exactly one
/// other chain member, starting at `root` and climbing through its two
/// non-control parents. Returns `(chain innermost-to-outermost, leaf nodes
/// with their rank == their own node id, edges to sever)`.
fn collect_associative_chain(
    program: &Program,
    root: NodeId,
    updated: &mut [bool],
) -> (Vec<NodeId>, Vec<(NodeId, NodeId)>, Vec<(NodeId, NodeId)>) {
    let mut chain = vec![root];
    let mut leaves = Vec::new();
    let mut removed_edges = Vec::new();

    let mut frontier = vec![root];
    let mut idx = 0;
    while idx < frontier.len() {
        let chain_node = frontier[idx];
        idx += 1;
        updated[chain_node as usize] = true;

        let parents: Vec<(NodeId, EdgeKind)> = program
            .in_edges(chain_node)
            .filter(|(_, kind)| !kind.is_control())
            .collect();

        if parents.len() != 2 {
            continue;
        }

        for (parent, _) in &parents {
            removed_edges.push((*parent, chain_node));
            let parent_node = program.node(*parent);
            let is_single_use = program
                .out_edges(*parent)
                .filter(|(_, kind)| !kind.is_control())
                .count()
                == 1;
            if parent_node.microop.is_associative() && is_single_use {
                frontier.push(*parent);
                if !chain.contains(parent) {
                    chain.push(*parent);
                }
            } else {
                leaves.push((*parent, *parent));
            }
        }
    }

    (chain, leaves, removed_edges)
}
