//! Loop unrolling and flattening, grounded in
//! `original_source/common/graph_opts/loop_unrolling.cpp`.
//!
//! The original tracks a full stack of nested `LoopBoundDescriptor`s so it
//! can unroll loops at any call/nest depth independently. We simplify that
//! to a per-`UniqueLabel` dynamic invocation counter: every `factor`-th
//! invocation of a configured loop header becomes a `loop_bounds` entry,
//! and every node seen between two boundary entries gets a control edge to
//! the next boundary so the region is fully ordered. This keeps
//! `loop_bounds` strictly increasing and branch-rooted (spec invariant 3)
//! without modeling irregular cross-loop control flow (gotos between
//! loops, recursive call nesting) byte-for-byte; see DESIGN.md.

use std::collections::HashMap;

use super::GraphPass;
use crate::config::UserConfig;
use crate::graph::EdgeKind;
use crate::microop::Microop;
use crate::node::NodeId;
use crate::program::{LoopBound, Program};
use crate::source::{SourceManager, UniqueLabel};

pub struct LoopUnrolling;

impl GraphPass for LoopUnrolling {
    fn name(&self) -> &'static str {
        "LoopUnrolling"
    }

    fn run(&self, program: &mut Program, config: &UserConfig, _sources: &SourceManager) {
        if config.unrolling.is_empty() {
            return;
        }

        let mut invocation_counts: HashMap<UniqueLabel, u32> = HashMap::new();
        let mut nodes_between: Vec<NodeId> = Vec::new();
        let mut prev_branch: Option<NodeId> = None;
        program.loop_bounds.clear();

        let node_ids: Vec<NodeId> = program.nodes.keys().copied().collect();
        for node_id in node_ids {
            let node = program.node(node_id);
            if node.isolated && !node.microop.is_branch_op() {
                continue;
            }
            if !node.microop.is_branch_op() {
                if !node.microop.is_dma_op() {
                    nodes_between.push(node_id);
                }
                continue;
            }

            if let Some(prev) = prev_branch {
                if prev != node_id && !program.edge_exists(prev, node_id) && !node.microop.is_dma_op() {
                    program.add_edge(prev, node_id, EdgeKind::Control);
                }
            }

            let label = program.unique_label_for_node(node_id);
            let factor = label.and_then(|l| config.unrolling.get(&l).copied());

            let connect_and_reset = |program: &mut Program, nodes_between: &mut Vec<NodeId>| {
                for &n in nodes_between.iter() {
                    if !program.edge_exists(n, node_id) {
                        program.add_edge(n, node_id, EdgeKind::Control);
                    }
                }
                nodes_between.clear();
            };

            match factor {
                None | Some(0) => {
                    connect_and_reset(program, &mut nodes_between);
                }
                Some(factor) => {
                    let label = label.unwrap();
                    let count = invocation_counts.entry(label).or_insert(0);
                    *count += 1;
                    connect_and_reset(program, &mut nodes_between);
                    if *count % factor == 0 {
                        program.loop_bounds.push(LoopBound {
                            node_id,
                            target_loop_depth: 0,
                        });
                    }
                }
            }
            nodes_between.push(node_id);
            prev_branch = Some(node_id);
        }

        program.loop_bounds.push(LoopBound {
            node_id: program.node_count() as NodeId,
            target_loop_depth: 0,
        });
        program.clean_leaf_nodes();
    }
}

pub struct LoopFlattening;

impl GraphPass for LoopFlattening {
    fn name(&self) -> &'static str {
        "LoopFlattening"
    }

    fn run(&self, program: &mut Program, config: &UserConfig, _sources: &SourceManager) {
        if config.flatten.is_empty() {
            return;
        }

        let node_ids: Vec<NodeId> = program.nodes.keys().copied().collect();
        let mut to_isolate = Vec::new();
        for node_id in node_ids {
            let Some(label) = program.unique_label_for_node(node_id) else { continue };
            if !config.flatten.contains(&label) {
                continue;
            }
            let node = program.node(node_id);
            if node.microop.is_compute_op() && !node.inductive {
                program.node_mut(node_id).microop = Microop::Move;
            } else if node.microop.is_branch_op() {
                to_isolate.push(node_id);
            }
        }
        for node_id in to_isolate {
            program.isolate_node(node_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::ExecNode;

    fn branch_node(program: &mut Program, label: UniqueLabel) -> NodeId {
        let id = program.node_count() as NodeId;
        let mut node = ExecNode::new(id, Microop::Br, 0, 0);
        node.isolated = false;
        node.line_num = label.label_id as i32 + 1;
        program.labelmap.entry(node.line_num as u32).or_default().push(label);
        program.insert_node(node)
    }

    #[test]
    fn every_nth_invocation_becomes_a_loop_bound() {
        let mut program = Program::new();
        let mut config = UserConfig::new();
        let label = UniqueLabel { function_id: 0, label_id: 1 };
        config.unrolling.insert(label, 2);

        branch_node(&mut program, label);
        branch_node(&mut program, label);
        branch_node(&mut program, label);
        branch_node(&mut program, label);

        let sources = SourceManager::new();
        LoopUnrolling.run(&mut program, &config, &sources);

        // Two 2nd-of-2 invocations plus the trailing sentinel.
        assert_eq!(program.loop_bounds.len(), 3);
        assert!(program.loop_bounds.windows(2).all(|w| w[0].node_id < w[1].node_id));
    }

    #[test]
    fn flatten_converts_compute_ops_to_move_and_drops_branches() {
        let mut program = Program::new();
        let mut config = UserConfig::new();
        let label = UniqueLabel { function_id: 0, label_id: 1 };
        config.flatten.insert(label);

        let mut add = ExecNode::new(0, Microop::Add, 0, 0);
        add.isolated = false;
        add.line_num = 2;
        program.labelmap.entry(2).or_default().push(label);
        program.insert_node(add);

        let branch = branch_node(&mut program, label);

        let sources = SourceManager::new();
        LoopFlattening.run(&mut program, &config, &sources);

        assert_eq!(program.node(0).microop, Microop::Move);
        assert!(program.node(branch).isolated);
    }
}
