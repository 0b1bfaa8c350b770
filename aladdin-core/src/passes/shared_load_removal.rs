//! Shared load removal ("load buffering"), grounded in
//! `original_source/common/graph_opts/load_buffering.cpp`.
//!
//! Within each loop-bound window, the first load of an address is kept;
//! any later load of the same address (with no intervening store) reads a
//! value already sitting in the load buffer, so it's converted to a `Move`
//! and its consumers are rewired to the original load. A dynamic (address
//! not statically disambiguated) load is never treated as shared.

use std::collections::HashMap;

use super::GraphPass;
use crate::config::UserConfig;
use crate::microop::Microop;
use crate::node::NodeId;
use crate::program::Program;
use crate::source::SourceManager;

pub struct SharedLoadRemoval;

impl GraphPass for SharedLoadRemoval {
    fn name(&self) -> &'static str {
        "SharedLoadRemoval"
    }

    fn run(&self, program: &mut Program, config: &UserConfig, _sources: &SourceManager) {
        if config.unrolling.is_empty() && program.loop_bounds.len() <= 2 {
            return;
        }

        let bound_node_ids: Vec<NodeId> = program
            .loop_bounds
            .iter()
            .map(|b| b.node_id)
            .chain(std::iter::once(NodeId::MAX))
            .collect();

        let mut to_remove: Vec<(NodeId, NodeId)> = Vec::new();
        let mut to_add: Vec<(NodeId, NodeId, crate::graph::EdgeKind)> = Vec::new();
        let mut to_isolate: Vec<NodeId> = Vec::new();

        let all_ids: Vec<NodeId> = program.nodes.keys().copied().collect();
        let mut bound_idx = 0;
        let mut address_loaded: HashMap<u64, NodeId> = HashMap::new();

        for node_id in all_ids {
            while node_id >= bound_node_ids[bound_idx] {
                address_loaded.clear();
                bound_idx += 1;
                if bound_idx >= bound_node_ids.len() {
                    break;
                }
            }
            if bound_idx >= bound_node_ids.len() {
                break;
            }

            let node = program.node(node_id);
            if node.isolated || !node.microop.is_memory_op() {
                continue;
            }
            let Some(access) = &node.mem_access else { continue };
            let addr = access.vaddr;

            if node.microop.is_store_op() {
                address_loaded.remove(&addr);
                continue;
            }

            match address_loaded.get(&addr) {
                None => {
                    address_loaded.insert(addr, node_id);
                }
                Some(&prev_load) => {
                    if node.dynamic_mem_op {
                        continue;
                    }
                    for (child, kind) in program.out_edges(node_id) {
                        if !program.edge_exists(prev_load, child) {
                            to_add.push((prev_load, child, kind));
                        }
                        to_remove.push((node_id, child));
                    }
                    to_isolate.push(node_id);
                }
            }
        }

        for (from, to) in to_remove {
            program.remove_edge(from, to);
        }
        for node_id in to_isolate {
            program.node_mut(node_id).microop = Microop::Move;
        }
        for (from, to, kind) in to_add {
            program.add_edge(from, to, kind);
        }
        program.clean_leaf_nodes();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::EdgeKind;
    use crate::node::{ExecNode, MemAccess};

    fn mem_node(program: &mut Program, microop: Microop, addr: u64) -> NodeId {
        let id = program.node_count() as NodeId;
        let mut node = ExecNode::new(id, microop, 0, 0);
        node.isolated = false;
        node.mem_access = Some(MemAccess {
            vaddr: addr,
            size_bytes: 4,
            is_float: false,
            bits: 32,
            array_label: None,
            partition_index: 0,
        });
        program.insert_node(node)
    }

    #[test]
    fn second_load_of_same_address_is_shared() {
        let mut program = Program::new();
        let load1 = mem_node(&mut program, Microop::Load, 0x100);
        let load2 = mem_node(&mut program, Microop::Load, 0x100);
        let consumer = program.node_count() as NodeId;
        let mut c = ExecNode::new(consumer, Microop::Add, 0, 0);
        c.isolated = false;
        program.insert_node(c);
        program.add_edge(load2, consumer, EdgeKind::DataOperand(1));

        let mut config = UserConfig::new();
        config.unrolling.insert(
            crate::source::UniqueLabel { function_id: 0, label_id: 1 },
            2,
        );
        program.loop_bounds = vec![crate::program::LoopBound {
            node_id: program.node_count() as NodeId,
            target_loop_depth: 0,
        }];

        let sources = SourceManager::new();
        SharedLoadRemoval.run(&mut program, &config, &sources);

        assert_eq!(program.node(load2).microop, Microop::Move);
        assert!(program.edge_exists(load1, consumer));
    }
}
