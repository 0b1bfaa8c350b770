//! Store-to-load forwarding ("store buffering"), grounded in
//! `original_source/common/graph_opts/store_buffering.cpp`.
//!
//! A non-dynamic store followed, within the same loop-bound window, by a
//! load of the same address is really just handing a value through a
//! buffer: the load is removed entirely and its consumers rewired to the
//! store's own value operand.

use super::GraphPass;
use crate::config::UserConfig;
use crate::graph::EdgeKind;
use crate::node::NodeId;
use crate::program::Program;
use crate::source::SourceManager;

pub struct StoreBuffering;

impl GraphPass for StoreBuffering {
    fn name(&self) -> &'static str {
        "StoreBuffering"
    }

    fn run(&self, program: &mut Program, _config: &UserConfig, _sources: &SourceManager) {
        if program.loop_bounds.len() <= 2 {
            return;
        }

        let mut to_add: Vec<(NodeId, NodeId, EdgeKind)> = Vec::new();
        let mut to_isolate: Vec<NodeId> = Vec::new();

        for pair in program.loop_bounds.clone().windows(2) {
            let (start, end) = (pair[0].node_id, pair[1].node_id);
            let stores: Vec<NodeId> = program
                .nodes
                .values()
                .filter(|n| n.node_id >= start && n.node_id < end && !n.isolated && n.microop.is_store_op())
                .map(|n| n.node_id)
                .collect();

            for store in stores {
                if program.node(store).dynamic_mem_op {
                    continue;
                }
                let store_children: Vec<NodeId> = program
                    .out_edges(store)
                    .filter(|(child, _)| {
                        let c = program.node(*child);
                        c.microop.is_load_op() && !c.dynamic_mem_op && *child < end
                    })
                    .map(|(child, _)| child)
                    .collect();
                if store_children.is_empty() {
                    continue;
                }

                let Some(value_parent) = program.in_edges(store).find_map(|(parent, kind)| {
                    matches!(kind, EdgeKind::DataOperand(1)).then_some(parent)
                }) else {
                    continue;
                };

                for load in store_children {
                    for (grandchild, kind) in program.out_edges(load) {
                        to_add.push((value_parent, grandchild, kind));
                    }
                    to_isolate.push(load);
                }
            }
        }

        for node_id in to_isolate {
            program.isolate_node(node_id);
        }
        for (from, to, kind) in to_add {
            if !program.edge_exists(from, to) {
                program.add_edge(from, to, kind);
            }
        }
        program.clean_leaf_nodes();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::microop::Microop;
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
    fn store_then_load_forwards_value_through_store_buffer() {
        let mut program = Program::new();
        let producer_id = program.node_count() as NodeId;
        let mut producer = ExecNode::new(producer_id, Microop::Add, 0, 0);
        producer.isolated = false;
        program.insert_node(producer);

        let store = mem_node(&mut program, Microop::Store, 0x200);
        program.add_edge(producer_id, store, EdgeKind::DataOperand(1));

        let load = mem_node(&mut program, Microop::Load, 0x200);
        program.add_edge(store, load, EdgeKind::Memory);

        let consumer_id = program.node_count() as NodeId;
        let mut consumer = ExecNode::new(consumer_id, Microop::Add, 0, 0);
        consumer.isolated = false;
        program.insert_node(consumer);
        program.add_edge(load, consumer_id, EdgeKind::DataOperand(1));

        program.loop_bounds = vec![
            crate::program::LoopBound { node_id: 0, target_loop_depth: 0 },
            crate::program::LoopBound { node_id: program.node_count() as NodeId, target_loop_depth: 0 },
            crate::program::LoopBound { node_id: program.node_count() as NodeId + 1, target_loop_depth: 0 },
        ];

        let sources = SourceManager::new();
        StoreBuffering.run(&mut program, &UserConfig::new(), &sources);

        assert!(program.node(load).isolated);
        assert!(program.edge_exists(producer_id, consumer_id));
    }
}
