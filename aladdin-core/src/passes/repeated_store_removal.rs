//! Repeated store removal, grounded in
//! `original_source/common/graph_opts/repeated_store_removal.cpp`.
//!
//! Scanning each loop-bound window backward, a store to an address that a
//! later store (in program order) already wrote and that has no real
//! (non-control) consumers of its own is dead: nothing ever observes it
//! before it's overwritten. Such a store becomes a `SilentStore`, which
//! the scheduler and resource model skip over.

use std::collections::HashMap;

use super::GraphPass;
use crate::config::UserConfig;
use crate::microop::Microop;
use crate::program::Program;
use crate::source::SourceManager;

pub struct RepeatedStoreRemoval;

impl GraphPass for RepeatedStoreRemoval {
    fn name(&self) -> &'static str {
        "RepeatedStoreRemoval"
    }

    fn may_create_dead_nodes(&self) -> bool {
        false
    }

    fn run(&self, program: &mut Program, config: &UserConfig, _sources: &SourceManager) {
        if config.unrolling.is_empty() && program.loop_bounds.len() <= 2 {
            return;
        }
        if program.nodes.is_empty() {
            return;
        }

        let mut bound_starts: Vec<u32> = program.loop_bounds.iter().map(|b| b.node_id).collect();
        bound_starts.push(0);
        bound_starts.sort_unstable();
        bound_starts.dedup();

        let all_ids: Vec<u32> = program.nodes.keys().rev().copied().collect();
        let mut window_idx = bound_starts.len() - 1;
        let mut address_store_map: HashMap<u64, u32> = HashMap::new();

        for node_id in all_ids {
            while window_idx > 0 && node_id < bound_starts[window_idx] {
                window_idx -= 1;
                address_store_map.clear();
            }

            let node = program.node(node_id);
            if node.isolated || !node.microop.is_store_op() {
                continue;
            }
            let Some(access) = &node.mem_access else { continue };
            let addr = access.vaddr;

            if !address_store_map.contains_key(&addr) {
                address_store_map.insert(addr, node_id);
                continue;
            }

            if node.dynamic_mem_op {
                continue;
            }
            let has_real_children = program
                .out_edges(node_id)
                .any(|(_, kind)| !matches!(kind, crate::graph::EdgeKind::Control));
            if !has_real_children {
                program.node_mut(node_id).microop = Microop::SilentStore;
            }
        }

        program.clean_leaf_nodes();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{ExecNode, MemAccess};

    fn store_node(program: &mut Program, addr: u64) -> u32 {
        let id = program.node_count() as u32;
        let mut node = ExecNode::new(id, Microop::Store, 0, 0);
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
    fn earlier_store_with_no_readers_becomes_silent() {
        let mut program = Program::new();
        let first = store_node(&mut program, 0x300);
        let _second = store_node(&mut program, 0x300);

        let mut config = UserConfig::new();
        config
            .unrolling
            .insert(crate::source::UniqueLabel { function_id: 0, label_id: 1 }, 2);
        program.loop_bounds = vec![crate::program::LoopBound {
            node_id: program.node_count() as u32,
            target_loop_depth: 0,
        }];

        let sources = SourceManager::new();
        RepeatedStoreRemoval.run(&mut program, &config, &sources);

        assert_eq!(program.node(first).microop, Microop::SilentStore);
    }
}
