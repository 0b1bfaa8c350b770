//! Register load/store fusion, grounded in
//! `original_source/common/graph_opts/reg_load_store_fusion.cpp`.
//!
//! A load or store to a completely-partitioned array is really a register
//! read/write, not an SRAM access, so it shouldn't cost its own pipeline
//! stage. Every data edge leaving a load (or entering a store) to such an
//! array is retagged `Register` so the scheduler can co-schedule it with
//! its consumer (producer).

use super::GraphPass;
use crate::config::{PartitionKind, UserConfig};
use crate::graph::EdgeKind;
use crate::node::NodeId;
use crate::program::Program;
use crate::source::SourceManager;

pub struct RegLoadStoreFusion;

impl GraphPass for RegLoadStoreFusion {
    fn name(&self) -> &'static str {
        "RegLoadStoreFusion"
    }

    fn run(&self, program: &mut Program, config: &UserConfig, _sources: &SourceManager) {
        let candidates: Vec<NodeId> = program
            .nodes
            .values()
            .filter(|n| !n.isolated && (n.microop.is_load_op() || n.microop.is_store_op()))
            .map(|n| n.node_id)
            .collect();

        let mut to_retag: Vec<(NodeId, NodeId)> = Vec::new();

        for node_id in candidates {
            let node = program.node(node_id);
            let Some(label) = node.array_label() else { continue };
            let Some(entry) = config.partition.get(label) else { continue };
            if entry.partition_kind != PartitionKind::Complete {
                continue;
            }

            if node.microop.is_load_op() {
                for (child, kind) in program.out_edges(node_id) {
                    if kind.is_control() || program.node(child).microop.is_load_op() {
                        continue;
                    }
                    to_retag.push((node_id, child));
                }
            } else {
                for (parent, kind) in program.in_edges(node_id) {
                    if kind.is_control() || program.node(parent).microop.is_store_op() {
                        continue;
                    }
                    to_retag.push((parent, node_id));
                }
            }
        }

        for (from, to) in to_retag {
            program.remove_edge(from, to);
            program.add_edge(from, to, EdgeKind::Register);
        }

        program.clean_leaf_nodes();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PartitionEntry;
    use crate::microop::Microop;
    use crate::node::ExecNode;

    fn push(program: &mut Program, microop: Microop, array_label: Option<&str>) -> NodeId {
        let id = program.node_count() as NodeId;
        let mut node = ExecNode::new(id, microop, 0, 0);
        node.isolated = false;
        if let Some(label) = array_label {
            node.mem_access = Some(crate::node::MemAccess {
                vaddr: 0,
                size_bytes: 4,
                is_float: false,
                bits: 32,
                array_label: Some(label.to_string()),
                partition_index: 0,
            });
        }
        program.insert_node(node)
    }

    #[test]
    fn load_from_complete_partition_fuses_into_register_edge() {
        let mut program = Program::new();
        let load = push(&mut program, Microop::Load, Some("regfile"));
        let consumer = push(&mut program, Microop::Add, None);
        program.add_edge(load, consumer, EdgeKind::DataOperand(1));

        let mut config = UserConfig::new();
        config.partition.insert(
            "regfile".to_string(),
            PartitionEntry {
                memory_kind: crate::config::MemoryKind::Scratchpad,
                partition_kind: PartitionKind::Complete,
                array_size_bytes: 16,
                wordsize_bytes: 4,
                factor: 1,
                base_addr: 0,
            },
        );

        let sources = SourceManager::new();
        RegLoadStoreFusion.run(&mut program, &config, &sources);

        assert_eq!(program.edge_kind(load, consumer), Some(EdgeKind::Register));
    }
}
