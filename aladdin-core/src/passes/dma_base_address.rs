//! Resolves the array a DMA transfer's host-side offset lands in, by
//! looking up `UserConfig::array_containing` against the DMA node's
//! `host_base + dst_offset` (load) or `host_base + src_offset` (store).
//! Companion to `base_address.rs`, which handles ordinary memory ops; DMA
//! transfers don't have a GEP/Alloca chain to walk since the address is a
//! host pointer handed across the accelerator boundary.

use super::GraphPass;
use crate::config::UserConfig;
use crate::microop::Microop;
use crate::node::NodeId;
use crate::program::Program;
use crate::source::SourceManager;

pub struct DmaBaseAddressInit;

impl GraphPass for DmaBaseAddressInit {
    fn name(&self) -> &'static str {
        "DmaBaseAddressInit"
    }

    fn may_create_dead_nodes(&self) -> bool {
        false
    }

    fn run(&self, program: &mut Program, config: &UserConfig, _sources: &SourceManager) {
        let dma_nodes: Vec<NodeId> = program
            .nodes
            .values()
            .filter(|n| !n.isolated && n.microop.is_dma_op())
            .map(|n| n.node_id)
            .collect();

        for node_id in dma_nodes {
            let node = program.node(node_id);
            let Some(dma) = node.dma_access.clone() else { continue };
            let probe_addr = match node.microop {
                Microop::DmaLoad => dma.host_base + dma.dst_offset,
                Microop::DmaStore => dma.host_base + dma.src_offset,
                _ => continue,
            };
            if let Some(array) = config.array_containing(probe_addr) {
                let array = array.to_string();
                if let Some(mem_access) = &mut program.node_mut(node_id).mem_access {
                    mem_access.array_label = Some(array);
                } else {
                    program.node_mut(node_id).mem_access = Some(crate::node::MemAccess {
                        vaddr: probe_addr,
                        size_bytes: dma.size_bytes as u32,
                        is_float: false,
                        bits: 0,
                        array_label: Some(array),
                        partition_index: 0,
                    });
                }
            }
        }
    }
}
