//! `ExecNode`: one per dynamic instruction in the trace.

use crate::microop::Microop;
use crate::source::{DynamicVariable, SrcId};
use petgraph::graph::NodeIndex;

/// Dense, ascending-in-emission-order node id. Also used directly as a
/// `petgraph::graph::NodeIndex` index (see `Graph`), so node ids are never
/// reused even after a node is isolated.
pub type NodeId = u32;

/// Payload present only on load/store nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemAccess {
    /// Byte address, masked to the lower 48 bits per the trace format.
    pub vaddr: u64,
    pub size_bytes: u32,
    pub is_float: bool,
    pub bits: u32,
    pub array_label: Option<String>,
    pub partition_index: u32,
}

/// Payload present only on DMA load/store nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DmaAccess {
    pub host_base: u64,
    pub src_offset: u64,
    pub dst_offset: u64,
    pub size_bytes: u64,
    pub memory_type: crate::config::MemoryKind,
}

/// A single dynamic instruction. Holds both static back-pointers (to the
/// interned source entities) and mutable scheduling state; the latter is
/// read-write during scheduling and otherwise untouched.
#[derive(Debug, Clone)]
pub struct ExecNode {
    pub node_id: NodeId,
    pub microop: Microop,

    pub function_id: SrcId,
    pub instruction_id: SrcId,
    pub basic_block_id: SrcId,
    pub line_num: i32,
    pub dynamic_invocation: u64,

    pub inductive: bool,
    pub dynamic_mem_op: bool,
    pub double_precision: bool,

    pub mem_access: Option<MemAccess>,
    pub dma_access: Option<DmaAccess>,

    /// The dynamic register this node's result record wrote, if any. Used
    /// by `BaseAddressInit` to name the array a GEP/Load/Store chain
    /// bottoms out at (the name is the pointer-typed variable's own name,
    /// mirroring the original's `get_dynamic_variable()`).
    pub result_variable: Option<DynamicVariable>,
    /// Set only on `Alloca` nodes: the name of the array this allocation
    /// introduces.
    pub alloca_array_label: Option<String>,

    /// True once this node has no remaining edges (parents or children) and
    /// therefore does not execute.
    pub isolated: bool,

    // Scheduling state, valid only after/while the scheduler runs.
    pub start_cycle: Option<u64>,
    pub complete_cycle: Option<u64>,
    pub num_parents_remaining: u32,
    pub time_before_execution: f32,

    vertex: Option<NodeIndex<u32>>,
}

impl ExecNode {
    pub fn new(node_id: NodeId, microop: Microop, function_id: SrcId, instruction_id: SrcId) -> Self {
        ExecNode {
            node_id,
            microop,
            function_id,
            instruction_id,
            basic_block_id: SrcId::MAX,
            line_num: -1,
            dynamic_invocation: 0,
            inductive: false,
            dynamic_mem_op: false,
            double_precision: false,
            mem_access: None,
            dma_access: None,
            result_variable: None,
            alloca_array_label: None,
            isolated: true,
            start_cycle: None,
            complete_cycle: None,
            num_parents_remaining: 0,
            time_before_execution: 0.0,
            vertex: None,
        }
    }

    pub fn vertex(&self) -> NodeIndex<u32> {
        self.vertex
            .unwrap_or_else(|| NodeIndex::new(self.node_id as usize))
    }

    pub fn set_vertex(&mut self, vertex: NodeIndex<u32>) {
        self.vertex = Some(vertex);
    }

    pub fn has_array_label(&self) -> bool {
        self.mem_access
            .as_ref()
            .map(|m| m.array_label.is_some())
            .unwrap_or(false)
    }

    pub fn array_label(&self) -> Option<&str> {
        self.mem_access.as_ref().and_then(|m| m.array_label.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_node_defaults_to_isolated_with_no_schedule() {
        let n = ExecNode::new(0, Microop::Add, 0, 0);
        assert!(n.isolated);
        assert!(n.start_cycle.is_none());
        assert!(!n.has_array_label());
    }
}
