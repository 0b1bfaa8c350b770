//! The dynamic data dependence graph's edge semantics.
//!
//! The graph itself is a thin `petgraph::stable_graph::StableDiGraph` keyed
//! by dense `node_id`s (see `node::NodeId`): nodes are pushed in node_id
//! order and never removed (only `clear_edges`-ed when isolated), so
//! `NodeIndex::new(node_id as usize)` is always the right index. This is the
//! "arena of ExecNode plus a separate directed-graph container keyed by
//! those indices" called for in the design notes, rather than pointer-linked
//! nodes.

use petgraph::stable_graph::StableDiGraph;

use crate::node::NodeId;

/// Every edge in the DDDG carries one of these tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// Value flows from producer to this operand slot. The payload is the
    /// 1-based operand index (parameter index from the trace).
    DataOperand(u8),
    /// Ordering required; not a data dependency.
    Control,
    /// Memory ordering dependency (RAW/WAW) from address analysis.
    Memory,
    /// Scheduling hint: consumer may execute the same cycle as producer
    /// (value lives in a register, not an SRAM port).
    Register,
    /// Same-cycle scheduling hint between consecutive fused branches/calls.
    FusedBranch,
}

impl EdgeKind {
    pub fn is_control(self) -> bool {
        matches!(self, EdgeKind::Control)
    }

    pub fn is_memory(self) -> bool {
        matches!(self, EdgeKind::Memory)
    }

    pub fn is_data_operand(self) -> bool {
        matches!(self, EdgeKind::DataOperand(_))
    }

    /// True for edges the scheduler treats as allowing same-cycle execution
    /// of the child (as opposed to requiring `child.start >= parent.complete`
    /// strictly).
    pub fn allows_same_cycle(self) -> bool {
        matches!(self, EdgeKind::Register | EdgeKind::FusedBranch)
    }
}

/// The DDDG proper: a graph over dense node ids with `EdgeKind`-tagged
/// edges. Node weights are `()`; all per-node data lives in `ExecNode`
/// inside `Program::nodes`, indexed by the same id.
pub type Dddg = StableDiGraph<(), EdgeKind, petgraph::Directed, u32>;

/// Convenience alias matching the original's `cnode_pair_t`/`node_pair_t`:
/// a pair of node ids bounding a region (e.g. one loop iteration).
pub type NodePair = (NodeId, NodeId);
