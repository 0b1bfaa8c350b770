//! Memory ambiguation, grounded in
//! `original_source/common/graph_opts/memory_ambiguation.cpp`.
//!
//! A memory op fed by a non-inductive GEP cannot have its address proven
//! statically distinct from a sibling access to the same array, so it is
//! marked `dynamic_mem_op`. Sibling dynamic stores to the same static
//! instruction site are then compared: if their address-defining operands
//! differ only by an inductive (loop-counter-derived) term, they are still
//! independent and no ordering edge is added; otherwise a conservative
//! memory edge serializes them.

use std::collections::HashMap;

use super::GraphPass;
use crate::config::UserConfig;
use crate::graph::EdgeKind;
use crate::microop::Microop;
use crate::node::NodeId;
use crate::program::Program;
use crate::source::{DynamicInstruction, SourceManager};

/// The set of inductive and non-inductive nodes feeding a memory address,
/// sorted and deduplicated so two sources can be compared by equality.
#[derive(Default, Clone)]
struct MemoryAddrSources {
    noninductive: Vec<NodeId>,
    inductive: Vec<NodeId>,
}

impl MemoryAddrSources {
    fn sort_and_uniquify(&mut self) {
        self.noninductive.sort_unstable();
        self.noninductive.dedup();
        self.inductive.sort_unstable();
        self.inductive.dedup();
    }

    fn is_independent_of(&self, other: &MemoryAddrSources, first: bool) -> bool {
        let mut independent = self.noninductive == other.noninductive;
        if !first {
            independent &= !self.inductive.is_empty() && self.inductive.len() == other.inductive.len();
        }
        independent
    }
}

pub struct MemoryAmbiguationOpt;

impl GraphPass for MemoryAmbiguationOpt {
    fn name(&self) -> &'static str {
        "MemoryAmbiguationOpt"
    }

    fn may_create_dead_nodes(&self) -> bool {
        false
    }

    fn run(&self, program: &mut Program, _config: &UserConfig, _sources: &SourceManager) {
        let memory_ops: Vec<NodeId> = program
            .nodes
            .values()
            .filter(|n| !n.isolated && n.microop.is_memory_op())
            .map(|n| n.node_id)
            .collect();

        let mut possible_dependent_stores: HashMap<DynamicInstruction, Vec<(NodeId, NodeId)>> =
            HashMap::new();

        for node_id in memory_ops {
            let geps: Vec<NodeId> = program
                .in_edges(node_id)
                .filter(|(parent, _)| program.node(*parent).microop == Microop::GetElementPtr)
                .map(|(parent, _)| parent)
                .collect();

            for gep in geps {
                if program.node(gep).inductive {
                    continue;
                }
                program.node_mut(node_id).dynamic_mem_op = true;
                if program.node(node_id).microop.is_store_op() {
                    let dyn_instr = DynamicInstruction {
                        dyn_func: crate::source::DynamicFunction {
                            function_id: program.node(node_id).function_id,
                            iteration: program.node(node_id).dynamic_invocation,
                        },
                        instruction_id: program.node(node_id).instruction_id,
                    };
                    possible_dependent_stores
                        .entry(dyn_instr)
                        .or_default()
                        .push((gep, node_id));
                }
            }
        }

        let mut new_edges = Vec::new();
        for stores in possible_dependent_stores.values() {
            let mut all_sources: Vec<MemoryAddrSources> = stores
                .iter()
                .map(|&(gep, _)| find_memory_addr_sources(program, gep, program.node(gep).function_id))
                .collect();
            for s in &mut all_sources {
                s.sort_and_uniquify();
            }
            for idx in 0..all_sources.len().saturating_sub(1) {
                let first = idx == 0;
                if !all_sources[idx].is_independent_of(&all_sources[idx + 1], first) {
                    new_edges.push((stores[idx].1, stores[idx + 1].1));
                }
            }
        }

        for (from, to) in new_edges {
            program.add_edge(from, to, EdgeKind::Memory);
        }
    }
}

fn find_memory_addr_sources(
    program: &Program,
    current: NodeId,
    current_func: crate::source::SrcId,
) -> MemoryAddrSources {
    let mut result = MemoryAddrSources::default();

    for (parent, kind) in program.in_edges(current) {
        if kind.is_control() {
            continue;
        }
        let parent_node = program.node(parent);
        if parent_node.microop.is_load_op() {
            result.noninductive.push(parent);
            continue;
        }
        let is_gep_or_compute =
            parent_node.microop == Microop::GetElementPtr || parent_node.microop.is_compute_op();
        if is_gep_or_compute && parent_node.function_id == current_func {
            if parent_node.microop == Microop::IndexAdd {
                result.inductive.push(parent);
            } else if !parent_node.inductive {
                let nested = find_memory_addr_sources(program, parent, current_func);
                result.noninductive.extend(nested.noninductive);
                result.inductive.extend(nested.inductive);
            }
        }
    }

    let current_node = program.node(current);
    if result.noninductive.is_empty()
        && result.inductive.is_empty()
        && current_node.microop.is_compute_op()
        && !current_node.inductive
        && current_node.function_id == current_func
    {
        result.noninductive.push(current);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::ExecNode;

    fn push(program: &mut Program, microop: Microop) -> NodeId {
        let id = program.node_count() as NodeId;
        let mut node = ExecNode::new(id, microop, 0, 0);
        node.isolated = false;
        program.insert_node(node)
    }

    #[test]
    fn non_inductive_gep_marks_load_as_dynamic() {
        let mut program = Program::new();
        let gep = push(&mut program, Microop::GetElementPtr);
        let load = push(&mut program, Microop::Load);
        program.add_edge(gep, load, EdgeKind::DataOperand(1));

        let sources = SourceManager::new();
        MemoryAmbiguationOpt.run(&mut program, &UserConfig::new(), &sources);

        assert!(program.node(load).dynamic_mem_op);
    }

    #[test]
    fn inductive_gep_does_not_mark_load_as_dynamic() {
        let mut program = Program::new();
        let mut gep = ExecNode::new(0, Microop::GetElementPtr, 0, 0);
        gep.isolated = false;
        gep.inductive = true;
        program.insert_node(gep);
        let load = push(&mut program, Microop::Load);
        program.add_edge(0, load, EdgeKind::DataOperand(1));

        let sources = SourceManager::new();
        MemoryAmbiguationOpt.run(&mut program, &UserConfig::new(), &sources);

        assert!(!program.node(load).dynamic_mem_op);
    }
}
