//! Induction dependence removal, grounded in
//! `original_source/common/graph_opts/induction_dependence_removal.cpp`.
//!
//! A node is inductive if its static instruction is itself marked inductive
//! (the `indvars` substring check done at intern time, see `source.rs`), or
//! if every non-control parent is inductive. Inductive integer adds become
//! `IndexAdd`; inductive integer muls become `Shl` (strength reduction),
//! matching the original's opcode rewrite.

use super::GraphPass;
use crate::config::UserConfig;
use crate::microop::Microop;
use crate::program::Program;
use crate::source::SourceManager;

pub struct InductionDependenceRemoval;

impl GraphPass for InductionDependenceRemoval {
    fn name(&self) -> &'static str {
        "InductionDependenceRemoval"
    }

    fn may_create_dead_nodes(&self) -> bool {
        false
    }

    fn run(&self, program: &mut Program, _config: &UserConfig, sources: &SourceManager) {
        let node_ids: Vec<_> = program.nodes.keys().copied().collect();

        for node_id in node_ids {
            // Reset first so no child mistakenly sees a stale inductive flag.
            program.node_mut(node_id).inductive = false;

            let node = program.node(node_id);
            if node.isolated || node.microop.is_memory_op() {
                continue;
            }
            if sources.instruction(node.instruction_id).inductive {
                mark_inductive(program, node_id);
                continue;
            }

            let parents: Vec<_> = program
                .in_edges(node_id)
                .filter(|(_, kind)| !kind.is_control())
                .map(|(parent, _)| parent)
                .collect();
            if parents.is_empty() {
                continue;
            }
            let all_inductive = parents.iter().all(|&p| program.node(p).inductive);
            let any_inductive = parents.iter().any(|&p| program.node(p).inductive);

            if all_inductive {
                mark_inductive(program, node_id);
            } else if any_inductive && program.node(node_id).microop.is_mul_op() {
                program.node_mut(node_id).microop = Microop::Shl;
            }
        }
    }
}

fn mark_inductive(program: &mut Program, node_id: crate::node::NodeId) {
    let node = program.node_mut(node_id);
    node.inductive = true;
    if node.microop == Microop::Add {
        node.microop = Microop::IndexAdd;
    } else if node.microop.is_mul_op() {
        node.microop = Microop::Shl;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::ExecNode;
    use crate::source::SourceManager;

    fn build_program(inductive_instr: bool) -> (Program, SourceManager) {
        let mut sources = SourceManager::new();
        let instr = sources.intern_instruction(if inductive_instr { "i.indvars" } else { "i" });
        let mut program = Program::new();
        let mut node = ExecNode::new(0, Microop::Add, 0, instr);
        node.isolated = false;
        program.insert_node(node);
        (program, sources)
    }

    #[test]
    fn inductive_instruction_converts_add_to_index_add() {
        let (mut program, sources) = build_program(true);
        InductionDependenceRemoval.run(&mut program, &UserConfig::new(), &sources);
        assert_eq!(program.node(0).microop, Microop::IndexAdd);
        assert!(program.node(0).inductive);
    }

    #[test]
    fn non_inductive_node_with_no_parents_stays_unmarked() {
        let (mut program, sources) = build_program(false);
        InductionDependenceRemoval.run(&mut program, &UserConfig::new(), &sources);
        assert!(!program.node(0).inductive);
        assert_eq!(program.node(0).microop, Microop::Add);
    }
}
