//! Array base-address / label resolution, grounded in
//! `original_source/common/graph_opts/base_address_init.cpp`.
//!
//! Walks backward from each memory op along its address-defining operand
//! (parameter 1 for Load/GEP, parameter 2 for Store) through a chain of
//! GEP/Load/Store nodes until it reaches an `Alloca`, and assigns the
//! alloca's array name as the memory op's `array_label`. Along the way,
//! register names are resolved through `call_arg_map` so a callee-side
//! pointer parameter attributes back to the caller's original array.

use super::GraphPass;
use crate::config::UserConfig;
use crate::microop::Microop;
use crate::node::NodeId;
use crate::program::Program;
use crate::source::SourceManager;

pub struct BaseAddressInit;

impl GraphPass for BaseAddressInit {
    fn name(&self) -> &'static str {
        "BaseAddressInit"
    }

    fn may_create_dead_nodes(&self) -> bool {
        false
    }

    fn run(&self, program: &mut Program, _config: &UserConfig, sources: &SourceManager) {
        let memory_ops: Vec<NodeId> = program
            .nodes
            .values()
            .filter(|n| !n.isolated && n.microop.is_memory_op())
            .map(|n| n.node_id)
            .collect();

        for node_id in memory_ops {
            if let Some(label) = resolve_array_label(program, sources, node_id) {
                if let Some(access) = &mut program.node_mut(node_id).mem_access {
                    access.array_label = Some(label);
                }
            }
        }
    }
}

fn resolve_array_label(program: &Program, sources: &SourceManager, start: NodeId) -> Option<String> {
    let mut current = start;
    let mut current_microop = program.node(current).microop;
    // The label found so far; each GEP/Load/Store hop overwrites it with its
    // own pointer register's name, and an Alloca hit makes it final. If the
    // chain runs out before reaching an Alloca (a dynamic/host address), the
    // last hop's name is returned as a best-effort label.
    let mut label: Option<String> = None;

    loop {
        let operand_index_of_address: u8 = match current_microop {
            Microop::Load | Microop::GetElementPtr => 1,
            Microop::Store | Microop::SilentStore => 2,
            _ => break,
        };

        let Some(parent) = program.in_edges(current).find_map(|(parent, kind)| {
            matches!(kind, crate::graph::EdgeKind::DataOperand(i) if i == operand_index_of_address)
                .then_some(parent)
        }) else {
            break;
        };

        let parent_node = program.node(parent);
        match parent_node.microop {
            Microop::GetElementPtr | Microop::Load | Microop::Store => {
                if let Some(dyn_var) = parent_node.result_variable {
                    let resolved = program.call_arg_map.lookup(dyn_var);
                    label = Some(sources.variable(resolved.variable_id).name.clone());
                }
                current = parent;
                current_microop = parent_node.microop;
            }
            Microop::Alloca => {
                label = parent_node.alloca_array_label.clone();
                break;
            }
            _ => break,
        }
    }

    label
}
