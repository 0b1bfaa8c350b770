//! The loop tree (spec §4.4), grounded in `original_source/common/LoopInfo.{h,cpp}`.
//!
//! After scheduling, every dynamic loop iteration recorded in
//! `Program::loop_bounds` is inserted into a tree rooted at a contrived
//! "whole program" node, nested by which iteration's node-id range contains
//! which. Loops that were only sampled (traced once, the rest of their
//! iterations assumed similar) get their elapsed cycles scaled back up to
//! what the full iteration count would have taken, and that correction is
//! propagated up through every ancestor.

use std::collections::HashMap;

use crate::program::Program;
use crate::source::{DynamicFunction, DynamicLabel, UniqueLabel};

/// Index into `LoopInfo::iterations`; `usize::MAX` is used as a null parent
/// sentinel for the root.
pub type IterId = usize;

const NO_PARENT: IterId = usize::MAX;

/// One node of the loop tree: either the synthetic root, or one concrete
/// dynamic iteration of a labeled loop.
#[derive(Debug, Clone)]
pub struct LoopIteration {
    pub label: Option<UniqueLabel>,
    pub start_node: u32,
    pub end_node: u32,
    pub parent: IterId,
    pub children: Vec<IterId>,
    pub pipelined: bool,
    pub sampled: bool,
    pub factor: f32,
    pub upsampled: bool,
    pub elapsed_cycle: i64,
}

impl LoopIteration {
    fn root() -> Self {
        LoopIteration {
            label: None,
            start_node: 0,
            end_node: 0,
            parent: NO_PARENT,
            children: Vec::new(),
            pipelined: false,
            sampled: false,
            factor: 1.0,
            upsampled: false,
            elapsed_cycle: 0,
        }
    }

    pub fn is_root(&self) -> bool {
        self.label.is_none()
    }

    /// Whether `self`'s node-id range contains `other`'s. The root contains
    /// everything.
    fn contains(&self, other: &LoopIteration) -> bool {
        self.is_root() || (self.start_node <= other.start_node && self.end_node >= other.end_node)
    }
}

/// Owns the loop tree built from a scheduled `Program`, plus the sampling
/// factors that drive `upsample_loops`.
pub struct LoopInfo {
    pub iterations: Vec<LoopIteration>,
    pub root: IterId,
    sampling_factors: HashMap<DynamicLabel, f32>,
}

impl LoopInfo {
    pub fn new() -> Self {
        LoopInfo {
            iterations: Vec::new(),
            root: NO_PARENT,
            sampling_factors: HashMap::new(),
        }
    }

    pub fn add_sampling_factor(&mut self, label: DynamicLabel, factor: f32) {
        self.sampling_factors.insert(label, factor);
    }

    /// Build the loop tree: a root, then every labeled loop's iterations,
    /// each inserted into the subtree that contains it.
    pub fn build_loop_tree(&mut self, program: &Program) {
        self.iterations.clear();
        self.iterations.push(LoopIteration::root());
        self.root = 0;

        let mut labels: Vec<UniqueLabel> = program
            .labelmap
            .values()
            .flatten()
            .copied()
            .collect();
        labels.sort_by_key(|l| (l.function_id, l.label_id));
        labels.dedup();

        for label in labels {
            for (start_node, end_node) in program.find_loop_boundaries(label) {
                let mut iter = LoopIteration {
                    label: Some(label),
                    start_node,
                    end_node,
                    parent: NO_PARENT,
                    children: Vec::new(),
                    pipelined: false,
                    sampled: false,
                    factor: 1.0,
                    upsampled: false,
                    elapsed_cycle: 0,
                };

                let start_line = program.node(start_node).line_num;
                let start_func = DynamicFunction {
                    function_id: program.node(start_node).function_id,
                    iteration: program.node(start_node).dynamic_invocation,
                };
                for (dyn_label, factor) in &self.sampling_factors {
                    if start_line >= 0
                        && dyn_label.line_number == start_line as u32
                        && dyn_label.dyn_func == start_func
                    {
                        iter.factor = *factor;
                        iter.sampled = true;
                    }
                }

                let id = self.iterations.len();
                self.iterations.push(iter);
                self.insert_loop(self.root, id);
            }
        }
    }

    /// Find the right place for `loop_id` under `node_id`'s subtree: if it's
    /// a leaf, just append; otherwise, for every child either the loop
    /// becomes the child's new parent (loop contains child), or recurse into
    /// it (child contains loop), or neither, in which case the loop becomes a
    /// new sibling.
    fn insert_loop(&mut self, node_id: IterId, loop_id: IterId) -> bool {
        if !self.iterations[node_id].contains(&self.iterations[loop_id]) {
            return false;
        }

        if self.iterations[node_id].children.is_empty() {
            self.iterations[node_id].children.push(loop_id);
            self.iterations[loop_id].parent = node_id;
            return true;
        }

        let mut inserted = false;
        let children = self.iterations[node_id].children.clone();
        let mut new_children = Vec::with_capacity(children.len() + 1);
        let mut loop_placed = false;

        for child_id in children {
            if self.iterations[loop_id].contains(&self.iterations[child_id]) {
                self.iterations[loop_id].children.push(child_id);
                self.iterations[child_id].parent = loop_id;
                if !loop_placed {
                    new_children.push(loop_id);
                    self.iterations[loop_id].parent = node_id;
                    loop_placed = true;
                }
                inserted = true;
            } else {
                if self.insert_loop(child_id, loop_id) {
                    inserted = true;
                }
                new_children.push(child_id);
            }
        }
        self.iterations[node_id].children = new_children;

        if !inserted {
            self.iterations[node_id].children.push(loop_id);
            self.iterations[loop_id].parent = node_id;
        }
        true
    }

    /// Upsample every sampled loop iteration's elapsed cycles back up to
    /// what its full (unsampled) iteration count would have taken, and
    /// propagate the correction up through every ancestor. Returns the
    /// correction to add to the measured total cycle count.
    pub fn upsample_loops(&mut self, program: &Program) -> i64 {
        let ids: Vec<IterId> = (0..self.iterations.len()).collect();

        for &id in &ids {
            if !self.iterations[id].sampled {
                continue;
            }
            let start_complete = program.node(self.iterations[id].start_node).complete_cycle;
            let end_complete = program.node(self.iterations[id].end_node).complete_cycle;
            if let (Some(s), Some(e)) = (start_complete, end_complete) {
                self.iterations[id].elapsed_cycle = e as i64 - s as i64;
            }
            self.dma_correction(id, program);
        }

        for &id in &ids {
            let sampled = self.iterations[id].sampled;
            let parent = self.iterations[id].parent;
            let already_upsampled = self.iterations[id].upsampled;
            if !sampled || parent == NO_PARENT || already_upsampled {
                continue;
            }

            let factor = self.iterations[id].factor;
            let elapsed = self.iterations[id].elapsed_cycle;
            let mut correction = (elapsed as f32 * (factor - 1.0)) as i64;

            if self.iterations[id].pipelined {
                debug_assert!(
                    self.iterations[id].children.is_empty(),
                    "inner loops of a pipelined loop should have been flattened"
                );
                let label = self.iterations[id].label;
                let siblings: Vec<IterId> = self.iterations[parent]
                    .children
                    .iter()
                    .copied()
                    .filter(|&c| self.iterations[c].label == label)
                    .collect();
                for &sib in &siblings {
                    self.iterations[sib].upsampled = true;
                }

                let mut total_interval = 0i64;
                for pair in siblings.windows(2) {
                    let a = program.node(self.iterations[pair[0]].end_node).complete_cycle;
                    let b = program.node(self.iterations[pair[1]].end_node).complete_cycle;
                    if let (Some(a), Some(b)) = (a, b) {
                        total_interval += b as i64 - a as i64;
                    }
                }
                let avg_interval = if siblings.len() > 1 {
                    total_interval / (siblings.len() as i64 - 1)
                } else {
                    0
                };
                correction = avg_interval * siblings.len() as i64 * (factor as i64 - 1);
            }

            self.propagate_correction(parent, correction);
            self.iterations[id].upsampled = true;
        }

        self.iterations[self.root].elapsed_cycle
    }

    fn propagate_correction(&mut self, node_id: IterId, correction: i64) {
        if self.iterations[node_id].is_root() {
            self.iterations[node_id].elapsed_cycle += correction;
        } else {
            let parent = self.iterations[node_id].parent;
            let factor = self.iterations[node_id].factor;
            self.propagate_correction(parent, (correction as f32 * factor) as i64);
        }
    }

    /// DMA completion heuristic (spec §9): if the loop's children never
    /// block on a DMA load feeding them but the DMA still runs concurrently
    /// with the loop body, use the DMA's completion cycle as the sample's
    /// effective start so the sampled latency doesn't count time that would
    /// have been hidden behind the transfer anyway.
    fn dma_correction(&mut self, id: IterId, program: &Program) {
        let start = self.iterations[id].start_node;
        let end = self.iterations[id].end_node;
        let mut merge_start = i64::MAX;
        let mut merge_end = i64::MIN;

        for node_id in (start + 1)..end {
            if !program.nodes.contains_key(&node_id) {
                continue;
            }
            for (parent, _) in program.in_edges(node_id) {
                let parent_node = program.node(parent);
                if !parent_node.microop.is_load_op() {
                    continue;
                }
                if let (Some(s), Some(e)) = (parent_node.start_cycle, parent_node.complete_cycle) {
                    merge_start = merge_start.min(s as i64);
                    merge_end = merge_end.max(e as i64);
                }
            }
        }

        if merge_end == i64::MIN {
            return;
        }
        let sample_start = program.node(start).complete_cycle.map(|c| c as i64);
        let sample_end = program.node(end).complete_cycle.map(|c| c as i64);
        let (Some(sample_start), Some(sample_end)) = (sample_start, sample_end) else { return };
        if merge_end < sample_start {
            return;
        }
        self.iterations[id].elapsed_cycle = sample_end - merge_end;
    }
}

impl Default for LoopInfo {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::EdgeKind;
    use crate::microop::Microop;
    use crate::node::ExecNode;
    use crate::program::LoopBound;

    fn push(program: &mut Program, microop: Microop, line: i32) -> u32 {
        let id = program.node_count() as u32;
        let mut node = ExecNode::new(id, microop, 0, 0);
        node.isolated = false;
        node.line_num = line;
        node.start_cycle = Some(id as u64);
        node.complete_cycle = Some(id as u64);
        program.insert_node(node)
    }

    #[test]
    fn nested_loop_iterations_build_a_two_level_tree() {
        let mut program = Program::new();
        let outer_label = UniqueLabel { function_id: 0, label_id: 1 };
        let inner_label = UniqueLabel { function_id: 0, label_id: 2 };
        program.labelmap.insert(10, vec![outer_label]);
        program.labelmap.insert(11, vec![inner_label]);

        let outer_start = push(&mut program, Microop::Br, 10);
        let inner_start = push(&mut program, Microop::Br, 11);
        let inner_end = push(&mut program, Microop::Br, 11);
        let outer_end = push(&mut program, Microop::Br, 10);
        program.add_edge(outer_start, inner_start, EdgeKind::Control);
        program.add_edge(inner_start, inner_end, EdgeKind::Control);
        program.add_edge(inner_end, outer_end, EdgeKind::Control);

        program.loop_bounds = vec![
            LoopBound { node_id: outer_start, target_loop_depth: 0 },
            LoopBound { node_id: inner_start, target_loop_depth: 1 },
            LoopBound { node_id: inner_end, target_loop_depth: 1 },
            LoopBound { node_id: outer_end, target_loop_depth: 0 },
        ];

        let mut loop_info = LoopInfo::new();
        loop_info.build_loop_tree(&program);

        assert_eq!(loop_info.iterations[loop_info.root].children.len(), 1);
        let outer_id = loop_info.iterations[loop_info.root].children[0];
        assert_eq!(loop_info.iterations[outer_id].label, Some(outer_label));
        assert_eq!(loop_info.iterations[outer_id].children.len(), 1);
        let inner_id = loop_info.iterations[outer_id].children[0];
        assert_eq!(loop_info.iterations[inner_id].label, Some(inner_label));
    }

    #[test]
    fn sampled_loop_upsamples_elapsed_cycle_into_root() {
        let mut program = Program::new();
        let label = UniqueLabel { function_id: 0, label_id: 1 };
        program.labelmap.insert(5, vec![label]);

        let start = push(&mut program, Microop::Br, 5);
        let end = push(&mut program, Microop::Br, 5);
        program.node_mut(start).complete_cycle = Some(10);
        program.node_mut(end).complete_cycle = Some(20);
        program.add_edge(start, end, EdgeKind::Control);

        program.loop_bounds = vec![
            LoopBound { node_id: start, target_loop_depth: 0 },
            LoopBound { node_id: end, target_loop_depth: 0 },
        ];

        let mut loop_info = LoopInfo::new();
        let dyn_label = DynamicLabel {
            unique_label: label,
            line_number: 5,
            dyn_func: DynamicFunction {
                function_id: program.node(start).function_id,
                iteration: program.node(start).dynamic_invocation,
            },
        };
        loop_info.add_sampling_factor(dyn_label, 4.0);
        loop_info.build_loop_tree(&program);
        let corrected = loop_info.upsample_loops(&program);

        // elapsed == 10 cycles measured once; factor 4 means 3 extra
        // iterations' worth (30 cycles) get folded into the root.
        assert_eq!(corrected, 30);
    }
}
