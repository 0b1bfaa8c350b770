//! Two-phase scheduler (spec §4.3): a forward event-driven ASAP pass,
//! followed by an ALAP compression pass and register read/write accounting.

use std::collections::{HashMap, VecDeque};

use crate::config::UserConfig;
use crate::graph::EdgeKind;
use crate::microop::Microop;
use crate::node::NodeId;
use crate::program::Program;
use crate::resource::{fu_latency, MemoryPortTracker};

/// Per-cycle register read/write activity, plus the total cycle count.
/// Feeds into the power/area report (spec §4.3 "Register accounting").
#[derive(Debug, Default)]
pub struct ScheduleResult {
    pub total_cycles: u64,
    pub register_writes: HashMap<u64, u32>,
    pub register_reads: HashMap<u64, u32>,
}

pub struct Scheduler;

impl Scheduler {
    /// Run the full two-phase schedule over `program`, mutating every
    /// non-isolated node's `start_cycle`/`complete_cycle`/
    /// `num_parents_remaining` in place.
    pub fn run(program: &mut Program, config: &UserConfig) -> ScheduleResult {
        let total_cycles = Self::run_asap(program, config);
        Self::run_alap(program);
        let (register_writes, register_reads) = Self::register_accounting(program);
        ScheduleResult {
            total_cycles,
            register_writes,
            register_reads,
        }
    }

    fn is_schedulable(program: &Program, node_id: NodeId) -> bool {
        let node = program.node(node_id);
        if node.isolated {
            return false;
        }
        program.in_degree(node_id) > 0 || program.out_degree(node_id) > 0 || node.microop.is_dma_op()
    }

    fn same_cycle_chain(program: &Program, parent: NodeId, child: NodeId, kind: EdgeKind) -> bool {
        if matches!(kind, EdgeKind::Control) {
            return false;
        }
        matches!(kind, EdgeKind::Register | EdgeKind::FusedBranch)
            || program.node(parent).microop.is_fu_zero_latency()
            || program.node(child).microop.is_fu_zero_latency()
    }

    fn memory_array(program: &Program, node_id: NodeId) -> Option<String> {
        program.node(node_id).array_label().map(|s| s.to_string())
    }

    fn run_asap(program: &mut Program, config: &UserConfig) -> u64 {
        let schedulable: Vec<NodeId> = program.nodes.keys().copied().filter(|&id| Self::is_schedulable(program, id)).collect();
        let total = schedulable.len();
        if total == 0 {
            return 0;
        }

        for &id in &schedulable {
            let in_deg = program.in_degree(id) as u32;
            program.node_mut(id).num_parents_remaining = in_deg;
        }

        let mut pending: Vec<NodeId> = schedulable
            .iter()
            .copied()
            .filter(|&id| program.node(id).num_parents_remaining == 0)
            .collect();
        let mut next_cycle_queue: VecDeque<NodeId> = VecDeque::new();
        let mut in_flight: Vec<(NodeId, u64)> = Vec::new();
        let mut ports = MemoryPortTracker::new(config);
        let mut executed = 0usize;
        let mut cycle: u64 = 0;

        while executed < total {
            ports.reset_cycle();

            // Stores first within the cycle's starting candidates (spec §4.3
            // ordering guarantee). New same-cycle arrivals are appended to
            // the back and drained by the same work loop below, so an
            // arbitrarily deep zero-latency/register-edge chain resolves
            // entirely within one cycle.
            pending.sort_by_key(|&id| if program.node(id).microop.is_store_op() { 0 } else { 1 });
            let mut work: VecDeque<NodeId> = pending.drain(..).collect();

            // Completions of nodes started in a prior cycle feed into the
            // same work loop (their same-cycle children, if any, need to
            // start this cycle too).
            let (done_now, still_in_flight): (Vec<_>, Vec<_>) =
                in_flight.into_iter().partition(|&(_, complete)| complete == cycle);
            in_flight = still_in_flight;
            let mut completed_this_cycle: Vec<NodeId> = Vec::new();
            for (node_id, _) in done_now {
                completed_this_cycle.push(node_id);
            }

            while let Some(node_id) = work.pop_front() {
                let microop = program.node(node_id).microop;

                if microop.is_memory_op() {
                    if let Some(array) = Self::memory_array(program, node_id) {
                        let acquired = if microop.is_load_op() {
                            ports.try_acquire_read(&array)
                        } else {
                            ports.try_acquire_write(&array)
                        };
                        if !acquired {
                            next_cycle_queue.push_back(node_id);
                            continue;
                        }
                    }
                }

                program.node_mut(node_id).start_cycle = Some(cycle);
                let latency = fu_latency(microop);
                if latency <= 1 {
                    program.node_mut(node_id).complete_cycle = Some(cycle);
                    completed_this_cycle.push(node_id);

                    let children: Vec<(NodeId, EdgeKind)> = program.out_edges(node_id).collect();
                    for (child, kind) in children {
                        let remaining = &mut program.node_mut(child).num_parents_remaining;
                        if *remaining > 0 {
                            *remaining -= 1;
                        }
                        if program.node(child).num_parents_remaining == 0 {
                            if Self::same_cycle_chain(program, node_id, child, kind) {
                                work.push_back(child);
                            } else {
                                next_cycle_queue.push_back(child);
                            }
                        }
                    }
                } else {
                    in_flight.push((node_id, cycle + latency - 1));
                }
            }

            // Route children of nodes that finished a multi-cycle in-flight
            // execution this cycle (their parents never passed through the
            // work loop above, since they started on an earlier cycle).
            for &node_id in &completed_this_cycle {
                if program.node(node_id).start_cycle == Some(cycle) {
                    // Already handled above (single-cycle completion).
                    continue;
                }
                let children: Vec<(NodeId, EdgeKind)> = program.out_edges(node_id).collect();
                for (child, kind) in children {
                    let remaining = &mut program.node_mut(child).num_parents_remaining;
                    if *remaining > 0 {
                        *remaining -= 1;
                    }
                    if program.node(child).num_parents_remaining == 0 {
                        if Self::same_cycle_chain(program, node_id, child, kind) {
                            // Cascading same-cycle work discovered only after
                            // the work loop drained; rare (register/fused edges
                            // out of a just-finished multi-cycle op) but still
                            // must start this cycle.
                            let mut extra = VecDeque::from([child]);
                            while let Some(n) = extra.pop_front() {
                                program.node_mut(n).start_cycle = Some(cycle);
                                program.node_mut(n).complete_cycle = Some(cycle);
                                completed_this_cycle.push(n);
                                for (gc, gkind) in program.out_edges(n).collect::<Vec<_>>() {
                                    let r = &mut program.node_mut(gc).num_parents_remaining;
                                    if *r > 0 {
                                        *r -= 1;
                                    }
                                    if program.node(gc).num_parents_remaining == 0 {
                                        if Self::same_cycle_chain(program, n, gc, gkind) {
                                            extra.push_back(gc);
                                        } else {
                                            next_cycle_queue.push_back(gc);
                                        }
                                    }
                                }
                            }
                        } else {
                            next_cycle_queue.push_back(child);
                        }
                    }
                }
            }

            executed += completed_this_cycle.len();
            pending = next_cycle_queue.drain(..).collect();
            cycle += 1;

            if cycle > (total as u64) * 64 + 1024 {
                // The graph is guaranteed acyclic (spec §4.3); this bound only
                // guards against a scheduler bug turning into an infinite loop.
                panic!("scheduler exceeded its deterministic cycle bound; this indicates a cycle in the DDDG");
            }
        }

        cycle
    }

    /// Bottom-up ALAP compression: walk nodes in descending node-id order
    /// (a valid reverse topological order since the builder only emits
    /// forward edges) and pull each non-memory, non-branch node's
    /// `complete_cycle` down to `min(child.start_cycle) - 1`.
    fn run_alap(program: &mut Program) {
        let node_ids: Vec<NodeId> = program.nodes.keys().rev().copied().collect();
        for node_id in node_ids {
            let node = program.node(node_id);
            if node.isolated || node.start_cycle.is_none() {
                continue;
            }
            if node.microop.is_memory_op() || node.microop.is_control_op() || node.microop.is_dma_op() {
                continue;
            }

            let min_child_start = program
                .out_edges(node_id)
                .filter_map(|(child, _)| program.node(child).start_cycle)
                .min();

            let Some(min_child_start) = min_child_start else { continue };
            if min_child_start == 0 {
                continue;
            }
            let new_complete = min_child_start - 1;
            let node = program.node(node_id);
            let Some(old_complete) = node.complete_cycle else { continue };
            if new_complete >= old_complete {
                continue;
            }
            let latency = fu_latency(node.microop);
            let new_start = new_complete + 1 - latency.max(1);
            program.node_mut(node_id).complete_cycle = Some(new_complete);
            program.node_mut(node_id).start_cycle = Some(new_start);
        }
    }

    /// Spec §4.3's "Register accounting": a write at `T_w` is only counted
    /// if some child reads later than `T_w`; each such non-load,
    /// non-control child contributes a read at its own cycle.
    fn register_accounting(program: &Program) -> (HashMap<u64, u32>, HashMap<u64, u32>) {
        let mut writes: HashMap<u64, u32> = HashMap::new();
        let mut reads: HashMap<u64, u32> = HashMap::new();

        for node in program.nodes.values() {
            if node.isolated || node.microop.is_control_op() || node.microop.is_index_op() {
                continue;
            }
            let Some(t_w) = node.complete_cycle else { continue };

            let mut read_cycles = Vec::new();
            for (child, _) in program.out_edges(node.node_id) {
                let child_node = program.node(child);
                if child_node.microop.is_load_op() || child_node.microop.is_control_op() {
                    continue;
                }
                if let Some(t_r) = child_node.start_cycle {
                    if t_r > t_w {
                        read_cycles.push(t_r);
                    }
                }
            }

            if !read_cycles.is_empty() {
                *writes.entry(t_w).or_insert(0) += 1;
                for t_r in read_cycles {
                    *reads.entry(t_r).or_insert(0) += 1;
                }
            }
        }

        (writes, reads)
    }
}
