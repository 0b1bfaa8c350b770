//! End-to-end tests exercising the invariants from spec §8 against small,
//! hand-built synthetic traces (not the MachSuite benchmarks the original
//! table names, which are not available to embed): a triad-like 3-array
//! pattern, a reduction pattern, and a register-file store/load pattern.
//! These are labeled as equivalent-scale stand-ins, not numeric parity with
//! the original counts.

use std::collections::HashMap;

use aladdin_core::config::{MemoryKind, PartitionEntry, PartitionKind, UserConfig};
use aladdin_core::graph::EdgeKind;
use aladdin_core::loop_info::LoopInfo;
use aladdin_core::microop::Microop;
use aladdin_core::node::{ExecNode, MemAccess};
use aladdin_core::passes::PassPipeline;
use aladdin_core::program::{LoopBound, Program};
use aladdin_core::scheduler::Scheduler;
use aladdin_core::source::SourceManager;

fn push(program: &mut Program, microop: Microop) -> u32 {
    let id = program.node_count() as u32;
    let mut node = ExecNode::new(id, microop, 0, 0);
    node.isolated = false;
    program.insert_node(node)
}

fn mem_push(program: &mut Program, microop: Microop, array: &str, addr: u64) -> u32 {
    let id = push(program, microop);
    program.node_mut(id).mem_access = Some(MemAccess {
        vaddr: addr,
        size_bytes: 4,
        is_float: false,
        bits: 32,
        array_label: Some(array.to_string()),
        partition_index: 0,
    });
    id
}

fn block_partition(config: &mut UserConfig, array: &str, size: u64) {
    config.partition.insert(
        array.to_string(),
        PartitionEntry {
            memory_kind: MemoryKind::Scratchpad,
            partition_kind: PartitionKind::Block,
            array_size_bytes: size,
            wordsize_bytes: 4,
            factor: 2,
            base_addr: 0,
        },
    );
}

/// Invariant 1: no self edges, both endpoints exist. Invariant 5: every
/// edge's timing is consistent with its kind. Invariant 6: per-cycle
/// per-partition port usage never exceeds the configured budget.
fn assert_common_invariants(program: &Program, config: &UserConfig) {
    for node in program.nodes.values() {
        for (child, kind) in program.out_edges(node.node_id) {
            assert_ne!(node.node_id, child, "self edge on node {}", node.node_id);
            assert!(program.nodes.contains_key(&child));

            if node.isolated || program.node(child).isolated {
                continue;
            }
            let (Some(parent_complete), Some(child_start)) =
                (node.complete_cycle, program.node(child).start_cycle)
            else {
                continue;
            };
            if matches!(kind, EdgeKind::Control) {
                assert!(
                    child_start > parent_complete,
                    "control edge {}->{} must strictly order: {} vs {}",
                    node.node_id,
                    child,
                    child_start,
                    parent_complete
                );
            } else {
                assert!(
                    child_start >= parent_complete,
                    "edge {}->{} violates scheduling order: {} vs {}",
                    node.node_id,
                    child,
                    child_start,
                    parent_complete
                );
            }
        }
    }

    let mut usage: HashMap<(u64, String, bool), u32> = HashMap::new();
    for node in program.nodes.values() {
        if node.isolated || !node.microop.is_memory_op() {
            continue;
        }
        let Some(start) = node.start_cycle else { continue };
        let Some(array) = node.array_label() else { continue };
        let is_load = node.microop.is_load_op();
        *usage.entry((start, array.to_string(), is_load)).or_insert(0) += 1;
    }
    for ((_, array, is_load), count) in usage {
        let Some(entry) = config.partition.get(&array) else { continue };
        if matches!(entry.partition_kind, PartitionKind::Complete) {
            continue;
        }
        let budget = config.scratchpad_ports;
        assert!(
            count <= budget,
            "{} {} on `{array}` exceeds port budget {budget} in one cycle",
            count,
            if is_load { "loads" } else { "stores" }
        );
    }
}

#[test]
fn triad_like_pattern_respects_port_budgets_and_labels() {
    let mut program = Program::new();
    let mut config = UserConfig::new();
    config.scratchpad_ports = 1;
    block_partition(&mut config, "a", 512);
    block_partition(&mut config, "b", 512);
    block_partition(&mut config, "c", 512);

    // Two unrolled iterations of `c[i] = a[i] + b[i]`.
    for i in 0..2u64 {
        let load_a = mem_push(&mut program, Microop::Load, "a", i * 4);
        let load_b = mem_push(&mut program, Microop::Load, "b", i * 4 + 1000);
        let add = push(&mut program, Microop::Add);
        let store_c = mem_push(&mut program, Microop::Store, "c", i * 4 + 2000);
        program.add_edge(load_a, add, EdgeKind::DataOperand(1));
        program.add_edge(load_b, add, EdgeKind::DataOperand(2));
        program.add_edge(add, store_c, EdgeKind::DataOperand(1));
    }

    let sources = SourceManager::new();
    let pipeline = PassPipeline::new(&config).unwrap();
    pipeline.run_all(&mut program, &config, &sources);
    Scheduler::run(&mut program, &config);

    for node in program.nodes.values() {
        if node.isolated || !node.microop.is_memory_op() {
            continue;
        }
        assert!(node.has_array_label(), "memory op {} lost its array label", node.node_id);
        assert!(config.partition.contains_key(node.array_label().unwrap()));
    }

    assert_common_invariants(&program, &config);
}

#[test]
fn reduction_pattern_shortens_after_tree_height_reduction() {
    let mut program = Program::new();
    let mut config = UserConfig::new();
    config.scratchpad_ports = 1;
    block_partition(&mut config, "in", 2048);

    // sum = ((in[0] + in[1]) + in[2]) + in[3], a left-leaning chain.
    let load0 = mem_push(&mut program, Microop::Load, "in", 0);
    let load1 = mem_push(&mut program, Microop::Load, "in", 4);
    let load2 = mem_push(&mut program, Microop::Load, "in", 8);
    let load3 = mem_push(&mut program, Microop::Load, "in", 12);
    let add1 = push(&mut program, Microop::Add);
    let add2 = push(&mut program, Microop::Add);
    let add3 = push(&mut program, Microop::Add);
    program.add_edge(load0, add1, EdgeKind::DataOperand(1));
    program.add_edge(load1, add1, EdgeKind::DataOperand(2));
    program.add_edge(add1, add2, EdgeKind::DataOperand(1));
    program.add_edge(load2, add2, EdgeKind::DataOperand(2));
    program.add_edge(add2, add3, EdgeKind::DataOperand(1));
    program.add_edge(load3, add3, EdgeKind::DataOperand(2));

    program.loop_bounds = vec![
        LoopBound { node_id: 0, target_loop_depth: 0 },
        LoopBound { node_id: program.node_count() as u32, target_loop_depth: 0 },
        LoopBound { node_id: program.node_count() as u32 + 1, target_loop_depth: 0 },
    ];

    let before_depth = {
        // Depth from load0 to the final sum, before any optimization.
        program.shortest_distance_between_nodes(load0, add3)
    };

    let sources = SourceManager::new();
    let pipeline = PassPipeline::new(&config).unwrap();
    pipeline.run_all(&mut program, &config, &sources);
    Scheduler::run(&mut program, &config);

    assert_common_invariants(&program, &config);

    let after_depth = program.shortest_distance_between_nodes(load0, add3);
    assert!(
        after_depth >= 0 && after_depth <= before_depth,
        "tree height reduction should not lengthen the critical path: before {before_depth}, after {after_depth}"
    );
}

#[test]
fn register_file_store_load_pattern_fuses_into_register_edges() {
    let mut program = Program::new();
    let mut config = UserConfig::new();
    config.partition.insert(
        "result".to_string(),
        PartitionEntry {
            memory_kind: MemoryKind::Register,
            partition_kind: PartitionKind::Complete,
            array_size_bytes: 64,
            wordsize_bytes: 4,
            factor: 16,
            base_addr: 0,
        },
    );

    let producer = push(&mut program, Microop::Add);
    let store = mem_push(&mut program, Microop::Store, "result", 0);
    program.add_edge(producer, store, EdgeKind::DataOperand(1));
    let load = mem_push(&mut program, Microop::Load, "result", 0);
    let consumer = push(&mut program, Microop::Add);
    program.add_edge(load, consumer, EdgeKind::DataOperand(1));

    let sources = SourceManager::new();
    let pipeline = PassPipeline::new(&config).unwrap();
    pipeline.run_all(&mut program, &config, &sources);
    Scheduler::run(&mut program, &config);

    assert_common_invariants(&program, &config);

    let fused = program
        .in_edges(store)
        .chain(program.out_edges(load))
        .any(|(_, kind)| matches!(kind, EdgeKind::Register));
    assert!(fused, "register-file accesses should fuse into a register edge");
}

/// Invariant 7: re-running the full pipeline on the same inputs is
/// deterministic.
#[test]
fn repeated_runs_are_bit_identical() {
    fn build_and_run() -> Program {
        let mut program = Program::new();
        let mut config = UserConfig::new();
        config.scratchpad_ports = 2;
        block_partition(&mut config, "a", 512);

        for i in 0..4u64 {
            let load = mem_push(&mut program, Microop::Load, "a", i * 4);
            let add = push(&mut program, Microop::Add);
            program.add_edge(load, add, EdgeKind::DataOperand(1));
        }

        let sources = SourceManager::new();
        let pipeline = PassPipeline::new(&config).unwrap();
        pipeline.run_all(&mut program, &config, &sources);
        Scheduler::run(&mut program, &config);
        program
    }

    let first = build_and_run();
    let second = build_and_run();

    assert_eq!(first.node_count(), second.node_count());
    for id in 0..first.node_count() as u32 {
        assert_eq!(first.node(id).start_cycle, second.node(id).start_cycle);
        assert_eq!(first.node(id).complete_cycle, second.node(id).complete_cycle);
        assert_eq!(first.node(id).isolated, second.node(id).isolated);
    }
}

/// LoopInfo property test (spec §8): upsampling a loop with factor 1 is a
/// no-op on the root's elapsed cycle count.
#[test]
fn upsampling_a_loop_with_factor_one_does_not_change_root_elapsed_cycle() {
    let mut program = Program::new();
    let label = aladdin_core::source::UniqueLabel { function_id: 0, label_id: 1 };
    program.labelmap.insert(5, vec![label]);

    let start = push(&mut program, Microop::Br);
    let end = push(&mut program, Microop::Br);
    program.node_mut(start).line_num = 5;
    program.node_mut(end).line_num = 5;
    program.node_mut(start).complete_cycle = Some(10);
    program.node_mut(end).complete_cycle = Some(25);
    program.add_edge(start, end, EdgeKind::Control);
    program.loop_bounds = vec![
        LoopBound { node_id: start, target_loop_depth: 0 },
        LoopBound { node_id: end, target_loop_depth: 0 },
    ];

    let mut without_sampling = LoopInfo::new();
    without_sampling.build_loop_tree(&program);
    let baseline = without_sampling.upsample_loops(&program);

    let mut with_factor_one = LoopInfo::new();
    let dyn_label = aladdin_core::source::DynamicLabel {
        unique_label: label,
        line_number: 5,
        dyn_func: aladdin_core::source::DynamicFunction {
            function_id: program.node(start).function_id,
            iteration: program.node(start).dynamic_invocation,
        },
    };
    with_factor_one.add_sampling_factor(dyn_label, 1.0);
    with_factor_one.build_loop_tree(&program);
    let sampled = with_factor_one.upsample_loops(&program);

    assert_eq!(baseline, sampled);
}
