//! DDDG construction: turns a parsed trace stream into a populated
//! [`Program`], per spec §4.1.
//!
//! One [`DddgBuilder`] is driven record-by-record by [`build`]; it never
//! buffers more than the instruction currently under construction, so
//! memory use tracks the live register/address working set, not the trace
//! length.

use std::collections::{BTreeMap, HashMap};

use crate::config::UserConfig;
use crate::error::AladdinError;
use crate::graph::EdgeKind;
use crate::microop::Microop;
use crate::node::{DmaAccess, ExecNode, MemAccess, NodeId};
use crate::program::Program;
use crate::source::{DynamicFunction, DynamicVariable, SourceManager, SrcId};
use crate::trace::reader::TraceReader;
use crate::trace::{Line, OperandRecord, Value};

/// Address/size/label state accumulated from a load/store/DMA instruction's
/// parameter records, consumed when its result record arrives.
#[derive(Default, Clone)]
struct PendingMemAccess {
    addr: Option<u64>,
    host_base: Option<u64>,
    src_offset: Option<u64>,
    dst_offset: Option<u64>,
}

struct DddgBuilder<'a> {
    sources: &'a mut SourceManager,
    config: &'a mut UserConfig,
    program: Program,

    register_last_written: HashMap<DynamicVariable, NodeId>,
    address_last_written: BTreeMap<u64, NodeId>,
    active_method: Vec<DynamicFunction>,
    curr_dynamic_function: DynamicFunction,
    curr_node: Option<NodeId>,
    num_of_instructions: u64,
    prev_microop: Option<Microop>,
    curr_microop: Option<Microop>,
    prev_bblock: SrcId,
    curr_bblock: SrcId,
    last_dma_fence: Option<NodeId>,
    last_dma_nodes: Vec<NodeId>,
    unique_reg_in_caller_func: Option<DynamicVariable>,
    pending_mem: PendingMemAccess,
}

/// Build a [`Program`] from an open trace stream, interning every source
/// entity it references into `sources` and recording array base addresses
/// discovered along the way into `config`.
pub fn build(
    trace: &mut TraceReader,
    sources: &mut SourceManager,
    config: &mut UserConfig,
) -> Result<Program, AladdinError> {
    let mut builder = DddgBuilder {
        sources,
        config,
        program: Program::new(),
        register_last_written: HashMap::new(),
        address_last_written: BTreeMap::new(),
        active_method: Vec::new(),
        curr_dynamic_function: DynamicFunction::default(),
        curr_node: None,
        num_of_instructions: 0,
        prev_microop: None,
        curr_microop: None,
        prev_bblock: crate::source::INVALID_ID,
        curr_bblock: crate::source::INVALID_ID,
        last_dma_fence: None,
        last_dma_nodes: Vec::new(),
        unique_reg_in_caller_func: None,
        pending_mem: PendingMemAccess::default(),
    };

    while let Some(line) = trace.next_line()? {
        builder.handle_line(line);
    }

    Ok(builder.program)
}

impl<'a> DddgBuilder<'a> {
    fn handle_line(&mut self, line: Line) {
        match line {
            Line::LabelMapStart | Line::LabelMapEnd => {}
            Line::LabelMapEntry {
                function,
                label,
                line_number,
            } => {
                let function_id = self.sources.intern_function(&function);
                let label_id = self.sources.intern_label(&label);
                self.program
                    .labelmap
                    .entry(line_number)
                    .or_default()
                    .push(crate::source::UniqueLabel { function_id, label_id });
            }
            Line::Instruction {
                line_num,
                function,
                basic_block_id,
                instruction_id,
                microop,
                dynamic_inst_count,
            } => self.handle_instruction(
                line_num,
                &function,
                &basic_block_id,
                &instruction_id,
                microop,
                dynamic_inst_count,
            ),
            Line::Parameter { index, record } => self.handle_parameter(index, record),
            Line::Result(record) => self.handle_result(record),
            Line::Forward(record) => self.handle_forward(record),
        }
    }

    fn handle_instruction(
        &mut self,
        line_num: i32,
        function: &str,
        basic_block_id: &str,
        instruction_id: &str,
        microop: Microop,
        dynamic_inst_count: u64,
    ) {
        let function_id = self.sources.intern_function(function);
        let instruction_sid = self.sources.intern_instruction(instruction_id);
        let bblock_id = self.sources.intern_basic_block(basic_block_id);

        if self.active_method.is_empty() {
            // First instruction of the trace: establish the root invocation.
            self.curr_dynamic_function = DynamicFunction {
                function_id,
                iteration: self.sources.function(function_id).invocations(),
            };
            self.active_method.push(self.curr_dynamic_function);
        }

        let node_id = self.program.node_count() as NodeId;
        let mut node = ExecNode::new(node_id, microop, self.curr_dynamic_function.function_id, instruction_sid);
        node.line_num = line_num;
        node.basic_block_id = bblock_id;
        node.dynamic_invocation = self.curr_dynamic_function.iteration;
        node.inductive = self.sources.instruction(instruction_sid).inductive;

        self.program.insert_node(node);
        self.num_of_instructions = dynamic_inst_count;

        if microop.is_dma_op() {
            if let Some(fence) = self.last_dma_fence {
                self.program.add_edge(fence, node_id, EdgeKind::Control);
            }
            self.last_dma_nodes.push(node_id);
        }
        if microop == Microop::DmaFence {
            for &dma_node in &self.last_dma_nodes {
                self.program.add_edge(dma_node, node_id, EdgeKind::Control);
            }
            self.last_dma_nodes.clear();
            self.last_dma_fence = Some(node_id);
        }

        self.prev_microop = self.curr_microop;
        self.curr_microop = Some(microop);
        self.prev_bblock = self.curr_bblock;
        self.curr_bblock = bblock_id;
        self.curr_node = Some(node_id);
        self.pending_mem = PendingMemAccess::default();

        if microop == Microop::Ret {
            self.active_method.pop();
            if let Some(&caller) = self.active_method.last() {
                self.curr_dynamic_function = caller;
            }
        }
    }

    fn handle_parameter(&mut self, index: u32, record: OperandRecord) {
        let Some(curr) = self.curr_node else { return };
        let curr_microop = self.curr_microop.unwrap();

        if record.is_register {
            let var = self.dynamic_variable(&record.label);
            if let Some(&parent) = self.register_last_written.get(&var) {
                self.program
                    .add_edge(parent, curr, EdgeKind::DataOperand(index as u8));
            }
        }

        if curr_microop == Microop::Call && index == 1 {
            let function_id = self.sources.intern_function(&record.label);
            self.sources.function_mut(function_id).increment_invocations();
            let callee = DynamicFunction {
                function_id,
                iteration: self.sources.function(function_id).invocations() - 1,
            };
            self.active_method.push(callee);
            self.curr_dynamic_function = callee;
        } else if curr_microop == Microop::Call && index >= 2 && record.is_register {
            // The callee was already pushed while handling parameter 1, so
            // the caller's invocation is one below the top of the stack.
            let caller_depth = self.active_method.len().saturating_sub(2);
            let caller_func = self
                .active_method
                .get(caller_depth)
                .copied()
                .unwrap_or(self.curr_dynamic_function);
            self.unique_reg_in_caller_func = Some(self.dynamic_variable_in(caller_func, &record.label));
        }

        if (curr_microop.is_load_op() || curr_microop.is_store_op() || curr_microop == Microop::GetElementPtr)
            && index == 1
        {
            self.pending_mem.addr = Some(record.value.as_address());
        }

        if curr_microop.is_dma_op() {
            match index {
                1 => self.pending_mem.host_base = Some(record.value.as_address()),
                2 => self.pending_mem.src_offset = Some(record.value.as_address()),
                3 => self.pending_mem.dst_offset = Some(record.value.as_address()),
                _ => {}
            }
        }
    }

    fn handle_result(&mut self, record: OperandRecord) {
        let Some(curr) = self.curr_node else { return };
        let curr_microop = self.curr_microop.unwrap();

        if record.is_register {
            let var = self.dynamic_variable(&record.label);
            self.register_last_written.insert(var, curr);
            self.program.node_mut(curr).result_variable = Some(var);
        }

        if curr_microop == Microop::Alloca {
            self.config.set_array_base_addr(&record.label, record.value.as_address());
            self.program.node_mut(curr).alloca_array_label = Some(record.label);
            return;
        }

        if curr_microop.is_load_op() {
            let addr = self.pending_mem.addr.unwrap_or_else(|| record.value.as_address());
            let size_bytes = (record.size_bits / 8).max(1);
            for (&_byte, &writer) in self.address_last_written.range(addr..addr + size_bytes as u64) {
                self.program.add_edge(writer, curr, EdgeKind::Memory);
            }
            self.program.node_mut(curr).mem_access = Some(MemAccess {
                vaddr: addr,
                size_bytes,
                is_float: record.value.is_float(),
                bits: record.size_bits,
                array_label: None,
                partition_index: 0,
            });
        } else if curr_microop.is_store_op() {
            let addr = self.pending_mem.addr.unwrap_or_else(|| record.value.as_address());
            let size_bytes = (record.size_bits / 8).max(1);
            for byte in addr..addr + size_bytes as u64 {
                if let Some(&prev_writer) = self.address_last_written.get(&byte) {
                    if self.program.node(prev_writer).microop.is_dma_load() {
                        self.program.add_edge(prev_writer, curr, EdgeKind::Memory);
                    }
                }
                self.address_last_written.insert(byte, curr);
            }
            self.program.node_mut(curr).mem_access = Some(MemAccess {
                vaddr: addr,
                size_bytes,
                is_float: record.value.is_float(),
                bits: record.size_bits,
                array_label: None,
                partition_index: 0,
            });
        } else if curr_microop.is_dma_op() {
            let host_base = self.pending_mem.host_base.unwrap_or(0);
            let src_offset = self.pending_mem.src_offset.unwrap_or(0);
            let dst_offset = self.pending_mem.dst_offset.unwrap_or(0);
            let size_bytes = record.value.as_address();
            if curr_microop.is_dma_load() && !self.config.ready_mode {
                let dst = host_base + dst_offset;
                for (&_byte, &writer) in self.address_last_written.range(dst..dst + size_bytes) {
                    self.program.add_edge(writer, curr, EdgeKind::Memory);
                }
            }
            self.program.node_mut(curr).dma_access = Some(DmaAccess {
                host_base,
                src_offset,
                dst_offset,
                size_bytes,
                memory_type: crate::config::MemoryKind::Dma,
            });
        }
    }

    fn handle_forward(&mut self, record: OperandRecord) {
        if !record.is_register {
            return;
        }
        let Some(caller_var) = self.unique_reg_in_caller_func.take() else {
            return;
        };
        let callee_var = self.dynamic_variable(&record.label);
        self.program.call_arg_map.add(callee_var, caller_var);
    }

    fn dynamic_variable(&mut self, name: &str) -> DynamicVariable {
        self.dynamic_variable_in(self.curr_dynamic_function, name)
    }

    fn dynamic_variable_in(&mut self, dyn_func: DynamicFunction, name: &str) -> DynamicVariable {
        DynamicVariable {
            dyn_func,
            variable_id: self.sources.intern_variable(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn gz_trace(path: &std::path::Path, text: &str) {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        let file = std::fs::File::create(path).unwrap();
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(text.as_bytes()).unwrap();
        encoder.finish().unwrap();
    }

    #[test]
    fn simple_add_chain_produces_data_edges() {
        let dir = std::env::temp_dir();
        let path = dir.join("aladdin_builder_test_add_chain.gz");
        let text = "\
0,1,foo,bb.0,i1,7,1
r,32,10,1,x
0,2,foo,bb.0,i2,7,2
1,32,10,1,x
r,32,20,1,y
";
        gz_trace(&path, text);

        let mut sources = SourceManager::new();
        let mut config = UserConfig::new();
        let mut reader = TraceReader::open(&path).unwrap();
        let program = build(&mut reader, &mut sources, &mut config).unwrap();

        assert_eq!(program.node_count(), 2);
        assert!(program.edge_exists(0, 1));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn store_then_load_produces_memory_edge() {
        let dir = std::env::temp_dir();
        let path = dir.join("aladdin_builder_test_mem.gz");
        let text = "\
0,1,foo,bb.0,store1,2,1
1,32,4096,0,addr
2,32,7,0,val
r,32,7,0,val
0,2,foo,bb.0,load1,1,2
1,32,4096,0,addr
r,32,0,0,val
";
        gz_trace(&path, text);

        let mut sources = SourceManager::new();
        let mut config = UserConfig::new();
        let mut reader = TraceReader::open(&path).unwrap();
        let program = build(&mut reader, &mut sources, &mut config).unwrap();

        assert_eq!(program.node_count(), 2);
        assert!(program.edge_exists(0, 1));
    }

    #[test]
    fn alloca_result_records_base_address_in_config() {
        let dir = std::env::temp_dir();
        let path = dir.join("aladdin_builder_test_alloca.gz");
        let text = "0,1,foo,bb.0,alloca1,45,1\nr,32,8192,0,my_array\n";
        gz_trace(&path, text);

        let mut sources = SourceManager::new();
        let mut config = UserConfig::new();
        config.partition.insert(
            "my_array".to_string(),
            crate::config::PartitionEntry {
                memory_kind: crate::config::MemoryKind::Scratchpad,
                partition_kind: crate::config::PartitionKind::Block,
                array_size_bytes: 1024,
                wordsize_bytes: 4,
                factor: 1,
                base_addr: 0,
            },
        );
        let mut reader = TraceReader::open(&path).unwrap();
        build(&mut reader, &mut sources, &mut config).unwrap();

        assert_eq!(config.array_config("my_array").unwrap().base_addr, 8192);
        let _ = std::fs::remove_file(&path);
    }
}
