//! Static source entities and their interning, plus the dynamic
//! (invocation-qualified) references built on top of them.
//!
//! Source entities (`Function`, `Variable`, `Instruction`, `Label`,
//! `BasicBlock`) are interned once and never mutated except for a function's
//! invocation counter, which is bumped every time a `Call` record for that
//! function is seen during trace parsing. Each entity type gets its own id
//! space inside `SourceManager`, matching the original's "hash the name with
//! a type prefix" scheme (`F_`, `V_`, `I_`, `L_`) so a function and a
//! variable that happen to share a source name never collide.

use std::collections::HashMap;

/// Id type shared by every interned entity. Unique within its own type, not
/// across types.
pub type SrcId = u32;

/// Never a valid id; used as a sentinel the way the original uses `-1`.
pub const INVALID_ID: SrcId = SrcId::MAX;

/// A function definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub name: String,
    invocations: u64,
}

impl Function {
    pub fn invocations(&self) -> u64 {
        self.invocations
    }

    pub(crate) fn increment_invocations(&mut self) {
        self.invocations += 1;
    }
}

/// A register or array name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
}

/// A static instruction specifier, as emitted by the instrumenting compiler
/// pass. `inductive` is true if the instruction's LLVM name contains the
/// induction-variable marker (`indvars`), matching the original's
/// substring check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub name: String,
    pub inductive: bool,
}

/// The label of a labeled statement (usually a loop header).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub name: String,
}

/// A basic block name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicBlock {
    pub name: String,
}

/// A label scoped to the function it appears in. Used as the user-facing
/// identifier for loops in configuration directives (`unrolling`, `pipeline`,
/// `flatten`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct UniqueLabel {
    pub function_id: SrcId,
    pub label_id: SrcId,
}

/// A `UniqueLabel` additionally scoped to a source line number and a dynamic
/// function invocation, used when resolving sampled loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DynamicLabel {
    pub unique_label: UniqueLabel,
    pub line_number: u32,
    pub dyn_func: DynamicFunction,
}

/// A specific invocation of a function: pairs a function id with an
/// iteration counter captured at the time the invocation began.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DynamicFunction {
    pub function_id: SrcId,
    pub iteration: u64,
}

/// A dynamic reference to a variable: the identity of a register value (or
/// array name) at one particular function invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DynamicVariable {
    pub dyn_func: DynamicFunction,
    pub variable_id: SrcId,
}

/// A dynamic reference to an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DynamicInstruction {
    pub dyn_func: DynamicFunction,
    pub instruction_id: SrcId,
}

/// Per-type interning table: a name <-> id bijection plus entity storage.
#[derive(Debug, Default)]
struct InternTable<T> {
    by_name: HashMap<String, SrcId>,
    entities: Vec<T>,
}

impl<T> InternTable<T> {
    fn get_or_insert_with(&mut self, name: &str, make: impl FnOnce() -> T) -> SrcId {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let id = self.entities.len() as SrcId;
        self.entities.push(make());
        self.by_name.insert(name.to_string(), id);
        id
    }

    fn get(&self, id: SrcId) -> &T {
        &self.entities[id as usize]
    }

    fn get_mut(&mut self, id: SrcId) -> &mut T {
        &mut self.entities[id as usize]
    }

    fn lookup(&self, name: &str) -> Option<SrcId> {
        self.by_name.get(name).copied()
    }
}

/// Owns every interned source entity for one run. Read-mostly after trace
/// parsing completes; never concurrently mutated (see spec §5).
#[derive(Debug, Default)]
pub struct SourceManager {
    functions: InternTable<Function>,
    variables: InternTable<Variable>,
    instructions: InternTable<Instruction>,
    labels: InternTable<Label>,
    basic_blocks: InternTable<BasicBlock>,
}

impl SourceManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern_function(&mut self, name: &str) -> SrcId {
        self.functions.get_or_insert_with(name, || Function {
            name: name.to_string(),
            invocations: 0,
        })
    }

    pub fn intern_variable(&mut self, name: &str) -> SrcId {
        self.variables.get_or_insert_with(name, || Variable {
            name: name.to_string(),
        })
    }

    pub fn intern_instruction(&mut self, name: &str) -> SrcId {
        self.instructions.get_or_insert_with(name, || Instruction {
            name: name.to_string(),
            inductive: name.contains("indvars"),
        })
    }

    pub fn intern_label(&mut self, name: &str) -> SrcId {
        self.labels.get_or_insert_with(name, || Label {
            name: name.to_string(),
        })
    }

    pub fn intern_basic_block(&mut self, name: &str) -> SrcId {
        self.basic_blocks.get_or_insert_with(name, || BasicBlock {
            name: name.to_string(),
        })
    }

    pub fn function(&self, id: SrcId) -> &Function {
        self.functions.get(id)
    }

    pub fn function_mut(&mut self, id: SrcId) -> &mut Function {
        self.functions.get_mut(id)
    }

    pub fn variable(&self, id: SrcId) -> &Variable {
        self.variables.get(id)
    }

    pub fn instruction(&self, id: SrcId) -> &Instruction {
        self.instructions.get(id)
    }

    pub fn label(&self, id: SrcId) -> &Label {
        self.labels.get(id)
    }

    pub fn basic_block(&self, id: SrcId) -> &BasicBlock {
        self.basic_blocks.get(id)
    }

    pub fn find_function(&self, name: &str) -> Option<SrcId> {
        self.functions.lookup(name)
    }

    pub fn find_label(&self, name: &str) -> Option<SrcId> {
        self.labels.lookup(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_and_variable_with_same_name_get_distinct_ids() {
        let mut mgr = SourceManager::new();
        let f = mgr.intern_function("foo");
        let v = mgr.intern_variable("foo");
        // Both ids happen to be 0 (separate id spaces), but they index into
        // different tables, so looking each up returns the right entity.
        assert_eq!(mgr.function(f).name, "foo");
        assert_eq!(mgr.variable(v).name, "foo");
    }

    #[test]
    fn interning_is_idempotent() {
        let mut mgr = SourceManager::new();
        let a = mgr.intern_instruction("add.i32.indvars");
        let b = mgr.intern_instruction("add.i32.indvars");
        assert_eq!(a, b);
        assert!(mgr.instruction(a).inductive);
    }

    #[test]
    fn non_inductive_instruction_name() {
        let mut mgr = SourceManager::new();
        let id = mgr.intern_instruction("store.i32");
        assert!(!mgr.instruction(id).inductive);
    }
}
