//! `Microop`: the single tagged enum naming every abstract operation an
//! `ExecNode` can perform. The original C++ used a polymorphism-free
//! `uint8_t` opcode with free predicate functions; we keep that shape (no
//! subclass hierarchy, see design notes) but as a real enum with methods.

/// The abstract operation an `ExecNode` performs. Mirrors the microop
/// enumeration in the glossary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Microop {
    Move,
    Load,
    Store,
    /// An elided store (see `RepeatedStoreRemoval`).
    SilentStore,
    GetElementPtr,
    /// Strength-reduced inductive add.
    IndexAdd,
    /// Strength-reduced inductive multiply.
    Shl,

    Add,
    FAdd,
    Sub,
    FSub,
    Mul,
    FMul,
    UDiv,
    SDiv,
    FDiv,
    URem,
    SRem,
    FRem,
    LShr,
    AShr,
    And,
    Or,
    Xor,

    Phi,
    Br,
    Switch,
    Call,
    Ret,

    Trunc,
    ZExt,
    SExt,
    FPToUI,
    FPToSI,
    UIToFP,
    SIToFP,
    FPTrunc,
    FPExt,
    PtrToInt,
    IntToPtr,
    BitCast,
    AddrSpaceCast,

    DmaLoad,
    DmaStore,
    DmaFence,

    /// Stack/array allocation. Not named in the semantically-distinct set in
    /// the glossary (it carries no scheduling weight of its own) but the
    /// DDDG builder needs to recognize it to record an array's base address
    /// from its result record (spec §4.1).
    Alloca,
}

impl Microop {
    pub fn is_memory_op(self) -> bool {
        matches!(self, Microop::Load | Microop::Store | Microop::SilentStore)
    }

    pub fn is_alloca_op(self) -> bool {
        matches!(self, Microop::Alloca)
    }

    pub fn is_load_op(self) -> bool {
        matches!(self, Microop::Load)
    }

    pub fn is_store_op(self) -> bool {
        matches!(self, Microop::Store | Microop::SilentStore)
    }

    pub fn is_dma_load(self) -> bool {
        matches!(self, Microop::DmaLoad)
    }

    pub fn is_dma_store(self) -> bool {
        matches!(self, Microop::DmaStore)
    }

    pub fn is_dma_op(self) -> bool {
        self.is_dma_load() || self.is_dma_store() || matches!(self, Microop::DmaFence)
    }

    pub fn is_call_op(self) -> bool {
        matches!(self, Microop::Call) || self.is_dma_op()
    }

    pub fn is_branch_op(self) -> bool {
        matches!(self, Microop::Br | Microop::Switch) || self.is_call_op()
    }

    pub fn is_control_op(self) -> bool {
        matches!(self, Microop::Phi) || self.is_branch_op()
    }

    pub fn is_index_op(self) -> bool {
        matches!(self, Microop::IndexAdd)
    }

    pub fn is_convert_op(self) -> bool {
        matches!(
            self,
            Microop::Trunc
                | Microop::ZExt
                | Microop::SExt
                | Microop::FPToUI
                | Microop::FPToSI
                | Microop::UIToFP
                | Microop::SIToFP
                | Microop::FPTrunc
                | Microop::FPExt
                | Microop::PtrToInt
                | Microop::IntToPtr
                | Microop::BitCast
                | Microop::AddrSpaceCast
        )
    }

    pub fn is_fp_op(self) -> bool {
        matches!(
            self,
            Microop::FAdd | Microop::FSub | Microop::FMul | Microop::FDiv | Microop::FRem
        )
    }

    pub fn is_shifter_op(self) -> bool {
        matches!(self, Microop::Shl | Microop::LShr | Microop::AShr)
    }

    pub fn is_bit_op(self) -> bool {
        matches!(self, Microop::And | Microop::Or | Microop::Xor)
    }

    pub fn is_add_op(self) -> bool {
        matches!(self, Microop::Add | Microop::FAdd | Microop::Sub | Microop::FSub)
    }

    pub fn is_mul_op(self) -> bool {
        matches!(
            self,
            Microop::Mul
                | Microop::UDiv
                | Microop::SDiv
                | Microop::FMul
                | Microop::FDiv
                | Microop::URem
                | Microop::SRem
                | Microop::FRem
        )
    }

    pub fn is_compute_op(self) -> bool {
        matches!(
            self,
            Microop::Add
                | Microop::FAdd
                | Microop::Sub
                | Microop::FSub
                | Microop::Mul
                | Microop::FMul
                | Microop::UDiv
                | Microop::SDiv
                | Microop::FDiv
                | Microop::URem
                | Microop::SRem
                | Microop::FRem
                | Microop::Shl
                | Microop::LShr
                | Microop::AShr
                | Microop::And
                | Microop::Or
                | Microop::Xor
                | Microop::IndexAdd
        )
    }

    /// Operations associative enough for tree-height reduction to reorder.
    /// The original only treats integer `Add` as associative; kept narrow
    /// rather than widened to `FAdd`/`Mul` because floating point addition
    /// is not associative and the original never reorders it.
    pub fn is_associative(self) -> bool {
        matches!(self, Microop::Add)
    }

    /// True for ops the scheduler completes within the same cycle they
    /// start (zero added FU latency): SSA plumbing and strength-reduced
    /// induction arithmetic.
    pub fn is_fu_zero_latency(self) -> bool {
        matches!(
            self,
            Microop::Move | Microop::IndexAdd | Microop::Shl | Microop::Phi
        ) || self.is_convert_op()
    }

    /// Decode the small integer tag an instruction header record carries
    /// (spec §6.1, field `microop`). The trace is produced by our own
    /// instrumentation, so this ordinal table is this crate's own contract,
    /// not a reproduction of the reference's internal LLVM opcode numbering.
    pub fn from_trace_code(code: u32) -> Option<Microop> {
        use Microop::*;
        const TABLE: &[Microop] = &[
            Move, Load, Store, SilentStore, GetElementPtr, IndexAdd, Shl, Add, FAdd, Sub, FSub,
            Mul, FMul, UDiv, SDiv, FDiv, URem, SRem, FRem, LShr, AShr, And, Or, Xor, Phi, Br,
            Switch, Call, Ret, Trunc, ZExt, SExt, FPToUI, FPToSI, UIToFP, SIToFP, FPTrunc, FPExt,
            PtrToInt, IntToPtr, BitCast, AddrSpaceCast, DmaLoad, DmaStore, DmaFence, Alloca,
        ];
        TABLE.get(code as usize).copied()
    }

    pub fn to_trace_code(self) -> u32 {
        // Inverse of `from_trace_code`; a linear scan is fine, this runs
        // only in tests and in the (rarely used) trace-writing direction.
        (0..).find(|&c| Microop::from_trace_code(c) == Some(self)).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dma_ops_are_call_ops_and_branch_ops() {
        assert!(Microop::DmaLoad.is_call_op());
        assert!(Microop::DmaLoad.is_branch_op());
    }

    #[test]
    fn only_integer_add_is_associative() {
        assert!(Microop::Add.is_associative());
        assert!(!Microop::FAdd.is_associative());
        assert!(!Microop::Mul.is_associative());
    }

    #[test]
    fn phi_and_converts_are_zero_latency() {
        assert!(Microop::Phi.is_fu_zero_latency());
        assert!(Microop::BitCast.is_fu_zero_latency());
        assert!(!Microop::FAdd.is_fu_zero_latency());
    }

    #[test]
    fn trace_code_round_trips() {
        for code in 0..45u32 {
            let op = Microop::from_trace_code(code).unwrap();
            assert_eq!(op.to_trace_code(), code);
        }
        assert!(Microop::from_trace_code(999).is_none());
    }
}
