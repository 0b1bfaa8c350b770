//! Error taxonomy for the Aladdin pipeline.
//!
//! Mirrors the error table in the design doc: loaders fail fast with one of
//! these variants, pass invariant violations are programmer bugs and panic
//! instead of returning `Err`, and scheduler port arbitration never fails (it
//! back-pressures a node to the next cycle rather than erroring).

use thiserror::Error;

/// Errors produced while loading a trace/config or resolving array/memory
/// references during DDDG construction and optimization.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AladdinError {
    /// The trace file could not be found or opened.
    #[error("trace file not found: {0}")]
    MissingTrace(String),

    /// The configuration file referenced a directive keyword we don't know.
    #[error("unknown config directive on line {line}: {text}")]
    MissingConfigDirective { line: usize, text: String },

    /// A memory op referenced an array with no partition entry, and the
    /// address did not fall inside any implicit host mapping.
    #[error("array `{array}` has no partition entry; add a `partition` or `cache` directive for it")]
    UnknownArray { array: String },

    /// `mapArrayToAccelerator` was never called for a host array before it
    /// was dereferenced.
    #[error("virtual address 0x{addr:x} has no host array mapping; call map_array_to_accelerator first")]
    VirtualAddrLookup { addr: u64 },

    /// The accelerator directly dereferenced a host pointer that was never
    /// mapped in.
    #[error("node {node_id} performs an illegal direct host memory access at 0x{addr:x}")]
    IllegalHostMemoryAccess { node_id: u32, addr: u64 },

    /// A simulator-supplied virtual address failed translation.
    #[error("address translation failed for vaddr 0x{vaddr:x}, size {size}")]
    AddressTranslation { vaddr: u64, size: usize },

    /// The trace file was found but could not be decoded (bad gzip stream,
    /// malformed record).
    #[error("failed to decode trace at record {record_index}: {reason}")]
    TraceDecode { record_index: u64, reason: String },

    /// Both global pipelining (`pipelining,1`) and a non-empty per-loop
    /// `pipeline` directive set were supplied. Spec §9's REDESIGN FLAG:
    /// refuse to run both rather than warn and pick one.
    #[error("global pipelining and per-loop pipelining are mutually exclusive; {pipelined_loop_count} loop(s) have a `pipeline` directive while `pipelining,1` is also set")]
    ConflictingPipeliningConfig { pipelined_loop_count: usize },
}

/// Non-fatal conditions that are logged rather than returned as errors.
///
/// `OverlappingRanges` is the only member today: two declared arrays overlap
/// in address space, which is suspicious but not fatal (see spec §6.3 and
/// §7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlappingRangesWarning {
    pub array_a: String,
    pub array_b: String,
}

impl std::fmt::Display for OverlappingRangesWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "arrays `{}` and `{}` have overlapping address ranges",
            self.array_a, self.array_b
        )
    }
}
