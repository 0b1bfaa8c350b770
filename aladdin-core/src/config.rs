//! User configuration: the hardware design knobs (loop unrolling, loop
//! pipelining, array partitioning, clock period) described in spec §6.2.
//!
//! The directive file is a bespoke, whitespace/comma grammar, not a fit for
//! `serde`— the same judgment call the teacher repo makes for its own
//! hand-rolled DOL/linker-script parsers.

use std::collections::{HashMap, HashSet};

use crate::error::AladdinError;
use crate::source::UniqueLabel;

/// How an array is mapped to the accelerator and how it can be accessed via
/// the host, per spec §6.3's `MemoryType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryKind {
    Scratchpad,
    Register,
    Dma,
    Acp,
    Cache,
    Host,
}

/// How a scratchpad array is partitioned across banks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionKind {
    Block,
    Cyclic,
    /// Fully partitioned: one word per bank, i.e. a register file.
    Complete,
    /// Not partitioned (caches have no partition scheme).
    None,
}

#[derive(Debug, Clone)]
pub struct PartitionEntry {
    pub memory_kind: MemoryKind,
    pub partition_kind: PartitionKind,
    pub array_size_bytes: u64,
    pub wordsize_bytes: u32,
    pub factor: u32,
    pub base_addr: u64,
}

/// The parsed configuration file plus cumulative runtime-derived state
/// (array base addresses, filled in as the trace's alloca records are
/// processed).
#[derive(Debug, Clone, Default)]
pub struct UserConfig {
    pub unrolling: HashMap<UniqueLabel, u32>,
    pub pipeline: HashSet<UniqueLabel>,
    pub flatten: HashSet<UniqueLabel>,
    pub partition: HashMap<String, PartitionEntry>,

    pub cycle_time_ns: f32,
    pub ready_mode: bool,
    pub scratchpad_ports: u32,
    pub global_pipelining: bool,
}

impl UserConfig {
    pub fn new() -> Self {
        UserConfig {
            cycle_time_ns: 1.0,
            scratchpad_ports: 1,
            ..Default::default()
        }
    }

    pub fn array_config(&self, array: &str) -> Result<&PartitionEntry, AladdinError> {
        self.partition
            .get(array)
            .ok_or_else(|| AladdinError::UnknownArray {
                array: array.to_string(),
            })
    }

    pub fn set_array_base_addr(&mut self, array: &str, base_addr: u64) {
        if let Some(entry) = self.partition.get_mut(array) {
            entry.base_addr = base_addr;
        }
    }

    /// Find the array whose declared [base, base+size) range contains
    /// `addr`, if any.
    pub fn array_containing(&self, addr: u64) -> Option<&str> {
        self.partition
            .iter()
            .find(|(_, entry)| {
                entry.base_addr != 0
                    && addr >= entry.base_addr
                    && addr < entry.base_addr + entry.array_size_bytes
            })
            .map(|(name, _)| name.as_str())
    }

    /// Warn (not fail) about arrays whose declared ranges overlap, per
    /// spec §6.3/§7 ("Overlapping array address ranges at config time
    /// produce a warning but are not fatal").
    pub fn check_overlapping_ranges(&self) -> Vec<crate::error::OverlappingRangesWarning> {
        let mut warnings = Vec::new();
        let arrays: Vec<(&String, &PartitionEntry)> = self
            .partition
            .iter()
            .filter(|(_, e)| e.base_addr != 0)
            .collect();
        for i in 0..arrays.len() {
            for j in (i + 1)..arrays.len() {
                let (name_a, a) = arrays[i];
                let (name_b, b) = arrays[j];
                let a_end = a.base_addr + a.array_size_bytes;
                let b_end = b.base_addr + b.array_size_bytes;
                let disjoint = a_end <= b.base_addr || b_end <= a.base_addr;
                if !disjoint {
                    let warning = crate::error::OverlappingRangesWarning {
                        array_a: name_a.clone(),
                        array_b: name_b.clone(),
                    };
                    log::warn!("{warning}");
                    warnings.push(warning);
                }
            }
        }
        warnings
    }
}

/// Parse a configuration file (one directive per line; blank lines and `#`
/// comments ignored) into a `UserConfig`.
///
/// `resolve_label` maps a `(function, label)` pair from the config text into
/// a `UniqueLabel`, since the source entities it refers to must already be
/// (or will be) interned in the run's `SourceManager`.
pub fn parse_config(
    text: &str,
    mut resolve_label: impl FnMut(&str, &str) -> UniqueLabel,
) -> Result<UserConfig, AladdinError> {
    let mut config = UserConfig::new();

    for (line_no, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut fields = line.split(',').map(str::trim);
        let directive = fields.next().unwrap_or("");

        match directive {
            "flatten" => {
                let (func, label) = (next_field(&mut fields, line_no)?, next_field(&mut fields, line_no)?);
                config.flatten.insert(resolve_label(func, label));
            }
            "unrolling" => {
                let func = next_field(&mut fields, line_no)?;
                let label = next_field(&mut fields, line_no)?;
                let factor: u32 = parse_field(&mut fields, line_no)?;
                config.unrolling.insert(resolve_label(func, label), factor);
            }
            "pipeline" => {
                let func = next_field(&mut fields, line_no)?;
                let label = next_field(&mut fields, line_no)?;
                config.pipeline.insert(resolve_label(func, label));
            }
            "pipelining" => {
                let on: u32 = parse_field(&mut fields, line_no)?;
                config.global_pipelining = on != 0;
            }
            "partition" => {
                parse_partition_directive(&mut fields, line_no, &mut config)?;
            }
            "cache" => {
                let array = next_field(&mut fields, line_no)?.to_string();
                let size: u64 = parse_field(&mut fields, line_no)?;
                config.partition.insert(
                    array,
                    PartitionEntry {
                        memory_kind: MemoryKind::Cache,
                        partition_kind: PartitionKind::None,
                        array_size_bytes: size,
                        wordsize_bytes: 0,
                        factor: 0,
                        base_addr: 0,
                    },
                );
            }
            "cycle_time" => {
                config.cycle_time_ns = parse_field(&mut fields, line_no)?;
            }
            "ready_mode" => {
                let on: u32 = parse_field(&mut fields, line_no)?;
                config.ready_mode = on != 0;
            }
            "scratchpad_ports" => {
                config.scratchpad_ports = parse_field(&mut fields, line_no)?;
            }
            other => {
                return Err(AladdinError::MissingConfigDirective {
                    line: line_no + 1,
                    text: other.to_string(),
                });
            }
        }
    }

    Ok(config)
}

fn parse_partition_directive<'a>(
    fields: &mut impl Iterator<Item = &'a str>,
    line_no: usize,
    config: &mut UserConfig,
) -> Result<(), AladdinError> {
    let first = next_field(fields, line_no)?;
    if first == "complete" {
        let array = next_field(fields, line_no)?.to_string();
        let size: u64 = parse_field(fields, line_no)?;
        config.partition.insert(
            array,
            PartitionEntry {
                memory_kind: MemoryKind::Register,
                partition_kind: PartitionKind::Complete,
                array_size_bytes: size,
                wordsize_bytes: 0,
                factor: 0,
                base_addr: 0,
            },
        );
        return Ok(());
    }

    let partition_kind = match first {
        "cyclic" => PartitionKind::Cyclic,
        "block" => PartitionKind::Block,
        _ => {
            return Err(AladdinError::MissingConfigDirective {
                line: line_no + 1,
                text: format!("partition,{first}"),
            })
        }
    };
    let array = next_field(fields, line_no)?.to_string();
    let size: u64 = parse_field(fields, line_no)?;
    let wordsize: u32 = parse_field(fields, line_no)?;
    let factor: u32 = parse_field(fields, line_no)?;
    config.partition.insert(
        array,
        PartitionEntry {
            memory_kind: MemoryKind::Scratchpad,
            partition_kind,
            array_size_bytes: size,
            wordsize_bytes: wordsize,
            factor,
            base_addr: 0,
        },
    );
    Ok(())
}

fn next_field<'a>(
    fields: &mut impl Iterator<Item = &'a str>,
    line_no: usize,
) -> Result<&'a str, AladdinError> {
    fields.next().ok_or_else(|| AladdinError::MissingConfigDirective {
        line: line_no + 1,
        text: "missing field".to_string(),
    })
}

fn parse_field<'a, T: std::str::FromStr>(
    fields: &mut impl Iterator<Item = &'a str>,
    line_no: usize,
) -> Result<T, AladdinError> {
    let raw = next_field(fields, line_no)?;
    raw.parse().map_err(|_| AladdinError::MissingConfigDirective {
        line: line_no + 1,
        text: format!("invalid value `{raw}`"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver(func_id: u32) -> impl FnMut(&str, &str) -> UniqueLabel {
        move |_f, _l| UniqueLabel {
            function_id: func_id,
            label_id: 0,
        }
    }

    #[test]
    fn parses_all_directives() {
        let text = "\
unrolling,foo,loop1,4
pipeline,foo,loop1
pipelining,0
partition,cyclic,a,1024,4,2
partition,complete,result,64
cache,big_array,4096
cycle_time,1.5
ready_mode,1
scratchpad_ports,2
";
        let config = parse_config(text, resolver(0)).unwrap();
        assert_eq!(config.unrolling.len(), 1);
        assert_eq!(config.pipeline.len(), 1);
        assert!(!config.global_pipelining);
        assert_eq!(config.partition.len(), 3);
        assert_eq!(config.partition["a"].factor, 2);
        assert_eq!(config.partition["result"].partition_kind, PartitionKind::Complete);
        assert!((config.cycle_time_ns - 1.5).abs() < f32::EPSILON);
        assert!(config.ready_mode);
        assert_eq!(config.scratchpad_ports, 2);
    }

    #[test]
    fn unknown_directive_is_fatal() {
        let err = parse_config("bogus,1,2\n", resolver(0)).unwrap_err();
        assert!(matches!(err, AladdinError::MissingConfigDirective { line: 1, .. }));
    }

    #[test]
    fn overlapping_ranges_warn_not_fail() {
        let mut config = UserConfig::new();
        config.partition.insert(
            "a".into(),
            PartitionEntry {
                memory_kind: MemoryKind::Scratchpad,
                partition_kind: PartitionKind::Block,
                array_size_bytes: 100,
                wordsize_bytes: 4,
                factor: 1,
                base_addr: 0x1000,
            },
        );
        config.partition.insert(
            "b".into(),
            PartitionEntry {
                memory_kind: MemoryKind::Scratchpad,
                partition_kind: PartitionKind::Block,
                array_size_bytes: 100,
                wordsize_bytes: 4,
                factor: 1,
                base_addr: 0x1050,
            },
        );
        let warnings = config.check_overlapping_ranges();
        assert_eq!(warnings.len(), 1);
    }
}
