//! Line-level parsing of the dynamic trace format (spec §6.1): a record
//! grammar of comma-separated fields, tagged by the first field.
//!
//! This module only turns text lines into typed [`Line`] values; stitching
//! those into a [`crate::program::Program`] is the DDDG builder's job.

pub mod reader;

use crate::error::AladdinError;
use crate::microop::Microop;

/// A parsed parameter/result/forward field value. Per spec §6.1, a value
/// string containing `.` is a float; everything else is an integer
/// (addresses are decimal, masked to the lower 48 bits by the caller).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Integer(u64),
    Float(f64),
}

impl Value {
    fn parse(raw: &str) -> Value {
        if raw.contains('.') {
            Value::Float(raw.parse().unwrap_or(0.0))
        } else {
            Value::Integer(raw.parse().unwrap_or(0))
        }
    }

    /// The lower 48 bits, for use as a byte address. Meaningless (but
    /// harmless) on a `Float` value — callers only call this on fields the
    /// record shape guarantees are addresses.
    pub fn as_address(self) -> u64 {
        match self {
            Value::Integer(v) => v & 0x0000_FFFF_FFFF_FFFF,
            Value::Float(v) => v as u64 & 0x0000_FFFF_FFFF_FFFF,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, Value::Float(_))
    }
}

/// One parameter, result, or forward record's shared field shape.
#[derive(Debug, Clone, PartialEq)]
pub struct OperandRecord {
    pub size_bits: u32,
    pub value: Value,
    pub is_register: bool,
    pub label: String,
    /// Present only on parameter records belonging to a PHI instruction:
    /// the predecessor basic block the value arrived from.
    pub prev_bbid_if_phi: Option<String>,
}

/// One line of the trace body, or a labelmap preamble line.
#[derive(Debug, Clone, PartialEq)]
pub enum Line {
    LabelMapStart,
    LabelMapEnd,
    /// `function/label line_number`, only valid inside the labelmap
    /// preamble.
    LabelMapEntry {
        function: String,
        label: String,
        line_number: u32,
    },
    /// Tag `0`: instruction header.
    Instruction {
        line_num: i32,
        function: String,
        basic_block_id: String,
        instruction_id: String,
        microop: Microop,
        dynamic_inst_count: u64,
    },
    /// Tags `1..N`: the Nth parameter of the instruction currently being
    /// built.
    Parameter { index: u32, record: OperandRecord },
    /// Tag `r`: the instruction's result.
    Result(OperandRecord),
    /// Tag `f`: a forwarded caller-side register id.
    Forward(OperandRecord),
}

const LABEL_MAP_START: &str = "%%%% LABEL MAP START %%%%";
const LABEL_MAP_END: &str = "%%%% LABEL MAP END %%%%";

/// Parse one non-empty trace line. `record_index` is used only to annotate
/// decode errors.
pub fn parse_line(raw: &str, record_index: u64) -> Result<Line, AladdinError> {
    let line = raw.trim_end_matches(['\r', '\n']);

    if line == LABEL_MAP_START {
        return Ok(Line::LabelMapStart);
    }
    if line == LABEL_MAP_END {
        return Ok(Line::LabelMapEnd);
    }

    let mut fields = line.split(',');
    let tag = fields.next().ok_or_else(|| decode_err(record_index, "empty record"))?;

    match tag {
        "0" => {
            let line_num: i32 = next(&mut fields, record_index)?
                .parse()
                .map_err(|_| decode_err(record_index, "bad line_num"))?;
            let function = next(&mut fields, record_index)?.to_string();
            let basic_block_id = next(&mut fields, record_index)?.to_string();
            let instruction_id = next(&mut fields, record_index)?.to_string();
            let microop_code: u32 = next(&mut fields, record_index)?
                .parse()
                .map_err(|_| decode_err(record_index, "bad microop code"))?;
            let microop = Microop::from_trace_code(microop_code)
                .ok_or_else(|| decode_err(record_index, "unrecognized microop code"))?;
            let dynamic_inst_count: u64 = next(&mut fields, record_index)?
                .parse()
                .map_err(|_| decode_err(record_index, "bad dynamic_inst_count"))?;
            Ok(Line::Instruction {
                line_num,
                function,
                basic_block_id,
                instruction_id,
                microop,
                dynamic_inst_count,
            })
        }
        "r" => Ok(Line::Result(parse_operand(&mut fields, record_index)?)),
        "f" => Ok(Line::Forward(parse_operand(&mut fields, record_index)?)),
        digits if digits.chars().all(|c| c.is_ascii_digit()) => {
            let index: u32 = digits
                .parse()
                .map_err(|_| decode_err(record_index, "bad parameter index"))?;
            Ok(Line::Parameter {
                index,
                record: parse_operand(&mut fields, record_index)?,
            })
        }
        other => Err(decode_err(record_index, &format!("unknown record tag `{other}`"))),
    }
}

/// Parse `function/label line_number`, valid only between the labelmap
/// markers.
pub fn parse_labelmap_entry(raw: &str, record_index: u64) -> Result<Line, AladdinError> {
    let line = raw.trim();
    let (path, line_number_str) = line
        .rsplit_once(' ')
        .ok_or_else(|| decode_err(record_index, "malformed labelmap entry"))?;
    let (function, label) = path
        .split_once('/')
        .ok_or_else(|| decode_err(record_index, "malformed labelmap entry"))?;
    let line_number: u32 = line_number_str
        .parse()
        .map_err(|_| decode_err(record_index, "bad labelmap line number"))?;
    Ok(Line::LabelMapEntry {
        function: function.to_string(),
        label: label.to_string(),
        line_number,
    })
}

fn parse_operand<'a>(
    fields: &mut impl Iterator<Item = &'a str>,
    record_index: u64,
) -> Result<OperandRecord, AladdinError> {
    let size_bits: u32 = next(fields, record_index)?
        .parse()
        .map_err(|_| decode_err(record_index, "bad size_bits"))?;
    let value = Value::parse(next(fields, record_index)?);
    let is_register: bool = next(fields, record_index)? != "0";
    let label = next(fields, record_index)?.to_string();
    let prev_bbid_if_phi = fields.next().map(str::to_string).filter(|s| !s.is_empty());
    Ok(OperandRecord {
        size_bits,
        value,
        is_register,
        label,
        prev_bbid_if_phi,
    })
}

fn next<'a>(
    fields: &mut impl Iterator<Item = &'a str>,
    record_index: u64,
) -> Result<&'a str, AladdinError> {
    fields.next().ok_or_else(|| decode_err(record_index, "record has too few fields"))
}

fn decode_err(record_index: u64, reason: &str) -> AladdinError {
    AladdinError::TraceDecode {
        record_index,
        reason: reason.to_string(),
    }
}
