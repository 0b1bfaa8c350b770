//! Aladdin: a pre-RTL power/performance/area estimator for fixed-function
//! accelerators.
//!
//! Ingests a dynamic execution trace and a user configuration, builds a
//! dynamic data dependence graph, applies a fixed sequence of hardware-
//! oriented graph optimizations, schedules the result under resource and
//! memory-port constraints, and reports cycle count, functional-unit/memory
//! activity, area, and power. [`run`] drives the whole pipeline end to end;
//! the individual stages (`builder`, `passes`, `scheduler`, `loop_info`,
//! `report`) are public so a caller can stop short, inspect, or swap in its
//! own config/power model.

pub mod builder;
pub mod config;
pub mod error;
pub mod graph;
pub mod loop_info;
pub mod microop;
pub mod node;
pub mod passes;
pub mod program;
pub mod progress;
pub mod report;
pub mod resource;
pub mod scheduler;
pub mod source;
pub mod trace;

use std::path::Path;

use config::UserConfig;
use error::{AladdinError, OverlappingRangesWarning};
use loop_info::LoopInfo;
use passes::PassPipeline;
use program::Program;
use report::{write_report, BuiltinPowerAreaModel, FsReportWriter, PowerAreaModel, ReportInputs, ReportWriter};
use scheduler::{ScheduleResult, Scheduler};
use source::SourceManager;
use trace::reader::TraceReader;

/// Everything produced by running a trace+config through the full pipeline,
/// short of writing the output artifacts.
pub struct AnalysisResult {
    pub program: Program,
    pub sources: SourceManager,
    pub config: UserConfig,
    pub schedule: ScheduleResult,
    pub loop_info: LoopInfo,
    pub overlapping_ranges: Vec<OverlappingRangesWarning>,
}

/// Run the full pipeline: parse the trace into a DDDG, run the fixed
/// optimization pass sequence, schedule, and build the loop tree. Does not
/// write any output artifacts; call [`write_artifacts`] (or write your own
/// via [`report::write_report`]) with the result.
pub fn analyze(trace_path: impl AsRef<Path>, config_text: &str) -> Result<AnalysisResult, AladdinError> {
    let mut sources = SourceManager::new();
    let mut config = config::parse_config(config_text, |function, label| {
        let function_id = sources.intern_function(function);
        let label_id = sources.intern_label(label);
        source::UniqueLabel { function_id, label_id }
    })?;
    let overlapping_ranges = config.check_overlapping_ranges();

    let mut trace = TraceReader::open(trace_path)?;
    let mut program = builder::build(&mut trace, &mut sources, &mut config)?;

    let pipeline = PassPipeline::new(&config)?;
    pipeline.run_all(&mut program, &config, &sources);

    let schedule = Scheduler::run(&mut program, &config);

    let mut loop_info = LoopInfo::new();
    loop_info.build_loop_tree(&program);
    loop_info.upsample_loops(&program);

    Ok(AnalysisResult {
        program,
        sources,
        config,
        schedule,
        loop_info,
        overlapping_ranges,
    })
}

/// Run [`analyze`] and write every output artifact from spec §6.3 to
/// `output_dir`, named after `benchmark_name`, using the built-in power/area
/// model.
pub fn run(
    trace_path: impl AsRef<Path>,
    config_text: &str,
    output_dir: impl AsRef<Path>,
    benchmark_name: &str,
) -> anyhow::Result<AnalysisResult> {
    run_with_model(trace_path, config_text, output_dir, benchmark_name, &BuiltinPowerAreaModel)
}

/// Same as [`run`], but with a caller-supplied [`PowerAreaModel`] in place
/// of the built-in fixed-constant table.
pub fn run_with_model(
    trace_path: impl AsRef<Path>,
    config_text: &str,
    output_dir: impl AsRef<Path>,
    benchmark_name: &str,
    model: &dyn PowerAreaModel,
) -> anyhow::Result<AnalysisResult> {
    let result = analyze(trace_path, config_text)?;
    let mut writer = FsReportWriter::new(output_dir.as_ref(), benchmark_name);
    write_artifacts(&mut writer, &result, model)?;
    Ok(result)
}

/// Render every output artifact for an already-computed [`AnalysisResult`]
/// into `writer`.
pub fn write_artifacts(
    writer: &mut dyn ReportWriter,
    result: &AnalysisResult,
    model: &dyn PowerAreaModel,
) -> std::io::Result<()> {
    let inputs = ReportInputs {
        program: &result.program,
        config: &result.config,
        schedule: &result.schedule,
        loop_info: &result.loop_info,
    };
    write_report(writer, &inputs, model)
}
