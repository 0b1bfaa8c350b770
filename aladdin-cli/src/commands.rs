// CLI command handlers
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Run the full pipeline for `bench` and write every output artifact from
/// spec §6.3 into `output_dir`.
pub fn run(bench: &str, trace_file: &Path, config_file: &Path, output_dir: &Path) -> Result<()> {
    let config_text = std::fs::read_to_string(config_file)
        .with_context(|| format!("failed to read config file: {}", config_file.display()))?;

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create output directory: {}", output_dir.display()))?;

    let result = aladdin_core::run(trace_file, &config_text, output_dir, bench)
        .with_context(|| format!("pipeline failed for benchmark `{bench}`"))?;

    for warning in &result.overlapping_ranges {
        log::warn!("{warning}");
    }

    println!(
        "{bench}: {} cycles, {} nodes",
        result.schedule.total_cycles,
        result.program.node_count()
    );
    println!("artifacts written to {}", output_dir.display());

    Ok(())
}

/// Run the pipeline without writing artifacts, printing a short summary to
/// stdout. Useful for sanity-checking a trace/config pair before committing
/// to a full run.
pub fn summarize(bench: &str, trace_file: &Path, config_file: &Path) -> Result<()> {
    let config_text = std::fs::read_to_string(config_file)
        .with_context(|| format!("failed to read config file: {}", config_file.display()))?;

    let result = aladdin_core::analyze(trace_file, &config_text)
        .with_context(|| format!("analysis failed for benchmark `{bench}`"))?;

    for warning in &result.overlapping_ranges {
        log::warn!("{warning}");
    }

    println!("{bench}");
    println!("  nodes:           {}", result.program.node_count());
    println!("  cycles:          {}", result.schedule.total_cycles);
    println!("  loop iterations: {}", result.loop_info.iterations.len());

    Ok(())
}

pub fn default_output_dir() -> PathBuf {
    PathBuf::from("aladdin-out")
}
