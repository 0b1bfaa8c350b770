// CLI application
use std::path::PathBuf;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

pub mod commands;

#[derive(Parser)]
#[command(name = "aladdin")]
#[command(about = "Pre-RTL power/performance/area estimator for fixed-function accelerators")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Run the full pipeline and write every output artifact.
    Run {
        /// Benchmark name, used as the prefix for output artifacts.
        bench: String,

        /// Path to the gzip-compressed dynamic trace.
        trace_file: PathBuf,

        /// Path to the configuration directive file.
        config_file: PathBuf,

        /// Directory output artifacts are written into.
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
    /// Run the pipeline without writing artifacts and print a short summary.
    Summarize {
        /// Benchmark name, used only for the printed summary.
        bench: String,

        /// Path to the gzip-compressed dynamic trace.
        trace_file: PathBuf,

        /// Path to the configuration directive file.
        config_file: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            bench,
            trace_file,
            config_file,
            output_dir,
        } => {
            let output_dir = output_dir.unwrap_or_else(commands::default_output_dir);
            let pb = create_progress_bar(&format!("Running {bench}..."));
            commands::run(&bench, &trace_file, &config_file, &output_dir)?;
            pb.finish_with_message("Run complete");
        }
        Commands::Summarize {
            bench,
            trace_file,
            config_file,
        } => {
            let pb = create_progress_bar(&format!("Analyzing {bench}..."));
            commands::summarize(&bench, &trace_file, &config_file)?;
            pb.finish_with_message("Analysis complete");
        }
    }

    Ok(())
}

fn create_progress_bar(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap()
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(message.to_string());
    pb
}
