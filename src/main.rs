use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use survey_ingest::config::PipelineConfig;
use survey_ingest::observability::logging::init_logging;
use survey_ingest::pipeline;

#[derive(Parser)]
#[command(name = "survey-ingest")]
#[command(about = "Survey drops pipeline: clean, validate, dedupe and persist into a layered store")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline over the drops directory
    Run {
        /// Directory the spreadsheet drops land in
        #[arg(long, default_value = "data/drops")]
        drops_dir: PathBuf,
        /// Directory for all persisted artifacts
        #[arg(long, default_value = "output")]
        output_dir: PathBuf,
        /// SQLite store location (defaults to <output-dir>/surveys.db)
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
    /// Re-render the report from the persisted clean export
    Report {
        /// Directory the previous run wrote its artifacts to
        #[arg(long, default_value = "output")]
        output_dir: PathBuf,
        /// SQLite store location (defaults to <output-dir>/surveys.db)
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load environment variables
    dotenv::dotenv().ok();

    match cli.command {
        Commands::Run {
            drops_dir,
            output_dir,
            db_path,
        } => {
            let config = PipelineConfig::new(drops_dir, output_dir, db_path);
            init_logging(&config.logs_dir());
            let summary = pipeline::run(&config).context("pipeline run failed")?;
            println!(
                "✅ Run {} complete: {} raw, {} clean, {} quarantined ({} files skipped)",
                summary.batch_id,
                summary.raw_rows,
                summary.clean_rows,
                summary.quarantined_rows,
                summary.skipped_files
            );
            println!("📄 Report: {}", summary.report_path.display());
        }
        Commands::Report { output_dir, db_path } => {
            let config = PipelineConfig::for_output_dir(&output_dir, db_path);
            init_logging(&config.logs_dir());
            let path = pipeline::rerender_report(&config).context("report rendering failed")?;
            println!("📄 Report: {}", path.display());
        }
    }

    Ok(())
}
