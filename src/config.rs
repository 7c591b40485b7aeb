use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Run configuration, built once at startup from the CLI. All persisted
/// artifacts live under `output_dir`; nothing global, nothing mutable.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub drops_dir: PathBuf,
    pub output_dir: PathBuf,
    pub db_path: PathBuf,
}

impl PipelineConfig {
    pub fn new<P: Into<PathBuf>>(drops_dir: P, output_dir: P, db_path: Option<PathBuf>) -> Self {
        let output_dir = output_dir.into();
        let db_path = db_path.unwrap_or_else(|| output_dir.join("surveys.db"));
        Self {
            drops_dir: drops_dir.into(),
            output_dir,
            db_path,
        }
    }

    pub fn parquet_path(&self) -> PathBuf {
        self.output_dir.join("parquet").join("clean_surveys.parquet")
    }

    pub fn quarantine_csv_path(&self) -> PathBuf {
        self.output_dir.join("quality").join("quarantined_surveys.csv")
    }

    pub fn ingestion_report_path(&self) -> PathBuf {
        self.output_dir.join("quality").join("ingestion_report.json")
    }

    pub fn report_path(&self) -> PathBuf {
        self.output_dir.join("report.md")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.output_dir.join("logs")
    }

    /// Create the output tree. The drops directory is deliberately not
    /// created here: an absent drops directory is a valid empty run.
    pub fn ensure_layout(&self) -> io::Result<()> {
        fs::create_dir_all(self.output_dir.join("parquet"))?;
        fs::create_dir_all(self.output_dir.join("quality"))?;
        if let Some(parent) = self.db_path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    /// Convenience for the `report` subcommand, where only the output side
    /// matters.
    pub fn for_output_dir<P: AsRef<Path>>(output_dir: P, db_path: Option<PathBuf>) -> Self {
        let out = output_dir.as_ref().to_path_buf();
        Self::new(out.join("drops"), out, db_path)
    }
}
