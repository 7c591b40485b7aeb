use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::common::error::Result;
use crate::config::PipelineConfig;
use crate::report::{self, ReportContext};
use crate::storage::{write_clean_parquet, write_quarantine_csv, LayerCounts, SurveyStore};

pub mod dedup;
pub mod ingestion;
pub mod normalize;
pub mod reconcile;
pub mod validate;

pub use dedup::dedupe_last_ingested_wins;
pub use ingestion::{ingest_drops, FileOutcome, IngestedBatch};
pub use validate::{validate, Validated};

/// What one pipeline run did, returned to the caller and echoed on the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub batch_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub raw_rows: usize,
    pub clean_rows: usize,
    pub quarantined_rows: usize,
    pub skipped_files: usize,
    pub report_path: PathBuf,
}

/// Per-run ingestion report persisted next to the quarantine export: every
/// candidate file's outcome plus the resulting layer sizes.
#[derive(Debug, Serialize)]
struct IngestionReport<'a> {
    batch_id: Uuid,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    files: &'a [FileOutcome],
    raw_rows: usize,
    clean_rows: usize,
    quarantined_rows: usize,
}

/// Execute the full batch: ingest, reconcile, validate, dedupe, persist the
/// layers, write the exports, render the report. Everything up to persistence
/// happens in memory; the store commits raw/quarantine/clean as one unit
/// before any derived artifact is built. Degraded conditions (missing drops
/// directory, unreadable files, empty data) complete normally; only
/// storage-layer failures surface as errors.
pub fn run(config: &PipelineConfig) -> Result<RunSummary> {
    let started_at = Utc::now();
    let batch_id = Uuid::new_v4();
    config.ensure_layout()?;
    info!("pipeline run {} started, drops: {}", batch_id, config.drops_dir.display());

    // 1) Ingest + reconcile
    let batch = ingest_drops(&config.drops_dir);
    let skipped_files = batch.skipped_files();
    let IngestedBatch { records: raw_records, outcomes } = batch;
    info!(
        "ingestion complete: {} raw rows from {} files ({} skipped)",
        raw_records.len(),
        outcomes.len(),
        skipped_files
    );

    // 2) Validate: every reconciled record lands in exactly one partition.
    let mut clean_candidates = Vec::new();
    let mut quarantined = Vec::new();
    for record in raw_records.iter().cloned() {
        match validate(record) {
            Validated::Clean(clean) => clean_candidates.push(clean),
            Validated::Quarantined(item) => quarantined.push(item),
        }
    }

    // 3) Dedupe the clean set only.
    let clean = dedupe_last_ingested_wins(clean_candidates);
    info!(
        "cleaning complete: {} clean rows, {} quarantined",
        clean.len(),
        quarantined.len()
    );

    // 4) Persist the three layers as one transaction. Fatal on failure.
    let mut store = SurveyStore::open(&config.db_path)?;
    store.persist_run(batch_id, &raw_records, &quarantined, &clean)?;

    // Derived view is best-effort: the committed upserts stand either way.
    if let Err(e) = store.refresh_monthly_view() {
        warn!("monthly rollup view refresh failed, continuing: {}", e);
    }

    // 5) Durable exports, fully rewritten from the in-memory sets.
    write_quarantine_csv(&config.quarantine_csv_path(), &quarantined)?;
    write_clean_parquet(&config.parquet_path(), &clean)?;

    let finished_at = Utc::now();
    let ingestion_report = IngestionReport {
        batch_id,
        started_at,
        finished_at,
        files: &outcomes,
        raw_rows: raw_records.len(),
        clean_rows: clean.len(),
        quarantined_rows: quarantined.len(),
    };
    fs::write(
        config.ingestion_report_path(),
        serde_json::to_vec_pretty(&ingestion_report)?,
    )?;

    // 6) Report, from the Parquet export only.
    let counts = store.layer_counts()?;
    write_report(config, Some(batch_id), counts)?;

    info!("pipeline run {} finished", batch_id);
    Ok(RunSummary {
        batch_id,
        started_at,
        finished_at,
        raw_rows: raw_records.len(),
        clean_rows: clean.len(),
        quarantined_rows: quarantined.len(),
        skipped_files,
        report_path: config.report_path(),
    })
}

/// Re-render the report from the persisted artifacts without re-ingesting.
/// Backs the `report` CLI subcommand.
pub fn rerender_report(config: &PipelineConfig) -> Result<PathBuf> {
    let store = SurveyStore::open(&config.db_path)?;
    let counts = store.layer_counts()?;
    write_report(config, None, counts)
}

fn write_report(
    config: &PipelineConfig,
    batch_id: Option<Uuid>,
    counts: LayerCounts,
) -> Result<PathBuf> {
    let rows = report::read_clean_export(&config.parquet_path())?;
    let aggregates = report::aggregate(&rows);
    let ctx = ReportContext {
        generated_at: Utc::now(),
        batch_id,
        counts,
        db_path: config.db_path.display().to_string(),
        parquet_path: config.parquet_path().display().to_string(),
        quarantine_path: config.quarantine_csv_path().display().to_string(),
    };
    let rendered = report::render_markdown(&aggregates, &ctx);
    let path = config.report_path();
    fs::write(&path, rendered)?;
    info!("report written to {}", path.display());
    Ok(path)
}
