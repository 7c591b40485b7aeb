use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;

use arrow_array::{Int64Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema};
use parquet::arrow::ArrowWriter;
use tracing::debug;

use crate::common::error::Result;
use crate::domain::{CleanRecord, QuarantinedRecord};

/// Overwrite the quarantine export: one row per failing input occurrence,
/// provenance and reason included, so every rejected record can be inspected.
pub fn write_quarantine_csv(path: &Path, quarantined: &[QuarantinedRecord]) -> Result<()> {
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([
        "survey_id",
        "date",
        "overall_satisfaction",
        "service_used",
        "comments",
        "source_file",
        "ingest_ts",
        "reason",
    ])?;
    for item in quarantined {
        let record = &item.record;
        let ingest_ts = record.ingest_ts.to_rfc3339();
        writer.write_record([
            record.survey_id.as_deref().unwrap_or(""),
            record.date.as_deref().unwrap_or(""),
            record.overall_satisfaction.as_deref().unwrap_or(""),
            record.service_used.as_deref().unwrap_or(""),
            record.comments.as_deref().unwrap_or(""),
            record.source_file.as_str(),
            ingest_ts.as_str(),
            item.reason.as_str(),
        ])?;
    }
    writer.flush()?;
    debug!("wrote {} quarantined rows to {}", quarantined.len(), path.display());
    Ok(())
}

/// Arrow schema of the clean export: business columns only, no provenance.
/// This file is the Reporter's sole input.
fn clean_export_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("survey_id", DataType::Utf8, false),
        Field::new("date", DataType::Utf8, false),
        Field::new("overall_satisfaction", DataType::Int64, true),
        Field::new("service_used", DataType::Utf8, true),
        Field::new("comments", DataType::Utf8, true),
    ]))
}

/// Fully rewrite the clean-layer Parquet export from the in-memory
/// deduplicated set. Written even when empty, so a run over an emptied
/// drops directory cannot leave a stale export behind.
pub fn write_clean_parquet(path: &Path, clean: &[CleanRecord]) -> Result<()> {
    ensure_parent(path)?;

    let schema = clean_export_schema();
    let survey_ids =
        StringArray::from_iter_values(clean.iter().map(|r| r.survey_id.as_str()));
    let dates = StringArray::from_iter_values(clean.iter().map(|r| r.date.to_string()));
    let satisfactions = Int64Array::from(
        clean
            .iter()
            .map(|r| r.overall_satisfaction)
            .collect::<Vec<_>>(),
    );
    let services = StringArray::from(
        clean
            .iter()
            .map(|r| r.service_used.as_deref())
            .collect::<Vec<_>>(),
    );
    let comments = StringArray::from(
        clean
            .iter()
            .map(|r| r.comments.as_deref())
            .collect::<Vec<_>>(),
    );

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(survey_ids),
            Arc::new(dates),
            Arc::new(satisfactions),
            Arc::new(services),
            Arc::new(comments),
        ],
    )?;

    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    debug!("wrote {} clean rows to {}", clean.len(), path.display());
    Ok(())
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}
