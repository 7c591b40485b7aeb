use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use arrow_array::{Array, Int64Array, StringArray};
use chrono::{DateTime, NaiveDate, Utc};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use tracing::warn;
use uuid::Uuid;

use crate::common::error::{PipelineError, Result};
use crate::storage::LayerCounts;

/// One clean-layer row as read back from the Parquet export. The Reporter
/// works from this file alone, never from the raw layer, so the report
/// reflects exactly what was persisted as the analytical source of truth.
#[derive(Debug, Clone)]
pub struct ReportRow {
    pub survey_id: String,
    pub date: NaiveDate,
    pub overall_satisfaction: Option<i64>,
}

/// Load the clean export. A missing file reads as an empty clean layer,
/// which the report renders as "no data" rather than failing.
pub fn read_clean_export(path: &Path) -> Result<Vec<ReportRow>> {
    if !path.exists() {
        warn!("clean export {} not found, reporting no data", path.display());
        return Ok(Vec::new());
    }

    let file = File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

    let mut rows = Vec::new();
    for batch in reader {
        let batch = batch?;
        let survey_ids = string_column(&batch, "survey_id")?;
        let dates = string_column(&batch, "date")?;
        let satisfactions = batch
            .column_by_name("overall_satisfaction")
            .and_then(|col| col.as_any().downcast_ref::<Int64Array>())
            .ok_or_else(|| column_error("overall_satisfaction"))?;

        for i in 0..batch.num_rows() {
            let date_text = dates.value(i);
            let date = match NaiveDate::parse_from_str(date_text, "%Y-%m-%d") {
                Ok(date) => date,
                Err(e) => {
                    warn!("clean export row {} has bad date {:?}: {}", i, date_text, e);
                    continue;
                }
            };
            rows.push(ReportRow {
                survey_id: survey_ids.value(i).to_string(),
                date,
                overall_satisfaction: if satisfactions.is_null(i) {
                    None
                } else {
                    Some(satisfactions.value(i))
                },
            });
        }
    }
    Ok(rows)
}

fn string_column<'a>(
    batch: &'a arrow_array::RecordBatch,
    name: &str,
) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|col| col.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| column_error(name))
}

fn column_error(name: &str) -> PipelineError {
    PipelineError::Export {
        message: format!("clean export is missing column '{name}'"),
    }
}

#[derive(Debug, Clone)]
pub struct DistributionRow {
    pub score: i64,
    pub count: usize,
    pub share_pct: f64,
}

#[derive(Debug, Clone)]
pub struct MonthlyRow {
    pub month: String,
    pub surveys: usize,
    pub mean_satisfaction: Option<f64>,
}

/// KPIs and grouped summaries over the clean layer. Nulls count toward the
/// total but are excluded from every mean.
#[derive(Debug, Clone, Default)]
pub struct SurveyAggregates {
    pub total: usize,
    pub mean_satisfaction: Option<f64>,
    pub distribution: Vec<DistributionRow>,
    pub monthly: Vec<MonthlyRow>,
    pub period: Option<(NaiveDate, NaiveDate)>,
}

pub fn aggregate(rows: &[ReportRow]) -> SurveyAggregates {
    let total = rows.len();
    if total == 0 {
        return SurveyAggregates::default();
    }

    let answered: Vec<i64> = rows.iter().filter_map(|r| r.overall_satisfaction).collect();
    let mean_satisfaction = if answered.is_empty() {
        None
    } else {
        Some(answered.iter().sum::<i64>() as f64 / answered.len() as f64)
    };

    let mut score_counts: BTreeMap<i64, usize> = BTreeMap::new();
    for score in &answered {
        *score_counts.entry(*score).or_default() += 1;
    }
    let distribution = score_counts
        .into_iter()
        .map(|(score, count)| DistributionRow {
            score,
            count,
            share_pct: count as f64 / total as f64 * 100.0,
        })
        .collect();

    let mut months: BTreeMap<String, (usize, i64, usize)> = BTreeMap::new();
    for row in rows {
        let bucket = months.entry(row.date.format("%Y-%m").to_string()).or_default();
        bucket.0 += 1;
        if let Some(score) = row.overall_satisfaction {
            bucket.1 += score;
            bucket.2 += 1;
        }
    }
    let monthly = months
        .into_iter()
        .map(|(month, (surveys, sum, answered))| MonthlyRow {
            month,
            surveys,
            mean_satisfaction: if answered == 0 {
                None
            } else {
                Some(sum as f64 / answered as f64)
            },
        })
        .collect();

    let period = rows
        .iter()
        .map(|r| r.date)
        .min()
        .zip(rows.iter().map(|r| r.date).max());

    SurveyAggregates {
        total,
        mean_satisfaction,
        distribution,
        monthly,
        period,
    }
}

/// Run metadata and artifact locations stamped into the report header.
#[derive(Debug, Clone)]
pub struct ReportContext {
    pub generated_at: DateTime<Utc>,
    pub batch_id: Option<Uuid>,
    pub counts: LayerCounts,
    pub db_path: String,
    pub parquet_path: String,
    pub quarantine_path: String,
}

/// Render the Markdown report. Always renderable: an empty clean layer
/// produces zero totals, placeholder tables and an undefined period.
pub fn render_markdown(aggregates: &SurveyAggregates, ctx: &ReportContext) -> String {
    let (period_start, period_end) = match aggregates.period {
        Some((start, end)) => (start.to_string(), end.to_string()),
        None => ("—".to_string(), "—".to_string()),
    };
    let mean = aggregates
        .mean_satisfaction
        .map(|m| format!("{m:.2}"))
        .unwrap_or_else(|| "no data".to_string());
    let batch = ctx
        .batch_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "—".to_string());

    let distribution = if aggregates.distribution.is_empty() {
        "_(no data)_".to_string()
    } else {
        let mut lines = vec![
            "| Score (1-10) | Count | Share (%) |".to_string(),
            "|---:|---:|---:|".to_string(),
        ];
        for row in &aggregates.distribution {
            lines.push(format!("| {} | {} | {:.1} |", row.score, row.count, row.share_pct));
        }
        lines.join("\n")
    };

    let monthly = if aggregates.monthly.is_empty() {
        "_(no data)_".to_string()
    } else {
        let mut lines = vec![
            "| Month | Surveys | Mean satisfaction |".to_string(),
            "|---|---:|---:|".to_string(),
        ];
        for row in &aggregates.monthly {
            let mean = row
                .mean_satisfaction
                .map(|m| format!("{m:.2}"))
                .unwrap_or_else(|| "—".to_string());
            lines.push(format!("| {} | {} | {} |", row.month, row.surveys, mean));
        }
        lines.join("\n")
    };

    format!(
        "# Survey Drops Report\n\
         **Period:** {period_start} to {period_end} · **Source:** clean_surveys (Parquet) · \
         **Generated:** {generated} · **Batch:** {batch}\n\n\
         ## 1. Headline KPIs\n\
         - **Valid surveys:** {total}\n\
         - **Mean satisfaction (1-10):** {mean}\n\n\
         ## 2. Satisfaction Distribution\n\
         {distribution}\n\n\
         ## 3. Monthly Evolution\n\
         {monthly}\n\n\
         ## 4. Quality & Coverage\n\
         - Rows bronze (raw): {raw} · Silver (clean): {clean} · Quarantine: {quarantine}\n\n\
         ## 5. Persisted Artifacts\n\
         - Parquet: {parquet}\n\
         - SQLite: {db} (tables: raw_surveys, clean_surveys, quarantine_surveys; view: v_monthly_rollup)\n\
         - Quarantine CSV: {quarantine_csv}\n\n\
         ## 6. Definitions\n\
         - **Mean satisfaction:** average of `overall_satisfaction` over answered surveys; \
         no-answer sentinels (e.g. \"NS/NC\") count toward totals but never toward the mean.\n\
         - **Deduplication:** one row per `survey_id`, last ingested wins by ingest timestamp.\n\
         - **Quarantine:** rows failing validation, kept aside for inspection and replaced each run.\n",
        period_start = period_start,
        period_end = period_end,
        generated = ctx.generated_at.to_rfc3339(),
        batch = batch,
        total = aggregates.total,
        mean = mean,
        distribution = distribution,
        monthly = monthly,
        raw = ctx.counts.raw,
        clean = ctx.counts.clean,
        quarantine = ctx.counts.quarantine,
        parquet = ctx.parquet_path,
        db = ctx.db_path,
        quarantine_csv = ctx.quarantine_path,
    )
}
