use std::fs;
use std::path::Path;

use rusqlite::{params, Connection};
use tracing::{debug, info};
use uuid::Uuid;

use crate::common::error::Result;
use crate::domain::{CleanRecord, QuarantinedRecord, RawRecord};

/// The layered SQLite store: bronze (`raw_surveys`) and quarantine are
/// point-in-time snapshots replaced on every run, silver (`clean_surveys`)
/// is cumulative and upserted by `survey_id`, gold is the derived
/// `v_monthly_rollup` view.
pub struct SurveyStore {
    conn: Connection,
}

/// Row counts per persisted layer, read back after persistence so the
/// report reflects exactly what is in the store.
#[derive(Debug, Clone, Copy, Default)]
pub struct LayerCounts {
    pub raw: usize,
    pub quarantine: usize,
    pub clean: usize,
}

impl SurveyStore {
    /// Open (creating if needed) the store and apply the schema. Failure
    /// here is fatal for the run.
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS raw_surveys (
                survey_id            TEXT,
                date                 TEXT,
                overall_satisfaction TEXT,
                service_used         TEXT,
                comments             TEXT,
                source_file          TEXT NOT NULL,
                ingest_ts            TEXT NOT NULL,
                batch_id             TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS quarantine_surveys (
                survey_id            TEXT,
                date                 TEXT,
                overall_satisfaction TEXT,
                service_used         TEXT,
                comments             TEXT,
                source_file          TEXT NOT NULL,
                ingest_ts            TEXT NOT NULL,
                batch_id             TEXT NOT NULL,
                reason               TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS clean_surveys (
                survey_id            TEXT PRIMARY KEY,
                date                 TEXT NOT NULL,
                overall_satisfaction INTEGER,
                service_used         TEXT,
                comments             TEXT,
                source_file          TEXT NOT NULL,
                ingest_ts            TEXT NOT NULL
            );
            "#,
        )?;
        Ok(Self { conn })
    }

    /// Persist one run as a single transaction: replace the raw and
    /// quarantine snapshots, upsert the deduplicated clean set. Either the
    /// whole batch commits or none of it does.
    pub fn persist_run(
        &mut self,
        batch_id: Uuid,
        raw: &[RawRecord],
        quarantined: &[QuarantinedRecord],
        clean: &[CleanRecord],
    ) -> Result<()> {
        let batch_id = batch_id.to_string();
        let tx = self.conn.transaction()?;

        tx.execute("DELETE FROM raw_surveys", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO raw_surveys
                 (survey_id, date, overall_satisfaction, service_used, comments, source_file, ingest_ts, batch_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for record in raw {
                stmt.execute(params![
                    record.survey_id,
                    record.date,
                    record.overall_satisfaction,
                    record.service_used,
                    record.comments,
                    record.source_file,
                    record.ingest_ts.to_rfc3339(),
                    batch_id,
                ])?;
            }
        }

        tx.execute("DELETE FROM quarantine_surveys", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO quarantine_surveys
                 (survey_id, date, overall_satisfaction, service_used, comments, source_file, ingest_ts, batch_id, reason)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for item in quarantined {
                let record = &item.record;
                stmt.execute(params![
                    record.survey_id,
                    record.date,
                    record.overall_satisfaction,
                    record.service_used,
                    record.comments,
                    record.source_file,
                    record.ingest_ts.to_rfc3339(),
                    batch_id,
                    item.reason.as_str(),
                ])?;
            }
        }

        {
            let mut stmt = tx.prepare(
                "INSERT INTO clean_surveys
                 (survey_id, date, overall_satisfaction, service_used, comments, source_file, ingest_ts)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(survey_id) DO UPDATE SET
                     date = excluded.date,
                     overall_satisfaction = excluded.overall_satisfaction,
                     service_used = excluded.service_used,
                     comments = excluded.comments,
                     source_file = excluded.source_file,
                     ingest_ts = excluded.ingest_ts",
            )?;
            for record in clean {
                stmt.execute(params![
                    record.survey_id,
                    record.date.to_string(),
                    record.overall_satisfaction,
                    record.service_used,
                    record.comments,
                    record.source_file,
                    record.ingest_ts.to_rfc3339(),
                ])?;
            }
        }

        tx.commit()?;
        info!(
            "persisted batch {}: {} raw, {} quarantined, {} clean upserts",
            batch_id,
            raw.len(),
            quarantined.len(),
            clean.len()
        );
        Ok(())
    }

    /// Recompute the derived monthly rollup from the clean layer. Runs after
    /// the batch commit; a failure here degrades the run but never unwinds
    /// already-committed upserts.
    pub fn refresh_monthly_view(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            DROP VIEW IF EXISTS v_monthly_rollup;
            CREATE VIEW v_monthly_rollup AS
            SELECT substr(date, 1, 7)                 AS month,
                   COUNT(*)                           AS survey_count,
                   ROUND(AVG(overall_satisfaction), 2) AS avg_satisfaction
            FROM clean_surveys
            GROUP BY substr(date, 1, 7)
            ORDER BY month;
            "#,
        )?;
        debug!("refreshed v_monthly_rollup");
        Ok(())
    }

    pub fn layer_counts(&self) -> Result<LayerCounts> {
        let count = |table: &str| -> Result<usize> {
            let n: i64 = self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
            Ok(n as usize)
        };
        Ok(LayerCounts {
            raw: count("raw_surveys")?,
            quarantine: count("quarantine_surveys")?,
            clean: count("clean_surveys")?,
        })
    }

    /// A clean-layer row as persisted, for tests and ad-hoc inspection.
    pub fn clean_row(&self, survey_id: &str) -> Result<Option<(String, Option<i64>)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT date, overall_satisfaction FROM clean_surveys WHERE survey_id = ?1")?;
        let mut rows = stmt.query(params![survey_id])?;
        if let Some(row) = rows.next()? {
            Ok(Some((row.get(0)?, row.get(1)?)))
        } else {
            Ok(None)
        }
    }

    /// Monthly rollup as seen through the derived view.
    pub fn monthly_rollup(&self) -> Result<Vec<(String, i64, Option<f64>)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT month, survey_count, avg_satisfaction FROM v_monthly_rollup")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}
