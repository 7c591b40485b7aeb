use std::fs;
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Reader};
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::RawRecord;
use crate::pipeline::reconcile::{reconcile_row, ColumnMap};

/// File kinds picked up from the drops directory. Everything else is
/// ignored without comment.
const SUPPORTED_EXTENSIONS: [&str; 5] = ["csv", "xlsx", "xls", "xlsb", "ods"];

/// Per-file ingestion outcome, collected into the run's ingestion report.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    Ingested { file: String, rows: usize },
    Skipped { file: String, reason: String },
}

/// Everything the ingestion stage produced for one run: the reconciled
/// record set plus what happened to each candidate file.
#[derive(Debug, Default)]
pub struct IngestedBatch {
    pub records: Vec<RawRecord>,
    pub outcomes: Vec<FileOutcome>,
}

impl IngestedBatch {
    pub fn skipped_files(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, FileOutcome::Skipped { .. }))
            .count()
    }
}

/// Read every supported file in the drops directory, in sorted filename
/// order, reconciling each row to the canonical shape. An unreadable file is
/// skipped with a warning and recorded; a missing directory is an empty run,
/// not an error.
pub fn ingest_drops(drops_dir: &Path) -> IngestedBatch {
    let mut batch = IngestedBatch::default();

    let entries = match fs::read_dir(drops_dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(
                "drops directory {} not readable ({}), running with empty batch",
                drops_dir.display(),
                e
            );
            return batch;
        }
    };

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    paths.sort();

    let mut seq: u64 = 0;
    for path in paths {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let is_csv = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);
        let read = if is_csv {
            read_csv_rows(&path)
        } else {
            read_spreadsheet_rows(&path)
        };

        match read {
            Ok((headers, rows)) => {
                let map = ColumnMap::from_headers(&headers);
                let missing = map.missing_columns();
                if !missing.is_empty() {
                    warn!("{}: missing columns {:?}, filling with nulls", file_name, missing);
                }
                let ingest_ts = Utc::now();
                let row_count = rows.len();
                for cells in rows {
                    batch
                        .records
                        .push(reconcile_row(&map, &cells, &file_name, ingest_ts, seq));
                    seq += 1;
                }
                info!("read {} ({} rows)", file_name, row_count);
                batch.outcomes.push(FileOutcome::Ingested {
                    file: file_name,
                    rows: row_count,
                });
            }
            Err(reason) => {
                warn!("skipping {}: {}", file_name, reason);
                batch.outcomes.push(FileOutcome::Skipped {
                    file: file_name,
                    reason,
                });
            }
        }
    }

    batch
}

type LooseRows = (Vec<String>, Vec<Vec<Option<String>>>);

fn read_csv_rows(path: &Path) -> Result<LooseRows, String> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| e.to_string())?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| e.to_string())?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for result in reader.records() {
        match result {
            Ok(record) => {
                let cells: Vec<Option<String>> = record
                    .iter()
                    .map(|cell| {
                        let trimmed = cell.trim();
                        if trimmed.is_empty() {
                            None
                        } else {
                            Some(trimmed.to_string())
                        }
                    })
                    .collect();
                if cells.iter().any(Option::is_some) {
                    rows.push(cells);
                }
            }
            Err(e) => {
                debug!("{}: dropping malformed row: {}", path.display(), e);
            }
        }
    }
    Ok((headers, rows))
}

fn read_spreadsheet_rows(path: &Path) -> Result<LooseRows, String> {
    let mut workbook = open_workbook_auto(path).map_err(|e| e.to_string())?;
    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| "workbook has no sheets".to_string())?;
    let range = workbook.worksheet_range(&sheet).map_err(|e| e.to_string())?;

    let mut rows_iter = range.rows();
    let headers: Vec<String> = match rows_iter.next() {
        Some(row) => row
            .iter()
            .map(|cell| cell_to_string(cell).unwrap_or_default())
            .collect(),
        None => return Ok((Vec::new(), Vec::new())),
    };

    let rows: Vec<Vec<Option<String>>> = rows_iter
        .map(|row| row.iter().map(cell_to_string).collect::<Vec<_>>())
        .filter(|cells: &Vec<Option<String>>| cells.iter().any(Option::is_some))
        .collect();

    Ok((headers, rows))
}

/// Everything is carried forward as text, the way the original drops arrive;
/// typed coercion happens in validation. Spreadsheet dates keep their date
/// part, integer-valued floats lose the trailing `.0`.
fn cell_to_string(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Data::Int(i) => Some(i.to_string()),
        Data::Float(f) => {
            if f.fract() == 0.0 {
                Some(format!("{}", *f as i64))
            } else {
                Some(f.to_string())
            }
        }
        Data::Bool(b) => Some(b.to_string()),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|d| d.date().to_string())
            .or_else(|| Some(format!("{cell}"))),
        other => Some(format!("{other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_file(dir: &Path, name: &str, contents: &str) {
        let mut file = fs::File::create(dir.join(name)).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
    }

    #[test]
    fn reads_csv_drops_in_sorted_order() {
        let dir = tempdir().unwrap();
        write_file(
            dir.path(),
            "b.csv",
            "survey_id,date,overall_satisfaction\n2,2024-02-15,8\n",
        );
        write_file(
            dir.path(),
            "a.csv",
            "survey_id,date,overall_satisfaction\n1,2024-01-10,5\n",
        );

        let batch = ingest_drops(dir.path());
        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.records[0].source_file, "a.csv");
        assert_eq!(batch.records[1].source_file, "b.csv");
        assert!(batch.records[0].seq < batch.records[1].seq);
        assert!(batch.records[0].ingest_ts <= batch.records[1].ingest_ts);
        assert_eq!(batch.skipped_files(), 0);
    }

    #[test]
    fn missing_directory_yields_empty_batch() {
        let dir = tempdir().unwrap();
        let batch = ingest_drops(&dir.path().join("nowhere"));
        assert!(batch.records.is_empty());
        assert!(batch.outcomes.is_empty());
    }

    #[test]
    fn unreadable_file_is_skipped_and_recorded() {
        let dir = tempdir().unwrap();
        write_file(
            dir.path(),
            "good.csv",
            "survey_id,date,overall_satisfaction\n1,2024-01-10,5\n",
        );
        // Not a real workbook; calamine will refuse it.
        write_file(dir.path(), "broken.xlsx", "this is not a spreadsheet");

        let batch = ingest_drops(dir.path());
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.skipped_files(), 1);
        assert!(batch
            .outcomes
            .iter()
            .any(|o| matches!(o, FileOutcome::Skipped { file, .. } if file == "broken.xlsx")));
    }

    #[test]
    fn unsupported_extensions_are_ignored() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "notes.txt", "nothing to see");
        let batch = ingest_drops(dir.path());
        assert!(batch.records.is_empty());
        assert!(batch.outcomes.is_empty());
    }
}
