use chrono::{DateTime, Utc};

use crate::domain::{RawRecord, EXPECTED_COLUMNS};

/// Maps the expected business columns onto whatever header row an input file
/// actually has. Built once per file; absent columns stay unmapped and
/// reconcile to null, unexpected columns are never looked at.
#[derive(Debug)]
pub struct ColumnMap {
    indices: [Option<usize>; EXPECTED_COLUMNS.len()],
}

impl ColumnMap {
    /// Match headers trimmed and case-insensitively against the canonical
    /// column names. First match wins if a file repeats a header.
    pub fn from_headers(headers: &[String]) -> Self {
        let mut indices = [None; EXPECTED_COLUMNS.len()];
        for (slot, expected) in EXPECTED_COLUMNS.iter().enumerate() {
            indices[slot] = headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(expected));
        }
        Self { indices }
    }

    /// Columns from the expected set that the file does not carry.
    pub fn missing_columns(&self) -> Vec<&'static str> {
        EXPECTED_COLUMNS
            .iter()
            .zip(self.indices.iter())
            .filter(|(_, idx)| idx.is_none())
            .map(|(name, _)| *name)
            .collect()
    }

    fn cell<'a>(&self, slot: usize, cells: &'a [Option<String>]) -> Option<&'a str> {
        self.indices[slot]
            .and_then(|i| cells.get(i))
            .and_then(|c| c.as_deref())
    }
}

/// Align one loose row to the canonical shape. Blank cells and absent
/// columns both reconcile to `None`; this must never fail, whatever the
/// file looked like.
pub fn reconcile_row(
    map: &ColumnMap,
    cells: &[Option<String>],
    source_file: &str,
    ingest_ts: DateTime<Utc>,
    seq: u64,
) -> RawRecord {
    let field = |slot: usize| -> Option<String> {
        map.cell(slot, cells)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    RawRecord {
        survey_id: field(0),
        date: field(1),
        overall_satisfaction: field(2),
        service_used: field(3),
        comments: field(4),
        source_file: source_file.to_string(),
        ingest_ts,
        seq,
    }
}
