use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// The fixed business columns every drop is expected to carry, in canonical
/// order. Files missing some of these degrade to nulls; extra columns are
/// dropped during reconciliation.
pub const EXPECTED_COLUMNS: [&str; 5] = [
    "survey_id",
    "date",
    "overall_satisfaction",
    "service_used",
    "comments",
];

/// A reconciled input row: exactly the expected business columns (absent ones
/// as `None`) plus provenance. The reconciler is the only constructor, so the
/// field-set invariant holds by construction. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRecord {
    pub survey_id: Option<String>,
    pub date: Option<String>,
    pub overall_satisfaction: Option<String>,
    pub service_used: Option<String>,
    pub comments: Option<String>,
    pub source_file: String,
    pub ingest_ts: DateTime<Utc>,
    /// Monotone file-then-row ordinal within the run. Tie-break for
    /// deduplication when two records share an ingest timestamp.
    pub seq: u64,
}

/// A validated record with coerced types, keyed by `survey_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanRecord {
    pub survey_id: String,
    pub date: NaiveDate,
    pub overall_satisfaction: Option<i64>,
    pub service_used: Option<String>,
    pub comments: Option<String>,
    pub source_file: String,
    pub ingest_ts: DateTime<Utc>,
    pub seq: u64,
}

/// A record that failed validation, kept whole for inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuarantinedRecord {
    pub record: RawRecord,
    pub reason: QuarantineReason,
}

/// Why a record was routed to quarantine. First failing rule wins, evaluated
/// in rule order: date, survey id, satisfaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuarantineReason {
    /// `date` missing or not parseable as a calendar date.
    InvalidDate,
    /// `survey_id` missing or empty after trimming.
    MissingSurveyId,
    /// Satisfaction is numeric but not an integer in [1,10].
    SatisfactionOutOfRange,
    /// Satisfaction is non-numeric text that is not a known sentinel.
    SatisfactionNotNumeric,
}

impl QuarantineReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuarantineReason::InvalidDate => "invalid_date",
            QuarantineReason::MissingSurveyId => "missing_survey_id",
            QuarantineReason::SatisfactionOutOfRange => "satisfaction_out_of_range",
            QuarantineReason::SatisfactionNotNumeric => "satisfaction_not_numeric",
        }
    }
}

impl std::fmt::Display for QuarantineReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
