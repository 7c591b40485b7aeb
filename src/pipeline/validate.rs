use chrono::NaiveDate;

use crate::domain::{CleanRecord, QuarantineReason, QuarantinedRecord, RawRecord};
use crate::pipeline::normalize::{normalize_opt, normalize_text};

/// Tokens that mean "no answer" for the satisfaction question. Compared
/// after normalization, so matching is case- and accent-insensitive.
const NO_ANSWER_SENTINELS: [&str; 3] = ["ns/nc", "no contesta", "no sabe"];

/// Date formats accepted for the `date` column, tried in order. A longer
/// timestamp string is accepted through its leading `YYYY-MM-DD` prefix.
const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%d-%m-%Y"];

/// Outcome of validating one reconciled record. Every record lands in
/// exactly one arm; validation never fails the batch.
#[derive(Debug, Clone)]
pub enum Validated {
    Clean(CleanRecord),
    Quarantined(QuarantinedRecord),
}

/// Parse a calendar date from loosely formatted drop data. Unparseable
/// input coerces to `None`, never to an error.
pub fn parse_survey_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, fmt) {
            return Some(date);
        }
    }
    // Timestamp-like values keep their date part.
    if let Some(prefix) = trimmed.get(..10) {
        if let Ok(date) = NaiveDate::parse_from_str(prefix, "%Y-%m-%d") {
            return Some(date);
        }
    }
    None
}

/// Coerce a raw satisfaction value to integer-or-null. Sentinels and absent
/// values are a legitimate "no answer"; anything else must be an integer
/// (an integer-valued float counts) in [1,10].
pub fn coerce_satisfaction(raw: Option<&str>) -> Result<Option<i64>, QuarantineReason> {
    let raw = match raw {
        Some(value) => value.trim(),
        None => return Ok(None),
    };
    if raw.is_empty() {
        return Ok(None);
    }
    if let Some(normalized) = normalize_text(raw) {
        if NO_ANSWER_SENTINELS.contains(&normalized.as_str()) {
            return Ok(None);
        }
    }
    if let Ok(value) = raw.parse::<i64>() {
        return check_range(value);
    }
    if let Ok(value) = raw.parse::<f64>() {
        if value.fract() == 0.0 {
            return check_range(value as i64);
        }
        return Err(QuarantineReason::SatisfactionOutOfRange);
    }
    Err(QuarantineReason::SatisfactionNotNumeric)
}

fn check_range(value: i64) -> Result<Option<i64>, QuarantineReason> {
    if (1..=10).contains(&value) {
        Ok(Some(value))
    } else {
        Err(QuarantineReason::SatisfactionOutOfRange)
    }
}

/// Classify one reconciled record. Rules are evaluated in order (date,
/// survey id, satisfaction) and the first failure decides the quarantine
/// reason; text fields are normalized only on the clean path so quarantined
/// records keep their original values for inspection.
pub fn validate(record: RawRecord) -> Validated {
    let date = record.date.as_deref().and_then(parse_survey_date);
    let survey_id = record
        .survey_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let satisfaction = coerce_satisfaction(record.overall_satisfaction.as_deref());

    match (date, survey_id, satisfaction) {
        (Some(date), Some(survey_id), Ok(overall_satisfaction)) => Validated::Clean(CleanRecord {
            survey_id,
            date,
            overall_satisfaction,
            service_used: normalize_opt(record.service_used.as_deref()),
            comments: normalize_opt(record.comments.as_deref()),
            source_file: record.source_file,
            ingest_ts: record.ingest_ts,
            seq: record.seq,
        }),
        (None, _, _) => Validated::Quarantined(QuarantinedRecord {
            record,
            reason: QuarantineReason::InvalidDate,
        }),
        (_, None, _) => Validated::Quarantined(QuarantinedRecord {
            record,
            reason: QuarantineReason::MissingSurveyId,
        }),
        (_, _, Err(reason)) => Validated::Quarantined(QuarantinedRecord { record, reason }),
    }
}
