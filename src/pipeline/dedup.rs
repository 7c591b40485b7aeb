use std::collections::HashMap;

use crate::domain::CleanRecord;

/// Collapse the clean set to one record per `survey_id`: the last ingested
/// wins, ordered by `(ingest_ts, seq)` so identical timestamps resolve
/// deterministically to the later file-then-row position. Output preserves
/// input order of the surviving records. Quarantined records never pass
/// through here.
pub fn dedupe_last_ingested_wins(records: Vec<CleanRecord>) -> Vec<CleanRecord> {
    let mut latest: HashMap<String, CleanRecord> = HashMap::with_capacity(records.len());
    for record in records {
        let superseded = latest
            .get(&record.survey_id)
            .map(|current| (record.ingest_ts, record.seq) < (current.ingest_ts, current.seq))
            .unwrap_or(false);
        if !superseded {
            latest.insert(record.survey_id.clone(), record);
        }
    }
    let mut survivors: Vec<CleanRecord> = latest.into_values().collect();
    survivors.sort_by_key(|r| r.seq);
    survivors
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn clean(survey_id: &str, satisfaction: i64, ts_offset_secs: i64, seq: u64) -> CleanRecord {
        CleanRecord {
            survey_id: survey_id.to_string(),
            date: chrono::NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            overall_satisfaction: Some(satisfaction),
            service_used: None,
            comments: None,
            source_file: format!("file-{seq}.csv"),
            ingest_ts: Utc::now() + Duration::seconds(ts_offset_secs),
            seq,
        }
    }

    #[test]
    fn later_ingest_timestamp_wins() {
        let survivors = dedupe_last_ingested_wins(vec![
            clean("1", 5, 0, 0),
            clean("1", 8, 60, 1),
            clean("2", 3, 0, 2),
        ]);
        assert_eq!(survivors.len(), 2);
        let one = survivors.iter().find(|r| r.survey_id == "1").unwrap();
        assert_eq!(one.overall_satisfaction, Some(8));
    }

    #[test]
    fn identical_timestamps_fall_back_to_input_order() {
        let ts = Utc::now();
        let mut first = clean("7", 2, 0, 10);
        let mut second = clean("7", 9, 0, 11);
        first.ingest_ts = ts;
        second.ingest_ts = ts;
        let survivors = dedupe_last_ingested_wins(vec![first, second]);
        assert_eq!(survivors.len(), 1);
        assert_eq!(survivors[0].overall_satisfaction, Some(9));
    }

    #[test]
    fn order_of_arrival_does_not_matter() {
        let survivors = dedupe_last_ingested_wins(vec![
            clean("1", 8, 60, 1),
            clean("1", 5, 0, 0),
        ]);
        assert_eq!(survivors.len(), 1);
        assert_eq!(survivors[0].overall_satisfaction, Some(8));
    }

    #[test]
    fn distinct_keys_all_survive() {
        let survivors = dedupe_last_ingested_wins(vec![
            clean("a", 1, 0, 0),
            clean("b", 2, 0, 1),
            clean("c", 3, 0, 2),
        ]);
        assert_eq!(survivors.len(), 3);
        // Survivors come back in input order.
        let ids: Vec<&str> = survivors.iter().map(|r| r.survey_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }
}
