use std::fs;
use std::path::Path;

use anyhow::Result;
use tempfile::tempdir;

use survey_ingest::config::PipelineConfig;
use survey_ingest::pipeline;
use survey_ingest::report::read_clean_export;
use survey_ingest::storage::SurveyStore;

fn write_drop(drops_dir: &Path, name: &str, contents: &str) {
    fs::create_dir_all(drops_dir).unwrap();
    fs::write(drops_dir.join(name), contents).unwrap();
}

fn config(root: &Path) -> PipelineConfig {
    PipelineConfig::new(root.join("drops"), root.join("output"), None)
}

#[test]
fn last_ingested_record_wins_within_a_run() -> Result<()> {
    let temp = tempdir()?;
    let config = config(temp.path());

    write_drop(
        &config.drops_dir,
        "a.csv",
        "survey_id,date,overall_satisfaction,service_used,comments\n\
         1,2024-01-10,5,web,first answer\n",
    );
    write_drop(
        &config.drops_dir,
        "b.csv",
        "survey_id,date,overall_satisfaction,service_used,comments\n\
         1,2024-02-15,8,phone,second answer\n",
    );

    let summary = pipeline::run(&config)?;
    assert_eq!(summary.raw_rows, 2);
    assert_eq!(summary.clean_rows, 1);
    assert_eq!(summary.quarantined_rows, 0);

    let store = SurveyStore::open(&config.db_path)?;
    let row = store.clean_row("1")?.expect("survey 1 must be persisted");
    assert_eq!(row, ("2024-02-15".to_string(), Some(8)));
    // The raw layer keeps both occurrences.
    assert_eq!(store.layer_counts()?.raw, 2);
    Ok(())
}

#[test]
fn validation_splits_every_record_into_exactly_one_layer() -> Result<()> {
    let temp = tempdir()?;
    let config = config(temp.path());

    write_drop(
        &config.drops_dir,
        "mixed.csv",
        "survey_id,date,overall_satisfaction,service_used,comments\n\
         1,2024-01-10,5,web,ok\n\
         2,not-a-date,5,web,bad date\n\
         ,2024-01-11,5,web,no id\n\
         3,2024-01-12,99,web,out of range\n\
         4,2024-01-13,NS/NC,web,sentinel\n\
         5,2024-01-14,great,web,free text\n",
    );

    let summary = pipeline::run(&config)?;
    assert_eq!(summary.raw_rows, 6);
    assert_eq!(summary.clean_rows + summary.quarantined_rows, 6);
    assert_eq!(summary.clean_rows, 2);
    assert_eq!(summary.quarantined_rows, 4);

    // Sentinel lands clean with a null satisfaction.
    let store = SurveyStore::open(&config.db_path)?;
    let sentinel = store.clean_row("4")?.expect("sentinel row must be clean");
    assert_eq!(sentinel.1, None);

    // Quarantine export carries one row per failing occurrence, with reasons.
    let quarantine = fs::read_to_string(config.quarantine_csv_path())?;
    assert_eq!(quarantine.lines().count(), 5); // header + 4 rows
    assert!(quarantine.contains("invalid_date"));
    assert!(quarantine.contains("missing_survey_id"));
    assert!(quarantine.contains("satisfaction_out_of_range"));
    assert!(quarantine.contains("satisfaction_not_numeric"));
    Ok(())
}

#[test]
fn sentinel_counts_in_total_but_not_in_mean() -> Result<()> {
    let temp = tempdir()?;
    let config = config(temp.path());

    write_drop(
        &config.drops_dir,
        "drop.csv",
        "survey_id,date,overall_satisfaction\n\
         1,2024-01-10,4\n\
         2,2024-01-11,8\n\
         3,2024-01-12,NS/NC\n",
    );
    pipeline::run(&config)?;

    let rows = read_clean_export(&config.parquet_path())?;
    assert_eq!(rows.len(), 3);
    let report = fs::read_to_string(config.report_path())?;
    assert!(report.contains("**Valid surveys:** 3"));
    assert!(report.contains("**Mean satisfaction (1-10):** 6.00"));
    Ok(())
}

#[test]
fn running_twice_on_unchanged_drops_is_idempotent() -> Result<()> {
    let temp = tempdir()?;
    let config = config(temp.path());

    write_drop(
        &config.drops_dir,
        "drop.csv",
        "survey_id,date,overall_satisfaction,service_used,comments\n\
         1,2024-01-10,5,web,hello\n\
         2,2024-02-15,8,phone,\n",
    );

    pipeline::run(&config)?;
    let first: Vec<_> = {
        let mut rows = read_clean_export(&config.parquet_path())?;
        rows.sort_by(|a, b| a.survey_id.cmp(&b.survey_id));
        rows.iter()
            .map(|r| (r.survey_id.clone(), r.date, r.overall_satisfaction))
            .collect()
    };

    pipeline::run(&config)?;
    let second: Vec<_> = {
        let mut rows = read_clean_export(&config.parquet_path())?;
        rows.sort_by(|a, b| a.survey_id.cmp(&b.survey_id));
        rows.iter()
            .map(|r| (r.survey_id.clone(), r.date, r.overall_satisfaction))
            .collect()
    };

    assert_eq!(first, second);
    let store = SurveyStore::open(&config.db_path)?;
    let counts = store.layer_counts()?;
    assert_eq!(counts.clean, 2, "no duplicate clean rows after a re-run");
    assert_eq!(counts.raw, 2, "raw snapshot replaced, not accumulated");
    Ok(())
}

#[test]
fn second_run_values_win_across_runs() -> Result<()> {
    let temp = tempdir()?;
    let config = config(temp.path());

    write_drop(
        &config.drops_dir,
        "drop.csv",
        "survey_id,date,overall_satisfaction\n1,2024-01-10,5\n",
    );
    pipeline::run(&config)?;

    // The next drop replaces the file entirely: same key, new values.
    write_drop(
        &config.drops_dir,
        "drop.csv",
        "survey_id,date,overall_satisfaction\n1,2024-02-15,8\n",
    );
    pipeline::run(&config)?;

    let store = SurveyStore::open(&config.db_path)?;
    let counts = store.layer_counts()?;
    assert_eq!(counts.clean, 1, "upsert must not duplicate the key");
    let row = store.clean_row("1")?.unwrap();
    assert_eq!(row, ("2024-02-15".to_string(), Some(8)));
    Ok(())
}

#[test]
fn clean_layer_survives_a_run_over_different_files() -> Result<()> {
    let temp = tempdir()?;
    let config = config(temp.path());

    write_drop(
        &config.drops_dir,
        "january.csv",
        "survey_id,date,overall_satisfaction\n1,2024-01-10,5\n",
    );
    pipeline::run(&config)?;

    fs::remove_file(config.drops_dir.join("january.csv"))?;
    write_drop(
        &config.drops_dir,
        "february.csv",
        "survey_id,date,overall_satisfaction\n2,2024-02-15,8\n",
    );
    pipeline::run(&config)?;

    let store = SurveyStore::open(&config.db_path)?;
    let counts = store.layer_counts()?;
    assert_eq!(counts.clean, 2, "clean layer accumulates across runs");
    assert_eq!(counts.raw, 1, "raw layer mirrors only the current drop");
    Ok(())
}

#[test]
fn missing_comments_column_degrades_to_nulls() -> Result<()> {
    let temp = tempdir()?;
    let config = config(temp.path());

    write_drop(
        &config.drops_dir,
        "partial.csv",
        "survey_id,date,overall_satisfaction,service_used\n1,2024-01-10,5,web\n",
    );
    let summary = pipeline::run(&config)?;
    assert_eq!(summary.clean_rows, 1);
    assert_eq!(summary.quarantined_rows, 0);
    Ok(())
}

#[test]
fn empty_drops_directory_produces_a_no_data_report() -> Result<()> {
    let temp = tempdir()?;
    let config = config(temp.path());
    // Drops directory intentionally never created.

    let summary = pipeline::run(&config)?;
    assert_eq!(summary.raw_rows, 0);
    assert_eq!(summary.clean_rows, 0);
    assert_eq!(summary.quarantined_rows, 0);

    let store = SurveyStore::open(&config.db_path)?;
    let counts = store.layer_counts()?;
    assert_eq!((counts.raw, counts.quarantine, counts.clean), (0, 0, 0));

    assert!(config.parquet_path().exists(), "empty export still written");
    let report = fs::read_to_string(config.report_path())?;
    assert!(report.contains("**Valid surveys:** 0"));
    assert!(report.contains("**Period:** — to —"));
    Ok(())
}

#[test]
fn corrupt_file_is_skipped_and_the_run_continues() -> Result<()> {
    let temp = tempdir()?;
    let config = config(temp.path());

    write_drop(
        &config.drops_dir,
        "good.csv",
        "survey_id,date,overall_satisfaction\n1,2024-01-10,5\n",
    );
    write_drop(&config.drops_dir, "corrupt.xlsx", "not actually a workbook");

    let summary = pipeline::run(&config)?;
    assert_eq!(summary.raw_rows, 1);
    assert_eq!(summary.skipped_files, 1);

    let ingestion_report = fs::read_to_string(config.ingestion_report_path())?;
    assert!(ingestion_report.contains("corrupt.xlsx"));
    assert!(ingestion_report.contains("skipped"));
    Ok(())
}

#[test]
fn rerender_report_reads_persisted_artifacts_only() -> Result<()> {
    let temp = tempdir()?;
    let config = config(temp.path());

    write_drop(
        &config.drops_dir,
        "drop.csv",
        "survey_id,date,overall_satisfaction\n1,2024-01-10,5\n2,2024-02-15,9\n",
    );
    pipeline::run(&config)?;
    fs::remove_file(config.report_path())?;

    let path = pipeline::rerender_report(&config)?;
    let report = fs::read_to_string(path)?;
    assert!(report.contains("**Valid surveys:** 2"));
    assert!(report.contains("2024-01-10 to 2024-02-15"));
    Ok(())
}
