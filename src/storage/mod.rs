pub mod database;
pub mod exports;

pub use database::{LayerCounts, SurveyStore};
pub use exports::{write_clean_parquet, write_quarantine_csv};
