pub mod common;
pub mod config;
pub mod domain;
pub mod observability;
pub mod pipeline;
pub mod report;
pub mod storage;

pub use common::error::{PipelineError, Result};
pub use config::PipelineConfig;
pub use pipeline::{run, RunSummary};
