pub mod database;
pub mod driver;
pub mod notify;
pub mod report;
pub mod runner;
pub mod utils;

// Re-export common items
pub use report::{run_pipeline, PipelineOptions, PipelineSummary};
pub use utils::{Config, EnvSnapshot};
