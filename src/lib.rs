pub mod error;
pub mod logger;
pub mod work;
pub mod delay_manager;
pub mod fetcher;
pub mod normalize;
pub mod validator;
pub mod confidence;
pub mod search_engine;
pub mod scraper;
pub mod extractor;
pub mod input_loader;
pub mod resume_manager;
pub mod progress;
pub mod hooks;
pub mod job_manager;
pub mod config;
pub mod artwork;
pub mod collections;
pub mod links;
pub mod artists;
pub mod export;

// Exporting types for convenience
pub use config::HarvestConfig;
pub use error::{HarvestError, Result};
pub use job_manager::{Harvest, Pass, Phase, Resolution, RunSettings, RunSummary, Scheduler};
pub use resume_manager::CheckpointStore;
pub use work::{WorkItem, WorkKey};
