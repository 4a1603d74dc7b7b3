//! Skimmer core: pure batch bookkeeping and configuration.
mod batch;
mod config;
mod input;

pub use batch::{BatchState, BatchSummary, ItemStage, JobId};
pub use config::{ConfigError, PoolConfig};
pub use input::parse_url_lines;
