use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use engine_logging::LogDestination;

/// Fetch a list of URLs and extract title and visible text from each page.
#[derive(Debug, Parser)]
#[command(name = "skimmer", version)]
pub struct Args {
    /// File with one URL per line; blank lines and `#` comments are skipped.
    #[arg(long, value_name = "FILE")]
    pub input: PathBuf,

    /// Directory the records file is written into.
    #[arg(long, value_name = "DIR", default_value = "out")]
    pub output_dir: PathBuf,

    /// Maximum number of in-flight fetches.
    #[arg(long, default_value_t = 8)]
    pub concurrency: usize,

    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = 10)]
    pub timeout_secs: u64,

    /// Where log output goes.
    #[arg(long, value_enum, default_value_t = LogArg::Terminal)]
    pub log: LogArg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogArg {
    Terminal,
    File,
    Both,
}

impl std::fmt::Display for LogArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            LogArg::Terminal => "terminal",
            LogArg::File => "file",
            LogArg::Both => "both",
        })
    }
}

impl From<LogArg> for LogDestination {
    fn from(value: LogArg) -> Self {
        match value {
            LogArg::Terminal => LogDestination::Terminal,
            LogArg::File => LogDestination::File,
            LogArg::Both => LogDestination::Both,
        }
    }
}
