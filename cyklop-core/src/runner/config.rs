use std::path::PathBuf;
use std::time::Duration;

use super::error::{Error, Result};

/// Interval between progress reports when none is configured.
pub const DEFAULT_LOG_INTERVAL: Duration = Duration::from_secs(15);

/// Name of the per-run results file inside the run directory.
pub const RESULTS_FILE_NAME: &str = "results.log";

#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Parent directory of the per-run directories.
    pub results_dir: PathBuf,
    pub log_interval: Duration,

    /// Prepended to relative request targets.
    pub base_url: Option<String>,
    /// Sent with every request unless the request sets the same header.
    pub headers: Vec<(String, String)>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from("results"),
            log_interval: DEFAULT_LOG_INTERVAL,
            base_url: None,
            headers: Vec::new(),
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<()> {
        if self.log_interval.is_zero() {
            return Err(Error::InvalidLogInterval);
        }
        Ok(())
    }
}
