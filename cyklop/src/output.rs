use crate::cli::OutputFormat;
use std::path::Path;

use cyklop_core::runner::{LoadStep, RunSummary};

mod human;
mod json;

pub(crate) use human::render_steps;

pub(crate) trait OutputFormatter: Send + Sync {
    fn print_header(&self, scenario_path: &Path, run_dir: &Path, steps: &[LoadStep]);
    fn print_summary(&self, summary: &RunSummary) -> anyhow::Result<()>;
}

pub(crate) fn formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::HumanReadable => Box::new(human::HumanReadableOutput),
        OutputFormat::Json => Box::new(json::JsonOutput),
    }
}
