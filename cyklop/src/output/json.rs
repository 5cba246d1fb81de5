use serde::Serialize;
use std::io::Write as _;
use std::path::Path;

use cyklop_core::runner::{LatencySummary, LoadStep, RunSummary, StatusCounts};

use super::OutputFormatter;

pub(crate) struct JsonOutput;

impl OutputFormatter for JsonOutput {
    fn print_header(&self, _scenario_path: &Path, _run_dir: &Path, _steps: &[LoadStep]) {}

    fn print_summary(&self, summary: &RunSummary) -> anyhow::Result<()> {
        emit_json_line(&build_summary_line(summary))
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonSummaryLine<'a> {
    pub kind: &'static str,
    pub scenario: &'a str,
    pub duration_ms: u64,
    pub users_total: u64,
    pub requests_total: u64,
    pub failed_requests_total: u64,
    pub responses: StatusCounts,
    pub rps: f64,
    pub latency: Option<LatencySummary>,
}

fn build_summary_line(summary: &RunSummary) -> JsonSummaryLine<'_> {
    JsonSummaryLine {
        kind: "summary",
        scenario: &summary.scenario,
        duration_ms: summary.run_duration_ms,
        users_total: summary.users_total(),
        requests_total: summary.requests_total(),
        failed_requests_total: summary.requests_failed(),
        responses: summary.totals.responses,
        rps: summary.rps(),
        latency: summary.latency,
    }
}

fn emit_json_line<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer(&mut stdout, value)?;
    stdout.write_all(b"\n")?;
    stdout.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cyklop_core::runner::Counters;

    #[test]
    fn summary_line_is_tagged() {
        let summary = RunSummary {
            scenario: "smoke".to_string(),
            run_duration_ms: 1_000,
            totals: Counters {
                requests_done: 3,
                responses: StatusCounts {
                    success: 2,
                    failure: 0,
                    error: 1,
                },
                ..Counters::default()
            },
            latency: None,
        };
        let v = serde_json::to_value(build_summary_line(&summary))
            .unwrap_or_else(|e| panic!("serialize: {e}"));
        assert_eq!(v["kind"], "summary");
        assert_eq!(v["requests_total"], 3);
        assert_eq!(v["failed_requests_total"], 1);
        assert_eq!(v["responses"]["ERROR"], 1);
        assert!(v["latency"].is_null());
    }
}
