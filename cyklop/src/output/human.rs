use std::fmt::Write as _;
use std::path::Path;
use std::time::Duration;

use cyklop_core::runner::{LoadStep, RunSummary};

use super::OutputFormatter;

pub(crate) struct HumanReadableOutput;

impl OutputFormatter for HumanReadableOutput {
    fn print_header(&self, scenario_path: &Path, run_dir: &Path, steps: &[LoadStep]) {
        print!("{}", render_header(scenario_path, run_dir, steps));
    }

    fn print_summary(&self, summary: &RunSummary) -> anyhow::Result<()> {
        print!("{}", render_summary(summary));
        Ok(())
    }
}

pub(crate) fn render_steps(steps: &[LoadStep]) -> String {
    let mut out = String::new();
    for (idx, step) in steps.iter().enumerate() {
        let shape = match (step.rate(), step.duration().is_zero()) {
            (0, _) => format!("holdFor {}", format_duration(step.duration())),
            (rate, true) => format!("jumpTo {rate}/s"),
            (rate, false) => format!(
                "rampUp {rate}/s over {}",
                format_duration(step.duration())
            ),
        };
        writeln!(&mut out, "  {}. {shape} user={}", idx + 1, step.user().name()).ok();
    }
    out
}

fn render_header(scenario_path: &Path, run_dir: &Path, steps: &[LoadStep]) -> String {
    let mut out = String::new();
    writeln!(&mut out, "scenario: {}", scenario_path.display()).ok();
    writeln!(&mut out, "results: {}", run_dir.display()).ok();
    out.push_str("steps:\n");
    out.push_str(&render_steps(steps));
    out.push('\n');
    out
}

fn render_summary(summary: &RunSummary) -> String {
    let mut out = String::new();
    let t = &summary.totals;

    out.push_str("summary\n");
    writeln!(&mut out, "scenario: {}", summary.scenario).ok();
    writeln!(
        &mut out,
        "  duration: {}",
        format_duration(summary.run_duration())
    )
    .ok();
    writeln!(&mut out, "  users: {}", summary.users_total()).ok();
    writeln!(
        &mut out,
        "  requests: {} (ok {}, failed {}, error {})",
        t.requests_done, t.responses.success, t.responses.failure, t.responses.error
    )
    .ok();
    writeln!(&mut out, "  rps: {:.2}", summary.rps()).ok();

    match &summary.latency {
        Some(l) => {
            writeln!(
                &mut out,
                "  latency: min {:.2}ms avg {:.2}ms max {:.2}ms",
                l.min_ms, l.mean_ms, l.max_ms
            )
            .ok();
            writeln!(
                &mut out,
                "  latency: p50 {:.2}ms p90 {:.2}ms p99 {:.2}ms",
                l.p50_ms, l.p90_ms, l.p99_ms
            )
            .ok();
        }
        None => out.push_str("  latency: -\n"),
    }
    out
}

fn format_duration(d: Duration) -> String {
    // Whole milliseconds keep humantime from printing nanosecond noise.
    let ms = u64::try_from(d.as_millis()).unwrap_or(u64::MAX);
    humantime::format_duration(Duration::from_millis(ms)).to_string()
}
