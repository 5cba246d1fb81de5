use std::path::Path;

use cyklop_core::runner::{RunConfig, Scenario as _, ScenarioRunner, create_run_dir, steps};

use crate::cli::{CheckArgs, RunArgs};
use crate::exit_codes::ExitCode;
use crate::output;
use crate::run_error::RunError;
use crate::scenario_yaml::{self, LoadedScenario};

pub async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    let out = output::formatter(args.output);

    let loaded = load_scenario(&args.scenario).await?;
    let LoadedScenario {
        scenario,
        base_url,
        mut headers,
    } = loaded;

    headers.extend(args.headers);
    let config = RunConfig {
        results_dir: args.results_dir,
        log_interval: args.log_interval,
        base_url: args.base_url.filter(|s| !s.is_empty()).or(base_url),
        headers,
    };

    let runner = ScenarioRunner::new(&scenario, config)
        .map_err(|e| RunError::from_core(e, "invalid scenario"))?;
    let run_dir = create_run_dir(&runner.config().results_dir, runner.name())
        .map_err(|e| RunError::from_core(e, "failed to create run directory"))?;

    out.print_header(&args.scenario, &run_dir, runner.steps());

    let name = runner.name().to_string();
    let collector = runner.collector().clone();

    let summary = tokio::select! {
        res = runner.run_in(&run_dir) => {
            res.map_err(|e| RunError::from_core(e, "run failed"))?
        }
        Ok(()) = tokio::signal::ctrl_c() => {
            tracing::warn!("interrupted");
            out.print_summary(&collector.summary(&name))
                .map_err(RunError::RuntimeError)?;
            return Ok(ExitCode::Interrupted);
        }
    };

    out.print_summary(&summary).map_err(RunError::RuntimeError)?;

    let failed = summary.requests_failed();
    if failed > 0 {
        tracing::warn!(failed, "some requests did not succeed");
    }
    Ok(ExitCode::from_failed_requests(failed))
}

pub async fn check(args: CheckArgs) -> Result<(), RunError> {
    let loaded = load_scenario(&args.scenario).await?;
    let seq = steps(&loaded.scenario).map_err(|e| RunError::from_core(e, "invalid scenario"))?;

    println!("scenario: {}", args.scenario.display());
    println!("name: {}", loaded.scenario.name());
    println!("default user: {}", loaded.scenario.default_user().name());
    if let Some(base_url) = &loaded.base_url {
        println!("base url: {base_url}");
    }
    println!(
        "total duration: {}",
        humantime::format_duration(seq.total_duration())
    );
    println!("steps:");
    print!("{}", output::render_steps(seq.as_slice()));
    Ok(())
}

async fn load_scenario(path: &Path) -> Result<LoadedScenario, RunError> {
    let doc = scenario_yaml::load_doc(path)
        .await
        .map_err(RunError::InvalidInput)?;

    let fallback = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("scenario");

    doc.resolve(fallback).map_err(RunError::ScenarioError)
}
