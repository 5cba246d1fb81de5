use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::Context as _;
use cyklop_core::runner::{ResultsLine, Status, parse_line};
use cyklop_testserver::TestServer;

fn status_code(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

fn scenario(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/scenarios")
        .join(name)
}

fn expect_code(out: &Output, code: i32) -> anyhow::Result<()> {
    anyhow::ensure!(
        status_code(out.status) == code,
        "expected exit code {code}, got {}\nstdout:\n{}\nstderr:\n{}",
        status_code(out.status),
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr)
    );
    Ok(())
}

async fn run_against_server(scenario_file: &str, results_dir: &Path) -> anyhow::Result<Output> {
    let server = TestServer::start().await.context("start test server")?;
    let base_url = server.base_url().to_string();
    let script_path = scenario(scenario_file);
    let results_dir = results_dir.to_path_buf();
    let exe = env!("CARGO_BIN_EXE_cyklop");

    let out = tokio::task::spawn_blocking(move || {
        Command::new(exe)
            .arg("run")
            .arg(&script_path)
            .arg("--base-url")
            .arg(&base_url)
            .arg("--results-dir")
            .arg(&results_dir)
            .arg("--log-interval")
            .arg("1s")
            .arg("--output")
            .arg("json")
            .output()
    })
    .await
    .context("spawn_blocking join")?
    .context("run cyklop binary")?;

    server.shutdown().await;
    Ok(out)
}

#[test]
fn invalid_flags_exit_30() -> anyhow::Result<()> {
    let exe = env!("CARGO_BIN_EXE_cyklop");

    let out = Command::new(exe)
        .arg("run")
        .arg(scenario("hello.yaml"))
        .arg("--log-interval")
        .arg("10x")
        .output()
        .context("run cyklop binary")?;

    expect_code(&out, 30)
}

#[test]
fn unreadable_scenarios_exit_30() -> anyhow::Result<()> {
    let exe = env!("CARGO_BIN_EXE_cyklop");

    for path in [scenario("does-not-exist.yaml"), scenario("broken.yaml")] {
        let out = Command::new(exe)
            .arg("check")
            .arg(&path)
            .output()
            .context("run cyklop binary")?;
        expect_code(&out, 30)?;
    }
    Ok(())
}

#[test]
fn unknown_user_exits_20_without_creating_results() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir().context("tempdir")?;
    let results_dir = tmp.path().join("results");
    let exe = env!("CARGO_BIN_EXE_cyklop");

    let out = Command::new(exe)
        .arg("run")
        .arg(scenario("unknown_user.yaml"))
        .arg("--results-dir")
        .arg(&results_dir)
        .output()
        .context("run cyklop binary")?;

    expect_code(&out, 20)?;
    anyhow::ensure!(
        String::from_utf8_lossy(&out.stderr).contains("Ghost"),
        "stderr should name the unknown user"
    );
    anyhow::ensure!(!results_dir.exists(), "results dir should not be created");
    Ok(())
}

#[test]
fn check_prints_the_profile() -> anyhow::Result<()> {
    let exe = env!("CARGO_BIN_EXE_cyklop");

    let out = Command::new(exe)
        .arg("check")
        .arg(scenario("hello.yaml"))
        .output()
        .context("run cyklop binary")?;

    expect_code(&out, 0)?;
    let stdout = String::from_utf8_lossy(&out.stdout);
    anyhow::ensure!(stdout.contains("name: hello"), "stdout:\n{stdout}");
    anyhow::ensure!(stdout.contains("1. jumpTo 2/s user=Browser"), "stdout:\n{stdout}");
    anyhow::ensure!(stdout.contains("2. holdFor 1s user=Browser"), "stdout:\n{stdout}");
    Ok(())
}

#[tokio::test]
async fn successful_run_exits_0_and_writes_results() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir().context("tempdir")?;
    let out = run_against_server("hello.yaml", tmp.path()).await?;
    expect_code(&out, 0)?;

    let stdout = String::from_utf8_lossy(&out.stdout);
    let line = stdout
        .lines()
        .find(|l| l.contains("\"kind\":\"summary\""))
        .context("missing summary line")?;
    let summary: serde_json::Value = serde_json::from_str(line).context("parse summary")?;
    anyhow::ensure!(summary["requests_total"] == 2, "summary: {summary}");
    anyhow::ensure!(summary["failed_requests_total"] == 0, "summary: {summary}");

    let run_dirs = std::fs::read_dir(tmp.path())
        .context("read results dir")?
        .collect::<Result<Vec<_>, _>>()?;
    anyhow::ensure!(run_dirs.len() == 1, "expected one run dir");
    let run_dir = run_dirs[0].path();
    let dir_name = run_dir.file_name().and_then(|s| s.to_str()).unwrap_or("");
    anyhow::ensure!(dir_name.starts_with("hello-"), "run dir: {dir_name}");

    let results = std::fs::read_to_string(run_dir.join("results.log")).context("results.log")?;
    let mut requests = Vec::new();
    for line in results.lines() {
        if let ResultsLine::Request(r) = parse_line(line)? {
            requests.push(r);
        }
    }
    anyhow::ensure!(requests.len() == 2, "results.log:\n{results}");
    anyhow::ensure!(
        requests
            .iter()
            .all(|r| r.status == Status::Success
                && r.name == "hello"
                && r.user.starts_with("Browser_")),
        "results.log:\n{results}"
    );
    Ok(())
}

#[tokio::test]
async fn failed_requests_exit_10() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir().context("tempdir")?;
    let out = run_against_server("status_503.yaml", tmp.path()).await?;
    expect_code(&out, 10)
}
