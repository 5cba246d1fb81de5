use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};

use crate::{HttpClient, UserClient};

use super::collector::Collector;
use super::config::{RESULTS_FILE_NAME, RunConfig};
use super::error::Result;
use super::outputs::create_run_dir;
use super::pacer::{SUB_TICK, SpawnPacer};
use super::scenario::{Scenario, StepSequence, steps};
use super::stats::RunSummary;
use super::step::LoadStep;
use super::vu::{UserBehavior, VirtualUser, VuError, next_vu_id, reset_vu_ids};

type VuOutcome = (Arc<str>, std::result::Result<(), VuError>);

/// Drives one run of a scenario: walks its steps, launches virtual users at the profile's rate
/// and waits for every launched user to finish.
pub struct ScenarioRunner {
    name: String,
    steps: StepSequence,
    config: RunConfig,
    collector: Arc<Collector>,
    http: HttpClient,
    headers: Arc<[(String, String)]>,
}

impl ScenarioRunner {
    /// Resolves the scenario's steps. Fails on an empty scenario or an invalid config, before
    /// anything is allocated for the run.
    pub fn new(scenario: &dyn Scenario, config: RunConfig) -> Result<Self> {
        config.validate()?;
        let steps = steps(scenario)?;
        let collector = Arc::new(Collector::new(config.log_interval)?);
        let headers = Arc::from(config.headers.clone());

        Ok(Self {
            name: scenario.name().to_string(),
            steps,
            config,
            collector,
            http: HttpClient::default(),
            headers,
        })
    }

    #[must_use]
    pub fn with_http_client(mut self, http: HttpClient) -> Self {
        self.http = http;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[LoadStep] {
        self.steps.as_slice()
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn collector(&self) -> &Arc<Collector> {
        &self.collector
    }

    /// Creates the run directory under `results_dir` and runs there.
    pub async fn run(self) -> Result<RunSummary> {
        let run_dir = create_run_dir(&self.config.results_dir, &self.name)?;
        self.run_in(&run_dir).await
    }

    /// Runs with the results file inside an existing `run_dir`.
    ///
    /// Dropping the returned future (e.g. on Ctrl-C) aborts the launched users and still
    /// closes the collector.
    pub async fn run_in(self, run_dir: &Path) -> Result<RunSummary> {
        let path: PathBuf = run_dir.join(RESULTS_FILE_NAME);
        let guard = self.collector.open(&path)?;
        reset_vu_ids();

        tracing::info!(
            scenario = %self.name,
            steps = self.steps.len(),
            results = %path.display(),
            "run started"
        );

        let Self {
            name,
            mut steps,
            config,
            collector,
            http,
            headers,
        } = self;
        let spawner = Spawner {
            collector: &collector,
            http: &http,
            base_url: config.base_url.as_deref(),
            headers: &headers,
        };

        let started = Instant::now();
        let mut pacer = SpawnPacer::new();
        let mut current: Option<LoadStep> = None;
        let mut step_index = 0usize;
        let mut draining = false;
        let mut users: JoinSet<VuOutcome> = JoinSet::new();

        let mut ticker = tokio::time::interval(SUB_TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if draining && users.is_empty() {
                break;
            }

            tokio::select! {
                _ = ticker.tick(), if !draining => {
                    if pacer.at_second_boundary() {
                        let now = started.elapsed();
                        let advance = current.as_ref().is_none_or(|step| step.is_complete(now));
                        if advance {
                            match steps.next() {
                                Some(mut step) => {
                                    step.activate(now, pacer.rate());
                                    step_index += 1;
                                    tracing::info!(
                                        step = step_index,
                                        rate = step.rate(),
                                        duration = ?step.duration(),
                                        base_rate = step.base_rate(),
                                        user = step.user().name(),
                                        "step started"
                                    );
                                    current = Some(step);
                                }
                                None => {
                                    current = None;
                                    draining = true;
                                    tracing::info!(
                                        pending = users.len(),
                                        "all steps done; waiting for users to finish"
                                    );
                                    continue;
                                }
                            }
                        }

                        if let Some(step) = &current {
                            pacer.start_second(step.target_rate(now));
                            tracing::debug!(
                                elapsed = ?now,
                                rate = pacer.rate(),
                                launched = pacer.launched(),
                                "rate tick"
                            );
                        }
                    }

                    let n = pacer.next_sub_tick();
                    if let Some(step) = &current {
                        for _ in 0..n {
                            spawner.spawn(step.user(), &mut users);
                        }
                    }
                }

                Some(joined) = users.join_next(), if !users.is_empty() => {
                    collector.stop_user();
                    match joined {
                        Ok((_, Ok(()))) => {}
                        Ok((user, Err(err))) => {
                            tracing::warn!(user = %user, error = %err, "virtual user failed");
                        }
                        Err(err) => {
                            tracing::error!(error = %err, "virtual user task aborted");
                        }
                    }
                }

                else => break,
            }
        }

        drop(guard);

        let summary = collector.summary(&name);
        tracing::info!(
            scenario = %name,
            users = summary.totals.users_done,
            requests = summary.totals.requests_done,
            elapsed = ?started.elapsed(),
            "run finished"
        );
        Ok(summary)
    }
}

impl std::fmt::Debug for ScenarioRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScenarioRunner")
            .field("name", &self.name)
            .field("steps", &self.steps)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

struct Spawner<'a> {
    collector: &'a Arc<Collector>,
    http: &'a HttpClient,
    base_url: Option<&'a str>,
    headers: &'a Arc<[(String, String)]>,
}

impl Spawner<'_> {
    fn spawn(&self, behavior: &Arc<dyn UserBehavior>, users: &mut JoinSet<VuOutcome>) {
        let id = next_vu_id();
        let name: Arc<str> = Arc::from(format!("{}_{id}", behavior.name()));

        let client = UserClient::new(self.http.clone(), Arc::clone(self.collector), name.clone())
            .with_base_url(self.base_url)
            .with_headers(Arc::clone(self.headers));
        let vu = VirtualUser::new(id, name.clone(), client);

        self.collector.start_user();
        let fut = behavior.run(vu);
        users.spawn(async move { (name, fut.await) });
    }
}
