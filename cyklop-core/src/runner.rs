mod collector;
mod config;
mod counters;
mod error;
mod outputs;
mod pacer;
mod progress;
mod result;
mod run;
mod scenario;
mod stats;
mod step;
mod vu;

pub use collector::{Collector, CollectorGuard};
pub use config::{DEFAULT_LOG_INTERVAL, RESULTS_FILE_NAME, RunConfig};
pub use counters::{Counters, StatusCounts};
pub use error::{Error, Result};
pub use outputs::create_run_dir;
pub use pacer::{SUB_TICK, SUB_TICKS, SpawnPacer, TICK, spawn_count};
pub use progress::ProgressReport;
pub use result::{
    ParseLineError, RequestResult, ResultLine, ResultsLine, Snapshot, Status, escape_token,
    format_line, parse_line, unescape_token,
};
pub use run::ScenarioRunner;
pub use scenario::{Scenario, ScenarioBuilder, StepSequence, UserRegistry, steps};
pub use stats::{LatencySummary, RunSummary};
pub use step::LoadStep;
pub use vu::{UserBehavior, UserFn, VirtualUser, VuError, VuFuture, user_fn};
