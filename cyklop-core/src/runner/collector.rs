use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write as _};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::config::DEFAULT_LOG_INTERVAL;
use super::counters::{Counters, Windows};
use super::error::{Error, Result};
use super::pacer::TICK;
use super::progress::ProgressReport;
use super::result::{RequestResult, Snapshot, format_line};
use super::stats::{LatencyRecorder, RunSummary};

/// Aggregates the events of one run.
///
/// Every mutation goes through one mutex, so counter updates, window rotation and results-file
/// writes are serialized and the file stays in event order. Event calls made while the collector
/// is not open are ignored.
///
/// File writes happen on the calling task while the lock is held. Per-request lines only reach
/// the `BufWriter`'s buffer; the blocking write to disk happens on flush (once per second and on
/// close) or when the buffer fills.
#[derive(Debug)]
pub struct Collector {
    log_interval: Duration,
    state: Mutex<State>,
    timers: Mutex<Vec<JoinHandle<()>>>,
}

#[derive(Debug)]
struct State {
    open: bool,
    epoch: Instant,
    ended: Option<Instant>,
    path: Option<PathBuf>,
    writer: Option<BufWriter<File>>,
    windows: Windows,
    results: Vec<RequestResult>,
    report_cursor: usize,
    latency: LatencyRecorder,
}

impl Default for Collector {
    fn default() -> Self {
        Self {
            log_interval: DEFAULT_LOG_INTERVAL,
            state: Mutex::new(State::new()),
            timers: Mutex::new(Vec::new()),
        }
    }
}

impl State {
    fn new() -> Self {
        Self {
            open: false,
            epoch: Instant::now(),
            ended: None,
            path: None,
            writer: None,
            windows: Windows::default(),
            results: Vec::new(),
            report_cursor: 0,
            latency: LatencyRecorder::default(),
        }
    }

    fn write_line(&mut self, line: &str) {
        let Some(writer) = self.writer.as_mut() else {
            return;
        };
        if let Err(err) = writeln!(writer, "{line}") {
            tracing::warn!(error = %err, path = ?self.path, "results file write failed; disabling it");
            self.writer = None;
        }
    }

    fn flush(&mut self) {
        let Some(writer) = self.writer.as_mut() else {
            return;
        };
        if let Err(err) = writer.flush() {
            tracing::warn!(error = %err, path = ?self.path, "results file flush failed; disabling it");
            self.writer = None;
        }
    }

    fn write_snapshot(&mut self, now: Instant) {
        let snapshot = Snapshot {
            elapsed: now.saturating_duration_since(self.epoch).as_secs_f64(),
            totals: self.windows.total,
        };
        match snapshot.to_line() {
            Ok(line) => self.write_line(&line),
            Err(err) => tracing::warn!(error = %err, "failed to encode counter snapshot"),
        }
    }
}

impl Collector {
    pub fn new(log_interval: Duration) -> Result<Self> {
        if log_interval.is_zero() {
            return Err(Error::InvalidLogInterval);
        }
        Ok(Self {
            log_interval,
            ..Self::default()
        })
    }

    pub fn log_interval(&self) -> Duration {
        self.log_interval
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Opens `path` for append, resets all counters and starts the rotation and report timers.
    ///
    /// Must be called inside a tokio runtime. The returned guard closes the collector when
    /// dropped.
    pub fn open(self: &Arc<Self>, path: &Path) -> Result<CollectorGuard> {
        {
            let mut state = self.state();
            if state.open {
                return Err(Error::CollectorAlreadyOpen);
            }

            let file = OpenOptions::new().create(true).append(true).open(path)?;

            *state = State::new();
            state.open = true;
            state.path = Some(path.to_path_buf());
            state.writer = Some(BufWriter::new(file));
        }

        let rotation = {
            let this = Arc::clone(self);
            tokio::spawn(async move {
                let mut interval = tokio::time::interval_at(Instant::now() + TICK, TICK);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    interval.tick().await;
                    this.rotate();
                }
            })
        };

        let report = {
            let this = Arc::clone(self);
            let every = self.log_interval;
            tokio::spawn(async move {
                let mut interval = tokio::time::interval_at(Instant::now() + every, every);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    interval.tick().await;
                    if let Some(report) = this.take_report() {
                        report.log();
                    }
                }
            })
        };

        {
            let mut timers = self
                .timers
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            timers.push(rotation);
            timers.push(report);
        }

        tracing::debug!(path = %path.display(), "collector opened");

        Ok(CollectorGuard {
            collector: Arc::clone(self),
        })
    }

    /// Stops the timers, writes a final snapshot and releases the results file.
    ///
    /// Safe to call more than once, and on a collector that never opened.
    pub fn close(&self) {
        {
            let mut timers = self
                .timers
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            for h in timers.drain(..) {
                h.abort();
            }
        }

        let mut state = self.state();
        if !state.open {
            return;
        }

        let now = Instant::now();
        state.write_snapshot(now);
        state.flush();
        state.writer = None;
        state.open = false;
        state.ended = Some(now);

        tracing::debug!(
            path = ?state.path,
            requests = state.windows.total.requests_done,
            "collector closed"
        );
    }

    pub fn is_open(&self) -> bool {
        self.state().open
    }

    pub fn start_user(&self) {
        let mut state = self.state();
        if state.open {
            state.windows.apply(Counters::user_started);
        }
    }

    pub fn stop_user(&self) {
        let mut state = self.state();
        if state.open {
            state.windows.apply(Counters::user_stopped);
        }
    }

    pub fn start_request(&self) {
        let mut state = self.state();
        if state.open {
            state.windows.apply(Counters::request_started);
        }
    }

    /// Records a finished request: counters, latency, one results-file line.
    pub fn stop_request(&self, result: RequestResult) {
        let mut state = self.state();
        if !state.open {
            tracing::trace!(name = result.name(), "result after close dropped");
            return;
        }

        let status = result.status();
        state.windows.apply(|c| c.request_done(status));
        state.latency.record(result.latency());

        let line = format_line(&result, state.epoch);
        state.write_line(&line);
        state.results.push(result);
    }

    /// Closes the current one-second window and appends a snapshot of the totals.
    pub fn rotate(&self) {
        let mut state = self.state();
        if !state.open {
            return;
        }
        state.windows.rotate();
        state.write_snapshot(Instant::now());
        state.flush();
    }

    /// Builds the report for results recorded since the last call and advances the cursor.
    pub fn take_report(&self) -> Option<ProgressReport> {
        let mut state = self.state();
        let now = state.ended.unwrap_or_else(Instant::now);
        let elapsed = now.saturating_duration_since(state.epoch);

        let cursor = state.report_cursor.min(state.results.len());
        let report = ProgressReport::build(
            elapsed,
            &state.windows.total,
            &state.windows.previous,
            &state.results[cursor..],
        );
        state.report_cursor = state.results.len();
        report
    }

    pub fn totals(&self) -> Counters {
        self.state().windows.total
    }

    pub fn current(&self) -> Counters {
        self.state().windows.current
    }

    pub fn previous(&self) -> Counters {
        self.state().windows.previous
    }

    pub fn result_count(&self) -> usize {
        self.state().results.len()
    }

    pub fn results(&self) -> Vec<RequestResult> {
        self.state().results.clone()
    }

    /// Instant the collector was last opened; result timestamps are relative to it.
    pub fn epoch(&self) -> Instant {
        self.state().epoch
    }

    /// Time from open to close (or to now, while still open).
    pub fn elapsed(&self) -> Duration {
        let state = self.state();
        state
            .ended
            .unwrap_or_else(Instant::now)
            .saturating_duration_since(state.epoch)
    }

    pub fn path(&self) -> Option<PathBuf> {
        self.state().path.clone()
    }

    pub fn summary(&self, scenario: &str) -> RunSummary {
        let state = self.state();
        let elapsed = state
            .ended
            .unwrap_or_else(Instant::now)
            .saturating_duration_since(state.epoch);

        RunSummary {
            scenario: scenario.to_string(),
            run_duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            totals: state.windows.total,
            latency: state.latency.summary(),
        }
    }
}

/// Closes the collector when dropped, on every exit path of a run.
#[derive(Debug)]
#[must_use = "dropping the guard closes the collector"]
pub struct CollectorGuard {
    collector: Arc<Collector>,
}

impl CollectorGuard {
    pub fn collector(&self) -> &Arc<Collector> {
        &self.collector
    }
}

impl Drop for CollectorGuard {
    fn drop(&mut self) {
        self.collector.close();
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::runner::result::{ResultsLine, Status, parse_line};

    fn finished(name: &str, user: &str, status: Status) -> RequestResult {
        let mut r = RequestResult::begin(name.to_string(), Arc::from(user));
        match status {
            Status::Success => {}
            Status::Failure => {
                r.fail(Some("unexpected status 500".into()));
            }
            Status::Error => {
                r.set_error("connection refused");
            }
        }
        r.finish();
        r
    }

    #[test]
    fn zero_log_interval_is_rejected() {
        assert!(matches!(
            Collector::new(Duration::ZERO),
            Err(Error::InvalidLogInterval)
        ));
    }

    #[test]
    fn events_before_open_are_ignored() {
        let c = Collector::default();
        c.start_user();
        c.start_request();
        c.stop_request(finished("a", "u_1", Status::Success));
        c.stop_user();
        assert_eq!(c.totals(), Counters::default());
        assert_eq!(c.result_count(), 0);

        c.close();
        c.close();
    }

    #[tokio::test(start_paused = true)]
    async fn totals_match_stop_request_calls() {
        let dir = tempfile::tempdir().unwrap();
        let c = Arc::new(Collector::default());
        let guard = c.open(&dir.path().join("results.log")).unwrap();

        c.start_user();
        for status in [Status::Success, Status::Failure, Status::Error, Status::Success] {
            c.start_request();
            c.stop_request(finished("index", "Browser_1", status));
        }
        c.stop_user();

        let totals = c.totals();
        assert_eq!(totals.requests_sent, 4);
        assert_eq!(totals.requests_done, 4);
        assert_eq!(totals.responses.sum(), totals.requests_done);
        assert_eq!(totals.responses.get(Status::Success), 2);
        assert_eq!(totals.active_users, 0);
        assert_eq!(totals.users_done, 1);

        drop(guard);
        assert!(!c.is_open());

        c.start_request();
        assert_eq!(c.totals().requests_sent, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn opening_twice_fails() {
        let dir = tempfile::tempdir().unwrap();
        let c = Arc::new(Collector::default());
        let _guard = c.open(&dir.path().join("a.log")).unwrap();
        assert!(matches!(
            c.open(&dir.path().join("b.log")),
            Err(Error::CollectorAlreadyOpen)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn open_failure_leaves_collector_closed() {
        let dir = tempfile::tempdir().unwrap();
        let c = Arc::new(Collector::default());
        let missing = dir.path().join("missing").join("results.log");
        assert!(matches!(c.open(&missing), Err(Error::Io(_))));
        assert!(!c.is_open());
        c.close();
    }

    #[tokio::test(start_paused = true)]
    async fn rotation_moves_window_and_writes_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.log");
        let c = Arc::new(Collector::default());
        let guard = c.open(&path).unwrap();

        c.start_user();
        c.start_request();
        c.stop_request(finished("index", "Browser_1", Status::Success));

        tokio::time::sleep(Duration::from_millis(1050)).await;

        assert_eq!(c.current(), Counters::default());
        assert_eq!(c.previous().requests_done, 1);
        assert_eq!(c.previous().active_users, 1);
        assert_eq!(c.totals().requests_done, 1);

        drop(guard);

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<ResultsLine> = text.lines().map(|l| parse_line(l).unwrap()).collect();
        assert!(matches!(lines[0], ResultsLine::Request(ref r) if r.name == "index"));
        assert!(
            matches!(lines[1], ResultsLine::Snapshot(ref s) if s.totals.requests_done == 1 && s.elapsed >= 1.0)
        );
        assert!(matches!(lines.last(), Some(ResultsLine::Snapshot(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn report_covers_only_new_results() {
        let dir = tempfile::tempdir().unwrap();
        let c = Arc::new(Collector::default());
        let _guard = c.open(&dir.path().join("results.log")).unwrap();

        assert!(c.take_report().is_none());

        c.start_request();
        c.stop_request(finished("a", "u_1", Status::Success));
        c.start_request();
        c.stop_request(finished("b", "u_1", Status::Failure));

        let report = c.take_report().unwrap();
        assert_eq!(report.window_results, 2);
        assert!((report.failed_pct - 50.0).abs() < 1e-9);

        assert!(c.take_report().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn summary_includes_latency() {
        let dir = tempfile::tempdir().unwrap();
        let c = Arc::new(Collector::default());
        let guard = c.open(&dir.path().join("results.log")).unwrap();

        c.start_request();
        let mut r = RequestResult::begin("slow", Arc::from("u_1"));
        tokio::time::advance(Duration::from_millis(40)).await;
        r.finish();
        c.stop_request(r);

        tokio::time::advance(Duration::from_millis(960)).await;
        drop(guard);

        let summary = c.summary("smoke");
        assert_eq!(summary.scenario, "smoke");
        assert_eq!(summary.totals.requests_done, 1);
        assert!(summary.run_duration_ms >= 1000);
        let latency = summary.latency.unwrap();
        assert!((latency.max_ms - 40.0).abs() < 0.1, "{latency:?}");
    }
}
