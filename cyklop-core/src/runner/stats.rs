use std::time::Duration;

use hdrhistogram::Histogram;
use serde::Serialize;

use super::counters::Counters;
use super::result::Status;

/// Run-wide latency distribution in microseconds.
#[derive(Debug)]
pub(crate) struct LatencyRecorder {
    hist: Histogram<u64>,
}

impl Default for LatencyRecorder {
    fn default() -> Self {
        // Track up to 60s in microseconds (with 3 sigfigs).
        let hist = Histogram::<u64>::new_with_bounds(1, 60_000_000, 3)
            .unwrap_or_else(|err| panic!("failed to init histogram: {err}"));
        Self { hist }
    }
}

impl LatencyRecorder {
    pub fn record(&mut self, latency: Duration) {
        let us = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.hist.saturating_record(us.max(1));
    }

    pub fn summary(&self) -> Option<LatencySummary> {
        #[allow(clippy::len_zero)]
        if self.hist.len() == 0 {
            return None;
        }
        let ms = |us: u64| us as f64 / 1000.0;
        Some(LatencySummary {
            min_ms: ms(self.hist.min()),
            mean_ms: self.hist.mean() / 1000.0,
            max_ms: ms(self.hist.max()),
            p50_ms: ms(self.hist.value_at_quantile(0.50)),
            p90_ms: ms(self.hist.value_at_quantile(0.90)),
            p99_ms: ms(self.hist.value_at_quantile(0.99)),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatencySummary {
    pub min_ms: f64,
    pub mean_ms: f64,
    pub max_ms: f64,
    pub p50_ms: f64,
    pub p90_ms: f64,
    pub p99_ms: f64,
}

/// Final numbers of a run, taken from the collector when it closes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub scenario: String,
    pub run_duration_ms: u64,
    pub totals: Counters,
    pub latency: Option<LatencySummary>,
}

impl RunSummary {
    pub fn run_duration(&self) -> Duration {
        Duration::from_millis(self.run_duration_ms)
    }

    pub fn requests_total(&self) -> u64 {
        self.totals.requests_done
    }

    /// Requests that ended as `FAILED` or `ERROR`.
    pub fn requests_failed(&self) -> u64 {
        self.totals
            .responses
            .get(Status::Failure)
            .saturating_add(self.totals.responses.get(Status::Error))
    }

    pub fn rps(&self) -> f64 {
        let secs = self.run_duration().as_secs_f64().max(1e-9);
        self.totals.requests_done as f64 / secs
    }

    pub fn users_total(&self) -> u64 {
        self.totals.users_done
    }
}
