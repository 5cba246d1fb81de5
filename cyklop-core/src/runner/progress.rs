use std::time::Duration;

use serde::Serialize;

use super::counters::Counters;
use super::result::{RequestResult, Status};

/// Periodic progress report.
///
/// Per-second deltas come from the last completed one-second window; latency covers the results
/// recorded since the previous report; status percentages are of all requests done so far.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressReport {
    pub elapsed_secs: f64,

    pub active_users: i64,
    /// Net change of active users over the last window.
    pub active_users_per_sec: i64,
    pub users_done: u64,
    pub users_done_per_sec: u64,

    pub requests_sent: u64,
    pub requests_sent_per_sec: u64,
    pub requests_done: u64,
    pub requests_done_per_sec: u64,

    pub ok_pct: f64,
    pub failed_pct: f64,
    pub error_pct: f64,

    /// Results this report's latency figures are computed from.
    pub window_results: usize,
    pub latency_min_ms: f64,
    pub latency_avg_ms: f64,
    pub latency_max_ms: f64,
}

impl ProgressReport {
    /// `None` when no result was recorded since the previous report.
    pub(crate) fn build(
        elapsed: Duration,
        total: &Counters,
        previous: &Counters,
        window: &[RequestResult],
    ) -> Option<Self> {
        if window.is_empty() {
            return None;
        }

        let mut min = Duration::MAX;
        let mut max = Duration::ZERO;
        let mut sum = Duration::ZERO;
        for r in window {
            let latency = r.latency();
            min = min.min(latency);
            max = max.max(latency);
            sum = sum.saturating_add(latency);
        }
        let avg = sum.as_secs_f64() / window.len() as f64;

        let pct = |status: Status| {
            if total.requests_done == 0 {
                0.0
            } else {
                total.responses.get(status) as f64 * 100.0 / total.requests_done as f64
            }
        };

        Some(Self {
            elapsed_secs: elapsed.as_secs_f64(),
            active_users: total.active_users,
            active_users_per_sec: previous.active_users,
            users_done: total.users_done,
            users_done_per_sec: previous.users_done,
            requests_sent: total.requests_sent,
            requests_sent_per_sec: previous.requests_sent,
            requests_done: total.requests_done,
            requests_done_per_sec: previous.requests_done,
            ok_pct: pct(Status::Success),
            failed_pct: pct(Status::Failure),
            error_pct: pct(Status::Error),
            window_results: window.len(),
            latency_min_ms: min.as_secs_f64() * 1000.0,
            latency_avg_ms: avg * 1000.0,
            latency_max_ms: max.as_secs_f64() * 1000.0,
        })
    }

    pub fn log(&self) {
        tracing::info!(
            elapsed = format_args!("{:.0}s", self.elapsed_secs),
            users.active = self.active_users,
            users.active_per_sec = self.active_users_per_sec,
            users.done = self.users_done,
            users.done_per_sec = self.users_done_per_sec,
            requests.sent = self.requests_sent,
            requests.sent_per_sec = self.requests_sent_per_sec,
            requests.done = self.requests_done,
            requests.done_per_sec = self.requests_done_per_sec,
            ok = format_args!("{:.1}%", self.ok_pct),
            failed = format_args!("{:.1}%", self.failed_pct),
            error = format_args!("{:.1}%", self.error_pct),
            latency.min_ms = format_args!("{:.1}", self.latency_min_ms),
            latency.avg_ms = format_args!("{:.1}", self.latency_avg_ms),
            latency.max_ms = format_args!("{:.1}", self.latency_max_ms),
            "progress"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::time::Instant;

    use super::*;

    fn result(ms: u64, status: Status) -> RequestResult {
        let start = Instant::now();
        RequestResult::from_parts(
            "index",
            Arc::from("Browser_1"),
            start,
            start + Duration::from_millis(ms),
            status,
            None,
        )
    }

    #[test]
    fn empty_window_skips_report() {
        let report = ProgressReport::build(
            Duration::from_secs(15),
            &Counters::default(),
            &Counters::default(),
            &[],
        );
        assert_eq!(report, None);
    }

    #[test]
    fn report_uses_previous_window_for_rates_and_totals_for_percentages() {
        let mut total = Counters::default();
        for status in [Status::Success, Status::Success, Status::Success, Status::Failure] {
            total.request_started();
            total.request_done(status);
        }
        total.user_started();
        total.user_started();

        let previous = Counters {
            active_users: 2,
            requests_sent: 3,
            requests_done: 1,
            ..Counters::default()
        };

        let window = [
            result(10, Status::Success),
            result(30, Status::Success),
            result(20, Status::Failure),
        ];

        let report =
            ProgressReport::build(Duration::from_secs(15), &total, &previous, &window)
                .unwrap_or_else(|| panic!("expected a report"));

        assert_eq!(report.active_users, 2);
        assert_eq!(report.active_users_per_sec, 2);
        assert_eq!(report.requests_sent_per_sec, 3);
        assert_eq!(report.requests_done_per_sec, 1);
        assert_eq!(report.requests_done, 4);
        assert!((report.ok_pct - 75.0).abs() < 1e-9);
        assert!((report.failed_pct - 25.0).abs() < 1e-9);
        assert_eq!(report.error_pct, 0.0);

        assert_eq!(report.window_results, 3);
        assert!((report.latency_min_ms - 10.0).abs() < 1e-6);
        assert!((report.latency_avg_ms - 20.0).abs() < 1e-6);
        assert!((report.latency_max_ms - 30.0).abs() < 1e-6);
    }
}
