use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::vu::UserBehavior;

/// One phase of a rate profile.
///
/// `rate == 0` holds the inherited rate for `duration`; `duration == 0` jumps straight to `rate`;
/// otherwise the target moves linearly from the inherited rate to `rate` over `duration`.
/// Times are offsets from the start of the run.
#[derive(Clone)]
pub struct LoadStep {
    rate: u64,
    duration: Duration,
    user: Arc<dyn UserBehavior>,

    start_time: Duration,
    end_time: Duration,
    base_rate: u64,
    slope: Option<f64>,
}

impl LoadStep {
    pub fn new(rate: u64, duration: Duration, user: Arc<dyn UserBehavior>) -> Self {
        Self {
            rate,
            duration,
            user,
            start_time: Duration::ZERO,
            end_time: duration,
            base_rate: 0,
            slope: None,
        }
    }

    /// Overrides the user behavior spawned while this step is active.
    pub fn with_user(&mut self, user: Arc<dyn UserBehavior>) -> &mut Self {
        self.user = user;
        self
    }

    pub fn rate(&self) -> u64 {
        self.rate
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn user(&self) -> &Arc<dyn UserBehavior> {
        &self.user
    }

    pub fn start_time(&self) -> Duration {
        self.start_time
    }

    pub fn end_time(&self) -> Duration {
        self.end_time
    }

    pub fn base_rate(&self) -> u64 {
        self.base_rate
    }

    pub fn activate(&mut self, now: Duration, inherited_rate: u64) {
        self.start_time = now;
        self.end_time = now.saturating_add(self.duration);
        self.base_rate = inherited_rate;
        self.slope = (self.rate > 0 && !self.duration.is_zero()).then(|| {
            (self.rate as f64 - inherited_rate as f64) / self.duration.as_secs_f64()
        });
    }

    pub fn is_complete(&self, now: Duration) -> bool {
        now >= self.end_time
    }

    /// Target rate for the one-second tick starting at `now`.
    ///
    /// The interpolation is evaluated at the end of that tick (`now + 1s`), and never moves past
    /// `rate`.
    pub fn target_rate(&self, now: Duration) -> u64 {
        if self.duration.is_zero() {
            return self.rate;
        }
        let Some(slope) = self.slope else {
            return self.base_rate;
        };

        let elapsed = now.saturating_add(Duration::from_secs(1)).as_secs_f64()
            - self.start_time.as_secs_f64();
        let interpolated = self.base_rate as f64 + (slope * elapsed).floor();
        let interpolated = interpolated.max(0.0) as u64;

        if slope >= 0.0 {
            interpolated.min(self.rate)
        } else {
            interpolated.max(self.rate)
        }
    }
}

impl fmt::Debug for LoadStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadStep")
            .field("rate", &self.rate)
            .field("duration", &self.duration)
            .field("user", &self.user.name())
            .field("start_time", &self.start_time)
            .field("end_time", &self.end_time)
            .field("base_rate", &self.base_rate)
            .finish()
    }
}
