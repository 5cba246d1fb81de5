use serde::{Deserialize, Serialize};

use super::result::Status;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    #[serde(rename = "OK")]
    pub success: u64,
    #[serde(rename = "FAILED")]
    pub failure: u64,
    #[serde(rename = "ERROR")]
    pub error: u64,
}

impl StatusCounts {
    pub fn get(&self, status: Status) -> u64 {
        match status {
            Status::Success => self.success,
            Status::Failure => self.failure,
            Status::Error => self.error,
        }
    }

    pub fn incr(&mut self, status: Status) {
        let slot = match status {
            Status::Success => &mut self.success,
            Status::Failure => &mut self.failure,
            Status::Error => &mut self.error,
        };
        *slot = slot.saturating_add(1);
    }

    pub fn sum(&self) -> u64 {
        self.success
            .saturating_add(self.failure)
            .saturating_add(self.error)
    }
}

/// One set of collector counters: a one-second window or the whole-run total.
///
/// `active_users` is signed because a window may see more users finish than start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub active_users: i64,
    pub users_done: u64,
    pub requests_sent: u64,
    pub requests_done: u64,
    pub responses: StatusCounts,
}

impl Counters {
    pub(crate) fn user_started(&mut self) {
        self.active_users = self.active_users.saturating_add(1);
    }

    pub(crate) fn user_stopped(&mut self) {
        self.active_users = self.active_users.saturating_sub(1);
        self.users_done = self.users_done.saturating_add(1);
    }

    pub(crate) fn request_started(&mut self) {
        self.requests_sent = self.requests_sent.saturating_add(1);
    }

    pub(crate) fn request_done(&mut self, status: Status) {
        self.requests_done = self.requests_done.saturating_add(1);
        self.responses.incr(status);
    }
}

/// `current`/`previous` one-second windows plus the never-reset `total`.
#[derive(Debug, Clone, Default)]
pub(crate) struct Windows {
    pub current: Counters,
    pub previous: Counters,
    pub total: Counters,
}

impl Windows {
    pub fn apply(&mut self, f: impl Fn(&mut Counters)) {
        f(&mut self.current);
        f(&mut self.total);
    }

    /// `previous = current; current = fresh`.
    pub fn rotate(&mut self) {
        self.previous = std::mem::take(&mut self.current);
    }
}
