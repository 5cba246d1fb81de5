#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,

    /// The run completed but at least one request ended as `FAILED` or `ERROR`.
    RequestsFailed = 10,

    /// The scenario file parsed but does not describe a runnable scenario (unknown users,
    /// no steps, bad step shapes).
    ScenarioError = 20,

    /// Invalid CLI flags or an unreadable/unparseable scenario file.
    InvalidInput = 30,

    /// Internal/runtime error (IO errors while running, unexpected invariants).
    RuntimeError = 40,

    /// The operator interrupted the run (Ctrl-C).
    Interrupted = 130,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    #[must_use]
    pub fn from_failed_requests(failed: u64) -> Self {
        if failed == 0 {
            Self::Success
        } else {
            Self::RequestsFailed
        }
    }
}
