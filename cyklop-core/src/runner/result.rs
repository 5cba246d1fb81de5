use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::counters::Counters;

/// First character of a per-second snapshot line in the results file.
pub const SNAPSHOT_MARKER: char = '@';

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
)]
pub enum Status {
    #[strum(serialize = "OK")]
    Success,
    #[strum(serialize = "FAILED")]
    Failure,
    #[strum(serialize = "ERROR")]
    Error,
}

impl Status {
    pub const ALL: [Status; 3] = [Status::Success, Status::Failure, Status::Error];
}

/// Outcome of one request issued by a virtual user.
///
/// Starts out optimistic (`Success`) and may be downgraded exactly once, to `Failure` by response
/// validation or to `Error` by the transport. After `finish` it is handed to the collector.
#[derive(Debug, Clone)]
pub struct RequestResult {
    name: Arc<str>,
    user: Arc<str>,
    start: Instant,
    end: Instant,
    status: Status,
    error: Option<String>,
}

impl RequestResult {
    pub fn begin(name: impl Into<Arc<str>>, user: Arc<str>) -> Self {
        let now = Instant::now();
        Self {
            name: name.into(),
            user,
            start: now,
            end: now,
            status: Status::Success,
            error: None,
        }
    }

    /// Builds an already-finished result, e.g. for replaying recorded outcomes.
    pub fn from_parts(
        name: impl Into<Arc<str>>,
        user: Arc<str>,
        start: Instant,
        end: Instant,
        status: Status,
        error: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            user,
            start,
            end: end.max(start),
            status,
            error,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn start(&self) -> Instant {
        self.start
    }

    pub fn end(&self) -> Instant {
        self.end
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    pub fn latency(&self) -> Duration {
        self.end.saturating_duration_since(self.start)
    }

    /// Downgrades to `Failure`. Returns `false` if the status was already downgraded.
    pub fn fail(&mut self, error: Option<String>) -> bool {
        self.downgrade(Status::Failure, error)
    }

    /// Downgrades to `Error`. Returns `false` if the status was already downgraded.
    pub fn set_error(&mut self, error: impl Into<String>) -> bool {
        self.downgrade(Status::Error, Some(error.into()))
    }

    pub fn finish(&mut self) {
        self.end = Instant::now().max(self.start);
    }

    fn downgrade(&mut self, status: Status, error: Option<String>) -> bool {
        if self.status != Status::Success {
            return false;
        }
        self.status = status;
        self.error = error;
        true
    }
}

/// Renders `<user> <name> <start> <end> <status>[ <error>]`.
///
/// Timestamps are seconds since `epoch`. `user` and `name` are escaped with [`escape_token`] so
/// the line stays splittable on spaces; line breaks in the error message are flattened.
pub fn format_line(result: &RequestResult, epoch: Instant) -> String {
    let start = result.start.saturating_duration_since(epoch).as_secs_f64();
    let end = result.end.saturating_duration_since(epoch).as_secs_f64();

    let mut line = format!(
        "{} {} {start:.6} {end:.6} {}",
        escape_token(&result.user),
        escape_token(&result.name),
        result.status
    );
    if let Some(err) = &result.error {
        line.push(' ');
        line.push_str(&err.replace(['\r', '\n'], " "));
    }
    line.truncate(line.trim_end().len());
    line
}

/// Reversible encoding of a `user`/`name` field.
///
/// Backslash and whitespace are written as `\\`, `\s`, `\t`, `\n`, `\r` or `\u{hex}`. An empty
/// string is written as `-` and a literal `-` as `\-`.
pub fn escape_token(s: &str) -> Cow<'_, str> {
    if s.is_empty() {
        return Cow::Borrowed("-");
    }
    if s == "-" {
        return Cow::Borrowed("\\-");
    }
    if !s.chars().any(|c| c == '\\' || c.is_whitespace()) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ' ' => out.push_str("\\s"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c if c.is_whitespace() => out.push_str(&format!("\\u{{{:x}}}", u32::from(c))),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Inverse of [`escape_token`]; `None` on a malformed escape.
pub fn unescape_token(s: &str) -> Option<String> {
    if s == "-" {
        return Some(String::new());
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            '\\' => out.push('\\'),
            's' => out.push(' '),
            't' => out.push('\t'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            '-' => out.push('-'),
            'u' => {
                if chars.next()? != '{' {
                    return None;
                }
                let hex: String = chars.by_ref().take_while(|&c| c != '}').collect();
                let code = u32::from_str_radix(&hex, 16).ok()?;
                out.push(char::from_u32(code)?);
            }
            _ => return None,
        }
    }
    Some(out)
}

/// Cumulative totals written once per second, prefixed with [`SNAPSHOT_MARKER`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Seconds since the collector was opened.
    pub elapsed: f64,
    #[serde(flatten)]
    pub totals: Counters,
}

impl Snapshot {
    pub fn to_line(&self) -> serde_json::Result<String> {
        Ok(format!("{SNAPSHOT_MARKER}{}", serde_json::to_string(self)?))
    }
}

/// A per-request line parsed back from the results file.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultLine {
    pub user: String,
    pub name: String,
    pub start: f64,
    pub end: f64,
    pub status: Status,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResultsLine {
    Request(ResultLine),
    Snapshot(Snapshot),
}

#[derive(Debug, thiserror::Error)]
pub enum ParseLineError {
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("invalid timestamp `{0}`")]
    InvalidTimestamp(String),

    #[error("invalid status `{0}`")]
    InvalidStatus(String),

    #[error("invalid escape in `{0}`")]
    InvalidEscape(String),

    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(#[from] serde_json::Error),
}

pub fn parse_line(line: &str) -> std::result::Result<ResultsLine, ParseLineError> {
    let line = line.trim_end();
    if let Some(json) = line.strip_prefix(SNAPSHOT_MARKER) {
        return Ok(ResultsLine::Snapshot(serde_json::from_str(json)?));
    }

    let mut parts = line.splitn(6, ' ');
    let mut field = |name: &'static str| {
        parts
            .next()
            .filter(|s| !s.is_empty())
            .ok_or(ParseLineError::MissingField(name))
    };

    let user = unescape_field(field("user")?)?;
    let name = unescape_field(field("name")?)?;
    let start = parse_timestamp(field("start")?)?;
    let end = parse_timestamp(field("end")?)?;
    let status_raw = field("status")?;
    let status = status_raw
        .parse::<Status>()
        .map_err(|_| ParseLineError::InvalidStatus(status_raw.to_string()))?;
    let error = parts.next().map(str::to_string);

    Ok(ResultsLine::Request(ResultLine {
        user,
        name,
        start,
        end,
        status,
        error,
    }))
}

fn unescape_field(raw: &str) -> std::result::Result<String, ParseLineError> {
    unescape_token(raw).ok_or_else(|| ParseLineError::InvalidEscape(raw.to_string()))
}

fn parse_timestamp(raw: &str) -> std::result::Result<f64, ParseLineError> {
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ParseLineError::InvalidTimestamp(raw.to_string()))
}
