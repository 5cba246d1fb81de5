use std::borrow::Cow;
use std::fmt;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use cyklop_http::{HttpClient, HttpRequest, HttpResponse, resolve_url};

use crate::runner::{Collector, RequestResult, Status};

/// Request timeout when none is set on the request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP session of one virtual user.
///
/// Every request issued through it produces exactly one [`RequestResult`] in the collector.
/// Clones share the connection pool and the collector.
#[derive(Clone)]
pub struct UserClient {
    http: HttpClient,
    collector: Arc<Collector>,
    user: Arc<str>,
    base_url: Option<Arc<str>>,
    headers: Arc<[(String, String)]>,
}

impl UserClient {
    pub fn new(http: HttpClient, collector: Arc<Collector>, user: impl Into<Arc<str>>) -> Self {
        Self {
            http,
            collector,
            user: user.into(),
            base_url: None,
            headers: Arc::from(Vec::new()),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: Option<&str>) -> Self {
        self.base_url = base_url.filter(|s| !s.is_empty()).map(Arc::from);
        self
    }

    #[must_use]
    pub fn with_headers(mut self, headers: Arc<[(String, String)]>) -> Self {
        self.headers = headers;
        self
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    pub fn collector(&self) -> &Arc<Collector> {
        &self.collector
    }

    pub fn request(&self, method: http::Method, target: impl Into<String>) -> Request {
        Request {
            client: self.clone(),
            method,
            target: target.into(),
            name: None,
            headers: Vec::new(),
            body: Bytes::new(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn get(&self, target: impl Into<String>) -> Request {
        self.request(http::Method::GET, target)
    }

    pub fn post(&self, target: impl Into<String>) -> Request {
        self.request(http::Method::POST, target)
    }

    pub fn put(&self, target: impl Into<String>) -> Request {
        self.request(http::Method::PUT, target)
    }

    pub fn delete(&self, target: impl Into<String>) -> Request {
        self.request(http::Method::DELETE, target)
    }
}

impl fmt::Debug for UserClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserClient")
            .field("user", &self.user)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// A request under construction; `.await` it to send.
///
/// The result name defaults to the request target as written (before base-URL resolution).
#[must_use = "requests do nothing unless awaited"]
#[derive(Debug)]
pub struct Request {
    client: UserClient,
    method: http::Method,
    target: String,
    name: Option<String>,
    headers: Vec<(String, String)>,
    body: Bytes,
    timeout: Duration,
}

impl Request {
    /// Name recorded in the result instead of the target.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn send(self) -> Response {
        let Request {
            client,
            method,
            target,
            name,
            headers,
            body,
            timeout,
        } = self;

        let url = resolve_url(client.base_url.as_deref(), &target);
        let name = name.unwrap_or(target);

        let mut req = HttpRequest::new(method, url);
        req.headers = merge_request_headers(&client.headers, headers);
        req.body = body;
        req.timeout = Some(timeout);

        client.collector.start_request();
        let mut in_flight = InFlight {
            result: Some(RequestResult::begin(name, client.user.clone())),
            collector: client.collector.clone(),
        };

        let outcome = client.http.request(req).await;
        let mut result = in_flight.result.take();
        let inner = match outcome {
            Ok(res) => Some(res),
            Err(err) => {
                tracing::debug!(
                    user = %client.user,
                    name = result.as_ref().map(RequestResult::name),
                    kind = %err.transport_error_kind(),
                    error = %err,
                    "request failed"
                );
                if let Some(r) = result.as_mut() {
                    r.set_error(err.describe());
                }
                None
            }
        };
        if let Some(r) = result.as_mut() {
            r.finish();
        }

        Response {
            inner,
            result,
            collector: client.collector,
        }
    }
}

/// Result of a request whose future has not completed yet. If the future is dropped mid-flight
/// the result is submitted as `ERROR`, so every counted request still produces one result.
struct InFlight {
    result: Option<RequestResult>,
    collector: Arc<Collector>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if let Some(mut result) = self.result.take() {
            result.set_error("cancelled");
            result.finish();
            self.collector.stop_request(result);
        }
    }
}

impl IntoFuture for Request {
    type Output = Response;
    type IntoFuture = Pin<Box<dyn Future<Output = Response> + Send + 'static>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.send())
    }
}

/// Session headers first, then request headers; a request header replaces a session header of
/// the same name.
fn merge_request_headers(
    session: &[(String, String)],
    request: Vec<(String, String)>,
) -> Vec<(String, String)> {
    let mut merged: Vec<(String, String)> = session
        .iter()
        .filter(|(k, _)| !request.iter().any(|(rk, _)| rk.eq_ignore_ascii_case(k)))
        .cloned()
        .collect();
    merged.extend(request);
    merged
}

/// Outcome of an awaited [`Request`].
///
/// Holds the request's pending result. Validation helpers may downgrade it; it is handed to the
/// collector when the response is dropped or [`finish`](Response::finish)ed.
pub struct Response {
    inner: Option<HttpResponse>,
    result: Option<RequestResult>,
    collector: Arc<Collector>,
}

impl Response {
    /// HTTP status code; `None` when the request failed at the transport level.
    pub fn status(&self) -> Option<u16> {
        self.inner.as_ref().map(|r| r.status)
    }

    pub fn is_transport_error(&self) -> bool {
        self.inner.is_none()
    }

    /// Response headers, names lowercased.
    pub fn headers(&self) -> &[(String, String)] {
        self.inner
            .as_ref()
            .map(|r| r.headers.as_slice())
            .unwrap_or_default()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner.as_ref().and_then(|r| r.header(name))
    }

    pub fn body(&self) -> &[u8] {
        self.inner
            .as_ref()
            .map(|r| &r.body[..])
            .unwrap_or_default()
    }

    /// Declared charset of the body, `utf-8` when the response doesn't declare one.
    pub fn encoding(&self) -> String {
        self.inner
            .as_ref()
            .and_then(HttpResponse::charset)
            .map_or_else(|| "utf-8".to_string(), str::to_ascii_lowercase)
    }

    /// Body decoded with [`encoding`](Response::encoding). Latin-1 is decoded byte-per-char;
    /// anything else is read as UTF-8 with invalid sequences replaced.
    pub fn text(&self) -> Cow<'_, str> {
        let body = self.body();
        match self.encoding().as_str() {
            "iso-8859-1" | "latin1" | "latin-1" => {
                Cow::Owned(body.iter().map(|&b| char::from(b)).collect())
            }
            _ => String::from_utf8_lossy(body),
        }
    }

    pub fn result(&self) -> Option<&RequestResult> {
        self.result.as_ref()
    }

    pub fn result_status(&self) -> Status {
        self.result.as_ref().map_or(Status::Success, RequestResult::status)
    }

    /// Marks the result `FAILED` unless the status code is one of `expected`.
    ///
    /// Returns whether the status matched. A transport error never matches and keeps its
    /// `ERROR` status.
    pub fn verify_status(&mut self, expected: &[u16]) -> bool {
        let Some(status) = self.status() else {
            return false;
        };
        if expected.contains(&status) {
            return true;
        }
        tracing::debug!(
            name = self.result.as_ref().map(RequestResult::name),
            status,
            ?expected,
            "unexpected status"
        );
        self.fail();
        false
    }

    /// Marks the result `FAILED` unless header `name` equals `value` (case-sensitive value,
    /// case-insensitive name).
    pub fn verify_header(&mut self, name: &str, value: &str) -> bool {
        if self.is_transport_error() {
            return false;
        }
        let actual = self.header(name);
        if actual == Some(value) {
            return true;
        }
        tracing::debug!(
            name = self.result.as_ref().map(RequestResult::name),
            header = name,
            expected = value,
            actual,
            "unexpected header"
        );
        self.fail();
        false
    }

    /// Marks the result `FAILED`. A validation failure carries no error text.
    /// Returns `false` if it was already downgraded.
    pub fn fail(&mut self) -> bool {
        self.result.as_mut().is_some_and(|r| r.fail(None))
    }

    /// Hands the result to the collector now instead of on drop.
    pub fn finish(mut self) {
        self.submit();
    }

    fn submit(&mut self) {
        if let Some(result) = self.result.take() {
            self.collector.stop_request(result);
        }
    }
}

impl Drop for Response {
    fn drop(&mut self) {
        self.submit();
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status())
            .field("body_len", &self.body().len())
            .field("result", &self.result)
            .finish()
    }
}
