use std::time::Duration;

use bytes::Bytes;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    /// Response headers (lowercased header names). Multiple values are joined with ", ".
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// `charset` parameter of the `content-type` header, if declared.
    pub fn charset(&self) -> Option<&str> {
        let content_type = self.header("content-type")?;
        content_type.split(';').skip(1).find_map(|param| {
            let (k, v) = param.split_once('=')?;
            k.trim()
                .eq_ignore_ascii_case("charset")
                .then(|| v.trim().trim_matches('"'))
        })
    }

    pub fn body_utf8(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: http::Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: http::Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: Bytes::new(),
            timeout: None,
        }
    }

    pub fn get(url: &str) -> Self {
        Self::new(http::Method::GET, url)
    }

    pub fn post(url: &str, body: Bytes) -> Self {
        Self {
            body,
            ..Self::new(http::Method::POST, url)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(content_type: &str) -> HttpResponse {
        HttpResponse {
            status: 200,
            headers: vec![("content-type".to_string(), content_type.to_string())],
            body: Bytes::from_static(b"ok"),
        }
    }

    #[test]
    fn charset_is_read_from_content_type() {
        assert_eq!(
            response("text/plain; charset=ISO-8859-1").charset(),
            Some("ISO-8859-1")
        );
        assert_eq!(
            response("text/html;charset=\"utf-8\"").charset(),
            Some("utf-8")
        );
        assert_eq!(response("application/json").charset(), None);
    }

    #[test]
    fn header_lookup_ignores_case() {
        let res = response("text/plain");
        assert_eq!(res.header("Content-Type"), Some("text/plain"));
        assert_eq!(res.header("x-missing"), None);
    }
}
