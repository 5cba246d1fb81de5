pub(super) fn has_header(headers: &[(String, String)], name: &str) -> bool {
    headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
}

pub(super) fn host_header_value(parsed: &url::Url) -> Option<String> {
    let host = parsed.host_str()?;
    match parsed.port() {
        Some(port) => Some(format!("{host}:{port}")),
        None => Some(host.to_string()),
    }
}

/// Joins `target` onto `base_url` unless `target` is already an absolute URL.
pub fn resolve_url(base_url: Option<&str>, target: &str) -> String {
    if url::Url::parse(target).is_ok() {
        return target.to_string();
    }

    match base_url {
        Some(base) if !base.is_empty() => {
            let base = base.trim_end_matches('/');
            if target.is_empty() {
                base.to_string()
            } else if target.starts_with('/') {
                format!("{base}{target}")
            } else {
                format!("{base}/{target}")
            }
        }
        _ => target.to_string(),
    }
}
