//! Derives socket URLs from the service's HTTP base endpoint.

use tasklink_protocol::{StreamLocator, TaskError, TaskResult};
use url::Url;

/// Socket scheme matching an HTTP(S) or WS(S) scheme.
pub fn socket_scheme(scheme: &str) -> Option<&'static str> {
    match scheme {
        "https" | "wss" => Some("wss"),
        "http" | "ws" => Some("ws"),
        _ => None,
    }
}

/// Resolve `locator` against `base`.
///
/// Path locators keep the base host and port, take the socket scheme that
/// matches the base scheme, and replace the base path and query. Absolute
/// locators are used as given, with `http(s)` upgraded to `ws(s)`.
pub fn stream_url(base: &Url, locator: &StreamLocator) -> TaskResult<Url> {
    let raw = locator.as_str().trim();
    if raw.is_empty() {
        return Err(TaskError::InvalidLocator("locator is empty".to_owned()));
    }

    if raw.contains("://") {
        let mut url = Url::parse(raw)
            .map_err(|error| TaskError::InvalidLocator(format!("{raw}: {error}")))?;
        upgrade_scheme(&mut url)?;
        return Ok(url);
    }

    if base.host_str().is_none() {
        return Err(TaskError::InvalidLocator(format!(
            "base endpoint {base} has no host"
        )));
    }

    let mut url = base.clone();
    upgrade_scheme(&mut url)?;
    let (path, query) = match raw.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (raw, None),
    };
    if path.starts_with('/') {
        url.set_path(path);
    } else {
        url.set_path(&format!("/{path}"));
    }
    url.set_query(query);
    url.set_fragment(None);
    Ok(url)
}

fn upgrade_scheme(url: &mut Url) -> TaskResult<()> {
    let scheme = socket_scheme(url.scheme()).ok_or_else(|| {
        TaskError::InvalidLocator(format!("unsupported scheme `{}` in {url}", url.scheme()))
    })?;
    if url.scheme() != scheme {
        url.set_scheme(scheme)
            .map_err(|()| TaskError::InvalidLocator(format!("cannot switch {url} to {scheme}")))?;
    }
    Ok(())
}
