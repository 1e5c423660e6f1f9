//! Client configuration.

use std::time::Duration;

use tasklink_protocol::{TaskError, TaskResult};
use tasklink_stream::DEFAULT_STREAM_BUFFER;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8801";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Where the task service lives and how long REST calls may take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: Url,
    pub timeout: Duration,
    /// Events buffered per stream session.
    pub stream_buffer: usize,
}

impl ClientConfig {
    /// Parse and normalize `base_url`: `http(s)` only, trailing slash,
    /// query and fragment removed. [`DEFAULT_BASE_URL`] is the local console.
    pub fn new(base_url: &str) -> TaskResult<Self> {
        let mut url = Url::parse(base_url.trim())
            .map_err(|error| TaskError::Configuration(format!("base URL {base_url}: {error}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(TaskError::Configuration(format!(
                "base URL {base_url} must use http or https"
            )));
        }
        let path = url.path().trim_end_matches('/').to_owned();
        url.set_path(&path);
        url.set_query(None);
        url.set_fragment(None);
        Ok(Self {
            base_url: url,
            timeout: DEFAULT_TIMEOUT,
            stream_buffer: DEFAULT_STREAM_BUFFER,
        })
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn stream_buffer(mut self, stream_buffer: usize) -> Self {
        self.stream_buffer = stream_buffer;
        self
    }
}
