//! # tasklink-stream — task event stream sessions
//!
//! Opens push channels to the task service and turns inbound frames into
//! ordered [`TaskEvent`](tasklink_protocol::TaskEvent)s.
//!
//! ## Module Overview
//!
//! - [`endpoint`] — socket URL derivation from the HTTP base endpoint
//! - [`session`] — StreamSession, SessionCloser, SessionState
//! - [`follow`] — follow-until-terminal helper with drain policies
//! - [`memory`] — in-process transport
//! - `websocket` — tokio-tungstenite transport (feature `websocket`)

use std::sync::Arc;

use tasklink_protocol::{FrameConnector, StreamLocator, TaskError, TaskHandle, TaskResult};
use tracing::instrument;
use url::Url;

pub mod endpoint;
pub mod follow;
pub mod memory;
pub mod session;
#[cfg(feature = "websocket")]
pub mod websocket;

pub use follow::{DrainPolicy, FollowOutcome, follow_until_terminal};
pub use memory::{MemoryConnector, MemoryPeer};
pub use session::{SessionCloser, SessionState, StreamSession};
#[cfg(feature = "websocket")]
pub use websocket::WebSocketConnector;

/// Events buffered per session ahead of a slow consumer.
pub const DEFAULT_STREAM_BUFFER: usize = 64;

/// Opens [`StreamSession`]s against one service endpoint.
///
/// Cheap to clone; sessions opened from the same connector are independent.
#[derive(Clone)]
pub struct StreamConnector {
    base_url: Url,
    transport: Arc<dyn FrameConnector>,
    buffer: usize,
}

impl StreamConnector {
    pub fn builder() -> StreamConnectorBuilder {
        StreamConnectorBuilder::default()
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn buffer(&self) -> usize {
        self.buffer
    }

    /// The socket URL a session for `locator` would connect to.
    pub fn stream_url(&self, locator: &StreamLocator) -> TaskResult<Url> {
        endpoint::stream_url(&self.base_url, locator)
    }

    /// Connect to the handle's stream.
    ///
    /// Fails with `InvalidLocator` before any I/O when the locator cannot be
    /// resolved, and with `Connection` when the handshake fails.
    #[instrument(skip(self, handle), fields(task_id = %handle.task_id()))]
    pub async fn open(&self, handle: TaskHandle) -> TaskResult<StreamSession> {
        let (task_id, locator) = handle.into_parts();
        let url = self.stream_url(&locator)?;
        StreamSession::connect(self.transport.as_ref(), task_id, url, self.buffer).await
    }
}

impl std::fmt::Debug for StreamConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamConnector")
            .field("base_url", &self.base_url.as_str())
            .field("buffer", &self.buffer)
            .finish_non_exhaustive()
    }
}

/// Builder for [`StreamConnector`]. A base URL and a transport are required.
#[derive(Default)]
pub struct StreamConnectorBuilder {
    base_url: Option<Url>,
    transport: Option<Arc<dyn FrameConnector>>,
    buffer: Option<usize>,
}

impl StreamConnectorBuilder {
    pub fn base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    pub fn transport(mut self, transport: impl FrameConnector + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    pub fn shared_transport(mut self, transport: Arc<dyn FrameConnector>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn buffer(mut self, buffer: usize) -> Self {
        self.buffer = Some(buffer);
        self
    }

    pub fn build(self) -> TaskResult<StreamConnector> {
        let base_url = self.base_url.ok_or_else(|| {
            TaskError::Configuration("stream connector needs a base URL".to_owned())
        })?;
        if endpoint::socket_scheme(base_url.scheme()).is_none() {
            return Err(TaskError::Configuration(format!(
                "base URL {base_url} must use http, https, ws, or wss"
            )));
        }
        let transport = self.transport.ok_or_else(|| {
            TaskError::Configuration("stream connector needs a frame transport".to_owned())
        })?;
        let buffer = self.buffer.unwrap_or(DEFAULT_STREAM_BUFFER);
        if buffer == 0 {
            return Err(TaskError::Configuration(
                "stream buffer must hold at least one event".to_owned(),
            ));
        }
        Ok(StreamConnector {
            base_url,
            transport,
            buffer,
        })
    }
}
