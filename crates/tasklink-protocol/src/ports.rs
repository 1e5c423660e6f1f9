//! Boundary ports between the streaming core and its collaborators.
//!
//! Object-safety note:
//! - Traits use `async-trait` for async dyn-dispatch.
//! - Streaming uses boxed trait objects (`TaskEventStream`).
//!
//! A frame transport is injected when a stream connector is built; there is
//! no implicit default.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use url::Url;

use crate::api::SubmitOptions;
use crate::error::TaskResult;
use crate::event::TaskEvent;
use crate::ids::TaskHandle;

pub type TaskEventStream = BoxStream<'static, TaskResult<TaskEvent>>;

/// One open, text-frame-oriented channel.
///
/// Implementations must make `recv` cancel-safe: dropping a pending `recv`
/// future must not lose a frame.
#[async_trait]
pub trait FrameTransport: Send {
    /// Next inbound text frame; `Ok(None)` once the peer closed cleanly.
    ///
    /// A decode error (see [`crate::TaskError::is_decode_error`]) rejects one frame
    /// only. The session reports it as an error event and keeps reading.
    async fn recv(&mut self) -> TaskResult<Option<String>>;

    /// Release the channel. Called at most once by the owning session.
    async fn close(&mut self) -> TaskResult<()>;
}

/// Opens frame transports. Fails with `TaskError::Connection` when the
/// handshake does not complete.
#[async_trait]
pub trait FrameConnector: Send + Sync {
    async fn connect(&self, url: &Url) -> TaskResult<Box<dyn FrameTransport>>;
}

/// Initiates a task and reports where its events stream.
#[async_trait]
pub trait TaskDispatcher: Send + Sync {
    async fn submit(&self, prompt: &str, options: &SubmitOptions) -> TaskResult<TaskHandle>;
}
