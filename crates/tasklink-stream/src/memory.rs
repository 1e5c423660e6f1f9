//! In-process frame transport.
//!
//! `MemoryConnector` hands out channel-backed transports keyed by URL path.
//! Tests and embedders push frames through the matching [`MemoryPeer`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tasklink_protocol::{FrameConnector, FrameTransport, TaskError, TaskResult, frame_text};
use tokio::sync::mpsc;
use tracing::debug;
use url::Url;

#[derive(Debug)]
enum MemoryFrame {
    Text(String),
    Binary(Vec<u8>),
    Fail(String),
}

/// Routes connections to in-process peers by URL path.
///
/// Each route accepts exactly one connection; connecting to an unknown or
/// already-claimed path fails the handshake.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    routes: Arc<Mutex<HashMap<String, mpsc::Receiver<MemoryFrame>>>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a peer for `path`. `capacity` bounds frames queued ahead of
    /// the session's reader.
    pub fn route(&self, path: impl Into<String>, capacity: usize) -> MemoryPeer {
        let (frames, receiver) = mpsc::channel(capacity.max(1));
        self.routes.lock().insert(path.into(), receiver);
        MemoryPeer { frames }
    }
}

#[async_trait]
impl FrameConnector for MemoryConnector {
    async fn connect(&self, url: &Url) -> TaskResult<Box<dyn FrameTransport>> {
        let frames = self
            .routes
            .lock()
            .remove(url.path())
            .ok_or_else(|| TaskError::Connection(format!("no peer listening at {url}")))?;
        debug!(%url, "memory transport connected");
        Ok(Box::new(MemoryTransport { frames }))
    }
}

/// The server side of a memory route.
#[derive(Debug)]
pub struct MemoryPeer {
    frames: mpsc::Sender<MemoryFrame>,
}

impl MemoryPeer {
    /// Queue one text frame. Fails once the session released the transport.
    pub async fn send_text(&self, frame: impl Into<String>) -> TaskResult<()> {
        self.push(MemoryFrame::Text(frame.into())).await
    }

    /// Queue one binary frame. Its bytes must be UTF-8 to decode.
    pub async fn send_binary(&self, frame: impl Into<Vec<u8>>) -> TaskResult<()> {
        self.push(MemoryFrame::Binary(frame.into())).await
    }

    /// Make the session's next receive fail with `TaskError::Connection`.
    pub async fn fail(&self, reason: impl Into<String>) -> TaskResult<()> {
        self.push(MemoryFrame::Fail(reason.into())).await
    }

    /// End the stream cleanly after the queued frames.
    pub fn hang_up(self) {}

    pub fn is_released(&self) -> bool {
        self.frames.is_closed()
    }

    /// Resolves once the session released the transport.
    pub async fn released(&self) {
        self.frames.closed().await;
    }

    async fn push(&self, frame: MemoryFrame) -> TaskResult<()> {
        self.frames
            .send(frame)
            .await
            .map_err(|_| TaskError::Connection("transport released by the session".to_owned()))
    }
}

struct MemoryTransport {
    frames: mpsc::Receiver<MemoryFrame>,
}

#[async_trait]
impl FrameTransport for MemoryTransport {
    async fn recv(&mut self) -> TaskResult<Option<String>> {
        match self.frames.recv().await {
            Some(MemoryFrame::Text(frame)) => Ok(Some(frame)),
            Some(MemoryFrame::Binary(bytes)) => frame_text(bytes).map(Some),
            Some(MemoryFrame::Fail(reason)) => Err(TaskError::Connection(reason)),
            None => Ok(None),
        }
    }

    async fn close(&mut self) -> TaskResult<()> {
        self.frames.close();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use super::*;

    #[tokio::test]
    async fn routes_accept_a_single_connection() -> Result<()> {
        let connector = MemoryConnector::new();
        let _peer = connector.route("/api/tasks/t-1/stream", 4);
        let url = Url::parse("ws://localhost/api/tasks/t-1/stream")?;

        assert!(connector.connect(&url).await.is_ok());
        assert!(matches!(
            connector.connect(&url).await,
            Err(TaskError::Connection(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn transport_relays_frames_failures_and_hang_up() -> Result<()> {
        let connector = MemoryConnector::new();
        let peer = connector.route("/s", 4);
        let mut transport = connector.connect(&Url::parse("ws://localhost/s")?).await?;

        peer.send_text("one").await?;
        assert_eq!(transport.recv().await?, Some("one".to_owned()));

        peer.send_binary(b"two".to_vec()).await?;
        assert_eq!(transport.recv().await?, Some("two".to_owned()));
        peer.send_binary(vec![0xff]).await?;
        assert!(matches!(
            transport.recv().await,
            Err(TaskError::MalformedFrame(_))
        ));

        peer.fail("reset").await?;
        assert_eq!(
            transport.recv().await,
            Err(TaskError::Connection("reset".to_owned()))
        );

        peer.hang_up();
        assert_eq!(transport.recv().await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn closing_the_transport_releases_the_peer() -> Result<()> {
        let connector = MemoryConnector::new();
        let peer = connector.route("/s", 4);
        let mut transport = connector.connect(&Url::parse("ws://localhost/s")?).await?;

        assert!(!peer.is_released());
        transport.close().await?;
        assert!(peer.is_released());
        assert!(peer.send_text("late").await.is_err());
        Ok(())
    }
}
