//! WebSocket frame transport on `tokio-tungstenite`.

use async_trait::async_trait;
use futures_util::StreamExt;
use tasklink_protocol::{FrameConnector, FrameTransport, TaskError, TaskResult, frame_text};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, instrument};
use url::Url;

/// Opens `ws://` and `wss://` connections. TLS runs on rustls with the
/// webpki root store.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FrameConnector for WebSocketConnector {
    #[instrument(skip(self), fields(url = %url))]
    async fn connect(&self, url: &Url) -> TaskResult<Box<dyn FrameTransport>> {
        if url.scheme() == "wss" {
            install_crypto_provider();
        }
        let (socket, response) = connect_async(url.as_str()).await.map_err(|error| {
            TaskError::Connection(format!("websocket handshake with {url} failed: {error}"))
        })?;
        debug!(status = %response.status(), "websocket handshake complete");
        Ok(Box::new(WebSocketTransport { socket }))
    }
}

/// Selects ring for rustls unless the process already chose a provider.
fn install_crypto_provider() {
    if rustls::crypto::CryptoProvider::get_default().is_none() {
        let _ = rustls::crypto::ring::default_provider().install_default();
    }
}

struct WebSocketTransport {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl FrameTransport for WebSocketTransport {
    async fn recv(&mut self) -> TaskResult<Option<String>> {
        loop {
            let Some(message) = self.socket.next().await else {
                return Ok(None);
            };
            match message {
                Ok(Message::Text(text)) => return Ok(Some(text.as_str().to_owned())),
                Ok(Message::Binary(bytes)) => return frame_text(bytes.to_vec()).map(Some),
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "peer sent close frame");
                    return Ok(None);
                }
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
                Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => return Ok(None),
                Err(error) => return Err(TaskError::Connection(error.to_string())),
            }
        }
    }

    async fn close(&mut self) -> TaskResult<()> {
        match self.socket.close(None).await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(error) => Err(TaskError::Connection(error.to_string())),
        }
    }
}
