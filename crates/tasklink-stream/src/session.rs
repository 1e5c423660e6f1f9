//! One live subscription to a task's event stream.
//!
//! A session owns its transport through a reader task. The reader decodes
//! frames in arrival order and hands them to the consumer over a bounded
//! queue, so a slow consumer applies backpressure to the socket instead of
//! growing memory. Closing is cooperative: a watch signal wakes both the
//! reader and any pending `next`.

use std::fmt;
use std::sync::Arc;

use async_stream::stream;
use parking_lot::Mutex;
use tasklink_protocol::{
    ErrorEvent, FrameConnector, FrameTransport, TaskError, TaskEvent, TaskEventStream, TaskId,
    TaskResult, decode,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, instrument, warn};
use url::Url;

/// Lifecycle of a [`StreamSession`].
///
/// `Connecting` only exists while the handshake runs inside
/// [`StreamSession::connect`]; callers observe `Open`, `Closed`, or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Connecting,
    Open,
    Closed,
    Failed,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Failed => "failed",
        }
    }

    /// `Closed` is absorbing and reachable from anywhere. `Failed` can only
    /// move on to `Closed`.
    fn advance(self, next: Self) -> Self {
        match (self, next) {
            (Self::Closed, _) | (_, Self::Closed) => Self::Closed,
            (Self::Failed, _) => Self::Failed,
            (_, next) => next,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type SharedState = Arc<Mutex<SessionState>>;

fn advance(state: &SharedState, next: SessionState) -> SessionState {
    let mut guard = state.lock();
    *guard = guard.advance(next);
    *guard
}

/// Closes a session from any task, including while another task is
/// suspended in [`StreamSession::next`].
#[derive(Debug, Clone)]
pub struct SessionCloser {
    signal: Arc<watch::Sender<bool>>,
    state: SharedState,
}

impl SessionCloser {
    /// Idempotent. The pending or next `next` call returns `Ok(None)`.
    pub fn close(&self) {
        advance(&self.state, SessionState::Closed);
        self.signal.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.signal.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.signal.subscribe()
    }
}

async fn close_requested(signal: &mut watch::Receiver<bool>) {
    // A dropped sender counts as a close request.
    let _ = signal.wait_for(|closed| *closed).await;
}

#[derive(Debug)]
enum Delivery {
    Event(TaskEvent),
    Failed(TaskError),
}

/// A live subscription to one task's event stream.
///
/// `next` takes `&mut self`, so a session has exactly one reader. Dropping
/// the session signals the reader task to release the transport.
pub struct StreamSession {
    task_id: TaskId,
    url: Url,
    state: SharedState,
    deliveries: mpsc::Receiver<Delivery>,
    closer: SessionCloser,
    reader: Option<JoinHandle<()>>,
}

impl StreamSession {
    /// Open a transport to `url` and start delivering events for `task_id`.
    ///
    /// `buffer` bounds the number of decoded events held for a slow
    /// consumer.
    #[instrument(skip(connector, task_id, url), fields(task_id = %task_id, url = %url))]
    pub async fn connect(
        connector: &dyn FrameConnector,
        task_id: TaskId,
        url: Url,
        buffer: usize,
    ) -> TaskResult<Self> {
        let state: SharedState = Arc::new(Mutex::new(SessionState::Connecting));
        let transport = match connector.connect(&url).await {
            Ok(transport) => transport,
            Err(error) => {
                advance(&state, SessionState::Failed);
                warn!(%error, "stream handshake failed");
                return Err(match error {
                    TaskError::Connection(_) => error,
                    other => TaskError::Connection(other.to_string()),
                });
            }
        };
        advance(&state, SessionState::Open);

        let (signal, _) = watch::channel(false);
        let closer = SessionCloser {
            signal: Arc::new(signal),
            state: state.clone(),
        };
        let (sender, deliveries) = mpsc::channel(buffer.max(1));
        let span = info_span!("stream_reader", task_id = %task_id);
        let reader = tokio::spawn(
            read_frames(transport, sender, closer.subscribe(), state.clone()).instrument(span),
        );
        info!("stream session open");

        Ok(Self {
            task_id,
            url,
            state,
            deliveries,
            closer,
            reader: Some(reader),
        })
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub fn is_closed(&self) -> bool {
        self.closer.is_closed()
    }

    /// A handle that closes this session from another task.
    pub fn closer(&self) -> SessionCloser {
        self.closer.clone()
    }

    /// Next event in arrival order.
    ///
    /// Returns `Ok(None)` once the session was closed or the peer ended the
    /// stream and every buffered event was delivered. A transport failure is
    /// returned once as `Err(TaskError::Connection)`; later calls return
    /// `Ok(None)`. Frames that fail to decode arrive as `TaskEvent::Error`.
    pub async fn next(&mut self) -> TaskResult<Option<TaskEvent>> {
        if self.closer.is_closed() {
            return Ok(None);
        }
        let mut closed = self.closer.subscribe();
        tokio::select! {
            biased;
            () = close_requested(&mut closed) => Ok(None),
            delivery = self.deliveries.recv() => match delivery {
                Some(Delivery::Event(event)) => Ok(Some(event)),
                Some(Delivery::Failed(error)) => Err(error),
                None => Ok(None),
            },
        }
    }

    /// Stop delivery and release the transport. Idempotent.
    pub async fn close(&mut self) {
        self.closer.close();
        if let Some(reader) = self.reader.take() {
            if let Err(error) = reader.await {
                warn!(task_id = %self.task_id, %error, "stream reader ended abnormally");
            }
            info!(task_id = %self.task_id, "stream session closed");
        }
    }

    /// Adapt the session into a `Stream` that ends after the last event or
    /// the first transport error, closing the session either way.
    pub fn into_event_stream(mut self) -> TaskEventStream {
        Box::pin(stream! {
            loop {
                match self.next().await {
                    Ok(Some(event)) => yield Ok(event),
                    Ok(None) => break,
                    Err(error) => {
                        yield Err(error);
                        break;
                    }
                }
            }
            self.close().await;
        })
    }
}

impl fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSession")
            .field("task_id", &self.task_id)
            .field("url", &self.url.as_str())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.closer.close();
    }
}

fn decode_frame(frame: &str) -> TaskEvent {
    match decode(frame) {
        Ok(event) => {
            debug!(kind = event.kind(), "frame decoded");
            event
        }
        Err(error) => {
            warn!(%error, frame_len = frame.len(), "undecodable frame");
            TaskEvent::Error(ErrorEvent::undecodable(&error, frame))
        }
    }
}

async fn read_frames(
    mut transport: Box<dyn FrameTransport>,
    deliveries: mpsc::Sender<Delivery>,
    mut closed: watch::Receiver<bool>,
    state: SharedState,
) {
    loop {
        let received = tokio::select! {
            biased;
            () = close_requested(&mut closed) => break,
            received = transport.recv() => received,
        };
        let delivery = match received {
            Ok(Some(frame)) => Delivery::Event(decode_frame(&frame)),
            Ok(None) => {
                debug!("peer ended the stream");
                advance(&state, SessionState::Closed);
                break;
            }
            Err(error) if error.is_decode_error() => {
                warn!(%error, "undecodable frame");
                Delivery::Event(TaskEvent::Error(ErrorEvent::undecodable(&error, "")))
            }
            Err(error) => {
                warn!(%error, "stream transport failed");
                advance(&state, SessionState::Failed);
                Delivery::Failed(error)
            }
        };
        let failed = matches!(delivery, Delivery::Failed(_));
        let sent = tokio::select! {
            biased;
            () = close_requested(&mut closed) => break,
            sent = deliveries.send(delivery) => sent,
        };
        if sent.is_err() || failed {
            break;
        }
    }
    if let Err(error) = transport.close().await {
        debug!(%error, "transport close reported an error");
    }
}
