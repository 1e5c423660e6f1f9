//! Submission plus streaming behind one handle.

use tasklink_protocol::api::SubmitOptions;
use tasklink_protocol::{
    FrameConnector, StreamLocator, TaskDispatcher, TaskHandle, TaskId, TaskResult,
};
use tasklink_stream::{StreamConnector, StreamSession};
use tracing::instrument;

use crate::config::ClientConfig;
use crate::dispatch::DispatchClient;

/// Submits tasks through a [`TaskDispatcher`] and opens their event
/// streams through a [`StreamConnector`].
#[derive(Debug, Clone)]
pub struct TaskClient<D = DispatchClient> {
    dispatcher: D,
    streams: StreamConnector,
}

impl TaskClient<DispatchClient> {
    /// REST dispatch plus websocket streaming against `config.base_url`.
    #[cfg(feature = "websocket")]
    pub fn connect(config: ClientConfig) -> TaskResult<Self> {
        Self::with_transport(config, tasklink_stream::WebSocketConnector::new())
    }

    /// REST dispatch plus streaming over `transport`.
    pub fn with_transport(
        config: ClientConfig,
        transport: impl FrameConnector + 'static,
    ) -> TaskResult<Self> {
        let streams = StreamConnector::builder()
            .base_url(config.base_url.clone())
            .transport(transport)
            .buffer(config.stream_buffer)
            .build()?;
        Ok(Self::new(DispatchClient::new(config)?, streams))
    }
}

impl<D: TaskDispatcher> TaskClient<D> {
    pub fn new(dispatcher: D, streams: StreamConnector) -> Self {
        Self {
            dispatcher,
            streams,
        }
    }

    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    pub fn streams(&self) -> &StreamConnector {
        &self.streams
    }

    pub async fn submit(&self, prompt: &str, options: &SubmitOptions) -> TaskResult<TaskHandle> {
        self.dispatcher.submit(prompt, options).await
    }

    pub async fn open_stream(&self, handle: TaskHandle) -> TaskResult<StreamSession> {
        self.streams.open(handle).await
    }

    /// Attach to an existing task's stream at its default locator.
    #[instrument(skip(self, task_id), fields(task_id = %task_id))]
    pub async fn watch(&self, task_id: TaskId, via_gateway: bool) -> TaskResult<StreamSession> {
        let locator = if via_gateway {
            StreamLocator::for_gateway_task(&task_id)
        } else {
            StreamLocator::for_task(&task_id)
        };
        self.streams.open(TaskHandle::new(task_id, locator)).await
    }

    #[instrument(skip_all)]
    pub async fn submit_and_open(
        &self,
        prompt: &str,
        options: &SubmitOptions,
    ) -> TaskResult<StreamSession> {
        let handle = self.submit(prompt, options).await?;
        self.open_stream(handle).await
    }
}
