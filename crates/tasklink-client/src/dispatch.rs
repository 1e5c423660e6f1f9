//! REST client for the task service.

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tasklink_protocol::api::{
    CancelTaskRequest, ChatRequest, ChatResponse, CreateTaskAnnotationRequest,
    CreateTaskAnnotationResponse, CreateTaskRequest, CreateTaskResponse, ExecuteTaskRequest,
    ExecuteTaskResponse, PerceiveRequest, PerceiveResponse, PlanRunRequest, PlanRunResponse,
    RecordingDetailResponse, RecordingsListResponse, SubmitOptions, TaskAnnotationsResponse,
    TaskArtifactsResponse, TaskDetailResponse, TaskListResponse, TaskLogsResponse,
    TaskObservationsResponse, TaskStatusResponse, TaskSummary,
};
use tasklink_protocol::{
    RecordingId, StreamLocator, TaskDispatcher, TaskError, TaskHandle, TaskId, TaskLogEntry,
    TaskResult, TaskStatusSnapshot,
};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::config::ClientConfig;

/// Thin wrapper over the service's REST routes.
#[derive(Debug, Clone)]
pub struct DispatchClient {
    http: Client,
    config: ClientConfig,
}

impl DispatchClient {
    pub fn new(config: ClientConfig) -> TaskResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|error| TaskError::Configuration(format!("http client: {error}")))?;
        Ok(Self { http, config })
    }

    /// Use a preconfigured `reqwest` client; `config.timeout` is not applied.
    pub fn with_http(config: ClientConfig, http: Client) -> Self {
        Self { http, config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Post a prompt and return where the new task's events stream.
    ///
    /// Fails with `SubmissionRejected` when the prompt is blank or the
    /// service answers without a task identifier.
    #[instrument(skip(self, prompt, options), fields(via_gateway = options.via_gateway))]
    pub async fn submit(&self, prompt: &str, options: &SubmitOptions) -> TaskResult<TaskHandle> {
        if prompt.trim().is_empty() {
            return Err(TaskError::SubmissionRejected("prompt is empty".to_owned()));
        }
        let request = CreateTaskRequest::new(prompt, options.clone());
        let response = self.create_task(&request).await?;
        let handle = task_handle(
            response.task_id,
            response.stream_path,
            &response.stderr,
            |task_id| options.default_locator(task_id),
        )?;
        info!(task_id = %handle.task_id(), locator = %handle.stream_locator(), "task submitted");
        Ok(handle)
    }

    #[instrument(skip_all)]
    pub async fn chat(&self, request: &ChatRequest) -> TaskResult<ChatResponse> {
        self.post(&["api", "chat"], request).await
    }

    #[instrument(skip_all, fields(url = %request.url))]
    pub async fn perceive(&self, request: &PerceiveRequest) -> TaskResult<PerceiveResponse> {
        self.post(&["api", "perceive"], request).await
    }

    #[instrument(skip_all)]
    pub async fn create_task(&self, request: &CreateTaskRequest) -> TaskResult<CreateTaskResponse> {
        self.post(&["api", "tasks"], request).await
    }

    #[instrument(skip(self))]
    pub async fn list_tasks(&self, limit: Option<usize>) -> TaskResult<Vec<TaskSummary>> {
        let query = limit_query(limit);
        let response: TaskListResponse = self.get(&["api", "tasks"], &query).await?;
        Ok(response.tasks)
    }

    #[instrument(skip(self, task_id), fields(task_id = %task_id))]
    pub async fn get_task(
        &self,
        task_id: &TaskId,
        limit: Option<usize>,
    ) -> TaskResult<TaskDetailResponse> {
        self.get(&["api", "tasks", task_id.as_str()], &limit_query(limit))
            .await
    }

    #[instrument(skip(self, task_id), fields(task_id = %task_id))]
    pub async fn get_task_status(&self, task_id: &TaskId) -> TaskResult<TaskStatusSnapshot> {
        let response: TaskStatusResponse = self
            .get(&["api", "tasks", task_id.as_str(), "status"], &[])
            .await?;
        Ok(response.status)
    }

    #[instrument(skip(self, task_id), fields(task_id = %task_id))]
    pub async fn get_task_logs(
        &self,
        task_id: &TaskId,
        since: Option<&str>,
    ) -> TaskResult<Vec<TaskLogEntry>> {
        let query: Vec<(&str, String)> = since
            .filter(|since| !since.is_empty())
            .map(|since| ("since", since.to_owned()))
            .into_iter()
            .collect();
        let response: TaskLogsResponse = self
            .get(&["api", "tasks", task_id.as_str(), "logs"], &query)
            .await?;
        Ok(response.logs)
    }

    #[instrument(skip(self, task_id), fields(task_id = %task_id))]
    pub async fn get_task_observations(
        &self,
        task_id: &TaskId,
        limit: Option<usize>,
    ) -> TaskResult<TaskObservationsResponse> {
        self.get(
            &["api", "tasks", task_id.as_str(), "observations"],
            &limit_query(limit),
        )
        .await
    }

    #[instrument(skip(self, task_id), fields(task_id = %task_id))]
    pub async fn get_task_artifacts(&self, task_id: &TaskId) -> TaskResult<TaskArtifactsResponse> {
        self.get(&["api", "tasks", task_id.as_str(), "artifacts"], &[])
            .await
    }

    #[instrument(skip(self, task_id), fields(task_id = %task_id))]
    pub async fn get_task_annotations(
        &self,
        task_id: &TaskId,
    ) -> TaskResult<TaskAnnotationsResponse> {
        self.get(&["api", "tasks", task_id.as_str(), "annotations"], &[])
            .await
    }

    #[instrument(skip(self, task_id, request), fields(task_id = %task_id))]
    pub async fn create_task_annotation(
        &self,
        task_id: &TaskId,
        request: &CreateTaskAnnotationRequest,
    ) -> TaskResult<CreateTaskAnnotationResponse> {
        self.post(&["api", "tasks", task_id.as_str(), "annotations"], request)
            .await
    }

    #[instrument(skip(self, task_id, request), fields(task_id = %task_id))]
    pub async fn execute_task(
        &self,
        task_id: &TaskId,
        request: &ExecuteTaskRequest,
    ) -> TaskResult<ExecuteTaskResponse> {
        self.post(&["api", "tasks", task_id.as_str(), "execute"], request)
            .await
    }

    #[instrument(skip(self, task_id), fields(task_id = %task_id))]
    pub async fn cancel_task(&self, task_id: &TaskId, reason: Option<&str>) -> TaskResult<Value> {
        let request = CancelTaskRequest {
            reason: reason.map(str::to_owned),
        };
        self.post(&["api", "tasks", task_id.as_str(), "cancel"], &request)
            .await
    }

    #[instrument(skip(self))]
    pub async fn list_recordings(
        &self,
        limit: Option<usize>,
        state: Option<&str>,
    ) -> TaskResult<RecordingsListResponse> {
        let mut query = limit_query(limit);
        if let Some(state) = state.filter(|state| !state.is_empty()) {
            query.push(("state", state.to_owned()));
        }
        self.get(&["api", "recordings"], &query).await
    }

    #[instrument(skip(self, recording_id), fields(recording_id = %recording_id))]
    pub async fn get_recording(
        &self,
        recording_id: &RecordingId,
    ) -> TaskResult<RecordingDetailResponse> {
        self.get(&["api", "recordings", recording_id.as_str()], &[])
            .await
    }

    /// Run a prebuilt plan through the gateway. Without a returned
    /// `stream_path` the handle points at the gateway's stream route.
    #[instrument(skip_all)]
    pub async fn run_plan(&self, request: &PlanRunRequest) -> TaskResult<TaskHandle> {
        let response: PlanRunResponse = self.post(&["v1", "tasks", "run"], request).await?;
        task_handle(
            response.task_id,
            response.stream_path,
            &[],
            StreamLocator::for_gateway_task,
        )
    }

    fn endpoint(&self, segments: &[&str]) -> TaskResult<Url> {
        let mut url = self.config.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                TaskError::Configuration(format!(
                    "base URL {} cannot carry a path",
                    self.config.base_url
                ))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get<T>(&self, segments: &[&str], query: &[(&str, String)]) -> TaskResult<T>
    where
        T: DeserializeOwned,
    {
        let url = self.endpoint(segments)?;
        debug!(%url, "GET");
        let mut request = self.http.get(url);
        if !query.is_empty() {
            request = request.query(query);
        }
        let response = request.send().await.map_err(http_error)?;
        read_json(response).await
    }

    async fn post<B, T>(&self, segments: &[&str], body: &B) -> TaskResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.endpoint(segments)?;
        debug!(%url, "POST");
        let body = serde_json::to_vec(body)
            .map_err(|error| TaskError::Serialization(error.to_string()))?;
        let response = self
            .http
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(http_error)?;
        read_json(response).await
    }
}

#[async_trait]
impl TaskDispatcher for DispatchClient {
    async fn submit(&self, prompt: &str, options: &SubmitOptions) -> TaskResult<TaskHandle> {
        DispatchClient::submit(self, prompt, options).await
    }
}

fn limit_query(limit: Option<usize>) -> Vec<(&'static str, String)> {
    limit
        .map(|limit| ("limit", limit.to_string()))
        .into_iter()
        .collect()
}

fn http_error(error: reqwest::Error) -> TaskError {
    TaskError::Http(error.to_string())
}

async fn read_json<T: DeserializeOwned>(response: Response) -> TaskResult<T> {
    let status = response.status();
    let url = response.url().clone();
    let body = response.bytes().await.map_err(http_error)?;
    if !status.is_success() {
        let detail = String::from_utf8_lossy(&body);
        warn!(%url, %status, "request failed");
        return Err(TaskError::Http(format!("{status} from {url}: {}", detail.trim())));
    }
    serde_json::from_slice(&body)
        .map_err(|error| TaskError::Serialization(format!("response from {url}: {error}")))
}

fn task_handle(
    task_id: Option<TaskId>,
    stream_path: Option<StreamLocator>,
    stderr: &[String],
    fallback: impl FnOnce(&TaskId) -> StreamLocator,
) -> TaskResult<TaskHandle> {
    let Some(task_id) = task_id.filter(|task_id| !task_id.is_empty()) else {
        let reason = stderr
            .iter()
            .map(|line| line.trim())
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(TaskError::SubmissionRejected(if reason.is_empty() {
            "service returned no task id".to_owned()
        } else {
            reason
        }));
    };
    let locator = match stream_path {
        Some(locator) if !locator.as_str().trim().is_empty() => locator,
        _ => fallback(&task_id),
    };
    Ok(TaskHandle::new(task_id, locator))
}
