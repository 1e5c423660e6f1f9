//! Request and response bodies of the task service's REST surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event::{BoundingBox, ContextSnapshot, TaskAnnotation, TaskLogEntry, TaskStatusSnapshot};
use crate::ids::{RecordingId, StreamLocator, TaskId};
use crate::lenient;

/// Options accepted by a task submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmitOptions {
    /// Run the plan immediately after planning.
    #[serde(default)]
    pub execute: bool,
    /// Attach an environment snapshot to the task.
    #[serde(default)]
    pub capture_context: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_screenshot: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_api_base: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_max_output_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_replans: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    /// Default to the gateway's stream route when the service does not
    /// return one.
    #[serde(default, skip_serializing)]
    pub via_gateway: bool,
}

impl SubmitOptions {
    pub fn execute(mut self, execute: bool) -> Self {
        self.execute = execute;
        self
    }

    pub fn capture_context(mut self, capture_context: bool) -> Self {
        self.capture_context = capture_context;
        self
    }

    pub fn planner(mut self, planner: impl Into<String>) -> Self {
        self.planner = Some(planner.into());
        self
    }

    pub fn llm(mut self, provider: impl Into<String>, model: impl Into<String>) -> Self {
        self.llm_provider = Some(provider.into());
        self.llm_model = Some(model.into());
        self
    }

    pub fn via_gateway(mut self, via_gateway: bool) -> Self {
        self.via_gateway = via_gateway;
        self
    }

    /// Locator to fall back on when the service omits `stream_path`.
    pub fn default_locator(&self, task_id: &TaskId) -> StreamLocator {
        if self.via_gateway {
            StreamLocator::for_gateway_task(task_id)
        } else {
            StreamLocator::for_task(task_id)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTaskRequest {
    pub prompt: String,
    #[serde(flatten)]
    pub options: SubmitOptions,
}

impl CreateTaskRequest {
    pub fn new(prompt: impl Into<String>, options: SubmitOptions) -> Self {
        Self {
            prompt: prompt.into(),
            options,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateTaskResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub task_id: Option<TaskId>,
    #[serde(default)]
    pub stream_path: Option<StreamLocator>,
    #[serde(default)]
    pub stdout: Vec<String>,
    #[serde(default)]
    pub stderr: Vec<String>,
    #[serde(default)]
    pub plan: Option<Value>,
    #[serde(default)]
    pub flow: Option<Value>,
    #[serde(default)]
    pub artifacts: Option<Value>,
    #[serde(default)]
    pub context: Option<ContextSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub prompt: String,
    #[serde(flatten)]
    pub options: SubmitOptions,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub plan: Option<Value>,
    #[serde(default)]
    pub flow: Option<Value>,
    #[serde(default)]
    pub artifacts: Option<Value>,
    #[serde(default)]
    pub context: Option<ContextSnapshot>,
    #[serde(default)]
    pub stdout: Option<String>,
    #[serde(default)]
    pub stderr: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecuteTaskRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecuteTaskResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub stdout: Vec<String>,
    #[serde(default)]
    pub stderr: Vec<String>,
    #[serde(default)]
    pub report: Option<Value>,
    #[serde(default)]
    pub artifacts: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CancelTaskRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSummary {
    pub task_id: TaskId,
    #[serde(default)]
    pub total_dispatches: u64,
    #[serde(default)]
    pub success_count: u64,
    #[serde(default)]
    pub failure_count: u64,
    #[serde(default)]
    pub last_status: Option<String>,
    #[serde(default)]
    pub last_tool: Option<String>,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default, deserialize_with = "lenient::option")]
    pub last_recorded_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default, deserialize_with = "lenient::option")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub planner: Option<String>,
    #[serde(default)]
    pub llm_provider: Option<String>,
    #[serde(default)]
    pub llm_model: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskListResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub tasks: Vec<TaskSummary>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskDispatchSummary {
    pub action_id: String,
    pub status: String,
    pub tool: String,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub wait_ms: u64,
    #[serde(default)]
    pub run_ms: u64,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default, deserialize_with = "lenient::option")]
    pub recorded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskDetailResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub summary: Option<TaskSummary>,
    #[serde(default)]
    pub dispatches: Vec<TaskDispatchSummary>,
    #[serde(default)]
    pub plan: Option<Value>,
    #[serde(default)]
    pub annotations: Vec<TaskAnnotation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatusResponse {
    #[serde(default)]
    pub success: bool,
    pub status: TaskStatusSnapshot,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskLogsResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub logs: Vec<TaskLogEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskObservationsResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub task_id: Option<TaskId>,
    #[serde(default)]
    pub observations: Vec<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskArtifactsResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub task_id: Option<TaskId>,
    #[serde(default)]
    pub items: Vec<Value>,
    #[serde(default)]
    pub summary: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskAnnotationsResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub annotations: Vec<TaskAnnotation>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateTaskAnnotationRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatch_label: Option<String>,
    pub note: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateTaskAnnotationResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub annotation: Option<TaskAnnotation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingSummary {
    pub id: RecordingId,
    pub state: String,
    #[serde(default, deserialize_with = "lenient::option")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient::option")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub has_agent_plan: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordingsListResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub recordings: Vec<RecordingSummary>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordingDetailResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub recording: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerceiveRequest {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insights: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structural: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerceiveResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub stdout: Option<String>,
    #[serde(default)]
    pub stderr: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub perception: Option<Value>,
    #[serde(default)]
    pub screenshot_base64: Option<String>,
}

/// Body of the gateway's plan execution route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRunRequest {
    pub plan: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanRunResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub task_id: Option<TaskId>,
    #[serde(default)]
    pub stream_path: Option<StreamLocator>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_task_request_flattens_options() {
        let request = CreateTaskRequest::new(
            "navigate to example.com",
            SubmitOptions::default()
                .execute(true)
                .capture_context(true)
                .llm("openai", "gpt-4o-mini")
                .via_gateway(true),
        );
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["prompt"], "navigate to example.com");
        assert_eq!(value["execute"], true);
        assert_eq!(value["capture_context"], true);
        assert_eq!(value["llm_provider"], "openai");
        assert_eq!(value["llm_model"], "gpt-4o-mini");
        assert!(value.get("via_gateway").is_none());
        assert!(value.get("planner").is_none());
    }

    #[test]
    fn create_task_response_tolerates_sparse_bodies() {
        let response: CreateTaskResponse =
            serde_json::from_value(json!({"success": false, "stderr": ["planner offline"]}))
                .unwrap();
        assert!(response.task_id.is_none());
        assert_eq!(response.stderr, vec!["planner offline".to_owned()]);
    }

    #[test]
    fn default_locator_respects_gateway_choice() {
        let task_id = TaskId::from("t-1");
        assert_eq!(
            SubmitOptions::default().default_locator(&task_id).as_str(),
            "/api/tasks/t-1/stream"
        );
        assert_eq!(
            SubmitOptions::default()
                .via_gateway(true)
                .default_locator(&task_id)
                .as_str(),
            "/v1/tasks/t-1/stream"
        );
    }

    #[test]
    fn status_response_accepts_service_snapshot() {
        let response: TaskStatusResponse = serde_json::from_value(json!({
            "success": true,
            "status": {
                "task_id": "t-1",
                "title": "demo",
                "status": "pending",
                "total_steps": 2,
                "current_step": null,
                "last_updated_at": "2024-05-01T10:00:00Z"
            }
        }))
        .unwrap();
        assert_eq!(response.status.total_steps, Some(2));
        assert!(!response.status.status.is_terminal());
    }

    #[test]
    fn summaries_need_only_their_ids() {
        let listing: TaskListResponse = serde_json::from_value(json!({
            "success": true,
            "tasks": [
                {"task_id": "t-1"},
                {"task_id": "t-2", "total_dispatches": 4, "created_at": "yesterday"}
            ]
        }))
        .unwrap();
        assert_eq!(listing.tasks.len(), 2);
        assert_eq!(listing.tasks[0].total_dispatches, 0);
        assert_eq!(listing.tasks[1].total_dispatches, 4);
        assert!(listing.tasks[1].created_at.is_none());

        let recordings: RecordingsListResponse = serde_json::from_value(json!({
            "recordings": [{
                "id": "rec-1",
                "state": "completed",
                "updated_at": "2024-05-01T10:00:00Z"
            }]
        }))
        .unwrap();
        assert_eq!(recordings.recordings[0].id.as_str(), "rec-1");
        assert!(recordings.recordings[0].updated_at.is_some());
    }
}
