//! Task stream event types.
//!
//! Every inbound frame is a JSON document whose `event` field names its kind.
//! The closed set of kinds the service emits today maps onto typed variants
//! of [`TaskEvent`]; any other kind decodes into `TaskEvent::Unknown` so new
//! server-side events never break an existing client.
//!
//! Payload structs keep keys they do not model in a flattened `extra` map.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::TaskError;
use crate::lenient;

/// Name of the discriminator field carried by every frame.
pub const EVENT_FIELD: &str = "event";

/// Lifecycle status of a task as reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[serde(alias = "pending")]
    Queued,
    Running,
    Success,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 5] = [
        TaskStatus::Queued,
        TaskStatus::Running,
        TaskStatus::Success,
        TaskStatus::Failed,
        TaskStatus::Cancelled,
    ];

    /// No further progress events are expected once a task reaches one of
    /// these statuses.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of a task, carried by `status` events.
///
/// Only `status` is strict. Descriptive fields that arrive with an
/// unexpected type read as `None`, and timestamps keep the service's text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatusSnapshot {
    pub status: TaskStatus,
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient::option", skip_serializing_if = "Option::is_none")]
    pub total_steps: Option<u64>,
    #[serde(default, deserialize_with = "lenient::option", skip_serializing_if = "Option::is_none")]
    pub current_step: Option<u64>,
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub current_step_title: Option<String>,
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub last_updated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_overlays: Option<Value>,
    #[serde(default, deserialize_with = "lenient::values", skip_serializing_if = "Vec::is_empty")]
    pub recent_evidence: Vec<Value>,
    #[serde(default, deserialize_with = "lenient::values", skip_serializing_if = "Vec::is_empty")]
    pub observation_history: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_snapshot: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TaskStatusSnapshot {
    pub fn new(status: TaskStatus) -> Self {
        Self {
            status,
            task_id: None,
            title: None,
            total_steps: None,
            current_step: None,
            current_step_title: None,
            started_at: None,
            finished_at: None,
            last_error: None,
            last_updated_at: None,
            plan_overlays: None,
            recent_evidence: Vec::new(),
            observation_history: Vec::new(),
            context_snapshot: None,
            extra: Map::new(),
        }
    }
}

/// Severity of a log line. Levels the client does not know read as `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    #[serde(alias = "warning")]
    Warn,
    Error,
    #[serde(other)]
    Other,
}

/// One line of the task's execution log, carried by `log` events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskLogEntry {
    #[serde(default, deserialize_with = "lenient::option", skip_serializing_if = "Option::is_none")]
    pub cursor: Option<u64>,
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, deserialize_with = "lenient::option", skip_serializing_if = "Option::is_none")]
    pub level: Option<LogLevel>,
    #[serde(default, deserialize_with = "lenient::text_or_empty")]
    pub message: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Environment snapshot attached to a task, carried by `context` events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    #[serde(default, deserialize_with = "lenient::option", skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub perception: Option<Value>,
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub screenshot_base64: Option<String>,
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Screen-space rectangle attached to observations and annotations.
///
/// Accepts `{x, y, width, height}` (or `w`/`h`) and `[x, y, w, h]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "BoundingBoxRepr")]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BoundingBoxRepr {
    Object {
        x: f64,
        y: f64,
        #[serde(alias = "w")]
        width: f64,
        #[serde(alias = "h")]
        height: f64,
    },
    Array([f64; 4]),
}

impl From<BoundingBoxRepr> for BoundingBox {
    fn from(repr: BoundingBoxRepr) -> Self {
        match repr {
            BoundingBoxRepr::Object {
                x,
                y,
                width,
                height,
            } => Self {
                x,
                y,
                width,
                height,
            },
            BoundingBoxRepr::Array([x, y, width, height]) => Self {
                x,
                y,
                width,
                height,
            },
        }
    }
}

/// Artifact captured during a dispatch. Its fields sit at the top level of
/// the frame rather than under a nested key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservationPayload {
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub observation_type: Option<String>,
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatch_label: Option<String>,
    #[serde(default, deserialize_with = "lenient::option", skip_serializing_if = "Option::is_none")]
    pub dispatch_index: Option<u64>,
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub screenshot_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub recorded_at: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub artifact: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Rendering hint for plan/execution overlays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayPayload {
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub recorded_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Human note pinned to a step or dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskAnnotation {
    #[serde(default, deserialize_with = "lenient::text_or_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatch_label: Option<String>,
    #[serde(default, deserialize_with = "lenient::text_or_empty")]
    pub note: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Payload of an `error` event.
///
/// Server-sent errors carry only `message`. Errors the client synthesizes for
/// frames it could not decode also carry `reason` and the offending `frame`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorEvent {
    #[serde(default, deserialize_with = "lenient::text_or_empty")]
    pub message: String,
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ErrorEvent {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    /// Error event standing in for a frame that failed to decode.
    pub fn undecodable(error: &TaskError, frame: &str) -> Self {
        let reason = match error {
            TaskError::MalformedFrame(_) => "malformed_frame",
            TaskError::UnknownEventShape(_) => "unknown_event_shape",
            _ => "decode_failed",
        };
        Self {
            message: error.to_string(),
            reason: Some(reason.to_owned()),
            frame: Some(frame.to_owned()),
            extra: Map::new(),
        }
    }

    /// True when the client produced this event instead of the server.
    pub fn is_synthetic(&self) -> bool {
        self.frame.is_some()
    }
}

/// The closed set of event kinds the service emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskEventKind {
    Status,
    Log,
    Context,
    Observation,
    Overlay,
    Annotation,
    Error,
}

impl TaskEventKind {
    pub const ALL: [TaskEventKind; 7] = [
        TaskEventKind::Status,
        TaskEventKind::Log,
        TaskEventKind::Context,
        TaskEventKind::Observation,
        TaskEventKind::Overlay,
        TaskEventKind::Annotation,
        TaskEventKind::Error,
    ];

    pub fn from_wire(kind: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|known| known.as_str() == kind)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Log => "log",
            Self::Context => "context",
            Self::Observation => "observation",
            Self::Overlay => "overlay",
            Self::Annotation => "annotation",
            Self::Error => "error",
        }
    }
}

/// A decoded stream frame.
///
/// Forward-compatible: unknown `"event"` values decode into `Unknown`
/// carrying the kind and the whole raw document.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    Status(TaskStatusSnapshot),
    Log(TaskLogEntry),
    Context(ContextSnapshot),
    Observation(ObservationPayload),
    Overlay(OverlayPayload),
    Annotation(TaskAnnotation),
    Error(ErrorEvent),
    Unknown { kind: String, raw: Value },
}

impl TaskEvent {
    /// Wire name of this event's kind.
    pub fn kind(&self) -> &str {
        match self {
            Self::Unknown { kind, .. } => kind,
            known => known
                .known_kind()
                .map(TaskEventKind::as_str)
                .unwrap_or_default(),
        }
    }

    /// `None` for `Unknown` events.
    pub fn known_kind(&self) -> Option<TaskEventKind> {
        match self {
            Self::Status(_) => Some(TaskEventKind::Status),
            Self::Log(_) => Some(TaskEventKind::Log),
            Self::Context(_) => Some(TaskEventKind::Context),
            Self::Observation(_) => Some(TaskEventKind::Observation),
            Self::Overlay(_) => Some(TaskEventKind::Overlay),
            Self::Annotation(_) => Some(TaskEventKind::Annotation),
            Self::Error(_) => Some(TaskEventKind::Error),
            Self::Unknown { .. } => None,
        }
    }

    pub fn status(status: TaskStatus) -> Self {
        Self::Status(TaskStatusSnapshot::new(status))
    }

    /// Re-encode into the wire document shape.
    pub fn to_value(&self) -> serde_json::Result<Value> {
        let mut fields = Map::new();
        match self {
            Self::Status(snapshot) => {
                fields.insert("status".to_owned(), serde_json::to_value(snapshot)?);
            }
            Self::Log(entry) => {
                fields.insert("log".to_owned(), serde_json::to_value(entry)?);
            }
            Self::Context(context) => {
                fields.insert("context".to_owned(), serde_json::to_value(context)?);
            }
            Self::Overlay(overlay) => {
                fields.insert("overlay".to_owned(), serde_json::to_value(overlay)?);
            }
            Self::Annotation(annotation) => {
                fields.insert("annotation".to_owned(), serde_json::to_value(annotation)?);
            }
            Self::Observation(observation) => {
                if let Value::Object(flat) = serde_json::to_value(observation)? {
                    fields = flat;
                }
            }
            Self::Error(error) => {
                if let Value::Object(flat) = serde_json::to_value(error)? {
                    fields = flat;
                }
            }
            Self::Unknown { raw, .. } => return Ok(raw.clone()),
        }
        fields.insert(EVENT_FIELD.to_owned(), Value::String(self.kind().to_owned()));
        Ok(Value::Object(fields))
    }
}

impl Serialize for TaskEvent {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_value()
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}

/// Decodes through the frame codec, so deserializing never fails on an
/// unrecognized kind.
impl<'de> Deserialize<'de> for TaskEvent {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Value::deserialize(deserializer)?;
        crate::codec::decode_value(raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_serializes_with_event_tag() {
        let event = TaskEvent::status(TaskStatus::Running);
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value, json!({"event": "status", "status": {"status": "running"}}));
    }

    #[test]
    fn observation_serializes_flat() {
        let event = TaskEvent::Observation(ObservationPayload {
            observation_type: Some("image".into()),
            step_id: Some("navigate".into()),
            ..ObservationPayload::default()
        });
        let value = event.to_value().unwrap();
        assert_eq!(value["event"], "observation");
        assert_eq!(value["step_id"], "navigate");
        assert!(value.get("observation").is_none());
    }

    #[test]
    fn status_roundtrip_keeps_unmodelled_keys() {
        let json = r#"{"event":"status","status":{"status":"failed","last_error":"timeout","retry_hint":3}}"#;
        let event: TaskEvent = serde_json::from_str(json).unwrap();
        let TaskEvent::Status(snapshot) = &event else {
            panic!("should be Status");
        };
        assert_eq!(snapshot.status, TaskStatus::Failed);
        assert_eq!(snapshot.last_error.as_deref(), Some("timeout"));
        assert_eq!(snapshot.extra["retry_hint"], 3);

        let back: TaskEvent = serde_json::from_value(serde_json::to_value(&event).unwrap()).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn unknown_event_roundtrips_raw_document() {
        let raw = json!({"event": "watchdog", "watchdog": {"kind": "stall"}});
        let event: TaskEvent = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(event.kind(), "watchdog");
        assert!(event.known_kind().is_none());
        assert_eq!(serde_json::to_value(&event).unwrap(), raw);
    }

    #[test]
    fn pending_is_accepted_as_queued() {
        let status: TaskStatus = serde_json::from_str("\"pending\"").unwrap();
        assert_eq!(status, TaskStatus::Queued);
        assert_eq!(serde_json::to_string(&status).unwrap(), "\"queued\"");
    }

    #[test]
    fn bbox_accepts_object_and_array_forms() {
        let object: BoundingBox =
            serde_json::from_value(json!({"x": 1, "y": 2, "w": 30, "h": 40})).unwrap();
        let array: BoundingBox = serde_json::from_value(json!([1, 2, 30, 40])).unwrap();
        assert_eq!(object, array);
        assert_eq!(object.width, 30.0);
    }

    #[test]
    fn kind_names_match_wire_strings() {
        for kind in TaskEventKind::ALL {
            assert_eq!(TaskEventKind::from_wire(kind.as_str()), Some(kind));
        }
        assert_eq!(TaskEventKind::from_wire("judge"), None);
    }

    #[test]
    fn synthetic_error_records_reason_and_frame() {
        let error = TaskError::MalformedFrame("eof".into());
        let event = ErrorEvent::undecodable(&error, "{not json");
        assert!(event.is_synthetic());
        assert_eq!(event.reason.as_deref(), Some("malformed_frame"));
        assert_eq!(event.frame.as_deref(), Some("{not json"));
        assert!(!ErrorEvent::new("server said no").is_synthetic());
    }

    #[test]
    fn odd_descriptive_values_do_not_fail_a_status_frame() {
        let event: TaskEvent = serde_json::from_value(json!({
            "event": "status",
            "status": {
                "status": "success",
                "last_updated_at": "2024-05-01 10:00:00",
                "total_steps": "3",
                "title": 42,
                "recent_evidence": null
            }
        }))
        .unwrap();
        let TaskEvent::Status(snapshot) = &event else {
            panic!("should be Status");
        };
        assert_eq!(snapshot.status, TaskStatus::Success);
        assert_eq!(snapshot.last_updated_at.as_deref(), Some("2024-05-01 10:00:00"));
        assert_eq!(snapshot.total_steps, None);
        assert_eq!(snapshot.title.as_deref(), Some("42"));
        assert!(snapshot.recent_evidence.is_empty());
    }

    #[test]
    fn log_levels_outside_the_known_set_still_decode() {
        let level = |raw: Value| serde_json::from_value::<TaskLogEntry>(raw).unwrap().level;
        assert_eq!(level(json!({"level": "debug", "message": "x"})), Some(LogLevel::Debug));
        assert_eq!(level(json!({"level": "trace"})), Some(LogLevel::Other));
        assert_eq!(level(json!({"level": 30})), None);
        let entry: TaskLogEntry =
            serde_json::from_value(json!({"cursor": -1, "timestamp": 1714557600, "message": null}))
                .unwrap();
        assert_eq!(entry.cursor, None);
        assert_eq!(entry.timestamp.as_deref(), Some("1714557600"));
        assert_eq!(entry.message, "");
    }

    #[test]
    fn strict_fields_still_reject_bad_values() {
        let bad_bbox = json!({"event": "observation", "bbox": "wide"});
        assert!(serde_json::from_value::<TaskEvent>(bad_bbox).is_err());
        let bad_status = json!({"event": "status", "status": {"status": 3}});
        assert!(serde_json::from_value::<TaskEvent>(bad_status).is_err());
    }
}
