//! Frame codec: one text frame in, one [`TaskEvent`] out.
//!
//! Rejections:
//! - `MalformedFrame` when the text is not well-formed JSON.
//! - `UnknownEventShape` when the document has no string `event` field, is
//!   not an object, or a recognized kind's payload does not fit its type.
//!
//! An unrecognized `event` value is never an error.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{TaskError, TaskResult};
use crate::event::{EVENT_FIELD, TaskEvent, TaskEventKind};

/// Decode a single text frame.
pub fn decode(frame: &str) -> TaskResult<TaskEvent> {
    let value: Value = serde_json::from_str(frame)
        .map_err(|error| TaskError::MalformedFrame(error.to_string()))?;
    decode_value(value)
}

/// Text of a binary frame. Bytes that are not UTF-8 are a `MalformedFrame`.
pub fn frame_text(bytes: Vec<u8>) -> TaskResult<String> {
    String::from_utf8(bytes).map_err(|error| {
        TaskError::MalformedFrame(format!("binary frame is not valid UTF-8: {error}"))
    })
}

/// Decode an already-parsed frame document.
pub fn decode_value(value: Value) -> TaskResult<TaskEvent> {
    let mut fields = match value {
        Value::Object(fields) => fields,
        other => {
            return Err(TaskError::UnknownEventShape(format!(
                "expected a JSON object, found {}",
                json_type(&other)
            )));
        }
    };

    let kind = match fields.get(EVENT_FIELD) {
        Some(Value::String(kind)) => kind.clone(),
        Some(other) => {
            return Err(TaskError::UnknownEventShape(format!(
                "`{EVENT_FIELD}` must be a string, found {}",
                json_type(other)
            )));
        }
        None => {
            return Err(TaskError::UnknownEventShape(format!(
                "missing `{EVENT_FIELD}` field"
            )));
        }
    };

    let Some(known) = TaskEventKind::from_wire(&kind) else {
        return Ok(TaskEvent::Unknown {
            kind,
            raw: Value::Object(fields),
        });
    };

    fields.remove(EVENT_FIELD);
    let event = match known {
        TaskEventKind::Status => TaskEvent::Status(nested(&mut fields, known)?),
        TaskEventKind::Log => TaskEvent::Log(nested(&mut fields, known)?),
        TaskEventKind::Context => TaskEvent::Context(nested(&mut fields, known)?),
        TaskEventKind::Overlay => TaskEvent::Overlay(nested(&mut fields, known)?),
        TaskEventKind::Annotation => TaskEvent::Annotation(nested(&mut fields, known)?),
        TaskEventKind::Observation => TaskEvent::Observation(flat(fields, known)?),
        TaskEventKind::Error => TaskEvent::Error(flat(fields, known)?),
    };
    Ok(event)
}

/// Payload stored under a key named after the kind, e.g. `{"status": {...}}`.
fn nested<T: DeserializeOwned>(fields: &mut Map<String, Value>, kind: TaskEventKind) -> TaskResult<T> {
    let key = kind.as_str();
    let payload = fields.remove(key).ok_or_else(|| {
        TaskError::UnknownEventShape(format!("`{key}` event is missing its `{key}` payload"))
    })?;
    serde_json::from_value(payload).map_err(|error| {
        TaskError::UnknownEventShape(format!("invalid `{key}` payload: {error}"))
    })
}

/// Payload spread over the top level of the frame.
fn flat<T: DeserializeOwned>(fields: Map<String, Value>, kind: TaskEventKind) -> TaskResult<T> {
    serde_json::from_value(Value::Object(fields)).map_err(|error| {
        TaskError::UnknownEventShape(format!("invalid `{}` payload: {error}", kind.as_str()))
    })
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{LogLevel, TaskStatus};
    use serde_json::json;

    #[test]
    fn decodes_status_frame() {
        let event = decode(r#"{"event":"status","status":{"status":"running","current_step":2}}"#)
            .unwrap();
        let TaskEvent::Status(snapshot) = event else {
            panic!("should be Status");
        };
        assert_eq!(snapshot.status, TaskStatus::Running);
        assert_eq!(snapshot.current_step, Some(2));
    }

    #[test]
    fn decodes_log_frame() {
        let event = decode(
            r#"{"event":"log","log":{"cursor":7,"timestamp":"2024-05-01T10:00:00Z","level":"warn","message":"slow page"}}"#,
        )
        .unwrap();
        let TaskEvent::Log(entry) = event else {
            panic!("should be Log");
        };
        assert_eq!(entry.cursor, Some(7));
        assert_eq!(entry.level, Some(LogLevel::Warn));
        assert_eq!(entry.message, "slow page");
        assert!(entry.timestamp.is_some());
    }

    #[test]
    fn decodes_context_frame() {
        let event =
            decode(r#"{"event":"context","context":{"success":true,"stdout":"ok"}}"#).unwrap();
        let TaskEvent::Context(context) = event else {
            panic!("should be Context");
        };
        assert_eq!(context.success, Some(true));
        assert_eq!(context.stdout.as_deref(), Some("ok"));
    }

    #[test]
    fn decodes_flat_observation_frame() {
        let frame = json!({
            "event": "observation",
            "observation_type": "image",
            "task_id": "t-1",
            "step_id": "navigate",
            "dispatch_label": "navigate#0",
            "dispatch_index": 0,
            "screenshot_path": "/tmp/shot.png",
            "bbox": {"x": 0, "y": 10, "width": 100, "height": 50},
            "content_type": "image/png",
            "recorded_at": "2024-05-01T10:00:00Z",
            "artifact": {"path": "/tmp/shot.png"}
        });
        let TaskEvent::Observation(observation) = decode(&frame.to_string()).unwrap() else {
            panic!("should be Observation");
        };
        assert_eq!(observation.step_id.as_deref(), Some("navigate"));
        assert_eq!(observation.dispatch_label.as_deref(), Some("navigate#0"));
        assert_eq!(observation.bbox.map(|bbox| bbox.height), Some(50.0));
        assert_eq!(observation.artifact["path"], "/tmp/shot.png");
        assert!(observation.extra.is_empty());
    }

    #[test]
    fn observation_with_null_bbox_and_screenshot() {
        let TaskEvent::Observation(observation) = decode(
            r#"{"event":"observation","observation_type":"artifact","bbox":null,"screenshot_path":null}"#,
        )
        .unwrap() else {
            panic!("should be Observation");
        };
        assert!(observation.bbox.is_none());
        assert!(observation.screenshot_path.is_none());
    }

    #[test]
    fn decodes_overlay_frame() {
        let event = decode(
            r#"{"event":"overlay","overlay":{"source":"vision","data":{"title":"Example"}}}"#,
        )
        .unwrap();
        let TaskEvent::Overlay(overlay) = event else {
            panic!("should be Overlay");
        };
        assert_eq!(overlay.source, "vision");
        assert_eq!(overlay.data, json!({"title": "Example"}));
    }

    #[test]
    fn decodes_annotation_frame() {
        let event = decode(
            r#"{"event":"annotation","annotation":{"id":"a1","note":"wrong button","bbox":[1,2,3,4],"severity":"warn"}}"#,
        )
        .unwrap();
        let TaskEvent::Annotation(annotation) = event else {
            panic!("should be Annotation");
        };
        assert_eq!(annotation.id, "a1");
        assert_eq!(annotation.note, "wrong button");
        assert_eq!(annotation.bbox.map(|bbox| bbox.width), Some(3.0));
    }

    #[test]
    fn decodes_server_error_frame() {
        let TaskEvent::Error(error) = decode(r#"{"event":"error","message":"planner crashed"}"#)
            .unwrap() else {
            panic!("should be Error");
        };
        assert_eq!(error.message, "planner crashed");
        assert!(!error.is_synthetic());
    }

    #[test]
    fn unrecognized_kind_is_preserved() {
        let event = decode(r#"{"event":"judge","verdict":{"passed":true}}"#).unwrap();
        let TaskEvent::Unknown { kind, raw } = event else {
            panic!("should be Unknown");
        };
        assert_eq!(kind, "judge");
        assert_eq!(raw["verdict"]["passed"], true);
        assert_eq!(raw["event"], "judge");
    }

    #[test]
    fn unrecognized_kinds_never_fail() {
        for kind in ["agent_history", "self_heal", "alert", "", "STATUS", "status "] {
            let frame = json!({ "event": kind, "payload": 1 }).to_string();
            let event = decode(&frame).unwrap();
            assert_eq!(event.kind(), kind);
            assert!(event.known_kind().is_none());
        }
    }

    #[test]
    fn malformed_text_is_rejected() {
        for frame in ["{not json", "", "   ", "{\"event\":", "null null"] {
            let err = decode(frame).unwrap_err();
            assert!(matches!(err, TaskError::MalformedFrame(_)), "{frame:?} gave {err:?}");
        }
    }

    #[test]
    fn binary_frames_must_be_utf8() {
        let text = frame_text(br#"{"event":"status","status":{"status":"failed"}}"#.to_vec())
            .unwrap();
        assert!(decode(&text).unwrap().is_terminal());

        let err = frame_text(vec![b'{', 0xff, 0xfe, b'}']).unwrap_err();
        assert!(matches!(err, TaskError::MalformedFrame(_)));
        assert!(err.is_decode_error());
    }

    #[test]
    fn missing_kind_is_unknown_shape() {
        let err = decode(r#"{"status":{"status":"running"}}"#).unwrap_err();
        assert!(matches!(err, TaskError::UnknownEventShape(_)));

        let err = decode(r#"{"event":42}"#).unwrap_err();
        assert!(matches!(err, TaskError::UnknownEventShape(_)));

        let err = decode("[1,2,3]").unwrap_err();
        assert!(matches!(err, TaskError::UnknownEventShape(_)));
    }

    #[test]
    fn recognized_kind_with_bad_payload_is_unknown_shape() {
        let err = decode(r#"{"event":"status"}"#).unwrap_err();
        assert!(err.to_string().contains("missing its `status` payload"));

        let err = decode(r#"{"event":"status","status":{"status":"exploded"}}"#).unwrap_err();
        assert!(matches!(err, TaskError::UnknownEventShape(_)));
        assert!(err.is_decode_error());
    }
}
