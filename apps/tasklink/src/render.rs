//! One-line human rendering of stream events.

use tasklink_protocol::{LogLevel, TaskEvent};

pub fn event_line(event: &TaskEvent) -> String {
    match event {
        TaskEvent::Status(snapshot) => {
            let mut line = format!("[status] {}", snapshot.status);
            if let (Some(current), Some(total)) = (snapshot.current_step, snapshot.total_steps) {
                line.push_str(&format!(" step {current}/{total}"));
            }
            if let Some(title) = snapshot
                .current_step_title
                .as_deref()
                .or(snapshot.title.as_deref())
            {
                line.push_str(&format!(" {title}"));
            }
            if let Some(error) = &snapshot.last_error {
                line.push_str(&format!(" (error: {error})"));
            }
            line
        }
        TaskEvent::Log(entry) => {
            let level = match entry.level {
                Some(LogLevel::Debug) => "debug",
                Some(LogLevel::Warn) => "warn",
                Some(LogLevel::Error) => "error",
                Some(LogLevel::Other) => "other",
                Some(LogLevel::Info) | None => "info",
            };
            format!("[log:{level}] {}", entry.message)
        }
        TaskEvent::Context(context) => match context.success {
            Some(false) => "[context] capture failed".to_owned(),
            _ => "[context] snapshot captured".to_owned(),
        },
        TaskEvent::Observation(observation) => format!(
            "[observation] {} {}",
            observation.observation_type.as_deref().unwrap_or("unknown"),
            observation
                .dispatch_label
                .as_deref()
                .or(observation.step_id.as_deref())
                .unwrap_or("-"),
        ),
        TaskEvent::Overlay(overlay) => format!("[overlay] {}", overlay.source),
        TaskEvent::Annotation(annotation) => format!("[annotation] {}", annotation.note),
        TaskEvent::Error(error) if error.is_synthetic() => {
            format!("[error] undecodable frame: {}", error.message)
        }
        TaskEvent::Error(error) => format!("[error] {}", error.message),
        TaskEvent::Unknown { kind, .. } => format!("[{kind}] (unrecognized event)"),
    }
}
