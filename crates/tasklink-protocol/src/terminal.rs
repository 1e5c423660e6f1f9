//! Terminal-state detection.
//!
//! A pure policy over decoded events: only a `status` event whose status is
//! success, failed, or cancelled is terminal. Detection never closes a
//! session; the consumer decides when to stop reading.

use crate::event::{TaskEvent, TaskStatus};

/// Whether `event` marks the end of the task.
pub fn is_terminal(event: &TaskEvent) -> bool {
    event.terminal_status().is_some()
}

impl TaskEvent {
    /// The terminal status carried by this event, if any.
    pub fn terminal_status(&self) -> Option<TaskStatus> {
        match self {
            TaskEvent::Status(snapshot) if snapshot.status.is_terminal() => Some(snapshot.status),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        is_terminal(self)
    }
}
