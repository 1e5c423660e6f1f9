//! Typed identifiers and the submission handle.
//!
//! IDs are opaque String wrappers (serde-transparent). The service assigns
//! every identifier; the client only carries them.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! typed_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create from any string value.
            pub fn from_string(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// View as string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

typed_id!(
    /// Identifier the service assigns to a submitted task.
    TaskId
);
typed_id!(
    /// Identifier of a recorded browsing session.
    RecordingId
);

/// Path (or absolute address) of a task's event channel, relative to the
/// service's base endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamLocator(String);

impl StreamLocator {
    pub fn new(locator: impl Into<String>) -> Self {
        Self(locator.into())
    }

    /// Locator served by the console API for `task_id`.
    pub fn for_task(task_id: &TaskId) -> Self {
        Self(format!("/api/tasks/{task_id}/stream"))
    }

    /// Locator served by the gateway for `task_id`.
    pub fn for_gateway_task(task_id: &TaskId) -> Self {
        Self(format!("/v1/tasks/{task_id}/stream"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of a successful submission: the task and where its events stream.
///
/// The handle is consumed when a stream session is opened, so each handle
/// backs at most one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskHandle {
    task_id: TaskId,
    stream_locator: StreamLocator,
}

impl TaskHandle {
    pub fn new(task_id: TaskId, stream_locator: StreamLocator) -> Self {
        Self {
            task_id,
            stream_locator,
        }
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn stream_locator(&self) -> &StreamLocator {
        &self.stream_locator
    }

    pub fn into_parts(self) -> (TaskId, StreamLocator) {
        (self.task_id, self.stream_locator)
    }
}
