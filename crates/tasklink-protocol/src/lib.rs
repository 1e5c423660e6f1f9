//! # tasklink-protocol — task service wire contract
//!
//! Shared types, the task event taxonomy, the frame codec, and the port
//! traits the streaming core and dispatch client are built against.
//!
//! Dependency-light (no tokio, no HTTP stack) so it can be used as a pure
//! contract crate.
//!
//! ## Module Overview
//!
//! - [`ids`] — TaskId, StreamLocator, TaskHandle
//! - [`event`] — TaskEvent (7 kinds + forward-compatible `Unknown`) and payloads
//! - [`codec`] — frame text → TaskEvent
//! - [`terminal`] — terminal-status policy
//! - [`api`] — REST request/response bodies
//! - [`ports`] — FrameTransport, FrameConnector, TaskDispatcher
//! - [`error`] — TaskError, TaskResult

pub mod api;
pub mod codec;
pub mod error;
pub mod event;
pub mod ids;
mod lenient;
pub mod ports;
pub mod terminal;

// Re-export the most commonly used types at the crate root.
pub use codec::{decode, decode_value, frame_text};
pub use error::{TaskError, TaskResult};
pub use event::{
    BoundingBox, ContextSnapshot, ErrorEvent, LogLevel, ObservationPayload, OverlayPayload,
    TaskAnnotation, TaskEvent, TaskEventKind, TaskLogEntry, TaskStatus, TaskStatusSnapshot,
};
pub use ids::{RecordingId, StreamLocator, TaskHandle, TaskId};
pub use ports::{FrameConnector, FrameTransport, TaskDispatcher, TaskEventStream};
pub use terminal::is_terminal;
