//! # tasklink-client — SDK entry point
//!
//! [`DispatchClient`] wraps the task service's REST routes and implements
//! the [`TaskDispatcher`](tasklink_protocol::TaskDispatcher) port.
//! [`TaskClient`] pairs a dispatcher with a stream connector so callers can
//! submit a prompt and follow its events in one place.

pub mod client;
pub mod config;
pub mod dispatch;

pub use client::TaskClient;
pub use config::{ClientConfig, DEFAULT_BASE_URL, DEFAULT_TIMEOUT};
pub use dispatch::DispatchClient;
pub use tasklink_protocol as protocol;
pub use tasklink_stream as stream;
